//! Commands behind the `shardline` binary.
//!
//! Every command takes an already opened [`PipelineEngine`] so the same
//! code runs against the configured catalog and against test fixtures.

use std::path::PathBuf;

use serde_json::json;

use common_error::ShardlineResult;
use shardline_catalog::{FileRef, GenerationId};
use shardline_io::{read_all_rows, DataType, Row, Schema};
use shardline_pipeline::{Const, Pipeline, PipelineEngine, PipelineOutcome, Shuffle};

/// Print a section header.
pub fn print_header(title: &str) {
    println!("\n{}", "=".repeat(60));
    println!("{title}");
    println!("{}", "=".repeat(60));
}

/// Names with registered partitions.
pub async fn list_names(engine: &PipelineEngine) -> ShardlineResult<Vec<String>> {
    engine.context().catalog.names().await
}

/// Registered partitions of `name` with their file counts.
pub async fn list_partitions(
    engine: &PipelineEngine,
    name: &str,
) -> ShardlineResult<Vec<(usize, usize)>> {
    let catalog = &engine.context().catalog;
    let mut partitions = Vec::new();
    for part in catalog.partitions(name).await? {
        partitions.push((part, catalog.lookup(name, part).await?.len()));
    }
    Ok(partitions)
}

/// Files of one partition. When `name` is a generation id, bare file
/// names are resolved against its output directory.
pub async fn list_files(
    engine: &PipelineEngine,
    name: &str,
    part: usize,
) -> ShardlineResult<Vec<FileRef>> {
    let ctx = engine.context();
    let files = ctx.catalog.lookup(name, part).await?;
    Ok(match GenerationId::parse(name) {
        Ok(generation) => {
            let dir: PathBuf = generation.output_dir(ctx.repo_dir());
            files.iter().map(|f| f.resolve(&dir)).collect()
        }
        Err(_) => files,
    })
}

/// Drop one partition, or every partition, of `name`.
pub async fn drop_partitions(
    engine: &PipelineEngine,
    name: &str,
    part: Option<usize>,
) -> ShardlineResult<usize> {
    match GenerationId::parse(name) {
        Ok(generation) => engine.drop_generation(&generation, part).await,
        Err(_) => engine.context().catalog.unregister(name, part).await,
    }
}

/// The demo pipeline: `rows` constant rows `{a: 1..=rows}` shuffled on `a`
/// into `partitions` partitions.
pub fn demo_pipeline(name: &str, rows: i64, partitions: usize) -> Pipeline {
    let schema = Schema::new().with_field("a", DataType::Int64);
    let rows: Vec<Row> = (1..=rows)
        .filter_map(|a| json!({ "a": a }).as_object().cloned())
        .collect();
    Pipeline::new(name)
        .stage(Const::new(schema.clone(), rows))
        .stage(Shuffle::new("a", partitions, schema))
}

/// Run the demo pipeline and count the rows of each final partition.
pub async fn run_demo(
    engine: &PipelineEngine,
    name: &str,
    rows: i64,
    partitions: usize,
) -> ShardlineResult<(PipelineOutcome, Vec<usize>)> {
    let outcome = engine.run(&demo_pipeline(name, rows, partitions)).await?;
    let ctx = engine.context();
    let mut counts = Vec::with_capacity(outcome.partition_count);
    for part in 0..outcome.partition_count {
        let files = list_files(engine, &outcome.generation.to_string(), part).await?;
        let rows = read_all_rows(ctx.stage.store.as_ref(), ctx.stage.format.as_ref(), &files).await?;
        counts.push(rows.len());
    }
    Ok((outcome, counts))
}
