use std::path::Path;

use async_trait::async_trait;
use log::debug;

use common_error::{ShardlineError, ShardlineResult};
use shardline_catalog::FileRef;
use shardline_io::Schema;

use crate::context::StageContext;
use crate::routing::ShuffleRouter;
use crate::stage::{AggregateStage, PipelineStage};

/// Redistributes rows into `num_partitions` partitions by key.
///
/// All input partitions are read as one stream; every row goes to exactly
/// one destination writer. Destination writers share the output
/// directory.
#[derive(Debug, Clone)]
pub struct Shuffle {
    key: String,
    num_partitions: usize,
    schema: Schema,
}

impl Shuffle {
    pub fn new(key: impl Into<String>, num_partitions: usize, schema: Schema) -> Self {
        Self {
            key: key.into(),
            num_partitions,
            schema,
        }
    }

    fn router(&self) -> ShardlineResult<ShuffleRouter> {
        ShuffleRouter::new(self.key.clone(), self.num_partitions)
    }
}

#[async_trait]
impl AggregateStage for Shuffle {
    fn name(&self) -> &str {
        "Shuffle"
    }

    fn validate(&self) -> ShardlineResult<()> {
        self.schema.check()?;
        self.router()
            .map_err(|e| ShardlineError::config(format!("Shuffle: {e}")))?;
        if !self.schema.contains(&self.key) {
            return Err(ShardlineError::config(format!(
                "Shuffle key '{}' is not in the output schema",
                self.key
            )));
        }
        Ok(())
    }

    async fn run_all(
        &self,
        ctx: &StageContext,
        inputs: &[Vec<FileRef>],
        output_dir: &Path,
    ) -> ShardlineResult<Vec<Vec<FileRef>>> {
        let router = self.router()?;
        let mut writers: Vec<_> = (0..self.num_partitions)
            .map(|_| ctx.shard_writer(output_dir).with_schema(self.schema.clone()))
            .collect();

        let mut reader = ctx.row_reader(inputs.iter().flatten().cloned().collect());
        let mut routed = 0u64;
        while let Some(row) = reader.next_row().await? {
            let part = router.route(&row)?;
            writers[part].append(&row).await?;
            routed += 1;
        }
        debug!(
            "Shuffle on '{}' routed {routed} rows into {} partitions",
            self.key, self.num_partitions
        );

        let mut outputs = Vec::with_capacity(writers.len());
        for writer in writers {
            outputs.push(writer.finish().await?);
        }
        Ok(outputs)
    }
}

impl From<Shuffle> for PipelineStage {
    fn from(stage: Shuffle) -> Self {
        PipelineStage::aggregate(stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::MappedStage;
    use crate::stages::Const;
    use common_config::ShardlineConfig;
    use proptest::prelude::*;
    use serde_json::json;
    use shardline_io::{read_all_rows, DataType, Row};

    fn schema() -> Schema {
        Schema::new()
            .with_field("a", DataType::Int64)
            .with_field("tag", DataType::String)
    }

    fn row(a: i64, tag: &str) -> Row {
        json!({ "a": a, "tag": tag }).as_object().cloned().unwrap()
    }

    async fn write_partition(ctx: &StageContext, dir: &Path, rows: Vec<Row>) -> Vec<FileRef> {
        let files = Const::new(schema(), rows).run(ctx, &[], dir).await.unwrap();
        files.iter().map(|f| f.resolve(dir)).collect()
    }

    async fn shuffle_rows(
        inputs: Vec<Vec<Row>>,
        n: usize,
        shard_size: u64,
    ) -> Vec<Vec<Row>> {
        let tmp_dir = tempfile::tempdir().unwrap();
        let ctx = StageContext::new(ShardlineConfig::default().with_shard_size(shard_size));

        let mut partitions = Vec::new();
        for (i, rows) in inputs.into_iter().enumerate() {
            let dir = tmp_dir.path().join(format!("in{i}"));
            partitions.push(write_partition(&ctx, &dir, rows).await);
        }

        let out_dir = tmp_dir.path().join("out");
        let outputs = Shuffle::new("a", n, schema())
            .run_all(&ctx, &partitions, &out_dir)
            .await
            .unwrap();
        assert_eq!(outputs.len(), n);

        let mut result = Vec::new();
        for files in outputs {
            let files: Vec<FileRef> = files.iter().map(|f| f.resolve(&out_dir)).collect();
            result.push(
                read_all_rows(ctx.store.as_ref(), ctx.format.as_ref(), &files)
                    .await
                    .unwrap(),
            );
        }
        result
    }

    #[tokio::test]
    async fn test_shuffle_routes_by_key() {
        let rows: Vec<Row> = (1..=5).map(|a| row(a, "x")).collect();
        let outputs = shuffle_rows(vec![rows], 2, 1_000_000).await;

        let keys = |part: &Vec<Row>| -> Vec<i64> {
            part.iter().map(|r| r["a"].as_i64().unwrap()).collect()
        };
        assert_eq!(keys(&outputs[0]), vec![1, 3]);
        assert_eq!(keys(&outputs[1]), vec![2, 4, 5]);
    }

    #[tokio::test]
    async fn test_shuffle_empty_destination() {
        // Every row has the same key, so one destination stays empty.
        let rows: Vec<Row> = (0..4).map(|i| row(7, &i.to_string())).collect();
        let outputs = shuffle_rows(vec![rows], 3, 1_000_000).await;
        assert_eq!(outputs.iter().filter(|p| p.is_empty()).count(), 2);
        assert_eq!(outputs.iter().map(Vec::len).sum::<usize>(), 4);
    }

    #[tokio::test]
    async fn test_shuffle_missing_key_fails() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let ctx = StageContext::new(ShardlineConfig::default());
        let other = Schema::new().with_field("b", DataType::Int64);
        let files = Const::new(other, vec![json!({"b": 1}).as_object().cloned().unwrap()])
            .run(&ctx, &[], tmp_dir.path())
            .await
            .unwrap();
        let files: Vec<FileRef> = files.iter().map(|f| f.resolve(tmp_dir.path())).collect();

        let err = Shuffle::new("a", 2, schema())
            .run_all(&ctx, &[files], &tmp_dir.path().join("out"))
            .await
            .unwrap_err();
        assert!(matches!(err, ShardlineError::ColumnNotFound(_)));
    }

    #[test]
    fn test_shuffle_validation() {
        assert!(Shuffle::new("a", 2, schema()).validate().is_ok());
        assert!(Shuffle::new("a", 0, schema()).validate().unwrap_err().is_config());
        assert!(Shuffle::new("zz", 2, schema()).validate().unwrap_err().is_config());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_shuffle_conserves_rows(
            partitions in prop::collection::vec(prop::collection::vec(-50i64..50, 0..20), 1..4),
            n in 1usize..6,
        ) {
            let inputs: Vec<Vec<Row>> = partitions
                .iter()
                .enumerate()
                .map(|(p, keys)| {
                    keys.iter()
                        .enumerate()
                        .map(|(i, k)| row(*k, &format!("{p}-{i}")))
                        .collect()
                })
                .collect();

            let runtime = tokio::runtime::Runtime::new().unwrap();
            // A tiny threshold forces several shards per destination.
            let outputs = runtime.block_on(shuffle_rows(inputs.clone(), n, 64));

            let mut expected: Vec<String> = inputs.iter().flatten().map(|r| serde_json::to_string(r).unwrap()).collect();
            let mut actual: Vec<String> = outputs.iter().flatten().map(|r| serde_json::to_string(r).unwrap()).collect();
            expected.sort();
            actual.sort();
            prop_assert_eq!(expected, actual);

            let router = ShuffleRouter::new("a", n).unwrap();
            for (part, rows) in outputs.iter().enumerate() {
                for r in rows {
                    prop_assert_eq!(router.route(r).unwrap(), part);
                }
            }
        }
    }
}
