//! Row encodings.

use serde_json::Value;

use common_error::{ShardlineError, ShardlineResult};

use crate::row::Row;

/// Line-delimited row codec.
///
/// A shard file is a sequence of encoded rows, each terminated by a
/// newline, so files of one partition can be concatenated byte-wise
/// without changing row order.
pub trait RowFormat: Send + Sync {
    /// File extension, without the dot.
    fn extension(&self) -> &'static str;

    /// Format name understood by the external SQL engine.
    fn sql_format_name(&self) -> &'static str;

    /// Append the encoding of `row`, including the trailing newline, to `buf`.
    fn encode_row(&self, row: &Row, buf: &mut Vec<u8>) -> ShardlineResult<()>;

    /// Decode one line (without its newline).
    fn decode_row(&self, line: &str) -> ShardlineResult<Row>;
}

/// One compact JSON object per line.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinesFormat;

impl RowFormat for JsonLinesFormat {
    fn extension(&self) -> &'static str {
        "jsonl"
    }

    fn sql_format_name(&self) -> &'static str {
        "JSONEachRow"
    }

    fn encode_row(&self, row: &Row, buf: &mut Vec<u8>) -> ShardlineResult<()> {
        serde_json::to_writer(&mut *buf, row)?;
        buf.push(b'\n');
        Ok(())
    }

    fn decode_row(&self, line: &str) -> ShardlineResult<Row> {
        match serde_json::from_str::<Value>(line)? {
            Value::Object(row) => Ok(row),
            other => Err(ShardlineError::format(format!(
                "expected a JSON object per line, got {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_is_one_line() {
        let row = json!({"a": 1, "text": "multi\nline"});
        let mut buf = Vec::new();
        JsonLinesFormat
            .encode_row(row.as_object().unwrap(), &mut buf)
            .unwrap();

        assert_eq!(buf.iter().filter(|b| **b == b'\n').count(), 1);
        assert_eq!(*buf.last().unwrap(), b'\n');
    }

    #[test]
    fn test_decode_rejects_non_objects() {
        assert!(JsonLinesFormat.decode_row("[1,2]").is_err());
        assert!(JsonLinesFormat.decode_row("{broken").is_err());
        assert_eq!(
            JsonLinesFormat.decode_row(r#"{"a":2}"#).unwrap().get("a"),
            Some(&json!(2))
        );
    }
}
