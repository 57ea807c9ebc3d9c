//! Row model and schema validation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use common_error::{ShardlineError, ShardlineResult};

/// One record: column name to JSON value.
pub type Row = serde_json::Map<String, Value>;

/// Canonical text form of a value, used for key routing.
///
/// Strings are taken verbatim, scalars use their display text and
/// composite values their compact JSON encoding.
pub fn canonical_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

// ============================================================================
// Data Types
// ============================================================================

/// Column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Boolean.
    Bool,
    /// Integer representable as i64 or u64.
    Int64,
    /// Any JSON number.
    Float64,
    /// UTF-8 string.
    String,
    /// Unchecked.
    Any,
}

impl DataType {
    /// Whether `value` (non-null) conforms to this type.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Bool => value.is_boolean(),
            Self::Int64 => value.is_i64() || value.is_u64(),
            Self::Float64 => value.is_number(),
            Self::String => value.is_string(),
            Self::Any => true,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::Int64 => write!(f, "int64"),
            Self::Float64 => write!(f, "float64"),
            Self::String => write!(f, "string"),
            Self::Any => write!(f, "any"),
        }
    }
}

// ============================================================================
// Schema
// ============================================================================

/// One column of a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Column name.
    pub name: String,
    /// Column type.
    pub data_type: DataType,
    /// Whether the column may be null or missing.
    #[serde(default)]
    pub nullable: bool,
}

impl Field {
    /// Create a non-nullable field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: false,
        }
    }

    /// Mark the field nullable.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// Fixed set of columns every written row must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Columns in declaration order.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a non-nullable column.
    pub fn with_field(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.fields.push(Field::new(name, data_type));
        self
    }

    /// Add a column.
    pub fn with(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Look up a column by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether the schema has a column called `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Check the schema itself: non-empty, no duplicate names.
    pub fn check(&self) -> ShardlineResult<()> {
        if self.fields.is_empty() {
            return Err(ShardlineError::config("schema has no fields"));
        }
        for (i, field) in self.fields.iter().enumerate() {
            if field.name.is_empty() {
                return Err(ShardlineError::config("schema field with empty name"));
            }
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(ShardlineError::config(format!(
                    "duplicate schema field '{}'",
                    field.name
                )));
            }
        }
        Ok(())
    }

    /// Check that `row` matches this schema.
    ///
    /// Unknown columns, missing non-nullable columns and type mismatches
    /// are rejected.
    pub fn validate(&self, row: &Row) -> ShardlineResult<()> {
        for name in row.keys() {
            if !self.contains(name) {
                return Err(ShardlineError::format(format!(
                    "column '{name}' is not in the schema"
                )));
            }
        }
        for field in &self.fields {
            match row.get(&field.name) {
                None | Some(Value::Null) if field.nullable => {}
                None => {
                    return Err(ShardlineError::format(format!(
                        "missing column '{}'",
                        field.name
                    )))
                }
                Some(Value::Null) => {
                    return Err(ShardlineError::format(format!(
                        "column '{}' is not nullable",
                        field.name
                    )))
                }
                Some(value) if !field.data_type.accepts(value) => {
                    return Err(ShardlineError::format(format!(
                        "column '{}' expects {}, got {value}",
                        field.name, field.data_type
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn test_canonical_string() {
        assert_eq!(canonical_string(&json!("abc")), "abc");
        assert_eq!(canonical_string(&json!(1)), "1");
        assert_eq!(canonical_string(&json!(-2.5)), "-2.5");
        assert_eq!(canonical_string(&json!(true)), "true");
        assert_eq!(canonical_string(&Value::Null), "null");
        assert_eq!(canonical_string(&json!([1, "a"])), r#"[1,"a"]"#);
    }

    #[test]
    fn test_schema_validate() {
        let schema = Schema::new()
            .with_field("a", DataType::Int64)
            .with(Field::new("b", DataType::String).nullable());

        assert!(schema.validate(&row(json!({"a": 1, "b": "x"}))).is_ok());
        assert!(schema.validate(&row(json!({"a": 1}))).is_ok());
        assert!(schema.validate(&row(json!({"a": 1, "b": null}))).is_ok());

        assert!(schema.validate(&row(json!({"b": "x"}))).is_err());
        assert!(schema.validate(&row(json!({"a": null}))).is_err());
        assert!(schema.validate(&row(json!({"a": "1"}))).is_err());
        assert!(schema.validate(&row(json!({"a": 1.5}))).is_err());
        assert!(schema.validate(&row(json!({"a": 1, "c": 2}))).is_err());
    }

    #[test]
    fn test_schema_check() {
        assert!(Schema::new().check().is_err());
        assert!(Schema::new()
            .with_field("a", DataType::Int64)
            .with_field("a", DataType::String)
            .check()
            .is_err());
        assert!(Schema::new().with_field("a", DataType::Any).check().is_ok());
    }

    #[test]
    fn test_schema_deserializes() {
        let schema: Schema = serde_json::from_value(json!({
            "fields": [{"name": "a", "data_type": "int64"}]
        }))
        .unwrap();
        assert_eq!(schema, Schema::new().with_field("a", DataType::Int64));
    }
}
