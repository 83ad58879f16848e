//! Typed parsing of operation params and schema checks shared by primitives.

use crate::core::error::AppError;
use crate::core::table::{Column, DataType, Table, Value};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value as JsonValue;

/// Parse the generic descriptor params into a primitive's typed params.
pub fn parse<P: DeserializeOwned>(operation: &str, params: &JsonValue) -> Result<P, AppError> {
    if !params.is_object() {
        return Err(AppError::parameter(
            "params",
            format!("{} expects params to be an object", operation),
        ));
    }
    serde_json::from_value(params.clone()).map_err(|err| {
        let reason = err.to_string();
        let key = offending_key(&reason).unwrap_or_else(|| "params".to_string());
        AppError::parameter(key, reason).with_context("operation", operation)
    })
}

/// serde reports the field name between backticks for missing/unknown fields.
fn offending_key(reason: &str) -> Option<String> {
    if !reason.starts_with("missing field") && !reason.starts_with("unknown field") {
        return None;
    }
    let start = reason.find('`')? + 1;
    let end = start + reason[start..].find('`')?;
    let key = &reason[start..end];
    if key.is_empty() || key.contains(' ') {
        None
    } else {
        Some(key.to_string())
    }
}

pub fn require_column<'a>(table: &'a Table, key: &str, column: &str) -> Result<&'a Column, AppError> {
    table.column(column).ok_or_else(|| {
        AppError::parameter(
            key,
            format!(
                "column '{}' does not exist; available columns: {}",
                column,
                table.column_names().join(", ")
            ),
        )
        .with_context("column", column)
    })
}

pub fn require_columns(table: &Table, key: &str, columns: &[String]) -> Result<(), AppError> {
    for column in columns {
        require_column(table, key, column)?;
    }
    Ok(())
}

pub fn require_non_empty<T>(key: &str, items: &[T]) -> Result<(), AppError> {
    if items.is_empty() {
        return Err(AppError::parameter(key, "must contain at least one entry"));
    }
    Ok(())
}

pub fn require_distinct(key: &str, items: &[String]) -> Result<(), AppError> {
    for (index, item) in items.iter().enumerate() {
        if items[..index].contains(item) {
            return Err(AppError::parameter(key, format!("'{}' is listed more than once", item)));
        }
    }
    Ok(())
}

pub fn require_type(
    table: &Table,
    key: &str,
    column: &str,
    accepted: &[DataType],
) -> Result<DataType, AppError> {
    let dtype = require_column(table, key, column)?.dtype();
    if dtype == DataType::Null || accepted.contains(&dtype) {
        return Ok(dtype);
    }
    Err(AppError::parameter(
        key,
        format!(
            "column '{}' has type {}; expected {}",
            column,
            dtype,
            accepted
                .iter()
                .map(DataType::as_str)
                .collect::<Vec<_>>()
                .join(" or ")
        ),
    )
    .with_context("column", column))
}

pub fn require_numeric(table: &Table, key: &str, column: &str) -> Result<DataType, AppError> {
    require_type(table, key, column, &[DataType::Integer, DataType::Float])
}

pub fn require_string(table: &Table, key: &str, column: &str) -> Result<DataType, AppError> {
    require_type(table, key, column, &[DataType::String])
}

pub fn require_datetime(table: &Table, key: &str, column: &str) -> Result<DataType, AppError> {
    require_type(table, key, column, &[DataType::Datetime])
}

/// An output column name must be new, or equal to `replaces` when overwriting in place.
pub fn require_output_name(
    table: &Table,
    key: &str,
    name: &str,
    replaces: Option<&str>,
) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::parameter(key, "column name must not be empty"));
    }
    if table.has_column(name) && replaces != Some(name) {
        return Err(AppError::parameter(
            key,
            format!("column '{}' already exists", name),
        ));
    }
    Ok(())
}

/// Convert a JSON literal from params to a cell value of the given column type.
pub fn literal(key: &str, raw: &JsonValue, dtype: DataType) -> Result<Value, AppError> {
    let value = Value::from_json(raw).map_err(|reason| AppError::parameter(key, reason))?;
    value
        .coerce_to(dtype)
        .map_err(|reason| AppError::parameter(key, reason))
}

pub fn require_range(key: &str, value: f64, min: f64, max: f64) -> Result<(), AppError> {
    if !value.is_finite() || value < min || value > max {
        return Err(AppError::parameter(
            key,
            format!("must be between {} and {}; got {}", min, max, value),
        ));
    }
    Ok(())
}

/// Strict-by-default handling of cells that cannot be converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    #[default]
    Fail,
    Null,
}

/// Either one column name or a list of them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(name) => vec![name],
            OneOrMany::Many(names) => names,
        }
    }
}

pub fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ErrorCategory;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Sample {
        #[allow(dead_code)]
        column: String,
        #[serde(default)]
        #[allow(dead_code)]
        limit: Option<u32>,
    }

    #[test]
    fn test_missing_field_names_the_key() {
        let err = parse::<Sample>("sample", &json!({})).unwrap_err();
        assert_eq!(err.category, ErrorCategory::ParameterError);
        assert_eq!(err.context.get("parameter"), Some(&"column".to_string()));
    }

    #[test]
    fn test_unknown_field_names_the_key() {
        let err = parse::<Sample>("sample", &json!({"column": "a", "colour": 1})).unwrap_err();
        assert_eq!(err.context.get("parameter"), Some(&"colour".to_string()));
    }

    #[test]
    fn test_non_object_params_rejected() {
        let err = parse::<Sample>("sample", &json!([1, 2])).unwrap_err();
        assert_eq!(err.context.get("parameter"), Some(&"params".to_string()));
    }

    #[test]
    fn test_require_column_lists_available_columns() {
        let table = Table::from_json(&json!([{"a": 1, "b": 2}])).unwrap();
        let err = require_column(&table, "column", "missing_col").unwrap_err();
        assert!(err.message.contains("missing_col"));
        assert!(err.message.contains("a, b"));
    }
}
