//! Immutable, typed, columnar tables.

mod value;

pub use value::{
    parse_bool, parse_iso_datetime, whole_to_i64, DataType, Value, ValueKey, DATETIME_FORMAT,
};

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use indexmap::IndexMap;
use serde::de::Error as _;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};
use sha2::{Digest, Sha256};

/// Errors raised while building a [`Table`] or [`Column`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TableError {
    #[error("column '{column}' has {actual} rows; expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },
    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),
    #[error("column '{column}' is declared {expected} but row {row} holds a {found} value")]
    TypeMismatch {
        column: String,
        row: usize,
        expected: DataType,
        found: DataType,
    },
    #[error("column '{column}' mixes {first} and {second} values")]
    MixedTypes {
        column: String,
        first: DataType,
        second: DataType,
    },
    #[error("column '{0}' not found")]
    MissingColumn(String),
    #[error("invalid table literal: {0}")]
    InvalidLiteral(String),
}

impl TableError {
    /// Re-categorize a construction failure that happened while running a primitive.
    pub fn into_execution(self) -> AppError {
        AppError::execution(self.to_string())
    }
}

impl From<TableError> for AppError {
    fn from(e: TableError) -> Self {
        AppError::new(ErrorCategory::TableError, e.to_string())
    }
}

/// A single typed column. Every non-null value matches `dtype`.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    dtype: DataType,
    values: Vec<Value>,
}

impl Column {
    /// Build a column with an explicit type. Integer values are widened in float columns.
    pub fn new(name: &str, dtype: DataType, values: Vec<Value>) -> Result<Self, TableError> {
        let mut checked = Vec::with_capacity(values.len());
        for (row, value) in values.into_iter().enumerate() {
            let found = value.dtype();
            if value.is_null() || found == dtype {
                checked.push(value);
            } else if let (Value::Int(v), DataType::Float) = (&value, dtype) {
                checked.push(Value::Float(*v as f64));
            } else {
                return Err(TableError::TypeMismatch {
                    column: name.to_string(),
                    row,
                    expected: dtype,
                    found,
                });
            }
        }
        Ok(Self {
            dtype,
            values: checked,
        })
    }

    /// Build a column, inferring the type from its non-null values.
    pub fn infer(name: &str, values: Vec<Value>) -> Result<Self, TableError> {
        let mut dtype = DataType::Null;
        for value in &values {
            let found = value.dtype();
            dtype = dtype.unify(found).ok_or_else(|| TableError::MixedTypes {
                column: name.to_string(),
                first: dtype,
                second: found,
            })?;
        }
        Self::new(name, dtype, values)
    }

    pub fn nulls(dtype: DataType, len: usize) -> Self {
        Self {
            dtype,
            values: vec![Value::Null; len],
        }
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, row: usize) -> &Value {
        self.values.get(row).unwrap_or(&Value::Null)
    }

    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }

    pub fn take(&self, indices: &[usize]) -> Self {
        Self {
            dtype: self.dtype,
            values: indices.iter().map(|&i| self.get(i).clone()).collect(),
        }
    }

    /// Gather rows where `None` produces a null cell (outer joins).
    pub fn take_optional(&self, indices: &[Option<usize>]) -> Self {
        Self {
            dtype: self.dtype,
            values: indices
                .iter()
                .map(|slot| slot.map(|i| self.get(i).clone()).unwrap_or(Value::Null))
                .collect(),
        }
    }
}

/// Ordered, named set of equally long columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: IndexMap<String, Column>,
    row_count: usize,
}

impl Table {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(columns: Vec<(String, Column)>) -> Result<Self, TableError> {
        let row_count = columns.first().map(|(_, c)| c.len()).unwrap_or(0);
        Self::with_row_count(columns, row_count)
    }

    /// Build a table whose row count is explicit (needed when there are no columns).
    pub fn with_row_count(
        columns: Vec<(String, Column)>,
        row_count: usize,
    ) -> Result<Self, TableError> {
        let mut map = IndexMap::with_capacity(columns.len());
        for (name, column) in columns {
            if column.len() != row_count {
                return Err(TableError::LengthMismatch {
                    column: name,
                    expected: row_count,
                    actual: column.len(),
                });
            }
            if map.contains_key(&name) {
                return Err(TableError::DuplicateColumn(name));
            }
            map.insert(name, column);
        }
        Ok(Self {
            columns: map,
            row_count,
        })
    }

    /// Build from row records. Column order follows first appearance; missing keys are null.
    pub fn from_records(rows: &[Map<String, JsonValue>]) -> Result<Self, TableError> {
        let mut names: IndexMap<String, ()> = IndexMap::new();
        for row in rows {
            for key in row.keys() {
                names.entry(key.clone()).or_insert(());
            }
        }
        let mut columns = Vec::with_capacity(names.len());
        for name in names.keys() {
            let mut values = Vec::with_capacity(rows.len());
            for row in rows {
                let value = match row.get(name) {
                    Some(raw) => Value::from_json(raw).map_err(|reason| {
                        TableError::InvalidLiteral(format!("column '{}': {}", name, reason))
                    })?,
                    None => Value::Null,
                };
                values.push(value);
            }
            columns.push((name.clone(), Column::infer(name, values)?));
        }
        Self::with_row_count(columns, rows.len())
    }

    /// Accepts either a records array or the columnar object produced by serialization.
    pub fn from_json(value: &JsonValue) -> Result<Self, TableError> {
        match value {
            JsonValue::Array(items) => {
                let mut rows = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    match item {
                        JsonValue::Object(map) => rows.push(map.clone()),
                        _ => {
                            return Err(TableError::InvalidLiteral(format!(
                                "record {} is not an object",
                                index
                            )))
                        }
                    }
                }
                Self::from_records(&rows)
            }
            JsonValue::Object(map) => Self::from_columnar(map),
            _ => Err(TableError::InvalidLiteral(
                "expected an array of records or an object with 'columns'".to_string(),
            )),
        }
    }

    fn from_columnar(map: &Map<String, JsonValue>) -> Result<Self, TableError> {
        let Some(JsonValue::Array(specs)) = map.get("columns") else {
            return Err(TableError::InvalidLiteral(
                "columnar table requires a 'columns' array".to_string(),
            ));
        };
        let mut columns = Vec::with_capacity(specs.len());
        for spec in specs {
            let name = spec
                .get("name")
                .and_then(JsonValue::as_str)
                .ok_or_else(|| TableError::InvalidLiteral("column without a name".to_string()))?
                .to_string();
            let raw_values = spec
                .get("values")
                .and_then(JsonValue::as_array)
                .ok_or_else(|| {
                    TableError::InvalidLiteral(format!("column '{}' has no 'values' array", name))
                })?;
            let mut values = Vec::with_capacity(raw_values.len());
            for raw in raw_values {
                values.push(Value::from_json(raw).map_err(|reason| {
                    TableError::InvalidLiteral(format!("column '{}': {}", name, reason))
                })?);
            }
            let column = match spec.get("dtype").and_then(JsonValue::as_str) {
                Some(dtype) => {
                    let dtype: DataType = dtype.parse().map_err(TableError::InvalidLiteral)?;
                    let values = values
                        .into_iter()
                        .map(|v| {
                            v.coerce_to(dtype).map_err(|reason| {
                                TableError::InvalidLiteral(format!("column '{}': {}", name, reason))
                            })
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    Column::new(&name, dtype, values)?
                }
                None => Column::infer(&name, values)?,
            };
            columns.push((name, column));
        }
        let row_count = match map.get("row_count").and_then(JsonValue::as_u64) {
            Some(count) => count as usize,
            None => columns.first().map(|(_, c)| c.len()).unwrap_or(0),
        };
        Self::with_row_count(columns, row_count)
    }

    pub fn to_records(&self) -> Vec<Map<String, JsonValue>> {
        (0..self.row_count)
            .map(|row| {
                self.columns
                    .iter()
                    .map(|(name, column)| (name.clone(), column.get(row).to_json()))
                    .collect()
            })
            .collect()
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.keys().map(String::as_str).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.get_index_of(name)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&String, &Column)> {
        self.columns.iter()
    }

    pub fn schema(&self) -> Vec<(String, DataType)> {
        self.columns
            .iter()
            .map(|(name, column)| (name.clone(), column.dtype()))
            .collect()
    }

    pub fn cell(&self, column: &str, row: usize) -> Option<&Value> {
        self.columns.get(column).and_then(|c| c.values.get(row))
    }

    /// New table with rows gathered in the given order.
    pub fn take_rows(&self, indices: &[usize]) -> Self {
        Self {
            columns: self
                .columns
                .iter()
                .map(|(name, column)| (name.clone(), column.take(indices)))
                .collect(),
            row_count: indices.len(),
        }
    }

    /// Replace a column in place or append it when the name is new.
    pub fn with_column(&self, name: &str, column: Column) -> Result<Self, TableError> {
        if column.len() != self.row_count {
            return Err(TableError::LengthMismatch {
                column: name.to_string(),
                expected: self.row_count,
                actual: column.len(),
            });
        }
        let mut columns = self.columns.clone();
        columns.insert(name.to_string(), column);
        Ok(Self {
            columns,
            row_count: self.row_count,
        })
    }

    /// Insert a new column at `index` (clamped to the column count).
    pub fn insert_column_at(
        &self,
        index: usize,
        name: &str,
        column: Column,
    ) -> Result<Self, TableError> {
        if self.columns.contains_key(name) {
            return Err(TableError::DuplicateColumn(name.to_string()));
        }
        let mut entries: Vec<(String, Column)> = self
            .columns
            .iter()
            .map(|(n, c)| (n.clone(), c.clone()))
            .collect();
        entries.insert(index.min(entries.len()), (name.to_string(), column));
        Self::with_row_count(entries, self.row_count)
    }

    pub fn without_columns(&self, names: &[String]) -> Self {
        Self {
            columns: self
                .columns
                .iter()
                .filter(|(name, _)| !names.contains(name))
                .map(|(name, column)| (name.clone(), column.clone()))
                .collect(),
            row_count: self.row_count,
        }
    }

    pub fn select(&self, names: &[String]) -> Result<Self, TableError> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let column = self
                .columns
                .get(name)
                .ok_or_else(|| TableError::MissingColumn(name.clone()))?;
            columns.push((name.clone(), column.clone()));
        }
        Self::with_row_count(columns, self.row_count)
    }

    /// SHA-256 of the canonical serialization, lowercase hex.
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        hex::encode(hasher.finalize())
    }
}

#[derive(Serialize)]
struct ColumnRef<'a> {
    name: &'a str,
    dtype: DataType,
    values: &'a [Value],
}

impl Serialize for Table {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let columns: Vec<ColumnRef<'_>> = self
            .columns
            .iter()
            .map(|(name, column)| ColumnRef {
                name,
                dtype: column.dtype,
                values: &column.values,
            })
            .collect();
        let mut state = serializer.serialize_struct("Table", 2)?;
        state.serialize_field("row_count", &self.row_count)?;
        state.serialize_field("columns", &columns)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for Table {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = JsonValue::deserialize(deserializer)?;
        Table::from_json(&raw).map_err(D::Error::custom)
    }
}
