use serde::{Deserialize, Serialize};

/// Engine state for a single `execute` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", content = "step", rename_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Pending,
    Running(usize),
    Halted(usize),
    Completed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Halted(_) | ExecutionStatus::Completed)
    }
}

/// Error category enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    UnknownOperationError,
    ParameterError,
    ExecutionError,
    DuplicateNameError,
    DefinitionError,
    TableError,
    ConfigError,
    SerializationError,
    IoError,
    InternalError,
}

impl ErrorCategory {
    /// Whether resubmitting the same operation could ever succeed without a change by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::IoError)
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Error severity enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Fatal,
    Error,
    Warning,
}

/// Primitive catalog categories, in documentation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveCategory {
    RowSelection,
    ColumnReshaping,
    TextNormalization,
    TypeCoercion,
    DateArithmetic,
    NumericWindow,
    GroupingReshaping,
    Joins,
    DataQuality,
}

impl PrimitiveCategory {
    pub const ALL: [PrimitiveCategory; 9] = [
        PrimitiveCategory::RowSelection,
        PrimitiveCategory::ColumnReshaping,
        PrimitiveCategory::TextNormalization,
        PrimitiveCategory::TypeCoercion,
        PrimitiveCategory::DateArithmetic,
        PrimitiveCategory::NumericWindow,
        PrimitiveCategory::GroupingReshaping,
        PrimitiveCategory::Joins,
        PrimitiveCategory::DataQuality,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveCategory::RowSelection => "row_selection",
            PrimitiveCategory::ColumnReshaping => "column_reshaping",
            PrimitiveCategory::TextNormalization => "text_normalization",
            PrimitiveCategory::TypeCoercion => "type_coercion",
            PrimitiveCategory::DateArithmetic => "date_arithmetic",
            PrimitiveCategory::NumericWindow => "numeric_window",
            PrimitiveCategory::GroupingReshaping => "grouping_reshaping",
            PrimitiveCategory::Joins => "joins",
            PrimitiveCategory::DataQuality => "data_quality",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            PrimitiveCategory::RowSelection => "Row selection and deduplication",
            PrimitiveCategory::ColumnReshaping => "Column reshaping",
            PrimitiveCategory::TextNormalization => "Text and format normalization",
            PrimitiveCategory::TypeCoercion => "Type coercion and missing values",
            PrimitiveCategory::DateArithmetic => "Date arithmetic",
            PrimitiveCategory::NumericWindow => "Numeric and window calculations",
            PrimitiveCategory::GroupingReshaping => "Grouping and reshaping",
            PrimitiveCategory::Joins => "Multi-table joins",
            PrimitiveCategory::DataQuality => "Data quality and drift detection",
        }
    }
}

impl std::fmt::Display for PrimitiveCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PrimitiveCategory {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        PrimitiveCategory::ALL
            .iter()
            .copied()
            .find(|category| category.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "unknown category '{}'; supported values are {}",
                    value,
                    PrimitiveCategory::ALL
                        .iter()
                        .map(|c| c.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trips_through_str() {
        for category in PrimitiveCategory::ALL {
            let parsed: PrimitiveCategory = category.as_str().parse().unwrap();
            assert_eq!(parsed, category);
        }
    }

    #[test]
    fn test_unknown_category_lists_supported_values() {
        let err = "bogus".parse::<PrimitiveCategory>().unwrap_err();
        assert!(err.contains("row_selection"));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(!ExecutionStatus::Running(2).is_terminal());
        assert!(ExecutionStatus::Halted(1).is_terminal());
        assert!(ExecutionStatus::Completed.is_terminal());
    }
}
