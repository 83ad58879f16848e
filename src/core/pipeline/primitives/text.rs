use super::{build_column, count_changes, count_new_nulls, put_column};
use crate::core::error::AppError;
use crate::core::pipeline::metadata::{DerivedFacts, StepMetadata, ValueFacts};
use crate::core::pipeline::params::{self, default_true};
use crate::core::pipeline::primitive::{
    ParamKind, ParamSpec, PrimitiveDefinition, StepOutput, TypedPrimitive,
};
use crate::core::table::{DataType, Table, Value};
use crate::core::types::PrimitiveCategory;
use indexmap::IndexMap;
use regex::{NoExpand, Regex, RegexBuilder};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

const CATEGORY: PrimitiveCategory = PrimitiveCategory::TextNormalization;

/// Apply `f` to every non-null string cell of `column`, returning the new table and edits.
fn map_strings<F>(
    table: &Table,
    column: &str,
    facts: &mut ValueFacts,
    mut f: F,
) -> Result<Table, AppError>
where
    F: FnMut(&str) -> Value,
{
    let source = params::require_column(table, "column", column)?;
    let values: Vec<Value> = source
        .values()
        .iter()
        .map(|value| match value {
            Value::Str(text) => f(text),
            other => other.clone(),
        })
        .collect();
    facts.record(column, count_changes(source.values(), &values));
    facts.nulls_introduced += count_new_nulls(source.values(), &values);
    let rebuilt = build_column(column, source.dtype(), values)?;
    put_column(table, column, rebuilt)
}

// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrimSide {
    #[default]
    Both,
    Leading,
    Trailing,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrimWhitespaceParams {
    #[serde(default)]
    columns: Option<Vec<String>>,
    #[serde(default)]
    side: TrimSide,
    #[serde(default)]
    collapse_internal: bool,
}

pub struct TrimWhitespace;

impl TypedPrimitive for TrimWhitespace {
    type Params = TrimWhitespaceParams;
    const NAME: &'static str = "trim_whitespace";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Strip leading and/or trailing whitespace from text cells, optionally collapsing inner runs to one space.",
        )
        .param(ParamSpec::optional(
            "columns",
            ParamKind::Columns,
            "Text columns to clean; every text column when omitted",
        ))
        .param(
            ParamSpec::optional(
                "side",
                ParamKind::Choice(vec!["both", "leading", "trailing"]),
                "Which ends to trim",
            )
            .default_value("both"),
        )
        .param(
            ParamSpec::optional(
                "collapse_internal",
                ParamKind::Boolean,
                "Replace inner whitespace runs with a single space",
            )
            .default_value("false"),
        )
        .example("Trim spaces from every text column", json!({}))
        .example("Clean up stray spaces in the name column", json!({"columns": ["name"]}))
        .example(
            "Remove extra spaces inside and around addresses",
            json!({"columns": ["address"], "collapse_internal": true}),
        )
        .example(
            "Strip leading blanks from product codes",
            json!({"columns": ["code"], "side": "leading"}),
        )
    }

    fn check(&self, params: &TrimWhitespaceParams, table: &Table) -> Result<(), AppError> {
        if let Some(columns) = &params.columns {
            params::require_non_empty("columns", columns)?;
            for column in columns {
                params::require_string(table, "columns", column)?;
            }
        }
        Ok(())
    }

    fn apply(&self, table: &Table, params: TrimWhitespaceParams) -> Result<StepOutput, AppError> {
        let columns: Vec<String> = match params.columns {
            Some(columns) => columns,
            None => table
                .columns()
                .filter(|(_, c)| c.dtype() == DataType::String)
                .map(|(name, _)| name.clone())
                .collect(),
        };
        let inner = Regex::new(r"\s+").map_err(|e| AppError::execution(e.to_string()))?;
        let mut facts = ValueFacts::default();
        let mut output = table.clone();
        for column in &columns {
            output = map_strings(&output, column, &mut facts, |text| {
                let trimmed = match params.side {
                    TrimSide::Both => text.trim(),
                    TrimSide::Leading => text.trim_start(),
                    TrimSide::Trailing => text.trim_end(),
                };
                if params.collapse_internal {
                    Value::str(inner.replace_all(trimmed, " "))
                } else {
                    Value::str(trimmed)
                }
            })?;
        }
        Ok(StepOutput::new(output, StepMetadata::Values(facts)))
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextCase {
    Upper,
    Lower,
    Title,
    Sentence,
}

impl TextCase {
    fn convert(self, text: &str) -> String {
        match self {
            TextCase::Upper => text.to_uppercase(),
            TextCase::Lower => text.to_lowercase(),
            TextCase::Title => {
                let mut out = String::with_capacity(text.len());
                let mut word_start = true;
                for ch in text.chars() {
                    if ch.is_alphanumeric() {
                        if word_start {
                            out.extend(ch.to_uppercase());
                        } else {
                            out.extend(ch.to_lowercase());
                        }
                        word_start = false;
                    } else {
                        out.push(ch);
                        word_start = ch != '\'';
                    }
                }
                out
            }
            TextCase::Sentence => {
                let mut out = String::with_capacity(text.len());
                let mut seen_letter = false;
                for ch in text.chars() {
                    if !seen_letter && ch.is_alphabetic() {
                        out.extend(ch.to_uppercase());
                        seen_letter = true;
                    } else {
                        out.extend(ch.to_lowercase());
                    }
                }
                out
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangeTextCasingParams {
    column: String,
    case: TextCase,
}

pub struct ChangeTextCasing;

impl TypedPrimitive for ChangeTextCasing {
    type Params = ChangeTextCasingParams;
    const NAME: &'static str = "change_text_casing";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Convert a text column to upper, lower, title or sentence case.",
        )
        .param(ParamSpec::required("column", ParamKind::Column, "Text column"))
        .param(ParamSpec::required(
            "case",
            ParamKind::Choice(vec!["upper", "lower", "title", "sentence"]),
            "Target casing",
        ))
        .example("Make all emails lowercase", json!({"column": "email", "case": "lower"}))
        .example(
            "Capitalize each word of the customer name",
            json!({"column": "customer_name", "case": "title"}),
        )
        .example("Put country codes in capitals", json!({"column": "country", "case": "upper"}))
        .example(
            "Fix the comments so only the first letter is capitalized",
            json!({"column": "comment", "case": "sentence"}),
        )
    }

    fn check(&self, params: &ChangeTextCasingParams, table: &Table) -> Result<(), AppError> {
        params::require_string(table, "column", &params.column).map(|_| ())
    }

    fn apply(&self, table: &Table, params: ChangeTextCasingParams) -> Result<StepOutput, AppError> {
        let mut facts = ValueFacts::default();
        let output = map_strings(table, &params.column, &mut facts, |text| {
            Value::Str(params.case.convert(text))
        })?;
        Ok(StepOutput::new(output, StepMetadata::Values(facts)))
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StandardizeValuesParams {
    column: String,
    mapping: IndexMap<String, Vec<String>>,
    #[serde(default = "default_true")]
    case_sensitive: bool,
}

impl StandardizeValuesParams {
    fn fold(&self, text: &str) -> String {
        if self.case_sensitive {
            text.to_string()
        } else {
            text.to_lowercase()
        }
    }

    /// Variant (folded) to canonical value. A variant may belong to one canonical only.
    fn lookup(&self) -> Result<HashMap<String, String>, AppError> {
        let mut lookup: HashMap<String, String> = HashMap::new();
        for (canonical, variants) in &self.mapping {
            for variant in variants {
                let key = self.fold(variant);
                match lookup.get(&key) {
                    Some(existing) if existing != canonical => {
                        return Err(AppError::parameter(
                            "mapping",
                            format!(
                                "variant '{}' is listed under both '{}' and '{}'",
                                variant, existing, canonical
                            ),
                        ));
                    }
                    _ => {
                        lookup.insert(key, canonical.clone());
                    }
                }
            }
        }
        Ok(lookup)
    }
}

pub struct StandardizeValues;

impl TypedPrimitive for StandardizeValues {
    type Params = StandardizeValuesParams;
    const NAME: &'static str = "standardize_values";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Map spelling variants to canonical values. Values that match no variant are left as they are.",
        )
        .param(ParamSpec::required("column", ParamKind::Column, "Text column"))
        .param(ParamSpec::required(
            "mapping",
            ParamKind::Mapping,
            "Canonical value to list of variants",
        ))
        .param(
            ParamSpec::optional("case_sensitive", ParamKind::Boolean, "Match variants exactly")
                .default_value("true"),
        )
        .example(
            "Standardize the state names to two-letter codes",
            json!({"column": "state", "mapping": {"CA": ["California", "Calif."], "NY": ["New York", "N.Y."]}}),
        )
        .example(
            "Normalize yes/no answers regardless of case",
            json!({"column": "answer", "mapping": {"yes": ["y", "yes", "yeah"], "no": ["n", "no", "nope"]}, "case_sensitive": false}),
        )
        .example(
            "Unify the different spellings of United States",
            json!({"column": "country", "mapping": {"United States": ["USA", "U.S.", "US", "United States of America"]}}),
        )
    }

    fn check(&self, params: &StandardizeValuesParams, table: &Table) -> Result<(), AppError> {
        params::require_string(table, "column", &params.column)?;
        if params.mapping.is_empty() {
            return Err(AppError::parameter("mapping", "must contain at least one entry"));
        }
        params.lookup().map(|_| ())
    }

    fn apply(&self, table: &Table, params: StandardizeValuesParams) -> Result<StepOutput, AppError> {
        let lookup = params.lookup()?;
        let mut facts = ValueFacts::default();
        let mut by_target = std::collections::BTreeMap::new();
        let output = map_strings(table, &params.column, &mut facts, |text| {
            match lookup.get(&params.fold(text)) {
                Some(canonical) => {
                    if canonical != text {
                        *by_target.entry(canonical.clone()).or_insert(0usize) += 1;
                    }
                    Value::str(canonical.as_str())
                }
                None => Value::str(text),
            }
        })?;
        facts.changes_by_target = by_target;
        Ok(StepOutput::new(output, StepMetadata::Values(facts)))
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplaceTextParams {
    column: String,
    pattern: String,
    replacement: String,
    #[serde(default)]
    regex: bool,
    #[serde(default = "default_true")]
    case_sensitive: bool,
}

impl ReplaceTextParams {
    fn compile(&self) -> Result<Regex, AppError> {
        if self.pattern.is_empty() {
            return Err(AppError::parameter("pattern", "must not be empty"));
        }
        let source = if self.regex {
            self.pattern.clone()
        } else {
            regex::escape(&self.pattern)
        };
        RegexBuilder::new(&source)
            .case_insensitive(!self.case_sensitive)
            .build()
            .map_err(|e| AppError::parameter("pattern", format!("invalid regex: {}", e)))
    }
}

pub struct ReplaceText;

impl TypedPrimitive for ReplaceText {
    type Params = ReplaceTextParams;
    const NAME: &'static str = "replace_text";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Replace every occurrence of a literal substring or regex in a text column. Regex replacements may use $1 style groups.",
        )
        .param(ParamSpec::required("column", ParamKind::Column, "Text column"))
        .param(ParamSpec::required("pattern", ParamKind::String, "Text or regex to find"))
        .param(ParamSpec::required("replacement", ParamKind::String, "Replacement text"))
        .param(
            ParamSpec::optional("regex", ParamKind::Boolean, "Treat pattern as a regex")
                .default_value("false"),
        )
        .param(
            ParamSpec::optional("case_sensitive", ParamKind::Boolean, "Match case exactly")
                .default_value("true"),
        )
        .example(
            "Replace 'St.' with 'Street' in addresses",
            json!({"column": "address", "pattern": "St.", "replacement": "Street"}),
        )
        .example(
            "Remove all digits from the name column",
            json!({"column": "name", "pattern": "[0-9]+", "replacement": "", "regex": true}),
        )
        .example(
            "Change 'n/a' to 'unknown' in notes, any case",
            json!({"column": "notes", "pattern": "n/a", "replacement": "unknown", "case_sensitive": false}),
        )
    }

    fn check(&self, params: &ReplaceTextParams, table: &Table) -> Result<(), AppError> {
        params::require_string(table, "column", &params.column)?;
        params.compile().map(|_| ())
    }

    fn apply(&self, table: &Table, params: ReplaceTextParams) -> Result<StepOutput, AppError> {
        let regex = params.compile()?;
        let mut facts = ValueFacts::default();
        let output = map_strings(table, &params.column, &mut facts, |text| {
            if params.regex {
                Value::str(regex.replace_all(text, params.replacement.as_str()))
            } else {
                Value::str(regex.replace_all(text, NoExpand(&params.replacement)))
            }
        })?;
        Ok(StepOutput::new(output, StepMetadata::Values(facts)))
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractPatternParams {
    column: String,
    pattern: String,
    into: String,
    #[serde(default)]
    group: usize,
}

impl ExtractPatternParams {
    fn compile(&self) -> Result<Regex, AppError> {
        let regex = Regex::new(&self.pattern)
            .map_err(|e| AppError::parameter("pattern", format!("invalid regex: {}", e)))?;
        if self.group >= regex.captures_len() {
            return Err(AppError::parameter(
                "group",
                format!(
                    "pattern has {} capture groups; group {} does not exist",
                    regex.captures_len() - 1,
                    self.group
                ),
            ));
        }
        Ok(regex)
    }
}

pub struct ExtractPattern;

impl TypedPrimitive for ExtractPattern {
    type Params = ExtractPatternParams;
    const NAME: &'static str = "extract_pattern";
    const CATEGORY: PrimitiveCategory = CATEGORY;

    fn describe(&self) -> PrimitiveDefinition {
        PrimitiveDefinition::new(
            Self::NAME,
            CATEGORY,
            "Copy the first regex match (or one capture group) of a text column into a new column; cells without a match become null.",
        )
        .param(ParamSpec::required("column", ParamKind::Column, "Text column"))
        .param(ParamSpec::required("pattern", ParamKind::String, "Regular expression"))
        .param(ParamSpec::required("into", ParamKind::Column, "Name of the new column"))
        .param(
            ParamSpec::optional("group", ParamKind::Integer, "Capture group, 0 for the whole match")
                .default_value("0"),
        )
        .example(
            "Pull the zip code out of the address",
            json!({"column": "address", "pattern": "\\d{5}", "into": "zip"}),
        )
        .example(
            "Get the domain from each email address",
            json!({"column": "email", "pattern": "@(.+)$", "into": "domain", "group": 1}),
        )
        .example(
            "Extract the order number that follows 'ORD-'",
            json!({"column": "reference", "pattern": "ORD-(\\d+)", "into": "order_number", "group": 1}),
        )
    }

    fn check(&self, params: &ExtractPatternParams, table: &Table) -> Result<(), AppError> {
        params::require_string(table, "column", &params.column)?;
        params::require_output_name(table, "into", &params.into, Some(params.column.as_str()))?;
        params.compile().map(|_| ())
    }

    fn apply(&self, table: &Table, params: ExtractPatternParams) -> Result<StepOutput, AppError> {
        let regex = params.compile()?;
        let source = params::require_column(table, "column", &params.column)?;
        let values: Vec<Value> = source
            .values()
            .iter()
            .map(|value| {
                value
                    .as_str()
                    .and_then(|text| regex.captures(text))
                    .and_then(|caps| caps.get(params.group))
                    .map(|m| Value::str(m.as_str()))
                    .unwrap_or(Value::Null)
            })
            .collect();
        let facts = DerivedFacts {
            column: params.into.clone(),
            source_columns: vec![params.column.clone()],
            rows: values.len(),
            nulls_produced: values.iter().filter(|v| v.is_null()).count(),
            partitions: None,
        };
        let column = build_column(&params.into, DataType::String, values)?;
        let output = put_column(table, &params.into, column)?;
        Ok(StepOutput::new(output, StepMetadata::Derived(facts)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::primitives::testing::{fail, records, run, table};
    use crate::core::types::ErrorCategory;

    fn names() -> Table {
        table(json!([
            {"name": "  ada   LOVELACE ", "state": "calif.", "n": 1},
            {"name": "grace hopper", "state": "New York", "n": 2},
            {"name": null, "state": "Texas", "n": 3}
        ]))
    }

    #[test]
    fn test_trim_all_string_columns_and_collapse() {
        let out = run(TrimWhitespace, &names(), json!({"collapse_internal": true}));
        assert_eq!(records(&out.table)[0]["name"], json!("ada LOVELACE"));
        match &out.metadata {
            StepMetadata::Values(facts) => {
                assert_eq!(facts.values_changed, 1);
                assert_eq!(facts.columns, vec!["name", "state"]);
            }
            other => panic!("unexpected metadata {:?}", other),
        }
    }

    #[test]
    fn test_trim_is_idempotent() {
        let once = run(TrimWhitespace, &names(), json!({"collapse_internal": true}));
        let twice = run(TrimWhitespace, &once.table, json!({"collapse_internal": true}));
        assert_eq!(once.table, twice.table);
    }

    #[test]
    fn test_trim_rejects_numeric_column() {
        let err = fail(TrimWhitespace, &names(), json!({"columns": ["n"]}));
        assert_eq!(err.category, ErrorCategory::ParameterError);
    }

    #[test]
    fn test_casing_modes() {
        assert_eq!(TextCase::Title.convert("ada LOVELACE o'neil"), "Ada Lovelace O'neil");
        assert_eq!(TextCase::Sentence.convert("hELLO World"), "Hello world");
        assert_eq!(TextCase::Upper.convert("abc"), "ABC");
    }

    #[test]
    fn test_casing_is_idempotent() {
        let input = names();
        let once = run(ChangeTextCasing, &input, json!({"column": "name", "case": "title"}));
        let twice = run(ChangeTextCasing, &once.table, json!({"column": "name", "case": "title"}));
        assert_eq!(once.table, twice.table);
    }

    #[test]
    fn test_casing_missing_column() {
        let err = fail(ChangeTextCasing, &names(), json!({"column": "missing_col", "case": "upper"}));
        assert!(err.message.contains("missing_col"));
    }

    #[test]
    fn test_standardize_counts_targets() {
        let out = run(
            StandardizeValues,
            &names(),
            json!({"column": "state", "mapping": {"CA": ["Calif."], "NY": ["new york"]}, "case_sensitive": false}),
        );
        let rows = records(&out.table);
        assert_eq!(rows[0]["state"], json!("CA"));
        assert_eq!(rows[1]["state"], json!("NY"));
        assert_eq!(rows[2]["state"], json!("Texas"));
        match &out.metadata {
            StepMetadata::Values(facts) => {
                assert_eq!(facts.changes_by_target.get("CA"), Some(&1));
                assert_eq!(facts.values_changed, 2);
            }
            other => panic!("unexpected metadata {:?}", other),
        }
    }

    #[test]
    fn test_standardize_conflicting_variant() {
        let err = fail(
            StandardizeValues,
            &names(),
            json!({"column": "state", "mapping": {"A": ["x"], "B": ["x"]}}),
        );
        assert_eq!(err.category, ErrorCategory::ParameterError);
    }

    #[test]
    fn test_replace_literal_does_not_expand_dollar() {
        let input = table(json!([{"price": "USD 5"}]));
        let out = run(
            ReplaceText,
            &input,
            json!({"column": "price", "pattern": "USD ", "replacement": "$"}),
        );
        assert_eq!(records(&out.table)[0]["price"], json!("$5"));
    }

    #[test]
    fn test_extract_group() {
        let input = table(json!([{"email": "a@x.com"}, {"email": "broken"}]));
        let out = run(
            ExtractPattern,
            &input,
            json!({"column": "email", "pattern": "@(.+)$", "into": "domain", "group": 1}),
        );
        let rows = records(&out.table);
        assert_eq!(rows[0]["domain"], json!("x.com"));
        assert_eq!(rows[1]["domain"], json!(null));
    }
}
