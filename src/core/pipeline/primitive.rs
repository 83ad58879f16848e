use crate::core::error::AppError;
use crate::core::pipeline::metadata::StepMetadata;
use crate::core::pipeline::params;
use crate::core::table::Table;
use crate::core::types::PrimitiveCategory;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Minimum number of canonical examples every definition carries.
pub const MIN_EXAMPLES: usize = 3;

/// Shape of a declared parameter, used for documentation and registry checks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Column,
    Columns,
    String,
    Integer,
    Number,
    Boolean,
    Choice(Vec<&'static str>),
    Mapping,
    Value,
    Values,
    Table,
    Tables,
    Object,
}

impl std::fmt::Display for ParamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamKind::Column => f.write_str("column"),
            ParamKind::Columns => f.write_str("column list"),
            ParamKind::String => f.write_str("string"),
            ParamKind::Integer => f.write_str("integer"),
            ParamKind::Number => f.write_str("number"),
            ParamKind::Boolean => f.write_str("boolean"),
            ParamKind::Choice(options) => write!(f, "one of {}", options.join(" / ")),
            ParamKind::Mapping => f.write_str("mapping"),
            ParamKind::Value => f.write_str("value"),
            ParamKind::Values => f.write_str("value list"),
            ParamKind::Table => f.write_str("table"),
            ParamKind::Tables => f.write_str("table list"),
            ParamKind::Object => f.write_str("object"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<&'static str>,
}

impl ParamSpec {
    pub fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            description,
            default: None,
        }
    }

    pub fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: false,
            description,
            default: None,
        }
    }

    pub fn default_value(mut self, default: &'static str) -> Self {
        self.default = Some(default);
        self
    }
}

/// A canonical natural-language request and the params it should translate to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExampleSpec {
    pub prompt: String,
    pub params: Value,
}

/// Immutable description of a primitive: contract, documentation and examples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrimitiveDefinition {
    pub name: &'static str,
    pub category: PrimitiveCategory,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
    pub examples: Vec<ExampleSpec>,
}

impl PrimitiveDefinition {
    pub fn new(
        name: &'static str,
        category: PrimitiveCategory,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            category,
            description,
            params: Vec::new(),
            examples: Vec::new(),
        }
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn example<T: Into<String>>(mut self, prompt: T, params: Value) -> Self {
        self.examples.push(ExampleSpec {
            prompt: prompt.into(),
            params,
        });
        self
    }

    pub fn param_spec(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Registry invariant: named, categorized, documented, and at least three consistent examples.
    pub fn check(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::definition(self.name, "name must not be empty"));
        }
        if self.category.as_str().is_empty() {
            return Err(AppError::definition(self.name, "category must not be empty"));
        }
        if self.description.trim().is_empty() {
            return Err(AppError::definition(self.name, "description must not be empty"));
        }
        let mut seen = HashSet::new();
        for spec in &self.params {
            if !seen.insert(spec.name) {
                return Err(AppError::definition(
                    self.name,
                    format!("parameter '{}' is declared twice", spec.name),
                ));
            }
        }
        if self.examples.len() < MIN_EXAMPLES {
            return Err(AppError::definition(
                self.name,
                format!(
                    "{} canonical examples found; at least {} are required",
                    self.examples.len(),
                    MIN_EXAMPLES
                ),
            ));
        }
        for example in &self.examples {
            let Some(map) = example.params.as_object() else {
                return Err(AppError::definition(
                    self.name,
                    format!("example '{}' params must be an object", example.prompt),
                ));
            };
            if let Some(key) = map.keys().find(|key| self.param_spec(key).is_none()) {
                return Err(AppError::definition(
                    self.name,
                    format!("example '{}' uses undeclared parameter '{}'", example.prompt, key),
                ));
            }
            if let Some(spec) = self
                .params
                .iter()
                .find(|spec| spec.required && !map.contains_key(spec.name))
            {
                return Err(AppError::definition(
                    self.name,
                    format!(
                        "example '{}' is missing required parameter '{}'",
                        example.prompt, spec.name
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// Output of a successful primitive run.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    pub table: Table,
    pub metadata: StepMetadata,
}

impl StepOutput {
    pub fn new(table: Table, metadata: StepMetadata) -> Self {
        Self { table, metadata }
    }
}

/// Capability interface implemented by every catalog entry.
pub trait Primitive: Send + Sync + 'static {
    /// Primitive name used in operation descriptors.
    fn name(&self) -> &'static str;

    fn category(&self) -> PrimitiveCategory;

    /// Contract, documentation and canonical examples.
    fn describe(&self) -> PrimitiveDefinition;

    /// Validate params against the contract and the input table schema.
    fn validate(&self, params: &Value, table: &Table) -> Result<(), AppError>;

    /// Validate, then produce a new table and metadata. Never mutates `table`.
    fn execute(&self, table: &Table, params: &Value) -> Result<StepOutput, AppError>;
}

/// Primitive with an explicit, typed parameter structure.
///
/// Implementors get [`Primitive`] for free: validation is a typed parse of the generic
/// params followed by [`TypedPrimitive::check`], and execution always validates first.
pub trait TypedPrimitive: Send + Sync + 'static {
    type Params: DeserializeOwned;

    const NAME: &'static str;
    const CATEGORY: PrimitiveCategory;

    fn describe(&self) -> PrimitiveDefinition;

    /// Schema checks that need the input table (column references, types, ranges).
    fn check(&self, params: &Self::Params, table: &Table) -> Result<(), AppError>;

    fn apply(&self, table: &Table, params: Self::Params) -> Result<StepOutput, AppError>;
}

impl<T: TypedPrimitive> Primitive for T {
    fn name(&self) -> &'static str {
        T::NAME
    }

    fn category(&self) -> PrimitiveCategory {
        T::CATEGORY
    }

    fn describe(&self) -> PrimitiveDefinition {
        TypedPrimitive::describe(self)
    }

    fn validate(&self, params: &Value, table: &Table) -> Result<(), AppError> {
        let parsed: T::Params = params::parse(T::NAME, params)?;
        self.check(&parsed, table)
    }

    fn execute(&self, table: &Table, params: &Value) -> Result<StepOutput, AppError> {
        let parsed: T::Params = params::parse(T::NAME, params)?;
        self.check(&parsed, table)?;
        self.apply(table, parsed)
    }
}

/// Registered definition plus its implementation.
#[derive(Clone)]
pub struct PrimitiveEntry {
    definition: Arc<PrimitiveDefinition>,
    implementation: Arc<dyn Primitive>,
}

impl PrimitiveEntry {
    pub(crate) fn new(definition: PrimitiveDefinition, implementation: Arc<dyn Primitive>) -> Self {
        Self {
            definition: Arc::new(definition),
            implementation,
        }
    }

    pub fn name(&self) -> &'static str {
        self.definition.name
    }

    pub fn category(&self) -> PrimitiveCategory {
        self.definition.category
    }

    pub fn definition(&self) -> &PrimitiveDefinition {
        &self.definition
    }

    pub fn implementation(&self) -> &dyn Primitive {
        self.implementation.as_ref()
    }
}

impl std::fmt::Debug for PrimitiveEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimitiveEntry")
            .field("name", &self.definition.name)
            .field("category", &self.definition.category)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> PrimitiveDefinition {
        PrimitiveDefinition::new("demo", PrimitiveCategory::RowSelection, "Demo primitive")
            .param(ParamSpec::required("column", ParamKind::Column, "Column"))
            .param(ParamSpec::optional("flag", ParamKind::Boolean, "Flag"))
    }

    #[test]
    fn test_definition_requires_three_examples() {
        let def = base()
            .example("one", json!({"column": "a"}))
            .example("two", json!({"column": "b"}));
        assert!(def.check().is_err());
        let def = def.example("three", json!({"column": "c", "flag": true}));
        assert!(def.check().is_ok());
    }

    #[test]
    fn test_definition_rejects_undeclared_example_param() {
        let def = base()
            .example("one", json!({"column": "a"}))
            .example("two", json!({"column": "b"}))
            .example("three", json!({"column": "c", "colour": 1}));
        let err = def.check().unwrap_err();
        assert!(err.message.contains("colour"));
    }

    #[test]
    fn test_definition_rejects_example_missing_required_param() {
        let def = base()
            .example("one", json!({"column": "a"}))
            .example("two", json!({"column": "b"}))
            .example("three", json!({"flag": false}));
        let err = def.check().unwrap_err();
        assert!(err.message.contains("missing required parameter 'column'"));
    }
}
