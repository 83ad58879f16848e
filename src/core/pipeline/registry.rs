use crate::core::error::AppError;
use crate::core::pipeline::primitive::{Primitive, PrimitiveDefinition, PrimitiveEntry};
use crate::core::pipeline::primitives;
use crate::core::types::PrimitiveCategory;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

/// One canonical prompt, flattened for training or evaluation sets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExamplePrompt {
    pub primitive: String,
    pub category: PrimitiveCategory,
    pub prompt: String,
    pub expected_params: Value,
}

/// Collects primitives during initialization.
#[derive(Debug)]
pub struct RegistryBuilder {
    entries: HashMap<String, PrimitiveEntry>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register a primitive after checking its definition.
    pub fn register<T: Primitive>(&mut self, primitive: T) -> Result<&mut Self, AppError> {
        let definition = primitive.describe();
        if self.entries.contains_key(definition.name) {
            return Err(AppError::duplicate_name(definition.name));
        }
        if definition.name != primitive.name() || definition.category != primitive.category() {
            return Err(AppError::definition(
                primitive.name(),
                "definition name and category must match the implementation",
            ));
        }
        definition.check()?;
        tracing::trace!(
            primitive = definition.name,
            category = %definition.category,
            "registered primitive"
        );
        let name = definition.name.to_string();
        self.entries
            .insert(name, PrimitiveEntry::new(definition, Arc::new(primitive)));
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn build(self) -> Registry {
        Registry {
            inner: Arc::new(self.entries),
        }
    }
}

/// Immutable primitive catalog shared by engines.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<HashMap<String, PrimitiveEntry>>,
}

impl Default for Registry {
    fn default() -> Self {
        RegistryBuilder::new().build()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("primitives", &self.list(None))
            .finish()
    }
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Registry holding the full built-in catalog.
    pub fn builtin() -> Result<Self, AppError> {
        let mut builder = RegistryBuilder::new();
        primitives::register_builtins(&mut builder)?;
        tracing::debug!(primitives = builder.len(), "built-in registry ready");
        Ok(builder.build())
    }

    pub fn get(&self, name: &str) -> Option<&PrimitiveEntry> {
        self.inner.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Primitive names in lexicographic order, optionally restricted to one category.
    pub fn list(&self, category: Option<PrimitiveCategory>) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .inner
            .values()
            .filter(|entry| category.map_or(true, |c| entry.category() == c))
            .map(PrimitiveEntry::name)
            .collect();
        names.sort_unstable();
        names
    }

    /// Definitions sorted by name.
    pub fn definitions(&self) -> Vec<&PrimitiveDefinition> {
        self.list(None)
            .into_iter()
            .filter_map(|name| self.get(name))
            .map(PrimitiveEntry::definition)
            .collect()
    }

    /// Categories that have at least one primitive, in declaration order.
    pub fn categories(&self) -> Vec<PrimitiveCategory> {
        PrimitiveCategory::ALL
            .iter()
            .copied()
            .filter(|category| self.inner.values().any(|e| e.category() == *category))
            .collect()
    }

    pub fn all_example_prompts(&self) -> Vec<ExamplePrompt> {
        self.definitions()
            .into_iter()
            .flat_map(|definition| {
                definition.examples.iter().map(move |example| ExamplePrompt {
                    primitive: definition.name.to_string(),
                    category: definition.category,
                    prompt: example.prompt.clone(),
                    expected_params: example.params.clone(),
                })
            })
            .collect()
    }

    /// Markdown reference of the catalog, grouped by category.
    pub fn export_documentation(&self) -> String {
        let mut doc = String::new();
        let _ = writeln!(doc, "# Primitive reference\n");
        let _ = writeln!(
            doc,
            "{} primitives in {} categories.\n",
            self.len(),
            self.categories().len()
        );
        for category in self.categories() {
            let _ = writeln!(doc, "## {} (`{}`)\n", category.title(), category);
            for name in self.list(Some(category)) {
                if let Some(entry) = self.get(name) {
                    render_definition(&mut doc, entry.definition());
                }
            }
        }
        doc
    }
}

fn render_definition(doc: &mut String, definition: &PrimitiveDefinition) {
    let _ = writeln!(doc, "### `{}`\n", definition.name);
    let _ = writeln!(doc, "{}\n", definition.description);
    if definition.params.is_empty() {
        let _ = writeln!(doc, "_No parameters._\n");
    } else {
        let _ = writeln!(doc, "| Parameter | Type | Required | Default | Description |");
        let _ = writeln!(doc, "|---|---|---|---|---|");
        for param in &definition.params {
            let _ = writeln!(
                doc,
                "| `{}` | {} | {} | {} | {} |",
                param.name,
                param.kind,
                if param.required { "yes" } else { "no" },
                param.default.map(|d| format!("`{}`", d)).unwrap_or_else(|| "-".to_string()),
                param.description.replace('|', "\\|"),
            );
        }
        let _ = writeln!(doc);
    }
    let _ = writeln!(doc, "Examples:\n");
    for example in &definition.examples {
        let _ = writeln!(doc, "- \"{}\"", example.prompt);
        let _ = writeln!(doc, "  `{}`", example.params);
    }
    let _ = writeln!(doc);
}
