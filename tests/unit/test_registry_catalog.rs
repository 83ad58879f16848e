use serde_json::json;
use std::collections::HashSet;
use tidyflow::core::pipeline::primitive::MIN_EXAMPLES;
use tidyflow::core::pipeline::primitives::rows::FilterRows;
use tidyflow::core::pipeline::{Primitive, Registry, RegistryBuilder};
use tidyflow::core::types::{ErrorCategory, PrimitiveCategory};

#[test]
fn test_builtin_catalog_size_and_categories() {
    let registry = Registry::builtin().unwrap();

    assert_eq!(registry.len(), 49);
    assert_eq!(registry.categories(), PrimitiveCategory::ALL.to_vec());

    let counts: Vec<usize> = PrimitiveCategory::ALL
        .iter()
        .map(|category| registry.list(Some(*category)).len())
        .collect();
    assert_eq!(counts, vec![6, 6, 5, 3, 5, 13, 3, 3, 5]);
}

#[test]
fn test_every_definition_satisfies_the_registry_invariant() {
    let registry = Registry::builtin().unwrap();

    for definition in registry.definitions() {
        assert!(!definition.category.as_str().is_empty());
        assert!(!definition.description.is_empty(), "{}", definition.name);
        assert!(
            definition.examples.len() >= MIN_EXAMPLES,
            "{} has {} examples",
            definition.name,
            definition.examples.len()
        );
        for example in &definition.examples {
            let params = example.params.as_object().unwrap();
            for key in params.keys() {
                assert!(
                    definition.param_spec(key).is_some(),
                    "{} example uses undeclared '{}'",
                    definition.name,
                    key
                );
            }
        }
    }
}

#[test]
fn test_list_is_sorted_and_unique() {
    let registry = Registry::builtin().unwrap();
    let names = registry.list(None);

    let mut sorted = names.clone();
    sorted.sort_unstable();
    assert_eq!(names, sorted);
    assert_eq!(names.iter().collect::<HashSet<_>>().len(), names.len());
    assert_eq!(
        registry.list(Some(PrimitiveCategory::Joins)),
        vec!["join_tables", "lookup", "union_tables"]
    );
}

#[test]
fn test_example_prompts_cover_every_primitive() {
    let registry = Registry::builtin().unwrap();
    let prompts = registry.all_example_prompts();

    let covered: HashSet<&str> = prompts.iter().map(|p| p.primitive.as_str()).collect();
    assert_eq!(covered.len(), registry.len());
    assert!(prompts.len() >= registry.len() * MIN_EXAMPLES);

    let dedup = prompts
        .iter()
        .find(|p| p.primitive == "remove_duplicates" && p.expected_params == json!({}))
        .unwrap();
    assert_eq!(dedup.category, PrimitiveCategory::RowSelection);
}

#[test]
fn test_documentation_lists_every_primitive() {
    let registry = Registry::builtin().unwrap();
    let doc = registry.export_documentation();

    assert!(doc.starts_with("# Primitive reference"));
    for name in registry.list(None) {
        assert!(doc.contains(&format!("### `{}`", name)), "{} missing", name);
    }
    for category in PrimitiveCategory::ALL {
        assert!(doc.contains(category.title()));
    }
}

#[test]
fn test_duplicate_registration_fails() {
    let mut builder = RegistryBuilder::new();
    builder.register(FilterRows).unwrap();

    let err = builder.register(FilterRows).unwrap_err();
    assert_eq!(err.category, ErrorCategory::DuplicateNameError);
    assert_eq!(builder.len(), 1);
}

#[test]
fn test_get_returns_definition_and_implementation() {
    let registry = Registry::builtin().unwrap();

    let entry = registry.get("pivot_table").unwrap();
    assert_eq!(entry.name(), "pivot_table");
    assert_eq!(entry.category(), PrimitiveCategory::GroupingReshaping);
    assert_eq!(entry.implementation().name(), "pivot_table");
    assert!(entry.definition().param_spec("aggfunc").unwrap().required);
    assert!(registry.get("pivot").is_none());
}
