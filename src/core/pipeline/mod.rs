//! Deterministic transformation pipelines over [`Table`](crate::core::table::Table)s.
//!
//! A [`Registry`] holds every named [`Primitive`]; an [`Engine`] resolves each
//! [`Operation`] of a [`Pipeline`] against it and runs the steps in order, halting at the
//! first failure.

pub mod engine;
pub mod metadata;
pub mod operation;
pub mod params;
pub mod primitive;
pub mod primitives;
pub mod registry;

pub use engine::{Engine, ExecutionResult, StepOutcome, StepResult};
pub use metadata::{
    ColumnFacts, ConversionFacts, DerivedFacts, JoinFacts, QualityIssue, QualityReport,
    Rename, ReshapeFacts, RowFacts, Severity, StepMetadata, ValueFacts,
};
pub use operation::{Operation, Pipeline};
pub use primitive::{
    ExampleSpec, ParamKind, ParamSpec, Primitive, PrimitiveDefinition, PrimitiveEntry,
    StepOutput, TypedPrimitive,
};
pub use registry::{ExamplePrompt, Registry, RegistryBuilder};
