//! Validation, identifier resolution, fragment generators, extensions and the
//! staged generation pipeline.
//!
//! This crate implements the core of the BEAST XML generator: the pre-flight
//! validator, the namespace resolver, one fragment generator per model
//! family, the extension registry, and the orchestrator that runs the 17
//! generation stages in order.

pub mod catalog;
pub mod context;
pub mod engine;
pub mod events;
pub mod extension;
pub mod extensions;
pub mod generators;
pub mod namespace;
pub mod validation;

pub use context::{GenerationContext, MintedParameter, ParameterFamily, Reference};
pub use engine::{BeastGenerator, GeneratedDocument, Stage};
pub use events::{EventEmitter, GenerationEvent};
pub use extension::{
    default_registry, Extension, ExtensionRegistry, InsertionHook, InsertionItem, InsertionPoint, NoInsertions,
};
pub use extensions::MarginalLikelihoodExtension;
pub use generators::StageInput;
pub use namespace::NamespaceResolver;
pub use validation::{validate, validate_or_raise, ConfigRule};
