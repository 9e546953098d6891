//! Shared types and errors for the BEAST XML generator.
//!
//! This crate provides the foundational types used across all other beastgen crates:
//! - `GenerationError`: unified error taxonomy for the generation pipeline
//! - `ValidationError` / `Category`: pre-flight diagnostics routed by configuration area
//! - `AnalysisConfig`: the read-only description of one analysis
//! - `Parameter` / `PriorKind`: scalar and vector model parameters with their priors

pub mod config;
pub mod models;
pub mod operator;
pub mod parameter;

pub use config::{
    Alignment, AnalysisConfig, DataType, DateDirection, ExtensionOptions, SPECIES_TRAIT,
    MarginalLikelihoodOptions, McmcOptions, Partition, PathScheme, PopulationSizeModel, Sequence,
    SpeciesOptions, SpeciesTreePrior, Taxon, TaxonSet, TimeUnits, TipDate,
};
pub use models::{
    ClockGroup, ClockKind, ClockModel, CodonPartitioning, FrequencyPolicy, Parameterization,
    Ploidy, RelaxedDistribution, StartingTree, SubstitutionKind, SubstitutionModel, TreeModel,
    TreePrior, TreePriorKind,
};
pub use operator::{Operator, OperatorKind};
pub use parameter::{Bounds, Parameter, ParameterOverride, PriorKind};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Validation diagnostics
// ---------------------------------------------------------------------------

/// Configuration area a diagnostic belongs to, so a caller can route it to
/// the right editing surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    DataPartitions,
    Taxa,
    TaxonSets,
    TipDates,
    Traits,
    SiteModels,
    ClockModels,
    Trees,
    TreePriors,
    Priors,
    Operators,
    Mcmc,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::DataPartitions => "data_partitions",
            Category::Taxa => "taxa",
            Category::TaxonSets => "taxon_sets",
            Category::TipDates => "tip_dates",
            Category::Traits => "traits",
            Category::SiteModels => "site_models",
            Category::ClockModels => "clock_models",
            Category::Trees => "trees",
            Category::TreePriors => "tree_priors",
            Category::Priors => "priors",
            Category::Operators => "operators",
            Category::Mcmc => "mcmc",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single pre-flight failure. Plain data: the validator returns a list of
/// these rather than raising.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub category: Category,
    pub message: String,
}

impl ValidationError {
    pub fn new(category: Category, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.category, self.message)
    }
}

// ---------------------------------------------------------------------------
// Generation errors
// ---------------------------------------------------------------------------

/// Unified error type for the generation pipeline.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    // === Configuration-driven ===
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("{description}: {message}")]
    StageFailed {
        stage: String,
        description: String,
        message: String,
        category: Option<Category>,
    },

    #[error("Configuration validation failed: {}", join_messages(.0))]
    Validation(Vec<ValidationError>),

    // === Document builder defects ===
    #[error("Mismatched closing tag: expected </{expected}>, found </{found}>")]
    TagMismatch { expected: String, found: String },

    #[error("Document finished with unclosed tags: {}", .0.join(", "))]
    UnclosedTags(Vec<String>),

    #[error("Attempted to close </{0}> with no open tag")]
    EmptyDocument(String),

    #[error("Generated document declares these ids more than once: {}", .0.join(", "))]
    DuplicateIds(Vec<String>),

    #[error("Generated document references undeclared ids: {}", .0.join(", "))]
    UnresolvedReferences(Vec<String>),

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

fn join_messages(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

impl GenerationError {
    /// Returns `true` for document builder defects: a fragment generator
    /// broke the tag discipline or the id bookkeeping. These are never
    /// wrapped as configuration errors.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            GenerationError::TagMismatch { .. }
                | GenerationError::UnclosedTags(_)
                | GenerationError::EmptyDocument(_)
                | GenerationError::DuplicateIds(_)
                | GenerationError::UnresolvedReferences(_)
        )
    }

    /// The configuration area the error points at, when one is known.
    pub fn category(&self) -> Option<Category> {
        match self {
            GenerationError::StageFailed { category, .. } => *category,
            GenerationError::Validation(errors) => errors.first().map(|e| e.category),
            _ => None,
        }
    }

    /// Shorthand for an unsupported kind/option combination.
    pub fn unsupported(message: impl Into<String>) -> Self {
        GenerationError::UnsupportedConfiguration(message.into())
    }

    /// Shorthand for an internally inconsistent configuration.
    pub fn invalid(message: impl Into<String>) -> Self {
        GenerationError::InvalidConfiguration(message.into())
    }
}

/// A convenience alias for `Result<T, GenerationError>`.
pub type Result<T> = std::result::Result<T, GenerationError>;
