//! MCMC proposal kernel descriptors.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorKind {
    Scale,
    ScaleAll,
    ScaleIndependently,
    RandomWalk,
    RandomWalkAbsorbing,
    RandomWalkReflecting,
    IntegerRandomWalk,
    UpDown,
    DeltaExchange,
    IntegerDeltaExchange,
    Swap,
    BitFlip,
    Uniform,
    IntegerUniform,
    SubtreeSlide,
    SubtreeLeap,
    NarrowExchange,
    WideExchange,
    WilsonBalding,
    SampleNonActive,
    ScaleWithIndicators,
    GmrfGibbs,
    SkygridGibbs,
    NodeReheight,
}

impl OperatorKind {
    /// Operators acting on a tree model rather than a parameter.
    pub fn is_tree_operator(&self) -> bool {
        matches!(
            self,
            OperatorKind::SubtreeSlide
                | OperatorKind::SubtreeLeap
                | OperatorKind::NarrowExchange
                | OperatorKind::WideExchange
                | OperatorKind::WilsonBalding
        )
    }
}

/// One proposal kernel. Targets are generated identifiers (`kappa`,
/// `CP1.mu`, `treeModel`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operator {
    pub kind: OperatorKind,
    #[serde(default)]
    pub parameter: Option<String>,
    #[serde(default)]
    pub parameter2: Option<String>,
    #[serde(default)]
    pub tree_model: Option<String>,
    /// Distribution model for `sample_non_active`.
    #[serde(default)]
    pub distribution: Option<String>,
    #[serde(default = "default_tuning")]
    pub tuning: f64,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_enabled")]
    pub auto_optimize: bool,
    /// Site counts for a weighted delta exchange.
    #[serde(default)]
    pub parameter_weights: Option<Vec<u64>>,
}

fn default_tuning() -> f64 {
    0.75
}

fn default_weight() -> f64 {
    1.0
}

fn default_enabled() -> bool {
    true
}

impl Operator {
    pub fn on_parameter(kind: OperatorKind, parameter: impl Into<String>, tuning: f64, weight: f64) -> Self {
        Self {
            kind,
            parameter: Some(parameter.into()),
            parameter2: None,
            tree_model: None,
            distribution: None,
            tuning,
            weight,
            enabled: true,
            auto_optimize: true,
            parameter_weights: None,
        }
    }

    pub fn on_tree(kind: OperatorKind, tree_model: impl Into<String>, tuning: f64, weight: f64) -> Self {
        Self {
            kind,
            parameter: None,
            parameter2: None,
            tree_model: Some(tree_model.into()),
            distribution: None,
            tuning,
            weight,
            enabled: true,
            auto_optimize: true,
            parameter_weights: None,
        }
    }

    pub fn with_second(mut self, parameter2: impl Into<String>) -> Self {
        self.parameter2 = Some(parameter2.into());
        self
    }

    /// Zero-weight and disabled operators are skipped.
    pub fn is_active(&self) -> bool {
        self.enabled && self.weight > 0.0
    }
}
