//! Substitution, clock, tree and tree-prior model records.
//!
//! Every model family is a closed set of kinds. Kinds the generator cannot
//! express are still representable here so the configuration round-trips;
//! the fragment generators reject them explicitly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::DataType;
use crate::parameter::ParameterOverride;

// ---------------------------------------------------------------------------
// Substitution models
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubstitutionKind {
    Jc,
    Hky,
    Tn93,
    Gtr,
    AminoAcid {
        #[serde(default = "default_aa_matrix")]
        matrix: String,
    },
    BinarySimple,
    BinaryCovarion,
    BinaryDollo,
}

fn default_aa_matrix() -> String {
    "WAG".to_string()
}

impl SubstitutionKind {
    /// The alignment data type this kind applies to.
    pub fn data_type(&self) -> DataType {
        match self {
            SubstitutionKind::Jc
            | SubstitutionKind::Hky
            | SubstitutionKind::Tn93
            | SubstitutionKind::Gtr => DataType::Nucleotide,
            SubstitutionKind::AminoAcid { .. } => DataType::AminoAcid,
            SubstitutionKind::BinarySimple
            | SubstitutionKind::BinaryCovarion
            | SubstitutionKind::BinaryDollo => DataType::Binary,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SubstitutionKind::Jc => "JC",
            SubstitutionKind::Hky => "HKY",
            SubstitutionKind::Tn93 => "TN93",
            SubstitutionKind::Gtr => "GTR",
            SubstitutionKind::AminoAcid { .. } => "amino acid",
            SubstitutionKind::BinarySimple => "binary simple",
            SubstitutionKind::BinaryCovarion => "binary covarion",
            SubstitutionKind::BinaryDollo => "stochastic Dollo",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyPolicy {
    #[default]
    Estimated,
    Empirical,
    AllEqual,
}

/// How the three codon positions of a nucleotide partition are split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodonPartitioning {
    #[default]
    None,
    /// Positions 1 and 2 merged, position 3 on its own.
    Positions112,
    Positions123,
}

impl CodonPartitioning {
    /// Number of position groups the partition is split into.
    pub fn partition_count(&self) -> usize {
        match self {
            CodonPartitioning::None => 1,
            CodonPartitioning::Positions112 => 2,
            CodonPartitioning::Positions123 => 3,
        }
    }

    pub fn is_split(&self) -> bool {
        self.partition_count() > 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubstitutionModel {
    pub name: String,
    pub kind: SubstitutionKind,
    #[serde(default)]
    pub frequencies: FrequencyPolicy,
    #[serde(default)]
    pub gamma: bool,
    #[serde(default = "default_gamma_categories")]
    pub gamma_categories: u32,
    #[serde(default)]
    pub invariant_sites: bool,
    #[serde(default)]
    pub codon: CodonPartitioning,
    #[serde(default = "default_true")]
    pub unlinked_substitution: bool,
    #[serde(default = "default_true")]
    pub unlinked_heterogeneity: bool,
    #[serde(default)]
    pub unlinked_frequencies: bool,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterOverride>,
}

fn default_gamma_categories() -> u32 {
    4
}

fn default_true() -> bool {
    true
}

impl SubstitutionModel {
    pub fn new(name: impl Into<String>, kind: SubstitutionKind) -> Self {
        Self {
            name: name.into(),
            kind,
            frequencies: FrequencyPolicy::default(),
            gamma: false,
            gamma_categories: default_gamma_categories(),
            invariant_sites: false,
            codon: CodonPartitioning::None,
            unlinked_substitution: true,
            unlinked_heterogeneity: true,
            unlinked_frequencies: false,
            parameters: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Clock models
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelaxedDistribution {
    Lognormal,
    Gamma,
    Exponential,
    Cauchy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClockKind {
    Strict,
    Uncorrelated {
        distribution: RelaxedDistribution,
        #[serde(default)]
        continuous_quantile: bool,
    },
    RandomLocal,
    FixedLocal,
    Autocorrelated,
    MixedEffects,
    ShrinkageLocal,
    Hmc,
}

impl ClockKind {
    pub fn name(&self) -> &'static str {
        match self {
            ClockKind::Strict => "strict clock",
            ClockKind::Uncorrelated { .. } => "uncorrelated relaxed clock",
            ClockKind::RandomLocal => "random local clock",
            ClockKind::FixedLocal => "fixed local clock",
            ClockKind::Autocorrelated => "autocorrelated relaxed clock",
            ClockKind::MixedEffects => "mixed effects clock",
            ClockKind::ShrinkageLocal => "shrinkage local clock",
            ClockKind::Hmc => "HMC relaxed clock",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockModel {
    pub name: String,
    pub kind: ClockKind,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterOverride>,
}

impl ClockModel {
    pub fn new(name: impl Into<String>, kind: ClockKind) -> Self {
        Self {
            name: name.into(),
            kind,
            parameters: BTreeMap::new(),
        }
    }
}

/// A set of clock models whose rates are constrained together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockGroup {
    pub name: String,
    pub clock_models: Vec<String>,
    /// When set, the member rates are scaled to this weighted mean.
    #[serde(default)]
    pub fix_mean: Option<f64>,
}

// ---------------------------------------------------------------------------
// Tree models
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StartingTree {
    Random,
    Upgma,
    User {
        #[serde(default)]
        newick: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ploidy {
    #[default]
    AutosomalNuclear,
    X,
    Y,
    Mitochondrial,
}

impl Ploidy {
    /// Effective population size multiplier for gene trees.
    pub fn value(&self) -> f64 {
        match self {
            Ploidy::AutosomalNuclear => 2.0,
            Ploidy::X => 1.5,
            Ploidy::Y | Ploidy::Mitochondrial => 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeModel {
    pub name: String,
    #[serde(default = "default_starting_tree")]
    pub starting_tree: StartingTree,
    #[serde(default)]
    pub ploidy: Ploidy,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterOverride>,
}

fn default_starting_tree() -> StartingTree {
    StartingTree::Random
}

impl TreeModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            starting_tree: StartingTree::Random,
            ploidy: Ploidy::default(),
            parameters: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tree priors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreePriorKind {
    Constant,
    Exponential,
    Logistic,
    Expansion,
    Skyline {
        #[serde(default = "default_skyline_groups")]
        groups: usize,
        #[serde(default)]
        linear: bool,
    },
    Skyride {
        #[serde(default = "default_true")]
        time_aware: bool,
    },
    Skygrid {
        #[serde(default = "default_grid_points")]
        grid_points: usize,
        #[serde(default)]
        cutoff: Option<f64>,
    },
    ExtendedSkyline {
        #[serde(default)]
        linear: bool,
    },
    Yule,
    YuleCalibration,
    BirthDeath,
    BirthDeathIncompleteSampling,
}

fn default_skyline_groups() -> usize {
    10
}

fn default_grid_points() -> usize {
    50
}

impl TreePriorKind {
    pub fn name(&self) -> &'static str {
        match self {
            TreePriorKind::Constant => "constant size",
            TreePriorKind::Exponential => "exponential growth",
            TreePriorKind::Logistic => "logistic growth",
            TreePriorKind::Expansion => "expansion",
            TreePriorKind::Skyline { .. } => "Bayesian skyline",
            TreePriorKind::Skyride { .. } => "GMRF Skyride",
            TreePriorKind::Skygrid { .. } => "Skygrid",
            TreePriorKind::ExtendedSkyline { .. } => "extended Bayesian skyline",
            TreePriorKind::Yule => "Yule",
            TreePriorKind::YuleCalibration => "calibrated Yule",
            TreePriorKind::BirthDeath => "birth-death",
            TreePriorKind::BirthDeathIncompleteSampling => "birth-death incomplete sampling",
        }
    }

    /// Coalescent priors with a parametric demographic model element.
    pub fn has_demographic_model(&self) -> bool {
        matches!(
            self,
            TreePriorKind::Constant
                | TreePriorKind::Exponential
                | TreePriorKind::Logistic
                | TreePriorKind::Expansion
        )
    }

    pub fn is_speciation(&self) -> bool {
        matches!(
            self,
            TreePriorKind::Yule
                | TreePriorKind::YuleCalibration
                | TreePriorKind::BirthDeath
                | TreePriorKind::BirthDeathIncompleteSampling
        )
    }

    /// GMRF priors, which want the log-scale optimization schedule.
    pub fn is_gmrf(&self) -> bool {
        matches!(self, TreePriorKind::Skyride { .. } | TreePriorKind::Skygrid { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameterization {
    #[default]
    GrowthRate,
    DoublingTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreePrior {
    pub name: String,
    pub tree_model: String,
    pub kind: TreePriorKind,
    #[serde(default)]
    pub parameterization: Parameterization,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterOverride>,
}

impl TreePrior {
    pub fn new(name: impl Into<String>, tree_model: impl Into<String>, kind: TreePriorKind) -> Self {
        Self {
            name: name.into(),
            tree_model: tree_model.into(),
            kind,
            parameterization: Parameterization::default(),
            parameters: BTreeMap::new(),
        }
    }
}
