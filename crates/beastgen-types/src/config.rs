//! The analysis configuration: everything the generator reads.
//!
//! Collections that influence document order are `Vec`s (configuration order)
//! or `BTreeMap`s (sorted), never hash maps.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    ClockGroup, ClockModel, SubstitutionModel, TreeModel, TreePrior, TreePriorKind,
};
use crate::operator::Operator;
use crate::parameter::{ParameterOverride, PriorKind};
use crate::Result;

// ---------------------------------------------------------------------------
// Taxa
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnits {
    #[default]
    Years,
    Months,
    Days,
}

impl TimeUnits {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnits::Years => "years",
            TimeUnits::Months => "months",
            TimeUnits::Days => "days",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateDirection {
    #[default]
    Forwards,
    Backwards,
}

impl DateDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            DateDirection::Forwards => "forwards",
            DateDirection::Backwards => "backwards",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TipDate {
    pub value: f64,
    #[serde(default)]
    pub direction: DateDirection,
    #[serde(default)]
    pub units: TimeUnits,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Taxon {
    pub id: String,
    #[serde(default)]
    pub date: Option<TipDate>,
    /// Trait values keyed by trait name. `species` drives the multispecies
    /// coalescent.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Taxon {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            date: None,
            attributes: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonSet {
    pub id: String,
    pub taxa: Vec<String>,
    #[serde(default)]
    pub monophyletic: bool,
    #[serde(default)]
    pub include_stem: bool,
    /// Tree model the set's statistics attach to; the first tree model when absent.
    #[serde(default)]
    pub tree_model: Option<String>,
    /// Time prior on the most recent common ancestor.
    #[serde(default)]
    pub calibration: Option<PriorKind>,
}

impl TaxonSet {
    pub fn new(id: impl Into<String>, taxa: &[&str]) -> Self {
        Self {
            id: id.into(),
            taxa: taxa.iter().map(|t| t.to_string()).collect(),
            monophyletic: false,
            include_stem: false,
            tree_model: None,
            calibration: None,
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_some()
    }
}

// ---------------------------------------------------------------------------
// Alignments and partitions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Nucleotide,
    AminoAcid,
    Binary,
    Microsatellite,
}

impl DataType {
    /// Name used by the `dataType` attribute.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Nucleotide => "nucleotide",
            DataType::AminoAcid => "amino acid",
            DataType::Binary => "binary",
            DataType::Microsatellite => "microsatellite",
        }
    }

    /// Number of character states.
    pub fn state_count(&self) -> usize {
        match self {
            DataType::Nucleotide => 4,
            DataType::AminoAcid => 20,
            DataType::Binary => 2,
            DataType::Microsatellite => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    pub taxon: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alignment {
    pub id: String,
    pub data_type: DataType,
    pub sequences: Vec<Sequence>,
}

impl Alignment {
    /// Number of sites (length of the first sequence).
    pub fn site_count(&self) -> usize {
        self.sequences.first().map(|s| s.data.chars().count()).unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    pub name: String,
    pub alignment: String,
    /// 1-based first site.
    #[serde(default)]
    pub from: Option<usize>,
    /// 1-based last site, inclusive.
    #[serde(default)]
    pub to: Option<usize>,
    #[serde(default)]
    pub every: Option<usize>,
    pub substitution_model: String,
    pub clock_model: String,
    pub tree_model: String,
}

impl Partition {
    pub fn new(
        name: impl Into<String>,
        alignment: impl Into<String>,
        substitution_model: impl Into<String>,
        clock_model: impl Into<String>,
        tree_model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            alignment: alignment.into(),
            from: None,
            to: None,
            every: None,
            substitution_model: substitution_model.into(),
            clock_model: clock_model.into(),
            tree_model: tree_model.into(),
        }
    }

    /// Sites this partition covers in an alignment of `alignment_sites` sites.
    pub fn site_count(&self, alignment_sites: usize) -> usize {
        let from = self.from.unwrap_or(1).max(1);
        let to = self.to.unwrap_or(alignment_sites).min(alignment_sites);
        if to < from {
            return 0;
        }
        let every = self.every.unwrap_or(1).max(1);
        (to - from) / every + 1
    }
}

// ---------------------------------------------------------------------------
// Species, MCMC and extension options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PopulationSizeModel {
    #[default]
    PiecewiseLinear,
    Constant,
    ContinuousConstant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeciesTreePrior {
    #[default]
    Yule,
    BirthDeath,
}

/// Multispecies coalescent settings. Present means enabled.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeciesOptions {
    pub population_size_model: PopulationSizeModel,
    pub tree_prior: SpeciesTreePrior,
    /// Sets of species names, used for species-tree statistics.
    pub species_sets: Vec<TaxonSet>,
    pub parameters: BTreeMap<String, ParameterOverride>,
}

pub const SPECIES_TRAIT: &str = "species";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct McmcOptions {
    pub chain_length: u64,
    pub log_every: u64,
    pub echo_every: u64,
    pub file_name_stem: String,
    pub log_file_name: Option<String>,
    pub sample_prior_only: bool,
    pub auto_optimize: bool,
    pub operator_analysis: bool,
    pub allow_overwrite_log: bool,
    pub units: TimeUnits,
    /// Provenance timestamp written into the header comment. The generator
    /// never reads a clock itself.
    pub generated_at: Option<DateTime<Utc>>,
}

impl Default for McmcOptions {
    fn default() -> Self {
        Self {
            chain_length: 10_000_000,
            log_every: 1000,
            echo_every: 1000,
            file_name_stem: "beast".to_string(),
            log_file_name: None,
            sample_prior_only: false,
            auto_optimize: true,
            operator_analysis: false,
            allow_overwrite_log: false,
            units: TimeUnits::Years,
            generated_at: None,
        }
    }
}

impl McmcOptions {
    pub fn log_file_name(&self) -> String {
        self.log_file_name
            .clone()
            .unwrap_or_else(|| format!("{}.log", self.file_name_stem))
    }

    /// Tree log file for a tree model with the given id prefix.
    pub fn tree_file_name(&self, prefix: &str) -> String {
        format!("{}.{}trees", self.file_name_stem, prefix)
    }

    pub fn operator_analysis_file_name(&self) -> String {
        format!("{}.ops", self.file_name_stem)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathScheme {
    #[default]
    BetaQuantile,
    GeometricQuantile,
    Linear,
}

impl PathScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathScheme::BetaQuantile => "betaquantile",
            PathScheme::GeometricQuantile => "geometricquantile",
            PathScheme::Linear => "linear",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarginalLikelihoodOptions {
    pub chain_length: u64,
    pub path_steps: u32,
    pub path_scheme: PathScheme,
    pub alpha: f64,
    pub log_every: u64,
    pub file_name: Option<String>,
    pub print_operator_analysis: bool,
}

impl Default for MarginalLikelihoodOptions {
    fn default() -> Self {
        Self {
            chain_length: 1_000_000,
            path_steps: 100,
            path_scheme: PathScheme::BetaQuantile,
            alpha: 0.3,
            log_every: 1000,
            file_name: None,
            print_operator_analysis: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionOptions {
    pub marginal_likelihood: Option<MarginalLikelihoodOptions>,
}

// ---------------------------------------------------------------------------
// AnalysisConfig
// ---------------------------------------------------------------------------

/// Read-only description of one analysis.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub taxa: Vec<Taxon>,
    pub taxon_sets: Vec<TaxonSet>,
    pub alignments: Vec<Alignment>,
    pub partitions: Vec<Partition>,
    pub substitution_models: Vec<SubstitutionModel>,
    pub clock_models: Vec<ClockModel>,
    pub clock_groups: Vec<ClockGroup>,
    pub tree_models: Vec<TreeModel>,
    pub tree_priors: Vec<TreePrior>,
    /// Explicit operator schedule. `None` derives a default schedule from the
    /// generated parameters.
    pub operators: Option<Vec<Operator>>,
    pub species: Option<SpeciesOptions>,
    pub mcmc: McmcOptions,
    pub extensions: ExtensionOptions,
}

impl AnalysisConfig {
    /// Serialize this configuration to JSON and write it to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Read a configuration from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        tracing::debug!(path = %path.display(), taxa = config.taxa.len(), "Configuration loaded");
        Ok(config)
    }

    // --- lookups ---

    pub fn taxon(&self, id: &str) -> Option<&Taxon> {
        self.taxa.iter().find(|t| t.id == id)
    }

    pub fn alignment(&self, id: &str) -> Option<&Alignment> {
        self.alignments.iter().find(|a| a.id == id)
    }

    pub fn substitution_model(&self, name: &str) -> Option<&SubstitutionModel> {
        self.substitution_models.iter().find(|m| m.name == name)
    }

    pub fn clock_model(&self, name: &str) -> Option<&ClockModel> {
        self.clock_models.iter().find(|m| m.name == name)
    }

    pub fn tree_model(&self, name: &str) -> Option<&TreeModel> {
        self.tree_models.iter().find(|m| m.name == name)
    }

    /// The tree prior attached to a tree model.
    pub fn tree_prior_for(&self, tree_model: &str) -> Option<&TreePrior> {
        self.tree_priors.iter().find(|p| p.tree_model == tree_model)
    }

    pub fn partitions_for_tree<'a>(&'a self, tree_model: &'a str) -> impl Iterator<Item = &'a Partition> + 'a {
        self.partitions.iter().filter(move |p| p.tree_model == tree_model)
    }

    pub fn partitions_for_substitution<'a>(
        &'a self,
        model: &'a str,
    ) -> impl Iterator<Item = &'a Partition> + 'a {
        self.partitions.iter().filter(move |p| p.substitution_model == model)
    }

    pub fn partitions_for_clock<'a>(&'a self, model: &'a str) -> impl Iterator<Item = &'a Partition> + 'a {
        self.partitions.iter().filter(move |p| p.clock_model == model)
    }

    /// Distinct tree models a clock model is applied to, in partition order.
    pub fn tree_models_for_clock<'a>(&'a self, clock: &'a str) -> Vec<&'a str> {
        let mut trees: Vec<&str> = Vec::new();
        for p in self.partitions_for_clock(clock) {
            if !trees.contains(&p.tree_model.as_str()) {
                trees.push(p.tree_model.as_str());
            }
        }
        trees
    }

    /// Tree model a taxon set's statistics attach to.
    pub fn tree_model_of_set<'a>(&'a self, set: &'a TaxonSet) -> Option<&'a str> {
        set.tree_model
            .as_deref()
            .or_else(|| self.tree_models.first().map(|t| t.name.as_str()))
    }

    /// Substitution models actually used by some partition, in declaration order.
    pub fn active_substitution_models(&self) -> impl Iterator<Item = &SubstitutionModel> {
        self.substitution_models
            .iter()
            .filter(move |m| self.partitions.iter().any(|p| p.substitution_model == m.name))
    }

    pub fn active_clock_models(&self) -> impl Iterator<Item = &ClockModel> {
        self.clock_models
            .iter()
            .filter(move |m| self.partitions.iter().any(|p| p.clock_model == m.name))
    }

    // --- analysis-wide flags ---

    pub fn has_tip_dates(&self) -> bool {
        self.taxa.iter().any(|t| t.date.is_some())
    }

    pub fn has_calibrations(&self) -> bool {
        self.taxon_sets.iter().any(|s| s.is_calibrated())
    }

    /// Whether the analysis has absolute time information, which lets the
    /// clock rate be estimated by default.
    pub fn has_time_information(&self) -> bool {
        self.has_tip_dates() || self.has_calibrations()
    }

    pub fn species_enabled(&self) -> bool {
        self.species.is_some()
    }

    /// Whether any partition carries data to evaluate.
    pub fn has_data(&self) -> bool {
        !self.partitions.is_empty() && !self.mcmc.sample_prior_only
    }

    pub fn uses_gmrf_prior(&self) -> bool {
        self.tree_priors.iter().any(|p| p.kind.is_gmrf())
    }

    pub fn uses_calibrated_yule(&self, tree_model: &str) -> bool {
        self.tree_prior_for(tree_model)
            .map(|p| p.kind == TreePriorKind::YuleCalibration)
            .unwrap_or(false)
    }

    /// Species names in first-seen taxon order.
    pub fn species_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for taxon in &self.taxa {
            if let Some(species) = taxon.attributes.get(SPECIES_TRAIT) {
                if !names.contains(&species.as_str()) {
                    names.push(species.as_str());
                }
            }
        }
        names
    }
}
