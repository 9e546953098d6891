//! Pre-flight validation of an analysis configuration.
//!
//! Every rule runs and all failures are accumulated. Call [`validate`] for
//! the full list or [`validate_or_raise`] to turn a non-empty list into a
//! [`GenerationError::Validation`]. Generation never starts on a
//! configuration with validation errors.

use std::collections::{BTreeMap, BTreeSet};

use beastgen_types::{
    AnalysisConfig, Category, ClockKind, GenerationError, ParameterOverride, Result, StartingTree,
    TreePriorKind, ValidationError, SPECIES_TRAIT,
};
use beastgen_xml::number;

use crate::catalog;
use crate::namespace::NamespaceResolver;

/// Element ids the generators mint unconditionally.
const RESERVED_IDS: &[&str] = &[
    "taxa",
    "alignment",
    "species",
    "allSpecies",
    "sptree",
    "treeModel",
    "startingTree",
    "posterior",
    "prior",
    "likelihood",
    "mcmc",
    "operators",
    "screenLog",
    "fileLog",
];

// ---------------------------------------------------------------------------
// ConfigRule trait
// ---------------------------------------------------------------------------

pub trait ConfigRule: Send + Sync {
    fn name(&self) -> &str;
    /// Configuration area most of this rule's errors belong to.
    fn category(&self) -> Category;
    fn apply(&self, config: &AnalysisConfig) -> Vec<ValidationError>;
}

fn error(category: Category, message: impl Into<String>) -> ValidationError {
    ValidationError::new(category, message)
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

struct MinimumTaxaRule;
impl ConfigRule for MinimumTaxaRule {
    fn name(&self) -> &str { "minimum_taxa" }
    fn category(&self) -> Category { Category::TaxonSets }
    fn apply(&self, config: &AnalysisConfig) -> Vec<ValidationError> {
        if config.taxa.len() < 2 {
            vec![error(Category::TaxonSets, "BEAST requires at least two taxa to run.")]
        } else {
            vec![]
        }
    }
}

struct UniqueIdsRule;
impl ConfigRule for UniqueIdsRule {
    fn name(&self) -> &str { "unique_ids" }
    fn category(&self) -> Category { Category::Taxa }
    fn apply(&self, config: &AnalysisConfig) -> Vec<ValidationError> {
        let mut seen: BTreeSet<String> = RESERVED_IDS.iter().map(|id| id.to_string()).collect();
        let mut errors = Vec::new();
        let mut check = |id: &str, what: &str, category: Category, errors: &mut Vec<ValidationError>| {
            if !seen.insert(id.to_string()) {
                errors.push(error(
                    category,
                    format!(
                        "A {what} has the same id, {id}\nas another element (taxon, sequence, taxon set, species, etc.):\nAll ids should be unique."
                    ),
                ));
            }
        };

        for taxon in &config.taxa {
            check(&taxon.id, "taxon", Category::Taxa, &mut errors);
        }
        for alignment in &config.alignments {
            check(&alignment.id, "alignment", Category::DataPartitions, &mut errors);
        }
        for set in &config.taxon_sets {
            check(&set.id, "taxon set", Category::TaxonSets, &mut errors);
        }
        if let Some(ref species) = config.species {
            for name in config.species_names() {
                check(name, "species", Category::Traits, &mut errors);
            }
            for set in &species.species_sets {
                check(&set.id, "species set", Category::TaxonSets, &mut errors);
            }
        }
        errors
    }
}

struct TaxonSetMembersRule;
impl ConfigRule for TaxonSetMembersRule {
    fn name(&self) -> &str { "taxon_set_members" }
    fn category(&self) -> Category { Category::TaxonSets }
    fn apply(&self, config: &AnalysisConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for set in &config.taxon_sets {
            if set.taxa.is_empty() {
                errors.push(error(
                    Category::TaxonSets,
                    format!("Taxon set {} must contain at least one taxon.", set.id),
                ));
            }
            for member in &set.taxa {
                if config.taxon(member).is_none() {
                    errors.push(error(
                        Category::TaxonSets,
                        format!("Taxon set {} contains an unknown taxon, {member}.", set.id),
                    ));
                }
            }
            if let Some(ref tree) = set.tree_model {
                if config.tree_model(tree).is_none() {
                    errors.push(error(
                        Category::TaxonSets,
                        format!("Taxon set {} refers to an unknown tree model, {tree}.", set.id),
                    ));
                }
            }
        }
        if let Some(ref species) = config.species {
            let names = config.species_names();
            for set in &species.species_sets {
                if set.taxa.len() < 2 {
                    errors.push(error(
                        Category::TaxonSets,
                        format!("Species set {} must contain at least two species.", set.id),
                    ));
                }
                for member in &set.taxa {
                    if !names.contains(&member.as_str()) {
                        errors.push(error(
                            Category::TaxonSets,
                            format!("Species set {} contains an unknown species, {member}.", set.id),
                        ));
                    }
                }
            }
        }
        errors
    }
}

struct TipDatesRule;
impl ConfigRule for TipDatesRule {
    fn name(&self) -> &str { "tip_dates" }
    fn category(&self) -> Category { Category::TipDates }
    fn apply(&self, config: &AnalysisConfig) -> Vec<ValidationError> {
        let units: BTreeSet<&str> = config
            .taxa
            .iter()
            .filter_map(|t| t.date.as_ref())
            .map(|d| d.units.as_str())
            .collect();
        if units.len() > 1 {
            vec![error(Category::TipDates, "All tip dates must use the same units.")]
        } else {
            vec![]
        }
    }
}

struct CalibratedYuleRule;
impl ConfigRule for CalibratedYuleRule {
    fn name(&self) -> &str { "calibrated_yule" }
    fn category(&self) -> Category { Category::TreePriors }
    fn apply(&self, config: &AnalysisConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for prior in &config.tree_priors {
            if prior.kind != TreePriorKind::YuleCalibration {
                continue;
            }
            let calibrated = config
                .taxon_sets
                .iter()
                .filter(|s| s.monophyletic && s.is_calibrated())
                .filter(|s| config.tree_model_of_set(s) == Some(prior.tree_model.as_str()))
                .count();
            if calibrated > 1 {
                errors.push(error(
                    Category::TreePriors,
                    "Calibrated Yule requires 1 calibrated internal node \nwith a proper prior and monophyly enforced for each tree.",
                ));
            }
        }
        errors
    }
}

struct SpeciesTraitRule;
impl ConfigRule for SpeciesTraitRule {
    fn name(&self) -> &str { "species_trait" }
    fn category(&self) -> Category { Category::Traits }
    fn apply(&self, config: &AnalysisConfig) -> Vec<ValidationError> {
        if !config.species_enabled() {
            return vec![];
        }
        let mut errors: Vec<ValidationError> = config
            .taxa
            .iter()
            .filter(|t| !t.attributes.contains_key(SPECIES_TRAIT))
            .map(|t| {
                error(
                    Category::Traits,
                    format!("The species trait is not defined for taxon {}.", t.id),
                )
            })
            .collect();
        if errors.is_empty() && config.species_names().len() < 2 {
            errors.push(error(
                Category::Traits,
                "The multispecies coalescent requires at least two species.",
            ));
        }
        errors
    }
}

struct SkyrideRule;
impl ConfigRule for SkyrideRule {
    fn name(&self) -> &str { "skyride_single_tree" }
    fn category(&self) -> Category { Category::TreePriors }
    fn apply(&self, config: &AnalysisConfig) -> Vec<ValidationError> {
        let uses_skyride = config
            .tree_priors
            .iter()
            .any(|p| matches!(p.kind, TreePriorKind::Skyride { .. }));
        if uses_skyride && config.tree_models.len() > 1 {
            vec![error(
                Category::TreePriors,
                "The GMRF Skyride tree prior cannot be used with more than one tree model.",
            )]
        } else {
            vec![]
        }
    }
}

struct SkygridCutoffRule;
impl ConfigRule for SkygridCutoffRule {
    fn name(&self) -> &str { "skygrid_cutoff" }
    fn category(&self) -> Category { Category::TreePriors }
    fn apply(&self, config: &AnalysisConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for prior in &config.tree_priors {
            if let TreePriorKind::Skygrid { cutoff, grid_points } = prior.kind {
                match cutoff {
                    Some(c) if c > 0.0 => {}
                    _ => errors.push(error(
                        Category::TreePriors,
                        format!(
                            "The Skygrid tree prior {} requires a positive time at the last grid point (cutoff).",
                            prior.name
                        ),
                    )),
                }
                if grid_points < 2 {
                    errors.push(error(
                        Category::TreePriors,
                        format!("The Skygrid tree prior {} requires at least two grid points.", prior.name),
                    ));
                }
            }
            if let TreePriorKind::Skyline { groups, .. } = prior.kind {
                if groups == 0 || groups >= config.taxa.len().max(1) {
                    errors.push(error(
                        Category::TreePriors,
                        format!(
                            "The skyline tree prior {} needs between 1 and {} groups.",
                            prior.name,
                            config.taxa.len().saturating_sub(1)
                        ),
                    ));
                }
            }
        }
        errors
    }
}

struct UserStartingTreeRule;
impl ConfigRule for UserStartingTreeRule {
    fn name(&self) -> &str { "user_starting_tree" }
    fn category(&self) -> Category { Category::Trees }
    fn apply(&self, config: &AnalysisConfig) -> Vec<ValidationError> {
        config
            .tree_models
            .iter()
            .filter(|t| match t.starting_tree {
                StartingTree::User { ref newick } => {
                    newick.as_deref().map(str::trim).unwrap_or("").is_empty()
                }
                _ => false,
            })
            .map(|t| {
                error(
                    Category::Trees,
                    format!(
                        "Tree model {} is set to use a user-specified starting tree but none has been supplied.",
                        t.name
                    ),
                )
            })
            .collect()
    }
}

struct RandomLocalClockTreesRule;
impl ConfigRule for RandomLocalClockTreesRule {
    fn name(&self) -> &str { "random_local_clock_trees" }
    fn category(&self) -> Category { Category::ClockModels }
    fn apply(&self, config: &AnalysisConfig) -> Vec<ValidationError> {
        config
            .clock_models
            .iter()
            .filter(|c| c.kind == ClockKind::RandomLocal && config.tree_models_for_clock(&c.name).len() > 1)
            .map(|_| {
                error(
                    Category::ClockModels,
                    "A single random local clock cannot be applied to multiple trees.",
                )
            })
            .collect()
    }
}

/// Unlinked models are named after their partition, so a partition name can
/// collide with the name of a linked model of the same family.
struct DistinctPrefixesRule;
impl ConfigRule for DistinctPrefixesRule {
    fn name(&self) -> &str { "distinct_prefixes" }
    fn category(&self) -> Category { Category::DataPartitions }
    fn apply(&self, config: &AnalysisConfig) -> Vec<ValidationError> {
        let names = NamespaceResolver::new(config);
        let families: [(&str, Category, Vec<(&str, String)>); 3] = [
            (
                "substitution models",
                Category::SiteModels,
                config.substitution_models.iter().map(|m| (m.name.as_str(), names.substitution_prefix(&m.name))).collect(),
            ),
            (
                "clock models",
                Category::ClockModels,
                config.clock_models.iter().map(|m| (m.name.as_str(), names.clock_prefix(&m.name))).collect(),
            ),
            (
                "tree models",
                Category::Trees,
                config.tree_models.iter().map(|m| (m.name.as_str(), names.tree_model_prefix(&m.name))).collect(),
            ),
        ];
        let mut errors = Vec::new();
        for (family, category, prefixes) in families {
            let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
            for (model, prefix) in &prefixes {
                if prefix.is_empty() {
                    continue;
                }
                if let Some(other) = seen.insert(prefix.as_str(), *model) {
                    errors.push(error(
                        category,
                        format!(
                            "The {family} {other} and {model} would both be written with the prefix {prefix}. Rename one of them or its partition."
                        ),
                    ));
                }
            }
        }
        errors
    }
}

struct SharedTreeTaxaRule;
impl ConfigRule for SharedTreeTaxaRule {
    fn name(&self) -> &str { "shared_tree_taxa" }
    fn category(&self) -> Category { Category::DataPartitions }
    fn apply(&self, config: &AnalysisConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for tree in &config.tree_models {
            let taxon_sets: Vec<BTreeSet<&str>> = config
                .partitions_for_tree(&tree.name)
                .filter_map(|p| config.alignment(&p.alignment))
                .map(|a| a.sequences.iter().map(|s| s.taxon.as_str()).collect())
                .collect();
            if taxon_sets.windows(2).any(|w| w[0] != w[1]) {
                errors.push(error(
                    Category::DataPartitions,
                    "Partitions with different taxa cannot share the same tree.",
                ));
            }
        }
        errors
    }
}

struct ParameterBoundsRule;
impl ParameterBoundsRule {
    fn check(
        &self,
        owner: &str,
        overrides: &BTreeMap<String, ParameterOverride>,
        errors: &mut Vec<ValidationError>,
    ) {
        for (name, spec) in overrides {
            let Some(base) = catalog::default_parameter(name) else {
                errors.push(error(
                    Category::Priors,
                    format!("Unknown parameter {name} in {owner}."),
                ));
                continue;
            };
            let parameter = base.with_override(spec);
            if parameter.fixed {
                continue;
            }
            let Some(initial) = parameter.initial else {
                continue;
            };
            let bounds = parameter.bounds();
            if !bounds.contains(initial) {
                errors.push(error(
                    Category::Priors,
                    format!(
                        "The initial value ({}) of parameter {owner}.{name} lies outside its bounds [{}, {}].",
                        number(initial),
                        number(bounds.lower),
                        number(bounds.upper)
                    ),
                ));
            }
            if parameter.non_negative && initial < 0.0 {
                errors.push(error(
                    Category::Priors,
                    format!(
                        "The initial value ({}) of parameter {owner}.{name} should be non-negative.",
                        number(initial)
                    ),
                ));
            }
            if parameter.zero_one && !(0.0..=1.0).contains(&initial) {
                errors.push(error(
                    Category::Priors,
                    format!(
                        "The initial value ({}) of parameter {owner}.{name} should lie in the interval [0, 1].",
                        number(initial)
                    ),
                ));
            }
        }
    }
}

impl ConfigRule for ParameterBoundsRule {
    fn name(&self) -> &str { "parameter_bounds" }
    fn category(&self) -> Category { Category::Priors }
    fn apply(&self, config: &AnalysisConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for m in &config.substitution_models {
            self.check(&m.name, &m.parameters, &mut errors);
        }
        for m in &config.clock_models {
            self.check(&m.name, &m.parameters, &mut errors);
        }
        for m in &config.tree_models {
            self.check(&m.name, &m.parameters, &mut errors);
        }
        for m in &config.tree_priors {
            self.check(&m.name, &m.parameters, &mut errors);
        }
        if let Some(ref species) = config.species {
            self.check("species", &species.parameters, &mut errors);
        }
        errors
    }
}

struct ModelReferencesRule;
impl ConfigRule for ModelReferencesRule {
    fn name(&self) -> &str { "model_references" }
    fn category(&self) -> Category { Category::DataPartitions }
    fn apply(&self, config: &AnalysisConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if config.partitions.is_empty() {
            errors.push(error(Category::DataPartitions, "No data partitions have been defined."));
        }
        for p in &config.partitions {
            let missing = [
                ("alignment", config.alignment(&p.alignment).is_none(), &p.alignment),
                (
                    "substitution model",
                    config.substitution_model(&p.substitution_model).is_none(),
                    &p.substitution_model,
                ),
                ("clock model", config.clock_model(&p.clock_model).is_none(), &p.clock_model),
                ("tree model", config.tree_model(&p.tree_model).is_none(), &p.tree_model),
            ];
            for (what, is_missing, name) in missing {
                if is_missing {
                    errors.push(error(
                        Category::DataPartitions,
                        format!("Partition {} refers to an unknown {what}, {name}.", p.name),
                    ));
                }
            }
        }
        for prior in &config.tree_priors {
            if config.tree_model(&prior.tree_model).is_none() {
                errors.push(error(
                    Category::TreePriors,
                    format!("Tree prior {} refers to an unknown tree model, {}.", prior.name, prior.tree_model),
                ));
            }
            if config.species_enabled() {
                errors.push(error(
                    Category::TreePriors,
                    format!(
                        "Tree prior {} is not used in a multispecies analysis: gene trees are governed by the species tree.",
                        prior.name
                    ),
                ));
            }
        }
        for tree in &config.tree_models {
            let priors = config
                .tree_priors
                .iter()
                .filter(|p| p.tree_model == tree.name)
                .count();
            if priors == 0 && !config.species_enabled() {
                errors.push(error(
                    Category::TreePriors,
                    format!("Tree model {} has no tree prior.", tree.name),
                ));
            } else if priors > 1 {
                errors.push(error(
                    Category::TreePriors,
                    format!("Tree model {} has more than one tree prior.", tree.name),
                ));
            }
        }
        for group in &config.clock_groups {
            for member in &group.clock_models {
                if config.clock_model(member).is_none() {
                    errors.push(error(
                        Category::ClockModels,
                        format!("Clock group {} refers to an unknown clock model, {member}.", group.name),
                    ));
                }
            }
        }
        errors
    }
}

struct DataTypeMatchRule;
impl ConfigRule for DataTypeMatchRule {
    fn name(&self) -> &str { "data_type_match" }
    fn category(&self) -> Category { Category::SiteModels }
    fn apply(&self, config: &AnalysisConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for p in &config.partitions {
            let (Some(alignment), Some(model)) = (
                config.alignment(&p.alignment),
                config.substitution_model(&p.substitution_model),
            ) else {
                continue;
            };
            if alignment.data_type != model.kind.data_type() {
                errors.push(error(
                    Category::SiteModels,
                    format!(
                        "Partition {} has {} data but substitution model {} is {}.",
                        p.name,
                        alignment.data_type.as_str(),
                        model.name,
                        model.kind.name()
                    ),
                ));
            }
        }
        for model in &config.substitution_models {
            if model.codon.is_split() && model.kind.data_type() != beastgen_types::DataType::Nucleotide {
                errors.push(error(
                    Category::SiteModels,
                    format!(
                        "Codon position partitioning requires nucleotide data (substitution model {}).",
                        model.name
                    ),
                ));
            }
        }
        errors
    }
}

struct SequenceTaxaRule;
impl ConfigRule for SequenceTaxaRule {
    fn name(&self) -> &str { "sequence_taxa" }
    fn category(&self) -> Category { Category::DataPartitions }
    fn apply(&self, config: &AnalysisConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for alignment in &config.alignments {
            for seq in &alignment.sequences {
                if config.taxon(&seq.taxon).is_none() {
                    errors.push(error(
                        Category::DataPartitions,
                        format!(
                            "Alignment {} has a sequence for an unknown taxon, {}.",
                            alignment.id, seq.taxon
                        ),
                    ));
                }
            }
            let lengths: BTreeSet<usize> = alignment
                .sequences
                .iter()
                .map(|s| s.data.chars().count())
                .collect();
            if lengths.len() > 1 {
                errors.push(error(
                    Category::DataPartitions,
                    format!("Sequences in alignment {} have different lengths.", alignment.id),
                ));
            }
        }
        errors
    }
}

struct RunSettingsRule;
impl ConfigRule for RunSettingsRule {
    fn name(&self) -> &str { "run_settings" }
    fn category(&self) -> Category { Category::Mcmc }
    fn apply(&self, config: &AnalysisConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mcmc = &config.mcmc;
        if mcmc.chain_length == 0 {
            errors.push(error(Category::Mcmc, "The chain length must be positive."));
        }
        if mcmc.log_every == 0 || mcmc.echo_every == 0 {
            errors.push(error(Category::Mcmc, "Logging intervals must be positive."));
        }
        if mcmc.file_name_stem.trim().is_empty() {
            errors.push(error(Category::Mcmc, "A log file name stem is required."));
        }
        if let Some(ref operators) = config.operators {
            if operators.iter().any(|op| op.weight < 0.0) {
                errors.push(error(Category::Operators, "Operator weights must be non-negative."));
            }
        }
        errors
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

fn rules() -> Vec<Box<dyn ConfigRule>> {
    vec![
        Box::new(MinimumTaxaRule),
        Box::new(UniqueIdsRule),
        Box::new(TaxonSetMembersRule),
        Box::new(TipDatesRule),
        Box::new(CalibratedYuleRule),
        Box::new(SpeciesTraitRule),
        Box::new(SkyrideRule),
        Box::new(SkygridCutoffRule),
        Box::new(UserStartingTreeRule),
        Box::new(RandomLocalClockTreesRule),
        Box::new(DistinctPrefixesRule),
        Box::new(SharedTreeTaxaRule),
        Box::new(ParameterBoundsRule),
        Box::new(ModelReferencesRule),
        Box::new(DataTypeMatchRule),
        Box::new(SequenceTaxaRule),
        Box::new(RunSettingsRule),
    ]
}

/// Run every rule and return all failures.
pub fn validate(config: &AnalysisConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for rule in rules() {
        let found = rule.apply(config);
        for e in &found {
            tracing::warn!(rule = rule.name(), category = %e.category, "{}", e.message);
        }
        errors.extend(found);
    }
    errors
}

/// Run every rule; fail if any error is found.
pub fn validate_or_raise(config: &AnalysisConfig) -> Result<()> {
    let errors = validate(config);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(GenerationError::Validation(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beastgen_types::{
        Alignment, ClockModel, DataType, Partition, PriorKind, RelaxedDistribution, Sequence, SubstitutionKind,
        SubstitutionModel, Taxon, TaxonSet, TreeModel, TreePrior,
    };

    fn base_config() -> AnalysisConfig {
        AnalysisConfig {
            taxa: vec![Taxon::new("A"), Taxon::new("B"), Taxon::new("C")],
            alignments: vec![Alignment {
                id: "aln".into(),
                data_type: DataType::Nucleotide,
                sequences: vec![
                    Sequence { taxon: "A".into(), data: "ACGT".into() },
                    Sequence { taxon: "B".into(), data: "ACGA".into() },
                    Sequence { taxon: "C".into(), data: "ACTA".into() },
                ],
            }],
            partitions: vec![Partition::new("p", "aln", "hky", "clock", "tree")],
            substitution_models: vec![SubstitutionModel::new("hky", SubstitutionKind::Hky)],
            clock_models: vec![ClockModel::new("clock", ClockKind::Strict)],
            tree_models: vec![TreeModel::new("tree")],
            tree_priors: vec![TreePrior::new("prior", "tree", TreePriorKind::Constant)],
            ..Default::default()
        }
    }

    fn has(errors: &[ValidationError], category: Category, needle: &str) -> bool {
        errors
            .iter()
            .any(|e| e.category == category && e.message.contains(needle))
    }

    #[test]
    fn valid_config_has_no_errors() {
        let errors = validate(&base_config());
        assert!(errors.is_empty(), "Expected no errors, got: {errors:?}");
        assert!(validate_or_raise(&base_config()).is_ok());
    }

    #[test]
    fn single_taxon_is_rejected() {
        let mut config = base_config();
        config.taxa.truncate(1);
        config.alignments[0].sequences.truncate(1);
        let errors = validate(&config);
        assert!(
            has(&errors, Category::TaxonSets, "BEAST requires at least two taxa to run"),
            "Expected minimum taxa error, got: {errors:?}"
        );
    }

    #[test]
    fn duplicate_and_reserved_ids() {
        let mut config = base_config();
        config.taxon_sets.push(TaxonSet::new("A", &["A", "B"]));
        config.taxa.push(Taxon::new("mcmc"));
        let errors = validate(&config);
        assert!(has(&errors, Category::TaxonSets, "A taxon set has the same id, A"), "{errors:?}");
        assert!(has(&errors, Category::Taxa, "same id, mcmc"), "{errors:?}");
    }

    #[test]
    fn empty_and_unknown_taxon_set_members() {
        let mut config = base_config();
        config.taxon_sets.push(TaxonSet::new("empty", &[]));
        config.taxon_sets.push(TaxonSet::new("bad", &["A", "Z"]));
        let errors = validate(&config);
        assert!(has(&errors, Category::TaxonSets, "empty must contain at least one taxon"));
        assert!(has(&errors, Category::TaxonSets, "unknown taxon, Z"));
    }

    #[test]
    fn two_calibrated_monophyletic_sets_under_calibrated_yule() {
        let mut config = base_config();
        config.tree_priors[0].kind = TreePriorKind::YuleCalibration;
        for id in ["ab", "bc"] {
            let mut set = TaxonSet::new(id, &["A", "B"]);
            set.monophyletic = true;
            set.calibration = Some(PriorKind::Normal { mean: 10.0, stdev: 1.0 });
            config.taxon_sets.push(set);
        }
        let errors = validate(&config);
        assert!(has(&errors, Category::TreePriors, "Calibrated Yule requires 1 calibrated internal node"));
    }

    #[test]
    fn one_calibrated_set_under_calibrated_yule_is_fine() {
        let mut config = base_config();
        config.tree_priors[0].kind = TreePriorKind::YuleCalibration;
        let mut set = TaxonSet::new("ab", &["A", "B"]);
        set.monophyletic = true;
        set.calibration = Some(PriorKind::Normal { mean: 10.0, stdev: 1.0 });
        config.taxon_sets.push(set);
        assert!(validate(&config).is_empty());
    }

    #[test]
    fn species_trait_required_on_every_taxon() {
        let mut config = base_config();
        config.tree_priors.clear();
        config.species = Some(Default::default());
        config.taxa[0].attributes.insert(SPECIES_TRAIT.into(), "s1".into());
        config.taxa[1].attributes.insert(SPECIES_TRAIT.into(), "s2".into());
        let errors = validate(&config);
        assert!(has(&errors, Category::Traits, "not defined for taxon C"), "{errors:?}");
    }

    #[test]
    fn skyride_with_multiple_trees() {
        let mut config = base_config();
        config.tree_models.push(TreeModel::new("tree2"));
        config.tree_priors[0].kind = TreePriorKind::Skyride { time_aware: true };
        config
            .tree_priors
            .push(TreePrior::new("prior2", "tree2", TreePriorKind::Constant));
        let errors = validate(&config);
        assert!(has(&errors, Category::TreePriors, "GMRF Skyride"), "{errors:?}");
    }

    #[test]
    fn skygrid_requires_positive_cutoff() {
        let mut config = base_config();
        config.tree_priors[0].kind = TreePriorKind::Skygrid { grid_points: 10, cutoff: None };
        assert!(has(&validate(&config), Category::TreePriors, "cutoff"));
        config.tree_priors[0].kind = TreePriorKind::Skygrid { grid_points: 10, cutoff: Some(-1.0) };
        assert!(has(&validate(&config), Category::TreePriors, "cutoff"));
        config.tree_priors[0].kind = TreePriorKind::Skygrid { grid_points: 10, cutoff: Some(50.0) };
        assert!(validate(&config).is_empty());
    }

    #[test]
    fn user_starting_tree_must_be_supplied() {
        let mut config = base_config();
        config.tree_models[0].starting_tree = StartingTree::User { newick: None };
        assert!(has(&validate(&config), Category::Trees, "user-specified starting tree"));
        config.tree_models[0].starting_tree = StartingTree::User { newick: Some("((A,B),C);".into()) };
        assert!(validate(&config).is_empty());
    }

    #[test]
    fn random_local_clock_on_two_trees() {
        let mut config = base_config();
        config.clock_models[0].kind = ClockKind::RandomLocal;
        config.tree_models.push(TreeModel::new("tree2"));
        config
            .tree_priors
            .push(TreePrior::new("prior2", "tree2", TreePriorKind::Constant));
        config
            .partitions
            .push(Partition::new("p2", "aln", "hky", "clock", "tree2"));
        let errors = validate(&config);
        assert!(has(
            &errors,
            Category::ClockModels,
            "A single random local clock cannot be applied to multiple trees."
        ));
    }

    #[test]
    fn relaxed_clock_may_span_two_trees() {
        let mut config = base_config();
        config.clock_models[0].kind =
            ClockKind::Uncorrelated { distribution: RelaxedDistribution::Lognormal, continuous_quantile: false };
        config.tree_models.push(TreeModel::new("tree2"));
        config
            .tree_priors
            .push(TreePrior::new("prior2", "tree2", TreePriorKind::Constant));
        config
            .partitions
            .push(Partition::new("p2", "aln", "hky", "clock", "tree2"));
        let errors = validate(&config);
        assert!(errors.is_empty(), "Expected no errors, got: {errors:?}");

        config.clock_models[0].kind = ClockKind::FixedLocal;
        assert!(validate(&config).is_empty());
    }

    #[test]
    fn partition_named_after_linked_model_collides() {
        let mut config = base_config();
        config.substitution_models.push(SubstitutionModel::new("shared", SubstitutionKind::Gtr));
        config.partitions.push(Partition::new("p2", "aln", "shared", "clock", "tree"));
        config.partitions.push(Partition::new("p3", "aln", "shared", "clock", "tree"));
        assert!(validate(&config).is_empty());

        config.partitions[0].name = "shared".into();
        let errors = validate(&config);
        assert!(
            has(&errors, Category::SiteModels, "substitution models hky and shared would both be written with the prefix shared."),
            "{errors:?}"
        );
    }

    #[test]
    fn partitions_with_different_taxa_on_one_tree() {
        let mut config = base_config();
        config.alignments.push(Alignment {
            id: "aln2".into(),
            data_type: DataType::Nucleotide,
            sequences: vec![
                Sequence { taxon: "A".into(), data: "AC".into() },
                Sequence { taxon: "B".into(), data: "AC".into() },
            ],
        });
        config
            .partitions
            .push(Partition::new("p2", "aln2", "hky", "clock", "tree"));
        assert!(has(
            &validate(&config),
            Category::DataPartitions,
            "Partitions with different taxa cannot share the same tree."
        ));
    }

    #[test]
    fn parameter_outside_truncation_bounds() {
        let mut config = base_config();
        config.substitution_models[0].parameters.insert(
            "kappa".into(),
            ParameterOverride {
                initial: Some(20.0),
                truncation: Some(beastgen_types::Bounds::new(0.0, 10.0)),
                ..Default::default()
            },
        );
        let errors = validate(&config);
        assert!(has(&errors, Category::Priors, "hky.kappa lies outside its bounds [0.0, 10.0]"), "{errors:?}");
    }

    #[test]
    fn truncation_takes_precedence_over_uniform_bounds() {
        let mut config = base_config();
        config.tree_priors[0].parameters.insert(
            "constant.popSize".into(),
            ParameterOverride {
                initial: Some(50.0),
                prior: Some(PriorKind::Uniform { lower: 0.0, upper: 10.0 }),
                truncation: Some(beastgen_types::Bounds::new(0.0, 100.0)),
                ..Default::default()
            },
        );
        assert!(validate(&config).is_empty());
    }

    #[test]
    fn negative_and_unit_interval_flags() {
        let mut config = base_config();
        config.substitution_models[0].invariant_sites = true;
        config.substitution_models[0].parameters.insert(
            "pInv".into(),
            ParameterOverride {
                initial: Some(1.5),
                prior: Some(PriorKind::Normal { mean: 0.5, stdev: 1.0 }),
                ..Default::default()
            },
        );
        config.tree_priors[0].parameters.insert(
            "constant.popSize".into(),
            ParameterOverride { initial: Some(-1.0), ..Default::default() },
        );
        let errors = validate(&config);
        assert!(has(&errors, Category::Priors, "pInv should lie in the interval [0, 1]"), "{errors:?}");
        assert!(has(&errors, Category::Priors, "constant.popSize should be non-negative"), "{errors:?}");
    }

    #[test]
    fn fixed_parameters_skip_bounds() {
        let mut config = base_config();
        config.tree_priors[0].parameters.insert(
            "constant.popSize".into(),
            ParameterOverride { initial: Some(-1.0), fixed: Some(true), ..Default::default() },
        );
        assert!(validate(&config).is_empty());
    }

    #[test]
    fn unknown_model_references() {
        let mut config = base_config();
        config.partitions[0].clock_model = "missing".into();
        let errors = validate(&config);
        assert!(has(&errors, Category::DataPartitions, "unknown clock model, missing"));
    }

    #[test]
    fn tree_model_without_prior() {
        let mut config = base_config();
        config.tree_priors.clear();
        assert!(has(&validate(&config), Category::TreePriors, "has no tree prior"));
    }

    #[test]
    fn data_type_mismatch() {
        let mut config = base_config();
        config.substitution_models[0].kind = SubstitutionKind::AminoAcid { matrix: "WAG".into() };
        assert!(has(&validate(&config), Category::SiteModels, "has nucleotide data"));
    }

    #[test]
    fn zero_chain_length() {
        let mut config = base_config();
        config.mcmc.chain_length = 0;
        assert!(has(&validate(&config), Category::Mcmc, "chain length"));
    }

    #[test]
    fn validate_or_raise_wraps_all_errors() {
        let mut config = base_config();
        config.taxa.truncate(1);
        config.mcmc.chain_length = 0;
        match validate_or_raise(&config) {
            Err(GenerationError::Validation(errors)) => assert!(errors.len() >= 2),
            other => panic!("Expected validation failure, got: {other:?}"),
        }
    }
}
