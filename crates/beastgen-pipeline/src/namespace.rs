//! Identifier prefixes and ids for generated fragments.
//!
//! Every id the generators mint or reference is built here. Prefixes are pure
//! functions of the configuration. A model family is only prefixed when more
//! than one model of that family exists. A model applied to exactly one of
//! several partitions (unlinked) takes that partition's name as its prefix; a
//! model shared by several partitions (linked) takes its own name. Codon-split
//! fragments add a position prefix (`CP1.`, `CP2.`, `CP3.`, or `CP1+2.`/`CP3.`
//! for the merged 1+2 pattern).

use beastgen_types::{AnalysisConfig, CodonPartitioning, Partition, SubstitutionModel, TaxonSet};

pub struct NamespaceResolver<'a> {
    config: &'a AnalysisConfig,
}

fn family_prefix(name: &str, family_size: usize) -> String {
    if family_size > 1 {
        format!("{name}.")
    } else {
        String::new()
    }
}

impl<'a> NamespaceResolver<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }

    // -----------------------------------------------------------------------
    // Prefixes
    // -----------------------------------------------------------------------

    /// Prefix of a model shared by `users`.
    fn model_prefix<'p>(&self, name: &str, family_size: usize, mut users: impl Iterator<Item = &'p Partition>) -> String {
        if family_size <= 1 {
            return String::new();
        }
        match (users.next(), users.next()) {
            (Some(owner), None) if self.config.partitions.len() > 1 => self.partition_prefix(&owner.name),
            _ => format!("{name}."),
        }
    }

    pub fn substitution_prefix(&self, model: &str) -> String {
        let users = self.config.partitions_for_substitution(model);
        self.model_prefix(model, self.config.substitution_models.len(), users)
    }

    pub fn clock_prefix(&self, clock: &str) -> String {
        let users = self.config.partitions_for_clock(clock);
        self.model_prefix(clock, self.config.clock_models.len(), users)
    }

    pub fn tree_model_prefix(&self, tree_model: &str) -> String {
        let users = self.config.partitions_for_tree(tree_model);
        self.model_prefix(tree_model, self.config.tree_models.len(), users)
    }

    pub fn tree_prior_prefix(&self, tree_prior: &str) -> String {
        family_prefix(tree_prior, self.config.tree_priors.len())
    }

    pub fn partition_prefix(&self, partition: &str) -> String {
        family_prefix(partition, self.config.partitions.len())
    }

    /// Position prefix for a codon split. `position` is 1-based over the
    /// split's position groups.
    pub fn codon_prefix(codon: CodonPartitioning, position: usize) -> String {
        match codon {
            CodonPartitioning::None => String::new(),
            CodonPartitioning::Positions112 => match position {
                1 => "CP1+2.".to_string(),
                _ => "CP3.".to_string(),
            },
            CodonPartitioning::Positions123 => format!("CP{position}."),
        }
    }

    /// Model prefix plus the position prefix.
    pub fn substitution_prefix_codon(&self, model: &SubstitutionModel, position: usize) -> String {
        format!(
            "{}{}",
            self.substitution_prefix(&model.name),
            Self::codon_prefix(model.codon, position)
        )
    }

    /// Prefix of the substitution model element for one position group:
    /// per position when unlinked, shared otherwise.
    pub fn substitution_model_prefix(&self, model: &SubstitutionModel, position: usize) -> String {
        if model.unlinked_substitution {
            self.substitution_prefix_codon(model, position)
        } else {
            self.substitution_prefix(&model.name)
        }
    }

    pub fn frequencies_prefix(&self, model: &SubstitutionModel, position: usize) -> String {
        if model.unlinked_frequencies {
            self.substitution_prefix_codon(model, position)
        } else {
            self.substitution_prefix(&model.name)
        }
    }

    pub fn heterogeneity_prefix(&self, model: &SubstitutionModel, position: usize) -> String {
        if model.unlinked_heterogeneity {
            self.substitution_prefix_codon(model, position)
        } else {
            self.substitution_prefix(&model.name)
        }
    }

    // -----------------------------------------------------------------------
    // Identifiers
    // -----------------------------------------------------------------------

    pub fn site_model_id(&self, model: &SubstitutionModel, position: usize) -> String {
        format!("{}siteModel", self.substitution_prefix_codon(model, position))
    }

    /// Compound of the relative rates of the partitions under a clock.
    pub fn all_mus_id(&self, clock: &str) -> String {
        format!("{}allMus", self.clock_prefix(clock))
    }

    pub fn patterns_id(&self, partition: &str, codon: CodonPartitioning, position: usize) -> String {
        format!(
            "{}{}patterns",
            Self::codon_prefix(codon, position),
            self.partition_prefix(partition)
        )
    }

    pub fn tree_likelihood_id(&self, partition: &str, codon: CodonPartitioning, position: usize) -> String {
        format!(
            "{}{}treeLikelihood",
            Self::codon_prefix(codon, position),
            self.partition_prefix(partition)
        )
    }

    pub fn tree_model_id(&self, tree_model: &str) -> String {
        format!("{}treeModel", self.tree_model_prefix(tree_model))
    }

    /// Taxon list a tree is built over. With several trees, a tree carrying
    /// data gets its own list; otherwise the full `taxa` list.
    pub fn tree_taxa_id(&self, tree_model: &str) -> String {
        let config = self.config;
        if config.tree_models.len() > 1 && config.partitions_for_tree(tree_model).next().is_some() {
            format!("{}taxa", self.tree_model_prefix(tree_model))
        } else {
            "taxa".to_string()
        }
    }

    pub fn starting_tree_id(&self, tree_model: &str) -> String {
        format!("{}startingTree", self.tree_model_prefix(tree_model))
    }

    pub fn initial_demo_id(&self, tree_model: &str) -> String {
        format!("{}initialDemo", self.tree_model_prefix(tree_model))
    }

    /// Prefix of what a clock writes for one of its trees. A clock spanning
    /// several trees adds the tree prefix, once.
    pub fn clock_tree_prefix(&self, clock: &str, tree_model: &str) -> String {
        let cp = self.clock_prefix(clock);
        if self.config.tree_models_for_clock(clock).len() <= 1 {
            return cp;
        }
        let tp = self.tree_model_prefix(tree_model);
        if cp == tp {
            cp
        } else {
            format!("{cp}{tp}")
        }
    }

    pub fn branch_rates_id(&self, clock: &str, tree_model: &str) -> String {
        format!("{}branchRates", self.clock_tree_prefix(clock, tree_model))
    }

    pub fn clock_group_id(&self, group: &str) -> String {
        format!("{group}.allClockRates")
    }

    pub fn tmrca_id(&self, set: &TaxonSet) -> String {
        format!("tmrca({}{})", self.set_tree_prefix(set), set.id)
    }

    pub fn monophyly_id(&self, set: &TaxonSet) -> String {
        format!("monophyly({}{})", self.set_tree_prefix(set), set.id)
    }

    pub fn tree_log_id(&self, tree_model: &str) -> String {
        format!("{}treeFileLog", self.tree_model_prefix(tree_model))
    }

    fn set_tree_prefix(&self, set: &TaxonSet) -> String {
        self.config
            .tree_model_of_set(set)
            .map(|t| self.tree_model_prefix(t))
            .unwrap_or_default()
    }
}
