//! Generation orchestrator: the fixed stage sequence.
//!
//! Implements the lifecycle: validate, write the header and root, run every
//! stage in order with the context threaded through, finalize. A stage error
//! aborts the run and no document is returned.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Instant;

use beastgen_types::{AnalysisConfig, Category, GenerationError, Result};
use beastgen_xml::DocumentBuilder;
use serde::Serialize;

use crate::context::GenerationContext;
use crate::events::{EventEmitter, GenerationEvent};
use crate::extension::{default_registry, ExtensionRegistry, InsertionHook, InsertionItem, InsertionPoint};
use crate::generators::{
    alignment, clock, logs, mcmc, operators, species, starting_tree, substitution, taxa, tree_likelihood,
    tree_model, tree_prior, StageFn, StageInput,
};
use crate::validation::validate_or_raise;

const TOOL_NAME: &str = "beastgen";
const AUTHORSHIP: &str = "for BEAST by Alexei J. Drummond, Andrew Rambaut and Marc A. Suchard";

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// One step of the generation sequence. Stages run strictly in the order of
/// [`Stage::ALL`], each exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Taxa,
    TaxonSets,
    Alignments,
    Patterns,
    TreePriors,
    StartingTrees,
    TreeModels,
    TmrcaStatistics,
    TreePriorLikelihoods,
    BranchRates,
    SubstitutionModels,
    TreeLikelihoods,
    Species,
    Operators,
    Mcmc,
    Loggers,
    Terminal,
}

impl Stage {
    pub const ALL: [Stage; 17] = [
        Stage::Taxa,
        Stage::TaxonSets,
        Stage::Alignments,
        Stage::Patterns,
        Stage::TreePriors,
        Stage::StartingTrees,
        Stage::TreeModels,
        Stage::TmrcaStatistics,
        Stage::TreePriorLikelihoods,
        Stage::BranchRates,
        Stage::SubstitutionModels,
        Stage::TreeLikelihoods,
        Stage::Species,
        Stage::Operators,
        Stage::Mcmc,
        Stage::Loggers,
        Stage::Terminal,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Taxa => "taxa",
            Stage::TaxonSets => "taxon_sets",
            Stage::Alignments => "alignments",
            Stage::Patterns => "patterns",
            Stage::TreePriors => "tree_priors",
            Stage::StartingTrees => "starting_trees",
            Stage::TreeModels => "tree_models",
            Stage::TmrcaStatistics => "tmrca_statistics",
            Stage::TreePriorLikelihoods => "tree_prior_likelihoods",
            Stage::BranchRates => "branch_rates",
            Stage::SubstitutionModels => "substitution_models",
            Stage::TreeLikelihoods => "tree_likelihoods",
            Stage::Species => "species",
            Stage::Operators => "operators",
            Stage::Mcmc => "mcmc",
            Stage::Loggers => "loggers",
            Stage::Terminal => "terminal",
        }
    }

    /// Prefix of a failure message raised by this stage.
    pub fn description(&self) -> &'static str {
        match self {
            Stage::Taxa => "Taxon list generation has failed",
            Stage::TaxonSets => "Taxon sets generation has failed",
            Stage::Alignments => "Alignments generation has failed",
            Stage::Patterns => "Pattern lists generation has failed",
            Stage::TreePriors => "Tree prior model generation has failed",
            Stage::StartingTrees => "Starting tree generation has failed",
            Stage::TreeModels => "Tree model generation has failed",
            Stage::TmrcaStatistics => "TMRCA statistics generation has failed",
            Stage::TreePriorLikelihoods => "Tree prior likelihood generation has failed",
            Stage::BranchRates => "Branch rates model generation has failed",
            Stage::SubstitutionModels => "Substitution model or site model generation has failed",
            Stage::TreeLikelihoods => "Tree likelihood generation has failed",
            Stage::Species => "Multispecies coalescent generation has failed",
            Stage::Operators => "Operators generation has failed",
            Stage::Mcmc | Stage::Loggers => "MCMC or log generation has failed",
            Stage::Terminal => "The last part of XML generation has failed",
        }
    }

    /// Configuration area a failure of this stage points at.
    pub fn category(&self) -> Option<Category> {
        match self {
            Stage::Taxa => Some(Category::Taxa),
            Stage::TaxonSets | Stage::TmrcaStatistics => Some(Category::TaxonSets),
            Stage::Alignments | Stage::Patterns => Some(Category::DataPartitions),
            Stage::TreePriors | Stage::TreePriorLikelihoods => Some(Category::TreePriors),
            Stage::StartingTrees | Stage::TreeModels => Some(Category::Trees),
            Stage::BranchRates => Some(Category::ClockModels),
            Stage::SubstitutionModels | Stage::TreeLikelihoods => Some(Category::SiteModels),
            Stage::Species => Some(Category::Traits),
            Stage::Operators => Some(Category::Operators),
            Stage::Mcmc | Stage::Loggers => Some(Category::Mcmc),
            Stage::Terminal => None,
        }
    }

    fn run_fn(&self) -> StageFn {
        match self {
            Stage::Taxa => taxa::generate_taxa,
            Stage::TaxonSets => taxa::generate_taxon_sets,
            Stage::Alignments => alignment::generate_alignments,
            Stage::Patterns => alignment::generate_patterns,
            Stage::TreePriors => tree_prior::generate_tree_priors,
            Stage::StartingTrees => starting_tree::generate_starting_trees,
            Stage::TreeModels => tree_model::generate_tree_models,
            Stage::TmrcaStatistics => tree_model::generate_tmrca_statistics,
            Stage::TreePriorLikelihoods => tree_prior::generate_tree_prior_likelihoods,
            Stage::BranchRates => clock::generate_branch_rates,
            Stage::SubstitutionModels => substitution::generate_substitution_models,
            Stage::TreeLikelihoods => tree_likelihood::generate_tree_likelihoods,
            Stage::Species => species::generate_species,
            Stage::Operators => operators::generate_operators,
            Stage::Mcmc => mcmc::generate_mcmc,
            Stage::Loggers => logs::generate_loggers,
            Stage::Terminal => mcmc::generate_terminal,
        }
    }

    /// Decorate a stage error with the stage's description. Builder defects
    /// pass through unchanged.
    pub fn wrap_error(&self, err: GenerationError) -> GenerationError {
        if err.is_internal() {
            return err;
        }
        GenerationError::StageFailed {
            stage: self.name().to_string(),
            description: self.description().to_string(),
            message: err.to_string(),
            category: self.category(),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Insertion hook backed by the registry
// ---------------------------------------------------------------------------

struct RegistryHook<'a> {
    registry: &'a ExtensionRegistry,
    config: &'a AnalysisConfig,
    events: &'a EventEmitter,
}

impl InsertionHook for RegistryHook<'_> {
    fn uses(&self, point: InsertionPoint) -> bool {
        self.registry.extensions_at(point, self.config).next().is_some()
    }

    fn insert(&self, point: InsertionPoint, item: InsertionItem<'_>, builder: &mut DocumentBuilder) -> Result<()> {
        let invoked = self
            .registry
            .generate_at_insertion_point(point, item, self.config, builder)?;
        for extension in invoked {
            tracing::debug!(extension = %extension, point = %point, "Extension invoked");
            self.events.emit(GenerationEvent::ExtensionInvoked {
                extension,
                point: point.to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// A finished document with its id bookkeeping.
#[derive(Debug, Clone)]
pub struct GeneratedDocument {
    pub xml: String,
    /// Ids declared through `id` attributes, in document order.
    pub minted_ids: Vec<String>,
    /// Ids referenced through `idref` attributes, in document order.
    pub referenced_ids: Vec<String>,
}

impl GeneratedDocument {
    /// Ids declared more than once.
    pub fn duplicate_ids(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        let mut duplicates = BTreeSet::new();
        for id in &self.minted_ids {
            if !seen.insert(id.as_str()) {
                duplicates.insert(id.as_str());
            }
        }
        duplicates.into_iter().collect()
    }

    /// Referenced ids that no element declares.
    pub fn unresolved_references(&self) -> Vec<&str> {
        let minted: BTreeSet<&str> = self.minted_ids.iter().map(String::as_str).collect();
        let unresolved: BTreeSet<&str> = self
            .referenced_ids
            .iter()
            .map(String::as_str)
            .filter(|id| !minted.contains(id))
            .collect();
        unresolved.into_iter().collect()
    }

    /// Fail on duplicate declarations or dangling references. Either one is a
    /// generator or extension defect, never a configuration problem.
    pub fn check_ids(&self) -> Result<()> {
        let duplicates = self.duplicate_ids();
        if !duplicates.is_empty() {
            tracing::warn!(ids = ?duplicates, "Duplicate ids in generated document");
            return Err(GenerationError::DuplicateIds(duplicates.into_iter().map(String::from).collect()));
        }
        let unresolved = self.unresolved_references();
        if !unresolved.is_empty() {
            tracing::warn!(ids = ?unresolved, "Unresolved references in generated document");
            return Err(GenerationError::UnresolvedReferences(unresolved.into_iter().map(String::from).collect()));
        }
        Ok(())
    }

    /// Write the document next to `path` and rename it into place, so a
    /// reader never sees a partial file.
    pub fn write_atomic(&self, path: &Path) -> Result<()> {
        let file_name = path
            .file_name()
            .ok_or_else(|| GenerationError::Other(format!("Not a file path: {}", path.display())))?;
        let mut temp_name = std::ffi::OsString::from(".");
        temp_name.push(file_name);
        temp_name.push(".tmp");
        let temp = path.with_file_name(temp_name);

        std::fs::write(&temp, &self.xml)?;
        if let Err(e) = std::fs::rename(&temp, path) {
            let _ = std::fs::remove_file(&temp);
            return Err(e.into());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// BeastGenerator
// ---------------------------------------------------------------------------

/// The orchestrator. Owns the extension registry it was built with and an
/// event emitter.
pub struct BeastGenerator {
    registry: ExtensionRegistry,
    events: EventEmitter,
}

impl BeastGenerator {
    /// Create a generator with the given extension registry.
    pub fn new(registry: ExtensionRegistry) -> Self {
        Self {
            registry,
            events: EventEmitter::default(),
        }
    }

    /// Create a generator with the built-in extensions.
    pub fn with_default_registry() -> Self {
        Self::new(default_registry())
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    /// Validate `config` and generate its document. Returns nothing but the
    /// error when any step fails.
    pub fn generate(&self, config: &AnalysisConfig) -> Result<GeneratedDocument> {
        let span = tracing::info_span!(
            "generate",
            taxa = config.taxa.len(),
            partitions = config.partitions.len()
        );
        let _enter = span.enter();
        let started = Instant::now();

        let result = self.run(config, started);
        if let Err(ref e) = result {
            tracing::error!(error = %e, "Generation failed");
            self.events.emit(GenerationEvent::GenerationFailed { error: e.to_string() });
        }
        result
    }

    fn run(&self, config: &AnalysisConfig, started: Instant) -> Result<GeneratedDocument> {
        validate_or_raise(config)?;

        tracing::info!("Generation started");
        self.events.emit(GenerationEvent::GenerationStarted {
            taxa: config.taxa.len(),
            partitions: config.partitions.len(),
        });

        let mut b = DocumentBuilder::new();
        write_header(config, &mut b);
        b.open_tag("beast", &[]);
        b.blank_line();

        let hook = RegistryHook {
            registry: &self.registry,
            config,
            events: &self.events,
        };
        let input = StageInput::new(config, &hook);
        let mut ctx = GenerationContext::new();

        for stage in Stage::ALL {
            ctx = self.run_stage(stage, &input, ctx, &mut b)?;
        }

        let (xml, minted_ids, referenced_ids) = b.finish_with_ids()?;
        let document = GeneratedDocument { xml, minted_ids, referenced_ids };
        tracing::debug!(ids = document.minted_ids.len(), "Identifier bookkeeping");
        document.check_ids()?;

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(bytes = document.xml.len(), duration_ms, "Generation completed");
        self.events.emit(GenerationEvent::GenerationCompleted {
            bytes: document.xml.len(),
            duration_ms,
        });
        Ok(document)
    }

    fn run_stage(
        &self,
        stage: Stage,
        input: &StageInput<'_>,
        ctx: GenerationContext,
        b: &mut DocumentBuilder,
    ) -> Result<GenerationContext> {
        tracing::debug!(stage = %stage, "Stage started");
        self.events.emit(GenerationEvent::StageStarted { stage: stage.name().to_string() });
        let started = Instant::now();

        match (stage.run_fn())(input, ctx, b) {
            Ok(ctx) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                tracing::debug!(stage = %stage, duration_ms, "Stage completed");
                self.events.emit(GenerationEvent::StageCompleted {
                    stage: stage.name().to_string(),
                    duration_ms,
                });
                Ok(ctx)
            }
            Err(e) => {
                let err = stage.wrap_error(e);
                self.events.emit(GenerationEvent::StageFailed {
                    stage: stage.name().to_string(),
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }
}

impl Default for BeastGenerator {
    fn default() -> Self {
        Self::with_default_registry()
    }
}

/// XML declaration and the provenance comment.
fn write_header(config: &AnalysisConfig, b: &mut DocumentBuilder) {
    b.declaration();
    b.blank_line();
    let generated_by = format!("Generated by {TOOL_NAME} v{}", env!("CARGO_PKG_VERSION"));
    let mut lines = vec![generated_by, format!("      {AUTHORSHIP}")];
    if let Some(at) = config.mcmc.generated_at {
        lines.push(format!("      Generated at {}", at.to_rfc3339()));
    }
    let lines: Vec<&str> = lines.iter().map(String::as_str).collect();
    b.comment(&lines);
    b.blank_line();
}
