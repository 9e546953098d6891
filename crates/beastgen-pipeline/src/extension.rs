//! Extension trait, insertion points, and the extension registry.
//!
//! Extensions contribute markup at named insertion points without knowing
//! anything about the fragment generators. The registry is built once and
//! handed to the orchestrator at construction; generators only see an
//! [`InsertionHook`].

use beastgen_types::{AnalysisConfig, Partition, Result, Taxon, TreeModel};
use beastgen_xml::DocumentBuilder;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Insertion points
// ---------------------------------------------------------------------------

/// Named places in the document where extensions may add markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InsertionPoint {
    BeforeTaxa,
    InTaxon,
    AfterTaxa,
    AfterSequences,
    AfterPatterns,
    AfterTreeModel,
    AfterTreePrior,
    AfterSubstitutionModel,
    AfterSiteModel,
    InTreeLikelihood,
    AfterTreeLikelihood,
    AfterTraits,
    InOperators,
    AfterOperators,
    InMcmcPrior,
    InMcmcLikelihood,
    AfterMcmc,
    InScreenLog,
    AfterScreenLog,
    InFileLogParameters,
    InFileLogLikelihoods,
    AfterFileLog,
    InTreesLog,
    AfterTreesLog,
}

impl InsertionPoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsertionPoint::BeforeTaxa => "BEFORE_TAXA",
            InsertionPoint::InTaxon => "IN_TAXON",
            InsertionPoint::AfterTaxa => "AFTER_TAXA",
            InsertionPoint::AfterSequences => "AFTER_SEQUENCES",
            InsertionPoint::AfterPatterns => "AFTER_PATTERNS",
            InsertionPoint::AfterTreeModel => "AFTER_TREE_MODEL",
            InsertionPoint::AfterTreePrior => "AFTER_TREE_PRIOR",
            InsertionPoint::AfterSubstitutionModel => "AFTER_SUBSTITUTION_MODEL",
            InsertionPoint::AfterSiteModel => "AFTER_SITE_MODEL",
            InsertionPoint::InTreeLikelihood => "IN_TREE_LIKELIHOOD",
            InsertionPoint::AfterTreeLikelihood => "AFTER_TREE_LIKELIHOOD",
            InsertionPoint::AfterTraits => "AFTER_TRAITS",
            InsertionPoint::InOperators => "IN_OPERATORS",
            InsertionPoint::AfterOperators => "AFTER_OPERATORS",
            InsertionPoint::InMcmcPrior => "IN_MCMC_PRIOR",
            InsertionPoint::InMcmcLikelihood => "IN_MCMC_LIKELIHOOD",
            InsertionPoint::AfterMcmc => "AFTER_MCMC",
            InsertionPoint::InScreenLog => "IN_SCREEN_LOG",
            InsertionPoint::AfterScreenLog => "AFTER_SCREEN_LOG",
            InsertionPoint::InFileLogParameters => "IN_FILE_LOG_PARAMETERS",
            InsertionPoint::InFileLogLikelihoods => "IN_FILE_LOG_LIKELIHOODS",
            InsertionPoint::AfterFileLog => "AFTER_FILE_LOG",
            InsertionPoint::InTreesLog => "IN_TREES_LOG",
            InsertionPoint::AfterTreesLog => "AFTER_TREES_LOG",
        }
    }
}

impl std::fmt::Display for InsertionPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The configuration entity an insertion point is being visited for.
#[derive(Debug, Clone, Copy)]
pub enum InsertionItem<'a> {
    None,
    Taxon(&'a Taxon),
    Partition(&'a Partition),
    TreeModel(&'a TreeModel),
}

// ---------------------------------------------------------------------------
// Extension trait
// ---------------------------------------------------------------------------

pub trait Extension: Send + Sync {
    /// Unique registry name.
    fn name(&self) -> &str;

    /// Text of the START/END comments bracketing this extension's output.
    fn comment_label(&self) -> &str;

    fn uses_insertion_point(&self, point: InsertionPoint, config: &AnalysisConfig) -> bool;

    fn generate(
        &self,
        point: InsertionPoint,
        item: InsertionItem<'_>,
        config: &AnalysisConfig,
        builder: &mut DocumentBuilder,
    ) -> Result<()>;
}

// ---------------------------------------------------------------------------
// ExtensionRegistry
// ---------------------------------------------------------------------------

/// Registered extensions in registration order. Order is the order in which
/// they write at a shared insertion point.
pub struct ExtensionRegistry {
    extensions: Vec<Box<dyn Extension>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self { extensions: Vec::new() }
    }

    /// Register an extension. A later registration with the same name
    /// replaces the earlier one in place.
    pub fn register(&mut self, extension: impl Extension + 'static) {
        let name = extension.name().to_string();
        match self.extensions.iter().position(|e| e.name() == name) {
            Some(i) => self.extensions[i] = Box::new(extension),
            None => self.extensions.push(Box::new(extension)),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.extensions.iter().any(|e| e.name() == name)
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Extensions that write at `point` for this configuration.
    pub fn extensions_at<'a>(
        &'a self,
        point: InsertionPoint,
        config: &'a AnalysisConfig,
    ) -> impl Iterator<Item = &'a Box<dyn Extension>> + 'a {
        self.extensions
            .iter()
            .filter(move |e| e.uses_insertion_point(point, config))
    }

    /// Let every extension using `point` write its fragment, bracketed by
    /// START/END comments. Returns the names of the extensions that wrote.
    pub fn generate_at_insertion_point(
        &self,
        point: InsertionPoint,
        item: InsertionItem<'_>,
        config: &AnalysisConfig,
        builder: &mut DocumentBuilder,
    ) -> Result<Vec<String>> {
        let mut invoked = Vec::new();
        for extension in self.extensions_at(point, config) {
            let label = extension.comment_label();
            builder.comment(&[&format!("START {label}")]);
            extension.generate(point, item, config, builder)?;
            builder.comment(&[&format!("END {label}")]);
            invoked.push(extension.name().to_string());
        }
        Ok(invoked)
    }
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry with the built-in extensions.
pub fn default_registry() -> ExtensionRegistry {
    let mut reg = ExtensionRegistry::new();
    reg.register(crate::extensions::MarginalLikelihoodExtension);
    reg
}

// ---------------------------------------------------------------------------
// InsertionHook
// ---------------------------------------------------------------------------

/// What a fragment generator calls at an insertion point. The orchestrator
/// supplies an implementation backed by its registry.
pub trait InsertionHook {
    /// Whether anything will be written at `point`.
    fn uses(&self, point: InsertionPoint) -> bool;

    fn insert(
        &self,
        point: InsertionPoint,
        item: InsertionItem<'_>,
        builder: &mut DocumentBuilder,
    ) -> Result<()>;
}

/// A hook that writes nothing. Used when generators run outside the
/// orchestrator.
pub struct NoInsertions;

impl InsertionHook for NoInsertions {
    fn uses(&self, _: InsertionPoint) -> bool {
        false
    }

    fn insert(&self, _: InsertionPoint, _: InsertionItem<'_>, _: &mut DocumentBuilder) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beastgen_types::GenerationError;

    struct Marker {
        name: &'static str,
        point: InsertionPoint,
    }

    impl Extension for Marker {
        fn name(&self) -> &str {
            self.name
        }
        fn comment_label(&self) -> &str {
            self.name
        }
        fn uses_insertion_point(&self, point: InsertionPoint, _: &AnalysisConfig) -> bool {
            point == self.point
        }
        fn generate(
            &self,
            _: InsertionPoint,
            item: InsertionItem<'_>,
            _: &AnalysisConfig,
            builder: &mut DocumentBuilder,
        ) -> Result<()> {
            match item {
                InsertionItem::Taxon(t) => builder.tag("marker", &[beastgen_xml::attr("taxon", &t.id)], true),
                _ => builder.tag("marker", &[], true),
            }
            Ok(())
        }
    }

    struct Failing;

    impl Extension for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        fn comment_label(&self) -> &str {
            "Failing"
        }
        fn uses_insertion_point(&self, _: InsertionPoint, _: &AnalysisConfig) -> bool {
            true
        }
        fn generate(
            &self,
            _: InsertionPoint,
            _: InsertionItem<'_>,
            _: &AnalysisConfig,
            _: &mut DocumentBuilder,
        ) -> Result<()> {
            Err(GenerationError::unsupported("nothing to write"))
        }
    }

    #[test]
    fn brackets_output_with_start_and_end_comments() {
        let mut reg = ExtensionRegistry::new();
        reg.register(Marker { name: "m", point: InsertionPoint::AfterTaxa });
        let config = AnalysisConfig::default();
        let mut b = DocumentBuilder::new();
        let invoked = reg
            .generate_at_insertion_point(InsertionPoint::AfterTaxa, InsertionItem::None, &config, &mut b)
            .unwrap();
        assert_eq!(invoked, vec!["m"]);
        assert_eq!(b.as_str(), "<!-- START m -->\n<marker/>\n<!-- END m -->\n");
    }

    #[test]
    fn other_points_write_nothing() {
        let mut reg = ExtensionRegistry::new();
        reg.register(Marker { name: "m", point: InsertionPoint::AfterTaxa });
        let config = AnalysisConfig::default();
        let mut b = DocumentBuilder::new();
        let invoked = reg
            .generate_at_insertion_point(InsertionPoint::AfterMcmc, InsertionItem::None, &config, &mut b)
            .unwrap();
        assert!(invoked.is_empty());
        assert!(b.as_str().is_empty());
    }

    #[test]
    fn item_is_passed_through() {
        let mut reg = ExtensionRegistry::new();
        reg.register(Marker { name: "m", point: InsertionPoint::InTaxon });
        let config = AnalysisConfig::default();
        let taxon = Taxon::new("A");
        let mut b = DocumentBuilder::new();
        reg.generate_at_insertion_point(InsertionPoint::InTaxon, InsertionItem::Taxon(&taxon), &config, &mut b)
            .unwrap();
        assert!(b.as_str().contains("<marker taxon=\"A\"/>"));
    }

    #[test]
    fn registration_order_is_preserved_and_names_replace() {
        let mut reg = ExtensionRegistry::new();
        reg.register(Marker { name: "b", point: InsertionPoint::AfterTaxa });
        reg.register(Marker { name: "a", point: InsertionPoint::AfterTaxa });
        reg.register(Marker { name: "b", point: InsertionPoint::AfterTaxa });
        assert_eq!(reg.len(), 2);
        let config = AnalysisConfig::default();
        let names: Vec<&str> = reg
            .extensions_at(InsertionPoint::AfterTaxa, &config)
            .map(|e| e.name())
            .collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn extension_errors_propagate() {
        let mut reg = ExtensionRegistry::new();
        reg.register(Failing);
        let config = AnalysisConfig::default();
        let mut b = DocumentBuilder::new();
        let err = reg
            .generate_at_insertion_point(InsertionPoint::AfterTaxa, InsertionItem::None, &config, &mut b)
            .unwrap_err();
        assert!(err.to_string().contains("nothing to write"));
    }

    #[test]
    fn default_registry_has_marginal_likelihood() {
        let reg = default_registry();
        assert!(reg.has("marginal_likelihood"));
        assert!(!reg.has("nonexistent"));
    }

    #[test]
    fn insertion_point_names() {
        assert_eq!(InsertionPoint::AfterTaxa.to_string(), "AFTER_TAXA");
        assert_eq!(
            serde_json::to_string(&InsertionPoint::InFileLogParameters).unwrap(),
            "\"IN_FILE_LOG_PARAMETERS\""
        );
    }
}
