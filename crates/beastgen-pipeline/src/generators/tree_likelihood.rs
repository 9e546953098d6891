//! Tree likelihoods: one per partition, or one per codon position group.
//! None are written when sampling from the prior only.

use beastgen_types::{GenerationError, Partition, Result};
use beastgen_xml::{attr, DocumentBuilder};

use super::{clock, write_codon_patterns_ref, StageInput};
use crate::context::{GenerationContext, Reference};
use crate::extension::{InsertionItem, InsertionPoint};
use crate::generators::substitution::model_element;

fn write_partition(
    input: &StageInput<'_>,
    partition: &Partition,
    ctx: &mut GenerationContext,
    b: &mut DocumentBuilder,
) -> Result<()> {
    let config = input.config;
    let model = config.substitution_model(&partition.substitution_model).ok_or_else(|| {
        GenerationError::invalid(format!(
            "Partition {} refers to an unknown substitution model, {}",
            partition.name, partition.substitution_model
        ))
    })?;
    let clock_model = config.clock_model(&partition.clock_model).ok_or_else(|| {
        GenerationError::invalid(format!(
            "Partition {} refers to an unknown clock model, {}",
            partition.name, partition.clock_model
        ))
    })?;
    model_element(&model.kind)?;
    let tree_id = input.names.tree_model_id(&partition.tree_model);

    for position in 1..=model.codon.partition_count() {
        let id = input.names.tree_likelihood_id(&partition.name, model.codon, position);
        tracing::debug!(partition = %partition.name, id = %id, "Writing tree likelihood");

        b.comment(&["Likelihood for tree given sequence data"]);
        b.open_tag("treeLikelihood", &[attr("id", &id), attr("useAmbiguities", false)]);
        let patterns = input.names.patterns_id(&partition.name, model.codon, position);
        write_codon_patterns_ref(b, &patterns, model.codon, position);
        b.reference("treeModel", &tree_id);
        b.reference("siteModel", &input.names.site_model_id(model, position));
        clock::write_branch_rates_ref(input, clock_model, &partition.tree_model, b)?;
        input.insert(InsertionPoint::InTreeLikelihood, InsertionItem::Partition(partition), b)?;
        b.close_tag("treeLikelihood")?;
        b.blank_line();

        ctx.tree_likelihoods.push(Reference::new("treeLikelihood", id));
    }
    input.insert(InsertionPoint::AfterTreeLikelihood, InsertionItem::Partition(partition), b)
}

pub fn generate_tree_likelihoods(
    input: &StageInput<'_>,
    mut ctx: GenerationContext,
    b: &mut DocumentBuilder,
) -> Result<GenerationContext> {
    if !input.config.has_data() {
        return Ok(ctx);
    }
    for partition in &input.config.partitions {
        write_partition(input, partition, &mut ctx, b)?;
    }
    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::{InsertionHook, NoInsertions};
    use beastgen_types::{
        AnalysisConfig, ClockKind, ClockModel, CodonPartitioning, SubstitutionKind, SubstitutionModel, TreeModel,
    };

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            partitions: vec![Partition::new("p", "aln", "s", "clock", "tree")],
            substitution_models: vec![SubstitutionModel::new("s", SubstitutionKind::Hky)],
            clock_models: vec![ClockModel::new("clock", ClockKind::Strict)],
            tree_models: vec![TreeModel::new("tree")],
            ..Default::default()
        }
    }

    fn run(config: &AnalysisConfig, hook: &dyn InsertionHook) -> Result<(String, GenerationContext)> {
        let input = StageInput::new(config, hook);
        let mut b = DocumentBuilder::new();
        let ctx = generate_tree_likelihoods(&input, GenerationContext::new(), &mut b)?;
        Ok((b.finish()?, ctx))
    }

    #[test]
    fn references_patterns_tree_site_model_and_rates() {
        let (xml, ctx) = run(&config(), &NoInsertions).unwrap();
        assert!(xml.contains(
            "<treeLikelihood id=\"treeLikelihood\" useAmbiguities=\"false\">\n\
             \t<patterns idref=\"patterns\"/>\n\
             \t<treeModel idref=\"treeModel\"/>\n\
             \t<siteModel idref=\"siteModel\"/>\n\
             \t<strictClockBranchRates idref=\"branchRates\"/>\n\
             </treeLikelihood>"
        ), "{xml}");
        assert_eq!(ctx.tree_likelihoods, vec![Reference::new("treeLikelihood", "treeLikelihood")]);
    }

    #[test]
    fn codon_positions_get_one_likelihood_each() {
        let mut config = config();
        config.substitution_models[0].codon = CodonPartitioning::Positions112;
        let (xml, ctx) = run(&config, &NoInsertions).unwrap();
        assert!(xml.contains("<treeLikelihood id=\"CP1+2.treeLikelihood\""));
        assert!(xml.contains("<mergePatterns idref=\"CP1+2.patterns\"/>"));
        assert!(xml.contains("<siteModel idref=\"CP3.siteModel\"/>"));
        assert_eq!(ctx.tree_likelihoods.len(), 2);
    }

    #[test]
    fn prior_only_writes_no_likelihoods() {
        let mut config = config();
        config.mcmc.sample_prior_only = true;
        let (xml, ctx) = run(&config, &NoInsertions).unwrap();
        assert!(xml.is_empty(), "{xml}");
        assert!(ctx.tree_likelihoods.is_empty());
    }

    #[test]
    fn likelihood_references_branch_rates_of_its_tree() {
        let mut config = config();
        config.tree_models.push(TreeModel::new("tree2"));
        config.partitions.push(Partition::new("p2", "aln", "s", "clock", "tree2"));
        let (xml, _) = run(&config, &NoInsertions).unwrap();
        assert!(xml.contains(
            "<treeLikelihood id=\"p2.treeLikelihood\" useAmbiguities=\"false\">\n\
             \t<patterns idref=\"p2.patterns\"/>\n\
             \t<treeModel idref=\"p2.treeModel\"/>\n\
             \t<siteModel idref=\"siteModel\"/>\n\
             \t<strictClockBranchRates idref=\"p2.branchRates\"/>"
        ), "{xml}");
    }

    #[test]
    fn autocorrelated_clock_reference_is_unsupported() {
        let mut config = config();
        config.clock_models[0].kind = ClockKind::Autocorrelated;
        let err = run(&config, &NoInsertions).unwrap_err();
        assert!(err.to_string().contains("Autocorrelated relaxed clock model not implemented yet"));
    }

    struct Marker;

    impl InsertionHook for Marker {
        fn uses(&self, point: InsertionPoint) -> bool {
            point == InsertionPoint::InTreeLikelihood
        }

        fn insert(&self, point: InsertionPoint, item: InsertionItem<'_>, b: &mut DocumentBuilder) -> Result<()> {
            if let (InsertionPoint::InTreeLikelihood, InsertionItem::Partition(p)) = (point, item) {
                b.tag("marker", &[attr("partition", &p.name)], true);
            }
            Ok(())
        }
    }

    #[test]
    fn insertion_inside_the_likelihood_element() {
        let (xml, _) = run(&config(), &Marker).unwrap();
        assert!(xml.contains("\t<marker partition=\"p\"/>\n</treeLikelihood>"), "{xml}");
    }
}
