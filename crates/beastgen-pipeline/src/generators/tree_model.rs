//! Tree models and the per-clade statistics defined on them.

use beastgen_types::{
    ClockKind, ClockModel, Operator, OperatorKind, Parameter, Result, TaxonSet, TreeModel,
};
use beastgen_xml::{attr, DocumentBuilder};

use super::{mint_parameter, starting_tree::starting_tree_element, StageInput};
use crate::context::{GenerationContext, ParameterFamily, Reference};
use crate::extension::{InsertionItem, InsertionPoint};

/// Clock models whose rates live on the nodes of `tree`.
fn node_rate_clocks<'a>(input: &StageInput<'a>, tree: &TreeModel) -> Vec<&'a ClockModel> {
    let config = input.config;
    config
        .active_clock_models()
        .filter(|c| matches!(c.kind, ClockKind::RandomLocal | ClockKind::Autocorrelated))
        .filter(|c| config.tree_models_for_clock(&c.name).contains(&tree.name.as_str()))
        .collect()
}

fn write_node_parameters(
    input: &StageInput<'_>,
    tree: &TreeModel,
    clock: &ClockModel,
    ctx: &mut GenerationContext,
    b: &mut DocumentBuilder,
) -> Result<()> {
    let family = ParameterFamily::Clock;
    let all_nodes = [
        attr("rootNode", false),
        attr("internalNodes", true),
        attr("leafNodes", true),
    ];
    match clock.kind {
        ClockKind::RandomLocal => {
            let cp = input.names.clock_prefix(&clock.name);
            b.open_tag("nodeRates", &all_nodes);
            mint_parameter_inline(ctx, b, &format!("{cp}localClock.relativeRates"), "localClock.relativeRates", family, clock)?;
            b.close_tag("nodeRates")?;
            b.open_tag("nodeTraits", &all_nodes);
            mint_parameter_inline(ctx, b, &format!("{cp}localClock.changes"), "localClock.changes", family, clock)?;
            b.close_tag("nodeTraits")?;
        }
        ClockKind::Autocorrelated => {
            let tree_id = input.names.tree_model_id(&tree.name);
            b.open_tag("nodeRates", &all_nodes);
            mint_parameter_inline(ctx, b, &format!("{tree_id}.nodeRates"), "treeModel.nodeRates", family, clock)?;
            b.close_tag("nodeRates")?;
            b.open_tag(
                "nodeRates",
                &[attr("rootNode", true), attr("internalNodes", false), attr("leafNodes", false)],
            );
            mint_parameter_inline(ctx, b, &format!("{tree_id}.rootRate"), "treeModel.rootRate", family, clock)?;
            b.close_tag("nodeRates")?;
        }
        _ => {}
    }
    Ok(())
}

/// A catalog parameter written directly inside the current element.
fn mint_parameter_inline(
    ctx: &mut GenerationContext,
    b: &mut DocumentBuilder,
    id: &str,
    name: &str,
    family: ParameterFamily,
    clock: &ClockModel,
) -> Result<Parameter> {
    let p = ctx.mint(id, name, family, &clock.parameters)?;
    super::write_parameter(b, id, &p);
    Ok(p)
}

pub fn generate_tree_models(
    input: &StageInput<'_>,
    mut ctx: GenerationContext,
    b: &mut DocumentBuilder,
) -> Result<GenerationContext> {
    for tree in &input.config.tree_models {
        let id = input.names.tree_model_id(&tree.name);
        tracing::debug!(tree_model = %tree.name, id = %id, "Writing tree model");

        b.comment(&["Generate a tree model"]);
        b.open_tag("treeModel", &[attr("id", &id)]);
        b.reference(starting_tree_element(tree), &input.names.starting_tree_id(&tree.name));

        let root = format!("{id}.rootHeight");
        mint_parameter(&mut ctx, b, "rootHeight", &root, "treeModel.rootHeight", ParameterFamily::TreeModel, &tree.parameters)?;

        let internal = format!("{id}.internalNodeHeights");
        b.open_tag("nodeHeights", &[attr("internalNodes", true)]);
        let p = ctx.mint(&internal, "treeModel.internalNodeHeights", ParameterFamily::TreeModel, &tree.parameters)?;
        super::write_parameter(b, &internal, &p);
        b.close_tag("nodeHeights")?;

        let all = format!("{id}.allInternalNodeHeights");
        b.open_tag("nodeHeights", &[attr("internalNodes", true), attr("rootNode", true)]);
        let p = ctx.mint(&all, "treeModel.allInternalNodeHeights", ParameterFamily::TreeModel, &tree.parameters)?;
        super::write_parameter(b, &all, &p);
        b.close_tag("nodeHeights")?;

        for clock in node_rate_clocks(input, tree) {
            write_node_parameters(input, tree, clock, &mut ctx, b)?;
        }
        b.close_tag("treeModel")?;
        b.blank_line();

        for p in [&root, &internal, &all] {
            ctx.attach_tree_model(p, &id);
        }
        ctx.add_operator(Operator::on_tree(OperatorKind::SubtreeSlide, &id, 1.0, 15.0));
        ctx.add_operator(Operator::on_tree(OperatorKind::NarrowExchange, &id, 1.0, 15.0));
        ctx.add_operator(Operator::on_tree(OperatorKind::WideExchange, &id, 1.0, 3.0));
        ctx.add_operator(Operator::on_tree(OperatorKind::WilsonBalding, &id, 1.0, 3.0));

        input.insert(InsertionPoint::AfterTreeModel, InsertionItem::TreeModel(tree), b)?;
    }
    Ok(ctx)
}

// ---------------------------------------------------------------------------
// TMRCA and monophyly statistics
// ---------------------------------------------------------------------------

/// Whether a taxon set is the calibrated node of a calibrated-Yule tree, in
/// which case the speciation likelihood carries its prior.
pub fn is_yule_calibration_node(input: &StageInput<'_>, set: &TaxonSet) -> bool {
    let config = input.config;
    set.is_calibrated()
        && set.monophyletic
        && config
            .tree_model_of_set(set)
            .map(|t| config.uses_calibrated_yule(t))
            .unwrap_or(false)
}

pub fn generate_tmrca_statistics(
    input: &StageInput<'_>,
    mut ctx: GenerationContext,
    b: &mut DocumentBuilder,
) -> Result<GenerationContext> {
    let config = input.config;
    for set in &config.taxon_sets {
        let tree = config.tree_model_of_set(set).unwrap_or_default();
        let tree_id = input.names.tree_model_id(tree);

        let tmrca = input.names.tmrca_id(set);
        let mut attrs = vec![attr("id", &tmrca)];
        if set.include_stem {
            attrs.push(attr("includeStem", true));
        }
        b.open_tag("tmrcaStatistic", &attrs);
        b.open_tag("mrca", &[]);
        b.reference("taxa", &set.id);
        b.close_tag("mrca")?;
        b.reference("treeModel", &tree_id);
        b.close_tag("tmrcaStatistic")?;
        ctx.tmrca_statistics.push(Reference::new("tmrcaStatistic", tmrca.clone()));

        if let Some(ref calibration) = set.calibration {
            if !is_yule_calibration_node(input, set) {
                let parameter = Parameter {
                    prior: calibration.clone(),
                    ..Parameter::unset()
                };
                ctx.mint_statistic("tmrcaStatistic", &tmrca, "tmrca", ParameterFamily::Statistic, parameter);
            }
        }

        if set.monophyletic {
            let monophyly = input.names.monophyly_id(set);
            b.open_tag("monophylyStatistic", &[attr("id", &monophyly)]);
            b.open_tag("mrca", &[]);
            b.reference("taxa", &set.id);
            b.close_tag("mrca")?;
            b.reference("treeModel", &tree_id);
            b.close_tag("monophylyStatistic")?;
            ctx.monophyly_statistics.push(Reference::new("monophylyStatistic", monophyly));
        }
        b.blank_line();
    }
    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::NoInsertions;
    use beastgen_types::{AnalysisConfig, Partition, PriorKind, TreePrior, TreePriorKind};

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            tree_models: vec![TreeModel::new("tree")],
            partitions: vec![Partition::new("p", "aln", "s", "clock", "tree")],
            clock_models: vec![ClockModel::new("clock", ClockKind::Strict)],
            ..Default::default()
        }
    }

    fn tree_models(config: &AnalysisConfig) -> (String, GenerationContext) {
        let input = StageInput::new(config, &NoInsertions);
        let mut b = DocumentBuilder::new();
        let ctx = generate_tree_models(&input, GenerationContext::new(), &mut b).unwrap();
        (b.finish().unwrap(), ctx)
    }

    #[test]
    fn tree_model_has_height_parameters() {
        let (xml, ctx) = tree_models(&config());
        assert!(xml.contains("<treeModel id=\"treeModel\">\n\t<coalescentTree idref=\"startingTree\"/>"), "{xml}");
        assert!(xml.contains("<rootHeight>\n\t\t<parameter id=\"treeModel.rootHeight\"/>"));
        assert!(xml.contains("<nodeHeights internalNodes=\"true\" rootNode=\"true\">"));
        assert_eq!(
            ctx.parameter("treeModel.rootHeight").unwrap().tree_model.as_deref(),
            Some("treeModel")
        );
        assert!(ctx.operators.iter().any(|op| op.kind == OperatorKind::WilsonBalding));
        assert!(ctx.operators.iter().any(|op| op.kind == OperatorKind::Uniform));
    }

    #[test]
    fn random_local_clock_adds_node_rates() {
        let mut config = config();
        config.clock_models[0].kind = ClockKind::RandomLocal;
        let (xml, ctx) = tree_models(&config);
        assert!(xml.contains("<parameter id=\"localClock.relativeRates\" value=\"1.0\" lower=\"0.0\"/>"));
        assert!(xml.contains("<nodeTraits rootNode=\"false\" internalNodes=\"true\" leafNodes=\"true\">"));
        assert!(ctx.is_parameter("localClock.changes"));
    }

    fn statistics(config: &AnalysisConfig) -> (String, GenerationContext) {
        let input = StageInput::new(config, &NoInsertions);
        let mut b = DocumentBuilder::new();
        let ctx = generate_tmrca_statistics(&input, GenerationContext::new(), &mut b).unwrap();
        (b.finish().unwrap(), ctx)
    }

    #[test]
    fn tmrca_and_monophyly_statistics() {
        let mut config = config();
        let mut set = TaxonSet::new("clade", &["A", "B"]);
        set.monophyletic = true;
        set.calibration = Some(PriorKind::Normal { mean: 10.0, stdev: 1.0 });
        config.taxon_sets.push(set);
        let (xml, ctx) = statistics(&config);
        assert!(xml.contains("<tmrcaStatistic id=\"tmrca(clade)\">"));
        assert!(xml.contains("<monophylyStatistic id=\"monophyly(clade)\">"));
        assert_eq!(ctx.monophyly_statistics.len(), 1);
        let stat = ctx.parameter("tmrca(clade)").unwrap();
        assert!(stat.parameter.has_prior());
    }

    #[test]
    fn calibrated_yule_node_carries_no_statistic_prior() {
        let mut config = config();
        config.tree_priors.push(TreePrior::new("prior", "tree", TreePriorKind::YuleCalibration));
        let mut set = TaxonSet::new("clade", &["A", "B"]);
        set.monophyletic = true;
        set.calibration = Some(PriorKind::Normal { mean: 10.0, stdev: 1.0 });
        config.taxon_sets.push(set);
        let (_, ctx) = statistics(&config);
        assert!(ctx.parameter("tmrca(clade)").is_none());
        assert_eq!(ctx.tmrca_statistics.len(), 1);
    }

    #[test]
    fn include_stem_is_written_when_set() {
        let mut config = config();
        let mut set = TaxonSet::new("clade", &["A", "B"]);
        set.include_stem = true;
        config.taxon_sets.push(set);
        let (xml, ctx) = statistics(&config);
        assert!(xml.contains("<tmrcaStatistic id=\"tmrca(clade)\" includeStem=\"true\">"));
        assert!(ctx.parameter("tmrca(clade)").is_none());
    }
}
