//! Tree priors: demographic and speciation model elements (written before
//! the starting trees they seed) and the prior likelihoods over the tree
//! models (written after them).

use beastgen_types::{
    GenerationError, Operator, OperatorKind, Parameter, Parameterization, Result, TaxonSet,
    TreeModel, TreePrior, TreePriorKind,
};
use beastgen_xml::{attr, num_attr, DocumentBuilder};

use super::{
    mint_parameter, write_distribution_model, write_parameter_block, write_parameter_ref_block,
    StageInput,
};
use crate::context::{GenerationContext, ParameterFamily, Reference};
use crate::extension::{InsertionItem, InsertionPoint};

const INITIAL_DEMO_POP_SIZE: f64 = 100.0;

// ---------------------------------------------------------------------------
// Demographic and speciation models
// ---------------------------------------------------------------------------

/// Element name and parameter stem of a parametric coalescent model.
fn demographic_element(kind: &TreePriorKind) -> Option<(&'static str, &'static str)> {
    match kind {
        TreePriorKind::Constant => Some(("constantSize", "constant")),
        TreePriorKind::Exponential => Some(("exponentialGrowth", "exponential")),
        TreePriorKind::Logistic => Some(("logisticGrowth", "logistic")),
        TreePriorKind::Expansion => Some(("expansion", "expansion")),
        _ => None,
    }
}

/// Element name and id stem of a speciation model.
fn speciation_element(kind: &TreePriorKind) -> Option<(&'static str, &'static str)> {
    match kind {
        TreePriorKind::Yule | TreePriorKind::YuleCalibration => Some(("yuleModel", "yule")),
        TreePriorKind::BirthDeath | TreePriorKind::BirthDeathIncompleteSampling => {
            Some(("birthDeathModel", "birthDeath"))
        }
        _ => None,
    }
}

fn write_growth(
    input: &StageInput<'_>,
    prior: &TreePrior,
    stem: &str,
    ctx: &mut GenerationContext,
    b: &mut DocumentBuilder,
) -> Result<()> {
    let p = input.names.tree_prior_prefix(&prior.name);
    let (wrapper, name) = match prior.parameterization {
        Parameterization::GrowthRate => ("growthRate", format!("{stem}.growthRate")),
        Parameterization::DoublingTime => ("doublingTime", format!("{stem}.doublingTime")),
    };
    mint_parameter(ctx, b, wrapper, &format!("{p}{name}"), &name, ParameterFamily::TreePrior, &prior.parameters)?;
    Ok(())
}

/// Write the model element of one tree prior. Returns the demographic model
/// that can seed the starting tree, if the prior has one of its own.
fn write_tree_prior_model(
    input: &StageInput<'_>,
    prior: &TreePrior,
    ctx: &mut GenerationContext,
    b: &mut DocumentBuilder,
) -> Result<Option<Reference>> {
    let p = input.names.tree_prior_prefix(&prior.name);
    let units = input.units();
    let family = ParameterFamily::TreePrior;

    if let Some((element, stem)) = demographic_element(&prior.kind) {
        let id = format!("{p}{stem}");
        let pop_size = format!("{p}{stem}.popSize");
        b.comment(&[&format!("A prior assumption that the population size follows a {} model.", prior.kind.name())]);
        b.open_tag(element, &[attr("id", &id), attr("units", units)]);
        mint_parameter(ctx, b, "populationSize", &pop_size, &format!("{stem}.popSize"), family, &prior.parameters)?;
        match prior.kind {
            TreePriorKind::Exponential => write_growth(input, prior, stem, ctx, b)?,
            TreePriorKind::Logistic => {
                write_growth(input, prior, stem, ctx, b)?;
                mint_parameter(ctx, b, "t50", &format!("{p}logistic.t50"), "logistic.t50", family, &prior.parameters)?;
            }
            TreePriorKind::Expansion => {
                mint_parameter(
                    ctx,
                    b,
                    "ancestralPopulationProportion",
                    &format!("{p}expansion.ancestralProportion"),
                    "expansion.ancestralProportion",
                    family,
                    &prior.parameters,
                )?;
                write_growth(input, prior, stem, ctx, b)?;
            }
            _ => {}
        }
        b.close_tag(element)?;
        b.blank_line();

        if matches!(prior.kind, TreePriorKind::Constant | TreePriorKind::Exponential) {
            return Ok(Some(Reference::new(element, id)));
        }
        // Growth models seed the starting tree from a constant model sharing
        // their population size.
        let demo = input.names.initial_demo_id(&prior.tree_model);
        b.comment(&["This is a simple constant population size coalescent model", "that is used to generate an initial tree for the chain."]);
        b.open_tag("constantSize", &[attr("id", &demo), attr("units", units)]);
        write_parameter_ref_block(b, "populationSize", &pop_size)?;
        b.close_tag("constantSize")?;
        b.blank_line();
        return Ok(Some(Reference::new("constantSize", demo)));
    }

    if let Some((element, stem)) = speciation_element(&prior.kind) {
        let id = format!("{p}{stem}");
        b.comment(&[&format!("A prior on the distribution of node heights defined by a {} process.", prior.kind.name())]);
        b.open_tag(element, &[attr("id", &id), attr("units", units)]);
        if stem == "yule" {
            mint_parameter(ctx, b, "birthRate", &format!("{p}yule.birthRate"), "yule.birthRate", family, &prior.parameters)?;
        } else {
            mint_parameter(
                ctx,
                b,
                "birthMinusDeathRate",
                &format!("{p}birthDeath.meanGrowthRate"),
                "birthDeath.meanGrowthRate",
                family,
                &prior.parameters,
            )?;
            mint_parameter(
                ctx,
                b,
                "relativeDeathRate",
                &format!("{p}birthDeath.relativeDeathRate"),
                "birthDeath.relativeDeathRate",
                family,
                &prior.parameters,
            )?;
            if prior.kind == TreePriorKind::BirthDeathIncompleteSampling {
                mint_parameter(
                    ctx,
                    b,
                    "sampleProportion",
                    &format!("{p}birthDeath.samplingProportion"),
                    "birthDeath.samplingProportion",
                    family,
                    &prior.parameters,
                )?;
            }
        }
        b.close_tag(element)?;
        b.blank_line();
    }
    Ok(None)
}

/// A constant model with a fresh population size, for trees whose prior has
/// no demographic model of its own.
fn write_initial_demo(input: &StageInput<'_>, tree: &TreeModel, b: &mut DocumentBuilder) -> Result<Reference> {
    let demo = input.names.initial_demo_id(&tree.name);
    b.comment(&["This is a simple constant population size coalescent model", "that is used to generate an initial tree for the chain."]);
    b.open_tag("constantSize", &[attr("id", &demo), attr("units", input.units())]);
    b.open_tag("populationSize", &[]);
    b.tag(
        "parameter",
        &[
            attr("id", format!("{demo}.popSize")),
            num_attr("value", INITIAL_DEMO_POP_SIZE),
            num_attr("lower", 0.0),
        ],
        true,
    );
    b.close_tag("populationSize")?;
    b.close_tag("constantSize")?;
    b.blank_line();
    Ok(Reference::new("constantSize", demo))
}

pub fn generate_tree_priors(
    input: &StageInput<'_>,
    mut ctx: GenerationContext,
    b: &mut DocumentBuilder,
) -> Result<GenerationContext> {
    for tree in &input.config.tree_models {
        let own = match input.config.tree_prior_for(&tree.name) {
            Some(prior) => {
                tracing::debug!(tree_prior = %prior.name, kind = prior.kind.name(), "Writing tree prior model");
                write_tree_prior_model(input, prior, &mut ctx, b)?
            }
            None => None,
        };
        let seed = match own {
            Some(seed) => seed,
            None => write_initial_demo(input, tree, b)?,
        };
        ctx.demographic_seeds.insert(tree.name.clone(), seed);
    }
    Ok(ctx)
}

// ---------------------------------------------------------------------------
// Prior likelihoods
// ---------------------------------------------------------------------------

/// The calibrated monophyletic node of a calibrated-Yule tree.
fn yule_calibration<'a>(input: &StageInput<'a>, prior: &TreePrior) -> Option<&'a TaxonSet> {
    let config = input.config;
    config.taxon_sets.iter().find(|set| {
        set.is_calibrated() && set.monophyletic && config.tree_model_of_set(set) == Some(prior.tree_model.as_str())
    })
}

fn write_tree_ref(b: &mut DocumentBuilder, wrapper: &str, tree_id: &str) -> Result<()> {
    b.open_tag(wrapper, &[]);
    b.reference("treeModel", tree_id);
    b.close_tag(wrapper)
}

fn write_speciation_likelihood(
    input: &StageInput<'_>,
    prior: &TreePrior,
    ctx: &mut GenerationContext,
    b: &mut DocumentBuilder,
) -> Result<()> {
    let p = input.names.tree_prior_prefix(&prior.name);
    let tree_id = input.names.tree_model_id(&prior.tree_model);
    let (element, stem) = speciation_element(&prior.kind).unwrap_or(("yuleModel", "yule"));
    let id = format!("{p}speciation");

    b.comment(&["Generate a speciation likelihood for Yule or Birth Death"]);
    b.open_tag("speciationLikelihood", &[attr("id", &id)]);
    b.open_tag("model", &[]);
    b.reference(element, &format!("{p}{stem}"));
    b.close_tag("model")?;
    write_tree_ref(b, "speciesTree", &tree_id)?;
    if prior.kind == TreePriorKind::YuleCalibration {
        if let Some(set) = yule_calibration(input, prior) {
            if let Some(ref calibration) = set.calibration {
                b.open_tag("calibration", &[attr("correction", "exact")]);
                b.open_tag("point", &[]);
                b.reference("taxa", &set.id);
                write_distribution_model(b, None, calibration)?;
                b.close_tag("point")?;
                b.close_tag("calibration")?;
            }
        }
    }
    b.close_tag("speciationLikelihood")?;
    ctx.prior_likelihoods.push(Reference::new("speciationLikelihood", id));
    Ok(())
}

fn write_coalescent_likelihood(
    b: &mut DocumentBuilder,
    id: &str,
    model: &Reference,
    tree_id: &str,
) -> Result<Reference> {
    b.open_tag("coalescentLikelihood", &[attr("id", id)]);
    b.open_tag("model", &[]);
    b.reference(&model.element, &model.id);
    b.close_tag("model")?;
    write_tree_ref(b, "populationTree", tree_id)?;
    b.close_tag("coalescentLikelihood")?;
    Ok(Reference::new("coalescentLikelihood", id))
}

fn write_logistic_test(
    input: &StageInput<'_>,
    prior: &TreePrior,
    ctx: &mut GenerationContext,
    b: &mut DocumentBuilder,
) -> Result<()> {
    let p = input.names.tree_prior_prefix(&prior.name);
    let tree_id = input.names.tree_model_id(&prior.tree_model);
    let id = format!("{p}booleanLikelihood1");
    b.comment(&["Keep the logistic midpoint below the root of the tree."]);
    b.open_tag("booleanLikelihood", &[attr("id", &id)]);
    let test = format!("{p}test1");
    b.open_tag("testStatistic", &[attr("id", &test), attr("name", &test)]);
    b.reference("parameter", &format!("{p}logistic.t50"));
    b.open_tag("lessThan", &[]);
    b.reference("parameter", &format!("{tree_id}.rootHeight"));
    b.close_tag("lessThan")?;
    b.close_tag("testStatistic")?;
    b.close_tag("booleanLikelihood")?;
    ctx.prior_likelihoods.push(Reference::new("booleanLikelihood", id));
    Ok(())
}

fn write_skyline(
    input: &StageInput<'_>,
    prior: &TreePrior,
    groups: usize,
    linear: bool,
    ctx: &mut GenerationContext,
    b: &mut DocumentBuilder,
) -> Result<()> {
    let p = input.names.tree_prior_prefix(&prior.name);
    let tree_id = input.names.tree_model_id(&prior.tree_model);
    let id = format!("{p}skyline");
    let pop_size = format!("{p}skyline.popSize");
    let group_size = format!("{p}skyline.groupSize");
    let pop_dimension = if linear { groups + 1 } else { groups };

    b.comment(&["Generate a generalizedSkyLineLikelihood for Bayesian Skyline"]);
    b.open_tag(
        "generalizedSkyLineLikelihood",
        &[attr("id", &id), attr("linear", linear)],
    );
    let pop = ctx.mint_dimensioned(&pop_size, "skyline.popSize", ParameterFamily::TreePrior, &prior.parameters, pop_dimension)?;
    write_parameter_block(b, "populationSizes", &pop_size, &pop)?;
    let group = ctx.mint_dimensioned(&group_size, "skyline.groupSize", ParameterFamily::TreePrior, &prior.parameters, groups)?;
    write_parameter_block(b, "groupSizes", &group_size, &group)?;
    write_tree_ref(b, "populationTree", &tree_id)?;
    b.close_tag("generalizedSkyLineLikelihood")?;
    b.blank_line();

    let eml = format!("{p}eml1");
    b.open_tag("exponentialMarkovLikelihood", &[attr("id", &eml), attr("jeffreys", true)]);
    write_parameter_ref_block(b, "chainParameter", &pop_size)?;
    b.close_tag("exponentialMarkovLikelihood")?;

    ctx.prior_likelihoods.push(Reference::new("generalizedSkyLineLikelihood", id));
    ctx.prior_likelihoods.push(Reference::new("exponentialMarkovLikelihood", eml));
    Ok(())
}

fn write_skyride(
    input: &StageInput<'_>,
    prior: &TreePrior,
    time_aware: bool,
    ctx: &mut GenerationContext,
    b: &mut DocumentBuilder,
) -> Result<()> {
    let p = input.names.tree_prior_prefix(&prior.name);
    let tree_id = input.names.tree_model_id(&prior.tree_model);
    let id = format!("{p}skyride");
    let intervals = input.config.taxa.len().saturating_sub(1).max(1);
    let family = ParameterFamily::TreePrior;

    b.comment(&["Generate a gmrfSkyrideLikelihood for GMRF Bayesian Skyride process"]);
    b.open_tag(
        "gmrfSkyrideLikelihood",
        &[attr("id", &id), attr("timeAwareSmoothing", time_aware), attr("randomizeTree", false)],
    );
    let log_pop = format!("{p}skyride.logPopSize");
    let pop = ctx.mint_dimensioned(&log_pop, "skyride.logPopSize", family, &prior.parameters, intervals)?;
    write_parameter_block(b, "populationSizes", &log_pop, &pop)?;
    let group_size = format!("{p}skyride.groupSize");
    let group = ctx.mint_dimensioned(&group_size, "skyride.groupSize", family, &prior.parameters, intervals)?;
    write_parameter_block(b, "groupSizes", &group_size, &group)?;
    mint_parameter(ctx, b, "precisionParameter", &format!("{p}skyride.precision"), "skyride.precision", family, &prior.parameters)?;
    write_tree_ref(b, "populationTree", &tree_id)?;
    b.close_tag("gmrfSkyrideLikelihood")?;

    ctx.add_operator(Operator::on_parameter(OperatorKind::GmrfGibbs, id.clone(), 2.0, 2.0));
    ctx.prior_likelihoods.push(Reference::new("gmrfSkyrideLikelihood", id));
    Ok(())
}

fn write_skygrid(
    input: &StageInput<'_>,
    prior: &TreePrior,
    grid_points: usize,
    cutoff: Option<f64>,
    ctx: &mut GenerationContext,
    b: &mut DocumentBuilder,
) -> Result<()> {
    let cutoff = cutoff.filter(|c| *c > 0.0).ok_or_else(|| {
        GenerationError::invalid(format!("Skygrid tree prior {} has no cutoff", prior.name))
    })?;
    let p = input.names.tree_prior_prefix(&prior.name);
    let tree_id = input.names.tree_model_id(&prior.tree_model);
    let id = format!("{p}skygrid");
    let family = ParameterFamily::TreePrior;

    b.comment(&["Generate a gmrfSkyGridLikelihood for the Bayesian SkyGrid process"]);
    b.open_tag("gmrfSkyGridLikelihood", &[attr("id", &id)]);
    let log_pop = format!("{p}skygrid.logPopSize");
    let pop = ctx.mint_dimensioned(&log_pop, "skygrid.logPopSize", family, &prior.parameters, grid_points)?;
    write_parameter_block(b, "populationSizes", &log_pop, &pop)?;
    mint_parameter(ctx, b, "precisionParameter", &format!("{p}skygrid.precision"), "skygrid.precision", family, &prior.parameters)?;

    let points_id = format!("{p}skygrid.numGridPoints");
    let points = ctx.mint_from(
        Parameter::fixed(grid_points.saturating_sub(1) as f64),
        &points_id,
        "skygrid.numGridPoints",
        family,
        &Default::default(),
    );
    write_parameter_block(b, "numGridPoints", &points_id, &points)?;
    let cutoff_id = format!("{p}skygrid.cutOff");
    let cut = ctx.mint_from(
        Parameter::fixed(cutoff),
        &cutoff_id,
        "skygrid.cutOff",
        family,
        &Default::default(),
    );
    write_parameter_block(b, "cutOff", &cutoff_id, &cut)?;
    write_tree_ref(b, "populationTree", &tree_id)?;
    b.close_tag("gmrfSkyGridLikelihood")?;

    ctx.add_operator(Operator::on_parameter(OperatorKind::SkygridGibbs, id.clone(), 1.0, 2.0));
    ctx.prior_likelihoods.push(Reference::new("gmrfSkyGridLikelihood", id));
    Ok(())
}

fn write_extended_skyline(
    input: &StageInput<'_>,
    prior: &TreePrior,
    linear: bool,
    ctx: &mut GenerationContext,
    b: &mut DocumentBuilder,
) -> Result<()> {
    let p = input.names.tree_prior_prefix(&prior.name);
    let tree_id = input.names.tree_model_id(&prior.tree_model);
    let ploidy = input
        .config
        .tree_model(&prior.tree_model)
        .map(|t| t.ploidy.value())
        .unwrap_or(2.0);
    let family = ParameterFamily::TreePrior;
    let id = format!("{p}demographic");
    let pop_size = format!("{p}demographic.popSize");
    let indicators = format!("{p}demographic.indicators");

    b.comment(&["Generate a variableDemographic for extended Bayesian skyline process"]);
    b.open_tag(
        "variableDemographic",
        &[
            attr("id", &id),
            attr("type", if linear { "linear" } else { "stepwise" }),
            attr("useMidpoints", true),
        ],
    );
    mint_parameter(ctx, b, "populationSizes", &pop_size, "demographic.popSize", family, &prior.parameters)?;
    mint_parameter(ctx, b, "indicators", &indicators, "demographic.indicators", family, &prior.parameters)?;
    b.open_tag("trees", &[]);
    b.open_tag("ptree", &[num_attr("ploidy", ploidy)]);
    b.reference("treeModel", &tree_id);
    b.close_tag("ptree")?;
    b.close_tag("trees")?;
    b.close_tag("variableDemographic")?;
    b.blank_line();

    let coalescent = write_coalescent_likelihood(
        b,
        &format!("{p}coalescent"),
        &Reference::new("variableDemographic", id.clone()),
        &tree_id,
    )?;
    b.blank_line();

    let changes = format!("{p}demographic.populationSizeChanges");
    b.open_tag("sumStatistic", &[attr("id", &changes), attr("elementwise", true)]);
    b.reference("parameter", &indicators);
    b.close_tag("sumStatistic")?;
    let changes_prior = crate::catalog::default_parameter("demographic.populationSizeChanges")
        .unwrap_or_else(Parameter::unset);
    ctx.mint_statistic("sumStatistic", &changes, "demographic.populationSizeChanges", ParameterFamily::Statistic, changes_prior);

    let mean_dist = format!("{p}demographic.populationMeanDist");
    b.open_tag("exponentialDistributionModel", &[attr("id", &mean_dist)]);
    mint_parameter(ctx, b, "mean", &format!("{p}demographic.populationMean"), "demographic.populationMean", family, &prior.parameters)?;
    b.close_tag("exponentialDistributionModel")?;

    let mixed = format!("{p}demographic.popSizePrior");
    b.open_tag("mixedDistributionLikelihood", &[attr("id", &mixed)]);
    for wrapper in ["distribution0", "distribution1"] {
        b.open_tag(wrapper, &[]);
        b.reference("exponentialDistributionModel", &mean_dist);
        b.close_tag(wrapper)?;
    }
    write_parameter_ref_block(b, "data", &pop_size)?;
    write_parameter_ref_block(b, "indicators", &indicators)?;
    b.close_tag("mixedDistributionLikelihood")?;

    ctx.add_operator(Operator::on_parameter(OperatorKind::ScaleWithIndicators, &pop_size, 0.5, 2.0).with_second(&indicators));
    ctx.add_operator(Operator {
        distribution: Some(mean_dist),
        ..Operator::on_parameter(OperatorKind::SampleNonActive, &pop_size, 1.0, 1.0).with_second(&indicators)
    });
    ctx.prior_likelihoods.push(coalescent);
    ctx.prior_likelihoods.push(Reference::new("mixedDistributionLikelihood", mixed));
    Ok(())
}

pub fn generate_tree_prior_likelihoods(
    input: &StageInput<'_>,
    mut ctx: GenerationContext,
    b: &mut DocumentBuilder,
) -> Result<GenerationContext> {
    for prior in &input.config.tree_priors {
        let p = input.names.tree_prior_prefix(&prior.name);
        let tree_id = input.names.tree_model_id(&prior.tree_model);
        tracing::debug!(tree_prior = %prior.name, kind = prior.kind.name(), "Writing tree prior likelihood");
        match prior.kind {
            TreePriorKind::Yule
            | TreePriorKind::YuleCalibration
            | TreePriorKind::BirthDeath
            | TreePriorKind::BirthDeathIncompleteSampling => {
                write_speciation_likelihood(input, prior, &mut ctx, b)?;
            }
            TreePriorKind::Constant | TreePriorKind::Exponential | TreePriorKind::Expansion => {
                let (element, stem) = demographic_element(&prior.kind).unwrap_or(("constantSize", "constant"));
                let model = Reference::new(element, format!("{p}{stem}"));
                b.comment(&["Generate a coalescent likelihood"]);
                let r = write_coalescent_likelihood(b, &format!("{p}coalescent"), &model, &tree_id)?;
                ctx.prior_likelihoods.push(r);
            }
            TreePriorKind::Logistic => {
                write_logistic_test(input, prior, &mut ctx, b)?;
                b.blank_line();
                let model = Reference::new("logisticGrowth", format!("{p}logistic"));
                b.comment(&["Generate a coalescent likelihood"]);
                let r = write_coalescent_likelihood(b, &format!("{p}coalescent"), &model, &tree_id)?;
                ctx.prior_likelihoods.push(r);
            }
            TreePriorKind::Skyline { groups, linear } => {
                write_skyline(input, prior, groups, linear, &mut ctx, b)?;
            }
            TreePriorKind::Skyride { time_aware } => {
                write_skyride(input, prior, time_aware, &mut ctx, b)?;
            }
            TreePriorKind::Skygrid { grid_points, cutoff } => {
                write_skygrid(input, prior, grid_points, cutoff, &mut ctx, b)?;
            }
            TreePriorKind::ExtendedSkyline { linear } => {
                write_extended_skyline(input, prior, linear, &mut ctx, b)?;
            }
        }
        b.blank_line();
    }
    input.insert(InsertionPoint::AfterTreePrior, InsertionItem::None, b)?;
    Ok(ctx)
}

/// Reference every prior likelihood recorded so far.
pub fn write_prior_likelihood_refs(ctx: &GenerationContext, b: &mut DocumentBuilder) {
    for r in &ctx.prior_likelihoods {
        b.reference(&r.element, &r.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::NoInsertions;
    use beastgen_types::{AnalysisConfig, PriorKind, Taxon};

    fn config(kind: TreePriorKind) -> AnalysisConfig {
        AnalysisConfig {
            taxa: vec![Taxon::new("A"), Taxon::new("B"), Taxon::new("C")],
            tree_models: vec![TreeModel::new("tree")],
            tree_priors: vec![TreePrior::new("prior", "tree", kind)],
            ..Default::default()
        }
    }

    fn models(config: &AnalysisConfig) -> (String, GenerationContext) {
        let input = StageInput::new(config, &NoInsertions);
        let mut b = DocumentBuilder::new();
        let ctx = generate_tree_priors(&input, GenerationContext::new(), &mut b).unwrap();
        (b.finish().unwrap(), ctx)
    }

    fn likelihoods(config: &AnalysisConfig) -> (String, GenerationContext) {
        let input = StageInput::new(config, &NoInsertions);
        let mut b = DocumentBuilder::new();
        let ctx = generate_tree_prior_likelihoods(&input, GenerationContext::new(), &mut b).unwrap();
        (b.finish().unwrap(), ctx)
    }

    #[test]
    fn constant_size_seeds_itself() {
        let (xml, ctx) = models(&config(TreePriorKind::Constant));
        assert!(xml.contains("<constantSize id=\"constant\" units=\"years\">"));
        assert!(xml.contains("<parameter id=\"constant.popSize\" value=\"1.0\" lower=\"0.0\"/>"), "{xml}");
        assert!(!xml.contains("initialDemo"));
        assert_eq!(ctx.demographic_seeds["tree"], Reference::new("constantSize", "constant"));
    }

    #[test]
    fn logistic_gets_initial_demo_sharing_pop_size() {
        let (xml, ctx) = models(&config(TreePriorKind::Logistic));
        assert!(xml.contains("<logisticGrowth id=\"logistic\" units=\"years\">"));
        assert!(xml.contains("<t50>"));
        assert!(xml.contains("<constantSize id=\"initialDemo\" units=\"years\">\n\t<populationSize>\n\t\t<parameter idref=\"logistic.popSize\"/>"), "{xml}");
        assert_eq!(ctx.demographic_seeds["tree"].id, "initialDemo");
    }

    #[test]
    fn doubling_time_parameterization() {
        let mut config = config(TreePriorKind::Exponential);
        config.tree_priors[0].parameterization = Parameterization::DoublingTime;
        let (xml, _) = models(&config);
        assert!(xml.contains("<doublingTime>"));
        assert!(xml.contains("id=\"exponential.doublingTime\""));
        assert!(!xml.contains("growthRate"));
    }

    #[test]
    fn yule_uses_fresh_initial_demo() {
        let (xml, ctx) = models(&config(TreePriorKind::Yule));
        assert!(xml.contains("<yuleModel id=\"yule\" units=\"years\">"));
        assert!(xml.contains("<parameter id=\"initialDemo.popSize\" value=\"100.0\" lower=\"0.0\"/>"));
        assert_eq!(ctx.demographic_seeds["tree"].id, "initialDemo");
    }

    #[test]
    fn incomplete_sampling_adds_sample_proportion() {
        let (xml, _) = models(&config(TreePriorKind::BirthDeathIncompleteSampling));
        assert!(xml.contains("<birthDeathModel id=\"birthDeath\""));
        assert!(xml.contains("<sampleProportion>"));
    }

    #[test]
    fn coalescent_likelihood_references_model_and_tree() {
        let (xml, ctx) = likelihoods(&config(TreePriorKind::Constant));
        assert!(xml.contains("<coalescentLikelihood id=\"coalescent\">"));
        assert!(xml.contains("<constantSize idref=\"constant\"/>"));
        assert!(xml.contains("<populationTree>\n\t\t<treeModel idref=\"treeModel\"/>"), "{xml}");
        assert_eq!(ctx.prior_likelihoods, vec![Reference::new("coalescentLikelihood", "coalescent")]);
    }

    #[test]
    fn logistic_adds_boolean_likelihood_first() {
        let (xml, ctx) = likelihoods(&config(TreePriorKind::Logistic));
        assert!(xml.contains("<parameter idref=\"treeModel.rootHeight\"/>"));
        let ids: Vec<&str> = ctx.prior_likelihoods.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["booleanLikelihood1", "coalescent"]);
    }

    #[test]
    fn calibrated_yule_writes_calibration_point() {
        let mut config = config(TreePriorKind::YuleCalibration);
        let mut set = TaxonSet::new("clade", &["A", "B"]);
        set.monophyletic = true;
        set.calibration = Some(PriorKind::Normal { mean: 10.0, stdev: 1.0 });
        config.taxon_sets.push(set);
        let (xml, _) = likelihoods(&config);
        assert!(xml.contains("<calibration correction=\"exact\">"));
        assert!(xml.contains("<taxa idref=\"clade\"/>"));
        assert!(xml.contains("<normalDistributionModel>"));
    }

    #[test]
    fn skyline_popsize_dimension_follows_groups() {
        let (xml, ctx) = likelihoods(&config(TreePriorKind::Skyline { groups: 5, linear: true }));
        assert!(xml.contains("<parameter id=\"skyline.popSize\" dimension=\"6\" value=\"1.0\" lower=\"0.0\"/>"), "{xml}");
        assert!(xml.contains("<parameter id=\"skyline.groupSize\" dimension=\"5\"/>"));
        assert!(xml.contains("<exponentialMarkovLikelihood id=\"eml1\" jeffreys=\"true\">"));
        assert_eq!(ctx.prior_likelihoods.len(), 2);
    }

    #[test]
    fn skyride_adds_block_update_operator() {
        let (xml, ctx) = likelihoods(&config(TreePriorKind::Skyride { time_aware: true }));
        assert!(xml.contains("timeAwareSmoothing=\"true\""));
        assert!(xml.contains("<parameter id=\"skyride.logPopSize\" dimension=\"2\" value=\"1.0\"/>"), "{xml}");
        assert!(ctx.operators.iter().any(|op| op.kind == OperatorKind::GmrfGibbs));
    }

    #[test]
    fn skygrid_writes_fixed_grid() {
        let (xml, _) = likelihoods(&config(TreePriorKind::Skygrid { grid_points: 20, cutoff: Some(50.0) }));
        assert!(xml.contains("<parameter id=\"skygrid.numGridPoints\" value=\"19.0\"/>"), "{xml}");
        assert!(xml.contains("<parameter id=\"skygrid.cutOff\" value=\"50.0\"/>"));
    }

    #[test]
    fn extended_skyline_records_statistic_prior() {
        let (xml, ctx) = likelihoods(&config(TreePriorKind::ExtendedSkyline { linear: false }));
        assert!(xml.contains("<variableDemographic id=\"demographic\" type=\"stepwise\" useMidpoints=\"true\">"));
        assert!(xml.contains("<sumStatistic id=\"demographic.populationSizeChanges\" elementwise=\"true\">"));
        let changes = ctx.parameter("demographic.populationSizeChanges").unwrap();
        assert_eq!(changes.element, "sumStatistic");
        assert!(matches!(changes.parameter.prior, PriorKind::Poisson { .. }));
        let ids: Vec<&str> = ctx.prior_likelihoods.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["coalescent", "demographic.popSizePrior"]);
    }
}
