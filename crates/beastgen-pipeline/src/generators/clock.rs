//! Branch-rate (molecular clock) models, their summary statistics, and the
//! compound rate parameters of fixed-mean clock groups.

use beastgen_types::{
    ClockKind, ClockModel, GenerationError, Operator, OperatorKind, Parameter, RelaxedDistribution,
    Result,
};
use beastgen_xml::{attr, DocumentBuilder};

use super::{mint_parameter, write_parameter_block, write_parameter_ref, write_parameter_ref_block, StageInput};
use crate::catalog;
use crate::context::{GenerationContext, ParameterFamily, Reference};

const AUTOCORRELATED_UNSUPPORTED: &str = "Autocorrelated relaxed clock model not implemented yet";

fn unsupported_kind(kind: &ClockKind) -> GenerationError {
    GenerationError::unsupported(format!("The {} model is not supported", kind.name()))
}

/// Element name of the branch-rates model for a clock kind.
pub fn branch_rates_element(kind: &ClockKind) -> Result<&'static str> {
    match *kind {
        ClockKind::Strict => Ok("strictClockBranchRates"),
        ClockKind::Uncorrelated { continuous_quantile: false, .. } => Ok("discretizedBranchRates"),
        ClockKind::Uncorrelated { continuous_quantile: true, .. } => Ok("continuousBranchRates"),
        ClockKind::RandomLocal => Ok("randomLocalClockModel"),
        ClockKind::FixedLocal => Ok("localClockModel"),
        ClockKind::Autocorrelated => Err(GenerationError::unsupported(AUTOCORRELATED_UNSUPPORTED)),
        ClockKind::MixedEffects | ClockKind::ShrinkageLocal | ClockKind::Hmc => Err(unsupported_kind(kind)),
    }
}

/// Catalog name of the overall rate parameter of a clock kind.
fn rate_name(kind: &ClockKind) -> Result<&'static str> {
    match *kind {
        ClockKind::Strict | ClockKind::RandomLocal | ClockKind::FixedLocal => Ok("clock.rate"),
        ClockKind::Uncorrelated { distribution, .. } => match distribution {
            RelaxedDistribution::Lognormal => Ok("ucld.mean"),
            RelaxedDistribution::Gamma => Ok("ucgd.mean"),
            RelaxedDistribution::Exponential => Ok("uced.mean"),
            RelaxedDistribution::Cauchy => Err(cauchy_unsupported()),
        },
        ClockKind::Autocorrelated => Err(GenerationError::unsupported(AUTOCORRELATED_UNSUPPORTED)),
        ClockKind::MixedEffects | ClockKind::ShrinkageLocal | ClockKind::Hmc => Err(unsupported_kind(kind)),
    }
}

fn cauchy_unsupported() -> GenerationError {
    GenerationError::unsupported("The Cauchy relaxed clock distribution is not supported")
}

/// Id of the rate parameter of a clock.
pub fn rate_parameter_id(input: &StageInput<'_>, clock: &ClockModel) -> Result<String> {
    Ok(format!("{}{}", input.names.clock_prefix(&clock.name), rate_name(&clock.kind)?))
}

/// Prefix of the statistics a clock writes for the first of its trees.
fn first_tree_prefix(input: &StageInput<'_>, clock: &ClockModel) -> String {
    match input.config.tree_models_for_clock(&clock.name).first() {
        Some(tree) => input.names.clock_tree_prefix(&clock.name, tree),
        None => input.names.clock_prefix(&clock.name),
    }
}

/// Column label for the clock's rate in the screen log. Relaxed clocks log
/// the mean rate statistic of their first tree under the same name.
pub fn clock_rate_label(input: &StageInput<'_>, clock: &ClockModel) -> Result<String> {
    match clock.kind {
        ClockKind::Strict | ClockKind::RandomLocal | ClockKind::FixedLocal => {
            Ok(format!("{}rate", input.names.clock_prefix(&clock.name)))
        }
        ClockKind::Uncorrelated { .. } => Ok(format!("{}meanRate", first_tree_prefix(input, clock))),
        ClockKind::Autocorrelated => Err(GenerationError::unsupported(AUTOCORRELATED_UNSUPPORTED)),
        _ => Err(unsupported_kind(&clock.kind)),
    }
}

/// `<{element} idref="{prefix}branchRates"/>` for the clock of a partition
/// evaluated on `tree_model`.
pub fn write_branch_rates_ref(
    input: &StageInput<'_>,
    clock: &ClockModel,
    tree_model: &str,
    b: &mut DocumentBuilder,
) -> Result<()> {
    let element = branch_rates_element(&clock.kind)?;
    b.reference(element, &input.names.branch_rates_id(&clock.name, tree_model));
    Ok(())
}

fn tree_statistic_refs(prefix: &str, clock: &ClockModel) -> Vec<Reference> {
    let mut refs = vec![Reference::new("rateStatistic", format!("{prefix}meanRate"))];
    if clock.kind != ClockKind::Strict {
        refs.push(Reference::new("rateStatistic", format!("{prefix}coefficientOfVariation")));
        refs.push(Reference::new("rateCovarianceStatistic", format!("{prefix}covariance")));
    }
    refs
}

/// Summary statistics written after a clock model, as references, for every
/// tree the clock applies to.
pub fn statistic_refs(input: &StageInput<'_>, clock: &ClockModel) -> Vec<Reference> {
    input
        .config
        .tree_models_for_clock(&clock.name)
        .into_iter()
        .flat_map(|tree| tree_statistic_refs(&input.names.clock_tree_prefix(&clock.name, tree), clock))
        .collect()
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// One tree a clock model applies to.
struct ClockTree<'a> {
    name: &'a str,
    tree_id: String,
    /// Clock prefix, qualified by the tree when the clock spans several.
    prefix: String,
    id: String,
}

/// One clock model being written. Each tree gets its own branch-rates
/// element; parameters of the clock itself are defined on the first tree and
/// referenced from the rest.
struct ClockFragment<'a> {
    input: &'a StageInput<'a>,
    clock: &'a ClockModel,
    prefix: String,
    trees: Vec<ClockTree<'a>>,
    /// The rate starts fixed at 1.0 unless overridden.
    reference_rate: bool,
}

impl<'a> ClockFragment<'a> {
    fn new(input: &'a StageInput<'a>, clock: &'a ClockModel, index: usize) -> Result<Self> {
        let config = input.config;
        let names = &input.names;
        let trees: Vec<ClockTree<'a>> = config
            .tree_models_for_clock(&clock.name)
            .into_iter()
            .map(|name| ClockTree {
                name,
                tree_id: names.tree_model_id(name),
                prefix: names.clock_tree_prefix(&clock.name, name),
                id: names.branch_rates_id(&clock.name, name),
            })
            .collect();
        if trees.is_empty() {
            return Err(GenerationError::invalid(format!(
                "Clock model {} is not applied to any tree",
                clock.name
            )));
        }
        let grouped = config
            .clock_groups
            .iter()
            .any(|g| g.fix_mean.is_some() && g.clock_models.contains(&clock.name));
        Ok(Self {
            input,
            clock,
            prefix: names.clock_prefix(&clock.name),
            trees,
            reference_rate: index == 0 && !grouped && !config.has_time_information(),
        })
    }

    /// The overall rate, wrapped in `wrapper`. An estimated rate is scaled
    /// against the node heights of every tree it applies to.
    fn rate(&self, first: bool, ctx: &mut GenerationContext, b: &mut DocumentBuilder, wrapper: &str) -> Result<String> {
        let name = rate_name(&self.clock.kind)?;
        let id = format!("{}{}", self.prefix, name);
        if !first {
            write_parameter_ref_block(b, wrapper, &id)?;
            return Ok(id);
        }
        let mut base = catalog::default_parameter(name).unwrap_or_else(|| Parameter::fixed(1.0));
        if self.reference_rate {
            base.fixed = true;
        }
        let p = ctx.mint_from(base, &id, name, ParameterFamily::Clock, &self.clock.parameters);
        write_parameter_block(b, wrapper, &id, &p)?;
        ctx.attach_tree_model(&id, &self.trees[0].tree_id);
        if !p.fixed {
            for tree in &self.trees {
                ctx.add_operator(
                    Operator::on_parameter(OperatorKind::UpDown, &id, 0.75, 3.0)
                        .with_second(format!("{}.allInternalNodeHeights", tree.tree_id)),
                );
            }
        }
        Ok(id)
    }

    /// A parameter of the clock itself, shared by all of its trees.
    fn parameter(
        &self,
        first: bool,
        ctx: &mut GenerationContext,
        b: &mut DocumentBuilder,
        wrapper: &str,
        name: &str,
    ) -> Result<String> {
        let id = format!("{}{}", self.prefix, name);
        if first {
            mint_parameter(ctx, b, wrapper, &id, name, ParameterFamily::Clock, &self.clock.parameters)?;
        } else {
            write_parameter_ref_block(b, wrapper, &id)?;
        }
        Ok(id)
    }

    /// A parameter over the branches of one tree.
    fn tree_parameter(
        &self,
        tree: &ClockTree<'_>,
        ctx: &mut GenerationContext,
        b: &mut DocumentBuilder,
        wrapper: &str,
        name: &str,
    ) -> Result<String> {
        let id = format!("{}{}", tree.prefix, name);
        mint_parameter(ctx, b, wrapper, &id, name, ParameterFamily::Clock, &self.clock.parameters)?;
        Ok(id)
    }

    fn write_strict(&self, tree: &ClockTree<'_>, first: bool, ctx: &mut GenerationContext, b: &mut DocumentBuilder) -> Result<()> {
        b.comment(&["The strict clock (Uniform rates across branches)"]);
        b.open_tag("strictClockBranchRates", &[attr("id", &tree.id)]);
        self.rate(first, ctx, b, "rate")?;
        b.close_tag("strictClockBranchRates")
    }

    fn write_uncorrelated(
        &self,
        tree: &ClockTree<'_>,
        first: bool,
        distribution: RelaxedDistribution,
        continuous: bool,
        ctx: &mut GenerationContext,
        b: &mut DocumentBuilder,
    ) -> Result<()> {
        let element = branch_rates_element(&self.clock.kind)?;
        b.comment(&["The uncorrelated relaxed clock (Drummond, Ho, Phillips & Rambaut (2006) PLoS Biology 4, e88 )"]);
        b.open_tag(element, &[attr("id", &tree.id)]);
        b.reference("treeModel", &tree.tree_id);
        b.open_tag("distribution", &[]);
        match distribution {
            RelaxedDistribution::Lognormal => {
                b.open_tag("logNormalDistributionModel", &[attr("meanInRealSpace", true)]);
                self.rate(first, ctx, b, "mean")?;
                self.parameter(first, ctx, b, "stdev", "ucld.stdev")?;
                b.close_tag("logNormalDistributionModel")?;
            }
            RelaxedDistribution::Gamma => {
                b.open_tag("gammaDistributionModel", &[]);
                self.rate(first, ctx, b, "mean")?;
                self.parameter(first, ctx, b, "shape", "ucgd.shape")?;
                b.close_tag("gammaDistributionModel")?;
            }
            RelaxedDistribution::Exponential => {
                b.open_tag("exponentialDistributionModel", &[]);
                self.rate(first, ctx, b, "mean")?;
                b.close_tag("exponentialDistributionModel")?;
            }
            RelaxedDistribution::Cauchy => return Err(cauchy_unsupported()),
        }
        b.close_tag("distribution")?;
        if continuous {
            self.tree_parameter(tree, ctx, b, "rateQuantiles", "branchRates.quantiles")?;
        } else {
            self.tree_parameter(tree, ctx, b, "rateCategories", "branchRates.categories")?;
        }
        b.close_tag(element)
    }

    fn write_random_local(&self, tree: &ClockTree<'_>, first: bool, ctx: &mut GenerationContext, b: &mut DocumentBuilder) -> Result<()> {
        let p = &self.prefix;
        b.comment(&["The random local clock model (Drummond & Suchard, 2010)"]);
        b.open_tag("randomLocalClockModel", &[attr("id", &tree.id), attr("ratesAreMultipliers", false)]);
        b.reference("treeModel", &tree.tree_id);
        write_parameter_ref_block(b, "rates", &format!("{p}localClock.relativeRates"))?;
        write_parameter_ref_block(b, "rateIndicator", &format!("{p}localClock.changes"))?;
        self.rate(first, ctx, b, "clockRate")?;
        b.close_tag("randomLocalClockModel")?;

        let changes = format!("{}rateChanges", tree.prefix);
        b.open_tag(
            "sumStatistic",
            &[attr("id", &changes), attr("name", format!("{}rateChangeCount", tree.prefix)), attr("elementwise", true)],
        );
        write_parameter_ref(b, &format!("{p}localClock.changes"));
        b.close_tag("sumStatistic")?;
        let prior = catalog::default_parameter("rateChanges").unwrap_or_else(Parameter::unset);
        ctx.mint_statistic("sumStatistic", &changes, "rateChanges", ParameterFamily::Clock, prior);
        Ok(())
    }

    fn write_fixed_local(&self, tree: &ClockTree<'_>, first: bool, ctx: &mut GenerationContext, b: &mut DocumentBuilder) -> Result<()> {
        let config = self.input.config;
        b.comment(&["The local clock model (Yoder & Yang 2000)"]);
        b.open_tag("localClockModel", &[attr("id", &tree.id)]);
        b.reference("treeModel", &tree.tree_id);
        self.rate(first, ctx, b, "rate")?;
        for set in config
            .taxon_sets
            .iter()
            .filter(|s| s.monophyletic && config.tree_model_of_set(s) == Some(tree.name))
        {
            b.open_tag(
                "clade",
                &[attr("includeStem", set.include_stem), attr("excludeClade", false)],
            );
            b.reference("taxa", &set.id);
            let id = format!("{}{}.rate", tree.prefix, set.id);
            let param = ctx.mint(&id, "localClock.rate", ParameterFamily::Clock, &self.clock.parameters)?;
            super::write_parameter(b, &id, &param);
            b.close_tag("clade")?;
        }
        b.close_tag("localClockModel")
    }

    fn write_autocorrelated(&self, tree: &ClockTree<'_>, ctx: &mut GenerationContext, b: &mut DocumentBuilder) -> Result<()> {
        let tree_id = &tree.tree_id;
        b.comment(&["The autocorrelated relaxed clock (Rannala & Yang, 2007)"]);
        b.open_tag("ACLikelihood", &[attr("id", &tree.id), attr("isLogSpace", true)]);
        b.reference("treeModel", tree_id);
        write_parameter_ref_block(b, "rates", &format!("{tree_id}.nodeRates"))?;
        write_parameter_ref_block(b, "rootRate", &format!("{tree_id}.rootRate"))?;
        self.tree_parameter(tree, ctx, b, "variance", "branchRates.var")?;
        b.close_tag("ACLikelihood")?;
        ctx.clock_likelihoods.push(Reference::new("ACLikelihood", tree.id.clone()));
        Ok(())
    }

    fn write_statistics(&self, tree: &ClockTree<'_>, ctx: &mut GenerationContext, b: &mut DocumentBuilder) -> Result<()> {
        let element = branch_rates_element(&self.clock.kind)?;
        for r in tree_statistic_refs(&tree.prefix, self.clock) {
            let mut attrs = vec![attr("id", &r.id), attr("name", &r.id)];
            if r.element == "rateStatistic" {
                let mode = if r.id.ends_with("meanRate") { "mean" } else { "coefficientOfVariation" };
                attrs.push(attr("mode", mode));
                attrs.push(attr("internal", true));
                attrs.push(attr("external", true));
            }
            b.open_tag(&r.element, &attrs);
            b.reference("treeModel", &tree.tree_id);
            b.reference(element, &tree.id);
            b.close_tag(&r.element)?;
            ctx.clock_statistics.push(r);
        }
        Ok(())
    }

    fn write(&self, ctx: &mut GenerationContext, b: &mut DocumentBuilder) -> Result<()> {
        for (index, tree) in self.trees.iter().enumerate() {
            let first = index == 0;
            match self.clock.kind {
                ClockKind::Strict => self.write_strict(tree, first, ctx, b)?,
                ClockKind::Uncorrelated { distribution, continuous_quantile } => {
                    self.write_uncorrelated(tree, first, distribution, continuous_quantile, ctx, b)?
                }
                ClockKind::RandomLocal => self.write_random_local(tree, first, ctx, b)?,
                ClockKind::FixedLocal => self.write_fixed_local(tree, first, ctx, b)?,
                ClockKind::Autocorrelated => {
                    self.write_autocorrelated(tree, ctx, b)?;
                    continue;
                }
                ClockKind::MixedEffects | ClockKind::ShrinkageLocal | ClockKind::Hmc => {
                    return Err(unsupported_kind(&self.clock.kind))
                }
            }
            b.blank_line();
            self.write_statistics(tree, ctx, b)?;
        }
        Ok(())
    }
}

/// Sites covered by the partitions of a clock model. Weights the delta
/// exchange over a fixed-mean group.
fn clock_site_count(input: &StageInput<'_>, clock: &str) -> u64 {
    let config = input.config;
    config
        .partitions_for_clock(clock)
        .map(|p| {
            let sites = config.alignment(&p.alignment).map(|a| a.site_count()).unwrap_or(0);
            p.site_count(sites) as u64
        })
        .sum()
}

fn write_clock_groups(input: &StageInput<'_>, ctx: &mut GenerationContext, b: &mut DocumentBuilder) -> Result<()> {
    let config = input.config;
    for group in config.clock_groups.iter().filter(|g| g.fix_mean.is_some()) {
        let id = input.names.clock_group_id(&group.name);
        let mut rates = Vec::new();
        let mut weights = Vec::new();
        for member in &group.clock_models {
            let clock = config.clock_model(member).ok_or_else(|| {
                GenerationError::invalid(format!("Clock group {} refers to an unknown clock model, {member}", group.name))
            })?;
            rates.push(rate_parameter_id(input, clock)?);
            weights.push(clock_site_count(input, member));
        }
        b.open_tag("compoundParameter", &[attr("id", &id)]);
        for rate in &rates {
            write_parameter_ref(b, rate);
        }
        b.close_tag("compoundParameter")?;
        b.blank_line();

        for rate in &rates {
            ctx.suppress_operators(rate);
        }
        ctx.add_operator(Operator {
            parameter_weights: Some(weights),
            ..Operator::on_parameter(OperatorKind::DeltaExchange, &id, 0.75, 3.0)
        });
        ctx.compounds.push((ParameterFamily::Clock, Reference::new("compoundParameter", id)));
    }
    Ok(())
}

pub fn generate_branch_rates(
    input: &StageInput<'_>,
    mut ctx: GenerationContext,
    b: &mut DocumentBuilder,
) -> Result<GenerationContext> {
    for (index, clock) in input.config.active_clock_models().enumerate() {
        tracing::debug!(clock_model = %clock.name, kind = clock.kind.name(), "Writing branch rates");
        ClockFragment::new(input, clock, index)?.write(&mut ctx, b)?;
        b.blank_line();
    }
    write_clock_groups(input, &mut ctx, b)?;
    Ok(ctx)
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// File-log entries for the parameters of one clock model.
pub fn write_log(input: &StageInput<'_>, clock: &ClockModel, ctx: &GenerationContext, b: &mut DocumentBuilder) -> Result<()> {
    write_parameter_ref(b, &rate_parameter_id(input, clock)?);
    write_spread_log(input, clock, ctx, b)
}

/// File-log entries for everything but the rate itself, for clocks whose
/// rate is logged through a fixed-mean group.
pub fn write_spread_log(
    input: &StageInput<'_>,
    clock: &ClockModel,
    ctx: &GenerationContext,
    b: &mut DocumentBuilder,
) -> Result<()> {
    let cp = input.names.clock_prefix(&clock.name);
    match clock.kind {
        ClockKind::Uncorrelated { distribution: RelaxedDistribution::Lognormal, .. } => {
            write_parameter_ref(b, &format!("{cp}ucld.stdev"));
        }
        ClockKind::Uncorrelated { distribution: RelaxedDistribution::Gamma, .. } => {
            write_parameter_ref(b, &format!("{cp}ucgd.shape"));
        }
        ClockKind::RandomLocal => {
            b.reference("sumStatistic", &format!("{cp}rateChanges"));
        }
        ClockKind::FixedLocal => {
            for p in ctx.parameters_of(ParameterFamily::Clock) {
                if p.name == "localClock.rate" && p.id.starts_with(&cp) {
                    write_parameter_ref(b, &p.id);
                }
            }
        }
        _ => {}
    }
    Ok(())
}

/// File-log entries for the summary statistics of one clock model.
pub fn write_log_statistics(input: &StageInput<'_>, clock: &ClockModel, b: &mut DocumentBuilder) -> Result<()> {
    branch_rates_element(&clock.kind)?;
    for r in statistic_refs(input, clock) {
        b.reference(&r.element, &r.id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::NoInsertions;
    use beastgen_types::{AnalysisConfig, ClockGroup, Partition, Taxon, TipDate, TreeModel};

    fn config(kind: ClockKind) -> AnalysisConfig {
        AnalysisConfig {
            taxa: vec![Taxon::new("A"), Taxon::new("B")],
            partitions: vec![Partition::new("p", "aln", "s", "clock", "tree")],
            clock_models: vec![ClockModel::new("clock", kind)],
            tree_models: vec![TreeModel::new("tree")],
            ..Default::default()
        }
    }

    fn run(config: &AnalysisConfig) -> Result<(String, GenerationContext)> {
        let input = StageInput::new(config, &NoInsertions);
        let mut b = DocumentBuilder::new();
        let ctx = generate_branch_rates(&input, GenerationContext::new(), &mut b)?;
        Ok((b.finish()?, ctx))
    }

    fn dated(mut config: AnalysisConfig) -> AnalysisConfig {
        config.taxa[0].date = Some(TipDate { value: 2000.0, direction: Default::default(), units: Default::default() });
        config
    }

    #[test]
    fn strict_clock_without_dates_fixes_rate() {
        let (xml, ctx) = run(&config(ClockKind::Strict)).unwrap();
        assert!(xml.contains("<strictClockBranchRates id=\"branchRates\">\n\t<rate>\n\t\t<parameter id=\"clock.rate\" value=\"1.0\"/>"), "{xml}");
        assert!(xml.contains("<rateStatistic id=\"meanRate\" name=\"meanRate\" mode=\"mean\""));
        assert!(ctx.operators.is_empty());
    }

    #[test]
    fn dated_strict_clock_estimates_rate_with_up_down() {
        let (xml, ctx) = run(&dated(config(ClockKind::Strict))).unwrap();
        assert!(xml.contains("<parameter id=\"clock.rate\" value=\"1.0\" lower=\"0.0\"/>"));
        let up_down = ctx.operators.iter().find(|op| op.kind == OperatorKind::UpDown).unwrap();
        assert_eq!(up_down.parameter2.as_deref(), Some("treeModel.allInternalNodeHeights"));
        assert_eq!(ctx.parameter("clock.rate").unwrap().tree_model.as_deref(), Some("treeModel"));
    }

    #[test]
    fn lognormal_relaxed_clock() {
        let kind = ClockKind::Uncorrelated { distribution: RelaxedDistribution::Lognormal, continuous_quantile: false };
        let (xml, ctx) = run(&dated(config(kind))).unwrap();
        assert!(xml.contains("<discretizedBranchRates id=\"branchRates\">"));
        assert!(xml.contains("<logNormalDistributionModel meanInRealSpace=\"true\">"));
        assert!(xml.contains("<parameter id=\"ucld.stdev\""));
        assert!(xml.contains("<rateCategories>\n\t\t<parameter id=\"branchRates.categories\"/>"), "{xml}");
        assert!(xml.contains("<rateCovarianceStatistic id=\"covariance\" name=\"covariance\">"));
        assert_eq!(ctx.clock_statistics.len(), 3);
    }

    #[test]
    fn continuous_quantile_uses_quantiles() {
        let kind = ClockKind::Uncorrelated { distribution: RelaxedDistribution::Gamma, continuous_quantile: true };
        let (xml, _) = run(&config(kind)).unwrap();
        assert!(xml.contains("<continuousBranchRates id=\"branchRates\">"));
        assert!(xml.contains("<rateQuantiles>"));
        assert!(xml.contains("ucgd.shape"));
    }

    #[test]
    fn cauchy_is_unsupported() {
        let kind = ClockKind::Uncorrelated { distribution: RelaxedDistribution::Cauchy, continuous_quantile: false };
        let err = run(&config(kind)).unwrap_err();
        assert!(err.to_string().contains("Cauchy"), "{err}");
    }

    #[test]
    fn random_local_clock_counts_changes() {
        let (xml, ctx) = run(&config(ClockKind::RandomLocal)).unwrap();
        assert!(xml.contains("<rateIndicator>\n\t\t<parameter idref=\"localClock.changes\"/>"));
        assert!(xml.contains("<sumStatistic id=\"rateChanges\" name=\"rateChangeCount\" elementwise=\"true\">"));
        assert!(ctx.parameter("rateChanges").unwrap().parameter.has_prior());
    }

    #[test]
    fn autocorrelated_definition_but_no_reference() {
        let config = config(ClockKind::Autocorrelated);
        let (xml, ctx) = run(&config).unwrap();
        assert!(xml.contains("<ACLikelihood id=\"branchRates\" isLogSpace=\"true\">"));
        assert_eq!(ctx.clock_likelihoods.len(), 1);

        let input = StageInput::new(&config, &NoInsertions);
        let mut b = DocumentBuilder::new();
        let err = write_branch_rates_ref(&input, &config.clock_models[0], "tree", &mut b).unwrap_err();
        assert_eq!(err.to_string(), "Unsupported configuration: Autocorrelated relaxed clock model not implemented yet");
        assert!(clock_rate_label(&input, &config.clock_models[0]).is_err());
    }

    #[test]
    fn hmc_clock_is_unsupported() {
        let err = run(&config(ClockKind::Hmc)).unwrap_err();
        assert!(matches!(err, GenerationError::UnsupportedConfiguration(_)));
    }

    #[test]
    fn fix_mean_group_writes_compound_and_delta_exchange() {
        let mut config = dated(config(ClockKind::Strict));
        config.clock_models.push(ClockModel::new("clock2", ClockKind::Strict));
        config.partitions.push(Partition::new("p2", "aln", "s", "clock2", "tree"));
        config.clock_groups.push(ClockGroup {
            name: "group".into(),
            clock_models: vec!["clock".into(), "clock2".into()],
            fix_mean: Some(1.0),
        });
        let (xml, ctx) = run(&config).unwrap();
        assert!(xml.contains("<compoundParameter id=\"group.allClockRates\">\n\t<parameter idref=\"p.clock.rate\"/>"), "{xml}");
        assert!(ctx
            .operators
            .iter()
            .all(|op| op.parameter.as_deref() != Some("p.clock.rate")));
        let delta = ctx.operators.iter().find(|op| op.kind == OperatorKind::DeltaExchange).unwrap();
        assert_eq!(delta.parameter.as_deref(), Some("group.allClockRates"));
        assert!(ctx.is_parameter("group.allClockRates"));
    }

    #[test]
    fn relaxed_clock_over_two_trees_writes_rates_per_tree() {
        let kind = ClockKind::Uncorrelated { distribution: RelaxedDistribution::Lognormal, continuous_quantile: false };
        let mut config = dated(config(kind));
        config.tree_models.push(TreeModel::new("tree2"));
        config.partitions.push(Partition::new("p2", "aln", "s", "clock", "tree2"));
        let (xml, ctx) = run(&config).unwrap();

        assert!(xml.contains("<discretizedBranchRates id=\"p.branchRates\">\n\t<treeModel idref=\"p.treeModel\"/>"), "{xml}");
        assert!(xml.contains("<discretizedBranchRates id=\"p2.branchRates\">\n\t<treeModel idref=\"p2.treeModel\"/>"));
        assert_eq!(xml.matches("<parameter id=\"ucld.mean\"").count(), 1);
        assert!(xml.contains("<mean>\n\t\t\t\t<parameter idref=\"ucld.mean\"/>"), "{xml}");
        assert!(xml.contains("<stdev>\n\t\t\t\t<parameter idref=\"ucld.stdev\"/>"));
        assert!(xml.contains("<parameter id=\"p.branchRates.categories\"/>"));
        assert!(xml.contains("<parameter id=\"p2.branchRates.categories\"/>"));
        assert!(xml.contains("<rateStatistic id=\"p2.meanRate\" name=\"p2.meanRate\""));
        assert_eq!(ctx.clock_statistics.len(), 6);

        let up_down: Vec<_> = ctx
            .operators
            .iter()
            .filter(|op| op.kind == OperatorKind::UpDown)
            .filter_map(|op| op.parameter2.as_deref())
            .collect();
        assert_eq!(up_down, vec!["p.treeModel.allInternalNodeHeights", "p2.treeModel.allInternalNodeHeights"]);

        let input = StageInput::new(&config, &NoInsertions);
        let mut b = DocumentBuilder::new();
        write_branch_rates_ref(&input, &config.clock_models[0], "tree2", &mut b).unwrap();
        assert_eq!(b.finish().unwrap(), "<discretizedBranchRates idref=\"p2.branchRates\"/>\n");
    }
}
