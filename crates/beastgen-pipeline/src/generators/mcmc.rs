//! The MCMC element head (posterior, prior, likelihood, operators) and the
//! trailing report that closes the document.

use beastgen_types::Result;
use beastgen_xml::{attr, DocumentBuilder};

use super::{operators, priors, tree_prior, StageInput};
use crate::context::GenerationContext;
use crate::extension::{InsertionItem, InsertionPoint};

pub const MCMC_ID: &str = "mcmc";

fn write_prior(input: &StageInput<'_>, ctx: &GenerationContext, b: &mut DocumentBuilder) -> Result<()> {
    b.open_tag("prior", &[attr("id", "prior")]);
    if input.config.species_enabled() {
        for r in &ctx.species_priors {
            b.reference(&r.element, &r.id);
        }
    }
    priors::write_parameter_priors(ctx, b)?;
    tree_prior::write_prior_likelihood_refs(ctx, b);
    input.insert(InsertionPoint::InMcmcPrior, InsertionItem::None, b)?;
    b.close_tag("prior")
}

fn write_likelihood(input: &StageInput<'_>, ctx: &GenerationContext, b: &mut DocumentBuilder) -> Result<()> {
    b.open_tag("likelihood", &[attr("id", "likelihood")]);
    for r in ctx.tree_likelihoods.iter().chain(&ctx.clock_likelihoods) {
        b.reference(&r.element, &r.id);
    }
    input.insert(InsertionPoint::InMcmcLikelihood, InsertionItem::None, b)?;
    b.close_tag("likelihood")
}

/// Opens `<mcmc>` and writes everything up to the loggers. The element is
/// left open for the logger stage.
pub fn generate_mcmc(
    input: &StageInput<'_>,
    ctx: GenerationContext,
    b: &mut DocumentBuilder,
) -> Result<GenerationContext> {
    let config = input.config;
    let mcmc = &config.mcmc;

    let mut attrs = vec![
        attr("id", MCMC_ID),
        attr("chainLength", mcmc.chain_length),
        attr("autoOptimize", mcmc.auto_optimize),
    ];
    if mcmc.operator_analysis {
        attrs.push(attr("operatorAnalysis", mcmc.operator_analysis_file_name()));
    }
    b.comment(&["Define MCMC"]);
    b.open_tag("mcmc", &attrs);

    if config.has_data() {
        b.open_tag("posterior", &[attr("id", "posterior")]);
        write_prior(input, &ctx, b)?;
        write_likelihood(input, &ctx, b)?;
        b.close_tag("posterior")?;
    } else {
        write_prior(input, &ctx, b)?;
    }

    b.reference("operators", operators::OPERATORS_ID);
    b.blank_line();
    tracing::debug!(
        chain_length = mcmc.chain_length,
        sample_prior_only = mcmc.sample_prior_only,
        "MCMC element opened"
    );
    Ok(ctx)
}

/// Timer report and trace analysis, then the end of the root element.
pub fn generate_terminal(
    input: &StageInput<'_>,
    ctx: GenerationContext,
    b: &mut DocumentBuilder,
) -> Result<GenerationContext> {
    b.open_tag("report", &[]);
    b.open_tag("property", &[attr("name", "timer")]);
    b.reference("mcmc", MCMC_ID);
    b.close_tag("property")?;
    b.close_tag("report")?;
    b.blank_line();
    b.tag("traceAnalysis", &[attr("fileName", input.config.mcmc.log_file_name())], true);
    b.blank_line();
    b.close_tag("beast")?;
    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Reference;
    use crate::extension::NoInsertions;
    use beastgen_types::{AnalysisConfig, ClockKind, ClockModel, Partition, TreeModel};

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            partitions: vec![Partition::new("p", "aln", "s", "clock", "tree")],
            clock_models: vec![ClockModel::new("clock", ClockKind::Strict)],
            tree_models: vec![TreeModel::new("tree")],
            ..Default::default()
        }
    }

    fn context() -> GenerationContext {
        let mut ctx = GenerationContext::new();
        ctx.tree_likelihoods.push(Reference::new("treeLikelihood", "treeLikelihood"));
        ctx.prior_likelihoods.push(Reference::new("coalescentLikelihood", "coalescent"));
        ctx
    }

    fn render(config: &AnalysisConfig) -> String {
        let input = StageInput::new(config, &NoInsertions);
        let mut b = DocumentBuilder::new();
        generate_mcmc(&input, context(), &mut b).unwrap();
        assert_eq!(b.open_tags(), ["mcmc"]);
        b.as_str().to_string()
    }

    #[test]
    fn posterior_joins_prior_and_likelihood() {
        let xml = render(&config());
        assert!(xml.contains("<mcmc id=\"mcmc\" chainLength=\"10000000\" autoOptimize=\"true\">"), "{xml}");
        let posterior = xml.find("<posterior id=\"posterior\">").unwrap();
        let prior = xml.find("<prior id=\"prior\">").unwrap();
        let coalescent = xml.find("<coalescentLikelihood idref=\"coalescent\"/>").unwrap();
        let likelihood = xml.find("<likelihood id=\"likelihood\">").unwrap();
        let tree = xml.find("<treeLikelihood idref=\"treeLikelihood\"/>").unwrap();
        assert!(posterior < prior && prior < coalescent && coalescent < likelihood && likelihood < tree);
        assert!(xml.contains("<operators idref=\"operators\"/>"));
    }

    #[test]
    fn prior_only_runs_have_no_posterior() {
        let mut config = config();
        config.mcmc.sample_prior_only = true;
        let xml = render(&config);
        assert!(!xml.contains("posterior"));
        assert!(!xml.contains("<likelihood"));
        assert!(xml.contains("\t<prior id=\"prior\">"));
    }

    #[test]
    fn operator_analysis_file() {
        let mut config = config();
        config.mcmc.operator_analysis = true;
        assert!(render(&config).contains("operatorAnalysis=\"beast.ops\""));
    }

    #[test]
    fn terminal_closes_the_root() {
        let config = config();
        let input = StageInput::new(&config, &NoInsertions);
        let mut b = DocumentBuilder::new();
        b.open_tag("beast", &[]);
        generate_terminal(&input, GenerationContext::new(), &mut b).unwrap();
        let xml = b.finish().unwrap();
        assert!(xml.contains("<report>\n\t\t<property name=\"timer\">\n\t\t\t<mcmc idref=\"mcmc\"/>"), "{xml}");
        assert!(xml.contains("<traceAnalysis fileName=\"beast.log\"/>"));
        assert!(xml.ends_with("</beast>\n"));
    }
}
