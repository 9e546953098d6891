//! Priors on individual parameters and statistics, written inside the MCMC
//! `<prior>` element.

use beastgen_types::{GenerationError, PriorKind, Result};
use beastgen_xml::{num_attr, Attribute, DocumentBuilder};

use crate::context::{GenerationContext, MintedParameter};

fn write_target(b: &mut DocumentBuilder, p: &MintedParameter) {
    b.reference(&p.element, &p.id);
}

/// A prior element around a single idref of its target.
fn prior_element(b: &mut DocumentBuilder, element: &str, attrs: &[Attribute], p: &MintedParameter) -> Result<()> {
    b.open_tag(element, attrs);
    write_target(b, p);
    b.close_tag(element)
}

/// Attributes of a `truncatedPrior` wrapper, or `None` when both bounds are
/// infinite.
fn truncation_attrs(p: &MintedParameter) -> Option<Vec<Attribute>> {
    let bounds = p.parameter.truncation?;
    let mut attrs = Vec::new();
    if bounds.lower.is_finite() {
        attrs.push(num_attr("lower", bounds.lower));
    }
    if bounds.upper.is_finite() {
        attrs.push(num_attr("upper", bounds.upper));
    }
    (!attrs.is_empty()).then_some(attrs)
}

pub fn write_parameter_prior(b: &mut DocumentBuilder, p: &MintedParameter) -> Result<()> {
    if !p.parameter.has_prior() {
        return Ok(());
    }
    let truncation = truncation_attrs(p);
    if let Some(ref attrs) = truncation {
        b.open_tag("truncatedPrior", attrs);
    }

    match p.parameter.prior {
        PriorKind::NoneTreePrior | PriorKind::NoneFixed | PriorKind::NoneStatistic => {}
        PriorKind::Improper => {
            b.comment(&[&format!("Improper uniform prior: {}", p.id)]);
        }
        PriorKind::Uniform { lower, upper } => {
            if !lower.is_finite() || !upper.is_finite() {
                return Err(GenerationError::invalid(format!(
                    "Uniform priors cannot have infinite bounds, use an improper prior for {}",
                    p.id
                )));
            }
            prior_element(b, "uniformPrior", &[num_attr("lower", lower), num_attr("upper", upper)], p)?;
        }
        PriorKind::Exponential { mean, offset } => {
            prior_element(b, "exponentialPrior", &[num_attr("mean", mean), num_attr("offset", offset)], p)?;
        }
        PriorKind::Laplace { mean, scale } => {
            prior_element(b, "laplacePrior", &[num_attr("mean", mean), num_attr("scale", scale)], p)?;
        }
        PriorKind::Normal { mean, stdev } => {
            prior_element(b, "normalPrior", &[num_attr("mean", mean), num_attr("stdev", stdev)], p)?;
        }
        PriorKind::Lognormal { mu, sigma, offset, real_space } => {
            let attrs = if real_space {
                [num_attr("mean", mu), num_attr("stdev", sigma), num_attr("offset", offset)]
            } else {
                [num_attr("mu", mu), num_attr("sigma", sigma), num_attr("offset", offset)]
            };
            prior_element(b, "logNormalPrior", &attrs, p)?;
        }
        PriorKind::Gamma { shape, scale, offset } => {
            let attrs = [num_attr("shape", shape), num_attr("scale", scale), num_attr("offset", offset)];
            prior_element(b, "gammaPrior", &attrs, p)?;
        }
        PriorKind::InverseGamma { shape, scale, offset } => {
            let attrs = [num_attr("shape", shape), num_attr("scale", scale), num_attr("offset", offset)];
            prior_element(b, "invgammaPrior", &attrs, p)?;
        }
        PriorKind::OneOverX => prior_element(b, "oneOnXPrior", &[], p)?,
        PriorKind::Poisson { mean, offset } => {
            prior_element(b, "poissonPrior", &[num_attr("mean", mean), num_attr("offset", offset)], p)?;
        }
        PriorKind::Beta { shape, shape_b, offset } => {
            let attrs = [num_attr("shape", shape), num_attr("shapeB", shape_b), num_attr("offset", offset)];
            prior_element(b, "betaPrior", &attrs, p)?;
        }
        PriorKind::CtmcRateReference => {
            let tree = p.tree_model.as_deref().ok_or_else(|| {
                GenerationError::invalid(format!("No tree model found for clock rate {}", p.id))
            })?;
            b.open_tag("ctmcScalePrior", &[]);
            b.open_tag("ctmcScale", &[]);
            write_target(b, p);
            b.close_tag("ctmcScale")?;
            b.reference("treeModel", tree);
            b.close_tag("ctmcScalePrior")?;
        }
        PriorKind::Dirichlet { alpha, sums_to } => {
            prior_element(b, "dirichletPrior", &[num_attr("alpha", alpha), num_attr("sumsTo", sums_to)], p)?;
        }
    }

    if truncation.is_some() {
        b.close_tag("truncatedPrior")?;
    }
    Ok(())
}

/// Monophyly constraints as one boolean likelihood, then one prior per
/// minted parameter that carries one, in minting order.
pub fn write_parameter_priors(ctx: &GenerationContext, b: &mut DocumentBuilder) -> Result<()> {
    if !ctx.monophyly_statistics.is_empty() {
        b.open_tag("booleanLikelihood", &[]);
        for statistic in &ctx.monophyly_statistics {
            b.reference(&statistic.element, &statistic.id);
        }
        b.close_tag("booleanLikelihood")?;
    }
    for p in &ctx.parameters {
        write_parameter_prior(b, p)?;
    }
    tracing::trace!(
        priors = ctx.parameters.iter().filter(|p| p.parameter.has_prior()).count(),
        "Parameter priors written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ParameterFamily, Reference};
    use beastgen_types::{Bounds, Parameter, ParameterOverride};
    use std::collections::BTreeMap;

    fn minted(ctx: &mut GenerationContext, id: &str, name: &str) {
        ctx.mint(id, name, ParameterFamily::Substitution, &BTreeMap::new()).unwrap();
    }

    fn render(ctx: &GenerationContext) -> Result<String> {
        let mut b = DocumentBuilder::new();
        write_parameter_priors(ctx, &mut b)?;
        b.finish()
    }

    #[test]
    fn catalog_priors_are_written() {
        let mut ctx = GenerationContext::new();
        minted(&mut ctx, "kappa", "kappa");
        minted(&mut ctx, "alpha", "alpha");
        let xml = render(&ctx).unwrap();
        assert!(xml.contains("<logNormalPrior mu=\"1.0\" sigma=\"1.25\" offset=\"0.0\">\n\t<parameter idref=\"kappa\"/>"), "{xml}");
        assert!(xml.contains("<exponentialPrior mean=\"0.5\" offset=\"0.0\">\n\t<parameter idref=\"alpha\"/>"), "{xml}");
    }

    #[test]
    fn fixed_and_none_priors_are_skipped() {
        let mut ctx = GenerationContext::new();
        let mut overrides = BTreeMap::new();
        overrides.insert("kappa".to_string(), ParameterOverride { fixed: Some(true), ..Default::default() });
        ctx.mint("kappa", "kappa", ParameterFamily::Substitution, &overrides).unwrap();
        ctx.mint_from(Parameter::unset(), "treeModel.rootHeight", "treeModel.rootHeight", ParameterFamily::TreeModel, &BTreeMap::new());
        assert_eq!(render(&ctx).unwrap(), "");
    }

    #[test]
    fn monophyly_statistics_form_a_boolean_likelihood() {
        let mut ctx = GenerationContext::new();
        ctx.monophyly_statistics.push(Reference::new("monophylyStatistic", "monophyly(clade)"));
        let xml = render(&ctx).unwrap();
        assert_eq!(
            xml,
            "<booleanLikelihood>\n\t<monophylyStatistic idref=\"monophyly(clade)\"/>\n</booleanLikelihood>\n"
        );
    }

    #[test]
    fn statistic_priors_reference_the_statistic() {
        let mut ctx = GenerationContext::new();
        let parameter = Parameter { prior: PriorKind::Normal { mean: 10.0, stdev: 1.0 }, ..Parameter::unset() };
        ctx.mint_statistic("tmrcaStatistic", "tmrca(clade)", "tmrca", ParameterFamily::Statistic, parameter);
        let xml = render(&ctx).unwrap();
        assert!(xml.contains("<normalPrior mean=\"10.0\" stdev=\"1.0\">\n\t<tmrcaStatistic idref=\"tmrca(clade)\"/>"));
    }

    #[test]
    fn truncation_wraps_the_prior() {
        let mut ctx = GenerationContext::new();
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "alpha".to_string(),
            ParameterOverride { truncation: Some(Bounds::new(0.0, f64::INFINITY)), ..Default::default() },
        );
        ctx.mint("alpha", "alpha", ParameterFamily::Substitution, &overrides).unwrap();
        let xml = render(&ctx).unwrap();
        assert!(xml.starts_with("<truncatedPrior lower=\"0.0\">\n\t<exponentialPrior"), "{xml}");
        assert!(xml.ends_with("</truncatedPrior>\n"));
    }

    #[test]
    fn ctmc_reference_needs_a_tree() {
        let mut ctx = GenerationContext::new();
        ctx.mint("clock.rate", "clock.rate", ParameterFamily::Clock, &BTreeMap::new()).unwrap();
        let err = render(&ctx).unwrap_err();
        assert!(err.to_string().contains("No tree model found for clock rate clock.rate"));

        ctx.attach_tree_model("clock.rate", "treeModel");
        let xml = render(&ctx).unwrap();
        assert!(xml.contains(
            "<ctmcScalePrior>\n\t<ctmcScale>\n\t\t<parameter idref=\"clock.rate\"/>\n\t</ctmcScale>\n\t<treeModel idref=\"treeModel\"/>"
        ));
    }

    #[test]
    fn improper_prior_is_a_comment() {
        let mut ctx = GenerationContext::new();
        minted(&mut ctx, "CP1.mu", "mu");
        assert_eq!(render(&ctx).unwrap(), "<!-- Improper uniform prior: CP1.mu -->\n");
    }

    #[test]
    fn infinite_uniform_is_rejected() {
        let mut ctx = GenerationContext::new();
        let p = Parameter::estimated(1.0, PriorKind::Uniform { lower: 0.0, upper: f64::INFINITY });
        ctx.mint_from(p, "x", "x", ParameterFamily::Substitution, &BTreeMap::new());
        let err = render(&ctx).unwrap_err();
        assert!(matches!(err, GenerationError::InvalidConfiguration(_)));
    }
}
