//! Path-sampling / stepping-stone marginal likelihood estimation, written
//! after the main chain.

use beastgen_types::{AnalysisConfig, MarginalLikelihoodOptions, Result};
use beastgen_xml::{attr, num_attr, DocumentBuilder};

use crate::extension::{Extension, InsertionItem, InsertionPoint};

pub struct MarginalLikelihoodExtension;

impl MarginalLikelihoodExtension {
    fn log_file_name(config: &AnalysisConfig, options: &MarginalLikelihoodOptions) -> String {
        options
            .file_name
            .clone()
            .unwrap_or_else(|| format!("{}.mle.log", config.mcmc.file_name_stem))
    }

    fn write_estimator(
        config: &AnalysisConfig,
        options: &MarginalLikelihoodOptions,
        b: &mut DocumentBuilder,
    ) -> Result<()> {
        let file_name = Self::log_file_name(config, options);

        let mut attrs = vec![
            attr("chainLength", options.chain_length),
            attr("pathSteps", options.path_steps),
            attr("pathScheme", options.path_scheme.as_str()),
        ];
        if options.path_scheme != beastgen_types::PathScheme::Linear {
            attrs.push(num_attr("alpha", options.alpha));
        }
        if options.print_operator_analysis {
            attrs.push(attr("printOperatorAnalysis", true));
        }
        b.open_tag("marginalLikelihoodEstimator", &attrs);

        b.open_tag("samplers", &[]);
        b.reference("mcmc", "mcmc");
        b.close_tag("samplers")?;

        b.open_tag("pathLikelihood", &[attr("id", "pathLikelihood")]);
        b.open_tag("source", &[]);
        b.reference("posterior", "posterior");
        b.close_tag("source")?;
        b.open_tag("destination", &[]);
        b.reference("prior", "prior");
        b.close_tag("destination")?;
        b.close_tag("pathLikelihood")?;

        b.open_tag(
            "log",
            &[
                attr("id", "MLELog"),
                attr("logEvery", options.log_every),
                attr("fileName", &file_name),
            ],
        );
        b.reference("pathLikelihood", "pathLikelihood");
        b.close_tag("log")?;

        b.close_tag("marginalLikelihoodEstimator")?;
        b.blank_line();

        for analysis in ["pathSamplingAnalysis", "steppingStoneSamplingAnalysis"] {
            b.open_tag(analysis, &[attr("fileName", &file_name)]);
            b.tag("likelihoodColumn", &[attr("name", "pathLikelihood.delta")], true);
            b.tag("thetaColumn", &[attr("name", "pathLikelihood.theta")], true);
            b.close_tag(analysis)?;
        }
        Ok(())
    }
}

impl Extension for MarginalLikelihoodExtension {
    fn name(&self) -> &str {
        "marginal_likelihood"
    }

    fn comment_label(&self) -> &str {
        "Marginal Likelihood Estimator"
    }

    fn uses_insertion_point(&self, point: InsertionPoint, config: &AnalysisConfig) -> bool {
        point == InsertionPoint::AfterMcmc && config.extensions.marginal_likelihood.is_some()
    }

    fn generate(
        &self,
        _point: InsertionPoint,
        _item: InsertionItem<'_>,
        config: &AnalysisConfig,
        builder: &mut DocumentBuilder,
    ) -> Result<()> {
        match config.extensions.marginal_likelihood {
            Some(ref options) => Self::write_estimator(config, options, builder),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beastgen_types::PathScheme;

    fn config_with_mle() -> AnalysisConfig {
        let mut config = AnalysisConfig::default();
        config.extensions.marginal_likelihood = Some(MarginalLikelihoodOptions::default());
        config
    }

    #[test]
    fn only_after_mcmc_and_only_when_enabled() {
        let ext = MarginalLikelihoodExtension;
        assert!(ext.uses_insertion_point(InsertionPoint::AfterMcmc, &config_with_mle()));
        assert!(!ext.uses_insertion_point(InsertionPoint::AfterTaxa, &config_with_mle()));
        assert!(!ext.uses_insertion_point(InsertionPoint::AfterMcmc, &AnalysisConfig::default()));
    }

    #[test]
    fn writes_estimator_and_both_analyses() {
        let config = config_with_mle();
        let mut b = DocumentBuilder::new();
        MarginalLikelihoodExtension
            .generate(InsertionPoint::AfterMcmc, InsertionItem::None, &config, &mut b)
            .unwrap();
        let xml = b.finish().unwrap();
        assert!(xml.contains(
            "<marginalLikelihoodEstimator chainLength=\"1000000\" pathSteps=\"100\" pathScheme=\"betaquantile\" alpha=\"0.3\">"
        ), "{xml}");
        assert!(xml.contains("<mcmc idref=\"mcmc\"/>"));
        assert!(xml.contains("<log id=\"MLELog\" logEvery=\"1000\" fileName=\"beast.mle.log\">"));
        assert!(xml.contains("<pathSamplingAnalysis fileName=\"beast.mle.log\">"));
        assert!(xml.contains("<steppingStoneSamplingAnalysis fileName=\"beast.mle.log\">"));
    }

    #[test]
    fn linear_scheme_has_no_alpha() {
        let mut config = config_with_mle();
        if let Some(ref mut options) = config.extensions.marginal_likelihood {
            options.path_scheme = PathScheme::Linear;
        }
        let mut b = DocumentBuilder::new();
        MarginalLikelihoodExtension
            .generate(InsertionPoint::AfterMcmc, InsertionItem::None, &config, &mut b)
            .unwrap();
        assert!(!b.as_str().contains("alpha="));
    }
}
