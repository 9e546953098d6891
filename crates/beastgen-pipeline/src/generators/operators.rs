//! The operator schedule.
//!
//! Operators come from the configuration when it lists them, otherwise from
//! the defaults the earlier stages registered in the context while minting.

use beastgen_types::{GenerationError, Operator, OperatorKind, Result};
use beastgen_xml::{attr, num_attr, Attribute, DocumentBuilder};

use super::{species, write_parameter_ref, write_parameter_ref_block, StageInput};
use crate::context::GenerationContext;
use crate::extension::{InsertionItem, InsertionPoint};

pub const OPERATORS_ID: &str = "operators";

fn weight_attr(weight: f64) -> Attribute {
    if weight.fract() == 0.0 {
        attr("weight", weight as u64)
    } else {
        num_attr("weight", weight)
    }
}

fn first(op: &Operator) -> Result<&str> {
    op.parameter.as_deref().ok_or_else(|| {
        GenerationError::invalid(format!("{:?} operator has no target parameter", op.kind))
    })
}

fn second(op: &Operator) -> Result<&str> {
    op.parameter2.as_deref().ok_or_else(|| {
        GenerationError::invalid(format!("{:?} operator needs a second parameter", op.kind))
    })
}

fn tree(op: &Operator) -> Result<&str> {
    op.tree_model.as_deref().ok_or_else(|| {
        GenerationError::invalid(format!("{:?} operator has no target tree model", op.kind))
    })
}

/// An operator element holding a single parameter idref.
fn simple(b: &mut DocumentBuilder, element: &str, mut attrs: Vec<Attribute>, op: &Operator) -> Result<()> {
    if !op.auto_optimize {
        attrs.push(attr("autoOptimize", false));
    }
    b.open_tag(element, &attrs);
    write_parameter_ref(b, first(op)?);
    b.close_tag(element)
}

/// An operator element holding a single tree model idref.
fn on_tree(b: &mut DocumentBuilder, element: &str, attrs: Vec<Attribute>, op: &Operator) -> Result<()> {
    b.open_tag(element, &attrs);
    b.reference("treeModel", tree(op)?);
    b.close_tag(element)
}

pub fn write_operator(b: &mut DocumentBuilder, op: &Operator) -> Result<()> {
    let weight = weight_attr(op.weight);
    let scale = num_attr("scaleFactor", op.tuning);
    let integer_tuning = (op.tuning.round() as i64).max(1);
    match op.kind {
        OperatorKind::Scale => simple(b, "scaleOperator", vec![scale, weight], op),
        OperatorKind::ScaleIndependently => simple(
            b,
            "scaleOperator",
            vec![scale, weight, attr("scaleAllIndependently", true)],
            op,
        ),
        OperatorKind::ScaleAll => {
            let attrs = [scale, attr("scaleAll", true), attr("ignoreBounds", true), weight];
            b.open_tag("scaleOperator", &attrs);
            match op.parameter2 {
                None => write_parameter_ref(b, first(op)?),
                Some(ref p2) => {
                    b.open_tag("compoundParameter", &[]);
                    write_parameter_ref(b, first(op)?);
                    write_parameter_ref(b, p2);
                    b.close_tag("compoundParameter")?;
                }
            }
            b.close_tag("scaleOperator")
        }
        OperatorKind::RandomWalk => {
            simple(b, "randomWalkOperator", vec![num_attr("windowSize", op.tuning), weight], op)
        }
        OperatorKind::RandomWalkAbsorbing | OperatorKind::RandomWalkReflecting => {
            let boundary = if op.kind == OperatorKind::RandomWalkAbsorbing { "absorbing" } else { "reflecting" };
            simple(
                b,
                "randomWalkOperator",
                vec![num_attr("windowSize", op.tuning), weight, attr("boundaryCondition", boundary)],
                op,
            )
        }
        OperatorKind::IntegerRandomWalk => {
            simple(b, "randomWalkIntegerOperator", vec![attr("windowSize", integer_tuning), weight], op)
        }
        OperatorKind::UpDown => {
            b.open_tag("upDownOperator", &[scale, weight]);
            write_parameter_ref_block(b, "up", first(op)?)?;
            write_parameter_ref_block(b, "down", second(op)?)?;
            b.close_tag("upDownOperator")
        }
        OperatorKind::DeltaExchange => {
            let mut attrs = vec![num_attr("delta", op.tuning)];
            if let Some(weights) = op.parameter_weights.as_ref().filter(|w| w.len() > 1) {
                let joined = weights.iter().map(u64::to_string).collect::<Vec<_>>().join(" ");
                attrs.push(attr("parameterWeights", joined));
            }
            attrs.push(weight);
            simple(b, "deltaExchange", attrs, op)
        }
        OperatorKind::IntegerDeltaExchange => {
            let attrs = vec![
                attr("delta", op.tuning as i64),
                attr("integer", true),
                weight,
                attr("autoOptimize", false),
            ];
            b.open_tag("deltaExchange", &attrs);
            write_parameter_ref(b, first(op)?);
            b.close_tag("deltaExchange")
        }
        OperatorKind::Swap => {
            b.open_tag("swapOperator", &[attr("size", op.tuning as i64), weight, attr("autoOptimize", false)]);
            write_parameter_ref(b, first(op)?);
            b.close_tag("swapOperator")
        }
        OperatorKind::BitFlip => simple(b, "bitFlipOperator", vec![weight], op),
        OperatorKind::Uniform => simple(b, "uniformOperator", vec![weight], op),
        OperatorKind::IntegerUniform => simple(b, "uniformIntegerOperator", vec![weight], op),
        OperatorKind::SubtreeSlide => on_tree(
            b,
            "subtreeSlide",
            vec![num_attr("size", op.tuning), attr("gaussian", true), weight],
            op,
        ),
        OperatorKind::SubtreeLeap => on_tree(b, "subtreeLeap", vec![num_attr("size", op.tuning), weight], op),
        OperatorKind::NarrowExchange => on_tree(b, "narrowExchange", vec![weight], op),
        OperatorKind::WideExchange => on_tree(b, "wideExchange", vec![weight], op),
        OperatorKind::WilsonBalding => on_tree(b, "wilsonBalding", vec![weight], op),
        OperatorKind::SampleNonActive => {
            let distribution = op.distribution.as_deref().ok_or_else(|| {
                GenerationError::invalid("sampleNonActive operator needs a distribution model")
            })?;
            b.open_tag("sampleNonActiveOperator", &[weight]);
            b.open_tag("distribution", &[]);
            b.reference("exponentialDistributionModel", distribution);
            b.close_tag("distribution")?;
            write_parameter_ref_block(b, "dataParameter", first(op)?)?;
            write_parameter_ref_block(b, "indicatorParameter", second(op)?)?;
            b.close_tag("sampleNonActiveOperator")
        }
        OperatorKind::ScaleWithIndicators => {
            b.open_tag("scaleOperator", &[scale, weight]);
            write_parameter_ref(b, first(op)?);
            b.open_tag("indicators", &[attr("pickoneprob", "1.0")]);
            write_parameter_ref(b, second(op)?);
            b.close_tag("indicators")?;
            b.close_tag("scaleOperator")
        }
        OperatorKind::GmrfGibbs => {
            b.open_tag("gmrfBlockUpdateOperator", &[scale, weight]);
            b.reference("gmrfSkyrideLikelihood", first(op)?);
            b.close_tag("gmrfBlockUpdateOperator")
        }
        OperatorKind::SkygridGibbs => {
            b.open_tag("gmrfGridBlockUpdateOperator", &[scale, weight]);
            b.reference("gmrfSkyGridLikelihood", first(op)?);
            b.close_tag("gmrfGridBlockUpdateOperator")
        }
        OperatorKind::NodeReheight => {
            b.open_tag("nodeReHeight", &[weight]);
            b.reference("species", species::SPECIES_ID);
            b.reference("speciesTree", op.tree_model.as_deref().unwrap_or(species::SPECIES_TREE_ID));
            b.close_tag("nodeReHeight")
        }
    }
}

/// The operators that will be scheduled: configured ones replace the
/// defaults wholesale.
pub fn schedule<'a>(input: &StageInput<'a>, ctx: &'a GenerationContext) -> Vec<&'a Operator> {
    let config: &'a beastgen_types::AnalysisConfig = input.config;
    let operators: &'a [Operator] = match config.operators {
        Some(ref configured) => configured,
        None => &ctx.operators,
    };
    operators.iter().filter(|op| op.is_active()).collect()
}

pub fn generate_operators(
    input: &StageInput<'_>,
    ctx: GenerationContext,
    b: &mut DocumentBuilder,
) -> Result<GenerationContext> {
    let transform = if input.config.uses_gmrf_prior() { "log" } else { "default" };
    let operators = schedule(input, &ctx);
    tracing::debug!(count = operators.len(), "Writing operator schedule");

    b.comment(&["Define operators"]);
    b.open_tag("operators", &[attr("id", OPERATORS_ID), attr("optimizationSchedule", transform)]);
    for op in operators {
        write_operator(b, op)?;
    }
    input.insert(InsertionPoint::InOperators, InsertionItem::None, b)?;
    b.close_tag("operators")?;
    b.blank_line();
    input.insert(InsertionPoint::AfterOperators, InsertionItem::None, b)?;
    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::NoInsertions;
    use beastgen_types::{AnalysisConfig, TreePrior, TreePriorKind};

    fn render(op: &Operator) -> Result<String> {
        let mut b = DocumentBuilder::new();
        write_operator(&mut b, op)?;
        b.finish()
    }

    #[test]
    fn scale_operator() {
        let xml = render(&Operator::on_parameter(OperatorKind::Scale, "kappa", 0.75, 1.0)).unwrap();
        assert_eq!(
            xml,
            "<scaleOperator scaleFactor=\"0.75\" weight=\"1\">\n\t<parameter idref=\"kappa\"/>\n</scaleOperator>\n"
        );
    }

    #[test]
    fn up_down_needs_both_parameters() {
        let op = Operator::on_parameter(OperatorKind::UpDown, "clock.rate", 0.75, 3.0)
            .with_second("treeModel.allInternalNodeHeights");
        let xml = render(&op).unwrap();
        assert!(xml.contains("<up>\n\t\t<parameter idref=\"clock.rate\"/>\n\t</up>"), "{xml}");
        assert!(xml.contains("<down>\n\t\t<parameter idref=\"treeModel.allInternalNodeHeights\"/>"));

        let err = render(&Operator::on_parameter(OperatorKind::UpDown, "clock.rate", 0.75, 3.0)).unwrap_err();
        assert!(matches!(err, GenerationError::InvalidConfiguration(_)));
    }

    #[test]
    fn weighted_delta_exchange() {
        let op = Operator {
            parameter_weights: Some(vec![200, 100]),
            ..Operator::on_parameter(OperatorKind::DeltaExchange, "allMus", 0.75, 2.0)
        };
        let xml = render(&op).unwrap();
        assert!(xml.starts_with("<deltaExchange delta=\"0.75\" parameterWeights=\"200 100\" weight=\"2\">"), "{xml}");
    }

    #[test]
    fn tree_operators_reference_the_tree_model() {
        let xml = render(&Operator::on_tree(OperatorKind::SubtreeSlide, "treeModel", 1.0, 15.0)).unwrap();
        assert!(xml.starts_with("<subtreeSlide size=\"1.0\" gaussian=\"true\" weight=\"15\">\n\t<treeModel idref=\"treeModel\"/>"));
        let err = render(&Operator::on_parameter(OperatorKind::WilsonBalding, "x", 1.0, 3.0)).unwrap_err();
        assert!(err.to_string().contains("no target tree model"));
    }

    #[test]
    fn integer_operators_disable_optimization() {
        let xml = render(&Operator::on_parameter(OperatorKind::IntegerDeltaExchange, "skyline.groupSize", 1.0, 6.0))
            .unwrap();
        assert!(xml.starts_with("<deltaExchange delta=\"1\" integer=\"true\" weight=\"6\" autoOptimize=\"false\">"));
        let xml = render(&Operator::on_parameter(OperatorKind::Swap, "branchRates.categories", 1.0, 10.0)).unwrap();
        assert!(xml.starts_with("<swapOperator size=\"1\" weight=\"10\" autoOptimize=\"false\">"));
    }

    fn run(config: &AnalysisConfig, ctx: GenerationContext) -> String {
        let input = StageInput::new(config, &NoInsertions);
        let mut b = DocumentBuilder::new();
        generate_operators(&input, ctx, &mut b).unwrap();
        b.finish().unwrap()
    }

    #[test]
    fn schedule_skips_inactive_operators() {
        let mut ctx = GenerationContext::new();
        ctx.add_operator(Operator::on_parameter(OperatorKind::Scale, "kappa", 0.75, 1.0));
        ctx.add_operator(Operator::on_parameter(OperatorKind::Scale, "alpha", 0.75, 0.0));
        ctx.add_operator(Operator {
            enabled: false,
            ..Operator::on_parameter(OperatorKind::Scale, "pInv", 0.75, 1.0)
        });
        let xml = run(&AnalysisConfig::default(), ctx);
        assert!(xml.starts_with("<!-- Define operators -->\n<operators id=\"operators\" optimizationSchedule=\"default\">"));
        assert!(xml.contains("kappa"));
        assert!(!xml.contains("alpha"));
        assert!(!xml.contains("pInv"));
    }

    #[test]
    fn configured_operators_replace_defaults() {
        let mut ctx = GenerationContext::new();
        ctx.add_operator(Operator::on_parameter(OperatorKind::Scale, "kappa", 0.75, 1.0));
        let config = AnalysisConfig {
            operators: Some(vec![Operator::on_parameter(OperatorKind::RandomWalk, "alpha", 0.5, 2.0)]),
            ..Default::default()
        };
        let xml = run(&config, ctx);
        assert!(xml.contains("<randomWalkOperator windowSize=\"0.5\" weight=\"2\">"));
        assert!(!xml.contains("kappa"));
    }

    #[test]
    fn gmrf_priors_use_log_optimization() {
        let config = AnalysisConfig {
            tree_priors: vec![TreePrior::new("prior", "tree", TreePriorKind::Skyride { time_aware: true })],
            ..Default::default()
        };
        let xml = run(&config, GenerationContext::new());
        assert!(xml.contains("optimizationSchedule=\"log\""));
    }
}
