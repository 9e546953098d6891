//! Default starting values, priors and proposal kernels for every parameter
//! the generators can mint, keyed by the parameter's unprefixed name.

use beastgen_types::{OperatorKind, Parameter, PriorKind};

const LN2: f64 = std::f64::consts::LN_2;

fn lognormal(mu: f64, sigma: f64) -> PriorKind {
    PriorKind::Lognormal { mu, sigma, offset: 0.0, real_space: false }
}

fn gamma(shape: f64, scale: f64) -> PriorKind {
    PriorKind::Gamma { shape, scale, offset: 0.0 }
}

fn uniform(lower: f64, upper: f64) -> PriorKind {
    PriorKind::Uniform { lower, upper }
}

fn exponential(mean: f64) -> PriorKind {
    PriorKind::Exponential { mean, offset: 0.0 }
}

/// Catalog defaults for a parameter, or `None` for names the generators
/// never mint.
pub fn default_parameter(name: &str) -> Option<Parameter> {
    let p = match name {
        // --- substitution ---
        "kappa" | "kappa1" | "kappa2" => Parameter::estimated(2.0, lognormal(1.0, 1.25)).non_negative(),
        "ac" | "at" | "cg" | "gt" => Parameter::estimated(1.0, gamma(0.05, 10.0)).non_negative(),
        "ag" => Parameter::estimated(1.0, gamma(0.05, 20.0)).non_negative(),
        "frequencies" => Parameter::estimated(0.25, uniform(0.0, 1.0)).zero_one(),
        "alpha" => Parameter::estimated(0.5, exponential(0.5)).non_negative(),
        "pInv" => Parameter::estimated(0.5, uniform(0.0, 1.0)).zero_one(),
        "mu" => Parameter::estimated(1.0, PriorKind::Improper).non_negative(),
        "hfrequencies" => Parameter::estimated(0.5, uniform(0.0, 1.0)).zero_one(),
        "bcov.alpha" => Parameter::estimated(0.5, uniform(0.0, 1.0)).zero_one(),
        "bcov.s" => Parameter::estimated(0.5, gamma(0.05, 10.0)).non_negative(),

        // --- clock ---
        "clock.rate" | "ucld.mean" | "ucgd.mean" | "uced.mean" => {
            Parameter::estimated(1.0, PriorKind::CtmcRateReference).non_negative()
        }
        "ucld.stdev" | "ucgd.shape" => Parameter::estimated(0.3333333333333333, exponential(0.3333333333333333)).non_negative(),
        "branchRates.categories" | "branchRates.quantiles" => Parameter::unset(),
        "localClock.relativeRates" => Parameter::estimated(1.0, gamma(0.5, 2.0)).non_negative(),
        "localClock.changes" => Parameter { initial: Some(0.0), ..Parameter::unset() },
        "rateChanges" => Parameter {
            prior: PriorKind::Poisson { mean: LN2, offset: 0.0 },
            ..Parameter::unset()
        },
        "branchRates.var" => Parameter::estimated(0.1, exponential(0.3333333333333333)).non_negative(),
        "treeModel.nodeRates" | "treeModel.rootRate" => Parameter::unset(),
        "allClockRates" => Parameter::unset(),
        "localClock.rate" => Parameter::estimated(1.0, gamma(0.5, 2.0)).non_negative(),

        // --- tree model ---
        "treeModel.rootHeight" | "treeModel.internalNodeHeights" | "treeModel.allInternalNodeHeights" => {
            Parameter::unset()
        }

        // --- coalescent tree priors ---
        "constant.popSize" | "exponential.popSize" | "logistic.popSize" | "expansion.popSize" => {
            Parameter::estimated(1.0, PriorKind::OneOverX).non_negative()
        }
        "exponential.growthRate" | "logistic.growthRate" | "expansion.growthRate" => {
            Parameter::estimated(0.0, PriorKind::Laplace { mean: 0.0, scale: 1.0 })
        }
        "exponential.doublingTime" | "logistic.doublingTime" | "expansion.doublingTime" => {
            Parameter::estimated(100.0, gamma(0.001, 1000.0)).non_negative()
        }
        "logistic.t50" => Parameter::estimated(1.0, gamma(0.001, 1000.0)).non_negative(),
        "expansion.ancestralProportion" => Parameter::estimated(0.1, uniform(0.0, 1.0)).zero_one(),
        "skyline.popSize" => Parameter { initial: Some(1.0), ..Parameter::unset() }.non_negative(),
        "skyline.groupSize" => Parameter::unset(),
        "skyride.logPopSize" => Parameter { initial: Some(1.0), ..Parameter::unset() },
        "skyride.groupSize" => Parameter::unset(),
        "skyride.precision" => Parameter::estimated(1.0, gamma(0.001, 1000.0)).non_negative(),
        "skygrid.logPopSize" => Parameter { initial: Some(1.0), ..Parameter::unset() },
        "skygrid.precision" => Parameter::estimated(0.1, gamma(0.001, 1000.0)).non_negative(),
        "skygrid.numGridPoints" | "skygrid.cutOff" => Parameter::fixed(1.0),
        "demographic.popSize" => Parameter { initial: Some(1.0), ..Parameter::unset() }.non_negative(),
        "demographic.indicators" => Parameter { initial: Some(0.0), ..Parameter::unset() },
        "demographic.populationMean" => Parameter::estimated(1.0, PriorKind::OneOverX).non_negative(),
        "demographic.populationSizeChanges" => Parameter {
            prior: PriorKind::Poisson { mean: LN2, offset: 0.0 },
            ..Parameter::unset()
        },

        // --- speciation tree priors ---
        "yule.birthRate" => Parameter::estimated(1.0, uniform(0.0, 1.0e100)).non_negative(),
        "birthDeath.meanGrowthRate" => Parameter::estimated(0.01, uniform(0.0, 100000.0)).non_negative(),
        "birthDeath.relativeDeathRate" => Parameter::estimated(0.5, uniform(0.0, 1.0)).zero_one(),
        "birthDeath.samplingProportion" => Parameter::estimated(0.01, uniform(0.0, 1.0)).zero_one(),

        // --- multispecies coalescent ---
        "species.popMean" => Parameter::estimated(1.0, PriorKind::OneOverX).non_negative(),
        "speciesTree.splitPopSize" => Parameter { initial: Some(1.0), ..Parameter::unset() }.non_negative(),
        "species.yule.birthRate" => Parameter::estimated(1.0, uniform(0.0, 1.0e100)).non_negative(),
        "species.birthDeath.meanGrowthRate" => {
            Parameter::estimated(0.01, uniform(0.0, 100000.0)).non_negative()
        }
        "species.birthDeath.relativeDeathRate" => Parameter::estimated(0.5, uniform(0.0, 1.0)).zero_one(),

        _ => return None,
    };
    Some(p)
}

/// One default proposal kernel for a parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperatorTemplate {
    pub kind: OperatorKind,
    pub tuning: f64,
    pub weight: f64,
}

const fn op(kind: OperatorKind, tuning: f64, weight: f64) -> OperatorTemplate {
    OperatorTemplate { kind, tuning, weight }
}

/// Default kernels for a parameter. Parameters updated jointly by a
/// dedicated operator (Gibbs samplers, delta exchanges over compounds)
/// return none.
pub fn default_operators(name: &str) -> Vec<OperatorTemplate> {
    use OperatorKind::*;
    match name {
        "kappa" | "kappa1" | "kappa2" => vec![op(Scale, 0.75, 1.0)],
        "ac" | "ag" | "at" | "cg" | "gt" => vec![op(Scale, 0.75, 1.0)],
        "frequencies" | "hfrequencies" => vec![op(DeltaExchange, 0.01, 1.0)],
        "alpha" | "pInv" | "bcov.alpha" | "bcov.s" => vec![op(Scale, 0.75, 1.0)],

        "clock.rate" | "ucld.mean" | "ucgd.mean" | "uced.mean" => vec![op(Scale, 0.75, 3.0)],
        "ucld.stdev" | "ucgd.shape" | "branchRates.var" => vec![op(Scale, 0.75, 3.0)],
        "branchRates.categories" => vec![op(Swap, 1.0, 10.0), op(IntegerUniform, 1.0, 10.0)],
        "branchRates.quantiles" => vec![op(Uniform, 1.0, 10.0)],
        "localClock.relativeRates" => vec![op(Scale, 0.75, 15.0)],
        "localClock.changes" => vec![op(BitFlip, 1.0, 15.0)],
        "localClock.rate" => vec![op(Scale, 0.75, 3.0)],

        "treeModel.rootHeight" => vec![op(Scale, 0.75, 3.0)],
        "treeModel.internalNodeHeights" => vec![op(Uniform, 1.0, 30.0)],

        "constant.popSize" | "exponential.popSize" | "logistic.popSize" | "expansion.popSize" => {
            vec![op(Scale, 0.75, 3.0)]
        }
        "exponential.growthRate" | "logistic.growthRate" | "expansion.growthRate" => {
            vec![op(RandomWalk, 1.0, 3.0)]
        }
        "exponential.doublingTime" | "logistic.doublingTime" | "expansion.doublingTime" => {
            vec![op(Scale, 0.75, 3.0)]
        }
        "logistic.t50" | "expansion.ancestralProportion" => vec![op(Scale, 0.75, 3.0)],
        "skyline.popSize" => vec![op(Scale, 0.75, 15.0)],
        "skyline.groupSize" => vec![op(IntegerDeltaExchange, 1.0, 6.0)],
        "skygrid.precision" => vec![op(Scale, 0.75, 1.0)],
        "demographic.indicators" => vec![op(BitFlip, 1.0, 30.0)],
        "demographic.populationMean" => vec![op(Scale, 0.9, 5.0)],
        "yule.birthRate" | "birthDeath.meanGrowthRate" | "birthDeath.relativeDeathRate" => {
            vec![op(Scale, 0.75, 3.0)]
        }
        "birthDeath.samplingProportion" => vec![op(Scale, 0.75, 3.0)],

        "species.popMean" => vec![op(Scale, 0.9, 5.0)],
        "speciesTree.splitPopSize" => vec![op(Scale, 0.5, 94.0)],
        "species.yule.birthRate"
        | "species.birthDeath.meanGrowthRate"
        | "species.birthDeath.relativeDeathRate" => vec![op(Scale, 0.75, 3.0)],

        _ => Vec::new(),
    }
}
