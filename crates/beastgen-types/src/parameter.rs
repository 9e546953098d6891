//! Model parameters and their prior distributions.

use serde::{Deserialize, Serialize};

/// A closed interval. Either end may be infinite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lower: f64,
    pub upper: f64,
}

impl Bounds {
    pub const UNBOUNDED: Bounds = Bounds {
        lower: f64::NEG_INFINITY,
        upper: f64::INFINITY,
    };

    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Prior distribution kinds a parameter may carry.
///
/// The three `None*` kinds mark parameters whose prior is supplied elsewhere
/// (by the tree prior, by being fixed, or by a statistic) and which the prior
/// stage therefore skips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PriorKind {
    NoneTreePrior,
    NoneFixed,
    NoneStatistic,
    Improper,
    Uniform {
        lower: f64,
        upper: f64,
    },
    Exponential {
        mean: f64,
        #[serde(default)]
        offset: f64,
    },
    Laplace {
        mean: f64,
        scale: f64,
    },
    Normal {
        mean: f64,
        stdev: f64,
    },
    Lognormal {
        mu: f64,
        sigma: f64,
        #[serde(default)]
        offset: f64,
        #[serde(default)]
        real_space: bool,
    },
    Gamma {
        shape: f64,
        scale: f64,
        #[serde(default)]
        offset: f64,
    },
    InverseGamma {
        shape: f64,
        scale: f64,
        #[serde(default)]
        offset: f64,
    },
    OneOverX,
    Poisson {
        mean: f64,
        #[serde(default)]
        offset: f64,
    },
    Beta {
        shape: f64,
        shape_b: f64,
        #[serde(default)]
        offset: f64,
    },
    CtmcRateReference,
    Dirichlet {
        #[serde(default = "default_dirichlet_alpha")]
        alpha: f64,
        #[serde(default = "default_sums_to")]
        sums_to: f64,
    },
}

fn default_dirichlet_alpha() -> f64 {
    1.0
}

fn default_sums_to() -> f64 {
    1.0
}

impl PriorKind {
    /// Prior kinds that never produce a prior element.
    pub fn is_none(&self) -> bool {
        matches!(
            self,
            PriorKind::NoneTreePrior | PriorKind::NoneFixed | PriorKind::NoneStatistic
        )
    }

    /// Human-readable name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            PriorKind::NoneTreePrior => "none (tree prior only)",
            PriorKind::NoneFixed => "none (fixed)",
            PriorKind::NoneStatistic => "none (statistic)",
            PriorKind::Improper => "improper uniform",
            PriorKind::Uniform { .. } => "uniform",
            PriorKind::Exponential { .. } => "exponential",
            PriorKind::Laplace { .. } => "laplace",
            PriorKind::Normal { .. } => "normal",
            PriorKind::Lognormal { .. } => "lognormal",
            PriorKind::Gamma { .. } => "gamma",
            PriorKind::InverseGamma { .. } => "inverse gamma",
            PriorKind::OneOverX => "1/x",
            PriorKind::Poisson { .. } => "poisson",
            PriorKind::Beta { .. } => "beta",
            PriorKind::CtmcRateReference => "CTMC rate reference",
            PriorKind::Dirichlet { .. } => "dirichlet",
        }
    }
}

/// A fully resolved parameter: catalog defaults merged with any override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// `None` means the engine chooses the starting value.
    pub initial: Option<f64>,
    pub dimension: Option<usize>,
    pub fixed: bool,
    pub non_negative: bool,
    pub zero_one: bool,
    pub truncation: Option<Bounds>,
    pub prior: PriorKind,
}

impl Parameter {
    /// An estimated parameter with the given starting value and prior.
    pub fn estimated(initial: f64, prior: PriorKind) -> Self {
        Self {
            initial: Some(initial),
            dimension: None,
            fixed: false,
            non_negative: false,
            zero_one: false,
            truncation: None,
            prior,
        }
    }

    /// A parameter with no starting value whose prior lives elsewhere.
    pub fn unset() -> Self {
        Self {
            initial: None,
            dimension: None,
            fixed: false,
            non_negative: false,
            zero_one: false,
            truncation: None,
            prior: PriorKind::NoneTreePrior,
        }
    }

    /// A fixed parameter. Fixed parameters get no bounds, prior or operator.
    pub fn fixed(initial: f64) -> Self {
        Self {
            initial: Some(initial),
            dimension: None,
            fixed: true,
            non_negative: false,
            zero_one: false,
            truncation: None,
            prior: PriorKind::NoneFixed,
        }
    }

    pub fn non_negative(mut self) -> Self {
        self.non_negative = true;
        self
    }

    pub fn zero_one(mut self) -> Self {
        self.zero_one = true;
        self
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    /// Apply a configuration override on top of these defaults.
    pub fn with_override(mut self, spec: &ParameterOverride) -> Self {
        if let Some(initial) = spec.initial {
            self.initial = Some(initial);
        }
        if let Some(fixed) = spec.fixed {
            self.fixed = fixed;
        }
        if let Some(truncation) = spec.truncation {
            self.truncation = Some(truncation);
        }
        if let Some(ref prior) = spec.prior {
            self.prior = prior.clone();
        }
        if self.fixed {
            self.prior = PriorKind::NoneFixed;
        }
        self
    }

    /// Effective bounds: truncation first, then uniform prior bounds, then
    /// the non-negative / unit-interval flags.
    pub fn bounds(&self) -> Bounds {
        if let Some(truncation) = self.truncation {
            return truncation;
        }
        if let PriorKind::Uniform { lower, upper } = self.prior {
            return Bounds::new(lower, upper);
        }
        if self.zero_one {
            return Bounds::new(0.0, 1.0);
        }
        if self.non_negative {
            return Bounds::new(0.0, f64::INFINITY);
        }
        Bounds::UNBOUNDED
    }

    /// Whether the prior stage emits anything for this parameter.
    pub fn has_prior(&self) -> bool {
        !self.fixed && !self.prior.is_none()
    }
}

/// Partial parameter settings supplied by the configuration. Unset fields
/// keep the generator's defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterOverride {
    pub initial: Option<f64>,
    pub fixed: Option<bool>,
    pub truncation: Option<Bounds>,
    pub prior: Option<PriorKind>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_takes_precedence_over_prior_bounds() {
        let mut p = Parameter::estimated(0.5, PriorKind::Uniform { lower: 0.0, upper: 10.0 });
        p.truncation = Some(Bounds::new(0.1, 0.9));
        assert_eq!(p.bounds(), Bounds::new(0.1, 0.9));
    }

    #[test]
    fn flag_bounds_apply_without_uniform_prior() {
        let p = Parameter::estimated(2.0, PriorKind::OneOverX).non_negative();
        assert_eq!(p.bounds().lower, 0.0);
        assert!(p.bounds().upper.is_infinite());

        let q = Parameter::estimated(0.5, PriorKind::Normal { mean: 0.0, stdev: 1.0 }).zero_one();
        assert_eq!(q.bounds(), Bounds::new(0.0, 1.0));
    }

    #[test]
    fn override_fixing_clears_prior() {
        let p = Parameter::estimated(2.0, PriorKind::OneOverX).with_override(&ParameterOverride {
            fixed: Some(true),
            ..Default::default()
        });
        assert!(p.fixed);
        assert_eq!(p.prior, PriorKind::NoneFixed);
        assert!(!p.has_prior());
    }

    #[test]
    fn override_replaces_initial_and_prior() {
        let p = Parameter::estimated(2.0, PriorKind::OneOverX).with_override(&ParameterOverride {
            initial: Some(3.5),
            prior: Some(PriorKind::Exponential { mean: 1.0, offset: 0.0 }),
            ..Default::default()
        });
        assert_eq!(p.initial, Some(3.5));
        assert_eq!(p.prior.name(), "exponential");
    }

    #[test]
    fn prior_kind_deserializes_tagged() {
        let prior: PriorKind =
            serde_json::from_str(r#"{"type":"gamma","shape":0.05,"scale":10.0}"#).unwrap();
        assert_eq!(prior, PriorKind::Gamma { shape: 0.05, scale: 10.0, offset: 0.0 });
        let none: PriorKind = serde_json::from_str(r#"{"type":"none_tree_prior"}"#).unwrap();
        assert!(none.is_none());
    }
}
