//! Fragment generators, one module per model family.
//!
//! Every generator has the same shape: it reads the configuration through a
//! [`StageInput`], appends to the [`DocumentBuilder`], and returns the
//! [`GenerationContext`] it was given, extended with whatever it minted.

pub mod alignment;
pub mod clock;
pub mod logs;
pub mod mcmc;
pub mod operators;
pub mod priors;
pub mod species;
pub mod starting_tree;
pub mod substitution;
pub mod taxa;
pub mod tree_likelihood;
pub mod tree_model;
pub mod tree_prior;

use std::collections::BTreeMap;

use beastgen_types::{
    AnalysisConfig, CodonPartitioning, GenerationError, Parameter, ParameterOverride, PriorKind,
    Result,
};
use beastgen_xml::{attr, num_attr, number, Attribute, DocumentBuilder};

use crate::context::{GenerationContext, ParameterFamily};
use crate::extension::{InsertionHook, InsertionItem, InsertionPoint};
use crate::namespace::NamespaceResolver;

/// Signature shared by every stage function.
pub type StageFn = fn(&StageInput<'_>, GenerationContext, &mut DocumentBuilder) -> Result<GenerationContext>;

/// Read-only inputs handed to every stage.
pub struct StageInput<'a> {
    pub config: &'a AnalysisConfig,
    pub names: NamespaceResolver<'a>,
    pub hook: &'a dyn InsertionHook,
}

impl<'a> StageInput<'a> {
    pub fn new(config: &'a AnalysisConfig, hook: &'a dyn InsertionHook) -> Self {
        Self {
            config,
            names: NamespaceResolver::new(config),
            hook,
        }
    }

    pub fn insert(
        &self,
        point: InsertionPoint,
        item: InsertionItem<'_>,
        b: &mut DocumentBuilder,
    ) -> Result<()> {
        self.hook.insert(point, item, b)
    }

    pub fn units(&self) -> &'static str {
        self.config.mcmc.units.as_str()
    }
}

// ---------------------------------------------------------------------------
// Parameter helpers
// ---------------------------------------------------------------------------

/// `<parameter id dimension? value? lower? upper?/>`. Fixed parameters carry
/// no bounds.
pub fn write_parameter(b: &mut DocumentBuilder, id: &str, p: &Parameter) {
    let mut attrs: Vec<Attribute> = Vec::new();
    if !id.is_empty() {
        attrs.push(attr("id", id));
    }
    if let Some(d) = p.dimension.filter(|d| *d > 1) {
        attrs.push(attr("dimension", d));
    }
    if let Some(v) = p.initial {
        attrs.push(num_attr("value", v));
    }
    if !p.fixed {
        let (lower, upper) = if p.zero_one {
            (Some(0.0), Some(1.0))
        } else if p.non_negative {
            (Some(0.0), None)
        } else if let PriorKind::Uniform { lower, upper } = p.prior {
            (Some(lower).filter(|l| l.is_finite()), Some(upper).filter(|u| u.is_finite()))
        } else {
            (None, None)
        };
        if let Some(l) = lower {
            attrs.push(num_attr("lower", l));
        }
        if let Some(u) = upper {
            attrs.push(num_attr("upper", u));
        }
    }
    b.tag("parameter", &attrs, true);
}

/// A parameter wrapped in a named socket element.
pub fn write_parameter_block(b: &mut DocumentBuilder, wrapper: &str, id: &str, p: &Parameter) -> Result<()> {
    b.open_tag(wrapper, &[]);
    write_parameter(b, id, p);
    b.close_tag(wrapper)
}

pub fn write_parameter_ref(b: &mut DocumentBuilder, id: &str) {
    b.reference("parameter", id);
}

/// A parameter idref wrapped in a named socket element.
pub fn write_parameter_ref_block(b: &mut DocumentBuilder, wrapper: &str, id: &str) -> Result<()> {
    b.open_tag(wrapper, &[]);
    write_parameter_ref(b, id);
    b.close_tag(wrapper)
}

/// Mint a catalog parameter and write it inside `wrapper`.
pub fn mint_parameter(
    ctx: &mut GenerationContext,
    b: &mut DocumentBuilder,
    wrapper: &str,
    id: &str,
    name: &str,
    family: ParameterFamily,
    overrides: &BTreeMap<String, ParameterOverride>,
) -> Result<Parameter> {
    let p = ctx.mint(id, name, family, overrides)?;
    write_parameter_block(b, wrapper, id, &p)?;
    Ok(p)
}

/// Reference to the pattern list of one codon position group: the merged
/// 1+2 list is a `mergePatterns`, everything else a `patterns`.
pub fn write_codon_patterns_ref(b: &mut DocumentBuilder, id: &str, codon: CodonPartitioning, position: usize) {
    if codon == CodonPartitioning::Positions112 && position == 1 {
        b.reference("mergePatterns", id);
    } else {
        b.reference("patterns", id);
    }
}

// ---------------------------------------------------------------------------
// Distribution models
// ---------------------------------------------------------------------------

fn text_block(b: &mut DocumentBuilder, name: &str, value: f64) -> Result<()> {
    b.open_tag(name, &[]);
    b.text(&number(value));
    b.close_tag(name)
}

/// A distribution model element for a calibration or a point prior. Only
/// the proper distributions with a closed-form model element are accepted.
pub fn write_distribution_model(b: &mut DocumentBuilder, id: Option<&str>, prior: &PriorKind) -> Result<()> {
    let id_attr: Vec<Attribute> = id.map(|i| vec![attr("id", i)]).unwrap_or_default();
    match *prior {
        PriorKind::Uniform { lower, upper } => {
            b.open_tag("uniformDistributionModel", &id_attr);
            text_block(b, "lower", lower)?;
            text_block(b, "upper", upper)?;
            b.close_tag("uniformDistributionModel")
        }
        PriorKind::Exponential { mean, offset } => {
            b.open_tag("exponentialDistributionModel", &id_attr);
            text_block(b, "mean", mean)?;
            text_block(b, "offset", offset)?;
            b.close_tag("exponentialDistributionModel")
        }
        PriorKind::Normal { mean, stdev } => {
            b.open_tag("normalDistributionModel", &id_attr);
            text_block(b, "mean", mean)?;
            text_block(b, "stdev", stdev)?;
            b.close_tag("normalDistributionModel")
        }
        PriorKind::Lognormal { mu, sigma, offset, real_space } => {
            let mut attrs = id_attr;
            attrs.push(attr("meanInRealSpace", real_space));
            attrs.push(attr("stdevInRealSpace", real_space));
            b.open_tag("logNormalDistributionModel", &attrs);
            text_block(b, "mean", mu)?;
            text_block(b, "stdev", sigma)?;
            text_block(b, "offset", offset)?;
            b.close_tag("logNormalDistributionModel")
        }
        PriorKind::Gamma { shape, scale, offset } => {
            b.open_tag("gammaDistributionModel", &id_attr);
            text_block(b, "shape", shape)?;
            text_block(b, "scale", scale)?;
            text_block(b, "offset", offset)?;
            b.close_tag("gammaDistributionModel")
        }
        ref other => Err(GenerationError::unsupported(format!(
            "A {} distribution cannot be used as a calibration density",
            other.name()
        ))),
    }
}
