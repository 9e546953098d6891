//! Generation context threaded from stage to stage.
//!
//! Each stage receives the context by value and returns it updated with what
//! it minted: parameters, likelihood ids, statistics, default operators. Later
//! stages (priors, operators, loggers, MCMC assembly) read only from here,
//! never from shared mutable state.

use std::collections::{BTreeMap, BTreeSet};

use beastgen_types::{GenerationError, Operator, Parameter, ParameterOverride, Result};
use serde::Serialize;

use crate::catalog;

/// Which model family minted a parameter. Drives prior and log grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterFamily {
    TreeModel,
    TreePrior,
    Clock,
    Substitution,
    Species,
    Statistic,
}

/// A reference target: element name plus id, enough to write an idref tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    pub element: String,
    pub id: String,
}

impl Reference {
    pub fn new(element: &str, id: impl Into<String>) -> Self {
        Self {
            element: element.to_string(),
            id: id.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MintedParameter {
    pub id: String,
    /// Unprefixed catalog name (`kappa`, `clock.rate`, ...).
    pub name: String,
    pub family: ParameterFamily,
    /// Element used when referencing it (`parameter` or a statistic element).
    pub element: String,
    pub parameter: Parameter,
    /// Tree model id, for priors that need one.
    pub tree_model: Option<String>,
}

/// A gene tree bound into the species coalescent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneTree {
    pub tree_model_id: String,
    pub ploidy: f64,
}

#[derive(Debug, Clone, Default)]
pub struct GenerationContext {
    pub parameters: Vec<MintedParameter>,
    /// Compound parameters (`allMus`, `allClockRates`) by family.
    pub compounds: Vec<(ParameterFamily, Reference)>,
    /// Demographic model seeding each tree model's starting tree, keyed by
    /// tree model name.
    pub demographic_seeds: BTreeMap<String, Reference>,
    pub tmrca_statistics: Vec<Reference>,
    pub monophyly_statistics: Vec<Reference>,
    pub prior_likelihoods: Vec<Reference>,
    pub tree_likelihoods: Vec<Reference>,
    pub clock_likelihoods: Vec<Reference>,
    pub clock_statistics: Vec<Reference>,
    pub gene_trees: Vec<GeneTree>,
    pub species_priors: Vec<Reference>,
    pub operators: Vec<Operator>,
    /// Ids whose catalog operators were replaced by a joint operator.
    suppressed_operators: BTreeSet<String>,
}

impl GenerationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a parameter from its catalog defaults and any override keyed by
    /// its unprefixed name.
    pub fn mint(
        &mut self,
        id: impl Into<String>,
        name: &str,
        family: ParameterFamily,
        overrides: &BTreeMap<String, ParameterOverride>,
    ) -> Result<Parameter> {
        let base = catalog::default_parameter(name)
            .ok_or_else(|| GenerationError::Other(format!("No default for parameter '{name}'")))?;
        Ok(self.mint_from(base, id, name, family, overrides))
    }

    /// [`mint`](Self::mint) for a vector parameter.
    pub fn mint_dimensioned(
        &mut self,
        id: impl Into<String>,
        name: &str,
        family: ParameterFamily,
        overrides: &BTreeMap<String, ParameterOverride>,
        dimension: usize,
    ) -> Result<Parameter> {
        let base = catalog::default_parameter(name)
            .ok_or_else(|| GenerationError::Other(format!("No default for parameter '{name}'")))?;
        Ok(self.mint_from(base.with_dimension(dimension), id, name, family, overrides))
    }

    /// Mint a parameter from explicit defaults.
    pub fn mint_from(
        &mut self,
        base: Parameter,
        id: impl Into<String>,
        name: &str,
        family: ParameterFamily,
        overrides: &BTreeMap<String, ParameterOverride>,
    ) -> Parameter {
        let id = id.into();
        let parameter = match overrides.get(name) {
            Some(spec) => base.with_override(spec),
            None => base,
        };
        if !parameter.fixed {
            for t in catalog::default_operators(name) {
                self.operators
                    .push(Operator::on_parameter(t.kind, id.clone(), t.tuning, t.weight));
            }
        }
        tracing::trace!(parameter = %id, fixed = parameter.fixed, "Parameter minted");
        self.parameters.push(MintedParameter {
            id,
            name: name.to_string(),
            family,
            element: "parameter".to_string(),
            parameter: parameter.clone(),
            tree_model: None,
        });
        parameter
    }

    /// Record a statistic that carries a prior (a calibrated tMRCA, a
    /// change-count sum).
    pub fn mint_statistic(
        &mut self,
        element: &str,
        id: impl Into<String>,
        name: &str,
        family: ParameterFamily,
        parameter: Parameter,
    ) {
        self.parameters.push(MintedParameter {
            id: id.into(),
            name: name.to_string(),
            family,
            element: element.to_string(),
            parameter,
            tree_model: None,
        });
    }

    pub fn attach_tree_model(&mut self, parameter_id: &str, tree_model_id: &str) {
        if let Some(p) = self.parameters.iter_mut().find(|p| p.id == parameter_id) {
            p.tree_model = Some(tree_model_id.to_string());
        }
    }

    /// Drop the catalog operators of a parameter that a joint operator now
    /// updates instead.
    pub fn suppress_operators(&mut self, parameter_id: &str) {
        self.suppressed_operators.insert(parameter_id.to_string());
        self.operators
            .retain(|op| op.parameter.as_deref() != Some(parameter_id));
    }

    pub fn add_operator(&mut self, operator: Operator) {
        if let Some(ref target) = operator.parameter {
            if self.suppressed_operators.contains(target) && operator.parameter2.is_none() {
                return;
            }
        }
        self.operators.push(operator);
    }

    pub fn parameter(&self, id: &str) -> Option<&MintedParameter> {
        self.parameters.iter().find(|p| p.id == id)
    }

    /// Whether `id` names a parameter or compound minted so far.
    pub fn is_parameter(&self, id: &str) -> bool {
        self.parameter(id).is_some() || self.compounds.iter().any(|(_, r)| r.id == id)
    }

    pub fn parameters_of(&self, family: ParameterFamily) -> impl Iterator<Item = &MintedParameter> {
        self.parameters.iter().filter(move |p| p.family == family)
    }
}
