//! Substitution models, their frequency models, and site models.
//!
//! A codon-split nucleotide model is written once per position group when
//! its substitution parameters are unlinked and once otherwise; site models
//! are always per position group. Linked frequencies and heterogeneity
//! parameters are minted at the first position and referenced afterwards.
//!
//! Every site model under a clock that covers more than one of them carries a
//! relative rate `mu`. The rates of one clock are collected into an `allMus`
//! compound and moved by a delta exchange weighted by site counts.

use beastgen_types::{
    AnalysisConfig, CodonPartitioning, DataType, FrequencyPolicy, GenerationError, Operator, OperatorKind,
    Parameter, Partition, Result, SubstitutionKind, SubstitutionModel,
};
use beastgen_xml::{attr, numbers, DocumentBuilder};

use super::{mint_parameter, write_codon_patterns_ref, write_parameter, write_parameter_block, write_parameter_ref, StageInput};
use crate::catalog;
use crate::context::{GenerationContext, ParameterFamily, Reference};
use crate::extension::{InsertionItem, InsertionPoint};

/// Element name and id stem of the substitution model for a kind.
pub fn model_element(kind: &SubstitutionKind) -> Result<(&'static str, &'static str)> {
    match kind {
        SubstitutionKind::Jc => Ok(("HKYModel", "jc")),
        SubstitutionKind::Hky => Ok(("HKYModel", "hky")),
        SubstitutionKind::Tn93 => Ok(("TN93Model", "tn93")),
        SubstitutionKind::Gtr => Ok(("gtrModel", "gtr")),
        SubstitutionKind::AminoAcid { .. } => Ok(("aminoAcidModel", "aa")),
        SubstitutionKind::BinarySimple => Ok(("binarySubstitutionModel", "bsimple")),
        SubstitutionKind::BinaryCovarion => Ok(("binaryCovarionModel", "bcov")),
        SubstitutionKind::BinaryDollo => Err(dollo_unsupported()),
    }
}

fn dollo_unsupported() -> GenerationError {
    GenerationError::unsupported("The stochastic Dollo model is not supported")
}

/// Id of the substitution model element a position group uses.
fn model_id(input: &StageInput<'_>, model: &SubstitutionModel, position: usize) -> Result<String> {
    let (_, stem) = model_element(&model.kind)?;
    Ok(format!("{}{}", input.names.substitution_model_prefix(model, position), stem))
}

/// Position groups a model is split into.
fn positions(model: &SubstitutionModel) -> std::ops::RangeInclusive<usize> {
    1..=model.codon.partition_count()
}

/// Whether a linked parameter at this position is a reference to the one
/// minted at position 1.
fn is_linked_repeat(unlinked: bool, position: usize) -> bool {
    !unlinked && position > 1
}

fn param(
    input: &StageInput<'_>,
    model: &SubstitutionModel,
    position: usize,
    ctx: &mut GenerationContext,
    b: &mut DocumentBuilder,
    wrapper: &str,
    name: &str,
) -> Result<()> {
    let id = format!("{}{}", input.names.substitution_model_prefix(model, position), name);
    mint_parameter(ctx, b, wrapper, &id, name, ParameterFamily::Substitution, &model.parameters)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Frequencies
// ---------------------------------------------------------------------------

/// The data an empirical frequency model is computed from.
fn write_empirical_source(
    input: &StageInput<'_>,
    model: &SubstitutionModel,
    position: usize,
    b: &mut DocumentBuilder,
) -> Result<()> {
    let config = input.config;
    let partitions: Vec<&Partition> = config.partitions_for_substitution(&model.name).collect();
    if partitions.is_empty() {
        return Err(GenerationError::invalid(format!(
            "Substitution model {} is not used by any partition",
            model.name
        )));
    }
    if model.codon.is_split() && model.unlinked_substitution && config.has_data() {
        for partition in partitions {
            let id = input.names.patterns_id(&partition.name, model.codon, position);
            write_codon_patterns_ref(b, &id, model.codon, position);
        }
    } else {
        let mut written: Vec<&str> = Vec::new();
        for partition in partitions {
            if !written.contains(&partition.alignment.as_str()) {
                b.reference("alignment", &partition.alignment);
                written.push(&partition.alignment);
            }
        }
    }
    Ok(())
}

/// `<parameter id value="1/k ..."/>` for a frequency vector, minted on
/// first use.
fn write_frequency_parameter(
    model: &SubstitutionModel,
    id: &str,
    policy: FrequencyPolicy,
    ctx: &mut GenerationContext,
    b: &mut DocumentBuilder,
) {
    let states = model.kind.data_type().state_count();
    let share = 1.0 / states as f64;
    let base = match policy {
        FrequencyPolicy::Estimated => catalog::default_parameter("frequencies")
            .unwrap_or_else(|| Parameter::fixed(share)),
        FrequencyPolicy::Empirical | FrequencyPolicy::AllEqual => Parameter::fixed(share),
    };
    let mut base = base.with_dimension(states);
    base.initial = Some(share);
    ctx.mint_from(base, id, "frequencies", ParameterFamily::Substitution, &model.parameters);
    b.tag(
        "parameter",
        &[attr("id", id), attr("value", numbers(&vec![share; states]))],
        true,
    );
}

fn write_frequencies(
    input: &StageInput<'_>,
    model: &SubstitutionModel,
    position: usize,
    policy: FrequencyPolicy,
    ctx: &mut GenerationContext,
    b: &mut DocumentBuilder,
) -> Result<()> {
    let id = format!("{}frequencies", input.names.frequencies_prefix(model, position));
    b.open_tag("frequencies", &[]);
    b.open_tag("frequencyModel", &[attr("dataType", model.kind.data_type().as_str())]);
    if policy == FrequencyPolicy::Empirical {
        write_empirical_source(input, model, position, b)?;
    }
    b.open_tag("frequencies", &[]);
    if is_linked_repeat(model.unlinked_frequencies, position) {
        write_parameter_ref(b, &id);
    } else {
        write_frequency_parameter(model, &id, policy, ctx, b);
    }
    b.close_tag("frequencies")?;
    b.close_tag("frequencyModel")?;
    b.close_tag("frequencies")
}

// ---------------------------------------------------------------------------
// Substitution models
// ---------------------------------------------------------------------------

fn write_substitution_model(
    input: &StageInput<'_>,
    model: &SubstitutionModel,
    position: usize,
    ctx: &mut GenerationContext,
    b: &mut DocumentBuilder,
) -> Result<()> {
    let (element, _) = model_element(&model.kind)?;
    let id = model_id(input, model, position)?;
    let policy = model.frequencies;
    match model.kind {
        SubstitutionKind::Jc => {
            b.comment(&["The JC substitution model (Jukes & Cantor, 1969)"]);
            b.open_tag(element, &[attr("id", &id)]);
            write_frequencies(input, model, position, FrequencyPolicy::AllEqual, ctx, b)?;
            write_parameter_block(b, "kappa", "", &Parameter::fixed(1.0))?;
        }
        SubstitutionKind::Hky => {
            b.comment(&["The HKY substitution model (Hasegawa, Kishino & Yano, 1985)"]);
            b.open_tag(element, &[attr("id", &id)]);
            write_frequencies(input, model, position, policy, ctx, b)?;
            param(input, model, position, ctx, b, "kappa", "kappa")?;
        }
        SubstitutionKind::Tn93 => {
            b.comment(&["The TN93 substitution model (Tamura & Nei, 1993)"]);
            b.open_tag(element, &[attr("id", &id)]);
            write_frequencies(input, model, position, policy, ctx, b)?;
            param(input, model, position, ctx, b, "kappa1", "kappa1")?;
            param(input, model, position, ctx, b, "kappa2", "kappa2")?;
        }
        SubstitutionKind::Gtr => {
            b.comment(&["The general time reversible (GTR) substitution model"]);
            b.open_tag(element, &[attr("id", &id)]);
            write_frequencies(input, model, position, policy, ctx, b)?;
            for (socket, name) in [("rateAC", "ac"), ("rateAG", "ag"), ("rateAT", "at"), ("rateCG", "cg"), ("rateGT", "gt")] {
                param(input, model, position, ctx, b, socket, name)?;
            }
        }
        SubstitutionKind::AminoAcid { ref matrix } => {
            b.comment(&[&format!("The {matrix} substitution model")]);
            b.tag(element, &[attr("id", &id), attr("type", matrix)], true);
            return Ok(());
        }
        SubstitutionKind::BinarySimple => {
            b.comment(&["The Binary simple model (based on the general substitution model)"]);
            b.open_tag(element, &[attr("id", &id)]);
            write_frequencies(input, model, position, policy, ctx, b)?;
        }
        SubstitutionKind::BinaryCovarion => {
            b.comment(&["The Binary covarion model"]);
            b.open_tag(element, &[attr("id", &id)]);
            let sp = input.names.substitution_model_prefix(model, position);
            b.open_tag("frequencies", &[]);
            write_frequency_parameter(model, &format!("{sp}frequencies"), policy, ctx, b);
            b.close_tag("frequencies")?;
            let hidden = format!("{sp}hfrequencies");
            ctx.mint_dimensioned(&hidden, "hfrequencies", ParameterFamily::Substitution, &model.parameters, 2)?;
            b.open_tag("hiddenFrequencies", &[]);
            b.tag(
                "parameter",
                &[attr("id", &hidden), attr("value", numbers(&[0.5, 0.5])), attr("lower", "0.0"), attr("upper", "1.0")],
                true,
            );
            b.close_tag("hiddenFrequencies")?;
            param(input, model, position, ctx, b, "alpha", "bcov.alpha")?;
            param(input, model, position, ctx, b, "switchingRate", "bcov.s")?;
        }
        SubstitutionKind::BinaryDollo => return Err(dollo_unsupported()),
    }
    b.close_tag(element)
}

// ---------------------------------------------------------------------------
// Site models
// ---------------------------------------------------------------------------

/// A heterogeneity parameter, minted at the first position and referenced
/// afterwards when linked.
fn write_heterogeneity(
    input: &StageInput<'_>,
    model: &SubstitutionModel,
    position: usize,
    ctx: &mut GenerationContext,
    b: &mut DocumentBuilder,
    name: &str,
) -> Result<()> {
    let id = format!("{}{}", input.names.heterogeneity_prefix(model, position), name);
    if is_linked_repeat(model.unlinked_heterogeneity, position) {
        write_parameter_ref(b, &id);
    } else {
        let p = ctx.mint(&id, name, ParameterFamily::Substitution, &model.parameters)?;
        write_parameter(b, &id, &p);
    }
    Ok(())
}

fn write_site_model(
    input: &StageInput<'_>,
    model: &SubstitutionModel,
    position: usize,
    ctx: &mut GenerationContext,
    b: &mut DocumentBuilder,
) -> Result<()> {
    let (element, _) = model_element(&model.kind)?;
    let id = input.names.site_model_id(model, position);
    b.comment(&["site model"]);
    b.open_tag("siteModel", &[attr("id", &id)]);
    b.open_tag("substitutionModel", &[]);
    b.reference(element, &model_id(input, model, position)?);
    b.close_tag("substitutionModel")?;

    if has_relative_rate(input, model) {
        let mu = relative_rate_id(input, model, position);
        mint_parameter(ctx, b, "relativeRate", &mu, "mu", ParameterFamily::Substitution, &model.parameters)?;
    }
    if model.gamma {
        b.open_tag("gammaShape", &[attr("gammaCategories", model.gamma_categories)]);
        write_heterogeneity(input, model, position, ctx, b, "alpha")?;
        b.close_tag("gammaShape")?;
    }
    if model.invariant_sites {
        b.open_tag("proportionInvariant", &[]);
        write_heterogeneity(input, model, position, ctx, b, "pInv")?;
        b.close_tag("proportionInvariant")?;
    }
    b.close_tag("siteModel")
}

fn relative_rate_id(input: &StageInput<'_>, model: &SubstitutionModel, position: usize) -> String {
    format!("{}mu", input.names.substitution_prefix_codon(model, position))
}

/// Clocks named by the partitions, in partition order.
fn partition_clocks(config: &AnalysisConfig) -> Vec<&str> {
    let mut clocks: Vec<&str> = Vec::new();
    for partition in &config.partitions {
        if !clocks.contains(&partition.clock_model.as_str()) {
            clocks.push(&partition.clock_model);
        }
    }
    clocks
}

/// Relative-rate units under a clock: every position group of every
/// substitution model its partitions use.
fn relative_rate_units<'a>(input: &StageInput<'a>, clock: &str) -> Vec<(&'a SubstitutionModel, usize)> {
    let config = input.config;
    let mut models: Vec<&'a SubstitutionModel> = Vec::new();
    for partition in config.partitions_for_clock(clock) {
        if let Some(model) = config.substitution_model(&partition.substitution_model) {
            if !models.iter().any(|m| m.name == model.name) {
                models.push(model);
            }
        }
    }
    models
        .into_iter()
        .flat_map(|m| positions(m).map(move |position| (m, position)))
        .collect()
}

/// Whether the site models of `model` carry a relative rate.
fn has_relative_rate(input: &StageInput<'_>, model: &SubstitutionModel) -> bool {
    input
        .config
        .partitions_for_substitution(&model.name)
        .any(|p| relative_rate_units(input, &p.clock_model).len() > 1)
}

/// Sites in each position group over the partitions of the model that run
/// under `clock`. These weight the delta exchange on the relative rates.
fn position_site_counts(input: &StageInput<'_>, model: &SubstitutionModel, clock: &str) -> Vec<u64> {
    let config = input.config;
    let mut per_offset = [0u64; 3];
    for partition in config.partitions_for_substitution(&model.name).filter(|p| p.clock_model == clock) {
        let sites = config.alignment(&partition.alignment).map(|a| a.site_count()).unwrap_or(0);
        let from = partition.from.unwrap_or(1).max(1);
        let to = partition.to.unwrap_or(sites).min(sites);
        for (offset, count) in per_offset.iter_mut().enumerate() {
            let first = from + offset;
            if first <= to {
                *count += ((to - first) / 3 + 1) as u64;
            }
        }
    }
    match model.codon {
        CodonPartitioning::None => vec![per_offset.iter().sum()],
        CodonPartitioning::Positions112 => vec![per_offset[0] + per_offset[1], per_offset[2]],
        CodonPartitioning::Positions123 => per_offset.to_vec(),
    }
}

fn write_all_mus(
    input: &StageInput<'_>,
    clock: &str,
    ctx: &mut GenerationContext,
    b: &mut DocumentBuilder,
) -> Result<()> {
    let units = relative_rate_units(input, clock);
    if units.len() <= 1 {
        return Ok(());
    }
    let id = input.names.all_mus_id(clock);
    let mut weights = Vec::with_capacity(units.len());
    b.comment(&["Collecting together relative rates for partitions"]);
    b.open_tag("compoundParameter", &[attr("id", &id)]);
    for (model, position) in units {
        write_parameter_ref(b, &relative_rate_id(input, model, position));
        let counts = position_site_counts(input, model, clock);
        weights.push(counts.get(position - 1).copied().unwrap_or(0));
    }
    b.close_tag("compoundParameter")?;
    b.blank_line();
    ctx.compounds.push((ParameterFamily::Substitution, Reference::new("compoundParameter", id.clone())));
    ctx.add_operator(Operator {
        parameter_weights: Some(weights),
        ..Operator::on_parameter(OperatorKind::DeltaExchange, id, 0.75, 2.0)
    });
    Ok(())
}

fn check_data_types(input: &StageInput<'_>, model: &SubstitutionModel) -> Result<()> {
    let config = input.config;
    let expected = model.kind.data_type();
    for partition in config.partitions_for_substitution(&model.name) {
        if let Some(alignment) = config.alignment(&partition.alignment) {
            if alignment.data_type != expected {
                return Err(GenerationError::invalid(format!(
                    "The {} model {} cannot be applied to {} data in partition {}",
                    model.kind.name(),
                    model.name,
                    alignment.data_type.as_str(),
                    partition.name
                )));
            }
        }
    }
    if model.codon.is_split() && expected != DataType::Nucleotide {
        return Err(GenerationError::invalid(format!(
            "Only nucleotide models can be split into codon positions ({})",
            model.name
        )));
    }
    Ok(())
}

pub fn generate_substitution_models(
    input: &StageInput<'_>,
    mut ctx: GenerationContext,
    b: &mut DocumentBuilder,
) -> Result<GenerationContext> {
    let models: Vec<&SubstitutionModel> = input.config.active_substitution_models().collect();
    for model in &models {
        check_data_types(input, model)?;
        tracing::debug!(model = %model.name, kind = model.kind.name(), codon = ?model.codon, "Writing substitution model");
        for position in positions(model) {
            if position == 1 || model.unlinked_substitution {
                write_substitution_model(input, model, position, &mut ctx, b)?;
                b.blank_line();
            }
        }
    }
    input.insert(InsertionPoint::AfterSubstitutionModel, InsertionItem::None, b)?;

    for model in &models {
        for position in positions(model) {
            write_site_model(input, model, position, &mut ctx, b)?;
            b.blank_line();
        }
    }
    for clock in partition_clocks(input.config) {
        write_all_mus(input, clock, &mut ctx, b)?;
    }
    input.insert(InsertionPoint::AfterSiteModel, InsertionItem::None, b)?;
    Ok(ctx)
}

/// File-log entries for the estimated substitution parameters of every
/// model, followed by the `allMus` compounds.
pub fn write_log(ctx: &GenerationContext, b: &mut DocumentBuilder) {
    for p in ctx.parameters_of(ParameterFamily::Substitution) {
        if !p.parameter.fixed {
            write_parameter_ref(b, &p.id);
        }
    }
    for (_, r) in ctx.compounds.iter().filter(|(f, _)| *f == ParameterFamily::Substitution) {
        b.reference(&r.element, &r.id);
    }
}
