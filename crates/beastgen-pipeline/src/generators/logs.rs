//! Screen, file and tree loggers, written inside the open `<mcmc>` element.

use beastgen_types::{ClockKind, ClockModel, Result, TreeModel};
use beastgen_xml::{attr, DocumentBuilder};

use super::{clock, species, substitution, tree_prior, write_parameter_ref, StageInput};
use crate::context::{GenerationContext, ParameterFamily};
use crate::extension::{InsertionItem, InsertionPoint};

pub const SCREEN_LOG_ID: &str = "screenLog";
pub const FILE_LOG_ID: &str = "fileLog";
pub const SPECIES_TREE_LOG_ID: &str = "species.treeFileLog";

/// Column precision: decimal places for likelihoods, significant figures
/// for model quantities.
enum Precision {
    Decimal,
    Significant,
}

fn column(b: &mut DocumentBuilder, label: &str, precision: Precision, write: impl FnOnce(&mut DocumentBuilder)) -> Result<()> {
    let digits = match precision {
        Precision::Decimal => attr("dp", 4),
        Precision::Significant => attr("sf", 6),
    };
    b.open_tag("column", &[attr("label", label), digits, attr("width", 12)]);
    write(b);
    b.close_tag("column")
}

/// Clock models of the partitions evaluated on `tree`, in declaration order.
fn clocks_on_tree<'a>(input: &StageInput<'a>, tree: &TreeModel) -> Vec<&'a ClockModel> {
    let config = input.config;
    config
        .clock_models
        .iter()
        .filter(|c| config.partitions_for_tree(&tree.name).any(|p| p.clock_model == c.name))
        .collect()
}

/// Clocks whose rate is logged through a fixed-mean group compound.
fn in_fixed_mean_group(input: &StageInput<'_>, clock: &ClockModel) -> bool {
    input
        .config
        .clock_groups
        .iter()
        .any(|g| g.fix_mean.is_some() && g.clock_models.contains(&clock.name))
}

// ---------------------------------------------------------------------------
// Screen log
// ---------------------------------------------------------------------------

pub fn write_screen_log(input: &StageInput<'_>, b: &mut DocumentBuilder) -> Result<()> {
    let config = input.config;
    b.comment(&["write log to screen"]);
    b.open_tag("log", &[attr("id", SCREEN_LOG_ID), attr("logEvery", config.mcmc.echo_every)]);
    if config.has_data() {
        column(b, "Posterior", Precision::Decimal, |b| b.reference("posterior", "posterior"))?;
    }
    column(b, "Prior", Precision::Decimal, |b| b.reference("prior", "prior"))?;
    if config.has_data() {
        column(b, "Likelihood", Precision::Decimal, |b| b.reference("likelihood", "likelihood"))?;
    }
    if config.species_enabled() {
        column(b, "PopMean", Precision::Decimal, |b| write_parameter_ref(b, species::POP_MEAN_ID))?;
    }
    for tree in &config.tree_models {
        let label = format!("{}rootHeight", input.names.tree_model_prefix(&tree.name));
        let id = format!("{}.rootHeight", input.names.tree_model_id(&tree.name));
        column(b, &label, Precision::Significant, |b| write_parameter_ref(b, &id))?;
    }
    for clock_model in config.active_clock_models() {
        let label = clock::clock_rate_label(input, clock_model)?;
        let rate = match clock_model.kind {
            ClockKind::Uncorrelated { .. } => None,
            _ => Some(clock::rate_parameter_id(input, clock_model)?),
        };
        column(b, &label, Precision::Significant, |b| match rate {
            Some(ref id) => write_parameter_ref(b, id),
            None => b.reference("rateStatistic", &label),
        })?;
    }
    input.insert(InsertionPoint::InScreenLog, InsertionItem::None, b)?;
    b.close_tag("log")?;
    b.blank_line();
    input.insert(InsertionPoint::AfterScreenLog, InsertionItem::None, b)
}

// ---------------------------------------------------------------------------
// File log
// ---------------------------------------------------------------------------

pub fn write_file_log(input: &StageInput<'_>, ctx: &GenerationContext, b: &mut DocumentBuilder) -> Result<()> {
    let config = input.config;
    b.comment(&["write log to file"]);
    b.open_tag(
        "log",
        &[
            attr("id", FILE_LOG_ID),
            attr("logEvery", config.mcmc.log_every),
            attr("fileName", config.mcmc.log_file_name()),
            attr("overwrite", config.mcmc.allow_overwrite_log),
        ],
    );
    if config.has_data() {
        b.reference("posterior", "posterior");
    }
    b.reference("prior", "prior");
    if config.has_data() {
        b.reference("likelihood", "likelihood");
    }

    if config.species_enabled() {
        for r in &ctx.species_priors {
            b.reference(&r.element, &r.id);
        }
        for p in ctx.parameters_of(ParameterFamily::Species) {
            write_parameter_ref(b, &p.id);
        }
        b.reference("tmrcaStatistic", species::ROOT_HEIGHT_ID);
    }

    for tree in &config.tree_models {
        write_parameter_ref(b, &format!("{}.rootHeight", input.names.tree_model_id(&tree.name)));
    }
    for r in &ctx.tmrca_statistics {
        b.reference(&r.element, &r.id);
    }
    for p in ctx.parameters_of(ParameterFamily::TreePrior) {
        if !p.parameter.fixed {
            write_parameter_ref(b, &p.id);
        }
    }
    substitution::write_log(ctx, b);

    for (_, group) in ctx.compounds.iter().filter(|(f, _)| *f == ParameterFamily::Clock) {
        b.reference(&group.element, &group.id);
    }
    for clock_model in config.active_clock_models() {
        if in_fixed_mean_group(input, clock_model) {
            clock::write_spread_log(input, clock_model, ctx, b)?;
        } else {
            clock::write_log(input, clock_model, ctx, b)?;
        }
    }
    for clock_model in config.active_clock_models() {
        clock::write_log_statistics(input, clock_model, b)?;
    }
    input.insert(InsertionPoint::InFileLogParameters, InsertionItem::None, b)?;

    for r in ctx.tree_likelihoods.iter().chain(&ctx.clock_likelihoods) {
        b.reference(&r.element, &r.id);
    }
    input.insert(InsertionPoint::InFileLogLikelihoods, InsertionItem::None, b)?;

    tree_prior::write_prior_likelihood_refs(ctx, b);
    b.close_tag("log")?;
    b.blank_line();
    input.insert(InsertionPoint::AfterFileLog, InsertionItem::None, b)
}

// ---------------------------------------------------------------------------
// Tree logs
// ---------------------------------------------------------------------------

fn tree_log_attrs(input: &StageInput<'_>, id: &str, file_name: String) -> Vec<beastgen_xml::Attribute> {
    vec![
        attr("id", id),
        attr("logEvery", input.config.mcmc.log_every),
        attr("nexusFormat", true),
        attr("fileName", file_name),
        attr("sortTranslationTable", true),
    ]
}

fn write_rate_trait(input: &StageInput<'_>, clock_model: &ClockModel, tree: &TreeModel, b: &mut DocumentBuilder) -> Result<()> {
    let cp = input.names.clock_prefix(&clock_model.name);
    b.open_tag("trait", &[attr("name", "rate"), attr("tag", format!("{cp}rate"))]);
    clock::write_branch_rates_ref(input, clock_model, &tree.name, b)?;
    b.close_tag("trait")
}

pub fn write_tree_logs(input: &StageInput<'_>, b: &mut DocumentBuilder) -> Result<()> {
    let config = input.config;
    b.comment(&["write tree log to file"]);

    if config.species_enabled() {
        let file_name = format!("{}.species.trees", config.mcmc.file_name_stem);
        b.open_tag("logTree", &tree_log_attrs(input, SPECIES_TREE_LOG_ID, file_name));
        b.reference("speciesTree", species::SPECIES_TREE_ID);
        if config.has_data() {
            b.reference("posterior", "posterior");
        }
        b.close_tag("logTree")?;
    }

    for tree in &config.tree_models {
        let prefix = input.names.tree_model_prefix(&tree.name);
        let id = input.names.tree_log_id(&tree.name);
        b.open_tag("logTree", &tree_log_attrs(input, &id, config.mcmc.tree_file_name(&prefix)));
        b.reference("treeModel", &input.names.tree_model_id(&tree.name));
        for clock_model in clocks_on_tree(input, tree) {
            write_rate_trait(input, clock_model, tree, b)?;
        }
        if config.has_data() {
            b.reference("posterior", "posterior");
        }
        input.insert(InsertionPoint::InTreesLog, InsertionItem::TreeModel(tree), b)?;
        b.close_tag("logTree")?;
    }
    b.blank_line();
    input.insert(InsertionPoint::AfterTreesLog, InsertionItem::None, b)
}

/// Every logger, then the end of the MCMC element it sits in.
pub fn generate_loggers(
    input: &StageInput<'_>,
    ctx: GenerationContext,
    b: &mut DocumentBuilder,
) -> Result<GenerationContext> {
    write_screen_log(input, b)?;
    write_file_log(input, &ctx, b)?;
    write_tree_logs(input, b)?;
    b.close_tag("mcmc")?;
    b.blank_line();
    input.insert(InsertionPoint::AfterMcmc, InsertionItem::None, b)?;
    Ok(ctx)
}
