//! Multispecies coalescent: species bindings, the species tree, its prior,
//! and the coalescent of the gene trees within it.

use beastgen_types::{
    GenerationError, Operator, OperatorKind, Parameter, PopulationSizeModel, Result, SpeciesOptions,
    SpeciesTreePrior, SPECIES_TRAIT,
};
use beastgen_xml::{attr, num_attr, DocumentBuilder};

use super::{mint_parameter, write_parameter_ref, StageInput};
use crate::context::{GeneTree, GenerationContext, ParameterFamily, Reference};
use crate::extension::{InsertionItem, InsertionPoint};

pub const SPECIES_ID: &str = "species";
pub const SPECIES_TREE_ID: &str = "sptree";
pub const ALL_SPECIES_ID: &str = "allSpecies";
pub const SPLIT_POP_SIZE_ID: &str = "speciesTree.splitPopSize";
pub const POP_MEAN_ID: &str = "species.popMean";
pub const SPECIATION_LIKELIHOOD_ID: &str = "speciation.likelihood";
pub const ROOT_HEIGHT_ID: &str = "speciesTree.rootHeight";
pub const COALESCENT_ID: &str = "species.coalescent";
pub const POP_SIZES_LIKELIHOOD_ID: &str = "species.popSizesLikelihood";

fn species_options<'a>(input: &StageInput<'a>) -> Result<&'a SpeciesOptions> {
    input
        .config
        .species
        .as_ref()
        .ok_or_else(|| GenerationError::Other("Species analysis is not enabled".to_string()))
}

/// Indicator vector of the population-size mixture: ones mark the tip
/// populations drawn from the shape-2 gamma, zeros the rest.
fn population_indicators(model: PopulationSizeModel, species: usize) -> Vec<f64> {
    let interior = 2 * species.saturating_sub(1);
    match model {
        PopulationSizeModel::ContinuousConstant => {
            let mut v = vec![1.0; species];
            v.extend(std::iter::repeat(0.0).take(interior));
            v
        }
        PopulationSizeModel::PiecewiseLinear => {
            let mut v = vec![1.0; species];
            v.extend(std::iter::repeat(0.0).take(interior + 1));
            v
        }
        PopulationSizeModel::Constant => vec![0.0; interior + 1],
    }
}

fn indicator_text(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| if *v > 0.0 { "1" } else { "0" })
        .collect::<Vec<_>>()
        .join(" ")
}

fn write_bindings(input: &StageInput<'_>, ctx: &mut GenerationContext, b: &mut DocumentBuilder) -> Result<()> {
    let config = input.config;
    b.comment(&["Species definition: binds taxa, species and gene trees"]);
    b.open_tag("species", &[attr("id", SPECIES_ID)]);
    for species in config.species_names() {
        b.open_tag("sp", &[attr("id", species)]);
        for taxon in config
            .taxa
            .iter()
            .filter(|t| t.attributes.get(SPECIES_TRAIT).map(String::as_str) == Some(species))
        {
            b.reference("taxon", &taxon.id);
        }
        b.close_tag("sp")?;
    }

    b.comment(&["Collection of Gene Trees"]);
    b.open_tag("geneTrees", &[attr("id", "geneTrees")]);
    let same_ploidy = config
        .tree_models
        .windows(2)
        .all(|w| w[0].ploidy == w[1].ploidy);
    for tree in &config.tree_models {
        let id = input.names.tree_model_id(&tree.name);
        if same_ploidy {
            b.reference("treeModel", &id);
        } else {
            b.open_tag("gtree", &[num_attr("ploidy", tree.ploidy.value())]);
            b.reference("treeModel", &id);
            b.close_tag("gtree")?;
        }
        ctx.gene_trees.push(GeneTree { tree_model_id: id, ploidy: tree.ploidy.value() });
    }
    b.close_tag("geneTrees")?;
    b.close_tag("species")?;
    b.blank_line();

    b.comment(&["Full species set for species tree root height"]);
    b.open_tag("taxa", &[attr("id", ALL_SPECIES_ID)]);
    for species in config.species_names() {
        b.reference("sp", species);
    }
    b.close_tag("taxa")?;

    let options = species_options(input)?;
    for set in &options.species_sets {
        b.open_tag("taxa", &[attr("id", &set.id)]);
        for member in &set.taxa {
            b.reference("sp", member);
        }
        b.close_tag("taxa")?;
    }
    b.blank_line();
    Ok(())
}

fn write_species_tree(input: &StageInput<'_>, ctx: &mut GenerationContext, b: &mut DocumentBuilder) -> Result<()> {
    let options = species_options(input)?;
    let mut attrs = vec![attr("id", SPECIES_TREE_ID)];
    match options.population_size_model {
        PopulationSizeModel::ContinuousConstant => attrs.push(attr("constantRoot", true)),
        PopulationSizeModel::Constant => attrs.push(attr("constantPopulation", true)),
        PopulationSizeModel::PiecewiseLinear => {}
    }
    b.comment(&["Species Tree: Provides Per branch demographic function"]);
    b.open_tag("speciesTree", &attrs);
    b.reference("species", SPECIES_ID);
    let split = ctx.mint(SPLIT_POP_SIZE_ID, "speciesTree.splitPopSize", ParameterFamily::Species, &options.parameters)?;
    b.open_tag("sppSplitPopulations", &[num_attr("value", split.initial.unwrap_or(1.0))]);
    b.tag("parameter", &[attr("id", SPLIT_POP_SIZE_ID)], true);
    b.close_tag("sppSplitPopulations")?;
    b.close_tag("speciesTree")?;
    b.blank_line();

    ctx.add_operator(Operator::on_tree(OperatorKind::NodeReheight, SPECIES_TREE_ID, 1.0, 94.0));
    Ok(())
}

fn write_species_tree_prior(input: &StageInput<'_>, ctx: &mut GenerationContext, b: &mut DocumentBuilder) -> Result<()> {
    let options = species_options(input)?;
    let overrides = &options.parameters;
    let family = ParameterFamily::Species;
    let (element, id) = match options.tree_prior {
        SpeciesTreePrior::Yule => {
            b.comment(&["Species tree prior: Yule Model"]);
            b.open_tag("yuleModel", &[attr("id", "yule"), attr("units", "substitutions")]);
            mint_parameter(ctx, b, "birthRate", "species.yule.birthRate", "species.yule.birthRate", family, overrides)?;
            b.close_tag("yuleModel")?;
            ("yuleModel", "yule")
        }
        SpeciesTreePrior::BirthDeath => {
            b.comment(&["Species tree prior: Birth Death Model"]);
            b.open_tag("birthDeathModel", &[attr("id", "birthDeath"), attr("units", "substitutions")]);
            mint_parameter(
                ctx,
                b,
                "birthMinusDeathRate",
                "species.birthDeath.meanGrowthRate",
                "species.birthDeath.meanGrowthRate",
                family,
                overrides,
            )?;
            mint_parameter(
                ctx,
                b,
                "relativeDeathRate",
                "species.birthDeath.relativeDeathRate",
                "species.birthDeath.relativeDeathRate",
                family,
                overrides,
            )?;
            b.close_tag("birthDeathModel")?;
            ("birthDeathModel", "birthDeath")
        }
    };
    b.blank_line();

    b.open_tag("speciationLikelihood", &[attr("id", SPECIATION_LIKELIHOOD_ID)]);
    b.open_tag("model", &[]);
    b.reference(element, id);
    b.close_tag("model")?;
    b.open_tag("speciesTree", &[]);
    b.reference("speciesTree", SPECIES_TREE_ID);
    b.close_tag("speciesTree")?;
    b.close_tag("speciationLikelihood")?;
    b.blank_line();
    ctx.species_priors
        .push(Reference::new("speciationLikelihood", SPECIATION_LIKELIHOOD_ID));
    Ok(())
}

fn write_tmrca(b: &mut DocumentBuilder, id: &str, set: &str) -> Result<()> {
    b.open_tag("tmrcaStatistic", &[attr("id", id), attr("name", id)]);
    b.reference("speciesTree", SPECIES_TREE_ID);
    b.open_tag("mrca", &[]);
    b.reference("taxa", set);
    b.close_tag("mrca")?;
    b.close_tag("tmrcaStatistic")
}

fn write_gamma(b: &mut DocumentBuilder, shape: &str, scale: impl FnOnce(&mut DocumentBuilder)) -> Result<()> {
    b.open_tag("gammaDistributionModel", &[]);
    b.open_tag("shape", &[]);
    b.text(shape);
    b.close_tag("shape")?;
    b.open_tag("scale", &[]);
    scale(b);
    b.close_tag("scale")?;
    b.close_tag("gammaDistributionModel")
}

fn write_coalescent(input: &StageInput<'_>, ctx: &mut GenerationContext, b: &mut DocumentBuilder) -> Result<()> {
    let config = input.config;
    let options = species_options(input)?;

    b.comment(&["Species Tree: tmrcaStatistic"]);
    write_tmrca(b, ROOT_HEIGHT_ID, ALL_SPECIES_ID)?;
    b.blank_line();

    b.comment(&["Species Tree: Coalescent likelihood for gene trees under species tree"]);
    b.open_tag("speciesCoalescent", &[attr("id", COALESCENT_ID)]);
    b.reference("species", SPECIES_ID);
    b.reference("speciesTree", SPECIES_TREE_ID);
    b.close_tag("speciesCoalescent")?;
    ctx.species_priors.push(Reference::new("speciesCoalescent", COALESCENT_ID));
    b.blank_line();

    let mean = ctx.mint(POP_MEAN_ID, "species.popMean", ParameterFamily::Species, &options.parameters)?;
    b.comment(&["Species tree prior: gama2 + gamma4"]);
    b.open_tag("mixedDistributionLikelihood", &[attr("id", POP_SIZES_LIKELIHOOD_ID)]);
    b.open_tag("distribution0", &[]);
    write_gamma(b, "2", |b| super::write_parameter(b, POP_MEAN_ID, &mean))?;
    b.close_tag("distribution0")?;
    b.open_tag("distribution1", &[]);
    write_gamma(b, "4", |b| write_parameter_ref(b, POP_MEAN_ID))?;
    b.close_tag("distribution1")?;
    b.open_tag("data", &[]);
    write_parameter_ref(b, SPLIT_POP_SIZE_ID);
    b.close_tag("data")?;
    b.open_tag("indicators", &[]);
    let indicators = population_indicators(options.population_size_model, config.species_names().len());
    b.tag("parameter", &[attr("value", indicator_text(&indicators))], true);
    b.close_tag("indicators")?;
    b.close_tag("mixedDistributionLikelihood")?;
    ctx.species_priors
        .push(Reference::new("mixedDistributionLikelihood", POP_SIZES_LIKELIHOOD_ID));
    b.blank_line();

    for set in &options.species_sets {
        let id = format!("tmrca({})", set.id);
        write_tmrca(b, &id, &set.id)?;
        ctx.tmrca_statistics.push(Reference::new("tmrcaStatistic", id.clone()));
        if let Some(ref calibration) = set.calibration {
            let parameter = Parameter { prior: calibration.clone(), ..Parameter::unset() };
            ctx.mint_statistic("tmrcaStatistic", id, "tmrca", ParameterFamily::Statistic, parameter);
        }
    }
    Ok(())
}

pub fn generate_species(
    input: &StageInput<'_>,
    mut ctx: GenerationContext,
    b: &mut DocumentBuilder,
) -> Result<GenerationContext> {
    if !input.config.species_enabled() {
        return Ok(ctx);
    }
    tracing::debug!(species = input.config.species_names().len(), "Writing multispecies coalescent");
    write_bindings(input, &mut ctx, b)?;
    write_species_tree(input, &mut ctx, b)?;
    write_species_tree_prior(input, &mut ctx, b)?;
    write_coalescent(input, &mut ctx, b)?;
    input.insert(InsertionPoint::AfterTraits, InsertionItem::None, b)?;
    Ok(ctx)
}
