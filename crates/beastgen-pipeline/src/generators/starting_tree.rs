//! Starting trees: a coalescent simulation, a UPGMA tree, or a user tree.

use beastgen_types::{GenerationError, Result, StartingTree, TreeModel};
use beastgen_xml::{attr, DocumentBuilder};

use super::StageInput;
use crate::context::{GenerationContext, Reference};

/// Element the tree model uses to reference its starting tree.
pub fn starting_tree_element(tree: &TreeModel) -> &'static str {
    match tree.starting_tree {
        StartingTree::Random => "coalescentTree",
        StartingTree::Upgma => "upgmaTree",
        StartingTree::User { .. } => "newick",
    }
}

fn write_random(
    input: &StageInput<'_>,
    tree: &TreeModel,
    seed: &Reference,
    b: &mut DocumentBuilder,
) -> Result<()> {
    let config = input.config;
    let id = input.names.starting_tree_id(&tree.name);
    b.comment(&["Generate a random starting tree under the coalescent process"]);
    b.open_tag("coalescentSimulator", &[attr("id", &id)]);
    for set in config
        .taxon_sets
        .iter()
        .filter(|s| s.monophyletic && config.tree_model_of_set(s) == Some(tree.name.as_str()))
    {
        b.open_tag("coalescentSimulator", &[]);
        b.reference("taxa", &set.id);
        b.reference(&seed.element, &seed.id);
        b.close_tag("coalescentSimulator")?;
    }
    b.reference("taxa", &input.names.tree_taxa_id(&tree.name));
    b.reference(&seed.element, &seed.id);
    b.close_tag("coalescentSimulator")
}

fn write_upgma(input: &StageInput<'_>, tree: &TreeModel, b: &mut DocumentBuilder) -> Result<()> {
    let partition = input.config.partitions_for_tree(&tree.name).next().ok_or_else(|| {
        GenerationError::invalid(format!(
            "A UPGMA starting tree for {} needs at least one partition on that tree",
            tree.name
        ))
    })?;
    let id = input.names.starting_tree_id(&tree.name);
    b.comment(&["Construct a starting tree that is compatible with the data using UPGMA"]);
    b.open_tag(
        "upgmaTree",
        &[attr("id", &id), attr("usingDates", input.config.has_tip_dates())],
    );
    b.open_tag("distanceMatrix", &[attr("correction", "JC")]);
    let mut attrs = vec![attr("from", partition.from.unwrap_or(1))];
    if let Some(to) = partition.to {
        attrs.push(attr("to", to));
    }
    if let Some(every) = partition.every.filter(|e| *e > 1) {
        attrs.push(attr("every", every));
    }
    attrs.push(attr("strip", false));
    b.open_tag("patterns", &attrs);
    b.reference("alignment", &partition.alignment);
    b.close_tag("patterns")?;
    b.close_tag("distanceMatrix")?;
    b.close_tag("upgmaTree")
}

fn write_user(input: &StageInput<'_>, tree: &TreeModel, newick: Option<&str>, b: &mut DocumentBuilder) -> Result<()> {
    let newick = newick.filter(|n| !n.trim().is_empty()).ok_or_else(|| {
        GenerationError::invalid(format!("Tree model {} asks for a user starting tree but none was supplied", tree.name))
    })?;
    let id = input.names.starting_tree_id(&tree.name);
    b.comment(&["The user-specified starting tree in a newick tree format"]);
    b.text_element(
        "newick",
        &[attr("id", &id), attr("usingDates", input.config.has_tip_dates())],
        newick.trim(),
    );
    Ok(())
}

pub fn generate_starting_trees(
    input: &StageInput<'_>,
    ctx: GenerationContext,
    b: &mut DocumentBuilder,
) -> Result<GenerationContext> {
    for tree in &input.config.tree_models {
        tracing::debug!(tree_model = %tree.name, "Writing starting tree");
        match tree.starting_tree {
            StartingTree::Random => {
                let seed = ctx.demographic_seeds.get(&tree.name).ok_or_else(|| {
                    GenerationError::Other(format!("No demographic model seeds tree model {}", tree.name))
                })?;
                write_random(input, tree, seed, b)?;
            }
            StartingTree::Upgma => write_upgma(input, tree, b)?,
            StartingTree::User { ref newick } => write_user(input, tree, newick.as_deref(), b)?,
        }
        b.blank_line();
    }
    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::NoInsertions;
    use beastgen_types::{AnalysisConfig, Partition, Taxon, TaxonSet};

    fn run(config: &AnalysisConfig) -> Result<String> {
        let input = StageInput::new(config, &NoInsertions);
        let mut ctx = GenerationContext::new();
        for tree in &config.tree_models {
            ctx.demographic_seeds
                .insert(tree.name.clone(), Reference::new("constantSize", "constant"));
        }
        let mut b = DocumentBuilder::new();
        generate_starting_trees(&input, ctx, &mut b)?;
        b.finish()
    }

    fn config(start: StartingTree) -> AnalysisConfig {
        let mut tree = TreeModel::new("tree");
        tree.starting_tree = start;
        AnalysisConfig {
            taxa: vec![Taxon::new("A"), Taxon::new("B")],
            partitions: vec![Partition::new("p", "aln", "s", "c", "tree")],
            tree_models: vec![tree],
            ..Default::default()
        }
    }

    #[test]
    fn random_tree_uses_seed_and_constraints() {
        let mut config = config(StartingTree::Random);
        let mut set = TaxonSet::new("clade", &["A", "B"]);
        set.monophyletic = true;
        config.taxon_sets.push(set);
        let xml = run(&config).unwrap();
        assert!(xml.starts_with("<!-- Generate a random starting tree"));
        assert!(xml.contains("<coalescentSimulator id=\"startingTree\">\n\t<coalescentSimulator>\n\t\t<taxa idref=\"clade\"/>"), "{xml}");
        assert!(xml.contains("\t<taxa idref=\"taxa\"/>\n\t<constantSize idref=\"constant\"/>\n</coalescentSimulator>"));
    }

    #[test]
    fn random_trees_simulate_over_their_own_taxa() {
        let mut config = config(StartingTree::Random);
        config.tree_models.push(TreeModel::new("tree2"));
        config.partitions.push(Partition::new("p2", "aln2", "s", "c", "tree2"));
        let xml = run(&config).unwrap();
        assert!(xml.contains("<coalescentSimulator id=\"p.startingTree\">\n\t<taxa idref=\"p.taxa\"/>"), "{xml}");
        assert!(xml.contains("<coalescentSimulator id=\"p2.startingTree\">\n\t<taxa idref=\"p2.taxa\"/>"));
    }

    #[test]
    fn upgma_tree_over_first_partition() {
        let xml = run(&config(StartingTree::Upgma)).unwrap();
        assert!(xml.contains("<upgmaTree id=\"startingTree\" usingDates=\"false\">"));
        assert!(xml.contains("<alignment idref=\"aln\"/>"));
    }

    #[test]
    fn user_tree_is_written_verbatim() {
        let xml = run(&config(StartingTree::User { newick: Some("(A:1.0,B:1.0);".into()) })).unwrap();
        assert!(xml.contains("<newick id=\"startingTree\" usingDates=\"false\">(A:1.0,B:1.0);</newick>"));
    }

    #[test]
    fn user_tree_without_newick_is_invalid() {
        let err = run(&config(StartingTree::User { newick: None })).unwrap_err();
        assert!(matches!(err, GenerationError::InvalidConfiguration(_)));
    }

    #[test]
    fn starting_tree_reference_elements() {
        assert_eq!(starting_tree_element(&TreeModel::new("t")), "coalescentTree");
    }
}
