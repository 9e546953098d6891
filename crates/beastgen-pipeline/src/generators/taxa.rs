//! Taxon list and taxon sets.

use beastgen_types::{Result, Taxon, TreeModel, SPECIES_TRAIT};
use beastgen_xml::{attr, num_attr, DocumentBuilder};

use super::StageInput;
use crate::context::GenerationContext;
use crate::extension::{InsertionItem, InsertionPoint};

pub fn generate_taxa(
    input: &StageInput<'_>,
    ctx: GenerationContext,
    b: &mut DocumentBuilder,
) -> Result<GenerationContext> {
    let config = input.config;
    input.insert(InsertionPoint::BeforeTaxa, InsertionItem::None, b)?;

    b.comment(&[
        "The list of taxa to be analysed (can also include dates/ages).",
        &format!("ntax={}", config.taxa.len()),
    ]);
    b.open_tag("taxa", &[attr("id", "taxa")]);
    let in_taxon = input.hook.uses(InsertionPoint::InTaxon);
    for taxon in &config.taxa {
        let traits: Vec<(&String, &String)> = taxon
            .attributes
            .iter()
            .filter(|(k, _)| k.as_str() != SPECIES_TRAIT)
            .collect();
        if taxon.date.is_none() && traits.is_empty() && !in_taxon {
            b.tag("taxon", &[attr("id", &taxon.id)], true);
            continue;
        }
        b.open_tag("taxon", &[attr("id", &taxon.id)]);
        if let Some(ref date) = taxon.date {
            b.tag(
                "date",
                &[
                    num_attr("value", date.value),
                    attr("direction", date.direction.as_str()),
                    attr("units", date.units.as_str()),
                ],
                true,
            );
        }
        for (name, value) in traits {
            b.text_element("attr", &[attr("name", name)], value);
        }
        input.insert(InsertionPoint::InTaxon, InsertionItem::Taxon(taxon), b)?;
        b.close_tag("taxon")?;
    }
    b.close_tag("taxa")?;
    b.blank_line();
    Ok(ctx)
}

/// Taxa sequenced in the alignments of the partitions on `tree`.
fn tree_taxa<'a>(input: &StageInput<'a>, tree: &TreeModel) -> Vec<&'a Taxon> {
    let config = input.config;
    let alignments: Vec<&str> = config.partitions_for_tree(&tree.name).map(|p| p.alignment.as_str()).collect();
    config
        .taxa
        .iter()
        .filter(|t| {
            config
                .alignments
                .iter()
                .filter(|a| alignments.contains(&a.id.as_str()))
                .any(|a| a.sequences.iter().any(|s| s.taxon == t.id))
        })
        .collect()
}

fn write_tree_taxa(input: &StageInput<'_>, b: &mut DocumentBuilder) -> Result<()> {
    for tree in &input.config.tree_models {
        let id = input.names.tree_taxa_id(&tree.name);
        if id == "taxa" {
            continue;
        }
        let taxa = tree_taxa(input, tree);
        b.comment(&[&format!("tree = {}, ntax={}", tree.name, taxa.len())]);
        b.open_tag("taxa", &[attr("id", &id)]);
        for taxon in taxa {
            b.reference("taxon", &taxon.id);
        }
        b.close_tag("taxa")?;
        b.blank_line();
    }
    Ok(())
}

pub fn generate_taxon_sets(
    input: &StageInput<'_>,
    ctx: GenerationContext,
    b: &mut DocumentBuilder,
) -> Result<GenerationContext> {
    write_tree_taxa(input, b)?;
    for set in &input.config.taxon_sets {
        b.open_tag("taxa", &[attr("id", &set.id)]);
        for member in &set.taxa {
            b.reference("taxon", member);
        }
        b.close_tag("taxa")?;
        b.blank_line();
    }
    input.insert(InsertionPoint::AfterTaxa, InsertionItem::None, b)?;
    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::NoInsertions;
    use beastgen_types::{Alignment, AnalysisConfig, DataType, Partition, Sequence, TaxonSet, TimeUnits, TipDate};

    fn run(config: &AnalysisConfig) -> String {
        let input = StageInput::new(config, &NoInsertions);
        let mut b = DocumentBuilder::new();
        let ctx = generate_taxa(&input, GenerationContext::new(), &mut b).unwrap();
        generate_taxon_sets(&input, ctx, &mut b).unwrap();
        b.finish().unwrap()
    }

    #[test]
    fn plain_taxa_are_self_closing() {
        let config = AnalysisConfig {
            taxa: vec![Taxon::new("A"), Taxon::new("B")],
            ..Default::default()
        };
        let xml = run(&config);
        assert!(xml.contains("<!-- ntax=2 -->"));
        assert!(xml.contains("<taxa id=\"taxa\">\n\t<taxon id=\"A\"/>\n\t<taxon id=\"B\"/>\n</taxa>"), "{xml}");
    }

    #[test]
    fn dates_and_traits_are_nested() {
        let mut a = Taxon::new("A");
        a.date = Some(TipDate {
            value: 1990.5,
            direction: Default::default(),
            units: TimeUnits::Years,
        });
        a.attributes.insert("location".into(), "north".into());
        a.attributes.insert(SPECIES_TRAIT.into(), "sp1".into());
        let config = AnalysisConfig { taxa: vec![a], ..Default::default() };
        let xml = run(&config);
        assert!(xml.contains("<date value=\"1990.5\" direction=\"forwards\" units=\"years\"/>"));
        assert!(xml.contains("<attr name=\"location\">north</attr>"));
        assert!(!xml.contains("name=\"species\""), "species trait is bound by the species block: {xml}");
    }

    #[test]
    fn taxon_sets_reference_members() {
        let config = AnalysisConfig {
            taxa: vec![Taxon::new("A"), Taxon::new("B")],
            taxon_sets: vec![TaxonSet::new("clade", &["A", "B"])],
            ..Default::default()
        };
        let xml = run(&config);
        assert!(xml.contains("<taxa id=\"clade\">\n\t<taxon idref=\"A\"/>\n\t<taxon idref=\"B\"/>\n</taxa>"));
    }

    #[test]
    fn each_tree_with_data_lists_its_own_taxa() {
        let sequences = |taxa: &[&str]| -> Vec<Sequence> {
            taxa.iter().map(|t| Sequence { taxon: t.to_string(), data: "ACGT".into() }).collect()
        };
        let config = AnalysisConfig {
            taxa: vec![Taxon::new("A"), Taxon::new("B"), Taxon::new("C")],
            alignments: vec![
                Alignment { id: "aln1".into(), data_type: DataType::Nucleotide, sequences: sequences(&["A", "B", "C"]) },
                Alignment { id: "aln2".into(), data_type: DataType::Nucleotide, sequences: sequences(&["C", "A"]) },
            ],
            partitions: vec![
                Partition::new("p1", "aln1", "s", "c", "t1"),
                Partition::new("p2", "aln2", "s", "c", "t2"),
            ],
            tree_models: vec![TreeModel::new("t1"), TreeModel::new("t2"), TreeModel::new("unused")],
            ..Default::default()
        };
        let xml = run(&config);
        assert!(xml.contains("<taxa id=\"p1.taxa\">\n\t<taxon idref=\"A\"/>\n\t<taxon idref=\"B\"/>\n\t<taxon idref=\"C\"/>"), "{xml}");
        assert!(xml.contains("<taxa id=\"p2.taxa\">\n\t<taxon idref=\"A\"/>\n\t<taxon idref=\"C\"/>\n</taxa>"), "{xml}");
        assert!(!xml.contains("unused"));
    }
}
