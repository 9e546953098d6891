//! Sequence alignments and the site-pattern lists compressed from them.

use std::collections::BTreeSet;

use beastgen_types::{
    Alignment, CodonPartitioning, DataType, GenerationError, Partition, Result,
};
use beastgen_xml::{attr, DocumentBuilder};

use super::StageInput;
use crate::context::GenerationContext;
use crate::extension::{InsertionItem, InsertionPoint};

/// Alignments referenced by at least one partition, in declaration order.
fn used_alignments<'a>(input: &StageInput<'a>) -> impl Iterator<Item = &'a Alignment> {
    let config = input.config;
    config
        .alignments
        .iter()
        .filter(move |a| config.partitions.iter().any(|p| p.alignment == a.id))
}

pub fn generate_alignments(
    input: &StageInput<'_>,
    ctx: GenerationContext,
    b: &mut DocumentBuilder,
) -> Result<GenerationContext> {
    let prior_only = input.config.mcmc.sample_prior_only;
    for alignment in used_alignments(input) {
        if alignment.data_type == DataType::Microsatellite {
            return Err(GenerationError::unsupported(format!(
                "Microsatellite alignment {} cannot be written as a sequence alignment",
                alignment.id
            )));
        }
        tracing::debug!(alignment = %alignment.id, sequences = alignment.sequences.len(), "Writing alignment");

        b.comment(&[
            "The sequence alignment (each sequence refers to a taxon above).",
            &format!("ntax={} nchar={}", alignment.sequences.len(), alignment.site_count()),
        ]);
        if prior_only {
            b.comment(&["Null sequences generated in order to sample from the prior only."]);
        }
        b.open_tag(
            "alignment",
            &[attr("id", &alignment.id), attr("dataType", alignment.data_type.as_str())],
        );
        let unknown = if alignment.data_type == DataType::Nucleotide { 'N' } else { '?' };
        for sequence in &alignment.sequences {
            b.open_tag("sequence", &[]);
            b.reference("taxon", &sequence.taxon);
            if prior_only {
                let blank: String = std::iter::repeat(unknown)
                    .take(sequence.data.chars().count())
                    .collect();
                b.text(&blank);
            } else {
                b.text(&sequence.data);
            }
            b.close_tag("sequence")?;
        }
        b.close_tag("alignment")?;
        b.blank_line();
    }
    input.insert(InsertionPoint::AfterSequences, InsertionItem::None, b)?;
    Ok(ctx)
}

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

/// Number of distinct site columns among the selected 1-based sites.
fn count_patterns(alignment: &Alignment, from: usize, to: usize, every: usize) -> usize {
    let rows: Vec<Vec<char>> = alignment.sequences.iter().map(|s| s.data.chars().collect()).collect();
    let mut columns: BTreeSet<String> = BTreeSet::new();
    let mut site = from.max(1);
    while site <= to {
        let column: String = rows.iter().filter_map(|r| r.get(site - 1)).collect();
        columns.insert(column);
        site += every.max(1);
    }
    columns.len()
}

struct SiteRange {
    from: usize,
    to: Option<usize>,
    every: usize,
}

impl SiteRange {
    fn attributes(&self, id: Option<&str>) -> Vec<beastgen_xml::Attribute> {
        let mut attrs = Vec::new();
        if let Some(id) = id {
            attrs.push(attr("id", id));
        }
        attrs.push(attr("from", self.from));
        if let Some(to) = self.to {
            attrs.push(attr("to", to));
        }
        if self.every > 1 {
            attrs.push(attr("every", self.every));
        }
        attrs.push(attr("strip", false));
        attrs
    }

    fn describe(&self) -> String {
        let end = self.to.map(|t| t.to_string()).unwrap_or_else(|| "end".to_string());
        if self.every > 1 {
            format!("The unique patterns from {} to {} every {}", self.from, end, self.every)
        } else {
            format!("The unique patterns from {} to {}", self.from, end)
        }
    }
}

fn write_patterns(
    b: &mut DocumentBuilder,
    id: Option<&str>,
    range: &SiteRange,
    alignment: &Alignment,
) -> Result<()> {
    let last = range.to.unwrap_or_else(|| alignment.site_count());
    b.comment(&[
        &range.describe(),
        &format!("npatterns={}", count_patterns(alignment, range.from, last, range.every)),
    ]);
    b.open_tag("patterns", &range.attributes(id));
    b.reference("alignment", &alignment.id);
    b.close_tag("patterns")
}

fn write_partition_patterns(
    input: &StageInput<'_>,
    partition: &Partition,
    b: &mut DocumentBuilder,
) -> Result<()> {
    let config = input.config;
    let alignment = config.alignment(&partition.alignment).ok_or_else(|| {
        GenerationError::invalid(format!(
            "Partition {} refers to an unknown alignment, {}",
            partition.name, partition.alignment
        ))
    })?;
    let model = config.substitution_model(&partition.substitution_model).ok_or_else(|| {
        GenerationError::invalid(format!(
            "Partition {} refers to an unknown substitution model, {}",
            partition.name, partition.substitution_model
        ))
    })?;
    let from = partition.from.unwrap_or(1);
    let every = partition.every.unwrap_or(1);
    tracing::debug!(partition = %partition.name, codon = ?model.codon, "Writing patterns");

    if model.codon.is_split() && every > 1 {
        return Err(GenerationError::invalid(format!(
            "Partition {} cannot be split into codon positions when it already takes every {} sites",
            partition.name, every
        )));
    }

    let codon_range = |offset: usize| SiteRange {
        from: from + offset,
        to: partition.to,
        every: 3,
    };

    match model.codon {
        CodonPartitioning::None => {
            let id = input.names.patterns_id(&partition.name, model.codon, 1);
            let range = SiteRange { from, to: partition.to, every };
            write_patterns(b, Some(&id), &range, alignment)?;
        }
        CodonPartitioning::Positions112 => {
            let merged = input.names.patterns_id(&partition.name, model.codon, 1);
            b.open_tag("mergePatterns", &[attr("id", &merged)]);
            write_patterns(b, None, &codon_range(0), alignment)?;
            write_patterns(b, None, &codon_range(1), alignment)?;
            b.close_tag("mergePatterns")?;
            let third = input.names.patterns_id(&partition.name, model.codon, 2);
            write_patterns(b, Some(&third), &codon_range(2), alignment)?;
        }
        CodonPartitioning::Positions123 => {
            for position in 1..=3 {
                let id = input.names.patterns_id(&partition.name, model.codon, position);
                write_patterns(b, Some(&id), &codon_range(position - 1), alignment)?;
            }
        }
    }
    b.blank_line();
    Ok(())
}

pub fn generate_patterns(
    input: &StageInput<'_>,
    ctx: GenerationContext,
    b: &mut DocumentBuilder,
) -> Result<GenerationContext> {
    if input.config.has_data() {
        for partition in &input.config.partitions {
            write_partition_patterns(input, partition, b)?;
        }
    } else {
        tracing::debug!("Sampling from the prior only, no pattern lists written");
    }
    input.insert(InsertionPoint::AfterPatterns, InsertionItem::None, b)?;
    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::NoInsertions;
    use beastgen_types::{AnalysisConfig, Sequence, SubstitutionKind, SubstitutionModel, Taxon};

    fn config(codon: CodonPartitioning) -> AnalysisConfig {
        let mut model = SubstitutionModel::new("hky", SubstitutionKind::Hky);
        model.codon = codon;
        AnalysisConfig {
            taxa: vec![Taxon::new("A"), Taxon::new("B")],
            alignments: vec![Alignment {
                id: "aln".into(),
                data_type: DataType::Nucleotide,
                sequences: vec![
                    Sequence { taxon: "A".into(), data: "ACGACGACG".into() },
                    Sequence { taxon: "B".into(), data: "ACGACTACG".into() },
                ],
            }],
            partitions: vec![Partition::new("p", "aln", "hky", "strict", "tree")],
            substitution_models: vec![model],
            ..Default::default()
        }
    }

    fn patterns(config: &AnalysisConfig) -> Result<String> {
        let input = StageInput::new(config, &NoInsertions);
        let mut b = DocumentBuilder::new();
        generate_patterns(&input, GenerationContext::new(), &mut b)?;
        b.finish()
    }

    #[test]
    fn alignment_lists_sequences() {
        let config = config(CodonPartitioning::None);
        let input = StageInput::new(&config, &NoInsertions);
        let mut b = DocumentBuilder::new();
        generate_alignments(&input, GenerationContext::new(), &mut b).unwrap();
        let xml = b.finish().unwrap();
        assert!(xml.contains("<alignment id=\"aln\" dataType=\"nucleotide\">"));
        assert!(xml.contains("<sequence>\n\t\t<taxon idref=\"A\"/>\n\t\tACGACGACG\n\t</sequence>"), "{xml}");
        assert!(xml.contains("<!-- ntax=2 nchar=9 -->"));
    }

    #[test]
    fn prior_only_blanks_sequence_data() {
        let mut config = config(CodonPartitioning::None);
        config.mcmc.sample_prior_only = true;
        let input = StageInput::new(&config, &NoInsertions);
        let mut b = DocumentBuilder::new();
        generate_alignments(&input, GenerationContext::new(), &mut b).unwrap();
        let xml = b.finish().unwrap();
        assert!(xml.contains("NNNNNNNNN"));
        assert!(!xml.contains("ACGACG"));
    }

    #[test]
    fn prior_only_writes_no_patterns() {
        let mut config = config(CodonPartitioning::Positions112);
        config.mcmc.sample_prior_only = true;
        let xml = patterns(&config).unwrap();
        assert!(!xml.contains("patterns"), "{xml}");
    }

    #[test]
    fn microsatellite_is_unsupported() {
        let mut config = config(CodonPartitioning::None);
        config.alignments[0].data_type = DataType::Microsatellite;
        let input = StageInput::new(&config, &NoInsertions);
        let mut b = DocumentBuilder::new();
        let err = generate_alignments(&input, GenerationContext::new(), &mut b).unwrap_err();
        assert!(matches!(err, GenerationError::UnsupportedConfiguration(_)));
    }

    #[test]
    fn unsplit_partition_has_one_pattern_list() {
        let xml = patterns(&config(CodonPartitioning::None)).unwrap();
        assert!(xml.contains("<patterns id=\"patterns\" from=\"1\" strip=\"false\">"), "{xml}");
        assert!(xml.contains("<!-- npatterns=4 -->"), "{xml}");
    }

    #[test]
    fn positions_112_merge_first_two() {
        let xml = patterns(&config(CodonPartitioning::Positions112)).unwrap();
        assert!(xml.contains("<mergePatterns id=\"CP1+2.patterns\">"));
        assert!(xml.contains("<patterns from=\"1\" every=\"3\" strip=\"false\">"));
        assert!(xml.contains("<patterns from=\"2\" every=\"3\" strip=\"false\">"));
        assert!(xml.contains("<patterns id=\"CP3.patterns\" from=\"3\" every=\"3\" strip=\"false\">"));
        let merge = xml.find("</mergePatterns>").unwrap();
        let third = xml.find("CP3.patterns").unwrap();
        assert!(merge < third);
    }

    #[test]
    fn positions_123_has_three_lists() {
        let xml = patterns(&config(CodonPartitioning::Positions123)).unwrap();
        for id in ["CP1.patterns", "CP2.patterns", "CP3.patterns"] {
            assert!(xml.contains(&format!("id=\"{id}\"")), "missing {id}");
        }
        assert!(!xml.contains("mergePatterns"));
    }

    #[test]
    fn codon_split_with_every_is_invalid() {
        let mut config = config(CodonPartitioning::Positions123);
        config.partitions[0].every = Some(2);
        let err = patterns(&config).unwrap_err();
        assert!(matches!(err, GenerationError::InvalidConfiguration(_)));
    }

    #[test]
    fn pattern_count_ignores_duplicates() {
        let config = config(CodonPartitioning::None);
        assert_eq!(count_patterns(&config.alignments[0], 1, 9, 3), 1);
        assert_eq!(count_patterns(&config.alignments[0], 3, 9, 3), 2);
    }
}
