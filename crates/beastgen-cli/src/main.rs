//! CLI binary for validating analysis configurations and generating BEAST XML.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use beastgen_pipeline::BeastGenerator;
use beastgen_types::AnalysisConfig;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "beastgen", version, about = "Generate BEAST XML from an analysis configuration")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a BEAST XML document
    Generate {
        /// Path to the analysis configuration (.json)
        config: PathBuf,

        /// Output file path (default: <file name stem>.xml)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Provenance timestamp, RFC 3339 (default: now)
        #[arg(long)]
        timestamp: Option<DateTime<Utc>>,
    },

    /// Validate an analysis configuration
    Validate {
        /// Path to the analysis configuration (.json)
        config: PathBuf,
    },

    /// Show a summary of an analysis configuration
    Info {
        /// Path to the analysis configuration (.json)
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Generate { config, output, timestamp } => {
            cmd_generate(&config, output.as_deref(), timestamp)?;
        }
        Commands::Validate { config } => {
            cmd_validate(&config)?;
        }
        Commands::Info { config } => {
            cmd_info(&config)?;
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<AnalysisConfig> {
    AnalysisConfig::load(path).with_context(|| format!("Failed to load configuration {}", path.display()))
}

fn cmd_generate(path: &Path, output: Option<&Path>, timestamp: Option<DateTime<Utc>>) -> anyhow::Result<()> {
    let mut config = load_config(path)?;
    config.mcmc.generated_at = Some(timestamp.unwrap_or_else(Utc::now));

    let output = match output {
        Some(p) => p.to_path_buf(),
        None => PathBuf::from(format!("{}.xml", config.mcmc.file_name_stem)),
    };

    let generator = BeastGenerator::with_default_registry();
    let document = match generator.generate(&config) {
        Ok(document) => document,
        Err(beastgen_types::GenerationError::Validation(errors)) => {
            for e in &errors {
                eprintln!("[ERROR] {}: {}", e.category, e.message);
            }
            anyhow::bail!("Configuration has {} validation error(s); nothing was written", errors.len());
        }
        Err(e) => return Err(anyhow::Error::new(e).context("Generation failed; nothing was written")),
    };

    document
        .write_atomic(&output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Wrote {} ({} bytes)", output.display(), document.xml.len());
    Ok(())
}

fn cmd_validate(path: &Path) -> anyhow::Result<()> {
    let config = load_config(path)?;
    let errors = beastgen_pipeline::validate(&config);

    if errors.is_empty() {
        println!("Configuration is valid");
        return Ok(());
    }

    for e in &errors {
        println!("[ERROR] {}: {}", e.category, e.message);
    }
    std::process::exit(1);
}

fn cmd_info(path: &Path) -> anyhow::Result<()> {
    let config = load_config(path)?;

    println!("Taxa: {}", config.taxa.len());
    if config.has_tip_dates() {
        println!("Tip dates: yes");
    }
    println!("Taxon sets: {}", config.taxon_sets.len());
    println!("Alignments: {}", config.alignments.len());

    println!("\nPartitions:");
    for p in &config.partitions {
        println!(
            "  {} [{}] substitution={} clock={} tree={}",
            p.name, p.alignment, p.substitution_model, p.clock_model, p.tree_model
        );
    }

    println!("\nSubstitution models:");
    for m in &config.substitution_models {
        println!("  {} {}", m.name, m.kind.name());
    }
    println!("\nClock models:");
    for m in &config.clock_models {
        println!("  {} {}", m.name, m.kind.name());
    }
    println!("\nTree models:");
    for t in &config.tree_models {
        match config.tree_prior_for(&t.name) {
            Some(prior) => println!("  {} prior={}", t.name, prior.kind.name()),
            None => println!("  {}", t.name),
        }
    }
    if let Some(ref species) = config.species {
        println!("\nSpecies: {} ({:?})", config.species_names().len(), species.tree_prior);
    }
    println!("\nChain length: {}", config.mcmc.chain_length);
    Ok(())
}
