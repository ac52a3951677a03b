//! Plant identification CLI
//!
//! Runs the two-stage pipeline on a local photo and prints the verdict.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use plant_id::backend::backend_name;
use plant_id::config::PipelineConfig;
use plant_id::dataset::{load_labels, PlantCatalog};
use plant_id::inference::{ClassifierMode, Outcome, PlantIdentifier};
use plant_id::utils::logging::{init_logging, LogConfig};
use plant_id::utils::{format_confidence, format_confidence_bar};

/// Plant species identification from a photo
#[derive(Parser, Debug)]
#[command(name = "plant-id")]
#[command(version = plant_id::VERSION)]
#[command(about = "Identify plant species from a photo with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Identify the plant in an image
    Classify {
        /// Path to the image
        #[arg(short, long)]
        image: PathBuf,

        /// Pipeline configuration (JSON); defaults are used when absent
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory relative resource paths are resolved against
        #[arg(long, default_value = ".")]
        assets: PathBuf,
    },

    /// List the species label file
    Labels {
        /// Pipeline configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the default configuration as JSON
    Config,
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    Ok(match path {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    match cli.command {
        Commands::Classify {
            image,
            config,
            assets,
        } => {
            let config = load_config(config.as_deref())?.with_asset_root(&assets);
            cmd_classify(&image, &config).await?;
        }

        Commands::Labels { config } => {
            let config = load_config(config.as_deref())?;
            cmd_labels(&config)?;
        }

        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&PipelineConfig::default())?);
        }
    }

    Ok(())
}

async fn cmd_classify(image: &Path, config: &PipelineConfig) -> Result<()> {
    info!("Classifying {:?}", image);

    println!("{}", "Classification:".cyan().bold());
    println!("  📷 Image:   {}", image.display());
    println!("  🖥️  Backend: {}", backend_name());
    println!();

    let pipeline = PlantIdentifier::from_config(config);
    let mode = pipeline.initialize().await?;
    if mode == ClassifierMode::Demo {
        println!(
            "{} Species model unavailable, showing random demo results",
            "Warning:".yellow()
        );
        println!();
    }

    let outcome = match pipeline.classify_path(image).await {
        Ok(outcome) => outcome,
        Err(e) => {
            println!("{} {}", "Error:".red(), e.user_message());
            return Err(e.into());
        }
    };

    match outcome {
        Outcome::Rejected(gate) => {
            println!("{}", "No plant detected".red().bold());
            if let Some(guess) = gate.top_guess() {
                println!(
                    "  This looks like {} ({}). Try another photo.",
                    guess.class_name.yellow(),
                    format_confidence(guess.confidence)
                );
            }
        }
        Outcome::Accepted {
            top,
            predictions,
            gate,
            ..
        } => {
            if let Some(keyword) = &gate.matched_keyword {
                println!("  🌿 Plant detected (matched \"{}\")", keyword);
                println!();
            }

            let catalog = match &config.catalog_path {
                Some(path) => PlantCatalog::load(path)?,
                None => PlantCatalog::default(),
            };

            if let Some(best) = top.first() {
                let name = catalog.display_name(&best.class_name);
                println!("{}", name.green().bold());
                println!(
                    "  {}",
                    catalog.scientific_name_or(&best.class_name, &best.class_name).italic()
                );
                println!(
                    "  {} {}",
                    format_confidence_bar(best.confidence, 20),
                    best.level()
                );
                if best.is_low_confidence() {
                    println!(
                        "  {} This match is uncertain",
                        "Note:".yellow()
                    );
                }
                if let Some(record) = catalog.get(&best.class_name) {
                    println!();
                    println!("  Toxicity:  {}", record.toxicity);
                    println!("  Edible:    {}", record.edible);
                    println!("  Geography: {}", record.geography);
                    println!("  {}", record.description);
                }
            }

            println!();
            println!("{}", "Other candidates:".cyan());
            let shown = predictions.top_k(pipeline.presentation().max_results);
            for (rank, prediction) in shown.iter().enumerate().skip(1) {
                println!(
                    "  {}. {:<32} {}",
                    rank + 1,
                    catalog.display_name(&prediction.class_name),
                    format_confidence(prediction.confidence)
                );
            }
        }
    }

    Ok(())
}

fn cmd_labels(config: &PipelineConfig) -> Result<()> {
    let labels = load_labels(&config.species.labels_path)?;

    println!(
        "{} ({} classes)",
        "Species labels:".cyan().bold(),
        labels.len()
    );
    for (index, label) in labels.iter().enumerate() {
        println!("  {:>3}  {}", index, label);
    }

    Ok(())
}
