//! Command-line entry point for curating the problem bank.

/// Curates the multiple-choice math problem bank: ingest, validate, split, migrate.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// The command to execute. If no command is given, help is shown.
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path of the bank file (defaults to MATHBANK_BANK_PATH or assets/data/problems.json).
    #[arg(long, global = true)]
    bank: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Checks every record in the bank and prints the distribution if all pass.
    #[command(alias = "v")]
    Validate,

    /// Merges a file of raw candidate problems into the bank.
    Merge {
        /// JSON file holding an array of candidates (a fenced code block is fine).
        file: PathBuf,
        /// Topic label given to every merged problem.
        topic: String,
        /// Difficulty tier given to every merged problem.
        difficulty: String,
    },

    /// Generates one batch of problems with a provider and merges it.
    Generate {
        topic: String,
        difficulty: String,
        /// How many problems to request.
        #[arg(long, short, default_value_t = 5)]
        count: usize,
        /// Provider key (see `providers`).
        #[arg(long, short, default_value = DEFAULT_PROVIDER)]
        provider: String,
    },

    /// Fills the gap between the bank and the target distribution, batch by batch.
    Batch {
        /// Provider key (see `providers`).
        provider: String,
        /// Maximum problems per request.
        #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u16).range(1..))]
        batch_size: u16,
        /// JSON file of topic -> difficulty -> target count. Built-in targets otherwise.
        #[arg(long)]
        targets: Option<PathBuf>,
        /// Only print the plan.
        #[arg(long)]
        dry_run: bool,
    },

    /// Splits the bank into one file per topic plus an index.
    Split {
        #[arg(long)]
        shard_dir: Option<PathBuf>,
        #[arg(long)]
        index: Option<PathBuf>,
    },

    /// Backs up the bank, renames legacy difficulty tiers and adds the type fields.
    Migrate,

    /// Lists supported providers and the credentials they need.
    Providers,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // --- Configuration & logging ---
    let config = Config::from_env();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.rust_log))
        .with_target(false)
        .init();

    // --- Parse CLI commands ---
    let cli = Cli::parse();
    let bank_path = cli.bank.clone().unwrap_or_else(|| config.bank_path.clone());

    let Some(command) = cli.command else {
        // If no command was given, print help.
        Cli::parse_from(["", "--help"]);
        return Ok(ExitCode::SUCCESS);
    };

    match command {
        Commands::Validate => {
            let bank = ProblemBank::load(&bank_path)?;
            println!("Validating {} problems...", bank.len());
            let report = validate_bank(&bank);
            print_report(&report);
            if !report.is_valid() {
                return Ok(ExitCode::FAILURE);
            }
            print_distribution(&bank.distribution());
        }
        Commands::Merge {
            file,
            topic,
            difficulty,
        } => {
            println!("\n--- Merging {} into {} ---", file.display(), bank_path.display());
            let source = FileSource::new(file);
            let summary = merge_candidate_file(&source, &bank_path, &topic, &difficulty).await?;
            return Ok(finish_population(&summary));
        }
        Commands::Generate {
            topic,
            difficulty,
            count,
            provider,
        } => {
            let source = build_source(&provider, env_credential)?;
            let display = find_provider(&provider).map_or(provider.as_str(), |p| p.display_name);
            println!(
                "\n--- Generating {} '{}' problems on '{}' with {} ---",
                count, difficulty, topic, display
            );
            let plan = [BatchRequest {
                topic,
                difficulty,
                count,
            }];
            let summary = populate_problem_bank(source.as_ref(), &bank_path, &plan).await?;
            return Ok(finish_population(&summary));
        }
        Commands::Batch {
            provider,
            batch_size,
            targets,
            dry_run,
        } => {
            let targets = Targets::load_or_default(targets.as_deref())?;
            let bank = ProblemBank::load_or_default(&bank_path)?;
            let deficits = compute_deficits(&bank, &targets);
            let plan = plan_batches(&deficits, usize::from(batch_size));

            println!("\n--- Generation plan ---");
            for ((topic, difficulty), needed) in deficits.iter().filter(|(_, n)| **n > 0) {
                println!("  {} - {}: {} needed", topic, difficulty, needed);
            }
            let total_needed: usize = deficits.values().sum();
            println!("Total needed: {} in {} requests", total_needed, plan.len());

            if plan.is_empty() {
                println!("All targets are met, nothing to generate.");
                return Ok(ExitCode::SUCCESS);
            }
            if dry_run {
                return Ok(ExitCode::SUCCESS);
            }

            // Fail fast on credentials before any request goes out.
            let source = build_source(&provider, env_credential)?;
            let summary = populate_problem_bank(source.as_ref(), &bank_path, &plan).await?;
            return Ok(finish_population(&summary));
        }
        Commands::Split { shard_dir, index } => {
            let shard_dir = shard_dir.unwrap_or(config.shard_dir);
            let index_path = index.unwrap_or(config.index_path);
            let bank = ProblemBank::load(&bank_path)?;

            println!("\n--- Splitting {} problems ---", bank.len());
            let partition = write_partition(&bank, &shard_dir, &index_path)?;
            for (topic, entry) in &partition.index {
                println!("  {}: {} problems -> {}", topic, entry.count, entry.file);
            }
            println!(
                "Split into {} topic files, index at {}",
                partition.shards.len(),
                index_path.display()
            );
        }
        Commands::Migrate => {
            let bank = ProblemBank::load(&bank_path)
                .context("Migration needs an existing, readable bank")?;
            let backup = backup_bank(&bank_path)?;
            println!("Backed up original bank to {}", backup.display());

            let outcome = migrate(&bank, &TierMap::default());
            outcome.bank.save(&bank_path)?;

            println!("\n--- Migration complete ---");
            println!("  Total problems:    {}", outcome.bank.len());
            println!("  Migrated problems: {}", outcome.migrated_count);
            for correction in &outcome.corrections {
                println!(
                    "  ! {} had unrecognized difficulty {}, set to {}",
                    correction.id.as_deref().unwrap_or("<no id>"),
                    correction
                        .found
                        .as_ref()
                        .map_or_else(|| "<missing>".to_string(), |v| v.to_string()),
                    correction.assigned
                );
            }
            let distribution = outcome.bank.distribution();
            print_shares("Difficulty", &distribution.by_difficulty, distribution.total);
            print_shares("Type", &distribution.by_type, distribution.total);
        }
        Commands::Providers => {
            println!("\n--- Supported providers ---");
            for provider in PROVIDERS {
                println!(
                    "  {:<8} {:<32} {}",
                    provider.key,
                    provider.display_name,
                    provider.credentials.join(", ")
                );
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Prints the outcome of an ingestion run and maps it to an exit code.
fn finish_population(summary: &PopulateSummary) -> ExitCode {
    for failure in &summary.failed {
        eprintln!(
            "  x {} - {} ({} requested): {}",
            failure.request.topic, failure.request.difficulty, failure.request.count, failure.error
        );
    }

    let Some(report) = &summary.report else {
        eprintln!("No problems were produced; the bank was not modified.");
        return ExitCode::FAILURE;
    };

    println!("Added {} problems", summary.added);
    println!("Bank now holds {} problems", summary.total);
    print_report(report);

    if report.is_valid() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_report(report: &ValidationReport) {
    if report.is_valid() {
        println!("All {} problems passed validation.", report.checked);
        return;
    }

    println!("\nFound {} violations:", report.violations.len());
    for violation in &report.violations {
        println!("  - {}", violation);
    }
}

fn print_distribution(distribution: &Distribution) {
    println!("\n--- Statistics ---");
    println!("Total problems: {}", distribution.total);
    println!("\nBy topic:");
    for (topic, count) in &distribution.by_topic {
        println!("  {:<20} {}", topic, count);
    }
    println!("\nBy difficulty:");
    for (difficulty, count) in &distribution.by_difficulty {
        println!("  {:<20} {}", difficulty, count);
    }
}

fn print_shares(label: &str, counts: &BTreeMap<String, usize>, total: usize) {
    println!("\n{} distribution:", label);
    for (value, count) in counts {
        let share = if total == 0 {
            0.0
        } else {
            *count as f64 / total as f64 * 100.0
        };
        println!("  {:<10} {:>5} ({:.1}%)", value, count, share);
    }
}

pub mod candidates;
pub mod config;
pub mod content_source;
pub mod errors;
pub mod migration;
pub mod partition;
pub mod problem_bank;
pub mod problem_bank_populator;
pub mod problems;
pub mod validation;

use crate::config::{Config, Targets};
use crate::content_source::{
    DEFAULT_PROVIDER, FileSource, PROVIDERS, build_source, env_credential, find_provider,
};
use crate::migration::{TierMap, migrate};
use crate::partition::write_partition;
use crate::problem_bank::{Distribution, ProblemBank, backup_bank};
use crate::problem_bank_populator::{
    BatchRequest, PopulateSummary, compute_deficits, merge_candidate_file, plan_batches,
    populate_problem_bank,
};
use crate::validation::{ValidationReport, validate_bank};
use anyhow::Context;
use clap::Parser;
use clap::Subcommand;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
