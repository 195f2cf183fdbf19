use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use tracing::info;

use unify::db::Database;
use unify::unit::pipeline::{sanitize_source_names, ReconciliationPipeline};
use unify::unit::rules::SanitizerRules;
use unify::unit::sanitizer::NameSanitizer;
use unify::unit::types::SeedData;

#[derive(Parser)]
#[command(author, version, about = "Reconciles organizational names across institutional source systems into one canonical unit tree", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load source records (colleges, departments, teledata) from a JSON file
    Import {
        /// Path to the seed JSON document
        path: String,
    },

    /// Run the full unit reconciliation pipeline
    Run {
        /// Path to a JSON file overriding the built-in sanitizer rule tables
        #[arg(short, long)]
        rules: Option<String>,
    },

    /// Write sanitized forms of all stored source-record names
    Sanitize {
        /// Path to a JSON file overriding the built-in sanitizer rule tables
        #[arg(short, long)]
        rules: Option<String>,
    },

    /// Sanitize a single name and print the result
    TestName {
        /// Raw name to sanitize
        name: String,

        /// Path to a JSON file overriding the built-in sanitizer rule tables
        #[arg(short, long)]
        rules: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    unify::logging::configure_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Import { path } => {
            let db = connect().await?;
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read seed file: {}", path))?;
            let seed: SeedData = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse seed file: {}", path))?;

            let counts = db.replace_sources(&seed).await?;
            println!(
                "Imported {} colleges, {} program departments, {} teledata organizations, {} teledata departments",
                counts.colleges,
                counts.program_departments,
                counts.teledata_organizations,
                counts.teledata_departments
            );
        }

        Commands::Run { rules } => {
            let db = connect().await?;
            let pipeline = ReconciliationPipeline::new(&db, load_rules(rules.as_deref())?);

            info!("Starting unit reconciliation run");
            let stats = pipeline.run().await?;
            stats.print_report();
        }

        Commands::Sanitize { rules } => {
            let db = connect().await?;
            let sanitizer = NameSanitizer::new(load_rules(rules.as_deref())?);

            let counts = sanitize_source_names(&db, &sanitizer).await?;
            println!(
                "Colleges updated      : {}\nOrganizations updated : {}\nProgram departments updated  : {}\nTeledata departments updated : {}",
                counts.colleges,
                counts.teledata_organizations,
                counts.program_departments,
                counts.teledata_departments
            );
        }

        Commands::TestName { name, rules } => {
            let sanitizer = NameSanitizer::new(load_rules(rules.as_deref())?);
            println!("{}", sanitizer.sanitize(&name));
        }
    }

    Ok(())
}

async fn connect() -> Result<Database> {
    let database_url = std::env::var("DATABASE_PATH").unwrap_or_else(|_| "unify.db".to_string());
    Database::new(&database_url)
        .await
        .context("Failed to connect to database")
}

fn load_rules(path: Option<&str>) -> Result<SanitizerRules> {
    match path {
        Some(path) => SanitizerRules::from_json_file(path),
        None => Ok(SanitizerRules::default()),
    }
}
