//! migrt: mapping sheets to Oracle migration scripts
//!
//! # Usage
//!
//! ```bash
//! # Generate scripts for a mapping sheet
//! migrt generate uploads/sample_mapping.csv
//!
//! # Preview without writing anything
//! migrt generate mapping.json --dry-run
//!
//! # Check how a clause is understood
//! migrt explain --transform "STATUS->CODE (MAP: 'A'->1,'I'->0)"
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use migrt::config::Config;
use migrt::intake;
use migrt::parser::{parse_directive, try_parse_transformations};
use migrt::prelude::*;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "migrt")]
#[command(version)]
#[command(about = "Compile table-mapping sheets into Oracle PL/SQL migration scripts", long_about = None)]
#[command(after_help = "EXAMPLES:
    migrt sample
    migrt generate uploads/sample_mapping.csv
    migrt explain --transform \"STATUS->CODE (MAP: 'A'->1)\" --directive \"KEY:lookup(ID):NAME\"")]
struct Cli {
    /// Config file (defaults to ./migrt.toml, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output directory for scripts and the catalog
    #[arg(long, global = true, env = "MIGRT_OUTPUT_DIR")]
    out_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate scripts from a CSV or JSON mapping file
    Generate {
        /// Mapping file
        file: PathBuf,

        /// Don't write anything, just print the generated scripts
        #[arg(short, long)]
        dry_run: bool,

        /// Batch timestamp (YYYYmmdd_HHMMSS), defaults to now
        #[arg(long)]
        timestamp: Option<String>,
    },
    /// List generated scripts, newest first
    List,
    /// Print a stored script
    Show {
        /// Script filename
        filename: String,
    },
    /// Print the generation catalog
    Catalog {
        /// Raw JSON output
        #[arg(long)]
        json: bool,
    },
    /// Explain how transform clauses and directives are parsed
    Explain {
        /// Transformations field
        #[arg(long)]
        transform: Option<String>,

        /// Related inserts field
        #[arg(long)]
        directive: Option<String>,
    },
    /// Write the sample mapping file
    Sample {
        /// Target directory (defaults to the configured upload dir)
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show configuration and store status
    Status,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(&cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "migrt=debug" } else { "migrt=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref()).context("loading config")?;
    if let Some(dir) = &cli.out_dir {
        config.output_dir = dir.clone();
    }

    match &cli.command {
        Commands::Generate {
            file,
            dry_run,
            timestamp,
        } => generate(&config, file, *dry_run, timestamp.as_deref()),
        Commands::List => list(&config),
        Commands::Show { filename } => {
            let code = open_store(&config)?.read_unit(filename)?;
            println!("{}", code);
            Ok(())
        }
        Commands::Catalog { json } => catalog(&config, *json),
        Commands::Explain {
            transform,
            directive,
        } => explain(transform.as_deref(), directive.as_deref()),
        Commands::Sample { path } => {
            let dir = path.clone().unwrap_or_else(|| config.upload_dir.clone());
            let sample = intake::ensure_sample(&dir)?;
            println!("{} {}", "✓".green(), sample.display().to_string().cyan());
            Ok(())
        }
        Commands::Status => status(&config),
    }
}

fn open_store(config: &Config) -> Result<ArtifactStore> {
    ArtifactStore::open(&config.output_dir, &config.catalog_file, &config.extension)
        .with_context(|| format!("opening store at {}", config.output_dir.display()))
}

fn generate(config: &Config, file: &Path, dry_run: bool, timestamp: Option<&str>) -> Result<()> {
    let rows = intake::read_mapping_file(file)
        .with_context(|| format!("reading {}", file.display()))?;
    if rows.is_empty() {
        bail!("{} contains no mappings", file.display());
    }

    let generator = Generator::from_config(config);

    if dry_run {
        let ts = timestamp.map(str::to_string).unwrap_or_else(migrt::store::batch_timestamp);
        let batch = generator.generate(&rows, &ts);
        for unit in &batch.units {
            println!("{} {}", "--".dimmed(), unit.filename.cyan().bold());
            println!("{}", unit.code);
        }
        if let Some(text) = &batch.assist_output {
            println!("{}", "-- assist suggestion".dimmed());
            println!("{}", text);
        }
        return Ok(());
    }

    let store = open_store(config)?;
    let report = match timestamp {
        Some(ts) => generator.run_at(&rows, &store, ts)?,
        None => generator.run(&rows, &store)?,
    };

    println!(
        "{} Generated {} script(s) in {}",
        "✓".green(),
        report.entries.len().to_string().cyan(),
        store.root().display()
    );
    for entry in &report.entries {
        println!(
            "  {} {} {}",
            entry.filename.white(),
            "←".dimmed(),
            format!("{} → {}", entry.source_table, entry.target_table).yellow()
        );
    }
    if let Some(name) = &report.assist_artifact {
        println!("  {} {}", name.white(), "(assist suggestion)".dimmed());
    }
    Ok(())
}

fn list(config: &Config) -> Result<()> {
    let files = open_store(config)?.list()?;
    if files.is_empty() {
        println!("{}", "(no generated scripts)".dimmed());
        return Ok(());
    }

    let width = files.iter().map(|f| f.filename.len()).max().unwrap_or(8).max(8);
    println!(
        "{:width$}  {:19}  {}",
        "Filename".white().bold(),
        "Modified".white().bold(),
        "Tables".white().bold(),
        width = width
    );
    println!("{}", "─".repeat(width + 40).dimmed());
    for f in &files {
        println!(
            "{:width$}  {:19}  {} → {}",
            f.filename.cyan(),
            f.modified.dimmed(),
            f.source_table,
            f.target_table,
            width = width
        );
    }
    Ok(())
}

fn catalog(config: &Config, json: bool) -> Result<()> {
    let entries = open_store(config)?.catalog()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("{}", "(catalog is empty)".dimmed());
        return Ok(());
    }
    for e in &entries {
        println!(
            "{}  {}  {} → {}",
            e.timestamp.dimmed(),
            e.filename.cyan(),
            e.source_table,
            e.target_table
        );
    }
    println!();
    println!("{} entries", entries.len().to_string().cyan());
    Ok(())
}

fn explain(transform: Option<&str>, directive: Option<&str>) -> Result<()> {
    if transform.is_none() && directive.is_none() {
        bail!("nothing to explain, pass --transform and/or --directive");
    }

    if let Some(input) = transform {
        println!("{} {}", "Transformations:".dimmed(), input.yellow());
        match try_parse_transformations(input) {
            Ok(set) => {
                for (source, t) in &set {
                    println!("  {} → {}", source.white(), t.dest_field.cyan());
                    for (from, to) in &t.value_map {
                        println!("    {} ⇒ {}", from.yellow(), to.yellow());
                    }
                }
                if set.is_empty() {
                    println!("  {}", "(no clauses)".dimmed());
                }
            }
            Err(e) => eprintln!("  {} {}", "Parse Error:".red().bold(), e),
        }
    }

    if let Some(input) = directive {
        println!("{} {}", "Related inserts:".dimmed(), input.yellow());
        for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match parse_directive(part) {
                Ok(Some(insert)) => println!("  {} {}", "✓".green(), insert.to_string().cyan()),
                Ok(None) => println!("  {} {} {}", "-".dimmed(), part, "(ignored)".dimmed()),
                Err(e) => eprintln!("  {} {}", "✗".red(), e),
            }
        }
    }
    Ok(())
}

fn status(config: &Config) -> Result<()> {
    println!("{}", "migrt status".cyan().bold());
    println!("  {} {}", "Output dir:".dimmed(), config.output_dir.display());
    println!("  {} {}", "Catalog:".dimmed(), config.catalog_file);
    println!("  {} .{}", "Extension:".dimmed(), config.extension);
    println!("  {} {}", "Upload dir:".dimmed(), config.upload_dir.display());
    match &config.assist {
        Some(a) => println!("  {} {} {}", "Assist:".dimmed(), a.command.green(), a.args.join(" ")),
        None => println!("  {} {}", "Assist:".dimmed(), "not configured".yellow()),
    }

    if config.output_dir.exists() {
        let store = open_store(config)?;
        let entries = store.catalog()?;
        println!("  {} {}", "Catalog entries:".dimmed(), entries.len().to_string().cyan());
    }
    Ok(())
}
