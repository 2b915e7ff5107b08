//! rompatch - ROM hack patch manager
//!
//! Finds ROMs whose content matches a known hack or translation, then
//! applies the hack's patch chain with an external patcher.

use anyhow::Result;
use clap::{Parser, Subcommand};
use rompatch::cancel::Cancellation;
use rompatch::catalog::{self, Catalog};
use rompatch::paths;
use rompatch::pipeline::{self, PatchError, PipelineConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rompatch")]
#[command(version)]
#[command(about = "Match ROMs to known hacks by hash and apply their patches")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (use RUST_LOG=debug for more detail)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Patch every ROM that matches a catalog entry
    Apply {
        /// Path to the catalog JSON
        #[arg(short, long)]
        config: PathBuf,

        /// Directory scanned for source ROMs
        #[arg(short, long)]
        roms: PathBuf,

        /// Directory holding the patch files
        #[arg(short, long)]
        patches: PathBuf,

        /// Root directory for patched ROMs
        #[arg(short, long)]
        output: PathBuf,

        /// Patcher binary, called as `<patcher> --apply <patch> <in> <out>`
        #[arg(long, env = "ROMPATCH_PATCHER", default_value = pipeline::patcher::DEFAULT_PATCHER)]
        patcher: PathBuf,

        /// Kill the patcher if a single step takes longer than this
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Comma-separated ROM extensions to scan
        #[arg(long, default_value = "gb,gbc,gba,nes,sfc,smc")]
        extensions: String,
    },

    /// Hash ROMs and show which catalog entries they match, without patching
    Scan {
        /// Path to the catalog JSON
        #[arg(short, long)]
        config: PathBuf,

        /// Directory scanned for source ROMs
        #[arg(short, long)]
        roms: PathBuf,

        /// Comma-separated ROM extensions to scan
        #[arg(long, default_value = "gb,gbc,gba,nes,sfc,smc")]
        extensions: String,
    },

    /// Check the catalog for missing hashes and patch files
    Check {
        /// Path to the catalog JSON
        #[arg(short, long)]
        config: PathBuf,

        /// Directory holding the patch files
        #[arg(short, long, default_value = "patches")]
        patches: PathBuf,
    },

    /// Show the catalog contents
    List {
        /// Path to the catalog JSON
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Rewrite the catalog with sorted keys and uppercase hashes
    Fmt {
        /// Path to the catalog JSON
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Load the catalog or exit with status 1; nothing else can run without it.
fn load_catalog_or_exit(path: &std::path::Path) -> Catalog {
    match Catalog::load(path) {
        Ok(catalog) => catalog,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Exit with status 130 if the run was interrupted with Ctrl-C.
fn exit_if_cancelled(e: &anyhow::Error) {
    if matches!(e.downcast_ref::<PatchError>(), Some(PatchError::Cancelled)) {
        eprintln!("Interrupted");
        std::process::exit(130);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Only initialize logging if verbose or RUST_LOG is set
    if cli.verbose || std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env()
                    .add_directive(if cli.verbose { "rompatch=debug".parse()? } else { "rompatch=warn".parse()? }),
            )
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Apply {
            config,
            roms,
            patches,
            output,
            patcher,
            timeout_secs,
            extensions,
        } => {
            let catalog = load_catalog_or_exit(&config);

            let mut pipeline_config = PipelineConfig::new(config, roms, patches, output);
            pipeline_config.patcher = patcher;
            pipeline_config.patcher_timeout = timeout_secs.map(Duration::from_secs);
            pipeline_config.rom_extensions = paths::parse_extension_list(&extensions);

            let cancel = Cancellation::new();
            cancel.cancel_on_ctrl_c();

            let pb = if cli.verbose {
                indicatif::ProgressBar::hidden()
            } else {
                pipeline::hashing_progress_bar()
            };

            match pipeline::run(&pipeline_config, &catalog, &cancel, &pb).await {
                Ok(report) => {
                    println!(
                        "\nScanned {} ROMs, {} matched: {} patched, {} skipped",
                        report.roms_scanned,
                        report.matched,
                        report.completed.len(),
                        report.skipped.len()
                    );
                }
                Err(e) => match e.downcast_ref::<PatchError>() {
                    Some(PatchError::Execution { command, output, status }) => {
                        eprintln!("{}", command);
                        eprintln!("{}", output.trim_end());
                        eprintln!("Patcher exited with {}", status);
                        std::process::exit(1);
                    }
                    _ => {
                        exit_if_cancelled(&e);
                        return Err(e);
                    }
                },
            }
        }

        Commands::Scan {
            config,
            roms,
            extensions,
        } => {
            let catalog = load_catalog_or_exit(&config);

            let mut scan_config = PipelineConfig::new(&config, roms, PathBuf::new(), PathBuf::new());
            scan_config.rom_extensions = paths::parse_extension_list(&extensions);

            let cancel = Cancellation::new();
            cancel.cancel_on_ctrl_c();

            let pb = pipeline::hashing_progress_bar();
            let (scanned, matches) = match pipeline::scan(&catalog, &scan_config, &cancel, &pb) {
                Ok(result) => result,
                Err(e) => {
                    exit_if_cancelled(&e);
                    return Err(e);
                }
            };

            for m in &matches {
                let entry = m.entry.entry;
                println!(
                    "[{}] {}: {} {} <- {}",
                    m.entry.key(),
                    entry.game,
                    entry.name,
                    entry.version,
                    m.rom.path.display()
                );
            }
            eprintln!("\nScanned {} ROMs, {} matched", scanned, matches.len());
        }

        Commands::Check { config, patches } => {
            let catalog = match Catalog::load(&config) {
                Ok(catalog) => catalog,
                Err(catalog::CatalogError::Empty(_)) => Catalog::default(),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            };

            let findings = catalog::check_catalog(&catalog, &patches)?;
            if findings.is_empty() {
                println!("Catalog OK: {} entries", catalog.len());
            } else {
                for finding in &findings {
                    println!("Error: {}", finding);
                }
                std::process::exit(1);
            }
        }

        Commands::List { config } => {
            let catalog = load_catalog_or_exit(&config);

            for category in catalog.categories() {
                let Some(entries) = catalog.category(category) else {
                    continue;
                };
                println!("=== {} ({}) ===", category, entries.len());
                for (id, entry) in entries {
                    println!(
                        "{:>8}  [{}] {}: {} {} ({} patch{})",
                        id,
                        entry.platform,
                        entry.game,
                        entry.name,
                        entry.version,
                        entry.chain_len(),
                        if entry.chain_len() == 1 { "" } else { "es" }
                    );
                }
                println!();
            }
            println!("Total: {} entries", catalog.len());
        }

        Commands::Fmt { config } => {
            let catalog = load_catalog_or_exit(&config);
            catalog.save(&config)?;
            println!("Wrote {}", config.display());
        }
    }

    Ok(())
}
