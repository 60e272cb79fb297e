use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::{Result, bail};
use bundle_compiler::{
    asset_db::{AssetDatabase, MemoryDatabase},
    cache::{CacheManager, CacheReport},
    config::Config,
    operator::BundleOperator,
};
use clap::{Parser, Subcommand};
use log::{LevelFilter, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Asset database snapshot (JSON)
    #[arg(short, long)]
    database: PathBuf,

    /// Config file, replacing the project `bundle-compiler.toml` lookup
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Where mutated snapshots are written; defaults to the database path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build every cache from the database and write it
    GenerateCache,
    /// Clear earlier bundling, then compile every root or one level
    Compile {
        /// Sub-level bundle name, or its last path segment
        #[arg(short, long)]
        bundle: Option<String>,
        /// Keep the bundling of earlier compiles
        #[arg(long)]
        no_clear: bool,
    },
    /// Undo every bundle addition
    Clear,
    /// Build unlock identifier tables for one level or all of them
    UnlockTables {
        #[arg(short, long)]
        level: Option<String>,
    },
    /// Give colliding new unlocks fresh identifiers
    UnlockIds,
    /// Print the call-stack forest
    Stacks,
}

impl Command {
    fn mutates(&self) -> bool {
        !matches!(self, Self::GenerateCache | Self::Stacks)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let config = Config::load(cli.config.as_deref())?;
    let mut db = MemoryDatabase::load(&cli.database)?;
    let mut stdout = io::stdout().lock();

    if let Command::GenerateCache = cli.command {
        let mut caches = CacheManager::new(&config);
        let report = caches.generate(&db)?;
        writeln!(
            stdout,
            "Generated {} root call stacks",
            caches.forest().len()
        )?;
        report_caches(&report);
        return Ok(());
    }

    let caches = load_caches(&config, &db)?;
    let mut operator = BundleOperator::new(config, caches, &db);

    match &cli.command {
        Command::GenerateCache => {}
        Command::Compile { bundle, no_clear } => {
            let summaries = match bundle {
                Some(name) => operator.compile_bundle_by_name(&mut db, name)?,
                None => {
                    if !no_clear {
                        operator.clear_all_bundling(&mut db)?;
                    }
                    operator.compile_all(&mut db)?
                }
            };
            let packaged: usize = summaries.iter().map(|s| s.packaged_count()).sum();
            let pruned: usize = summaries.iter().map(|s| s.pruned_references).sum();
            writeln!(
                stdout,
                "Compiled {} call stacks: {packaged} assets packaged, {pruned} registry references pruned",
                summaries.len()
            )?;
        }
        Command::Clear => {
            let cleared = operator.clear_all_bundling(&mut db)?;
            writeln!(stdout, "Cleared bundling of {cleared} assets")?;
        }
        Command::UnlockTables { level } => {
            let added = match level {
                Some(name) => {
                    let Some(root) = operator.find_level(name).cloned() else {
                        bail!("No level call stack named {name}");
                    };
                    operator.build_unlock_id_table(&mut db, &root)?
                }
                None => operator.compile_id_tables(&mut db)?,
            };
            writeln!(stdout, "Added {added} unlock identifiers")?;
        }
        Command::UnlockIds => {
            let renumbered = operator.generate_unlock_ids(&mut db)?;
            writeln!(stdout, "Re-identified {renumbered} unlocks")?;
        }
        Command::Stacks => {
            for root in operator.caches().forest().roots() {
                write!(stdout, "{}", root.render())?;
            }
        }
    }

    if cli.command.mutates() {
        let output = cli.output.as_deref().unwrap_or(&cli.database);
        save(&db, output)?;
    }
    Ok(())
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp(None)
        .init();
}

/// Loads the persisted caches, rebuilding them in memory when any is missing or stale
fn load_caches(config: &Config, db: &dyn AssetDatabase) -> Result<CacheManager> {
    let mut caches = CacheManager::new(config);
    let report = caches.load(db);
    if report.all_loaded() {
        return Ok(caches);
    }
    report_caches(&report);
    warn!("Caches are incomplete, building them in memory; run generate-cache to persist them");
    Ok(CacheManager::in_memory(config, db))
}

fn report_caches(report: &CacheReport) {
    info!(
        "Cache status: call stacks {:?}, bundles {:?}, references {:?}, unlock ids {:?}, levels {:?}",
        report.call_stacks, report.bundles, report.references, report.unlock_ids, report.level_types
    );
}

fn save(db: &MemoryDatabase, path: &Path) -> Result<()> {
    db.save(path)?;
    info!("Wrote {}", path.display());
    Ok(())
}
