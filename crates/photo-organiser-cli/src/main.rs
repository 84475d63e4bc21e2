use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use log::{info, warn, LevelFilter};
use photo_organiser_core::{
    logging, CancellationToken, Config, LogLevel, PhotoOrganiser, RunOutcome,
};
use std::path::{Path, PathBuf};

mod progress;

use progress::ProgressTracker;

#[derive(Parser)]
#[command(name = "photo-organiser")]
#[command(about = "Copy a photo collection into a deduplicated, dated library")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Organise a photo collection into a new library
    Organise {
        /// Folder to read photos from (never modified)
        source: PathBuf,

        /// Folder to build the library in
        destination: PathBuf,

        /// Maximum fingerprint distance (0-64) for two photos to count as duplicates
        #[arg(long)]
        threshold: Option<u32>,

        /// Worker threads (0 = one per CPU)
        #[arg(long)]
        threads: Option<usize>,

        /// Do not write XMP sidecars next to copies
        #[arg(long)]
        no_sidecars: bool,

        /// Do not merge labels into the EXIF block of JPEG copies
        #[arg(long)]
        no_embed: bool,

        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write a rotating log file into this folder instead of logging to stderr
        #[arg(long)]
        log_dir: Option<PathBuf>,

        /// Verbosity level
        #[arg(short, long, action = clap::ArgAction::Count)]
        verbose: u8,
    },

    /// Show what would be inferred for individual files
    Inspect {
        /// Files to inspect
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Collection root used for event labels (defaults to the current folder)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Generate default configuration file
    GenerateConfig {
        /// Path to save configuration file
        #[arg(default_value = "photo-organiser.json")]
        path: PathBuf,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(Config::default()),
    }
}

fn verbosity_level(verbose: u8, configured: LogLevel) -> LevelFilter {
    match verbose {
        0 => configured.to_level_filter(),
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// File logging when a log folder is given, stderr otherwise
fn init_logging(log_dir: Option<&Path>, level: LevelFilter) -> anyhow::Result<()> {
    match log_dir {
        Some(dir) => logging::init_logger(dir, level)
            .map_err(|e| anyhow!("failed to initialise file logging: {}", e)),
        None => {
            env_logger::Builder::new()
                .filter_level(level)
                .parse_default_env()
                .init();
            Ok(())
        }
    }
}

fn organise(
    source: &Path,
    destination: &Path,
    config: Config,
    log_dir: Option<&Path>,
    verbose: u8,
) -> anyhow::Result<()> {
    init_logging(log_dir, verbosity_level(verbose, config.log_level))?;

    // Validate configuration
    config.validate()?;

    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        warn!("Interrupt received, finishing files in flight");
        handler_token.cancel();
    })
    .context("installing the Ctrl-C handler")?;

    let tracker = ProgressTracker::new();
    let organiser = PhotoOrganiser::new(config)?
        .with_progress(tracker.callback())
        .with_cancellation(token);

    info!("Starting photo organisation...");
    let report = organiser.run(source, destination);
    let summary = &report.summary;

    println!();
    println!("Scanned:            {}", summary.scanned);
    println!("Copied:             {}", summary.copied);
    println!("Duplicates skipped: {}", summary.duplicates_skipped);
    println!("Errors:             {}", summary.errors);
    if summary.metadata_errors > 0 {
        println!("Label write errors: {}", summary.metadata_errors);
    }
    match &report.report_path {
        Some(path) => println!("Report:             {}", path.display()),
        None => println!("Report:             not written"),
    }

    match summary.outcome {
        RunOutcome::Done => {
            info!("Organisation complete");
            Ok(())
        }
        RunOutcome::Cancelled => {
            println!("Run cancelled; files already copied were kept.");
            Ok(())
        }
        RunOutcome::Failed => bail!(
            "run failed: {}",
            summary.failure.as_deref().unwrap_or("unknown error")
        ),
    }
}

fn inspect(files: &[PathBuf], root: Option<&Path>, config: Config) -> anyhow::Result<()> {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Warn)
        .parse_default_env()
        .init();

    let root = match root {
        Some(root) => root.to_path_buf(),
        None => std::env::current_dir().context("reading the current folder")?,
    };
    let root = root
        .canonicalize()
        .with_context(|| format!("resolving {}", root.display()))?;

    let organiser = PhotoOrganiser::new(config)?;
    for file in files {
        let path = file
            .canonicalize()
            .with_context(|| format!("resolving {}", file.display()))?;
        let record = organiser.inspect(&path, &root);

        println!("{}", path.display());
        println!("  date:        {} ({})", record.date, record.confidence);
        println!("  event:       {}", record.event_label.as_deref().unwrap_or("-"));
        println!("  location:    {}", record.location_token.as_deref().unwrap_or("-"));
        match record.fingerprint {
            Some(fingerprint) => println!("  fingerprint: {}", fingerprint),
            None => println!("  fingerprint: -"),
        }
        if let Some(error) = &record.error {
            println!("  error:       {}", error);
        }
    }
    Ok(())
}

fn main() -> Result<(), anyhow::Error> {
    // Parse command line arguments
    let cli = Cli::parse();

    match cli.command {
        Commands::Organise {
            source,
            destination,
            threshold,
            threads,
            no_sidecars,
            no_embed,
            config,
            log_dir,
            verbose,
        } => {
            // Set up configuration
            let mut config = load_config(config.as_deref())?;

            // Override config with command line arguments
            if let Some(threshold) = threshold {
                config.similarity_threshold = threshold;
            }
            if let Some(threads) = threads {
                config.threads = threads;
            }
            if no_sidecars {
                config.write_sidecars = false;
            }
            if no_embed {
                config.embed_labels = false;
            }

            organise(&source, &destination, config, log_dir.as_deref(), verbose)
        }

        Commands::Inspect {
            files,
            root,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            inspect(&files, root.as_deref(), config)
        }

        Commands::GenerateConfig { path } => {
            let config = Config::default();
            config.save_to_file(&path)?;
            println!("Configuration file generated at: {}", path.display());
            Ok(())
        }
    }
}
