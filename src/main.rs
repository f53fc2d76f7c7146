use anyhow::{Context, Result};
use clap::Parser;
use dupli::config::{DEFAULT_LOG_FILE, DEFAULT_THRESHOLD, validate_threshold};
use dupli::{Outcome, PipelineConfig, PixelDiff, Progress};
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(
    name = "dupli",
    version,
    about = "Find near-duplicate images and move them into a quarantine folder"
)]
struct Cli {
    /// Start the scan; without this flag nothing happens
    #[arg(long)]
    scan: bool,

    /// Folder to scan (default: current directory)
    #[arg(long, value_name = "DIR")]
    loc: Option<PathBuf>,

    /// Record scan, compare, match, copy and delete events to a log file
    #[arg(long)]
    log: bool,

    /// Where `--log` writes its events
    #[arg(long, value_name = "FILE", default_value = DEFAULT_LOG_FILE)]
    log_file: PathBuf,

    /// Per-pixel colour tolerance between 0 and 1
    #[arg(long, default_value_t = DEFAULT_THRESHOLD, value_parser = parse_threshold)]
    threshold: f64,

    /// Directory to copy duplicates into (default: `<loc>/duplicates`)
    #[arg(long, value_name = "DIR")]
    target_dir: Option<PathBuf>,

    /// Only show what would be moved
    #[arg(long)]
    dry_run: bool,

    /// Print the outcome as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn config(&self) -> Result<PipelineConfig> {
        let root = self.loc.clone().unwrap_or_else(|| PathBuf::from("."));
        let mut config = PipelineConfig::new(root)
            .with_threshold(self.threshold)?
            .with_audit_log(self.log.then(|| self.log_file.clone()))
            .with_dry_run(self.dry_run);
        if let Some(dir) = &self.target_dir {
            config = config.with_quarantine_dir(dir);
        }
        Ok(config)
    }

    fn directory_label(&self) -> String {
        match &self.loc {
            Some(loc) => loc.display().to_string(),
            None => "the current directory".to_string(),
        }
    }
}

fn parse_threshold(value: &str) -> Result<f64, String> {
    let threshold: f64 = value.parse().map_err(|e| format!("{e}"))?;
    validate_threshold(threshold).map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    if !cli.scan {
        return Ok(());
    }

    let config = cli.config()?;
    if !cli.json {
        println!("▶ Scanning {} …", cli.directory_label());
    }

    let progress = Progress {
        discovery: discovery_spinner()?,
        comparison: comparison_bar()?,
    };
    let outcome = benchmark("scan", || {
        dupli::run_with_progress(&config, &PixelDiff, progress)
    })
    .with_context(|| format!("Duplicate scan of {} aborted", config.root.display()))?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match outcome {
        Outcome::NoImages => {
            println!("No images in {}.", cli.directory_label());
        }
        Outcome::NoDuplicates { stats } => {
            println!(
                "No duplicates found! ({} image(s), {} comparison(s))",
                stats.images, stats.comparisons
            );
        }
        Outcome::DryRun { pairs, plan, .. } => {
            println!("Found {} duplicate(s)", pairs.len());
            for planned in &plan.moves {
                println!(
                    "   📦 [dry-run] MOVE {} → {}",
                    planned.source.display(),
                    planned.destination.display()
                );
            }
            for collision in &plan.collisions {
                println!(
                    "   ⚠️  {} would be stored as {}",
                    collision.wanted.display(),
                    collision.assigned.display()
                );
            }
            println!("\n⚠️  Dry-run only; no files were changed.");
        }
        Outcome::Resolved { pairs, report, .. } => {
            println!("Found {} duplicate(s)", pairs.len());
            for pair in &pairs {
                println!(
                    "   🏆 Keeping {} ← duplicate {}",
                    pair.keep.path.display(),
                    pair.remove.path.display()
                );
            }
            for copied in &report.copied {
                println!(
                    "   📦 Moved {} → {}",
                    copied.source.display(),
                    copied.destination.display()
                );
            }
            for collision in &report.collisions {
                println!(
                    "   ⚠️  {} was taken; stored as {}",
                    collision.wanted.display(),
                    collision.assigned.display()
                );
            }
            println!(
                "\n✅ Finished! {} file(s) quarantined in {}",
                report.deleted.len(),
                report.quarantine_dir.display()
            );
        }
    }

    Ok(())
}

fn discovery_spinner() -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    spinner.set_message("Scanning for images…");
    spinner.enable_steady_tick(Duration::from_millis(100));
    Ok(spinner)
}

fn comparison_bar() -> Result<ProgressBar> {
    let bar = ProgressBar::new(0);
    bar.set_style(ProgressStyle::with_template(
        "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} pairs ({eta})",
    )?);
    Ok(bar)
}

/// Run `f()`, log how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    log::info!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}
