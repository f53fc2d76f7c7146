use crate::audit::{AuditTrail, EventKind, FinishReason};
use crate::catalog;
use crate::compare::{Comparator, DiffOptions};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::resolver::{self, ResolutionPlan, ResolutionReport};
use crate::scanner::{DuplicatePair, ScanStats, Scanner};
use indicatif::ProgressBar;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    NoImages,
    NoDuplicates {
        stats: ScanStats,
    },
    DryRun {
        stats: ScanStats,
        pairs: Vec<DuplicatePair>,
        plan: ResolutionPlan,
    },
    Resolved {
        stats: ScanStats,
        pairs: Vec<DuplicatePair>,
        report: ResolutionReport,
    },
}

impl Outcome {
    pub fn finish_reason(&self) -> FinishReason {
        match self {
            Outcome::NoImages => FinishReason::DirNoImages,
            Outcome::NoDuplicates { .. } => FinishReason::NoDupFound,
            Outcome::DryRun { .. } => FinishReason::DryRun,
            Outcome::Resolved { .. } => FinishReason::Complete,
        }
    }
}

/// Hooks for console feedback; the library itself prints nothing.
#[derive(Clone)]
pub struct Progress {
    pub discovery: ProgressBar,
    pub comparison: ProgressBar,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            discovery: ProgressBar::hidden(),
            comparison: ProgressBar::hidden(),
        }
    }
}

/// Catalog, scan and resolve one directory tree.
pub fn run<C: Comparator>(config: &PipelineConfig, comparator: &C) -> Result<Outcome> {
    run_with_progress(config, comparator, Progress::default())
}

pub fn run_with_progress<C: Comparator>(
    config: &PipelineConfig,
    comparator: &C,
    progress: Progress,
) -> Result<Outcome> {
    let mut audit = AuditTrail::from_config(config.audit_log.as_deref());
    audit.record(EventKind::Scan {
        root: config.root.clone(),
    });

    let outcome = scan_and_resolve(config, comparator, progress, &mut audit)?;

    audit.record(EventKind::Finish {
        reason: outcome.finish_reason(),
    });
    Ok(outcome)
}

fn scan_and_resolve<C: Comparator>(
    config: &PipelineConfig,
    comparator: &C,
    progress: Progress,
    audit: &mut AuditTrail,
) -> Result<Outcome> {
    let mut entries = catalog::build_excluding(&config.root, Some(&config.quarantine_dir))?;
    progress.discovery.finish_and_clear();
    if entries.is_empty() {
        log::info!("No images under {}", config.root.display());
        return Ok(Outcome::NoImages);
    }

    let scanner = Scanner::new(comparator, DiffOptions::new(config.threshold))
        .with_progress(progress.comparison);
    let scan = scanner.scan(&mut entries, audit)?;
    drop(entries);

    if scan.pairs.is_empty() {
        return Ok(Outcome::NoDuplicates { stats: scan.stats });
    }

    let plan = resolver::plan(&scan.pairs, &config.quarantine_dir)?;
    if config.dry_run {
        return Ok(Outcome::DryRun {
            stats: scan.stats,
            pairs: scan.pairs,
            plan,
        });
    }

    let report = resolver::execute(plan, audit)?;
    Ok(Outcome::Resolved {
        stats: scan.stats,
        pairs: scan.pairs,
        report,
    })
}
