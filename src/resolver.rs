//! Moves duplicates into quarantine in two strictly ordered phases.
//!
//! Phase 1 copies every duplicate into the quarantine directory. Phase 2 runs
//! only once all copies exist and deletes the originals. A failure in phase 1
//! therefore never deletes anything, and an interruption between phases
//! leaves at worst an original that still has a quarantine copy.

use crate::audit::{AuditTrail, EventKind};
use crate::error::{DupliError, Result};
use crate::scanner::{DuplicatePair, base_name};
use serde::Serialize;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedMove {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// An identical file already sits at `destination`; no copy needed.
    pub already_quarantined: bool,
}

/// Two duplicates wanted the same quarantine name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameCollision {
    pub source: PathBuf,
    pub wanted: PathBuf,
    pub assigned: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionPlan {
    pub quarantine_dir: PathBuf,
    pub moves: Vec<PlannedMove>,
    pub collisions: Vec<NameCollision>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionReport {
    pub quarantine_dir: PathBuf,
    pub copied: Vec<PlannedMove>,
    pub deleted: Vec<PathBuf>,
    pub collisions: Vec<NameCollision>,
}

/// Work out where each duplicate goes without touching the file system
/// beyond reading existing quarantine files.
///
/// A file that is the `remove` side of several pairs is moved once. Files
/// already inside the quarantine directory are never moved.
pub fn plan(pairs: &[DuplicatePair], quarantine_dir: &Path) -> Result<ResolutionPlan> {
    let mut plan = ResolutionPlan {
        quarantine_dir: quarantine_dir.to_path_buf(),
        ..ResolutionPlan::default()
    };
    let quarantine_real = fs::canonicalize(quarantine_dir).ok();
    let mut seen_sources = HashSet::new();
    let mut claimed = HashSet::new();

    for pair in pairs {
        let source = &pair.remove.path;
        if !seen_sources.insert(source.clone()) {
            continue;
        }
        if let Some(dir) = &quarantine_real {
            if fs::canonicalize(source).is_ok_and(|real| real.starts_with(dir)) {
                log::warn!(
                    "{} is already in quarantine; leaving it alone",
                    source.display()
                );
                continue;
            }
        }

        let wanted = quarantine_dir.join(source.file_name().unwrap_or(source.as_os_str()));
        let mut destination = wanted.clone();
        let mut already_quarantined = false;
        let mut attempt = 0;
        loop {
            if !claimed.contains(&destination) {
                if !destination.exists() {
                    break;
                }
                if same_content(source, &destination)? {
                    already_quarantined = true;
                    break;
                }
            }
            attempt += 1;
            destination = quarantine_dir.join(suffixed_name(source, attempt));
        }

        if destination != wanted {
            log::warn!(
                "Quarantine name {} is taken; storing {} as {}",
                wanted.display(),
                source.display(),
                destination.display()
            );
            plan.collisions.push(NameCollision {
                source: source.clone(),
                wanted,
                assigned: destination.clone(),
            });
        }

        claimed.insert(destination.clone());
        plan.moves.push(PlannedMove {
            source: source.clone(),
            destination,
            already_quarantined,
        });
    }

    Ok(plan)
}

/// Copy every planned duplicate, then delete the originals.
pub fn execute(plan: ResolutionPlan, audit: &mut AuditTrail) -> Result<ResolutionReport> {
    let ResolutionPlan {
        quarantine_dir,
        moves,
        collisions,
    } = plan;

    fs::create_dir_all(&quarantine_dir).map_err(|source| DupliError::CreateQuarantine {
        path: quarantine_dir.clone(),
        source,
    })?;

    for planned in &moves {
        if !planned.already_quarantined {
            fs::copy(&planned.source, &planned.destination).map_err(|source| {
                DupliError::Copy {
                    from: planned.source.clone(),
                    to: planned.destination.clone(),
                    source,
                }
            })?;
        }
        log::debug!(
            "Copied {} → {}",
            planned.source.display(),
            planned.destination.display()
        );
        audit.record(EventKind::Copy {
            file_name: base_name(&planned.destination),
            quarantine_dir: quarantine_dir.clone(),
        });
    }

    let mut deleted = Vec::with_capacity(moves.len());
    for planned in &moves {
        if !planned.destination.is_file() || same_file(&planned.source, &planned.destination) {
            return Err(DupliError::QuarantineMissing {
                original: planned.source.clone(),
                copy: planned.destination.clone(),
            });
        }
        fs::remove_file(&planned.source).map_err(|source| DupliError::Delete {
            path: planned.source.clone(),
            source,
        })?;
        audit.record(EventKind::Delete {
            path: planned.source.clone(),
        });
        deleted.push(planned.source.clone());
    }

    Ok(ResolutionReport {
        quarantine_dir,
        copied: moves,
        deleted,
        collisions,
    })
}

/// Plan and execute in one go.
pub fn resolve(
    pairs: &[DuplicatePair],
    quarantine_dir: &Path,
    audit: &mut AuditTrail,
) -> Result<ResolutionReport> {
    let plan = plan(pairs, quarantine_dir)?;
    execute(plan, audit)
}

fn suffixed_name(source: &Path, attempt: usize) -> OsString {
    let mut name = source.file_stem().unwrap_or_default().to_os_string();
    name.push(format!("-{attempt}"));
    if let Some(ext) = source.extension() {
        name.push(".");
        name.push(ext);
    }
    name
}

/// Both paths name the same file on disk.
fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn same_content(a: &Path, b: &Path) -> Result<bool> {
    let hash = |path: &Path| -> io::Result<blake3::Hash> {
        let mut hasher = blake3::Hasher::new();
        io::copy(&mut File::open(path)?, &mut hasher)?;
        Ok(hasher.finalize())
    };
    let to_copy_error = |source| DupliError::Copy {
        from: a.to_path_buf(),
        to: b.to_path_buf(),
        source,
    };
    Ok(hash(a).map_err(to_copy_error)? == hash(b).map_err(to_copy_error)?)
}
