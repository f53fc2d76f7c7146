use crate::error::{DupliError, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Pixel bounds of a decoded image, printed as `(0,0)-(w,h)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bounds {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(0,0)-({},{})", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishReason {
    DirNoImages,
    NoDupFound,
    DryRun,
    Complete,
}

impl FinishReason {
    fn as_str(&self) -> &'static str {
        match self {
            FinishReason::DirNoImages => "DIR_NO_IMAGES",
            FinishReason::NoDupFound => "NO_DUP_FOUND",
            FinishReason::DryRun => "DRY_RUN",
            FinishReason::Complete => "COMPLETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Scan {
        root: PathBuf,
    },
    Compare {
        keep: String,
        other: String,
        keep_bounds: Bounds,
        other_bounds: Bounds,
    },
    Match {
        keep: String,
        remove: String,
        keep_bounds: Bounds,
        remove_bounds: Bounds,
    },
    Copy {
        file_name: String,
        quarantine_dir: PathBuf,
    },
    Delete {
        path: PathBuf,
    },
    Finish {
        reason: FinishReason,
    },
}

impl EventKind {
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Scan { .. } => "SCAN",
            EventKind::Compare { .. } => "COMPARE",
            EventKind::Match { .. } => "MATCH",
            EventKind::Copy { .. } => "COPY",
            EventKind::Delete { .. } => "DELETE",
            EventKind::Finish { .. } => "FINISH",
        }
    }

    fn fields(&self) -> Vec<String> {
        match self {
            EventKind::Scan { root } => vec![root.display().to_string()],
            EventKind::Compare {
                keep,
                other,
                keep_bounds,
                other_bounds,
            } => vec![
                keep.clone(),
                other.clone(),
                keep_bounds.to_string(),
                other_bounds.to_string(),
            ],
            EventKind::Match {
                keep,
                remove,
                keep_bounds,
                remove_bounds,
            } => vec![
                keep.clone(),
                remove.clone(),
                keep_bounds.to_string(),
                remove_bounds.to_string(),
            ],
            EventKind::Copy {
                file_name,
                quarantine_dir,
            } => vec![file_name.clone(), quarantine_dir.display().to_string()],
            EventKind::Delete { path } => vec![path.display().to_string()],
            EventKind::Finish { reason } => vec![reason.as_str().to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub timestamp: DateTime<Local>,
    pub kind: EventKind,
}

impl AuditEvent {
    pub fn now(kind: EventKind) -> Self {
        Self {
            timestamp: Local::now(),
            kind,
        }
    }

    /// One comma-separated log line, without the trailing newline.
    pub fn to_line(&self) -> String {
        let mut parts = vec![
            self.kind.label().to_string(),
            self.timestamp.format("%A, %d-%b-%y %H:%M:%S %z").to_string(),
        ];
        parts.extend(self.kind.fields());
        parts.join(", ")
    }
}

/// Append-only event log. A disabled trail does no I/O at all.
#[derive(Debug, Default)]
pub struct AuditTrail {
    path: Option<PathBuf>,
    file: Option<File>,
    written: usize,
}

impl AuditTrail {
    pub fn disabled() -> Self {
        Self::default()
    }

    /// The file is opened lazily on the first event.
    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            file: None,
            written: 0,
        }
    }

    pub fn from_config(path: Option<&Path>) -> Self {
        match path {
            Some(path) => Self::to_file(path),
            None => Self::disabled(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    /// Number of lines successfully appended so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Best-effort append: failures are logged and swallowed.
    pub fn record(&mut self, kind: EventKind) {
        if !self.is_enabled() {
            return;
        }
        if let Err(e) = self.try_record(&AuditEvent::now(kind)) {
            log::warn!("{e}");
        }
    }

    pub fn try_record(&mut self, event: &AuditEvent) -> Result<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let to_log_error = |source| DupliError::LogWrite {
            path: path.to_path_buf(),
            source,
        };

        if self.file.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(to_log_error)?;
            self.file = Some(file);
        }
        if let Some(file) = self.file.as_mut() {
            writeln!(file, "{}", event.to_line()).map_err(to_log_error)?;
            self.written += 1;
        }
        Ok(())
    }
}
