use crate::error::{DupliError, Result};
use std::path::PathBuf;

pub const DEFAULT_THRESHOLD: f64 = 0.1;
pub const QUARANTINE_DIR_NAME: &str = "duplicates";
pub const DEFAULT_LOG_FILE: &str = "dupli.log";

/// Everything a single run needs, passed explicitly to each stage.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub root: PathBuf,
    pub quarantine_dir: PathBuf,
    pub threshold: f64,
    /// `None` disables the audit trail entirely.
    pub audit_log: Option<PathBuf>,
    pub dry_run: bool,
}

impl PipelineConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let quarantine_dir = root.join(QUARANTINE_DIR_NAME);
        Self {
            root,
            quarantine_dir,
            threshold: DEFAULT_THRESHOLD,
            audit_log: None,
            dry_run: false,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Result<Self> {
        self.threshold = validate_threshold(threshold)?;
        Ok(self)
    }

    pub fn with_quarantine_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.quarantine_dir = dir.into();
        self
    }

    pub fn with_audit_log(mut self, path: Option<PathBuf>) -> Self {
        self.audit_log = path;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

pub fn validate_threshold(threshold: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(DupliError::InvalidThreshold(threshold))
    }
}
