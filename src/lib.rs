//! Near-duplicate image detection with a copy-then-delete quarantine.

pub mod audit;
pub mod catalog;
pub mod compare;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod resolver;
pub mod scanner;

pub use compare::{Comparator, ComparisonOutcome, DiffOptions, PixelDiff};
pub use config::PipelineConfig;
pub use error::{DupliError, Result};
pub use pipeline::{Outcome, Progress, run, run_with_progress};
pub use scanner::{DuplicatePair, ScanStats};
