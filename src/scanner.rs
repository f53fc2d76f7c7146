use crate::audit::{AuditTrail, Bounds, EventKind};
use crate::catalog::CatalogEntry;
use crate::compare::{Comparator, DiffOptions};
use crate::error::Result;
use indicatif::ProgressBar;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// One member of a duplicate pair: its position in scan order and its path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairMember {
    pub index: usize,
    pub path: PathBuf,
}

/// `keep` always precedes `remove` in scan order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicatePair {
    pub keep: PairMember,
    pub remove: PairMember,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub images: usize,
    /// Dimension checks, one per candidate pair.
    pub prefilter_checks: u64,
    /// Comparator invocations, only for pairs with equal bounds.
    pub comparisons: u64,
    pub matches: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub pairs: Vec<DuplicatePair>,
    pub stats: ScanStats,
}

/// Number of unordered pairs among `n` images.
pub fn candidate_pairs(n: usize) -> u64 {
    let n = n as u64;
    n * n.saturating_sub(1) / 2
}

pub struct Scanner<'a, C: Comparator> {
    comparator: &'a C,
    options: DiffOptions,
    progress: ProgressBar,
}

impl<'a, C: Comparator> Scanner<'a, C> {
    pub fn new(comparator: &'a C, options: DiffOptions) -> Self {
        Self {
            comparator,
            options,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Compare every image against each image after it, exactly once per pair.
    ///
    /// Pairs whose dimensions differ are skipped without calling the comparator.
    /// An image already reported as a duplicate keeps being compared against
    /// later images, so pairs are not merged into clusters.
    pub fn scan(&self, entries: &mut [CatalogEntry], audit: &mut AuditTrail) -> Result<ScanResult> {
        let mut result = ScanResult {
            stats: ScanStats {
                images: entries.len(),
                ..ScanStats::default()
            },
            ..ScanResult::default()
        };
        if entries.is_empty() {
            return Ok(result);
        }

        self.progress.set_length(candidate_pairs(entries.len()));

        for i in 0..entries.len() {
            let (head, tail) = entries.split_at_mut(i + 1);
            let keep = &mut head[i];
            let keep_path = keep.path().to_path_buf();
            let keep_bounds = bounds(keep.dimensions()?);

            for (offset, candidate) in tail.iter_mut().enumerate() {
                let j = i + 1 + offset;
                let candidate_bounds = bounds(candidate.dimensions()?);

                result.stats.prefilter_checks += 1;
                self.progress.inc(1);
                if keep_bounds != candidate_bounds {
                    continue;
                }

                let candidate_path = candidate.path().to_path_buf();
                audit.record(EventKind::Compare {
                    keep: base_name(&keep_path),
                    other: base_name(&candidate_path),
                    keep_bounds,
                    other_bounds: candidate_bounds,
                });

                let keep_image = keep.load()?;
                let outcome = self
                    .comparator
                    .compare(keep_image, candidate.load()?, &self.options);
                // At most the current pair stays decoded.
                candidate.release();
                result.stats.comparisons += 1;

                if !outcome.equal {
                    continue;
                }

                log::info!(
                    "{} duplicates {}",
                    candidate_path.display(),
                    keep_path.display()
                );
                audit.record(EventKind::Match {
                    keep: base_name(&keep_path),
                    remove: base_name(&candidate_path),
                    keep_bounds,
                    remove_bounds: candidate_bounds,
                });
                result.stats.matches += 1;
                result.pairs.push(DuplicatePair {
                    keep: PairMember {
                        index: i,
                        path: keep_path.clone(),
                    },
                    remove: PairMember {
                        index: j,
                        path: candidate_path,
                    },
                });
            }

            // Every later entry has now seen entry i.
            keep.release();
        }

        self.progress.finish_and_clear();
        Ok(result)
    }
}

fn bounds((width, height): (u32, u32)) -> Bounds {
    Bounds { width, height }
}

pub(crate) fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::compare::{ComparisonOutcome, PixelDiff};
    use image::{DynamicImage, ImageBuffer, Rgb};
    use std::cell::RefCell;
    use tempfile::TempDir;

    /// Records every pair it is asked about and answers "equal" for all of them.
    #[derive(Default)]
    struct CountingComparator {
        calls: RefCell<Vec<(u32, u32)>>,
    }

    impl Comparator for CountingComparator {
        fn compare(
            &self,
            a: &DynamicImage,
            b: &DynamicImage,
            _options: &DiffOptions,
        ) -> ComparisonOutcome {
            assert_eq!((a.width(), a.height()), (b.width(), b.height()));
            self.calls.borrow_mut().push((a.width(), a.height()));
            ComparisonOutcome {
                equal: true,
                differing_pixels: 0,
                total_pixels: u64::from(a.width() * a.height()),
                diff_image: None,
            }
        }
    }

    fn create_test_image(
        path: &Path,
        width: u32,
        height: u32,
        shade: u8,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            let intensity = ((x + y) % 256) as u8;
            Rgb([intensity, shade, intensity])
        });

        img.save(path)?;
        Ok(())
    }

    fn scan_dir(dir: &Path, comparator: &impl Comparator) -> ScanResult {
        let mut entries = catalog::build(dir).unwrap();
        Scanner::new(comparator, DiffOptions::new(0.1))
            .scan(&mut entries, &mut AuditTrail::disabled())
            .unwrap()
    }

    #[test]
    fn test_candidate_pairs() {
        assert_eq!(candidate_pairs(0), 0);
        assert_eq!(candidate_pairs(1), 0);
        assert_eq!(candidate_pairs(2), 1);
        assert_eq!(candidate_pairs(5), 10);
    }

    #[test]
    fn test_scan_empty_catalog() {
        let comparator = CountingComparator::default();
        let result = Scanner::new(&comparator, DiffOptions::new(0.1))
            .scan(&mut [], &mut AuditTrail::disabled())
            .unwrap();

        assert!(result.pairs.is_empty());
        assert_eq!(result.stats, ScanStats::default());
        assert!(comparator.calls.borrow().is_empty());
    }

    #[test]
    fn test_scan_single_image() {
        let temp_dir = TempDir::new().unwrap();
        create_test_image(&temp_dir.path().join("a.png"), 5, 5, 0).unwrap();

        let comparator = CountingComparator::default();
        let result = scan_dir(temp_dir.path(), &comparator);

        assert!(result.pairs.is_empty());
        assert_eq!(result.stats.images, 1);
        assert_eq!(result.stats.prefilter_checks, 0);
        assert_eq!(result.stats.comparisons, 0);
    }

    #[test]
    fn test_prefilter_skips_mismatched_bounds() {
        let temp_dir = TempDir::new().unwrap();
        create_test_image(&temp_dir.path().join("A.png"), 10, 10, 0).unwrap();
        create_test_image(&temp_dir.path().join("B.png"), 10, 10, 0).unwrap();
        create_test_image(&temp_dir.path().join("C.png"), 20, 20, 0).unwrap();

        let comparator = CountingComparator::default();
        let result = scan_dir(temp_dir.path(), &comparator);

        assert_eq!(result.stats.prefilter_checks, 3);
        assert_eq!(result.stats.comparisons, 1);
        assert_eq!(*comparator.calls.borrow(), vec![(10, 10)]);
        assert_eq!(result.pairs.len(), 1);
        assert!(result.pairs[0].keep.path.ends_with("A.png"));
        assert!(result.pairs[0].remove.path.ends_with("B.png"));
    }

    #[test]
    fn test_every_pair_checked_once_and_not_merged() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["a.png", "b.png", "c.png", "d.png"] {
            create_test_image(&temp_dir.path().join(name), 3, 3, 0).unwrap();
        }

        let comparator = CountingComparator::default();
        let result = scan_dir(temp_dir.path(), &comparator);

        assert_eq!(result.stats.prefilter_checks, candidate_pairs(4));
        assert_eq!(result.stats.comparisons, 6);
        let indices: Vec<_> = result
            .pairs
            .iter()
            .map(|p| (p.keep.index, p.remove.index))
            .collect();
        assert_eq!(
            indices,
            vec![(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)]
        );
        assert!(result.pairs.iter().all(|p| p.keep.index < p.remove.index));
        assert!(result.pairs.iter().all(|p| p.keep.path != p.remove.path));
    }

    #[test]
    fn test_scan_with_pixel_diff() {
        let temp_dir = TempDir::new().unwrap();
        create_test_image(&temp_dir.path().join("a.png"), 16, 16, 0).unwrap();
        create_test_image(&temp_dir.path().join("b.png"), 16, 16, 200).unwrap();
        create_test_image(&temp_dir.path().join("c.png"), 16, 16, 0).unwrap();

        let result = scan_dir(temp_dir.path(), &PixelDiff);

        assert_eq!(result.stats.comparisons, 3);
        assert_eq!(result.pairs.len(), 1);
        assert!(result.pairs[0].keep.path.ends_with("a.png"));
        assert!(result.pairs[0].remove.path.ends_with("c.png"));
    }

    #[test]
    fn test_entries_released_after_scan() {
        let temp_dir = TempDir::new().unwrap();
        create_test_image(&temp_dir.path().join("a.png"), 4, 4, 0).unwrap();
        create_test_image(&temp_dir.path().join("b.png"), 4, 4, 0).unwrap();

        let mut entries = catalog::build(temp_dir.path()).unwrap();
        Scanner::new(&PixelDiff, DiffOptions::new(0.1))
            .scan(&mut entries, &mut AuditTrail::disabled())
            .unwrap();

        assert!(entries.iter().all(|e| !e.is_loaded()));
    }

    #[test]
    fn test_mismatched_sizes_are_never_decoded() {
        let temp_dir = TempDir::new().unwrap();
        for (name, size) in [("a.png", 4), ("b.png", 5), ("c.png", 6), ("d.png", 7)] {
            create_test_image(&temp_dir.path().join(name), size, size, 0).unwrap();
        }
        std::fs::write(temp_dir.path().join("z.png"), b"garbage").unwrap();

        let mut entries = catalog::build(temp_dir.path()).unwrap();
        let result = Scanner::new(&PixelDiff, DiffOptions::new(0.1))
            .scan(&mut entries, &mut AuditTrail::disabled());

        assert!(matches!(
            result,
            Err(crate::error::DupliError::Decode { .. })
        ));
        let loaded: Vec<_> = entries.iter().map(|e| e.is_loaded()).collect();
        assert_eq!(loaded, vec![false; 5]);
    }

    #[test]
    fn test_candidates_released_after_comparison() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["a.png", "b.png", "c.png", "d.png"] {
            create_test_image(&temp_dir.path().join(name), 4, 4, 0).unwrap();
        }
        std::fs::write(temp_dir.path().join("z.png"), b"garbage").unwrap();

        let mut entries = catalog::build(temp_dir.path()).unwrap();
        let result = Scanner::new(&PixelDiff, DiffOptions::new(0.1))
            .scan(&mut entries, &mut AuditTrail::disabled());

        // Fails on (a, z) while only a is still held.
        assert!(result.is_err());
        let loaded: Vec<_> = entries.iter().map(|e| e.is_loaded()).collect();
        assert_eq!(loaded, vec![true, false, false, false, false]);
    }

    #[test]
    fn test_undecodable_image_aborts_scan() {
        let temp_dir = TempDir::new().unwrap();
        create_test_image(&temp_dir.path().join("a.png"), 4, 4, 0).unwrap();
        std::fs::write(temp_dir.path().join("b.png"), b"garbage").unwrap();

        let mut entries = catalog::build(temp_dir.path()).unwrap();
        let result = Scanner::new(&PixelDiff, DiffOptions::new(0.1))
            .scan(&mut entries, &mut AuditTrail::disabled());

        assert!(matches!(
            result,
            Err(crate::error::DupliError::Decode { .. })
        ));
    }

    #[test]
    fn test_compare_and_match_events_logged() {
        let temp_dir = TempDir::new().unwrap();
        let images = temp_dir.path().join("images");
        std::fs::create_dir(&images).unwrap();
        create_test_image(&images.join("a.png"), 6, 6, 0).unwrap();
        create_test_image(&images.join("b.png"), 6, 6, 0).unwrap();
        create_test_image(&images.join("c.png"), 9, 9, 0).unwrap();

        let log_path = temp_dir.path().join("dupli.log");
        let mut audit = AuditTrail::to_file(&log_path);
        let mut entries = catalog::build(&images).unwrap();
        Scanner::new(&PixelDiff, DiffOptions::new(0.1))
            .scan(&mut entries, &mut audit)
            .unwrap();

        let content = std::fs::read_to_string(&log_path).unwrap();
        let kinds: Vec<_> = content
            .lines()
            .map(|line| line.split(", ").next().unwrap())
            .collect();
        assert_eq!(kinds, vec!["COMPARE", "MATCH"]);
        assert!(content.contains("a.png, b.png, (0,0)-(6,6), (0,0)-(6,6)"));
    }
}
