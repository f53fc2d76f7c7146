use crate::error::{DupliError, Result};
use image::{DynamicImage, ImageError, ImageReader};
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions are matched case-sensitively against the final suffix.
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// A discovered image file. Its dimensions are read from the header on
/// first use; its pixels are decoded only when actually compared.
#[derive(Debug)]
pub struct CatalogEntry {
    path: PathBuf,
    dimensions: Option<(u32, u32)>,
    pixels: Option<DynamicImage>,
}

impl CatalogEntry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            dimensions: None,
            pixels: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.pixels.is_some()
    }

    /// Width and height, without decoding the pixel data.
    pub fn dimensions(&mut self) -> Result<(u32, u32)> {
        if let Some(dimensions) = self.dimensions {
            return Ok(dimensions);
        }
        let dimensions = match &self.pixels {
            Some(pixels) => (pixels.width(), pixels.height()),
            None => reader(&self.path)?
                .into_dimensions()
                .map_err(|source| decode_error(&self.path, source))?,
        };
        self.dimensions = Some(dimensions);
        Ok(dimensions)
    }

    /// Decode the file if it hasn't been decoded yet.
    pub fn load(&mut self) -> Result<&DynamicImage> {
        let pixels = match self.pixels.take() {
            Some(pixels) => pixels,
            None => reader(&self.path)?
                .decode()
                .map_err(|source| decode_error(&self.path, source))?,
        };
        self.dimensions = Some((pixels.width(), pixels.height()));
        Ok(self.pixels.insert(pixels))
    }

    /// Drop the decoded pixels; a later `load` decodes again.
    pub fn release(&mut self) {
        self.pixels = None;
    }
}

fn decode_error(path: &Path, source: ImageError) -> DupliError {
    DupliError::Decode {
        path: path.to_path_buf(),
        source,
    }
}

fn reader(path: &Path) -> Result<ImageReader<BufReader<fs::File>>> {
    ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| decode_error(path, ImageError::IoError(e)))
}

/// True when the file name has a `.` and the text after the last one is a
/// supported extension. `.png` on its own counts.
pub fn is_supported_image(path: &Path) -> bool {
    let Some(name) = path.file_name() else {
        return false;
    };
    let name = name.as_encoded_bytes();
    name.iter()
        .rposition(|&b| b == b'.')
        .is_some_and(|dot| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|ext| &name[dot + 1..] == ext.as_bytes())
        })
}

/// Recursively enumerate the image files under `root`.
pub fn build(root: &Path) -> Result<Vec<CatalogEntry>> {
    build_excluding(root, None)
}

/// Like [`build`], but never descends into `excluded`, however either path
/// is spelled (relative, `..`, symlinked).
pub fn build_excluding(root: &Path, excluded: Option<&Path>) -> Result<Vec<CatalogEntry>> {
    // A quarantine that doesn't exist yet has nothing in it to skip.
    let excluded = excluded.and_then(|dir| fs::canonicalize(dir).ok());
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| match &excluded {
            Some(dir) if entry.file_type().is_dir() => {
                fs::canonicalize(entry.path()).map_or(true, |path| &path != dir)
            }
            _ => true,
        });

    let mut entries = Vec::new();
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() && is_supported_image(entry.path()) {
            entries.push(CatalogEntry::new(entry.into_path()));
        }
    }

    log::debug!("Catalogued {} image(s) under {}", entries.len(), root.display());
    Ok(entries)
}
