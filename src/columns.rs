//! Read-only, memory-mapped access to one split partition directory.
//!
//! Mirrors the files written by [`RecordSplitEngine`](crate::engine::RecordSplitEngine):
//! `manifest.json` supplies the record count and every categorical width, so
//! the column files can be decoded without the original schema.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use half::f16;
use memmap2::Mmap;
use thiserror::Error;

use crate::engine::{LABEL_FILE, MANIFEST_FILE, NUMERICAL_FILE, SplitManifest};
use crate::schema::CategoricalWidth;

#[derive(Debug, Error)]
pub enum ColumnError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse split manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("{} has {actual} bytes, expected {expected}", file.display())]
    LengthMismatch {
        file: PathBuf,
        expected: u64,
        actual: u64,
    },
}

/// A mapped column file. Empty files are not mapped.
enum ColumnFile {
    Empty,
    Mapped(Mmap),
}

impl ColumnFile {
    fn open(path: &Path, expected_len: u64) -> Result<Self, ColumnError> {
        let io_err = |source| ColumnError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(io_err)?;
        let actual = file.metadata().map_err(io_err)?.len();
        if actual != expected_len {
            return Err(ColumnError::LengthMismatch {
                file: path.to_path_buf(),
                expected: expected_len,
                actual,
            });
        }
        if actual == 0 {
            return Ok(ColumnFile::Empty);
        }
        // SAFETY: the mapping is read-only. Split outputs are not modified
        // while a view is open.
        let mmap = unsafe { Mmap::map(&file) }.map_err(io_err)?;
        Ok(ColumnFile::Mapped(mmap))
    }

    fn bytes(&self) -> &[u8] {
        match self {
            ColumnFile::Empty => &[],
            ColumnFile::Mapped(mmap) => &mmap[..],
        }
    }
}

/// Zero-copy view of one split partition.
pub struct SplitView {
    manifest: SplitManifest,
    label: ColumnFile,
    numerical: ColumnFile,
    categorical: Vec<ColumnFile>,
}

impl SplitView {
    /// Open the split in `dir`, checking every column file has exactly
    /// `num_records` rows.
    pub fn open(dir: &Path) -> Result<Self, ColumnError> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest_bytes = std::fs::read(&manifest_path).map_err(|source| ColumnError::Io {
            path: manifest_path.clone(),
            source,
        })?;
        let manifest: SplitManifest = serde_json::from_slice(&manifest_bytes)?;

        let n = manifest.num_records;
        let label = ColumnFile::open(&dir.join(LABEL_FILE), n)?;
        let numerical_stride = (manifest.numerical.len() * std::mem::size_of::<f16>()) as u64;
        let numerical = ColumnFile::open(&dir.join(NUMERICAL_FILE), n * numerical_stride)?;
        let categorical = manifest
            .categorical
            .iter()
            .map(|c| ColumnFile::open(&dir.join(&c.file), n * c.width.bytes() as u64))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            manifest,
            label,
            numerical,
            categorical,
        })
    }

    pub fn manifest(&self) -> &SplitManifest {
        &self.manifest
    }

    pub fn num_records(&self) -> usize {
        self.manifest.num_records as usize
    }

    pub fn num_numerical(&self) -> usize {
        self.manifest.numerical.len()
    }

    pub fn num_categorical(&self) -> usize {
        self.manifest.categorical.len()
    }

    pub fn categorical_width(&self, feature: usize) -> CategoricalWidth {
        self.manifest.categorical[feature].width
    }

    /// # Panics
    /// Panics if `row` is out of bounds.
    pub fn label(&self, row: usize) -> bool {
        self.label.bytes()[row] != 0
    }

    /// # Panics
    /// Panics if `row` or `field` is out of bounds.
    pub fn numerical(&self, row: usize, field: usize) -> f16 {
        assert!(
            field < self.num_numerical(),
            "numerical field {field} out of bounds ({} fields)",
            self.num_numerical(),
        );
        let start = (row * self.num_numerical() + field) * std::mem::size_of::<f16>();
        let bytes = &self.numerical.bytes()[start..start + 2];
        f16::from_ne_bytes([bytes[0], bytes[1]])
    }

    /// All numerical fields of `row`, widened to `f32`.
    pub fn numerical_row(&self, row: usize) -> Vec<f32> {
        (0..self.num_numerical())
            .map(|field| self.numerical(row, field).to_f32())
            .collect()
    }

    /// Categorical value of `feature` at `row`, sign-extended to `i32`.
    ///
    /// # Panics
    /// Panics if `row` or `feature` is out of bounds.
    pub fn categorical(&self, row: usize, feature: usize) -> i32 {
        let width = self.categorical_width(feature);
        let start = row * width.bytes();
        width.decode(&self.categorical[feature].bytes()[start..start + width.bytes()])
    }
}
