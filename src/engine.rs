//! Record split engine: de-interleaves one fixed-record binary file into
//! per-field column files.
//!
//! ## Output
//!
//! Written into the output directory:
//! - `numerical.bin` — `[records, num_numerical]` `f16`, row-major
//! - `label.bin`     — one byte per record, `0` or `1`
//! - `cat_{i}.bin`   — one value per record, narrowed to the feature's
//!   [`CategoricalWidth`]
//! - `manifest.json` — [`SplitManifest`], written only after every column
//!   file has been flushed
//!
//! All values use native byte order, like the input.
//!
//! ## Memory
//!
//! The input is streamed in batches of `batch_size` records through a single
//! reused buffer, so peak memory is `batch_size * bytes_per_record` plus one
//! column of encoded output, regardless of input size.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use half::f16;
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::schema::{
    CategoricalWidth, LABEL_COLUMN, RecordLayout, SLOT_BYTES, Schema, SchemaError, SourceType,
    reinterpret_f32,
};

pub const LABEL_FILE: &str = "label.bin";
pub const NUMERICAL_FILE: &str = "numerical.bin";
pub const MANIFEST_FILE: &str = "manifest.json";

/// File name of categorical feature `feature`.
pub fn categorical_file_name(feature: usize) -> String {
    format!("cat_{feature}.bin")
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum SplitError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize split manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// Attach the offending path to an [`io::Error`].
pub(crate) fn io_error(path: &Path) -> impl FnOnce(io::Error) -> SplitError + '_ {
    move |source| SplitError::Io {
        path: path.to_path_buf(),
        source,
    }
}

// ============================================================================
// Manifest
// ============================================================================

/// One categorical output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalColumn {
    pub file: String,
    pub cardinality: u64,
    pub width: CategoricalWidth,
}

/// Description of a finished split, serialized as `manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitManifest {
    pub source_type: SourceType,
    /// Records written to every column file.
    pub num_records: u64,
    pub num_batches: u64,
    pub batch_size: usize,
    /// Bytes at the end of the input smaller than one record; never read.
    pub dropped_tail_bytes: u64,
    /// Numerical field names, in the order they appear in each `numerical.bin` row.
    pub numerical: Vec<String>,
    pub categorical: Vec<CategoricalColumn>,
}

// ============================================================================
// Batch view
// ============================================================================

/// A batch buffer viewed as a row-major `[records, record_width]` grid of
/// source slots. Trailing bytes short of a whole record are not part of
/// the grid.
pub struct BatchView<'a> {
    bytes: &'a [u8],
    layout: &'a RecordLayout,
    num_records: usize,
}

impl<'a> BatchView<'a> {
    pub fn new(bytes: &'a [u8], layout: &'a RecordLayout) -> Self {
        let num_records = bytes.len() / layout.bytes_per_record();
        Self {
            bytes,
            layout,
            num_records,
        }
    }

    pub fn num_records(&self) -> usize {
        self.num_records
    }

    /// Raw slot at (`record`, `column`).
    ///
    /// # Panics
    /// Panics if `record` is out of bounds. Column bounds are only checked
    /// in debug builds.
    #[inline]
    pub fn slot(&self, record: usize, column: usize) -> [u8; SLOT_BYTES] {
        debug_assert!(
            record < self.num_records && column < self.layout.record_width(),
            "slot ({record}, {column}) out of bounds for a {}x{} batch",
            self.num_records,
            self.layout.record_width(),
        );
        let start =
            record * self.layout.bytes_per_record() + column * self.layout.bytes_per_element;
        let mut slot = [0u8; SLOT_BYTES];
        slot.copy_from_slice(&self.bytes[start..start + SLOT_BYTES]);
        slot
    }

    /// Slots of one column, in record order.
    pub fn column(&self, column: usize) -> impl Iterator<Item = [u8; SLOT_BYTES]> + '_ {
        (0..self.num_records).map(move |record| self.slot(record, column))
    }
}

// ============================================================================
// Output streams
// ============================================================================

/// One buffered, append-only output file.
struct Sink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl Sink {
    fn create(path: PathBuf) -> Result<Self, SplitError> {
        let file = File::create(&path).map_err(io_error(&path))?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
        })
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), SplitError> {
        self.writer.write_all(bytes).map_err(io_error(&self.path))
    }

    fn finish(mut self) -> Result<(), SplitError> {
        self.writer.flush().map_err(io_error(&self.path))
    }
}

/// Every output stream of one split. Dropping this closes all files, so
/// streams opened before a failure are released on the error path too.
struct ColumnSinks {
    numerical: Sink,
    label: Sink,
    categorical: Vec<Sink>,
}

impl ColumnSinks {
    /// Open (truncate-create) `numerical.bin`, `label.bin`, then `cat_{i}.bin`
    /// in feature order.
    fn create(output_dir: &Path, num_categorical: usize) -> Result<Self, SplitError> {
        let numerical = Sink::create(output_dir.join(NUMERICAL_FILE))?;
        let label = Sink::create(output_dir.join(LABEL_FILE))?;
        let categorical = (0..num_categorical)
            .map(|i| Sink::create(output_dir.join(categorical_file_name(i))))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            numerical,
            label,
            categorical,
        })
    }

    fn finish(self) -> Result<(), SplitError> {
        self.numerical.finish()?;
        self.label.finish()?;
        for sink in self.categorical {
            sink.finish()?;
        }
        Ok(())
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Splits one input file into column files under an output directory.
pub struct RecordSplitEngine<'a> {
    schema: &'a Schema,
    batch_size: NonZeroUsize,
    source_type: SourceType,
    progress: ProgressBar,
}

impl<'a> RecordSplitEngine<'a> {
    pub fn new(schema: &'a Schema, batch_size: NonZeroUsize) -> Self {
        Self {
            schema,
            batch_size,
            source_type: SourceType::default(),
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_source_type(mut self, source_type: SourceType) -> Self {
        self.source_type = source_type;
        self
    }

    /// Report progress on `progress`: its length is set to the batch count
    /// and it advances once per batch.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Split `input` into column files under `output_dir`.
    ///
    /// A [`SchemaError`] is raised before any file is opened. An I/O failure
    /// aborts the remaining batches and leaves already-written bytes in place.
    pub fn split(&self, input: &Path, output_dir: &Path) -> Result<SplitManifest, SplitError> {
        let widths = self.schema.categorical_widths()?;
        for (i, width) in widths.iter().enumerate() {
            debug!(
                "  cat_{i}: cardinality {} -> {width}",
                self.schema.categorical_cardinalities[i]
            );
        }

        let layout = self.schema.layout(self.source_type);
        let bytes_per_record = layout.bytes_per_record();

        let mut reader = File::open(input).map_err(io_error(input))?;
        let file_len = reader.metadata().map_err(io_error(input))?.len();
        let num_records = layout.num_records(file_len);
        let num_batches = layout.num_batches(file_len, self.batch_size);
        let dropped_tail_bytes = layout.tail_bytes(file_len);

        info!(
            "Splitting {} ({} records, {} batches of {})",
            input.display(),
            num_records,
            num_batches,
            self.batch_size
        );
        if dropped_tail_bytes > 0 {
            debug!(
                "  {} trailing bytes of {} do not form a whole record and are dropped",
                dropped_tail_bytes,
                input.display()
            );
        }

        fs::create_dir_all(output_dir).map_err(io_error(output_dir))?;
        let mut sinks = ColumnSinks::create(output_dir, widths.len())?;

        // Never allocate more than the file can fill.
        let batch_records = (self.batch_size.get() as u64).min(num_records) as usize;
        let mut buffer = vec![0u8; batch_records * bytes_per_record];
        let mut scratch = Vec::new();

        self.progress.set_length(num_batches);
        let mut records_written = 0u64;
        let mut batches_written = 0u64;
        for _ in 0..num_batches {
            let filled = read_full(&mut reader, &mut buffer).map_err(io_error(input))?;
            let batch = BatchView::new(&buffer[..filled], &layout);
            if batch.num_records() == 0 {
                break;
            }
            self.write_batch(&batch, &layout, &widths, &mut sinks, &mut scratch)?;
            records_written += batch.num_records() as u64;
            batches_written += 1;
            self.progress.inc(1);
        }
        sinks.finish()?;

        let manifest = SplitManifest {
            source_type: self.source_type,
            num_records: records_written,
            num_batches: batches_written,
            batch_size: self.batch_size.get(),
            dropped_tail_bytes,
            numerical: self.schema.numerical.clone(),
            categorical: widths
                .iter()
                .enumerate()
                .map(|(i, &width)| CategoricalColumn {
                    file: categorical_file_name(i),
                    cardinality: self.schema.categorical_cardinalities[i],
                    width,
                })
                .collect(),
        };
        write_manifest(&output_dir.join(MANIFEST_FILE), &manifest)?;

        info!(
            "  Wrote {} records to {}",
            records_written,
            output_dir.display()
        );
        Ok(manifest)
    }

    /// Encode every column of `batch` and append it to its stream.
    fn write_batch(
        &self,
        batch: &BatchView,
        layout: &RecordLayout,
        widths: &[CategoricalWidth],
        sinks: &mut ColumnSinks,
        scratch: &mut Vec<u8>,
    ) -> Result<(), SplitError> {
        // Numerical: f32 bit patterns narrowed to f16, row-major.
        scratch.clear();
        for record in 0..batch.num_records() {
            for column in layout.numerical_columns() {
                let value = reinterpret_f32(batch.slot(record, column));
                scratch.extend_from_slice(&f16::from_f32(value).to_ne_bytes());
            }
        }
        sinks.numerical.write(scratch)?;

        // Label: nonzero is true.
        scratch.clear();
        scratch.extend(
            batch
                .column(LABEL_COLUMN)
                .map(|slot| u8::from(self.source_type.decode(slot) != 0)),
        );
        sinks.label.write(scratch)?;

        for (feature, (width, sink)) in widths.iter().zip(&mut sinks.categorical).enumerate() {
            scratch.clear();
            for slot in batch.column(layout.categorical_column(feature)) {
                width.narrow_into(self.source_type.decode(slot), scratch);
            }
            sink.write(scratch)?;
        }
        Ok(())
    }
}

/// Fill `buf` from `reader`, stopping early only at end of input.
/// Returns the number of bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn write_manifest(path: &Path, manifest: &SplitManifest) -> Result<(), SplitError> {
    let mut w = BufWriter::new(File::create(path).map_err(io_error(path))?);
    serde_json::to_writer_pretty(&mut w, manifest)?;
    w.flush().map_err(io_error(path))
}

// ============================================================================
// Tests
// ============================================================================
