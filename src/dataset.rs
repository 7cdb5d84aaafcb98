//! Dataset splitter: runs the record split engine over every partition of a
//! dataset directory.
//!
//! ## Layout
//!
//! ```text
//! <dataset_dir>/                 <output_dir>/
//!   test_data.bin         ──►      test/        label.bin numerical.bin cat_*.bin
//!   train_data.bin        ──►      train/       ...
//!   validation_data.bin   ──►      validation/  ...
//! ```

use std::fs;
use std::num::NonZeroUsize;
use std::path::Path;

use indicatif::ProgressBar;
use tracing::info;

use crate::engine::{RecordSplitEngine, SplitError, SplitManifest, io_error};
use crate::schema::{Schema, SourceType};

/// One named partition of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub name: &'static str,
    /// Input file name under the dataset directory.
    pub input_file: &'static str,
    /// Output sub-directory name under the output directory.
    pub output_dir: &'static str,
}

/// Partitions in processing order.
pub const PARTITIONS: [Partition; 3] = [
    Partition {
        name: "test",
        input_file: "test_data.bin",
        output_dir: "test",
    },
    Partition {
        name: "train",
        input_file: "train_data.bin",
        output_dir: "train",
    },
    Partition {
        name: "validation",
        input_file: "validation_data.bin",
        output_dir: "validation",
    },
];

/// Result of splitting one partition.
#[derive(Debug, Clone)]
pub struct PartitionSplit {
    pub partition: Partition,
    pub manifest: SplitManifest,
}

/// Splits all [`PARTITIONS`] of a dataset with one shared schema.
pub struct DatasetSplitter {
    schema: Schema,
    batch_size: NonZeroUsize,
    source_type: SourceType,
}

impl DatasetSplitter {
    pub fn new(schema: Schema, batch_size: NonZeroUsize) -> Self {
        Self {
            schema,
            batch_size,
            source_type: SourceType::default(),
        }
    }

    pub fn with_source_type(mut self, source_type: SourceType) -> Self {
        self.source_type = source_type;
        self
    }

    pub fn split_dataset(
        &self,
        dataset_dir: &Path,
        output_dir: &Path,
    ) -> Result<Vec<PartitionSplit>, SplitError> {
        self.split_dataset_with_progress(dataset_dir, output_dir, |_| ProgressBar::hidden())
    }

    /// Split every partition in order, reporting each one on the bar returned
    /// by `progress`. The first failure aborts the remaining partitions.
    pub fn split_dataset_with_progress(
        &self,
        dataset_dir: &Path,
        output_dir: &Path,
        mut progress: impl FnMut(&Partition) -> ProgressBar,
    ) -> Result<Vec<PartitionSplit>, SplitError> {
        fs::create_dir_all(output_dir).map_err(io_error(output_dir))?;
        for partition in &PARTITIONS {
            let target = output_dir.join(partition.output_dir);
            fs::create_dir_all(&target).map_err(io_error(&target))?;
        }

        let mut splits = Vec::with_capacity(PARTITIONS.len());
        for partition in PARTITIONS {
            info!("Partition {}", partition.name);
            let input = dataset_dir.join(partition.input_file);
            let target = output_dir.join(partition.output_dir);

            let bar = progress(&partition);
            let manifest = RecordSplitEngine::new(&self.schema, self.batch_size)
                .with_source_type(self.source_type)
                .with_progress(bar.clone())
                .split(&input, &target)?;
            bar.finish_and_clear();

            splits.push(PartitionSplit {
                partition,
                manifest,
            });
        }
        Ok(splits)
    }
}
