//! Split a fixed-record binary dataset into per-field column files.
//!
//! ## Input
//!
//! A dataset directory containing `test_data.bin`, `train_data.bin` and
//! `validation_data.bin`, each a headerless run of Criteo records
//! (label, 13 numerical, 26 categorical; 4 bytes per slot, native order).
//!
//! ## Output
//!
//! One directory per partition under the output path (`test/`, `train/`,
//! `validation/`), each holding `label.bin`, `numerical.bin`,
//! `cat_0.bin` .. `cat_25.bin` and `manifest.json`.
//!
//! ## Usage
//!
//! ```sh
//! cargo run --release --bin split -- \
//!     --input_path data/criteo --output_path data/criteo.split --batch_size 1000000
//! ```

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use delta::dataset::DatasetSplitter;
use delta::schema::Schema;
use indicatif::{HumanCount, HumanDuration, ProgressBar, ProgressStyle};
use tracing::info;

#[derive(Parser, Debug)]
#[command(about = "Split a fixed-record binary dataset into per-field column files")]
struct Args {
    /// Dataset root containing `train_data.bin`, `test_data.bin` and `validation_data.bin`.
    #[arg(long = "input_path")]
    input_path: PathBuf,

    /// Root under which `train/`, `test/` and `validation/` are created.
    #[arg(long = "output_path")]
    output_path: PathBuf,

    /// Records read per batch. Bounds peak memory.
    #[arg(long = "batch_size")]
    batch_size: NonZeroUsize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    info!("Input:      {}", args.input_path.display());
    info!("Output:     {}", args.output_path.display());
    info!("Batch size: {}", args.batch_size);

    let style = ProgressStyle::with_template(
        "  {msg:<12} {bar:40.cyan/blue} {pos}/{len} batches [{elapsed_precise}]",
    )?
    .progress_chars("##-");

    let start = Instant::now();
    let splitter = DatasetSplitter::new(Schema::criteo(), args.batch_size);
    let splits = splitter.split_dataset_with_progress(
        &args.input_path,
        &args.output_path,
        |partition| {
            let pb = ProgressBar::new(0).with_style(style.clone());
            pb.set_message(partition.name);
            pb
        },
    )?;

    for split in &splits {
        info!(
            "  {:<12} {} records",
            split.partition.name,
            HumanCount(split.manifest.num_records)
        );
    }
    let elapsed = start.elapsed();
    info!("Done in {}", HumanDuration(elapsed));
    println!("Processing took {:.2} sec", elapsed.as_secs_f64());
    Ok(())
}
