//! Inspect one split partition: dump the manifest and sample rows in a
//! human-readable format.
//!
//! ## Usage
//!
//! ```sh
//! cargo run --release --bin inspect -- --split-dir data/criteo.split/test
//! cargo run --release --bin inspect -- --split-dir data/criteo.split/test --sample-rows 20
//! ```

use std::path::PathBuf;

use clap::Parser;
use delta::columns::SplitView;

#[derive(Parser, Debug)]
#[command(about = "Inspect a split partition directory")]
struct Args {
    /// Partition directory written by the `split` binary.
    #[arg(long)]
    split_dir: PathBuf,

    /// Number of sample rows to dump (0 to skip).
    #[arg(long, default_value_t = 5)]
    sample_rows: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    let view = SplitView::open(&args.split_dir)?;
    let manifest = view.manifest();

    let n = view.num_records();
    let row_bytes = 1
        + view.num_numerical() * 2
        + manifest
            .categorical
            .iter()
            .map(|c| c.width.bytes())
            .sum::<usize>();

    // ── Overview ──────────────────────────────────────────────────────────
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║  Split: {}", args.split_dir.display());
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Records:       {n:>12}");
    println!("║  Source type:   {:>12}", manifest.source_type);
    println!(
        "║  Batches:       {:>12} (batch size {})",
        manifest.num_batches, manifest.batch_size
    );
    println!("║  Dropped bytes: {:>12}", manifest.dropped_tail_bytes);
    println!("║  Bytes/record:  {row_bytes:>12}");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    // ── Columns ──────────────────────────────────────────────────────────
    println!("┌─ Columns");
    println!("│  label.bin       bool  (1 byte)");
    println!(
        "│  numerical.bin   f16 × {} ({})",
        view.num_numerical(),
        manifest.numerical.join(", ")
    );
    for c in &manifest.categorical {
        println!(
            "│  {:<15} {:<5} (cardinality {})",
            c.file, c.width, c.cardinality
        );
    }
    println!("└──────────────────────────────────────────────────────────────");

    if args.sample_rows == 0 || n == 0 {
        return Ok(());
    }

    // ── Sample rows ──────────────────────────────────────────────────────
    let show = n.min(args.sample_rows);
    println!();
    println!("┌─ Sample rows (first {show} of {n})");
    for row in 0..show {
        let numerical: Vec<String> = view
            .numerical_row(row)
            .iter()
            .map(|v| format!("{v}"))
            .collect();
        let categorical: Vec<String> = (0..view.num_categorical())
            .map(|f| view.categorical(row, f).to_string())
            .collect();
        println!(
            "│  {row:>6} │ {} │ [{}] │ [{}]",
            u8::from(view.label(row)),
            numerical.join(", "),
            categorical.join(", ")
        );
    }
    if n > show {
        println!("│  ... ({} more rows)", n - show);
    }
    println!("└──────────────────────────────────────────────────────────────");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_kebab_case_flags() {
        let args = Args::try_parse_from([
            "inspect",
            "--split-dir",
            "data/criteo.split/test",
            "--sample-rows",
            "3",
        ])
        .unwrap();
        assert_eq!(args.split_dir, PathBuf::from("data/criteo.split/test"));
        assert_eq!(args.sample_rows, 3);

        assert!(Args::try_parse_from(["inspect", "--split_dir", "x"]).is_err());
    }
}
