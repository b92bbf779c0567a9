use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use kraken2ref_rs::output::{output_path, write_json, RunMetadata};
use kraken2ref_rs::poll::PollMethod;
use kraken2ref_rs::analyze_report;

/// Pick reference taxa from a kraken2 taxonomic report.
#[derive(Parser, Debug)]
#[command(name = "kraken2ref-rs", version, about)]
struct Cli {
    /// Path to the kraken2 report (.txt or .txt.gz)
    report: PathBuf,

    /// Sample ID used in the output filename and metadata
    #[arg(short, long)]
    sample_id: String,

    /// Minimum read count for a leaf node to be considered valid
    #[arg(short, long, default_value = "100")]
    threshold: u64,

    /// Polling method: max, skew, tiles or kmeans
    #[arg(short, long, default_value = "kmeans")]
    method: String,

    /// Directory to write the output JSON into
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,

    /// Suffix appended to the sample ID in the output filename
    #[arg(long, default_value = "decomposed")]
    suffix: String,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    let method = PollMethod::parse(&cli.method);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&[
                "⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏",
            ])
            .template("{spinner:.green} {msg}")
            .expect("Invalid spinner template"),
    );
    spinner.set_message(format!(
        "Analysing {} (threshold {}, method {method})...",
        cli.report.display(),
        cli.threshold
    ));

    let results = match analyze_report(&cli.report, cli.threshold, method) {
        Ok(results) => results,
        Err(err) => {
            spinner.finish_and_clear();
            log::error!("analysis failed: {err}");
            eprintln!("kraken2ref-rs: {err}");
            return ExitCode::FAILURE;
        }
    };

    spinner.finish_with_message(format!(
        "Analysed {} root tree(s), selected {} reference(s).",
        results.trees.len(),
        results.selections.len()
    ));

    for diagnostics in &results.trees {
        log::info!(
            "tree rooted at row {} (taxid {}): {} simple sub-tree(s)",
            diagnostics.root.row,
            diagnostics.root_taxid,
            diagnostics.simple_trees
        );
    }

    let path = output_path(&cli.out_dir, &cli.sample_id, &cli.suffix);
    let metadata = RunMetadata::new(&cli.sample_id, cli.threshold);
    if let Err(err) = write_json(&path, metadata, &results.selections) {
        log::error!("could not write {}: {err}", path.display());
        eprintln!("kraken2ref-rs: {err}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
