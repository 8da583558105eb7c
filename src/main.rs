// Entry point and high-level CLI flow.
//
// Each subcommand runs one stage against snapshots in the data directory;
// `run` runs them all. After a stage finishes we print a short summary,
// optionally preview its output, and write `run_summary.json` next to the
// snapshots in the data directory.
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use survey_imputation::config::PipelineConfig;
use survey_imputation::logging::init_logging;
use survey_imputation::methods::LocalInvoker;
use survey_imputation::output;
use survey_imputation::pipeline::{LogNotifier, Pipeline};
use survey_imputation::storage::{FileStore, TableStore};
use survey_imputation::types::{ApplyReport, StageReport};
use survey_imputation::util::format_int;
use tracing::error;

const SUMMARY_FILE: &str = "run_summary.json";

#[derive(Parser)]
#[command(name = "survey_imputation")]
#[command(about = "Impute missing survey returns from banded period-on-period movement")]
#[command(version = "0.1.0")]
struct Cli {
    /// Pipeline configuration (TOML)
    #[arg(long, default_value = "imputation.toml")]
    config: PathBuf,
    /// Directory holding the input and output snapshots
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,
    /// Print the first N rows of each stage's output
    #[arg(long, default_value_t = 0)]
    preview: usize,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Movement between current and previous period
    Movement,
    /// Mean movement per cell
    Means,
    /// Banded imputation factors per cell
    Factors,
    /// Impute non-responders and merge with responders
    Apply,
    /// Add atypical flag columns
    Atypicals,
    /// All stages in order
    Run,
}

#[derive(Serialize)]
struct RunSummary {
    completed_at: DateTime<Utc>,
    stages: Vec<StageReport>,
    apply: Option<ApplyReport>,
}

fn print_stage(report: &StageReport) {
    println!(
        "{}: {} rows in, {} rows out -> {}",
        report.stage,
        format_int(report.input_rows),
        format_int(report.output_rows),
        report.output_key
    );
}

fn print_apply(report: &ApplyReport) {
    println!(
        "Non-responders: {} ({} exact, {} regionless fallback)",
        format_int(report.non_responders),
        format_int(report.matches.exact),
        format_int(report.matches.fallback)
    );
    if report.matches.duplicated > 0 {
        println!(
            "Note: {} extra rows from non-responders matching several regionless factor rows.",
            format_int(report.matches.duplicated)
        );
    }
    if report.without_previous > 0 || report.matches.unmatched > 0 {
        println!(
            "Note: {} rows had no previous period return and {} rows had no factor; both were left out.",
            format_int(report.without_previous),
            format_int(report.matches.unmatched)
        );
    }
}

fn summary_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SUMMARY_FILE)
}

fn execute(cli: &Cli) -> survey_imputation::Result<()> {
    let config = PipelineConfig::load(&cli.config)?;
    let store = FileStore::new(&cli.data_dir);
    let pipeline = Pipeline::new(&config, &store, &LocalInvoker, &LogNotifier);

    let (stages, apply) = match cli.command {
        Commands::Movement => (vec![pipeline.movement()?], None),
        Commands::Means => (vec![pipeline.means()?], None),
        Commands::Factors => (vec![pipeline.factors()?], None),
        Commands::Apply => {
            let (stage, apply) = pipeline.apply()?;
            (vec![stage], Some(apply))
        }
        Commands::Atypicals => (vec![pipeline.atypicals()?], None),
        Commands::Run => {
            let run = pipeline.run()?;
            (run.stages, Some(run.apply))
        }
    };

    for stage in &stages {
        print_stage(stage);
        if cli.preview > 0 {
            output::preview_table_rows(&store.read_table(&stage.output_key)?, cli.preview);
        }
    }
    if let Some(apply) = &apply {
        print_apply(apply);
    }

    let summary = RunSummary {
        completed_at: Utc::now(),
        stages,
        apply,
    };
    output::write_json(summary_path(&cli.data_dir), &summary)
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();
    match execute(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_lands_in_the_data_directory() {
        let cli = Cli::parse_from(["survey_imputation", "--data-dir", "/data/2018-09", "run"]);
        assert_eq!(
            summary_path(&cli.data_dir),
            PathBuf::from("/data/2018-09/run_summary.json")
        );
    }
}
