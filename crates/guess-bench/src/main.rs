use std::path::PathBuf;

use clap::Parser;

use guess_bench::config::{BenchmarkConfig, ResolvedOutputs};
use guess_bench::logging::init_logging;
use guess_bench::quality::{QualityReport, QualityRunner};
use guess_core::model::difficulty::Difficulty;

/// Quality harness for twenty-questions decision policies.
#[derive(Debug, Parser)]
#[command(
    name = "guess-bench",
    author,
    version,
    about = "Exhaustive quality evaluation of guessing policies"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "bench/bench.yaml")]
    config: PathBuf,

    /// Override the run identifier (substitutes {run_id} templates).
    #[arg(long, value_name = "RUN_ID")]
    run_id: Option<String>,

    /// Override the knowledge base JSON file.
    #[arg(long, value_name = "FILE")]
    kb: Option<PathBuf>,

    /// Restrict the run to these themes (repeatable).
    #[arg(long, value_name = "THEME")]
    theme: Vec<String>,

    /// Restrict the run to these difficulties (repeatable).
    #[arg(long, value_name = "LEVEL")]
    difficulty: Vec<Difficulty>,

    /// Override the per-game loop cap.
    #[arg(long, value_name = "STEPS")]
    max_steps: Option<usize>,

    /// Exit after validating the configuration (no simulation is run).
    #[arg(long)]
    validate_only: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = BenchmarkConfig::from_path(&cli.config)?;

    if let Some(run_id) = cli.run_id {
        config.run_id = run_id;
    }

    if let Some(kb) = cli.kb {
        config.knowledge_base = kb;
    }

    if !cli.theme.is_empty() {
        config.simulation.themes = cli.theme;
    }

    if !cli.difficulty.is_empty() {
        config.simulation.difficulties = cli.difficulty;
    }

    if let Some(max_steps) = cli.max_steps {
        config.simulation.max_steps = max_steps;
    }

    config.validate()?;

    let outputs: ResolvedOutputs = config.resolved_outputs();
    let agent_count = config.agents.len();
    let run_id = config.run_id.clone();

    println!(
        "Loaded configuration '{run_id}' with {agent_count} agent{} (max {} steps per game)",
        if agent_count == 1 { "" } else { "s" },
        config.simulation.max_steps
    );

    let _logging_guard = init_logging(&config.logging, &outputs, &run_id)?;
    let runner = QualityRunner::new(config, outputs)?;
    println!(
        "Knowledge base: {} items, {} features; themes: {}",
        runner.knowledge().items().len(),
        runner.knowledge().features().len(),
        runner.themes().join(", ")
    );

    if cli.validate_only {
        println!("Validation-only mode: simulation skipped.");
        return Ok(());
    }

    let summary = runner.run()?;

    let mut current: Option<Difficulty> = None;
    for report in &summary.reports {
        if current != Some(report.stats.difficulty) {
            current = Some(report.stats.difficulty);
            println!("\n=== difficulty: {} ===", report.stats.difficulty);
        }
        println!("{}", report_line(report));
    }

    println!(
        "\nQuality run complete for '{run_id}': {} evaluations → {} rows at {}",
        summary.evaluations,
        summary.rows_written,
        summary.jsonl_path.display()
    );
    println!("Summary table: {}", summary.summary_path.display());
    if let Some(plot_path) = summary.plot_path.as_ref() {
        println!("Score plot: {}", plot_path.display());
    }
    if let Some(telemetry_path) = summary.telemetry_path.as_ref() {
        println!("Telemetry log: {}", telemetry_path.display());
    }
    if let Some(outputs) = summary.telemetry_outputs.as_ref() {
        println!("Telemetry summary (JSON): {}", outputs.json_path.display());
        println!(
            "Telemetry summary (Markdown): {}",
            outputs.markdown_path.display()
        );
        let decisions = &outputs.summary.decisions;
        match decisions.avg_guess_confidence {
            Some(confidence) => println!(
                "  Decisions: {} events, avg guess confidence {:.3}",
                decisions.count, confidence
            ),
            None => println!("  Decisions: {} events captured", decisions.count),
        }
        if !decisions.reason_counts.is_empty() {
            println!("  Reasons: {:?}", decisions.reason_counts);
        }
    }

    Ok(())
}

fn report_line(report: &QualityReport) -> String {
    let stats = &report.stats;
    format!(
        "- agent={:<16} theme={:<10} items={:>3} avg={:>5.2} p90={:>2} max={:>2} score={:>5.2}/20",
        report.agent,
        stats.theme,
        stats.items,
        stats.avg_steps,
        stats.p90_steps,
        stats.max_steps,
        stats.score
    )
}
