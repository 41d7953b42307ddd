use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse telemetry JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize)]
pub struct TelemetrySummary {
    pub decisions: DecisionTelemetrySummary,
    pub simulation: SimulationTelemetrySummary,
}

#[derive(Debug, Default, Serialize)]
pub struct DecisionTelemetrySummary {
    pub count: usize,
    pub avg_guess_confidence: Option<f64>,
    pub avg_question_candidates: Option<f64>,
    pub policy_counts: BTreeMap<String, usize>,
    pub action_counts: BTreeMap<String, usize>,
    pub reason_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Default, Serialize)]
pub struct SimulationTelemetrySummary {
    pub evaluations: usize,
    pub protocol_violations: usize,
    pub external_warnings: usize,
}

#[derive(Debug)]
struct Average {
    sum: f64,
    count: usize,
}

impl Average {
    fn new() -> Self {
        Self { sum: 0.0, count: 0 }
    }

    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}

/// Aggregate decision and simulation events from a JSON telemetry log.
pub fn summarise_telemetry(path: &Path) -> Result<TelemetrySummary, TelemetryError> {
    if !path.exists() {
        return Ok(TelemetrySummary::default());
    }

    let file = File::open(path).map_err(|source| TelemetryError::Io {
        context: "opening telemetry log",
        source,
    })?;
    let reader = BufReader::new(file);

    let mut decisions = DecisionTelemetrySummary::default();
    let mut confidence_avg = Average::new();
    let mut candidate_avg = Average::new();
    let mut simulation = SimulationTelemetrySummary::default();

    for line in reader.lines() {
        let line = line.map_err(|source| TelemetryError::Io {
            context: "reading telemetry line",
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }

        let payload: Value = serde_json::from_str(&line)?;
        let target = payload
            .get("target")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let level = payload
            .get("level")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let fields = payload
            .get("fields")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        match target {
            "guess_bot::decision" => {
                decisions.count += 1;
                let action = label(&fields, "action");
                bump(&mut decisions.policy_counts, label(&fields, "policy"));
                bump(&mut decisions.action_counts, action);
                bump(&mut decisions.reason_counts, label(&fields, "reason"));

                match action {
                    "guess" => {
                        if let Some(confidence) = fields.get("confidence").and_then(Value::as_f64)
                        {
                            confidence_avg.add(confidence);
                        }
                    }
                    "question" => {
                        if let Some(count) = fields.get("candidates").and_then(Value::as_u64) {
                            candidate_avg.add(count as f64);
                        }
                    }
                    _ => {}
                }
            }
            "guess_bench::quality" => simulation.evaluations += 1,
            "guess_bench::simulation" if level.eq_ignore_ascii_case("warn") => {
                simulation.protocol_violations += 1;
            }
            "guess_bench::external" if level.eq_ignore_ascii_case("warn") => {
                simulation.external_warnings += 1;
            }
            _ => {}
        }
    }

    decisions.avg_guess_confidence = confidence_avg.mean();
    decisions.avg_question_candidates = candidate_avg.mean();

    Ok(TelemetrySummary {
        decisions,
        simulation,
    })
}

fn label<'a>(fields: &'a Map<String, Value>, key: &str) -> &'a str {
    fields
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("<unset>")
}

fn bump(counts: &mut BTreeMap<String, usize>, key: &str) {
    *counts.entry(key.to_string()).or_insert(0) += 1;
}

pub fn write_summary_outputs(
    telemetry_path: &Path,
    output_dir: &Path,
) -> Result<Option<TelemetryOutputs>, TelemetryError> {
    if !telemetry_path.exists() {
        return Ok(None);
    }

    let summary = summarise_telemetry(telemetry_path)?;
    let json_path = output_dir.join("telemetry_summary.json");
    let md_path = output_dir.join("telemetry_summary.md");

    std::fs::write(
        &json_path,
        serde_json::to_vec_pretty(&summary).map_err(TelemetryError::from)?,
    )
    .map_err(|source| TelemetryError::Io {
        context: "writing telemetry summary json",
        source,
    })?;

    let markdown = render_markdown(&summary, telemetry_path);
    std::fs::write(&md_path, markdown).map_err(|source| TelemetryError::Io {
        context: "writing telemetry summary markdown",
        source,
    })?;

    Ok(Some(TelemetryOutputs {
        summary,
        json_path,
        markdown_path: md_path,
    }))
}

pub fn append_highlights_to_markdown(
    summary_path: &Path,
    outputs: &TelemetryOutputs,
) -> Result<(), TelemetryError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(summary_path)
        .map_err(|source| TelemetryError::Io {
            context: "opening summary markdown for telemetry append",
            source,
        })?;

    let decisions = &outputs.summary.decisions;
    let simulation = &outputs.summary.simulation;
    let mut section = String::new();
    section.push_str("\n## Telemetry Highlights\n");
    section.push_str(&format!("- Decision events captured: {}\n", decisions.count));
    if let Some(value) = decisions.avg_guess_confidence {
        section.push_str(&format!("- Avg guess confidence: {:.3}\n", value));
    }
    if let Some(value) = decisions.avg_question_candidates {
        section.push_str(&format!("- Avg candidates when asking: {:.2}\n", value));
    }
    section.push_str(&format!(
        "- Protocol violations: {}\n",
        simulation.protocol_violations
    ));
    if simulation.external_warnings > 0 {
        section.push_str(&format!(
            "- External decider warnings: {}\n",
            simulation.external_warnings
        ));
    }

    section.push_str("\n### Decision Reasons\n");
    if decisions.reason_counts.is_empty() {
        section.push_str("- <none>\n");
    } else {
        for (label, count) in &decisions.reason_counts {
            section.push_str(&format!("- {}: {}\n", label, count));
        }
    }

    write!(file, "{section}").map_err(|source| TelemetryError::Io {
        context: "writing telemetry highlights",
        source,
    })?;

    Ok(())
}

fn render_markdown(summary: &TelemetrySummary, telemetry_path: &Path) -> String {
    let mut output = String::new();
    output.push_str("# Telemetry Summary\n\n");
    output.push_str(&format!("- Source: `{}`\n", telemetry_path.display()));
    output.push('\n');

    let decisions = &summary.decisions;
    output.push_str("## Decisions\n");
    output.push_str(&format!("- Events: {}\n", decisions.count));
    if let Some(value) = decisions.avg_guess_confidence {
        output.push_str(&format!("- Avg guess confidence: {:.3}\n", value));
    }
    if let Some(value) = decisions.avg_question_candidates {
        output.push_str(&format!("- Avg candidates when asking: {:.2}\n", value));
    }
    for (title, counts) in [
        ("Policies", &decisions.policy_counts),
        ("Actions", &decisions.action_counts),
        ("Reasons", &decisions.reason_counts),
    ] {
        if counts.is_empty() {
            continue;
        }
        output.push_str(&format!("- {title}:\n"));
        for (label, count) in counts {
            output.push_str(&format!("  - {}: {}\n", label, count));
        }
    }
    output.push('\n');

    let simulation = &summary.simulation;
    output.push_str("## Simulation\n");
    output.push_str(&format!("- Evaluations: {}\n", simulation.evaluations));
    output.push_str(&format!(
        "- Protocol violations: {}\n",
        simulation.protocol_violations
    ));
    output.push_str(&format!(
        "- External decider warnings: {}\n",
        simulation.external_warnings
    ));
    output
}

#[derive(Debug)]
pub struct TelemetryOutputs {
    pub summary: TelemetrySummary,
    pub json_path: PathBuf,
    pub markdown_path: PathBuf,
}
