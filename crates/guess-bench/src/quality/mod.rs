mod external;
pub mod oracle;

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use guess_bot::bot::{BotParams, PolicyKind};
use guess_bot::policy::Policy;
use guess_core::model::difficulty::Difficulty;
use guess_core::model::knowledge::{KnowledgeBase, KnowledgeError};
use rayon::prelude::*;
use serde::Serialize;
use statrs::statistics::Statistics;
use thiserror::Error;
use tracing::{Level, event};

use crate::analytics::{AnalyticsCollector, AnalyticsError};
use crate::config::{AgentConfig, AgentKind, BenchmarkConfig, ResolvedOutputs};
use crate::telemetry::{
    TelemetryError, TelemetryOutputs, append_highlights_to_markdown, write_summary_outputs,
};
use external::ExternalPolicy;
use oracle::{GameTrace, OracleError, simulate};

/// Maximum per-item score.
pub const MAX_SCORE: f64 = 20.0;

/// Aggregate quality of one policy over one theme at one difficulty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityStats {
    pub theme: String,
    pub difficulty: Difficulty,
    pub items: usize,
    pub successes: usize,
    pub avg_steps: f64,
    pub p90_steps: u32,
    pub max_steps: u32,
    pub std_dev_steps: f64,
    #[serde(rename = "score_0to20")]
    pub score: f64,
}

impl QualityStats {
    pub fn from_traces(theme: &str, difficulty: Difficulty, traces: &[GameTrace]) -> Self {
        let items = traces.len();
        let mut stats = QualityStats {
            theme: theme.to_string(),
            difficulty,
            items,
            successes: traces.iter().filter(|trace| trace.success).count(),
            avg_steps: 0.0,
            p90_steps: 0,
            max_steps: 0,
            std_dev_steps: 0.0,
            score: 0.0,
        };
        if items == 0 {
            return stats;
        }

        let mut steps: Vec<u32> = traces.iter().map(GameTrace::scored_steps).collect();
        steps.sort_unstable();
        let samples: Vec<f64> = steps.iter().map(|&s| f64::from(s)).collect();

        stats.avg_steps = samples.iter().sum::<f64>() / items as f64;
        stats.p90_steps = nearest_rank(&steps, 90);
        stats.max_steps = steps.last().copied().unwrap_or(0);
        if items > 1 {
            stats.std_dev_steps = samples.iter().std_dev();
        }
        stats.score = steps
            .iter()
            .map(|&s| item_score(items, s))
            .sum::<f64>()
            / items as f64;
        stats
    }
}

/// `clamp(log2(items) / max(1, steps), 0, 1) × 20`; a single-item theme always scores 20.
pub fn item_score(items: usize, steps: u32) -> f64 {
    if items <= 1 {
        return MAX_SCORE;
    }
    let ideal = (items as f64).log2();
    (ideal / f64::from(steps.max(1))).clamp(0.0, 1.0) * MAX_SCORE
}

/// Nearest-rank percentile over an ascending list: index `ceil(p/100 · N) − 1`.
fn nearest_rank(sorted: &[u32], percent: usize) -> u32 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (sorted.len() * percent).div_ceil(100);
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Per-target traces plus their aggregate.
#[derive(Debug, Clone)]
pub struct QualityEvaluation {
    pub stats: QualityStats,
    pub traces: Vec<GameTrace>,
}

/// Simulate every item of `theme` as the target, in parallel.
///
/// Traces come back in knowledge-base order regardless of scheduling.
pub fn evaluate_policy(
    policy: &dyn Policy,
    knowledge: &KnowledgeBase,
    theme: &str,
    difficulty: Difficulty,
    max_steps: usize,
) -> Result<QualityEvaluation, OracleError> {
    let targets = knowledge.theme_item_ids(theme);
    let traces = targets
        .par_iter()
        .map(|target| simulate(policy, knowledge, theme, difficulty, target, max_steps))
        .collect::<Result<Vec<_>, _>>()?;
    let stats = QualityStats::from_traces(theme, difficulty, &traces);

    if tracing::enabled!(Level::INFO) {
        event!(
            target: "guess_bench::quality",
            Level::INFO,
            policy = policy.name(),
            theme,
            difficulty = difficulty.as_str(),
            items = stats.items,
            successes = stats.successes,
            avg_steps = stats.avg_steps,
            p90_steps = stats.p90_steps,
            max_steps = stats.max_steps,
            score = stats.score,
        );
    }

    Ok(QualityEvaluation { stats, traces })
}

/// Primary entry point for a configured benchmark run.
pub struct QualityRunner {
    config: BenchmarkConfig,
    outputs: ResolvedOutputs,
    knowledge: KnowledgeBase,
    themes: Vec<String>,
    agents: Vec<AgentBlueprint>,
    logging_enabled: bool,
}

/// One printed report line.
#[derive(Debug, Clone)]
pub struct QualityReport {
    pub agent: String,
    pub stats: QualityStats,
}

/// Summary details returned after a run.
pub struct RunSummary {
    pub evaluations: usize,
    pub rows_written: usize,
    pub reports: Vec<QualityReport>,
    pub jsonl_path: PathBuf,
    pub summary_path: PathBuf,
    pub plot_path: Option<PathBuf>,
    pub telemetry_path: Option<PathBuf>,
    pub telemetry_outputs: Option<TelemetryOutputs>,
}

impl QualityRunner {
    /// Build a runner from a validated configuration, loading the knowledge base.
    pub fn new(config: BenchmarkConfig, outputs: ResolvedOutputs) -> Result<Self, RunnerError> {
        let knowledge = KnowledgeBase::from_path(&config.knowledge_base)?;
        Self::with_knowledge(config, outputs, knowledge)
    }

    pub fn with_knowledge(
        config: BenchmarkConfig,
        outputs: ResolvedOutputs,
        knowledge: KnowledgeBase,
    ) -> Result<Self, RunnerError> {
        let agents = AgentBlueprint::from_configs(&config.agents)?;

        let available = knowledge.theme_keys();
        let themes = if config.simulation.themes.is_empty() {
            available
        } else {
            if let Some(missing) = config
                .simulation
                .themes
                .iter()
                .find(|theme| !available.contains(theme))
            {
                return Err(RunnerError::UnknownTheme {
                    theme: missing.clone(),
                });
            }
            config.simulation.themes.clone()
        };
        if themes.is_empty() {
            return Err(RunnerError::NoThemes);
        }

        Ok(Self {
            logging_enabled: config.logging.enable_structured,
            config,
            outputs,
            knowledge,
            themes,
            agents,
        })
    }

    pub fn themes(&self) -> &[String] {
        &self.themes
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    /// Evaluate every agent on every difficulty × theme, streaming JSONL rows to disk.
    pub fn run(&self) -> Result<RunSummary, RunnerError> {
        ensure_parent(self.outputs.jsonl.parent())?;
        ensure_parent(self.outputs.summary_md.parent())?;
        if !self.outputs.plots_dir.as_os_str().is_empty() {
            fs::create_dir_all(&self.outputs.plots_dir)?;
        }

        let mut writer = BufWriter::new(File::create(&self.outputs.jsonl)?);
        let mut analytics = AnalyticsCollector::new(&self.config)?;
        let policies: Vec<(&str, Box<dyn Policy>)> = self
            .agents
            .iter()
            .map(|agent| (agent.name.as_str(), agent.spawn_policy()))
            .collect();
        let max_steps = self.config.simulation.max_steps;
        let mut rows_written = 0usize;
        let mut reports = Vec::new();

        for &difficulty in &self.config.simulation.difficulties {
            for theme in &self.themes {
                for (name, policy) in &policies {
                    let evaluation = evaluate_policy(
                        policy.as_ref(),
                        &self.knowledge,
                        theme,
                        difficulty,
                        max_steps,
                    )?;
                    rows_written +=
                        write_target_rows(&mut writer, &self.config.run_id, name, &evaluation)?;
                    analytics.record(name, &evaluation)?;
                    reports.push(QualityReport {
                        agent: name.to_string(),
                        stats: evaluation.stats,
                    });
                }
            }
        }

        writer.flush()?;

        let summary = analytics.finalize()?;
        summary.write_markdown(&self.outputs.summary_md)?;
        let plot_path = match summary.render_plot(&self.outputs.plots_dir) {
            Ok(path) => Some(path),
            Err(err) => {
                event!(
                    target: "guess_bench::quality",
                    Level::WARN,
                    error = %err,
                    "skipping score plot"
                );
                None
            }
        };

        let telemetry_dir = self.outputs.summary_dir();
        let telemetry_path = self
            .logging_enabled
            .then(|| telemetry_dir.join("telemetry.jsonl"));

        let telemetry_outputs = match telemetry_path.as_ref() {
            Some(path) => write_summary_outputs(path, &telemetry_dir)?,
            None => None,
        };

        if let Some(outputs) = telemetry_outputs.as_ref() {
            append_highlights_to_markdown(&self.outputs.summary_md, outputs)?;
        }

        Ok(RunSummary {
            evaluations: reports.len(),
            rows_written,
            reports,
            jsonl_path: self.outputs.jsonl.clone(),
            summary_path: self.outputs.summary_md.clone(),
            plot_path,
            telemetry_path,
            telemetry_outputs,
        })
    }
}

fn ensure_parent(path: Option<&Path>) -> Result<(), RunnerError> {
    if let Some(dir) = path.filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

fn write_target_rows(
    writer: &mut BufWriter<File>,
    run_id: &str,
    agent: &str,
    evaluation: &QualityEvaluation,
) -> Result<usize, RunnerError> {
    let stats = &evaluation.stats;
    for trace in &evaluation.traces {
        let row = TargetLogRow {
            run_id,
            agent,
            theme: &stats.theme,
            difficulty: stats.difficulty,
            target: &trace.target,
            success: trace.success,
            steps: trace.steps,
            scored_steps: trace.scored_steps(),
            failure: trace.failure.as_ref().map(failure_label),
        };
        serde_json::to_writer(&mut *writer, &row)?;
        writer.write_all(b"\n")?;
    }
    Ok(evaluation.traces.len())
}

fn failure_label(reason: &oracle::FailureReason) -> &'static str {
    match reason {
        oracle::FailureReason::Done { .. } => "done",
        oracle::FailureReason::Exhausted { .. } => "exhausted",
        oracle::FailureReason::StepLimit { .. } => "step_limit",
        oracle::FailureReason::Integrity { .. } => "integrity",
    }
}

#[derive(Serialize)]
struct TargetLogRow<'a> {
    run_id: &'a str,
    agent: &'a str,
    theme: &'a str,
    difficulty: Difficulty,
    target: &'a str,
    success: bool,
    steps: u32,
    scored_steps: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<&'static str>,
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("{0}")]
    Agent(#[from] AgentError),
    #[error("failed to load knowledge base: {0}")]
    Knowledge(#[from] KnowledgeError),
    #[error("theme '{theme}' is not present in the knowledge base")]
    UnknownTheme { theme: String },
    #[error("knowledge base defines no themes")]
    NoThemes,
    #[error("simulation failed: {0}")]
    Oracle(#[from] OracleError),
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("failed to serialize log row: {source}")]
    Serialize {
        #[from]
        source: serde_json::Error,
    },
    #[error("analytics error: {0}")]
    Analytics(#[from] AnalyticsError),
    #[error("telemetry summarisation failed: {0}")]
    Telemetry(#[from] TelemetryError),
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid built-in parameter for agent '{name}': {message}")]
    InvalidBuiltinParam { name: String, message: String },
    #[error("invalid external parameter for agent '{name}': {message}")]
    InvalidExternalParam { name: String, message: String },
}

struct AgentBlueprint {
    name: String,
    implementation: AgentImplementation,
}

enum AgentImplementation {
    Builtin(BuiltinOptions),
    External(ExternalOptions),
}

impl AgentBlueprint {
    fn from_configs(configs: &[AgentConfig]) -> Result<Vec<Self>, AgentError> {
        configs.iter().map(Self::from_config).collect()
    }

    fn from_config(config: &AgentConfig) -> Result<Self, AgentError> {
        let implementation = match config.kind {
            AgentKind::BalancedStrict => AgentImplementation::Builtin(BuiltinOptions::from_params(
                &config.name,
                PolicyKind::BalancedStrict,
                &config.params,
            )?),
            AgentKind::Minimax => AgentImplementation::Builtin(BuiltinOptions::from_params(
                &config.name,
                PolicyKind::Minimax,
                &config.params,
            )?),
            AgentKind::External => AgentImplementation::External(ExternalOptions::from_params(
                &config.name,
                &config.params,
            )?),
        };

        Ok(Self {
            name: config.name.clone(),
            implementation,
        })
    }

    fn spawn_policy(&self) -> Box<dyn Policy> {
        match &self.implementation {
            AgentImplementation::Builtin(opts) => opts.kind.spawn_with(opts.params),
            AgentImplementation::External(opts) => opts.spawn_policy(&self.name),
        }
    }
}

/// Built-in strategy with optional overrides of its tuned constants.
struct BuiltinOptions {
    kind: PolicyKind,
    params: BotParams,
}

impl BuiltinOptions {
    fn from_params(
        name: &str,
        kind: PolicyKind,
        params: &serde_yaml::Value,
    ) -> Result<Self, AgentError> {
        let mut options = Self {
            kind,
            params: kind.params(),
        };
        if params.is_null() {
            return Ok(options);
        }

        let invalid = |message: String| AgentError::InvalidBuiltinParam {
            name: name.to_string(),
            message,
        };
        let mapping = params
            .as_mapping()
            .ok_or_else(|| invalid("expected mapping for built-in params".to_string()))?;

        for (key, value) in mapping {
            let key = key
                .as_str()
                .ok_or_else(|| invalid("parameter names must be strings".to_string()))?;
            let number = || {
                value
                    .as_f64()
                    .ok_or_else(|| invalid(format!("{key} must be a number")))
            };
            let step = || {
                value
                    .as_u64()
                    .and_then(|v| u32::try_from(v).ok())
                    .ok_or_else(|| invalid(format!("{key} must be a non-negative integer")))
            };
            match key {
                "confidence_base" => options.params.confidence.base = number()?,
                "confidence_slope" => options.params.confidence.slope = number()?,
                "confidence_floor" => options.params.guess.confidence_floor = number()?,
                "pair_min_step" => options.params.guess.pair_min_step = step()?,
                "confident_min_step" => options.params.guess.confident_min_step = step()?,
                other => return Err(invalid(format!("unknown parameter '{other}'"))),
            }
        }

        Ok(options)
    }
}

#[derive(Clone, Copy)]
pub(super) enum ExternalFallback {
    Builtin(PolicyKind),
    Error,
}

#[derive(Clone)]
pub(super) struct ExternalOptions {
    pub(super) command: Option<String>,
    pub(super) args: Vec<String>,
    pub(super) working_dir: Option<PathBuf>,
    pub(super) timeout_ms: Option<u64>,
    pub(super) fallback: ExternalFallback,
}

impl ExternalOptions {
    fn from_params(name: &str, params: &serde_yaml::Value) -> Result<Self, AgentError> {
        let mut options = Self {
            command: None,
            args: Vec::new(),
            working_dir: None,
            timeout_ms: None,
            fallback: ExternalFallback::Builtin(PolicyKind::from_env()),
        };

        if params.is_null() {
            return Ok(options);
        }

        let mapping = params
            .as_mapping()
            .ok_or_else(|| AgentError::InvalidExternalParam {
                name: name.to_string(),
                message: "expected mapping for external params".to_string(),
            })?;

        for (key, value) in mapping {
            match key.as_str() {
                Some("command") => {
                    options.command = value.as_str().map(|s| s.to_string());
                    if options.command.is_none() {
                        return Err(AgentError::InvalidExternalParam {
                            name: name.to_string(),
                            message: "command must be a string".to_string(),
                        });
                    }
                }
                Some("args") => {
                    if let Some(seq) = value.as_sequence() {
                        options.args = seq
                            .iter()
                            .filter_map(|v| v.as_str().map(|s| s.to_string()))
                            .collect();
                    } else {
                        return Err(AgentError::InvalidExternalParam {
                            name: name.to_string(),
                            message: "args must be an array of strings".to_string(),
                        });
                    }
                }
                Some("working_dir") => {
                    options.working_dir = value.as_str().map(PathBuf::from);
                }
                Some("timeout_ms") => {
                    options.timeout_ms = value.as_u64();
                }
                Some("fallback") => {
                    let Some(fallback) = value.as_str() else {
                        return Err(AgentError::InvalidExternalParam {
                            name: name.to_string(),
                            message: "fallback must be a string".to_string(),
                        });
                    };
                    options.fallback = match fallback.to_ascii_lowercase().as_str() {
                        "error" | "none" => ExternalFallback::Error,
                        other => other.parse().map(ExternalFallback::Builtin).map_err(
                            |message: String| AgentError::InvalidExternalParam {
                                name: name.to_string(),
                                message,
                            },
                        )?,
                    };
                }
                _ => {}
            }
        }

        Ok(options)
    }

    fn spawn_policy(&self, name: &str) -> Box<dyn Policy> {
        Box::new(ExternalPolicy::new(name.to_string(), self.clone()))
    }
}
