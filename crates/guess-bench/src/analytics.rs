use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use guess_core::model::difficulty::Difficulty;
use plotters::prelude::*;
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};
use thiserror::Error;

use crate::config::{AgentKind, BenchmarkConfig};
use crate::quality::{MAX_SCORE, QualityEvaluation, QualityStats, item_score};

const CONFIDENCE_Z: f64 = 1.96; // 95% CI

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("baseline agent '{0}' not present in quality results")]
    MissingBaseline(String),
    #[error("agent '{0}' defined in results but missing from configuration")]
    UnknownAgent(String),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to render plot: {0}")]
    Plot(String),
}

/// Identifies one simulated game across agents.
type TargetKey = (Difficulty, String, String);

pub struct AnalyticsCollector {
    baseline: String,
    agents: HashMap<String, AgentAccumulator>,
    agent_order: Vec<String>,
    rows: Vec<QualityRow>,
}

impl AnalyticsCollector {
    pub fn new(config: &BenchmarkConfig) -> Result<Self, AnalyticsError> {
        let baseline = config
            .baseline()
            .map(str::to_string)
            .ok_or_else(|| AnalyticsError::MissingBaseline("<unset>".into()))?;

        let mut agents = HashMap::new();
        let mut order = Vec::new();
        for agent in &config.agents {
            agents.insert(
                agent.name.clone(),
                AgentAccumulator::new(agent.name.clone(), agent.kind),
            );
            order.push(agent.name.clone());
        }

        Ok(Self {
            baseline,
            agents,
            agent_order: order,
            rows: Vec::new(),
        })
    }

    pub fn record(
        &mut self,
        agent: &str,
        evaluation: &QualityEvaluation,
    ) -> Result<(), AnalyticsError> {
        let acc = self
            .agents
            .get_mut(agent)
            .ok_or_else(|| AnalyticsError::UnknownAgent(agent.to_string()))?;

        let stats = &evaluation.stats;
        for trace in &evaluation.traces {
            let steps = trace.scored_steps();
            acc.record_target(
                (stats.difficulty, stats.theme.clone(), trace.target.clone()),
                steps,
                trace.success,
                item_score(stats.items, steps),
            );
        }
        acc.evaluations += 1;

        self.rows.push(QualityRow {
            agent: agent.to_string(),
            stats: stats.clone(),
        });
        Ok(())
    }

    pub fn finalize(mut self) -> Result<AnalyticsSummary, AnalyticsError> {
        let baseline_steps = self
            .agents
            .get(&self.baseline)
            .map(|acc| acc.per_target.clone())
            .ok_or_else(|| AnalyticsError::MissingBaseline(self.baseline.clone()))?;

        let mut reports = Vec::new();
        let mut comparisons = Vec::new();
        for name in &self.agent_order {
            let Some(acc) = self.agents.remove(name) else {
                continue;
            };

            if *name == self.baseline {
                comparisons.push(ComparisonReport {
                    agent: name.clone(),
                    p_value: 1.0,
                    sample_size: acc.per_target.len(),
                });
            } else {
                let mut comparison = ComparisonAccumulator::new();
                for (key, steps) in &acc.per_target {
                    if let Some(base) = baseline_steps.get(key) {
                        comparison.record(f64::from(*steps) - f64::from(*base));
                    }
                }
                let (p_value, sample_size) = comparison.wilcoxon_signed_rank();
                comparisons.push(ComparisonReport {
                    agent: name.clone(),
                    p_value,
                    sample_size,
                });
            }

            reports.push(acc.into_report());
        }

        Ok(AnalyticsSummary {
            baseline: self.baseline,
            agents: reports,
            comparisons,
            rows: self.rows,
        }
        .enrich())
    }
}

struct AgentAccumulator {
    name: String,
    kind: AgentKind,
    evaluations: usize,
    successes: usize,
    total_score: f64,
    per_target: HashMap<TargetKey, u32>,
    steps: Vec<f64>,
}

impl AgentAccumulator {
    fn new(name: String, kind: AgentKind) -> Self {
        Self {
            name,
            kind,
            evaluations: 0,
            successes: 0,
            total_score: 0.0,
            per_target: HashMap::new(),
            steps: Vec::new(),
        }
    }

    fn record_target(&mut self, key: TargetKey, steps: u32, success: bool, score: f64) {
        self.per_target.insert(key, steps);
        self.steps.push(f64::from(steps));
        self.total_score += score;
        if success {
            self.successes += 1;
        }
    }

    fn into_report(self) -> AgentReport {
        let games = self.steps.len();
        let (avg_steps, avg_score, success_rate) = if games == 0 {
            (0.0, 0.0, 0.0)
        } else {
            let n = games as f64;
            (
                self.steps.iter().sum::<f64>() / n,
                self.total_score / n,
                self.successes as f64 / n,
            )
        };

        AgentReport {
            name: self.name,
            kind: self.kind,
            evaluations: self.evaluations,
            games,
            success_rate,
            avg_steps,
            ci95: confidence_interval(&self.steps),
            avg_score,
            delta_vs_baseline: 0.0, // Filled later once we know baseline report
        }
    }
}

#[derive(Clone)]
struct ComparisonAccumulator {
    diffs: Vec<f64>,
}

impl ComparisonAccumulator {
    fn new() -> Self {
        Self { diffs: Vec::new() }
    }

    fn record(&mut self, diff: f64) {
        self.diffs.push(diff);
    }

    fn wilcoxon_signed_rank(self) -> (f64, usize) {
        let diffs: Vec<f64> = self
            .diffs
            .into_iter()
            .filter(|d| d.abs() > f64::EPSILON)
            .collect();
        let n = diffs.len();
        if n == 0 {
            return (1.0, 0);
        }

        let mut paired: Vec<(f64, f64)> =
            diffs.into_iter().map(|d| (d.abs(), d.signum())).collect();
        paired.sort_by(|a, b| a.0.total_cmp(&b.0));

        // Rank handling with ties
        let mut ranks = Vec::with_capacity(n);
        let mut tie_sizes = Vec::new();
        let mut i = 0;
        while i < paired.len() {
            let mut j = i;
            while j + 1 < paired.len() && (paired[j + 1].0 - paired[i].0).abs() < 1e-12 {
                j += 1;
            }
            let rank = (i + j + 2) as f64 / 2.0;
            for (_, sign) in &paired[i..=j] {
                ranks.push((rank, *sign));
            }
            if j > i {
                tie_sizes.push(j - i + 1);
            }
            i = j + 1;
        }

        let w_plus: f64 = ranks
            .iter()
            .filter(|(_, sign)| *sign > 0.0)
            .map(|(rank, _)| *rank)
            .sum();
        let w_minus: f64 = ranks
            .iter()
            .filter(|(_, sign)| *sign < 0.0)
            .map(|(rank, _)| *rank)
            .sum();

        let w = w_plus.min(w_minus);
        let n_f = n as f64;
        let mean_w = n_f * (n_f + 1.0) / 4.0;

        // Variance with tie correction
        let tie_adjustment: f64 = tie_sizes
            .into_iter()
            .map(|count| {
                let c = count as f64;
                (c.powi(3) - c) / 48.0
            })
            .sum();
        let variance_w = n_f * (n_f + 1.0) * (2.0 * n_f + 1.0) / 24.0 - tie_adjustment;
        if variance_w <= 0.0 {
            return (1.0, n);
        }

        let Ok(normal) = Normal::new(0.0, 1.0) else {
            return (1.0, n);
        };
        let z = ((w - mean_w).abs() - 0.5) / variance_w.sqrt();
        let p = 2.0 * (1.0 - normal.cdf(z));
        (p.clamp(0.0, 1.0), n)
    }
}

/// One (difficulty, theme, agent) cell of the run.
#[derive(Debug, Clone, Serialize)]
pub struct QualityRow {
    pub agent: String,
    #[serde(flatten)]
    pub stats: QualityStats,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsSummary {
    pub baseline: String,
    pub agents: Vec<AgentReport>,
    pub comparisons: Vec<ComparisonReport>,
    pub rows: Vec<QualityRow>,
}

impl AnalyticsSummary {
    pub fn enrich(mut self) -> Self {
        let baseline_score = self
            .agents
            .iter()
            .find(|agent| agent.name == self.baseline)
            .map(|agent| agent.avg_score)
            .unwrap_or(0.0);

        for agent in &mut self.agents {
            agent.delta_vs_baseline = agent.avg_score - baseline_score;
        }

        self
    }

    pub fn markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("# Quality Summary\n\n");
        out.push_str(&format!("Baseline: `{}`\n\n", self.baseline));
        out.push_str("| Agent | Kind | Games | Success % | Avg steps | 95% CI | Avg score | Δ vs baseline | p-value |\n");
        out.push_str("|-------|------|-------|-----------|-----------|--------|-----------|----------------|---------|\n");

        for agent in &self.agents {
            let comparison = self
                .comparisons
                .iter()
                .find(|c| c.agent == agent.name)
                .map(|c| c.p_value)
                .unwrap_or(1.0);

            out.push_str(&format!(
                "| {name} | {kind:?} | {games} | {success:.1}% | {avg:.2} | [{ci_low:.2}, {ci_high:.2}] | {score:.2} | {delta:+.2} | {pval:.3} |\n",
                name = agent.name,
                kind = agent.kind,
                games = agent.games,
                success = agent.success_rate * 100.0,
                avg = agent.avg_steps,
                ci_low = agent.ci95.0,
                ci_high = agent.ci95.1,
                score = agent.avg_score,
                delta = agent.delta_vs_baseline,
                pval = comparison,
            ));
        }

        out.push_str("\n## Per theme\n\n");
        out.push_str("| Difficulty | Theme | Agent | Items | Solved | Avg steps | p90 | Max | Score/20 |\n");
        out.push_str("|------------|-------|-------|-------|--------|-----------|-----|-----|----------|\n");
        for row in &self.rows {
            let stats = &row.stats;
            out.push_str(&format!(
                "| {difficulty} | {theme} | {agent} | {items} | {solved} | {avg:.2} | {p90} | {max} | {score:.2} |\n",
                difficulty = stats.difficulty,
                theme = stats.theme,
                agent = row.agent,
                items = stats.items,
                solved = stats.successes,
                avg = stats.avg_steps,
                p90 = stats.p90_steps,
                max = stats.max_steps,
                score = stats.score,
            ));
        }
        out
    }

    pub fn write_markdown(&self, path: impl AsRef<Path>) -> Result<(), AnalyticsError> {
        fs::write(path.as_ref(), self.markdown()).map_err(|e| AnalyticsError::Io {
            context: "writing summary markdown",
            source: e,
        })?;
        Ok(())
    }

    pub fn render_plot(&self, dir: impl AsRef<Path>) -> Result<PathBuf, AnalyticsError> {
        let dir = dir.as_ref();
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir).map_err(|e| AnalyticsError::Io {
                context: "creating plots directory",
                source: e,
            })?;
        }

        let output_path = dir.join("avg_score.png");
        let baseline = self.baseline.clone();
        let agents_snapshot = self.agents.clone();

        let prev_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(|_| {}));

        let plot_attempt = std::panic::catch_unwind(move || {
            let root = BitMapBackend::new(&output_path, (800, 480)).into_drawing_area();
            root.fill(&WHITE)
                .map_err(|e| AnalyticsError::Plot(e.to_string()))?;

            let mut agents = agents_snapshot;
            agents.sort_by(|a, b| b.avg_score.total_cmp(&a.avg_score));

            let mut chart = ChartBuilder::on(&root)
                .margin(20)
                .caption("Average score per agent (higher is better)", ("sans-serif", 22))
                .set_label_area_size(LabelAreaPosition::Left, 50)
                .set_label_area_size(LabelAreaPosition::Bottom, 60)
                .build_cartesian_2d(0..agents.len(), 0.0..MAX_SCORE)
                .map_err(|e| AnalyticsError::Plot(e.to_string()))?;

            chart
                .configure_mesh()
                .disable_mesh()
                .y_desc("Score (0-20)")
                .x_desc("Agent")
                .x_label_formatter(&|idx| {
                    agents
                        .get(*idx)
                        .map(|agent| agent.name.clone())
                        .unwrap_or_default()
                })
                .draw()
                .map_err(|e| AnalyticsError::Plot(e.to_string()))?;

            chart
                .draw_series(agents.iter().enumerate().map(|(idx, agent)| {
                    let color = if agent.name == baseline {
                        &BLUE
                    } else if agent.delta_vs_baseline >= 0.0 {
                        &GREEN
                    } else {
                        &RED
                    };
                    Rectangle::new([(idx, 0.0), (idx + 1, agent.avg_score)], color.filled())
                }))
                .map_err(|e| AnalyticsError::Plot(e.to_string()))?;

            drop(chart);

            root.present()
                .map_err(|e| AnalyticsError::Plot(e.to_string()))?;

            drop(root);

            Ok(output_path)
        });

        std::panic::set_hook(prev_hook);

        match plot_attempt {
            Ok(result) => result,
            Err(_) => Err(AnalyticsError::Plot(
                "plotters panicked while rendering (missing font support?)".into(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentReport {
    pub name: String,
    pub kind: AgentKind,
    pub evaluations: usize,
    pub games: usize,
    pub success_rate: f64,
    pub avg_steps: f64,
    pub ci95: (f64, f64),
    pub avg_score: f64,
    #[serde(skip)]
    pub delta_vs_baseline: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub agent: String,
    pub p_value: f64,
    pub sample_size: usize,
}

fn confidence_interval(points: &[f64]) -> (f64, f64) {
    if points.is_empty() {
        return (0.0, 0.0);
    }
    let mean = points.iter().sum::<f64>() / points.len() as f64;
    if points.len() == 1 {
        return (mean, mean);
    }
    let variance = points
        .iter()
        .map(|value| (value - mean).powi(2))
        .sum::<f64>()
        / (points.len() as f64 - 1.0);
    let std_error = (variance / points.len() as f64).sqrt();
    let margin = CONFIDENCE_Z * std_error;
    (mean - margin, mean + margin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::oracle::GameTrace;

    fn config() -> BenchmarkConfig {
        let yaml = r#"
run_id: "analytics"
knowledge_base: "kb.json"
agents:
  - name: "base"
    kind: "balanced_strict"
  - name: "other"
    kind: "minimax"
outputs:
  jsonl: "out/rows.jsonl"
  summary_md: "out/summary.md"
  plots_dir: "out/plots"
"#;
        let mut cfg: BenchmarkConfig = serde_yaml::from_str(yaml).expect("parse");
        cfg.validate().expect("valid");
        cfg
    }

    fn evaluation(steps: &[u32]) -> QualityEvaluation {
        let traces: Vec<GameTrace> = steps
            .iter()
            .enumerate()
            .map(|(idx, &steps)| GameTrace {
                target: format!("item{idx}"),
                success: true,
                steps,
                failure: None,
                history: Vec::new(),
            })
            .collect();
        QualityEvaluation {
            stats: QualityStats::from_traces("animals", Difficulty::Easy, &traces),
            traces,
        }
    }

    #[test]
    fn wilcoxon_detects_consistent_shift() {
        let mut comp = ComparisonAccumulator::new();
        for diff in [1.0, 2.0, 1.5, 3.0, 2.5, 1.0, 2.0, 4.0, 3.5, 2.0, 1.0, 2.5] {
            comp.record(diff);
        }
        let (p, n) = comp.wilcoxon_signed_rank();
        assert_eq!(n, 12);
        assert!(p < 0.01, "p-value {p} should reflect a one-sided shift");

        let (p, n) = ComparisonAccumulator::new().wilcoxon_signed_rank();
        assert_eq!((p, n), (1.0, 0));
    }

    #[test]
    fn summary_pairs_targets_with_baseline() {
        let cfg = config();
        let mut collector = AnalyticsCollector::new(&cfg).unwrap();
        collector.record("base", &evaluation(&[2, 2, 3, 3])).unwrap();
        collector.record("other", &evaluation(&[2, 3, 3, 4])).unwrap();
        assert!(matches!(
            collector.record("ghost", &evaluation(&[1])),
            Err(AnalyticsError::UnknownAgent(_))
        ));

        let summary = collector.finalize().unwrap();
        assert_eq!(summary.baseline, "base");
        assert_eq!(summary.agents.len(), 2);
        assert_eq!(summary.rows.len(), 2);
        assert_eq!(summary.agents[0].delta_vs_baseline, 0.0);
        assert!(summary.agents[1].delta_vs_baseline < 0.0);
        assert_eq!(summary.comparisons[1].sample_size, 2);
        assert!((summary.agents[1].avg_steps - 3.0).abs() < 1e-12);

        let markdown = summary.markdown();
        assert!(markdown.contains("# Quality Summary"));
        assert!(markdown.contains("| easy | animals | other | 4 | 4 |"));
    }

    #[test]
    fn missing_baseline_results_are_an_error() {
        let cfg = config();
        let mut collector = AnalyticsCollector::new(&cfg).unwrap();
        collector.agents.remove("base");
        collector.agent_order.retain(|name| name != "base");
        collector.record("other", &evaluation(&[1, 2])).unwrap();
        assert!(matches!(
            collector.finalize(),
            Err(AnalyticsError::MissingBaseline(name)) if name == "base"
        ));
    }
}
