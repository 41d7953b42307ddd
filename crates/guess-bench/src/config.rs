use guess_core::model::difficulty::Difficulty;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::Level;

use crate::quality::oracle::DEFAULT_MAX_STEPS;

const RUN_ID_ALLOWED: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789._-";

/// Root benchmark configuration loaded from YAML.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BenchmarkConfig {
    pub run_id: String,
    pub knowledge_base: PathBuf,
    #[serde(default)]
    pub simulation: SimulationConfig,
    pub agents: Vec<AgentConfig>,
    pub outputs: OutputsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BenchmarkConfig {
    /// Load configuration from a YAML file on disk.
    ///
    /// A relative `knowledge_base` path is resolved against the config file's directory.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let path_buf = path.to_path_buf();
        let file = File::open(path).map_err(|source| ConfigError::Read {
            source,
            path: path_buf.clone(),
        })?;
        let reader = BufReader::new(file);
        let mut cfg: BenchmarkConfig =
            serde_yaml::from_reader(reader).map_err(|source| ConfigError::Parse {
                source,
                path: path_buf.clone(),
            })?;
        if cfg.knowledge_base.is_relative()
            && let Some(dir) = path.parent()
        {
            cfg.knowledge_base = dir.join(&cfg.knowledge_base);
        }
        cfg.validate().map_err(|source| ConfigError::Invalid {
            path: path_buf,
            source,
        })?;
        Ok(cfg)
    }

    /// Validate the configuration without performing I/O.
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        validate_run_id(&self.run_id)?;
        if self.knowledge_base.as_os_str().is_empty() {
            return Err(ValidationError::InvalidField {
                field: "knowledge_base".to_string(),
                message: "path must not be empty".to_string(),
            });
        }
        self.simulation.validate()?;
        self.outputs.validate(&self.run_id)?;
        validate_agents(&self.agents)?;
        self.metrics.validate(&self.agents)?;
        self.logging.normalize();
        Ok(())
    }

    /// Resolve output templates (e.g., `{run_id}` placeholders) into concrete paths.
    pub fn resolved_outputs(&self) -> ResolvedOutputs {
        ResolvedOutputs {
            jsonl: resolve_template(&self.run_id, &self.outputs.jsonl),
            summary_md: resolve_template(&self.run_id, &self.outputs.summary_md),
            plots_dir: resolve_template(&self.run_id, &self.outputs.plots_dir),
        }
    }

    /// Name of the agent every other agent is compared against.
    pub fn baseline(&self) -> Option<&str> {
        self.metrics
            .baseline
            .as_deref()
            .or_else(|| self.agents.first().map(|agent| agent.name.as_str()))
    }
}

/// Which games to simulate and how long each may run.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SimulationConfig {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Empty means every theme in the knowledge base.
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default = "default_difficulties")]
    pub difficulties: Vec<Difficulty>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            themes: Vec::new(),
            difficulties: default_difficulties(),
        }
    }
}

impl SimulationConfig {
    fn validate(&mut self) -> Result<(), ValidationError> {
        if self.max_steps == 0 {
            return Err(ValidationError::InvalidField {
                field: "simulation.max_steps".to_string(),
                message: "max_steps must be greater than zero".to_string(),
            });
        }

        if self.themes.iter().any(|theme| theme.trim().is_empty()) {
            return Err(ValidationError::InvalidField {
                field: "simulation.themes".to_string(),
                message: "theme keys must not be empty".to_string(),
            });
        }

        if self.difficulties.is_empty() {
            return Err(ValidationError::InvalidField {
                field: "simulation.difficulties".to_string(),
                message: "at least one difficulty must be specified".to_string(),
            });
        }

        let mut seen = HashSet::new();
        self.difficulties.retain(|difficulty| seen.insert(*difficulty));
        let mut seen = HashSet::new();
        self.themes.retain(|theme| seen.insert(theme.clone()));
        Ok(())
    }
}

fn default_max_steps() -> usize {
    DEFAULT_MAX_STEPS
}

fn default_difficulties() -> Vec<Difficulty> {
    Difficulty::ALL.to_vec()
}

/// Definition of an evaluated decision policy.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub name: String,
    pub kind: AgentKind,
    #[serde(default)]
    pub params: serde_yaml::Value,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    BalancedStrict,
    Minimax,
    External,
}

/// Output artifact configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OutputsConfig {
    pub jsonl: String,
    pub summary_md: String,
    pub plots_dir: String,
}

impl OutputsConfig {
    fn validate(&self, run_id: &str) -> Result<(), ValidationError> {
        for (label, value) in [
            ("outputs.jsonl", &self.jsonl),
            ("outputs.summary_md", &self.summary_md),
            ("outputs.plots_dir", &self.plots_dir),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::InvalidField {
                    field: label.to_string(),
                    message: "path must not be empty".to_string(),
                });
            }

            let resolved = resolve_template(run_id, value);
            if resolved.components().count() == 0 {
                return Err(ValidationError::InvalidField {
                    field: label.to_string(),
                    message: "resolved path is invalid".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Metrics configuration block.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct MetricsConfig {
    /// Defaults to the first agent.
    #[serde(default)]
    pub baseline: Option<String>,
}

impl MetricsConfig {
    fn validate(&self, agents: &[AgentConfig]) -> Result<(), ValidationError> {
        if let Some(baseline) = self.baseline.as_ref()
            && !agents.iter().any(|a| &a.name == baseline)
        {
            return Err(ValidationError::InvalidField {
                field: "metrics.baseline".to_string(),
                message: format!("baseline agent '{baseline}' is not defined in agents list"),
            });
        }
        Ok(())
    }
}

/// Logging configuration defaults to disabled structured logs.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub enable_structured: bool,
    #[serde(default = "default_tracing_level")]
    pub tracing_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enable_structured: false,
            tracing_level: default_tracing_level(),
        }
    }
}

impl LoggingConfig {
    fn normalize(&mut self) {
        if self.tracing_level.trim().is_empty() {
            self.tracing_level = default_tracing_level();
        }
    }

    pub fn level(&self) -> Option<Level> {
        match self.tracing_level.to_ascii_lowercase().as_str() {
            "trace" => Some(Level::TRACE),
            "debug" => Some(Level::DEBUG),
            "info" => Some(Level::INFO),
            "warn" | "warning" => Some(Level::WARN),
            "error" => Some(Level::ERROR),
            _ => None,
        }
    }
}

fn default_tracing_level() -> String {
    "info".to_string()
}

fn validate_run_id(run_id: &str) -> Result<(), ValidationError> {
    if run_id.trim().is_empty() {
        return Err(ValidationError::InvalidField {
            field: "run_id".to_string(),
            message: "run_id must not be empty".to_string(),
        });
    }

    if !run_id.chars().all(|c| RUN_ID_ALLOWED.contains(c)) {
        return Err(ValidationError::InvalidField {
            field: "run_id".to_string(),
            message: "run_id may only contain alphanumeric characters, '.', '_' or '-'".to_string(),
        });
    }

    Ok(())
}

fn validate_agents(agents: &[AgentConfig]) -> Result<(), ValidationError> {
    if agents.is_empty() {
        return Err(ValidationError::InvalidField {
            field: "agents".to_string(),
            message: "at least one agent must be specified".to_string(),
        });
    }

    let mut seen = HashSet::new();
    for agent in agents {
        if agent.name.trim().is_empty() {
            return Err(ValidationError::InvalidField {
                field: "agents.name".to_string(),
                message: "agent name must not be empty".to_string(),
            });
        }

        if !agent.name.chars().all(|c| RUN_ID_ALLOWED.contains(c)) {
            return Err(ValidationError::InvalidField {
                field: format!("agents[{}].name", agent.name),
                message: "agent name contains invalid characters".to_string(),
            });
        }

        if !seen.insert(agent.name.clone()) {
            return Err(ValidationError::InvalidField {
                field: "agents".to_string(),
                message: format!("agent name '{}' defined more than once", agent.name),
            });
        }
    }

    Ok(())
}

fn resolve_template(run_id: &str, template: &str) -> PathBuf {
    let replaced = template.replace("{run_id}", run_id);
    PathBuf::from(replaced)
}

/// Fully resolved output paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOutputs {
    pub jsonl: PathBuf,
    pub summary_md: PathBuf,
    pub plots_dir: PathBuf,
}

impl ResolvedOutputs {
    /// Directory holding the summary; telemetry files live next to it.
    pub fn summary_dir(&self) -> PathBuf {
        self.summary_md
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Errors surfaced when loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        #[source]
        source: serde_yaml::Error,
        path: PathBuf,
    },
    #[error("invalid configuration in {path:?}: {source}")]
    Invalid {
        path: PathBuf,
        source: ValidationError,
    },
}

impl ConfigError {
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. }
            | ConfigError::Parse { path, .. }
            | ConfigError::Invalid { path, .. } => path.as_path(),
        }
    }
}

/// Validation failures captured with contextual metadata.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field}: {message}")]
    InvalidField { field: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC_YAML: &str = r#"
run_id: "quality_smoke"
knowledge_base: "kb.json"
simulation:
  max_steps: 40
  themes: ["animals", "animals"]
  difficulties: ["hard", "easy", "hard"]
agents:
  - name: "balanced"
    kind: "balanced_strict"
  - name: "worst-case"
    kind: "minimax"
  - name: "script"
    kind: "external"
    params:
      command: "./tools/decider"
outputs:
  jsonl: "bench/out/{run_id}/targets.jsonl"
  summary_md: "bench/out/{run_id}/summary.md"
  plots_dir: "bench/out/{run_id}/plots"
metrics:
  baseline: "worst-case"
logging:
  enable_structured: true
  tracing_level: "debug"
"#;

    #[test]
    fn loads_and_validates_basic_config() {
        let mut cfg: BenchmarkConfig = serde_yaml::from_str(BASIC_YAML).expect("parse yaml");
        cfg.validate().expect("validate");

        assert_eq!(cfg.simulation.max_steps, 40);
        assert_eq!(cfg.simulation.themes, vec!["animals".to_string()]);
        assert_eq!(
            cfg.simulation.difficulties,
            vec![Difficulty::Hard, Difficulty::Easy]
        );
        assert_eq!(cfg.agents[2].kind, AgentKind::External);
        assert_eq!(cfg.baseline(), Some("worst-case"));
        assert!(cfg.logging.enable_structured);
        assert_eq!(cfg.logging.level(), Some(Level::DEBUG));

        let outputs = cfg.resolved_outputs();
        assert_eq!(
            outputs.jsonl,
            PathBuf::from("bench/out/quality_smoke/targets.jsonl")
        );
        assert_eq!(outputs.summary_dir(), PathBuf::from("bench/out/quality_smoke"));
    }

    #[test]
    fn simulation_block_is_optional() {
        let yaml = BASIC_YAML.replace(
            "simulation:\n  max_steps: 40\n  themes: [\"animals\", \"animals\"]\n  difficulties: [\"hard\", \"easy\", \"hard\"]\n",
            "",
        );
        let mut cfg: BenchmarkConfig = serde_yaml::from_str(&yaml).expect("parse");
        cfg.validate().expect("valid");
        assert_eq!(cfg.simulation.max_steps, DEFAULT_MAX_STEPS);
        assert!(cfg.simulation.themes.is_empty());
        assert_eq!(cfg.simulation.difficulties, Difficulty::ALL.to_vec());
    }

    #[test]
    fn baseline_defaults_to_first_agent() {
        let yaml = BASIC_YAML.replace("metrics:\n  baseline: \"worst-case\"\n", "");
        let mut cfg: BenchmarkConfig = serde_yaml::from_str(&yaml).expect("parse");
        cfg.validate().expect("valid");
        assert_eq!(cfg.baseline(), Some("balanced"));
    }

    #[test]
    fn rejects_unknown_baseline() {
        let yaml = BASIC_YAML.replace("baseline: \"worst-case\"", "baseline: \"oracle\"");
        let mut cfg: BenchmarkConfig = serde_yaml::from_str(&yaml).expect("parse");
        let err = cfg.validate().expect_err("should fail");
        assert!(matches!(
            err,
            ValidationError::InvalidField { field, .. } if field == "metrics.baseline"
        ));
    }

    #[test]
    fn rejects_duplicate_agents() {
        let yaml = BASIC_YAML.replace("name: \"script\"", "name: \"balanced\"");
        let mut cfg: BenchmarkConfig = serde_yaml::from_str(&yaml).expect("parse");
        let err = cfg.validate().expect_err("duplicate agents should fail");
        assert!(matches!(
            err,
            ValidationError::InvalidField { field, .. } if field == "agents"
        ));
    }

    #[test]
    fn rejects_zero_step_cap() {
        let yaml = BASIC_YAML.replace("max_steps: 40", "max_steps: 0");
        let mut cfg: BenchmarkConfig = serde_yaml::from_str(&yaml).expect("parse");
        let err = cfg.validate().expect_err("zero cap");
        assert!(matches!(
            err,
            ValidationError::InvalidField { field, .. } if field == "simulation.max_steps"
        ));
    }

    #[test]
    fn rejects_unknown_difficulty() {
        let yaml = BASIC_YAML.replace("[\"hard\", \"easy\", \"hard\"]", "[\"brutal\"]");
        assert!(serde_yaml::from_str::<BenchmarkConfig>(&yaml).is_err());
    }

    #[test]
    fn rejects_invalid_run_id() {
        let yaml = BASIC_YAML.replace("quality_smoke", "quality smoke");
        let mut cfg: BenchmarkConfig = serde_yaml::from_str(&yaml).expect("parse");
        let err = cfg.validate().expect_err("invalid run id");
        assert!(matches!(
            err,
            ValidationError::InvalidField { field, .. } if field == "run_id"
        ));
    }
}
