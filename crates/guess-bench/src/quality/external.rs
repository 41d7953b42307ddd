use std::io::Write;
use std::process::{Command, Stdio};
use std::time::Instant;

use guess_bot::policy::{Policy, PolicyContext};
use guess_core::model::action::Action;
use guess_core::model::feature::Feature;
use guess_core::model::history::HistoryEvent;
use guess_core::model::item::Item;
use serde::Serialize;
use thiserror::Error;
use tracing::{Level, event};

use super::{ExternalFallback, ExternalOptions};

/// Decision policy backed by a subprocess speaking JSON over stdio.
///
/// Each turn spawns the command, writes one request object to stdin and
/// reads one action object from stdout.
pub struct ExternalPolicy {
    name: String,
    options: ExternalOptions,
    fallback: Option<Box<dyn Policy>>,
}

impl ExternalPolicy {
    pub fn new(name: String, options: ExternalOptions) -> Self {
        let fallback = match options.fallback {
            ExternalFallback::Builtin(kind) => Some(kind.spawn()),
            ExternalFallback::Error => None,
        };
        if options.command.is_none() {
            event!(
                target: "guess_bench::external",
                Level::WARN,
                agent = %name,
                "no external command configured; every turn uses the fallback"
            );
        }
        Self {
            name,
            options,
            fallback,
        }
    }

    fn invoke(&self, request: &DecideRequest<'_>) -> Result<Action, ExternalInvokeError> {
        let command = match &self.options.command {
            Some(cmd) if !cmd.is_empty() => cmd,
            _ => return Err(ExternalInvokeError::NoCommand),
        };

        let mut cmd = Command::new(command);
        if !self.options.args.is_empty() {
            cmd.args(&self.options.args);
        }
        if let Some(dir) = &self.options.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let start = Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|err| ExternalInvokeError::Spawn(err.to_string()))?;
        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| ExternalInvokeError::Io("stdin".into()))?;
            serde_json::to_writer(&mut stdin, request)
                .map_err(|err| ExternalInvokeError::Protocol(err.to_string()))?;
            stdin
                .write_all(b"\n")
                .map_err(|err| ExternalInvokeError::Io(err.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|err| ExternalInvokeError::Io(err.to_string()))?;

        if !output.status.success() {
            return Err(ExternalInvokeError::Status(format!(
                "exit status {}",
                output.status
            )));
        }

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        if let Some(timeout) = self.options.timeout_ms
            && elapsed_ms > timeout as f64
        {
            event!(
                target: "guess_bench::external",
                Level::WARN,
                agent = %self.name,
                step = request.step,
                elapsed_ms,
                timeout_ms = timeout,
                "external invocation exceeded timeout"
            );
        }

        parse_action(&output.stdout)
    }

    fn fallback(&self, ctx: &PolicyContext<'_>, err: &ExternalInvokeError) -> Action {
        match &self.fallback {
            Some(policy) => policy.decide(ctx),
            None => Action::done(format!("invalid action: {err}")),
        }
    }
}

impl Policy for ExternalPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn decide(&self, ctx: &PolicyContext<'_>) -> Action {
        let request = DecideRequest::from_context(ctx);
        match self.invoke(&request) {
            Ok(action) => action,
            Err(err) => {
                event!(
                    target: "guess_bench::external",
                    Level::WARN,
                    agent = %self.name,
                    step = ctx.step,
                    error = %err,
                    fallback = self.fallback.as_ref().map(|p| p.name()).unwrap_or("none"),
                    "external decision failed"
                );
                self.fallback(ctx, &err)
            }
        }
    }
}

/// Decode the first JSON object printed by the decider.
fn parse_action(stdout: &[u8]) -> Result<Action, ExternalInvokeError> {
    let text = std::str::from_utf8(stdout)
        .map_err(|err| ExternalInvokeError::Protocol(err.to_string()))?;
    let line = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| ExternalInvokeError::Protocol("empty response".into()))?;
    serde_json::from_str(line).map_err(|err| ExternalInvokeError::Protocol(err.to_string()))
}

#[derive(Debug, Error)]
enum ExternalInvokeError {
    #[error("no command configured")]
    NoCommand,
    #[error("failed to spawn process: {0}")]
    Spawn(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("non-zero exit status: {0}")]
    Status(String),
}

#[derive(Serialize)]
struct DecideRequest<'a> {
    kb: KnowledgePayload<'a>,
    history: &'a [HistoryEvent],
    candidates: &'a [String],
    asked: Vec<&'a str>,
    step: u32,
    last_guess_id: Option<&'a str>,
}

#[derive(Serialize)]
struct KnowledgePayload<'a> {
    features: &'a [Feature],
    items: &'a [Item],
}

impl<'a> DecideRequest<'a> {
    fn from_context(ctx: &PolicyContext<'a>) -> Self {
        Self {
            kb: KnowledgePayload {
                features: ctx.features,
                items: ctx.knowledge.items(),
            },
            history: ctx.history,
            candidates: ctx.candidates,
            asked: ctx.asked.iter().map(String::as_str).collect(),
            step: ctx.step,
            last_guess_id: ctx.last_guess_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guess_bot::bot::PolicyKind;
    use guess_core::model::knowledge::KnowledgeBase;
    use std::collections::BTreeSet;

    fn knowledge() -> KnowledgeBase {
        KnowledgeBase::new(
            Vec::new(),
            vec![Feature::new("f1", "F1?"), Feature::new("f2", "F2?")],
            vec![
                Item::new("A", "Alpha").with_attr("f1", true).with_attr("f2", true),
                Item::new("B", "Beta").with_attr("f1", true).with_attr("f2", false),
                Item::new("C", "Gamma").with_attr("f1", false),
                Item::new("D", "Delta").with_attr("f1", false),
            ],
        )
        .unwrap()
    }

    fn options(command: Option<&str>, fallback: ExternalFallback) -> ExternalOptions {
        ExternalOptions {
            command: command.map(str::to_string),
            args: Vec::new(),
            working_dir: None,
            timeout_ms: None,
            fallback,
        }
    }

    #[test]
    fn parses_first_non_empty_line() {
        let action = parse_action(b"\n  {\"type\":\"question\",\"question_key\":\"f2\"}\nnoise\n")
            .expect("valid action");
        assert_eq!(action, Action::question("f2"));
        assert!(parse_action(b"").is_err());
        assert!(parse_action(b"{\"type\":\"guess\"}").is_err());
        assert!(parse_action(b"not json").is_err());

        let err = parse_action(br#"{"type":"guess","item_id":"A","confidence":7.5}"#)
            .expect_err("confidence outside [0, 1]");
        assert!(matches!(err, ExternalInvokeError::Protocol(_)));
    }

    #[test]
    fn request_carries_the_turn() {
        let kb = knowledge();
        let candidates = vec!["A".to_string(), "B".to_string()];
        let history = vec![HistoryEvent::question("f1")];
        let asked = BTreeSet::from(["f1".to_string()]);
        let ctx = PolicyContext {
            features: kb.features(),
            knowledge: &kb,
            history: &history,
            candidates: &candidates,
            asked: &asked,
            step: 3,
            last_guess_id: Some("C"),
        };
        let value = serde_json::to_value(DecideRequest::from_context(&ctx)).unwrap();
        assert_eq!(value["kb"]["features"].as_array().map(Vec::len), Some(2));
        assert_eq!(value["kb"]["items"].as_array().map(Vec::len), Some(4));
        assert_eq!(value["asked"], serde_json::json!(["f1"]));
        assert_eq!(value["candidates"], serde_json::json!(["A", "B"]));
        assert_eq!(value["history"][0]["type"], "question");
        assert_eq!(value["step"], 3);
        assert_eq!(value["last_guess_id"], "C");
    }

    #[test]
    fn missing_command_uses_builtin_fallback() {
        let kb = knowledge();
        let candidates: Vec<String> = ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect();
        let asked = BTreeSet::new();
        let ctx = PolicyContext {
            features: kb.features(),
            knowledge: &kb,
            history: &[],
            candidates: &candidates,
            asked: &asked,
            step: 0,
            last_guess_id: None,
        };

        let policy = ExternalPolicy::new(
            "script".into(),
            options(None, ExternalFallback::Builtin(PolicyKind::Minimax)),
        );
        assert_eq!(policy.name(), "script");
        assert_eq!(policy.decide(&ctx), Action::question("f1"));
    }

    #[test]
    fn failures_without_fallback_end_the_game() {
        let kb = knowledge();
        let candidates = vec!["A".to_string()];
        let asked = BTreeSet::new();
        let ctx = PolicyContext {
            features: kb.features(),
            knowledge: &kb,
            history: &[],
            candidates: &candidates,
            asked: &asked,
            step: 0,
            last_guess_id: None,
        };

        let policy = ExternalPolicy::new(
            "script".into(),
            options(
                Some("__guess_bench_missing_decider__"),
                ExternalFallback::Error,
            ),
        );
        match policy.decide(&ctx) {
            Action::Done { message } => assert!(message.starts_with("invalid action: ")),
            other => panic!("expected done, got {other:?}"),
        }
    }
}
