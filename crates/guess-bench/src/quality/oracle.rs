use guess_bot::policy::Policy;
use guess_core::game::session::{ActionError, GameState, SessionError};
use guess_core::model::action::Action;
use guess_core::model::difficulty::Difficulty;
use guess_core::model::history::{AnswerValue, HistoryEvent};
use guess_core::model::knowledge::KnowledgeBase;
use serde::Serialize;
use thiserror::Error;
use tracing::{Level, event};

/// Loop iterations allowed per simulated game.
pub const DEFAULT_MAX_STEPS: usize = 80;

/// Outcome of one simulated game against a known target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameTrace {
    pub target: String,
    pub success: bool,
    pub steps: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
    pub history: Vec<HistoryEvent>,
}

impl GameTrace {
    /// Steps counted towards quality metrics; failures always cost at least one.
    pub fn scored_steps(&self) -> u32 {
        if self.success {
            self.steps
        } else {
            self.steps.max(1)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The policy ended the game itself.
    Done { message: String },
    /// Every candidate was eliminated without a correct guess.
    Exhausted { message: String },
    /// The loop cap was reached.
    StepLimit { max_steps: usize },
    /// The policy broke the game protocol.
    Integrity { message: String },
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("unknown target '{target}'")]
    UnknownTarget { target: String },
    #[error("target '{target}' does not belong to theme '{theme}'")]
    TargetOutsideTheme { target: String, theme: String },
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Play one game where the target's attributes answer every question.
///
/// Unknown attributes answer `skip`. A wrong guess eliminates the item and
/// the game continues; the run ends on a correct guess, a `done` action, an
/// empty candidate set, a protocol violation or after `max_steps` iterations.
pub fn simulate(
    policy: &dyn Policy,
    knowledge: &KnowledgeBase,
    theme: &str,
    difficulty: Difficulty,
    target_id: &str,
    max_steps: usize,
) -> Result<GameTrace, OracleError> {
    let target = knowledge
        .item(target_id)
        .ok_or_else(|| OracleError::UnknownTarget {
            target: target_id.to_string(),
        })?;
    if !target.has_theme(theme) {
        return Err(OracleError::TargetOutsideTheme {
            target: target_id.to_string(),
            theme: theme.to_string(),
        });
    }

    let mut state = GameState::new(knowledge, theme, difficulty)?;
    let mut outcome = Outcome::StepLimit;

    for _ in 0..max_steps {
        let action = policy.decide(&state.turn_context(knowledge));
        let found = match play_turn(&mut state, knowledge, &action, target_id) {
            Ok(found) => found,
            Err(err) => {
                event!(
                    target: "guess_bench::simulation",
                    Level::WARN,
                    policy = policy.name(),
                    theme,
                    item = target_id,
                    step = state.step(),
                    error = %err,
                    "policy violated game protocol"
                );
                outcome = Outcome::Failed(FailureReason::Integrity {
                    message: err.to_string(),
                });
                break;
            }
        };

        if let Action::Done { message } = &action {
            outcome = Outcome::Failed(FailureReason::Done {
                message: message.clone(),
            });
            break;
        }
        if found {
            outcome = Outcome::Found;
            break;
        }
        if let Some(message) = state.done_message() {
            outcome = Outcome::Failed(FailureReason::Exhausted {
                message: message.to_string(),
            });
            break;
        }
    }

    let (success, failure) = match outcome {
        Outcome::Found => (true, None),
        Outcome::Failed(reason) => (false, Some(reason)),
        Outcome::StepLimit => (false, Some(FailureReason::StepLimit { max_steps })),
    };
    let steps = state.step();

    if tracing::enabled!(Level::DEBUG) {
        event!(
            target: "guess_bench::simulation",
            Level::DEBUG,
            policy = policy.name(),
            theme,
            difficulty = difficulty.as_str(),
            item = target_id,
            success,
            steps,
        );
    }

    Ok(GameTrace {
        target: target_id.to_string(),
        success,
        steps,
        failure,
        history: state.into_history(),
    })
}

enum Outcome {
    Found,
    Failed(FailureReason),
    StepLimit,
}

fn play_turn(
    state: &mut GameState,
    knowledge: &KnowledgeBase,
    action: &Action,
    target_id: &str,
) -> Result<bool, ActionError> {
    state.record_action(knowledge, action)?;
    match action {
        Action::Question { key } => {
            let answer = knowledge
                .item(target_id)
                .map(|item| AnswerValue::from(item.attr(key)))
                .unwrap_or(AnswerValue::Skip);
            state.apply_answer(knowledge, key, answer)?;
            Ok(false)
        }
        Action::Guess { item_id, .. } => {
            let correct = item_id == target_id;
            state.apply_guess_feedback(knowledge, item_id, correct)?;
            Ok(correct)
        }
        Action::Done { .. } => Ok(false),
    }
}
