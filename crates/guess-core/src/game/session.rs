use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use super::context::TurnContext;
use crate::model::action::Action;
use crate::model::difficulty::Difficulty;
use crate::model::history::{AnswerValue, HistoryEvent};
use crate::model::knowledge::KnowledgeBase;

pub const NO_CANDIDATES: &str = "no candidates remain";
pub const NO_CANDIDATES_AFTER_ELIMINATION: &str = "no candidates remain after elimination";

/// Keep the candidates compatible with an answer.
///
/// `skip` keeps everything; `yes`/`no` keep items whose attribute is unknown
/// or equal to the answer. Ids missing from the knowledge base count as unknown.
pub fn narrow_candidates(
    knowledge: &KnowledgeBase,
    candidates: &[String],
    key: &str,
    answer: AnswerValue,
) -> Vec<String> {
    let Some(wanted) = answer.as_bool() else {
        return candidates.to_vec();
    };
    candidates
        .iter()
        .filter(|id| {
            knowledge
                .item(id)
                .map(|item| item.attr(key).is_compatible_with(wanted))
                .unwrap_or(true)
        })
        .cloned()
        .collect()
}

/// Caller-owned mutable state of one game.
///
/// Policies only ever see a [`TurnContext`] borrowed from it; every side
/// effect of an action (asked set, history, narrowing) is applied here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    theme: String,
    difficulty: Difficulty,
    candidates: Vec<String>,
    asked: BTreeSet<String>,
    history: Vec<HistoryEvent>,
    step: u32,
    current_question: Option<String>,
    pending_guess: Option<String>,
    last_guess_id: Option<String>,
    done_message: Option<String>,
}

impl GameState {
    /// Start a game over every item carrying `theme`.
    pub fn new(
        knowledge: &KnowledgeBase,
        theme: &str,
        difficulty: Difficulty,
    ) -> Result<Self, SessionError> {
        let candidates = knowledge.theme_item_ids(theme);
        if candidates.is_empty() {
            return Err(SessionError::NoItemsForTheme {
                theme: theme.to_string(),
            });
        }
        Ok(Self {
            theme: theme.to_string(),
            difficulty,
            candidates,
            asked: BTreeSet::new(),
            history: Vec::new(),
            step: 0,
            current_question: None,
            pending_guess: None,
            last_guess_id: None,
            done_message: None,
        })
    }

    pub fn theme(&self) -> &str {
        &self.theme
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn asked(&self) -> &BTreeSet<String> {
        &self.asked
    }

    pub fn history(&self) -> &[HistoryEvent] {
        &self.history
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    pub fn current_question(&self) -> Option<&str> {
        self.current_question.as_deref()
    }

    pub fn pending_guess(&self) -> Option<&str> {
        self.pending_guess.as_deref()
    }

    pub fn last_guess_id(&self) -> Option<&str> {
        self.last_guess_id.as_deref()
    }

    pub fn is_done(&self) -> bool {
        self.done_message.is_some()
    }

    pub fn done_message(&self) -> Option<&str> {
        self.done_message.as_deref()
    }

    pub fn into_history(self) -> Vec<HistoryEvent> {
        self.history
    }

    pub fn turn_context<'a>(&'a self, knowledge: &'a KnowledgeBase) -> TurnContext<'a> {
        TurnContext {
            features: knowledge.features_for(self.difficulty),
            knowledge,
            history: &self.history,
            candidates: &self.candidates,
            asked: &self.asked,
            step: self.step,
            last_guess_id: self.last_guess_id.as_deref(),
        }
    }

    /// Validate a policy action and apply its bookkeeping.
    ///
    /// Questions are marked asked and logged; guesses are remembered until
    /// feedback arrives; `Done` finishes the game. Nothing is coerced: an
    /// action that breaks the protocol is returned as an error untouched.
    pub fn record_action(
        &mut self,
        knowledge: &KnowledgeBase,
        action: &Action,
    ) -> Result<(), ActionError> {
        self.ensure_active()?;
        match action {
            Action::Question { key } => {
                let allowed = knowledge
                    .features_for(self.difficulty)
                    .iter()
                    .any(|feature| &feature.key == key);
                if !allowed {
                    return Err(ActionError::UnknownFeature { key: key.clone() });
                }
                if !self.asked.insert(key.clone()) {
                    return Err(ActionError::AlreadyAsked { key: key.clone() });
                }
                self.history.push(HistoryEvent::question(key.clone()));
                self.current_question = Some(key.clone());
                self.pending_guess = None;
            }
            Action::Guess { item_id, .. } => {
                if !knowledge.contains_item(item_id) {
                    return Err(ActionError::UnknownItem {
                        item_id: item_id.clone(),
                    });
                }
                self.pending_guess = Some(item_id.clone());
                self.current_question = None;
            }
            Action::Done { message } => {
                self.finish(message.clone());
            }
        }
        Ok(())
    }

    /// Record an answer, narrow the candidates and advance the step.
    pub fn apply_answer(
        &mut self,
        knowledge: &KnowledgeBase,
        key: &str,
        value: AnswerValue,
    ) -> Result<(), ActionError> {
        self.ensure_active()?;
        self.history.push(HistoryEvent::answer(key, value));
        self.candidates = narrow_candidates(knowledge, &self.candidates, key, value);
        self.current_question = None;
        self.step += 1;
        if self.candidates.is_empty() {
            self.finish(NO_CANDIDATES.to_string());
        }
        Ok(())
    }

    /// Record feedback on a guess. A wrong guess eliminates the item.
    pub fn apply_guess_feedback(
        &mut self,
        knowledge: &KnowledgeBase,
        item_id: &str,
        correct: bool,
    ) -> Result<(), ActionError> {
        self.ensure_active()?;
        self.history
            .push(HistoryEvent::guess_feedback(item_id, correct));
        self.pending_guess = None;

        if correct {
            let label = knowledge
                .item(item_id)
                .map(|item| item.label.as_str())
                .unwrap_or(item_id);
            self.finish(format!("found: {label}"));
            return Ok(());
        }

        self.candidates.retain(|id| id != item_id);
        self.last_guess_id = Some(item_id.to_string());
        self.step += 1;
        if self.candidates.is_empty() {
            self.finish(NO_CANDIDATES_AFTER_ELIMINATION.to_string());
        }
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), ActionError> {
        match &self.done_message {
            Some(message) => Err(ActionError::Finished {
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    fn finish(&mut self, message: String) {
        self.current_question = None;
        self.pending_guess = None;
        self.done_message = Some(message);
    }
}

/// Protocol violations rejected by [`GameState`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("question '{key}' is not an allowed feature")]
    UnknownFeature { key: String },
    #[error("question '{key}' was already asked")]
    AlreadyAsked { key: String },
    #[error("guess '{item_id}' is not a known item")]
    UnknownItem { item_id: String },
    #[error("game already finished: {message}")]
    Finished { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("no items for theme '{theme}'")]
    NoItemsForTheme { theme: String },
}
