use super::session::GameState;
use crate::model::difficulty::Difficulty;
use serde::{Deserialize, Serialize};

/// Flat JSON view of a game, for state inspection endpoints and logs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSnapshot {
    pub game_id: String,
    pub theme: String,
    pub difficulty: Difficulty,
    pub candidates_left: usize,
    pub step: u32,
    pub asked: Vec<String>,
    pub last_guess_id: Option<String>,
    pub done: bool,
    #[serde(default)]
    pub done_message: Option<String>,
}

impl SessionSnapshot {
    pub fn capture(game_id: impl Into<String>, state: &GameState) -> Self {
        SessionSnapshot {
            game_id: game_id.into(),
            theme: state.theme().to_string(),
            difficulty: state.difficulty(),
            candidates_left: state.candidates().len(),
            step: state.step(),
            asked: state.asked().iter().cloned().collect(),
            last_guess_id: state.last_guess_id().map(str::to_string),
            done: state.is_done(),
            done_message: state.done_message().map(str::to_string),
        }
    }

    /// Full state as JSON, including history, for resuming a game.
    pub fn state_to_json(state: &GameState) -> serde_json::Result<String> {
        serde_json::to_string_pretty(state)
    }

    pub fn state_from_json(json: &str) -> serde_json::Result<GameState> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
