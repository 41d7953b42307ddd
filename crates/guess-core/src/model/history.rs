use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use super::item::Tristate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerValue {
    Yes,
    No,
    Skip,
}

impl AnswerValue {
    /// Definite boolean for yes/no; `None` for skip.
    pub const fn as_bool(self) -> Option<bool> {
        match self {
            AnswerValue::Yes => Some(true),
            AnswerValue::No => Some(false),
            AnswerValue::Skip => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            AnswerValue::Yes => "yes",
            AnswerValue::No => "no",
            AnswerValue::Skip => "skip",
        }
    }
}

/// Truthful answer an item gives about its own attribute.
impl From<Tristate> for AnswerValue {
    fn from(value: Tristate) -> Self {
        match value {
            Tristate::True => AnswerValue::Yes,
            Tristate::False => AnswerValue::No,
            Tristate::Unknown => AnswerValue::Skip,
        }
    }
}

impl FromStr for AnswerValue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" | "true" => Ok(AnswerValue::Yes),
            "no" | "n" | "false" => Ok(AnswerValue::No),
            "skip" | "unknown" | "?" => Ok(AnswerValue::Skip),
            other => Err(format!("unknown answer '{other}'")),
        }
    }
}

impl fmt::Display for AnswerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only game log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryEvent {
    Question { key: String },
    Answer { key: String, value: AnswerValue },
    GuessFeedback { item_id: String, correct: bool },
}

impl HistoryEvent {
    pub fn question(key: impl Into<String>) -> Self {
        HistoryEvent::Question { key: key.into() }
    }

    pub fn answer(key: impl Into<String>, value: AnswerValue) -> Self {
        HistoryEvent::Answer {
            key: key.into(),
            value,
        }
    }

    pub fn guess_feedback(item_id: impl Into<String>, correct: bool) -> Self {
        HistoryEvent::GuessFeedback {
            item_id: item_id.into(),
            correct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AnswerValue, HistoryEvent};
    use crate::model::item::Tristate;

    #[test]
    fn events_use_tagged_wire_format() {
        let event = HistoryEvent::answer("flies", AnswerValue::Skip);
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"answer","key":"flies","value":"skip"}"#);

        let parsed: HistoryEvent =
            serde_json::from_str(r#"{"type":"guess_feedback","item_id":"cat","correct":false}"#)
                .unwrap();
        assert_eq!(parsed, HistoryEvent::guess_feedback("cat", false));
    }

    #[test]
    fn oracle_answers_follow_attribute() {
        assert_eq!(AnswerValue::from(Tristate::True), AnswerValue::Yes);
        assert_eq!(AnswerValue::from(Tristate::False), AnswerValue::No);
        assert_eq!(AnswerValue::from(Tristate::Unknown), AnswerValue::Skip);
        assert_eq!(AnswerValue::Skip.as_bool(), None);
    }

    #[test]
    fn parses_loose_answers() {
        assert_eq!("Y".parse::<AnswerValue>().unwrap(), AnswerValue::Yes);
        assert_eq!("false".parse::<AnswerValue>().unwrap(), AnswerValue::No);
        assert_eq!("?".parse::<AnswerValue>().unwrap(), AnswerValue::Skip);
        assert!("maybe".parse::<AnswerValue>().is_err());
    }
}
