use serde::{Deserialize, Deserializer, Serialize};

/// Decision returned by a policy for one turn.
///
/// The JSON form is the wire protocol shared with external deciders:
/// `{"type":"question","question_key":..}`, `{"type":"guess","item_id":..,"confidence":..}`
/// or `{"type":"done","message":..}`. A question without a key or a guess
/// without an item id fails to deserialize rather than being coerced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Question {
        #[serde(rename = "question_key")]
        key: String,
    },
    Guess {
        item_id: String,
        #[serde(default, deserialize_with = "unit_interval")]
        confidence: f64,
    },
    Done {
        #[serde(default = "default_done_message")]
        message: String,
    },
}

fn default_done_message() -> String {
    "finished".to_string()
}

impl Action {
    pub fn question(key: impl Into<String>) -> Self {
        Action::Question { key: key.into() }
    }

    /// Build a guess, clamping `confidence` into `[0, 1]`.
    pub fn guess(item_id: impl Into<String>, confidence: f64) -> Self {
        Action::Guess {
            item_id: item_id.into(),
            confidence: clamp_unit(confidence),
        }
    }

    pub fn done(message: impl Into<String>) -> Self {
        Action::Done {
            message: message.into(),
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Action::Question { .. } => "question",
            Action::Guess { .. } => "guess",
            Action::Done { .. } => "done",
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Action::Done { .. })
    }
}

/// Wire confidences are validated, never clamped.
fn unit_interval<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(serde::de::Error::custom(format!(
            "confidence {value} is outside [0, 1]"
        )))
    }
}

pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
