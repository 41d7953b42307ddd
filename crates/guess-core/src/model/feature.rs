use core::fmt;
use serde::{Deserialize, Serialize};

/// A yes/no question items may carry a definite value for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub key: String,
    pub question: String,
    /// Position in the knowledge base; the default tie-break order.
    #[serde(default)]
    pub order: usize,
}

impl Feature {
    pub fn new(key: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            question: question.into(),
            order: 0,
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    pub key: String,
    #[serde(default)]
    pub label: Option<String>,
}

impl Theme {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: Some(label.into()),
        }
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.key)
    }
}
