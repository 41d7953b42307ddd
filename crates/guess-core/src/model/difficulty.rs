use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use super::feature::Feature;

/// Caller-side restriction of the features visible to a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    /// Number of leading features exposed, `None` meaning all of them.
    pub const fn feature_limit(self) -> Option<usize> {
        match self {
            Difficulty::Easy => None,
            Difficulty::Medium => Some(12),
            Difficulty::Hard => Some(8),
        }
    }

    /// Prefix of `features` (declaration order) visible at this difficulty.
    pub fn allowed_features(self, features: &[Feature]) -> &[Feature] {
        match self.feature_limit() {
            Some(limit) => &features[..limit.min(features.len())],
            None => features,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty '{other}'")),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::Difficulty;
    use crate::model::feature::Feature;

    fn features(count: usize) -> Vec<Feature> {
        (0..count)
            .map(|i| Feature::new(format!("f{i}"), format!("Question {i}?")))
            .collect()
    }

    #[test]
    fn tiers_truncate_in_declaration_order() {
        let all = features(15);
        assert_eq!(Difficulty::Hard.allowed_features(&all).len(), 8);
        assert_eq!(Difficulty::Medium.allowed_features(&all).len(), 12);
        assert_eq!(Difficulty::Easy.allowed_features(&all).len(), 15);
        assert_eq!(Difficulty::Hard.allowed_features(&all)[7].key, "f7");
    }

    #[test]
    fn short_feature_lists_are_not_padded() {
        let all = features(5);
        assert_eq!(Difficulty::Hard.allowed_features(&all).len(), 5);
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("HARD".parse::<Difficulty>().unwrap(), Difficulty::Hard);
        assert_eq!(" medium ".parse::<Difficulty>().unwrap(), Difficulty::Medium);
        assert!("brutal".parse::<Difficulty>().is_err());
        assert_eq!(Difficulty::default(), Difficulty::Easy);
    }
}
