use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::difficulty::Difficulty;
use super::feature::{Feature, Theme};
use super::item::Item;

/// Immutable set of themes, features and items a game is played over.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawKnowledgeBase")]
pub struct KnowledgeBase {
    themes: Vec<Theme>,
    features: Vec<Feature>,
    items: Vec<Item>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl KnowledgeBase {
    /// Build from features in declaration order; `order` is renumbered by position.
    pub fn new(
        themes: Vec<Theme>,
        mut features: Vec<Feature>,
        items: Vec<Item>,
    ) -> Result<Self, KnowledgeError> {
        let mut seen = HashSet::new();
        for (position, feature) in features.iter_mut().enumerate() {
            if feature.key.trim().is_empty() {
                return Err(KnowledgeError::EmptyKey { position });
            }
            if !seen.insert(feature.key.clone()) {
                return Err(KnowledgeError::DuplicateFeature(feature.key.clone()));
            }
            feature.order = position;
        }

        let mut index = HashMap::with_capacity(items.len());
        for (position, item) in items.iter().enumerate() {
            if item.id.trim().is_empty() {
                return Err(KnowledgeError::EmptyItemId { position });
            }
            if index.insert(item.id.clone(), position).is_some() {
                return Err(KnowledgeError::DuplicateItem(item.id.clone()));
            }
        }

        Ok(Self {
            themes,
            features,
            items,
            index,
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self, KnowledgeError> {
        serde_json::from_str(json).map_err(KnowledgeError::Parse)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, KnowledgeError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| KnowledgeError::Read {
            source,
            path: path.to_path_buf(),
        })?;
        Self::from_json_str(&text)
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn feature(&self, key: &str) -> Option<&Feature> {
        self.features.iter().find(|feature| feature.key == key)
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        self.index.get(id).map(|&idx| &self.items[idx])
    }

    pub fn contains_item(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Declared themes, or the sorted set of theme keys items carry.
    pub fn themes(&self) -> Vec<Theme> {
        if !self.themes.is_empty() {
            return self.themes.clone();
        }
        self.items
            .iter()
            .flat_map(|item| item.themes.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|key| Theme { key, label: None })
            .collect()
    }

    pub fn theme_keys(&self) -> Vec<String> {
        self.themes().into_iter().map(|theme| theme.key).collect()
    }

    pub fn theme_items<'a>(&'a self, theme: &'a str) -> impl Iterator<Item = &'a Item> + 'a {
        self.items.iter().filter(move |item| item.has_theme(theme))
    }

    /// Ids of items carrying `theme`, in knowledge-base order.
    pub fn theme_item_ids(&self, theme: &str) -> Vec<String> {
        self.theme_items(theme).map(|item| item.id.clone()).collect()
    }

    pub fn features_for(&self, difficulty: Difficulty) -> &[Feature] {
        difficulty.allowed_features(&self.features)
    }

    /// Features whose key is in `allowed`, keeping declaration order.
    pub fn restrict_features(&self, allowed: &[&str]) -> Vec<Feature> {
        self.features
            .iter()
            .filter(|feature| allowed.contains(&feature.key.as_str()))
            .cloned()
            .collect()
    }
}

#[derive(Deserialize)]
struct RawKnowledgeBase {
    #[serde(default)]
    themes: Vec<Theme>,
    features: Vec<RawFeature>,
    items: Vec<Item>,
}

#[derive(Deserialize)]
struct RawFeature {
    key: String,
    question: String,
}

impl TryFrom<RawKnowledgeBase> for KnowledgeBase {
    type Error = KnowledgeError;

    /// Features keep declaration order; a JSON `order` field is ignored.
    fn try_from(raw: RawKnowledgeBase) -> Result<Self, Self::Error> {
        let features = raw
            .features
            .into_iter()
            .map(|feature| Feature::new(feature.key, feature.question))
            .collect();
        KnowledgeBase::new(raw.themes, features, raw.items)
    }
}

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("failed to read knowledge base {path:?}: {source}")]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to parse knowledge base: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("feature at position {position} has an empty key")]
    EmptyKey { position: usize },
    #[error("item at position {position} has an empty id")]
    EmptyItemId { position: usize },
    #[error("feature '{0}' defined more than once")]
    DuplicateFeature(String),
    #[error("item '{0}' defined more than once")]
    DuplicateItem(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_KB: &str = r#"{
        "features": [
            {"key": "mammal", "question": "Is it a mammal?"},
            {"key": "flies", "question": "Can it fly?"},
            {"key": "pet", "question": "Is it a common pet?"}
        ],
        "items": [
            {"id": "cat", "label": "Cat", "themes": ["animals"], "attrs": {"mammal": true, "flies": false, "pet": true}},
            {"id": "bat", "label": "Bat", "themes": ["animals", "night"], "attrs": {"mammal": true, "flies": true}},
            {"id": "apple", "label": "Apple", "themes": ["food"], "attrs": {}}
        ]
    }"#;

    #[test]
    fn loads_and_indexes_items() {
        let kb = KnowledgeBase::from_json_str(SMALL_KB).unwrap();
        assert_eq!(kb.features().len(), 3);
        assert_eq!(kb.features()[2].order, 2);
        assert_eq!(kb.item("bat").map(|item| item.label.as_str()), Some("Bat"));
        assert!(kb.item("dog").is_none());
        assert_eq!(kb.theme_item_ids("animals"), vec!["cat", "bat"]);
    }

    #[test]
    fn derives_themes_when_not_declared() {
        let kb = KnowledgeBase::from_json_str(SMALL_KB).unwrap();
        assert_eq!(kb.theme_keys(), vec!["animals", "food", "night"]);
    }

    #[test]
    fn declaration_order_wins_over_order_field() {
        let features: Vec<String> = (0..10)
            .map(|i| format!(r#"{{"key": "f{i}", "question": "F{i}?", "order": {}}}"#, 9 - i))
            .collect();
        let json = format!(r#"{{"features": [{}], "items": []}}"#, features.join(","));
        let kb = KnowledgeBase::from_json_str(&json).unwrap();

        let hard: Vec<_> = kb
            .features_for(Difficulty::Hard)
            .iter()
            .map(|f| f.key.as_str())
            .collect();
        assert_eq!(hard, ["f0", "f1", "f2", "f3", "f4", "f5", "f6", "f7"]);
        assert_eq!(kb.feature("f9").map(|f| f.order), Some(9));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let json = SMALL_KB.replace("\"id\": \"bat\"", "\"id\": \"cat\"");
        let err = KnowledgeBase::from_json_str(&json).expect_err("duplicate item");
        assert!(err.to_string().contains("cat"));

        let err = KnowledgeBase::new(
            Vec::new(),
            vec![Feature::new("x", "X?"), Feature::new("x", "X again?")],
            Vec::new(),
        )
        .expect_err("duplicate feature");
        assert!(matches!(err, KnowledgeError::DuplicateFeature(key) if key == "x"));
    }

    #[test]
    fn restricts_features_preserving_order() {
        let kb = KnowledgeBase::from_json_str(SMALL_KB).unwrap();
        let subset = kb.restrict_features(&["pet", "mammal"]);
        let keys: Vec<_> = subset.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["mammal", "pet"]);
        assert_eq!(kb.features_for(Difficulty::Hard).len(), 3);
    }
}
