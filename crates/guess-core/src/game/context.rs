use std::collections::BTreeSet;

use crate::model::feature::Feature;
use crate::model::history::HistoryEvent;
use crate::model::item::Item;
use crate::model::knowledge::KnowledgeBase;

/// Read-only input handed to a policy for a single turn.
///
/// Rebuilt by the caller every turn; policies never mutate it.
#[derive(Debug, Clone, Copy)]
pub struct TurnContext<'a> {
    /// Features visible at the current difficulty, in declaration order.
    pub features: &'a [Feature],
    pub knowledge: &'a KnowledgeBase,
    pub history: &'a [HistoryEvent],
    pub candidates: &'a [String],
    pub asked: &'a BTreeSet<String>,
    pub step: u32,
    pub last_guess_id: Option<&'a str>,
}

impl<'a> TurnContext<'a> {
    pub fn item(&self, id: &str) -> Option<&'a Item> {
        self.knowledge.item(id)
    }

    pub fn is_asked(&self, key: &str) -> bool {
        self.asked.contains(key)
    }

    /// Features not yet asked, keeping declaration order.
    pub fn available_features(&self) -> impl Iterator<Item = &'a Feature> + '_ {
        self.features
            .iter()
            .filter(move |feature| !self.asked.contains(&feature.key))
    }
}
