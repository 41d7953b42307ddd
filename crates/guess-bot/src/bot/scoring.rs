use std::collections::BTreeMap;

use guess_core::model::action::clamp_unit;
use guess_core::model::history::HistoryEvent;
use guess_core::model::item::{Item, Tristate};
use guess_core::model::knowledge::KnowledgeBase;

use super::params::ConfidenceParams;

/// Definite yes/no answers per feature key.
pub type CommittedAnswers = BTreeMap<String, bool>;

/// Collect the latest definite answer for each feature.
///
/// A later `skip` withdraws an earlier yes/no for the same key.
pub fn committed_answers(history: &[HistoryEvent]) -> CommittedAnswers {
    let mut answers = CommittedAnswers::new();
    for event in history {
        let HistoryEvent::Answer { key, value } = event else {
            continue;
        };
        match value.as_bool() {
            Some(wanted) => {
                answers.insert(key.clone(), wanted);
            }
            None => {
                answers.remove(key);
            }
        }
    }
    answers
}

/// Average agreement of an item with the committed answers.
///
/// Match counts 1.0, unknown 0.5, mismatch 0.0. With nothing committed every
/// item scores 0.5. A missing item is treated as fully unknown.
pub fn score_candidate(item: Option<&Item>, answers: &CommittedAnswers) -> f64 {
    if answers.is_empty() {
        return 0.5;
    }
    let total: f64 = answers
        .iter()
        .map(|(key, &wanted)| {
            let have = item.map(|item| item.attr(key)).unwrap_or(Tristate::Unknown);
            match have.as_bool() {
                None => 0.5,
                Some(value) if value == wanted => 1.0,
                Some(_) => 0.0,
            }
        })
        .sum();
    total / answers.len() as f64
}

/// Highest-scoring candidate and its confidence.
///
/// Only a strictly greater score replaces the current best, so ties keep the
/// earlier candidate. Returns `None` for an empty candidate list.
pub fn best_candidate_and_confidence<'c>(
    knowledge: &KnowledgeBase,
    candidates: &'c [String],
    answers: &CommittedAnswers,
    params: ConfidenceParams,
) -> Option<(&'c str, f64)> {
    let mut best: Option<(&'c str, f64)> = None;
    for id in candidates {
        let score = score_candidate(knowledge.item(id), answers);
        if best.is_none_or(|(_, best_score)| score > best_score) {
            best = Some((id.as_str(), score));
        }
    }
    best.map(|(id, score)| (id, clamp_unit(score * params.factor(candidates.len()))))
}

/// How a feature splits the current candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SplitCounts {
    pub yes: usize,
    pub no: usize,
    pub unknown: usize,
}

impl SplitCounts {
    pub fn tally(knowledge: &KnowledgeBase, candidates: &[String], key: &str) -> Self {
        let mut counts = SplitCounts::default();
        for id in candidates {
            let attr = knowledge
                .item(id)
                .map(|item| item.attr(key))
                .unwrap_or(Tristate::Unknown);
            match attr {
                Tristate::True => counts.yes += 1,
                Tristate::False => counts.no += 1,
                Tristate::Unknown => counts.unknown += 1,
            }
        }
        counts
    }

    pub fn known(self) -> usize {
        self.yes + self.no
    }

    /// `|yes - no| / max(1, yes + no)`: 0 for an even split, 1 for one-sided.
    pub fn imbalance(self) -> f64 {
        self.yes.abs_diff(self.no) as f64 / self.known().max(1) as f64
    }
}
