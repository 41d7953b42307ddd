use super::{Policy, PolicyContext};
use crate::bot::{BotParams, PolicyKind, QuestionPlanner, SplitCounts, log_decision, plan};
use guess_core::model::action::Action;
use guess_core::model::feature::Feature;

const UNKNOWN_WEIGHT: f64 = 0.5;
const IMBALANCE_WEIGHT: f64 = 0.2;

/// Asks the question whose worst answer leaves the fewest candidates.
///
/// A one-sided split still qualifies, but any unknown counts as a possible
/// non-shrinking outcome. When no question beats the current candidate count
/// the policy guesses instead.
#[derive(Debug, Clone, Copy)]
pub struct MinimaxPolicy {
    params: BotParams,
}

impl MinimaxPolicy {
    pub fn new() -> Self {
        Self::with_params(BotParams::MINIMAX)
    }

    pub fn with_params(params: BotParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &BotParams {
        &self.params
    }
}

impl Default for MinimaxPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Largest candidate set that can survive an answer to this split.
pub(crate) fn worst_case(counts: SplitCounts, total: usize) -> usize {
    let size_yes = counts.yes + counts.unknown;
    let size_no = counts.no + counts.unknown;
    let stalled = if counts.unknown > 0 { total } else { 0 };
    size_yes.max(size_no).max(stalled)
}

impl QuestionPlanner for MinimaxPolicy {
    fn select_question<'a>(
        &self,
        available: &[&'a Feature],
        ctx: &PolicyContext<'a>,
    ) -> Option<&'a Feature> {
        let total = ctx.candidates.len();
        let total_f = total as f64;
        let mut best: Option<(&'a Feature, f64)> = None;

        for &feature in available {
            let counts = SplitCounts::tally(ctx.knowledge, ctx.candidates, &feature.key);
            if counts.yes == 0 && counts.no == 0 {
                continue;
            }

            let unknown_ratio = counts.unknown as f64 / total.max(1) as f64;
            let score = worst_case(counts, total) as f64
                + UNKNOWN_WEIGHT * unknown_ratio * total_f
                + IMBALANCE_WEIGHT * counts.imbalance() * total_f;
            if best.is_none_or(|(_, best_score)| score < best_score) {
                best = Some((feature, score));
            }
        }

        best.filter(|(_, score)| *score < total_f)
            .map(|(feature, _)| feature)
    }
}

impl Policy for MinimaxPolicy {
    fn name(&self) -> &str {
        PolicyKind::Minimax.as_str()
    }

    fn decide(&self, ctx: &PolicyContext<'_>) -> Action {
        let decision = plan(ctx, &self.params, self);
        log_decision(PolicyKind::Minimax, ctx, &decision);
        decision.action
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::fixtures::{asked, context, four_items, ids};
    use guess_core::model::history::{AnswerValue, HistoryEvent};
    use guess_core::model::item::Item;
    use guess_core::model::knowledge::KnowledgeBase;

    #[test]
    fn empty_and_single_candidate_contract() {
        let kb = four_items();
        let nothing = asked(&[]);
        let ctx = context(&kb, &[], &[], &nothing, 0);
        assert!(MinimaxPolicy::new().decide(&ctx).is_done());

        let only = ids(&["B"]);
        let ctx = context(&kb, &only, &[], &nothing, 5);
        assert_eq!(MinimaxPolicy::new().decide(&ctx), Action::guess("B", 1.0));
    }

    #[test]
    fn worst_case_treats_unknown_as_stall() {
        let even = SplitCounts {
            yes: 2,
            no: 2,
            unknown: 0,
        };
        assert_eq!(worst_case(even, 4), 2);
        let with_unknown = SplitCounts {
            yes: 1,
            no: 1,
            unknown: 2,
        };
        assert_eq!(worst_case(with_unknown, 4), 4);
    }

    #[test]
    fn opens_with_the_even_split() {
        let kb = four_items();
        let candidates = ids(&["A", "B", "C", "D"]);
        let nothing = asked(&[]);
        let ctx = context(&kb, &candidates, &[], &nothing, 0);
        assert_eq!(MinimaxPolicy::new().decide(&ctx), Action::question("f1"));
    }

    #[test]
    fn keeps_asking_with_two_candidates_early() {
        let kb = four_items();
        let candidates = ids(&["A", "B"]);
        let history = vec![
            HistoryEvent::question("f1"),
            HistoryEvent::answer("f1", AnswerValue::Yes),
        ];
        let f1 = asked(&["f1"]);
        let ctx = context(&kb, &candidates, &history, &f1, 1);
        assert_eq!(MinimaxPolicy::new().decide(&ctx), Action::question("f2"));

        let ctx = context(&kb, &candidates, &history, &f1, 2);
        assert_eq!(MinimaxPolicy::new().decide(&ctx), Action::guess("A", 1.0));
    }

    #[test]
    fn guesses_when_no_question_reduces_worst_case() {
        let kb = four_items();
        let candidates = ids(&["A", "B", "C", "D"]);
        // f2 leaves C and D unknown, so its worst case is all four candidates
        let f1 = asked(&["f1"]);
        let ctx = context(&kb, &candidates, &[], &f1, 0);
        match MinimaxPolicy::new().decide(&ctx) {
            Action::Guess {
                item_id,
                confidence,
            } => {
                assert_eq!(item_id, "A");
                assert!((confidence - 0.375).abs() < 1e-12);
            }
            other => panic!("expected guess, got {other:?}"),
        }
    }

    #[test]
    fn one_sided_split_is_usable() {
        let kb = KnowledgeBase::new(
            Vec::new(),
            vec![Feature::new("lopsided", "Lopsided?")],
            vec![
                Item::new("w", "W").with_attr("lopsided", true),
                Item::new("x", "X").with_attr("lopsided", true),
                Item::new("y", "Y").with_attr("lopsided", true),
                Item::new("z", "Z").with_attr("lopsided", false),
            ],
        )
        .unwrap();
        let candidates = ids(&["w", "x", "y", "z"]);
        let nothing = asked(&[]);
        let ctx = context(&kb, &candidates, &[], &nothing, 0);
        // worst 3 + 0.2 * 0.5 * 4 = 3.4 < 4
        assert_eq!(
            MinimaxPolicy::new().decide(&ctx),
            Action::question("lopsided")
        );

        let all_true = ids(&["w", "x", "y"]);
        let ctx = context(&kb, &all_true, &[], &nothing, 0);
        assert!(matches!(
            MinimaxPolicy::new().decide(&ctx),
            Action::Guess { item_id, .. } if item_id == "w"
        ));
    }

    #[test]
    fn never_selects_a_non_reducing_feature() {
        let kb = KnowledgeBase::new(
            Vec::new(),
            vec![
                Feature::new("foggy", "Foggy?"),
                Feature::new("clear", "Clear?"),
            ],
            vec![
                Item::new("a", "A").with_attr("foggy", true).with_attr("clear", true),
                Item::new("b", "B").with_attr("clear", true),
                Item::new("c", "C").with_attr("foggy", false).with_attr("clear", false),
                Item::new("d", "D").with_attr("clear", false),
                Item::new("e", "E").with_attr("foggy", true).with_attr("clear", false),
            ],
        )
        .unwrap();
        let candidates = ids(&["a", "b", "c", "d", "e"]);
        let nothing = asked(&[]);
        let ctx = context(&kb, &candidates, &[], &nothing, 0);
        let action = MinimaxPolicy::new().decide(&ctx);
        assert_eq!(action, Action::question("clear"));
        assert_eq!(action, MinimaxPolicy::new().decide(&ctx));
    }
}
