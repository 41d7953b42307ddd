use super::{Policy, PolicyContext};
use crate::bot::{BotParams, PolicyKind, QuestionPlanner, SplitCounts, log_decision, plan};
use guess_core::model::action::Action;
use guess_core::model::feature::Feature;

/// Weight of the unknown share in the split score.
const UNKNOWN_PENALTY: f64 = 0.7;

/// Asks the question that splits the candidates most evenly.
///
/// Only features with candidates on both sides qualify; unknowns are penalised.
#[derive(Debug, Clone, Copy)]
pub struct BalancedStrictPolicy {
    params: BotParams,
}

impl BalancedStrictPolicy {
    pub fn new() -> Self {
        Self::with_params(BotParams::BALANCED_STRICT)
    }

    pub fn with_params(params: BotParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &BotParams {
        &self.params
    }
}

impl Default for BalancedStrictPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl QuestionPlanner for BalancedStrictPolicy {
    fn select_question<'a>(
        &self,
        available: &[&'a Feature],
        ctx: &PolicyContext<'a>,
    ) -> Option<&'a Feature> {
        let total = ctx.candidates.len().max(1) as f64;
        let mut best: Option<(&'a Feature, f64)> = None;

        for &feature in available {
            let counts = SplitCounts::tally(ctx.knowledge, ctx.candidates, &feature.key);
            if counts.yes == 0 || counts.no == 0 {
                continue;
            }

            let unknown_ratio = counts.unknown as f64 / total;
            let score = counts.imbalance() + UNKNOWN_PENALTY * unknown_ratio;
            if best.is_none_or(|(_, best_score)| score < best_score) {
                best = Some((feature, score));
            }
        }

        best.map(|(feature, _)| feature)
    }
}

impl Policy for BalancedStrictPolicy {
    fn name(&self) -> &str {
        PolicyKind::BalancedStrict.as_str()
    }

    fn decide(&self, ctx: &PolicyContext<'_>) -> Action {
        let decision = plan(ctx, &self.params, self);
        log_decision(PolicyKind::BalancedStrict, ctx, &decision);
        decision.action
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::fixtures::{asked, context, four_items, ids};
    use guess_core::model::feature::Feature;
    use guess_core::model::history::{AnswerValue, HistoryEvent};
    use guess_core::model::item::Item;
    use guess_core::model::knowledge::KnowledgeBase;

    #[test]
    fn empty_candidates_are_done() {
        let kb = four_items();
        let asked = asked(&[]);
        let ctx = context(&kb, &[], &[], &asked, 3);
        assert_eq!(
            BalancedStrictPolicy::new().decide(&ctx),
            Action::done("no candidates remain")
        );
    }

    #[test]
    fn single_candidate_is_certain() {
        let kb = four_items();
        let candidates = ids(&["C"]);
        let asked = asked(&[]);
        let ctx = context(&kb, &candidates, &[], &asked, 0);
        assert_eq!(
            BalancedStrictPolicy::new().decide(&ctx),
            Action::guess("C", 1.0)
        );
    }

    #[test]
    fn opens_with_the_even_split() {
        let kb = four_items();
        let candidates = ids(&["A", "B", "C", "D"]);
        let asked = asked(&[]);
        let ctx = context(&kb, &candidates, &[], &asked, 0);
        assert_eq!(
            BalancedStrictPolicy::new().decide(&ctx),
            Action::question("f1")
        );
    }

    #[test]
    fn yes_to_f1_leads_to_guessing_alpha() {
        let kb = four_items();
        let candidates = ids(&["A", "B"]);
        let history = vec![
            HistoryEvent::question("f1"),
            HistoryEvent::answer("f1", AnswerValue::Yes),
        ];
        let asked = asked(&["f1"]);
        let ctx = context(&kb, &candidates, &history, &asked, 1);
        assert_eq!(
            BalancedStrictPolicy::new().decide(&ctx),
            Action::guess("A", 1.0)
        );
    }

    #[test]
    fn one_sided_features_are_never_asked() {
        let kb = KnowledgeBase::new(
            Vec::new(),
            vec![Feature::new("all", "All?"), Feature::new("half", "Half?")],
            vec![
                Item::new("p", "P").with_attr("all", true).with_attr("half", true),
                Item::new("q", "Q").with_attr("all", true).with_attr("half", false),
                Item::new("r", "R").with_attr("all", true),
            ],
        )
        .unwrap();
        let candidates = ids(&["p", "q", "r"]);
        let nothing_asked = asked(&[]);
        let ctx = context(&kb, &candidates, &[], &nothing_asked, 0);
        assert_eq!(
            BalancedStrictPolicy::new().decide(&ctx),
            Action::question("half")
        );

        // only the one-sided feature left: fall back to the best candidate
        let half_asked = asked(&["half"]);
        let ctx = context(&kb, &candidates, &[], &half_asked, 0);
        assert!(matches!(
            BalancedStrictPolicy::new().decide(&ctx),
            Action::Guess { item_id, .. } if item_id == "p"
        ));
    }

    #[test]
    fn exhausted_features_fall_back_to_guess() {
        let kb = four_items();
        let candidates = ids(&["C", "D", "A"]);
        let asked = asked(&["f1", "f2"]);
        let ctx = context(&kb, &candidates, &[], &asked, 0);
        let action = BalancedStrictPolicy::new().decide(&ctx);
        let expected_confidence = 0.5 * (0.25f64 + 2.0 / 3.0).clamp(0.0, 1.0);
        match action {
            Action::Guess {
                item_id,
                confidence,
            } => {
                assert_eq!(item_id, "C");
                assert!((confidence - expected_confidence).abs() < 1e-12);
            }
            other => panic!("expected guess, got {other:?}"),
        }
    }

    #[test]
    fn decisions_are_repeatable() {
        let kb = four_items();
        let candidates = ids(&["D", "C", "B", "A"]);
        let history = vec![HistoryEvent::answer("f2", AnswerValue::Skip)];
        let asked = asked(&["f2"]);
        let ctx = context(&kb, &candidates, &history, &asked, 1);
        let policy = BalancedStrictPolicy::new();
        let first = policy.decide(&ctx);
        assert_eq!(first, policy.decide(&ctx));
        assert_eq!(first, Action::question("f1"));
    }
}
