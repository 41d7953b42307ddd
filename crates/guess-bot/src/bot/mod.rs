mod params;
mod scoring;

pub use params::{BotParams, ConfidenceParams, GuessThresholds};
pub use scoring::{
    CommittedAnswers, SplitCounts, best_candidate_and_confidence, committed_answers,
    score_candidate,
};

use crate::policy::{BalancedStrictPolicy, MinimaxPolicy, Policy};
use core::fmt;
use core::str::FromStr;
use guess_core::game::context::TurnContext;
use guess_core::game::session::NO_CANDIDATES;
use guess_core::model::action::Action;
use guess_core::model::feature::Feature;
use std::sync::OnceLock;
use tracing::{Level, event};

/// Built-in decision strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PolicyKind {
    #[default]
    BalancedStrict,
    Minimax,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 2] = [PolicyKind::BalancedStrict, PolicyKind::Minimax];

    /// Kind named by `GUESS_POLICY`, read once per process.
    pub fn from_env() -> Self {
        static CACHED: OnceLock<PolicyKind> = OnceLock::new();
        *CACHED.get_or_init(|| Self::from_reader(|key| std::env::var(key).ok()))
    }

    fn from_reader<F>(mut read: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        read("GUESS_POLICY")
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            PolicyKind::BalancedStrict => "balanced_strict",
            PolicyKind::Minimax => "minimax",
        }
    }

    pub const fn params(self) -> BotParams {
        match self {
            PolicyKind::BalancedStrict => BotParams::BALANCED_STRICT,
            PolicyKind::Minimax => BotParams::MINIMAX,
        }
    }

    pub fn spawn(self) -> Box<dyn Policy> {
        self.spawn_with(self.params())
    }

    /// Build the strategy with tuned constants instead of its defaults.
    pub fn spawn_with(self, params: BotParams) -> Box<dyn Policy> {
        match self {
            PolicyKind::BalancedStrict => Box::new(BalancedStrictPolicy::with_params(params)),
            PolicyKind::Minimax => Box::new(MinimaxPolicy::with_params(params)),
        }
    }
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "balanced_strict" | "balanced" | "strict" => Ok(PolicyKind::BalancedStrict),
            "minimax" | "worst_case" => Ok(PolicyKind::Minimax),
            other => Err(format!("unknown policy '{other}'")),
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy-specific half of the decision: which question to ask next.
pub(crate) trait QuestionPlanner {
    /// Pick among `available` (unasked, declaration order); `None` forces a guess.
    fn select_question<'a>(
        &self,
        available: &[&'a Feature],
        ctx: &TurnContext<'a>,
    ) -> Option<&'a Feature>;
}

/// Action plus the branch of the skeleton that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub action: Action,
    pub reason: &'static str,
}

impl Decision {
    fn new(action: Action, reason: &'static str) -> Self {
        Self { action, reason }
    }
}

/// Control flow shared by every strategy.
///
/// Empty → done, single candidate → certain guess, guess policy, then the
/// planner's question; any dead end falls back to guessing the best candidate.
pub(crate) fn plan<P>(ctx: &TurnContext<'_>, params: &BotParams, planner: &P) -> Decision
where
    P: QuestionPlanner + ?Sized,
{
    if let [only] = ctx.candidates {
        return Decision::new(Action::guess(only.clone(), 1.0), "single_candidate");
    }

    let answers = committed_answers(ctx.history);
    let Some((best_id, confidence)) =
        best_candidate_and_confidence(ctx.knowledge, ctx.candidates, &answers, params.confidence)
    else {
        return Decision::new(Action::done(NO_CANDIDATES), "no_candidates");
    };
    let best_guess = || Action::guess(best_id, confidence);

    if params.guess.should_guess(
        ctx.candidates.len(),
        ctx.step,
        confidence,
        best_id,
        ctx.last_guess_id,
    ) {
        return Decision::new(best_guess(), "guess_threshold");
    }

    let available: Vec<&Feature> = ctx.available_features().collect();
    if available.is_empty() {
        return Decision::new(best_guess(), "features_exhausted");
    }

    match planner.select_question(&available, ctx) {
        Some(feature) => Decision::new(Action::question(feature.key.clone()), "best_split"),
        None => Decision::new(best_guess(), "no_useful_question"),
    }
}

pub(crate) fn log_decision(kind: PolicyKind, ctx: &TurnContext<'_>, decision: &Decision) {
    if !tracing::enabled!(Level::INFO) {
        return;
    }

    let (target_key, confidence) = match &decision.action {
        Action::Question { key } => (key.as_str(), None),
        Action::Guess {
            item_id,
            confidence,
        } => (item_id.as_str(), Some(*confidence)),
        Action::Done { message } => (message.as_str(), None),
    };

    event!(
        target: "guess_bot::decision",
        Level::INFO,
        policy = kind.as_str(),
        step = ctx.step,
        candidates = ctx.candidates.len(),
        asked = ctx.asked.len(),
        action = decision.action.kind(),
        chosen = %target_key,
        confidence = confidence.unwrap_or(0.0),
        reason = decision.reason,
    );
}
