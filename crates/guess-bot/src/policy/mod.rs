mod balanced;
mod minimax;

pub use balanced::BalancedStrictPolicy;
pub use minimax::MinimaxPolicy;

use guess_core::model::action::Action;

/// Context provided to policies for decision-making
pub use guess_core::game::context::TurnContext as PolicyContext;

/// Unified interface for question/guess strategies.
///
/// Implementations are stateless: identical contexts must yield identical
/// actions, and they are shared across evaluator threads by reference.
pub trait Policy: Send + Sync {
    /// Stable identifier used in reports and telemetry.
    fn name(&self) -> &str;

    /// Choose the next action for this turn.
    fn decide(&self, ctx: &PolicyContext<'_>) -> Action;
}
