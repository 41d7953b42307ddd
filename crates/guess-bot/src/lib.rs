pub mod bot;
pub mod policy;

pub use bot::{BotParams, ConfidenceParams, Decision, GuessThresholds, PolicyKind};
pub use policy::{BalancedStrictPolicy, MinimaxPolicy, Policy, PolicyContext};
