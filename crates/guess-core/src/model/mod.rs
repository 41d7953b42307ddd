pub mod action;
pub mod difficulty;
pub mod feature;
pub mod history;
pub mod item;
pub mod knowledge;
