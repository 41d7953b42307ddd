pub mod context;
pub mod serialization;
pub mod session;
