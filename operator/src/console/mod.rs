pub mod actions;
pub mod job;
pub mod phase;
pub mod rbac;
pub mod reconcile;

pub use reconcile::{Config, run};
