//! CLI command implementations.

pub mod check;
pub mod inspect;
pub mod reconcile;
pub mod run;
