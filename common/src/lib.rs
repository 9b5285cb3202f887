//! BudgetShare Common Types
//!
//! Shared types used across the BudgetShare workspace: currency codes and
//! time utilities (constants and an injectable clock).

pub mod monetary;
pub mod time;

pub use monetary::*;
pub use time::*;
