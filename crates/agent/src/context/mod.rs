//! Context budget management.
//!
//! Everything here is measured in characters: individual tool results are
//! capped before they enter the history, and the history as a whole is
//! trimmed from the front after every turn.

pub mod budget;

pub use budget::{cap_result, trim_history, TrimReport};
