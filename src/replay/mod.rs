//! Deterministic event replayer.

pub mod events;
pub mod replayer;
