//! External-collaborator boundary: input ingestion and report rendering
//! are pure adapters around the core simulation, not part of it.

pub mod events;
pub mod report;
