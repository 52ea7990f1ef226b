//! Voice pipeline orchestration (C8).
//!
//! `coordinator.rs` and `messages.rs` are kept alongside as reference
//! during the ongoing transformation; they are not part of the module
//! tree below and are removed once it is complete.

pub mod orchestrator;

pub use orchestrator::Orchestrator;
