//! Structured telemetry: data model (C9), durable store (C9), and
//! read-only dashboard (C10).

pub mod model;
pub mod schema;
pub mod store;
pub mod web;

pub use model::{Exchange, LlmCallRecord, PhaseTiming, Session, PHASE_NAMES};
pub use store::TelemetryStore;
pub use web::TelemetryWeb;
