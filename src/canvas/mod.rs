//! Canvas integration for visual output.
//!
//! Bridges fae's voice pipeline with the `canvas-core` scene graph,
//! mapping pipeline events to renderable scene elements.

pub mod bridge;
pub mod registry;
pub mod session;
pub mod tools;
pub mod types;
