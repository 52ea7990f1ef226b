//! Host-facing contracts and latency harnesses for native app integration.

pub mod channel;
pub mod contract;
pub mod handler;
pub mod latency;
pub mod stdio;
