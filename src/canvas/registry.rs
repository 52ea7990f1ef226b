//! Thread-safe canvas session registry.
//!
//! Allows canvas tools to look up active sessions by ID. The GUI registers
//! its session on startup; tools reference it during execution.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::session::CanvasSession;

/// Registry of active canvas sessions, keyed by session ID.
///
/// Wraps sessions in `Arc<Mutex<_>>` so they can be shared across the agent
/// tool system (which requires `Send + Sync`).
pub struct CanvasSessionRegistry {
    sessions: HashMap<String, Arc<Mutex<CanvasSession>>>,
}

impl CanvasSessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    /// Register a session. Returns the previous session with the same ID, if any.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        session: Arc<Mutex<CanvasSession>>,
    ) -> Option<Arc<Mutex<CanvasSession>>> {
        self.sessions.insert(id.into(), session)
    }

    /// Look up a session by ID.
    pub fn get(&self, id: &str) -> Option<Arc<Mutex<CanvasSession>>> {
        self.sessions.get(id).cloned()
    }

    /// Remove a session by ID, returning it if it existed.
    pub fn remove(&mut self, id: &str) -> Option<Arc<Mutex<CanvasSession>>> {
        self.sessions.remove(id)
    }

    /// List all registered session IDs.
    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.keys().cloned().collect()
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for CanvasSessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
