//! `AppleEcosystemTool` — extension trait for permission-gated Apple tools.
//!
//! All Apple ecosystem tools (Contacts, Calendar, Reminders, Mail, Notes) extend
//! this trait to declare the macOS permission they require and gain a default
//! [`is_available`](AppleEcosystemTool::is_available) implementation.

use crate::fae_llm::tools::types::Tool;
use crate::permissions::{PermissionKind, PermissionStore};

/// Extension trait for Apple-framework tools that require a specific macOS
/// permission to operate.
///
/// Implementors must provide the [`Tool`] methods and declare which
/// [`PermissionKind`] gates them.  The default [`is_available`] returns
/// `true` only when that permission is granted in the supplied store.
///
/// [`is_available`]: AppleEcosystemTool::is_available
pub trait AppleEcosystemTool: Tool {
    /// The macOS permission this tool requires.
    fn required_permission(&self) -> PermissionKind;

    /// Whether this tool is available given the current permission state.
    ///
    /// Returns `true` only when [`required_permission`] is granted in `store`.
    ///
    /// [`required_permission`]: AppleEcosystemTool::required_permission
    fn is_available(&self, store: &PermissionStore) -> bool {
        store.is_granted(self.required_permission())
    }
}
