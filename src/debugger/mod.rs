//! Debugger state access
//!
//! Devices expose their register files as JSON so a front end can show
//! and edit them without knowing each device's types.

use serde_json::Value;

/// A component whose state can be inspected and patched.
pub trait Debuggable {
    /// Snapshot of the component's registers.
    fn read_state(&self) -> Value;

    /// Restore registers from a snapshot. Malformed input is logged and
    /// leaves the component unchanged.
    fn write_state(&mut self, state: &Value);
}
