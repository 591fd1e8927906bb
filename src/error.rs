// Registration errors surfaced eagerly, before any delivery happens

use thiserror::Error;

/// Errors from listener registration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegisterError {
    /// The listener forwards into this same router; registering it would
    /// make every delivery recurse
    #[error("listener relays back into this router; registration rejected")]
    SelfRelay,

    /// The router has already shut down
    #[error("router has shut down; no further registrations accepted")]
    ShutDown,
}
