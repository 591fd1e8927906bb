// Per-listener delivery policy flags

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Identity handle for a registered listener, assigned at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// How events are delivered to one listener
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerFlags {
    /// Deliver inline on the calling thread, bypassing all queueing.
    /// Opts the listener onto the caller's critical path: inline panics
    /// propagate to the call site.
    #[serde(default)]
    pub sync_handling: bool,

    /// Receive events regardless of the source's level mask
    #[serde(default)]
    pub ignore_filters: bool,

    /// Receive the timestamped variant instead of the plain context
    #[serde(default)]
    pub add_timestamp: bool,
}

/// Registry of per-listener flags, consulted on every dispatch.
///
/// Never-registered listeners get the default (queued, filtered,
/// unstamped). Settable at any time; changes apply to the next dispatch.
pub struct PolicyRegistry {
    flags: DashMap<ListenerId, ListenerFlags>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self {
            flags: DashMap::new(),
        }
    }

    /// Current flags for a listener (defaults when never registered)
    pub fn flags(&self, id: ListenerId) -> ListenerFlags {
        self.flags.get(&id).map(|entry| *entry).unwrap_or_default()
    }

    /// Replace the flags for a listener
    pub fn set_flags(&self, id: ListenerId, flags: ListenerFlags) {
        self.flags.insert(id, flags);
    }

    /// Drop a listener's flags (back to defaults)
    pub fn remove(&self, id: ListenerId) {
        self.flags.remove(&id);
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
