// SPDX-License-Identifier: Apache-2.0 OR MIT
// Listener contract and the built-in console/memory sinks

use crate::context::LogEvent;
use std::io::Write;
use std::sync::Mutex;

/// A destination that consumes log events.
///
/// `log_event` is called from whichever thread the delivery policy picked:
/// inline on the caller for sync listeners, on a dedicated worker thread
/// otherwise. Implementations must not assume calling-thread identity. The
/// source identity, severity and payload all travel inside the event.
pub trait Listener: Send + Sync {
    /// Consume one event
    fn log_event(&self, event: &LogEvent);

    /// Flush buffered state. Invoked by the owning worker when its queue
    /// goes idle, so durable listeners can sync without per-event cost.
    fn flush(&self) {}

    /// Release resources at shutdown, after the owning worker has drained
    fn dispose(&self) {}

    /// If this listener forwards into a router, the identity of that
    /// router. Used to reject registrations that would recurse.
    fn relay_target(&self) -> Option<usize> {
        None
    }
}

/// Which standard stream a [`ConsoleListener`] writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleTarget {
    Stdout,
    Stderr,
}

/// Console sink: one rendered line per event
pub struct ConsoleListener {
    target: ConsoleTarget,
}

impl ConsoleListener {
    pub fn stdout() -> Self {
        Self {
            target: ConsoleTarget::Stdout,
        }
    }

    pub fn stderr() -> Self {
        Self {
            target: ConsoleTarget::Stderr,
        }
    }
}

impl Listener for ConsoleListener {
    fn log_event(&self, event: &LogEvent) {
        let line = event.render_line();
        match self.target {
            ConsoleTarget::Stdout => {
                let _ = writeln!(std::io::stdout().lock(), "{}", line);
            }
            ConsoleTarget::Stderr => {
                let _ = writeln!(std::io::stderr().lock(), "{}", line);
            }
        }
    }

    fn flush(&self) {
        match self.target {
            ConsoleTarget::Stdout => {
                let _ = std::io::stdout().flush();
            }
            ConsoleTarget::Stderr => {
                let _ = std::io::stderr().flush();
            }
        }
    }
}

/// In-memory capture sink, used by tests and in-process inspection
pub struct MemoryListener {
    records: Mutex<Vec<(u64, String)>>,
    flushes: Mutex<u32>,
    disposed: Mutex<bool>,
}

impl MemoryListener {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            flushes: Mutex::new(0),
            disposed: Mutex::new(false),
        }
    }

    /// Rendered lines in delivery order
    pub fn lines(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|(_, line)| line.clone())
            .collect()
    }

    /// Context ids in delivery order
    pub fn ids(&self) -> Vec<u64> {
        self.records.lock().unwrap().iter().map(|(id, _)| *id).collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn flush_count(&self) -> u32 {
        *self.flushes.lock().unwrap()
    }

    pub fn is_disposed(&self) -> bool {
        *self.disposed.lock().unwrap()
    }
}

impl Default for MemoryListener {
    fn default() -> Self {
        Self::new()
    }
}

impl Listener for MemoryListener {
    fn log_event(&self, event: &LogEvent) {
        self.records
            .lock()
            .unwrap()
            .push((event.context().id(), event.render_line()));
    }

    fn flush(&self) {
        *self.flushes.lock().unwrap() += 1;
    }

    fn dispose(&self) {
        *self.disposed.lock().unwrap() = true;
    }
}
