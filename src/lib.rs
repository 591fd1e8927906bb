// Asynchronous log-dispatch pipeline for game-modding hosts
//
// A synchronous log call on any thread becomes an immutable enriched
// context, delivered in order to every registered listener: sync listeners
// inline on the caller, everything else through a shared dispatch stage
// that fans out to one dedicated worker thread per listener.

pub mod config;
mod context;
mod error;
mod filter;
mod host;
mod listener;
#[macro_use]
mod macros;
mod policy;
mod ringbuffer;
mod router;
mod severity;
mod sync;
mod worker;

// Public exports
pub use config::{ConfigError, RelayConfig, ShutdownStyle};
pub use context::{EventContext, LogEvent, StampedEvent, TimestampKind};
pub use error::RegisterError;
pub use filter::FilterTable;
pub use host::{HostEnv, SystemEnv};
pub use listener::{ConsoleListener, ConsoleTarget, Listener, MemoryListener};
pub use policy::{ListenerFlags, ListenerId, PolicyRegistry};
pub use ringbuffer::RingBuffer;
pub use router::{DispatchRouter, RelayListener};
pub use severity::{LevelMask, Severity};
pub use worker::{DispatchFn, DispatchWorker, WorkerEvent, WorkerObserver, WorkerState};
