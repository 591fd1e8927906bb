// SPDX-License-Identifier: Apache-2.0 OR MIT
// Enriched, immutable snapshot of one log occurrence

use crate::filter::FilterTable;
use crate::host::HostEnv;
use crate::severity::{LevelMask, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};

/// Formatting for the prefix attached by timestamped delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimestampKind {
    /// No prefix; timestamped delivery is an identity transform
    #[default]
    None,
    /// Wall-clock time, `HH:MM:SS.mmm`
    WallClock,
    /// Host tick counter, zero-padded to 16 digits
    Tick,
    /// Host frame counter, zero-padded to 16 digits; falls back to a
    /// centered thread name of the same width when no frame was captured
    Frame,
    /// Event sequence id, zero-padded to 16 digits
    Sequence,
}

/// Width of the fixed prefix column for the counter-based kinds
const PREFIX_WIDTH: usize = 16;

/// Immutable snapshot of one log occurrence.
///
/// Built exactly once on the calling thread, then shared read-only across
/// every fan-out branch. Enrichment that must see the originating call
/// frame (the stack trace) happens here, before any queueing.
pub struct EventContext {
    id: u64,
    timestamp: DateTime<Utc>,
    thread_id: u32,
    thread_name: Option<String>,
    tick: u32,
    frame: Option<i32>,
    stack_trace: Option<String>,
    level: Severity,
    source: String,
    payload: String,
    /// Memoized filter decision (true = excluded by the source's mask)
    filtered: OnceLock<bool>,
    /// Memoized timestamped derivation, shared by all stamped listeners
    stamped: OnceLock<Arc<StampedEvent>>,
}

impl EventContext {
    /// Capture a context for a raw log event.
    ///
    /// `id` comes from the owning router's atomic counter. The stack trace
    /// is captured eagerly when the severity is in `traceable` and the
    /// source is not the bootstrap logger; this is the one deliberately
    /// expensive step and it must run on the originating thread.
    pub fn capture(
        id: u64,
        source: &str,
        level: Severity,
        payload: String,
        env: &dyn HostEnv,
        traceable: LevelMask,
        bootstrap_source: &str,
    ) -> Self {
        let current = std::thread::current();
        let frame = if env.is_main_thread() && !env.is_shutting_down() {
            env.frame()
        } else {
            None
        };
        let stack_trace = if traceable.contains(level) && source != bootstrap_source {
            Some(std::backtrace::Backtrace::force_capture().to_string())
        } else {
            None
        };

        Self {
            id,
            timestamp: Utc::now(),
            thread_id: current_thread_id(),
            thread_name: current.name().map(String::from),
            tick: env.tick(),
            frame,
            stack_trace,
            level,
            source: source.to_string(),
            payload,
            filtered: OnceLock::new(),
            stamped: OnceLock::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn thread_id(&self) -> u32 {
        self.thread_id
    }

    pub fn thread_name(&self) -> Option<&str> {
        self.thread_name.as_deref()
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn frame(&self) -> Option<i32> {
        self.frame
    }

    pub fn stack_trace(&self) -> Option<&str> {
        self.stack_trace.as_deref()
    }

    pub fn level(&self) -> Severity {
        self.level
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Whether the source's configured mask excludes this event.
    ///
    /// Evaluated once against `filters` and memoized; listeners registered
    /// with `ignore_filters` bypass this entirely.
    pub fn is_filtered(&self, filters: &FilterTable) -> bool {
        *self
            .filtered
            .get_or_init(|| !filters.allows(&self.source, self.level))
    }

    /// Derive the timestamped variant, computing the prefix at most once
    /// per context. `TimestampKind::None` yields the plain event unchanged.
    pub fn to_timestamped(self: &Arc<Self>, kind: TimestampKind) -> LogEvent {
        if kind == TimestampKind::None {
            return LogEvent::Plain(Arc::clone(self));
        }
        let stamped = self.stamped.get_or_init(|| {
            Arc::new(StampedEvent {
                prefix: self.render_prefix(kind),
                base: Arc::clone(self),
            })
        });
        LogEvent::Timestamped(Arc::clone(stamped))
    }

    fn render_prefix(&self, kind: TimestampKind) -> String {
        match kind {
            TimestampKind::None => String::new(),
            TimestampKind::WallClock => self.timestamp.format("%H:%M:%S%.3f").to_string(),
            TimestampKind::Tick => format!("{:0width$}", self.tick, width = PREFIX_WIDTH),
            TimestampKind::Frame => match self.frame {
                Some(frame) => format!("{:0width$}", frame, width = PREFIX_WIDTH),
                // No frame captured (off-main-thread or shutdown): identify
                // the thread instead, centered in the same fixed column
                None => {
                    let name = self.thread_name.as_deref().unwrap_or("unnamed");
                    let truncated: String = name.chars().take(PREFIX_WIDTH).collect();
                    format!("{:^width$}", truncated, width = PREFIX_WIDTH)
                }
            },
            TimestampKind::Sequence => format!("{:0width$}", self.id, width = PREFIX_WIDTH),
        }
    }
}

impl std::fmt::Debug for EventContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventContext")
            .field("id", &self.id)
            .field("level", &self.level)
            .field("source", &self.source)
            .field("payload", &self.payload)
            .finish()
    }
}

/// Timestamped wrapper around a context: the base plus a formatted prefix.
/// Never mutates the original.
pub struct StampedEvent {
    prefix: String,
    base: Arc<EventContext>,
}

impl StampedEvent {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn base(&self) -> &Arc<EventContext> {
        &self.base
    }
}

/// What a listener receives: the plain context or its timestamped wrapper.
///
/// A tagged variant instead of subtyping, so delivery code matches on the
/// discriminator rather than downcasting.
#[derive(Clone)]
pub enum LogEvent {
    Plain(Arc<EventContext>),
    Timestamped(Arc<StampedEvent>),
}

impl LogEvent {
    /// The underlying context, whichever variant this is
    pub fn context(&self) -> &Arc<EventContext> {
        match self {
            LogEvent::Plain(ctx) => ctx,
            LogEvent::Timestamped(stamped) => stamped.base(),
        }
    }

    /// The formatted prefix, if this is the timestamped variant
    pub fn prefix(&self) -> Option<&str> {
        match self {
            LogEvent::Plain(_) => None,
            LogEvent::Timestamped(stamped) => Some(stamped.prefix()),
        }
    }

    /// Timestamped derivation at the event level: already-timestamped
    /// events are returned unchanged.
    pub fn to_timestamped(&self, kind: TimestampKind) -> LogEvent {
        match self {
            LogEvent::Plain(ctx) => ctx.to_timestamped(kind),
            LogEvent::Timestamped(_) => self.clone(),
        }
    }

    /// Render a display line the way the console listener prints it
    pub fn render_line(&self) -> String {
        let ctx = self.context();
        match self.prefix() {
            Some(prefix) => format!(
                "[{}] [{}] [{}] {}",
                prefix,
                ctx.level(),
                ctx.source(),
                ctx.payload()
            ),
            None => format!("[{}] [{}] {}", ctx.level(), ctx.source(), ctx.payload()),
        }
    }
}

/// Get current thread ID (truncated to u32)
fn current_thread_id() -> u32 {
    #[cfg(target_os = "linux")]
    {
        unsafe { libc::gettid() as u32 }
    }
    #[cfg(not(target_os = "linux"))]
    {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        std::thread::current().id().hash(&mut hasher);
        hasher.finish() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::SystemEnv;

    fn capture(level: Severity, traceable: LevelMask) -> Arc<EventContext> {
        let env = SystemEnv::new();
        Arc::new(EventContext::capture(
            7,
            "test",
            level,
            "hello".to_string(),
            &env,
            traceable,
            "bootstrap",
        ))
    }

    #[test]
    fn test_capture_basics() {
        let ctx = capture(Severity::Info, LevelMask::NONE);
        assert_eq!(ctx.id(), 7);
        assert_eq!(ctx.level(), Severity::Info);
        assert_eq!(ctx.source(), "test");
        assert_eq!(ctx.payload(), "hello");
        assert!(ctx.stack_trace().is_none());
    }

    #[test]
    fn test_stack_trace_on_traceable_levels() {
        let ctx = capture(Severity::Error, LevelMask::of(&[Severity::Error]));
        assert!(ctx.stack_trace().is_some());

        let ctx = capture(Severity::Info, LevelMask::of(&[Severity::Error]));
        assert!(ctx.stack_trace().is_none());
    }

    #[test]
    fn test_bootstrap_source_never_traced() {
        let env = SystemEnv::new();
        let ctx = EventContext::capture(
            1,
            "bootstrap",
            Severity::Error,
            "early".to_string(),
            &env,
            LevelMask::ALL,
            "bootstrap",
        );
        assert!(ctx.stack_trace().is_none());
    }

    #[test]
    fn test_filter_memoization() {
        let ctx = capture(Severity::Debug, LevelMask::NONE);
        let filters = FilterTable::new();
        filters.set_source_mask("test", LevelMask::of(&[Severity::Fatal]));

        assert!(ctx.is_filtered(&filters));

        // A later mask change does not re-evaluate the memoized decision
        filters.set_source_mask("test", LevelMask::ALL);
        assert!(ctx.is_filtered(&filters));
    }

    #[test]
    fn test_timestamped_identity_when_disabled() {
        let ctx = capture(Severity::Info, LevelMask::NONE);
        let event = ctx.to_timestamped(TimestampKind::None);
        assert!(matches!(event, LogEvent::Plain(_)));
        assert!(event.prefix().is_none());
    }

    #[test]
    fn test_timestamped_memoized() {
        let ctx = capture(Severity::Info, LevelMask::NONE);
        let first = ctx.to_timestamped(TimestampKind::Sequence);
        let second = ctx.to_timestamped(TimestampKind::Sequence);
        assert_eq!(first.prefix(), second.prefix());

        // Same allocation, not just equal text
        match (&first, &second) {
            (LogEvent::Timestamped(a), LogEvent::Timestamped(b)) => {
                assert!(Arc::ptr_eq(a, b));
            }
            _ => panic!("expected timestamped variants"),
        }
    }

    #[test]
    fn test_already_timestamped_returned_unchanged() {
        let ctx = capture(Severity::Info, LevelMask::NONE);
        let stamped = ctx.to_timestamped(TimestampKind::Sequence);
        let again = stamped.to_timestamped(TimestampKind::Sequence);
        assert_eq!(stamped.prefix(), again.prefix());
    }

    #[test]
    fn test_sequence_prefix_zero_padded() {
        let ctx = capture(Severity::Info, LevelMask::NONE);
        let event = ctx.to_timestamped(TimestampKind::Sequence);
        assert_eq!(event.prefix(), Some("0000000000000007"));
    }

    #[test]
    fn test_frame_prefix_falls_back_to_thread_name() {
        // SystemEnv has no frame counter, so the Frame kind must render the
        // fixed-width thread name column instead
        std::thread::Builder::new()
            .name("worker-x".to_string())
            .spawn(|| {
                let env = SystemEnv::new();
                let ctx = Arc::new(EventContext::capture(
                    1,
                    "test",
                    Severity::Info,
                    "m".to_string(),
                    &env,
                    LevelMask::NONE,
                    "bootstrap",
                ));
                let event = ctx.to_timestamped(TimestampKind::Frame);
                let prefix = event.prefix().unwrap();
                assert_eq!(prefix.len(), 16);
                assert!(prefix.contains("worker-x"));
            })
            .unwrap()
            .join()
            .unwrap();
    }

    #[test]
    fn test_render_line_formats() {
        let ctx = capture(Severity::Warning, LevelMask::NONE);
        let plain = LogEvent::Plain(Arc::clone(&ctx));
        assert_eq!(plain.render_line(), "[WARNING] [test] hello");

        let stamped = ctx.to_timestamped(TimestampKind::Sequence);
        assert_eq!(
            stamped.render_line(),
            "[0000000000000007] [WARNING] [test] hello"
        );
    }
}
