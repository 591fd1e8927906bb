// SPDX-License-Identifier: Apache-2.0 OR MIT
// Host environment queries consumed during event enrichment

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::ThreadId;
use std::time::Instant;

/// Counters and thread-identity queries provided by the hosting process.
///
/// A game engine host implements this against its own tick/frame counters;
/// [`SystemEnv`] is the standalone fallback. Frame counters are only safe to
/// read from the engine's main thread, which is why enrichment asks
/// `is_main_thread` before touching `frame`.
pub trait HostEnv: Send + Sync {
    /// Monotonic tick counter, always available
    fn tick(&self) -> u32;

    /// Current frame number, if the host exposes one
    fn frame(&self) -> Option<i32>;

    /// Whether the calling thread is the host's main thread
    fn is_main_thread(&self) -> bool;

    /// Whether the host has begun shutting down
    fn is_shutting_down(&self) -> bool;
}

/// Default environment for hosts without an engine loop: ticks are elapsed
/// milliseconds and there is no frame counter.
pub struct SystemEnv {
    start: Instant,
    main_thread: ThreadId,
    shutting_down: AtomicBool,
}

impl SystemEnv {
    /// Create an environment; the constructing thread becomes the main thread
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            main_thread: std::thread::current().id(),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Mark the host as shutting down (stops frame capture)
    pub fn set_shutting_down(&self) {
        self.shutting_down.store(true, Ordering::Relaxed);
    }
}

impl Default for SystemEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl HostEnv for SystemEnv {
    fn tick(&self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }

    fn frame(&self) -> Option<i32> {
        None
    }

    fn is_main_thread(&self) -> bool {
        std::thread::current().id() == self.main_thread
    }

    fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_thread_detection() {
        let env = SystemEnv::new();
        assert!(env.is_main_thread());

        let handle = std::thread::spawn(move || env.is_main_thread());
        assert!(!handle.join().unwrap());
    }

    #[test]
    fn test_shutting_down_flag() {
        let env = SystemEnv::new();
        assert!(!env.is_shutting_down());
        env.set_shutting_down();
        assert!(env.is_shutting_down());
    }

    #[test]
    fn test_tick_is_monotonic() {
        let env = SystemEnv::new();
        let a = env.tick();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = env.tick();
        assert!(b >= a);
    }
}
