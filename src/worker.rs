// SPDX-License-Identifier: Apache-2.0 OR MIT
// Dispatch worker: one dedicated thread draining one bounded queue

use crate::context::LogEvent;
use crate::ringbuffer::RingBuffer;
use crate::sync::Semaphore;
use std::io::Write;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Callback invoked on the worker thread with the event it was scheduled for
pub type DispatchFn = Arc<dyn Fn(&LogEvent) + Send + Sync + 'static>;

/// Worker lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    Draining,
    Stopped,
}

const RUNNING: u8 = 0;
const DRAINING: u8 = 1;
const STOPPED: u8 = 2;

/// Lifecycle notifications emitted by the worker loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerEvent {
    /// The queue drained and the poll timed out: edge-triggered, fired once
    /// per idle transition
    BecameIdle,
    /// The loop is exiting; fired exactly once, after the final delivery
    Stopping,
}

/// Observer for worker lifecycle events
pub type WorkerObserver = Arc<dyn Fn(WorkerEvent) + Send + Sync + 'static>;

/// Poll timeout: bounds how long idle/stopping transitions go unnoticed
const POLL_TIMEOUT: Duration = Duration::from_secs(1);

struct Task {
    callback: DispatchFn,
    event: LogEvent,
}

struct WorkerShared {
    name: String,
    queue: RingBuffer<Task>,
    signal: Semaphore,
    state: AtomicU8,
    /// Tasks refused because the worker had already left Running
    rejected: AtomicU64,
    observer: Option<WorkerObserver>,
}

impl WorkerShared {
    fn state(&self) -> WorkerState {
        match self.state.load(Ordering::Acquire) {
            RUNNING => WorkerState::Running,
            DRAINING => WorkerState::Draining,
            _ => WorkerState::Stopped,
        }
    }

    fn emit(&self, event: WorkerEvent) {
        if let Some(observer) = &self.observer {
            observer(event);
        }
    }
}

/// A dedicated worker bound to one destination (or to the shared dispatch
/// stage). Owns a bounded queue of (callback, event) pairs and a thread
/// that drains it.
///
/// Delivery within one worker is strictly FIFO. Callback panics are
/// contained per invocation and reported out-of-band; they never stop the
/// loop or reach the thread that scheduled the task.
pub struct DispatchWorker {
    shared: Arc<WorkerShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DispatchWorker {
    /// Spawn a worker with its own named OS thread
    pub fn spawn(name: &str, queue_capacity: u32, observer: Option<WorkerObserver>) -> Self {
        let shared = Arc::new(WorkerShared {
            name: name.to_string(),
            queue: RingBuffer::new(queue_capacity),
            signal: Semaphore::new(),
            state: AtomicU8::new(RUNNING),
            rejected: AtomicU64::new(0),
            observer,
        });

        let loop_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_loop(loop_shared))
            .expect("failed to spawn dispatch worker thread");

        Self {
            shared,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Enqueue one (callback, event) pair.
    ///
    /// Constant-time for the caller: a ring-buffer write plus a semaphore
    /// release. Silently rejected (counted) once the worker has left
    /// Running, so shutdown never accumulates new work; a full queue drops
    /// the task (counted by the queue) instead of blocking.
    pub fn schedule(&self, callback: DispatchFn, event: LogEvent) {
        if self.shared.state.load(Ordering::Acquire) != RUNNING {
            self.shared.rejected.fetch_add(1, Ordering::Relaxed);
            return;
        }
        // A permit only accompanies an accepted entry, keeping permits and
        // queued tasks paired one-to-one
        if self.shared.queue.enqueue(Task { callback, event }) {
            self.shared.signal.release();
        }
    }

    /// Stop the worker.
    ///
    /// `immediate` abandons anything still queued and exits at the next
    /// wakeup; otherwise the worker drains to empty first. Either way no
    /// new work is accepted from this point on.
    pub fn stop(&self, immediate: bool) {
        if immediate {
            self.shared.state.store(STOPPED, Ordering::Release);
        } else {
            // Only a running worker can begin draining; never downgrade
            // an immediate stop
            let _ = self.shared.state.compare_exchange(
                RUNNING,
                DRAINING,
                Ordering::AcqRel,
                Ordering::Relaxed,
            );
        }
        self.shared.signal.wake_all();
    }

    /// Wait for the worker thread to exit. Call after `stop`.
    pub fn join(&self) {
        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    pub fn state(&self) -> WorkerState {
        self.shared.state()
    }

    /// Advisory count of queued tasks
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    /// Tasks refused because the worker had already left Running
    pub fn rejected(&self) -> u64 {
        self.shared.rejected.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.shared.queue.dropped()
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }
}

fn run_loop(shared: Arc<WorkerShared>) {
    let mut idle_notified = false;

    loop {
        match shared.state.load(Ordering::Acquire) {
            RUNNING => {
                if shared.signal.acquire_timeout(POLL_TIMEOUT) {
                    if let Some(task) = shared.queue.try_dequeue() {
                        idle_notified = false;
                        invoke(&shared, task);
                    }
                } else if let Some(task) = shared.queue.try_dequeue() {
                    // A permit can be consumed without a delivery when the
                    // producer's publish races the bounded dequeue spin;
                    // the poll timeout sweeps up the leftover task
                    idle_notified = false;
                    invoke(&shared, task);
                } else if !idle_notified {
                    // Edge-triggered: once per idle transition, not per poll
                    idle_notified = true;
                    shared.emit(WorkerEvent::BecameIdle);
                }
            }
            DRAINING => {
                // Continuation condition is now "queue non-empty"; schedule
                // rejects new work, so this terminates
                match shared.queue.try_dequeue() {
                    Some(task) => invoke(&shared, task),
                    // Reserved but not yet published: the producer is about
                    // to finish, give it a beat instead of dropping out
                    None if !shared.queue.is_empty() => std::thread::yield_now(),
                    None => break,
                }
            }
            _ => break,
        }
    }

    shared.emit(WorkerEvent::Stopping);
}

fn invoke(shared: &WorkerShared, task: Task) {
    let result = catch_unwind(AssertUnwindSafe(|| (task.callback)(&task.event)));
    if let Err(panic) = result {
        let reason = panic_message(&panic);
        emergency_report(&shared.name, &reason);
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Out-of-band failure report. Never requeued, never fatal to the worker.
/// A failure while reporting falls back to a raw console write so
/// diagnostics are never fully silent.
fn emergency_report(worker: &str, reason: &str) {
    let mut stderr = std::io::stderr().lock();
    if writeln!(stderr, "[logrelay] listener panic in {}: {}", worker, reason).is_err() {
        eprintln!("[logrelay] listener panic in {}", worker);
    }
}
