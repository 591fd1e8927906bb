// SPDX-License-Identifier: Apache-2.0 OR MIT
// Fan-out coordinator: builds contexts and routes them through the two-stage
// dispatch pipeline

use crate::config::RelayConfig;
use crate::context::{EventContext, LogEvent, TimestampKind};
use crate::error::RegisterError;
use crate::filter::FilterTable;
use crate::host::{HostEnv, SystemEnv};
use crate::listener::Listener;
use crate::policy::{ListenerFlags, ListenerId, PolicyRegistry};
use crate::severity::Severity;
use crate::worker::{DispatchFn, DispatchWorker, WorkerEvent};
use dashmap::DashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

struct RouterInner {
    config: RelayConfig,
    env: Arc<dyn HostEnv>,
    filters: FilterTable,
    policies: PolicyRegistry,
    /// Registration order drives sync-listener call order
    listeners: RwLock<Vec<(ListenerId, Arc<dyn Listener>)>>,
    next_listener_id: AtomicU64,
    /// Context sequence counter, owned here rather than by a bare static
    next_event_id: AtomicU64,
    /// Shared first-stage worker: bounds the caller's cost to one enqueue
    /// regardless of listener count
    main_worker: DispatchWorker,
    /// Per-listener workers, created lazily on first scheduled delivery
    workers: DashMap<ListenerId, Arc<DispatchWorker>>,
    shut_down: AtomicBool,
}

/// The fan-out coordinator.
///
/// `submit` may be called from any thread. Sync listeners run inline in
/// true call order; everything else goes through the shared main worker,
/// which fans out to one dedicated worker per listener, so a slow listener
/// never stalls the caller or its siblings.
///
/// Cheap to clone; all clones share one pipeline.
#[derive(Clone)]
pub struct DispatchRouter {
    inner: Arc<RouterInner>,
}

impl DispatchRouter {
    /// Create a router with the standalone host environment
    pub fn new(config: RelayConfig) -> Self {
        Self::with_env(config, Arc::new(SystemEnv::new()))
    }

    /// Create a router against a host-provided environment
    pub fn with_env(config: RelayConfig, env: Arc<dyn HostEnv>) -> Self {
        let filters =
            FilterTable::with_sources(config.default_mask, config.sources.clone());
        let main_worker =
            DispatchWorker::spawn("relay-main", config.main_queue_capacity, None);

        Self {
            inner: Arc::new(RouterInner {
                config,
                env,
                filters,
                policies: PolicyRegistry::new(),
                listeners: RwLock::new(Vec::new()),
                next_listener_id: AtomicU64::new(1),
                next_event_id: AtomicU64::new(1),
                main_worker,
                workers: DashMap::new(),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Process-unique identity of this router, used for self-relay detection
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    /// Register a listener. Takes effect on the next dispatch; no restart
    /// needed. Rejects listeners that would relay back into this router.
    pub fn add_listener(
        &self,
        listener: Arc<dyn Listener>,
    ) -> Result<ListenerId, RegisterError> {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return Err(RegisterError::ShutDown);
        }
        if listener.relay_target() == Some(self.identity()) {
            return Err(RegisterError::SelfRelay);
        }
        let id = ListenerId(self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.write().unwrap().push((id, listener));
        Ok(id)
    }

    /// Set delivery policy for a listener; applies from the next dispatch
    pub fn register_policy(&self, id: ListenerId, flags: ListenerFlags) {
        self.inner.policies.set_flags(id, flags);
    }

    /// Runtime filter control
    pub fn filters(&self) -> &FilterTable {
        &self.inner.filters
    }

    /// Submit a raw log event from any thread.
    ///
    /// Enrichment (id, timestamps, thread identity, optional stack trace)
    /// happens here on the calling thread; after that the caller pays one
    /// bounded enqueue at most.
    pub fn submit(&self, source: &str, level: Severity, payload: impl Into<String>) {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return;
        }
        let id = self.inner.next_event_id.fetch_add(1, Ordering::Relaxed);
        let ctx = EventContext::capture(
            id,
            source,
            level,
            payload.into(),
            self.inner.env.as_ref(),
            self.inner.config.traceable,
            &self.inner.config.bootstrap_source,
        );
        self.dispatch(Arc::new(ctx));
    }

    /// Submit an already-enriched context (reused as-is, no re-enrichment)
    pub fn submit_event(&self, ctx: Arc<EventContext>) {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return;
        }
        self.dispatch(ctx);
    }

    fn dispatch(&self, ctx: Arc<EventContext>) {
        let listeners = self.snapshot();
        let mut any_queued = false;

        for (id, listener) in &listeners {
            let flags = self.inner.policies.flags(*id);
            if !flags.sync_handling {
                any_queued = true;
                continue;
            }
            // Sync listeners run inline, in true call order. Filter first;
            // ignore_filters bypasses the memoized decision. A panic here
            // propagates to the caller: sync listeners opted onto the
            // critical path.
            if flags.ignore_filters || !ctx.is_filtered(&self.inner.filters) {
                listener.log_event(&self.event_for(&ctx, flags.add_timestamp));
            }
        }

        if any_queued {
            let router = self.clone();
            let fan_out: DispatchFn =
                Arc::new(move |event: &LogEvent| router.fan_out_stage(event));
            self.inner
                .main_worker
                .schedule(fan_out, LogEvent::Plain(ctx));
        }
    }

    /// Second stage, on the main worker's thread: route to per-listener
    /// workers so listener count and listener latency stay off the caller
    fn fan_out_stage(&self, event: &LogEvent) {
        let ctx = event.context();
        for (id, listener) in self.snapshot() {
            let flags = self.inner.policies.flags(id);
            if flags.sync_handling {
                continue;
            }
            if !flags.ignore_filters && ctx.is_filtered(&self.inner.filters) {
                continue;
            }
            let worker = self.worker_for(id, &listener);
            let per_listener = self.event_for(ctx, flags.add_timestamp);
            let target = Arc::clone(&listener);
            let deliver: DispatchFn = Arc::new(move |ev: &LogEvent| target.log_event(ev));
            worker.schedule(deliver, per_listener);
        }
    }

    /// Atomic get-or-create of the dedicated worker for one listener. The
    /// worker's idle/stopping events drive the listener's flush.
    fn worker_for(&self, id: ListenerId, listener: &Arc<dyn Listener>) -> Arc<DispatchWorker> {
        self.inner
            .workers
            .entry(id)
            .or_insert_with(|| {
                let flush_target = Arc::clone(listener);
                let observer: crate::worker::WorkerObserver =
                    Arc::new(move |event: WorkerEvent| match event {
                        WorkerEvent::BecameIdle | WorkerEvent::Stopping => flush_target.flush(),
                    });
                Arc::new(DispatchWorker::spawn(
                    &id.to_string(),
                    self.inner.config.queue_capacity,
                    Some(observer),
                ))
            })
            .clone()
    }

    fn event_for(&self, ctx: &Arc<EventContext>, add_timestamp: bool) -> LogEvent {
        if add_timestamp && self.inner.config.timestamp != TimestampKind::None {
            ctx.to_timestamped(self.inner.config.timestamp)
        } else {
            LogEvent::Plain(Arc::clone(ctx))
        }
    }

    fn snapshot(&self) -> Vec<(ListenerId, Arc<dyn Listener>)> {
        self.inner.listeners.read().unwrap().clone()
    }

    /// Shut the pipeline down. Idempotent.
    ///
    /// Non-immediate shutdown drains the main worker first (so every
    /// already-submitted event reaches its per-listener queue), then drains
    /// and joins each listener worker, then disposes the listeners.
    /// Immediate shutdown abandons queued work but still joins and
    /// disposes.
    pub fn shutdown(&self, immediate: bool) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        self.inner.main_worker.stop(immediate);
        self.inner.main_worker.join();

        let workers: Vec<Arc<DispatchWorker>> = self
            .inner
            .workers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for worker in &workers {
            worker.stop(immediate);
        }
        for worker in &workers {
            worker.join();
        }

        // Dispose failures are reported, never escalated: the process is
        // already on its way out
        for (id, listener) in self.snapshot() {
            if catch_unwind(AssertUnwindSafe(|| listener.dispose())).is_err() {
                eprintln!("[logrelay] dispose panic in {}", id);
            }
        }
    }

    /// Shutdown using the style named in the config
    pub fn shutdown_configured(&self) {
        self.shutdown(self.inner.config.shutdown.is_immediate());
    }
}

/// Listener that forwards every event into another router's pipeline.
///
/// Lets a secondary host feed the primary pipeline. Registering one of
/// these on the router it targets is rejected at registration time.
pub struct RelayListener {
    target: DispatchRouter,
}

impl RelayListener {
    pub fn new(target: DispatchRouter) -> Self {
        Self { target }
    }
}

impl Listener for RelayListener {
    fn log_event(&self, event: &LogEvent) {
        self.target.submit_event(Arc::clone(event.context()));
    }

    fn relay_target(&self) -> Option<usize> {
        Some(self.target.identity())
    }
}
