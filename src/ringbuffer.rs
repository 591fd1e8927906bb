// Bounded MPSC ring buffer backing the dispatch queues
//
// Adapted from the reserve-then-write design used by kernel log buffers:
// producers reserve a sequence number with a CAS that also enforces the
// capacity bound, then publish the slot through a per-slot state machine
// so the consumer never observes a half-written entry.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Cache-aligned wrapper to prevent false sharing between the cursors
#[repr(align(64))]
struct CacheAligned<T>(T);

// Slot states
const EMPTY: u8 = 0;
const WRITING: u8 = 1;
const READY: u8 = 2;

struct Slot<T> {
    state: AtomicU8,
    value: UnsafeCell<Option<T>>,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            value: UnsafeCell::new(None),
        }
    }
}

/// Bounded multiple-producer single-consumer ring buffer.
///
/// `enqueue` never blocks: a full buffer rejects the new entry and
/// increments the drop counter. The dispatch workers pair this structure
/// with a counting semaphore, so rejection only happens when the consumer
/// has stalled for longer than a full buffer's worth of traffic. The read
/// cursor belongs to the single consumer alone, which is what keeps
/// delivery order equal to submission order.
///
/// Capacity is rounded up to the next power of two, minimum 2.
pub struct RingBuffer<T> {
    slots: Box<[Slot<T>]>,
    capacity: usize,
    write_seq: CacheAligned<AtomicU64>,
    read_seq: CacheAligned<AtomicU64>,
    dropped: AtomicU64,
}

// SAFETY: RingBuffer is Sync because:
// - Producers coordinate via CAS on write_seq, so each sequence number
//   (and therefore each slot claim) is owned by exactly one producer
// - The capacity check inside the reservation loop stops producers from
//   claiming a slot whose previous lap the consumer has not released
// - Only one thread consumes (guaranteed by the owning worker), and it is
//   the only thread that advances read_seq
unsafe impl<T: Send> Sync for RingBuffer<T> {}
unsafe impl<T: Send> Send for RingBuffer<T> {}

impl<T> RingBuffer<T> {
    /// Create a new ring buffer with at least `capacity` slots
    pub fn new(capacity: u32) -> Self {
        let capacity = (capacity.max(2) as usize).next_power_of_two();
        let slots: Vec<Slot<T>> = (0..capacity).map(|_| Slot::new()).collect();

        Self {
            slots: slots.into_boxed_slice(),
            capacity,
            write_seq: CacheAligned(AtomicU64::new(0)),
            read_seq: CacheAligned(AtomicU64::new(0)),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue an item. Never blocks; returns false (counting the drop)
    /// when the buffer is full.
    pub fn enqueue(&self, item: T) -> bool {
        // 1. Reserve a sequence number, refusing when the buffer is full.
        //    The CAS makes reservation and the capacity check atomic with
        //    respect to other producers.
        let seq = loop {
            let write_seq = self.write_seq.0.load(Ordering::Relaxed);
            let read_seq = self.read_seq.0.load(Ordering::Acquire);
            if write_seq >= read_seq + self.capacity as u64 {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return false;
            }
            match self.write_seq.0.compare_exchange_weak(
                write_seq,
                write_seq + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break write_seq,
                Err(_) => std::hint::spin_loop(),
            }
        };
        let pos = (seq as usize) & (self.capacity - 1);

        // 2. Claim the slot. The capacity check above means the consumer
        //    already released this slot's previous lap, so the claim only
        //    rides out cache visibility.
        let slot = &self.slots[pos];
        while slot
            .state
            .compare_exchange(EMPTY, WRITING, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            std::hint::spin_loop();
        }

        // 3. Write the value.
        // SAFETY: the WRITING claim gives us exclusive slot access; no
        // other producer can reserve this slot until the consumer moves
        // past it.
        unsafe {
            *slot.value.get() = Some(item);
        }

        // 4. Publish. Release makes the value visible before the state.
        slot.state.store(READY, Ordering::Release);
        true
    }

    /// Dequeue the next item, or `None` if nothing is ready.
    ///
    /// Must only be called from the single consumer thread. May return
    /// `None` while `len` is non-zero when the producer owning the next
    /// slot has reserved it but not yet published; callers poll again
    /// rather than wait.
    pub fn try_dequeue(&self) -> Option<T> {
        // 1. Check for pending entries. Only this thread writes read_seq,
        //    so the load is exact.
        let read_seq = self.read_seq.0.load(Ordering::Relaxed);
        let write_seq = self.write_seq.0.load(Ordering::Acquire);
        if read_seq >= write_seq {
            return None;
        }

        let pos = (read_seq as usize) & (self.capacity - 1);
        let slot = &self.slots[pos];

        // 2. Wait for the owning producer to publish. Bounded spin: a
        //    mid-write producer makes the slot briefly unreadable and the
        //    caller retries later instead of hanging the worker.
        let mut spins = 0;
        while slot.state.load(Ordering::Acquire) != READY {
            spins += 1;
            if spins > 1000 {
                return None;
            }
            std::hint::spin_loop();
        }

        // 3. Take the value and release the slot.
        // SAFETY: READY means the producer finished, and no producer can
        // reserve this slot again until read_seq advances past it.
        let value = unsafe { (*slot.value.get()).take() };
        slot.state.store(EMPTY, Ordering::Release);

        // 4. Advance the cursor, making the slot reusable.
        self.read_seq.0.store(read_seq + 1, Ordering::Release);
        value
    }

    /// Snapshot of pending items. Advisory only: stale under concurrency.
    pub fn len(&self) -> usize {
        let write_seq = self.write_seq.0.load(Ordering::Relaxed);
        let read_seq = self.read_seq.0.load(Ordering::Relaxed);
        (write_seq.saturating_sub(read_seq) as usize).min(self.capacity)
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries rejected because the buffer was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Rounded capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Reset both cursors and discard pending values.
    ///
    /// Safe only when no concurrent producers or consumers are active;
    /// used at worker teardown.
    pub fn clear(&self) {
        for slot in self.slots.iter() {
            // SAFETY: quiescence is the caller's contract
            unsafe {
                *slot.value.get() = None;
            }
            slot.state.store(EMPTY, Ordering::Relaxed);
        }
        let write_seq = self.write_seq.0.load(Ordering::Relaxed);
        self.read_seq.0.store(write_seq, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_capacity_rounding() {
        assert_eq!(RingBuffer::<u32>::new(0).capacity(), 2);
        assert_eq!(RingBuffer::<u32>::new(2).capacity(), 2);
        assert_eq!(RingBuffer::<u32>::new(3).capacity(), 4);
        assert_eq!(RingBuffer::<u32>::new(100).capacity(), 128);
    }

    #[test]
    fn test_fifo_basic() {
        let buffer = RingBuffer::new(4);
        assert!(buffer.enqueue("first".to_string()));
        assert!(buffer.enqueue("second".to_string()));

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.try_dequeue().as_deref(), Some("first"));
        assert_eq!(buffer.try_dequeue().as_deref(), Some("second"));
        assert_eq!(buffer.try_dequeue(), None);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_wraparound() {
        let buffer = RingBuffer::new(4);
        for lap in 0..3 {
            for i in 0..4 {
                assert!(buffer.enqueue(lap * 4 + i));
            }
            for i in 0..4 {
                assert_eq!(buffer.try_dequeue(), Some(lap * 4 + i));
            }
        }
    }

    #[test]
    fn test_full_buffer_rejects_new_entries() {
        let buffer = RingBuffer::new(4);
        for i in 0..4u32 {
            assert!(buffer.enqueue(i));
        }
        for i in 4..8u32 {
            assert!(!buffer.enqueue(i));
        }
        assert_eq!(buffer.dropped(), 4);

        // The accepted entries survive untouched and in order
        let mut remaining = Vec::new();
        while let Some(v) = buffer.try_dequeue() {
            remaining.push(v);
        }
        assert_eq!(remaining, vec![0, 1, 2, 3]);

        // Room again once consumed
        assert!(buffer.enqueue(8));
        assert_eq!(buffer.try_dequeue(), Some(8));
    }

    #[test]
    fn test_clear() {
        let buffer = RingBuffer::new(4);
        buffer.enqueue(1);
        buffer.enqueue(2);
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.try_dequeue(), None);

        // Still usable after clear
        buffer.enqueue(3);
        assert_eq!(buffer.try_dequeue(), Some(3));
    }

    #[test]
    fn test_concurrent_producers() {
        let buffer = Arc::new(RingBuffer::new(1024));
        let mut handles = vec![];

        for t in 0..4u64 {
            let buffer = Arc::clone(&buffer);
            handles.push(thread::spawn(move || {
                for i in 0..100u64 {
                    assert!(buffer.enqueue(t * 1000 + i));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let mut count = 0;
        let mut last_per_thread = [None::<u64>; 4];
        while let Some(v) = buffer.try_dequeue() {
            count += 1;
            let t = (v / 1000) as usize;
            // Per-producer order is preserved even though producers interleave
            if let Some(prev) = last_per_thread[t] {
                assert!(v > prev);
            }
            last_per_thread[t] = Some(v);
        }
        assert_eq!(count, 400);
        assert_eq!(buffer.dropped(), 0);
    }

    #[test]
    fn test_producer_with_concurrent_consumer() {
        let buffer = Arc::new(RingBuffer::new(64));
        let producer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                let mut accepted = 0u64;
                for i in 0..10_000u64 {
                    if buffer.enqueue(i) {
                        accepted += 1;
                    }
                }
                accepted
            })
        };

        let mut received = 0u64;
        let mut last = None::<u64>;
        loop {
            match buffer.try_dequeue() {
                Some(v) => {
                    // Single producer: values must stay strictly increasing
                    // even when the full buffer rejected some
                    if let Some(prev) = last {
                        assert!(v > prev, "reordered: {} after {}", v, prev);
                    }
                    last = Some(v);
                    received += 1;
                }
                None => {
                    if producer.is_finished() && buffer.is_empty() {
                        break;
                    }
                    thread::yield_now();
                }
            }
        }
        let accepted = producer.join().unwrap();
        assert_eq!(received, accepted);
        assert_eq!(accepted + buffer.dropped(), 10_000);
    }

    #[test]
    fn test_tiny_buffer_keeps_fifo_and_liveness_under_overflow() {
        // Capacity 2 maximizes cursor lapping: every few enqueues race the
        // consumer at the same slots
        let buffer = Arc::new(RingBuffer::new(2));
        let producer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                let mut accepted = 0u64;
                for i in 0..50_000u64 {
                    if buffer.enqueue(i) {
                        accepted += 1;
                    }
                }
                accepted
            })
        };

        let mut received = 0u64;
        let mut last = None::<u64>;
        loop {
            match buffer.try_dequeue() {
                Some(v) => {
                    if let Some(prev) = last {
                        assert!(v > prev, "reordered: {} after {}", v, prev);
                    }
                    last = Some(v);
                    received += 1;
                }
                None => {
                    if producer.is_finished() && buffer.is_empty() {
                        break;
                    }
                    thread::yield_now();
                }
            }
        }
        let accepted = producer.join().unwrap();
        // Every accepted entry arrives exactly once, in order, and the
        // consumer never wedges on a rejected one
        assert_eq!(received, accepted);
        assert_eq!(accepted + buffer.dropped(), 50_000);
    }
}
