use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::pool::CACHE_LINE;

/// An atomic ring index on its own cache line, so the producer's stores to
/// one index never invalidate the consumer's line holding the other.
#[repr(align(64))]
struct PaddedIndex(AtomicU8);

const _: () = assert!(std::mem::align_of::<PaddedIndex>() == CACHE_LINE);

/// Bounded single-producer/single-consumer lock-free ring.
///
/// Capacity is a power of two between 2 and 128; one slot is sacrificed to
/// distinguish empty from full, and 8-bit indices keep the transported
/// element (a job index) trivially copyable. Exactly one thread may ever
/// call [`push`](SpscQueue::push) and exactly one thread may ever call
/// [`pop`](SpscQueue::pop); the pipeline encodes that discipline in which
/// stage holds which end.
///
/// The producer synchronizes with the consumer through the release store of
/// `write` and the consumer's acquire load of it: the slot write happens
/// before the release, so it is visible after the matching acquire. The
/// mirror pair on `read` hands slots back.
pub struct SpscQueue<T: Copy> {
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: u8,
    write: PaddedIndex,
    read: PaddedIndex,
}

// SAFETY: the single-producer/single-consumer contract means a slot is
// written by one thread and read by the other, ordered by the
// release/acquire pair on the index that transported it.
unsafe impl<T: Copy + Send> Sync for SpscQueue<T> {}
unsafe impl<T: Copy + Send> Send for SpscQueue<T> {}

impl<T: Copy> SpscQueue<T> {
    /// Capacity must be a power of two in `[2, 128]`: with 8-bit indices a
    /// larger ring could not tell a full queue from an empty one.
    pub fn new(capacity: usize) -> SpscQueue<T> {
        assert!(
            (2..=128).contains(&capacity) && capacity.is_power_of_two(),
            "queue capacity must be a power of two in [2, 128]"
        );
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect();
        SpscQueue {
            slots,
            mask: (capacity - 1) as u8,
            write: PaddedIndex(AtomicU8::new(0)),
            read: PaddedIndex(AtomicU8::new(0)),
        }
    }

    /// Producer side. Returns false when the ring is full.
    pub fn push(&self, item: T) -> bool {
        let write = self.write.0.load(Ordering::Relaxed);
        let next = (write + 1) & self.mask;
        if next == self.read.0.load(Ordering::Acquire) {
            return false;
        }
        // SAFETY: slot `write` is not visible to the consumer until the
        // release store below, and only this thread pushes.
        unsafe { (*self.slots[write as usize].get()).write(item) };
        self.write.0.store(next, Ordering::Release);
        true
    }

    /// Consumer side. Returns None when the ring is empty.
    pub fn pop(&self) -> Option<T> {
        let read = self.read.0.load(Ordering::Relaxed);
        if read == self.write.0.load(Ordering::Acquire) {
            return None;
        }
        // SAFETY: the acquire load above proves the producer initialized
        // slot `read`, and only this thread pops.
        let item = unsafe { (*self.slots[read as usize].get()).assume_init() };
        self.read.0.store((read + 1) & self.mask, Ordering::Release);
        Some(item)
    }

    /// Best-effort element count.
    pub fn len(&self) -> usize {
        let write = self.write.0.load(Ordering::Acquire);
        let read = self.read.0.load(Ordering::Acquire);
        (write.wrapping_sub(read) & self.mask) as usize
    }

    /// Best-effort emptiness snapshot. A concurrent push's release store
    /// need not be visible yet, so this can report empty just after the
    /// queue became non-empty; never gate a wakeup on it.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Best-effort fullness snapshot, with the mirror-image caveat of
    /// [`SpscQueue::is_empty`].
    pub fn is_full(&self) -> bool {
        let write = self.write.0.load(Ordering::Relaxed);
        let next = (write + 1) & self.mask;
        next == self.read.0.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
