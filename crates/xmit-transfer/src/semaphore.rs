//! Counting semaphore for bounding in-flight transfers.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// A fixed-capacity counting semaphore.
///
/// Workers call [`acquire`](Semaphore::acquire) before transmitting a request
/// body and release the slot once the body has been fully drained by the HTTP
/// stack, so at most `capacity` bodies occupy the network at a time.
pub struct Semaphore {
    available: Mutex<usize>,
    freed: Condvar,
    capacity: usize,
}

impl Semaphore {
    pub fn new(capacity: usize) -> Self {
        Self {
            available: Mutex::new(capacity),
            freed: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Block until a slot is free, then take it.
    pub fn acquire(&self) {
        let mut available = self.available.lock().unwrap();
        while *available == 0 {
            available = self.freed.wait(available).unwrap();
        }
        *available -= 1;
    }

    /// Return a slot and wake one blocked waiter.
    pub fn release(&self) {
        let mut available = self.available.lock().unwrap();
        *available = (*available + 1).min(self.capacity);
        self.freed.notify_one();
    }

    /// Acquire a slot held for the guard's lifetime.
    pub fn acquire_guard(&self) -> SlotGuard<'_> {
        self.acquire();
        SlotGuard { sem: self }
    }
}

/// RAII guard that releases its slot on drop.
pub struct SlotGuard<'a> {
    sem: &'a Semaphore,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.sem.release();
    }
}

/// A single-release cell for one acquired slot.
///
/// The slot must be returned on every exit path: body fully read, request
/// construction failure, or transport failure before the body was drained.
/// The compare-and-swap flag makes the release idempotent, so the EOF hook
/// and the unconditional post-request release cannot double-free the slot.
pub struct SlotRelease {
    sem: Arc<Semaphore>,
    released: AtomicBool,
}

impl SlotRelease {
    /// Wrap an already-acquired slot of `sem`.
    pub fn new(sem: Arc<Semaphore>) -> Self {
        Self {
            sem,
            released: AtomicBool::new(false),
        }
    }

    /// Release the slot if it has not been released yet.
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.sem.release();
        }
    }
}

/// A body reader that releases its send slot at end of stream.
///
/// Wrapping the outermost reader means the slot frees as soon as the HTTP
/// stack has consumed the body, not when the server's response arrives — the
/// client may still be awaiting responses for early chunks while later chunks
/// occupy the network.
pub struct SlotReader<R> {
    inner: R,
    slot: Arc<SlotRelease>,
}

impl<R: Read> SlotReader<R> {
    pub fn new(inner: R, slot: Arc<SlotRelease>) -> Self {
        Self { inner, slot }
    }
}

impl<R: Read> Read for SlotReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 {
            self.slot.release();
        }
        Ok(n)
    }
}
