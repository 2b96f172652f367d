//! Process-wide ceiling on concurrent indexing tasks, shared live between
//! batches.
//!
//! Each registered batch owns a [`BatchGate`] backed by a
//! [`ResizableSemaphore`]. Whenever a batch joins or leaves, every gate is
//! resized to its new share. Resizing applies a delta to the available
//! counter, so permits already held stay valid; a shrunk gate simply reports
//! a negative balance until enough holders release.

use parking_lot::{Condvar, Mutex};
use std::cmp::Reverse;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicIsize, AtomicU64, AtomicUsize, Ordering};
use tracing::debug;

use crate::error::{IndexError, IndexResult};

#[derive(Debug)]
pub struct ResizableSemaphore {
    available: AtomicIsize,
    capacity: AtomicUsize,
    lock: Mutex<()>,
    released: Condvar,
}

impl ResizableSemaphore {
    pub fn new(capacity: usize) -> Self {
        Self {
            available: AtomicIsize::new(capacity as isize),
            capacity: AtomicUsize::new(capacity),
            lock: Mutex::new(()),
            released: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    /// May be negative right after a shrink.
    pub fn available(&self) -> isize {
        self.available.load(Ordering::Acquire)
    }

    pub fn try_acquire(&self) -> bool {
        let mut current = self.available.load(Ordering::Acquire);
        while current > 0 {
            match self.available.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
        false
    }

    pub fn acquire(&self) {
        if self.try_acquire() {
            return;
        }
        let mut guard = self.lock.lock();
        while !self.try_acquire() {
            self.released.wait(&mut guard);
        }
    }

    pub fn release(&self) {
        self.available.fetch_add(1, Ordering::AcqRel);
        let _guard = self.lock.lock();
        self.released.notify_one();
    }

    pub fn resize(&self, capacity: usize) {
        let previous = self.capacity.swap(capacity, Ordering::AcqRel);
        let delta = capacity as isize - previous as isize;
        if delta == 0 {
            return;
        }
        self.available.fetch_add(delta, Ordering::AcqRel);
        if delta > 0 {
            let _guard = self.lock.lock();
            self.released.notify_all();
        }
    }
}

/// One batch's slice of the global ceiling.
#[derive(Debug)]
pub struct BatchGate {
    id: u64,
    weight: usize,
    semaphore: Arc<ResizableSemaphore>,
}

impl BatchGate {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn weight(&self) -> usize {
        self.weight
    }

    pub fn capacity(&self) -> usize {
        self.semaphore.capacity()
    }

    /// Blocks until a permit is free.
    pub fn acquire(&self) -> GatePermit {
        self.semaphore.acquire();
        GatePermit {
            semaphore: Arc::clone(&self.semaphore),
        }
    }
}

/// Returns its permit on drop.
#[derive(Debug)]
pub struct GatePermit {
    semaphore: Arc<ResizableSemaphore>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

#[derive(Debug)]
pub struct ConcurrencyLimiter {
    ceiling: usize,
    next_id: AtomicU64,
    batches: Mutex<Vec<Arc<BatchGate>>>,
}

impl ConcurrencyLimiter {
    pub fn new(ceiling: usize) -> IndexResult<Self> {
        if ceiling == 0 {
            return Err(IndexError::Configuration(
                "concurrency ceiling must be positive".into(),
            ));
        }
        Ok(Self {
            ceiling,
            next_id: AtomicU64::new(1),
            batches: Mutex::new(Vec::new()),
        })
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn join(&self, weight: usize) -> IndexResult<Arc<BatchGate>> {
        if weight == 0 {
            return Err(IndexError::Configuration(
                "batch weight must be positive".into(),
            ));
        }
        let gate = Arc::new(BatchGate {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            weight,
            semaphore: Arc::new(ResizableSemaphore::new(0)),
        });
        let mut batches = self.batches.lock();
        batches.push(Arc::clone(&gate));
        redistribute(self.ceiling, &batches);
        debug!(batch = gate.id, weight, share = gate.capacity(), "batch joined");
        Ok(gate)
    }

    /// Joins and returns a guard that leaves again when dropped, also while
    /// unwinding.
    pub fn enter(&self, weight: usize) -> IndexResult<Membership<'_>> {
        let gate = self.join(weight)?;
        Ok(Membership {
            limiter: self,
            gate,
        })
    }

    pub fn leave(&self, gate: &BatchGate) {
        let mut batches = self.batches.lock();
        batches.retain(|g| g.id != gate.id);
        redistribute(self.ceiling, &batches);
        debug!(batch = gate.id, remaining = batches.len(), "batch left");
    }

    /// `(batch id, share)` for every registered batch, in join order.
    pub fn shares(&self) -> Vec<(u64, usize)> {
        self.batches
            .lock()
            .iter()
            .map(|g| (g.id, g.capacity()))
            .collect()
    }
}

/// A joined batch. Derefs to its gate.
#[derive(Debug)]
pub struct Membership<'a> {
    limiter: &'a ConcurrencyLimiter,
    gate: Arc<BatchGate>,
}

impl Deref for Membership<'_> {
    type Target = BatchGate;

    fn deref(&self) -> &BatchGate {
        &self.gate
    }
}

impl Drop for Membership<'_> {
    fn drop(&mut self) {
        self.limiter.leave(&self.gate);
    }
}

/// Baseline `ceiling / n` each; the `ceiling % n` leftover permits go to the
/// heaviest batches, earlier joins first on equal weight.
fn redistribute(ceiling: usize, batches: &[Arc<BatchGate>]) {
    if batches.is_empty() {
        return;
    }
    let n = batches.len();
    let baseline = ceiling / n;
    let remainder = ceiling % n;

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&i| Reverse(batches[i].weight));
    let mut shares = vec![baseline; n];
    for &i in order.iter().take(remainder) {
        shares[i] += 1;
    }
    for (gate, share) in batches.iter().zip(shares) {
        gate.semaphore.resize(share);
    }
}
