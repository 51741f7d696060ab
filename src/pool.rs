//! Bounded pool of reusable, non-shareable workers.
//!
//! Workers are created lazily through a factory, up to a fixed maximum.
//! A [`Lease`] gives exclusive access to one worker and hands it back to the
//! idle set when dropped, whatever the exit path.

use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard};

use tracing::debug;

use crate::Result;

/// Factory used by the pool to build a new worker.
pub type Factory<T> = Box<dyn Fn() -> Result<T> + Send + Sync>;

struct PoolState<T> {
    idle: Vec<T>,
    /// Created (or being created) but not idle.
    outstanding: usize,
}

/// Bounded pool of workers with scoped leases.
pub struct ResourcePool<T> {
    factory: Factory<T>,
    max_parallelism: usize,
    state: Mutex<PoolState<T>>,
    available: Condvar,
}

impl<T: Send> ResourcePool<T> {
    /// Create a pool that builds at most `max_parallelism` workers.
    ///
    /// A bound of zero is treated as one.
    pub fn new<F>(factory: F, max_parallelism: usize) -> Self
    where
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            max_parallelism: max_parallelism.max(1),
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                outstanding: 0,
            }),
            available: Condvar::new(),
        }
    }

    /// Lease a worker, creating one or waiting for a release as needed.
    pub fn rent(&self) -> Result<Lease<'_, T>> {
        let mut state = self.lock();
        loop {
            if let Some(worker) = state.idle.pop() {
                state.outstanding += 1;
                return Ok(Lease {
                    pool: self,
                    worker: Some(worker),
                });
            }

            if state.idle.len() + state.outstanding < self.max_parallelism {
                // Reserve the slot, then build outside the lock.
                state.outstanding += 1;
                drop(state);
                return self.create();
            }

            state = self
                .available
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    fn create(&self) -> Result<Lease<'_, T>> {
        // Gives the slot back if the factory fails or panics.
        let mut reservation = Reservation {
            pool: self,
            armed: true,
        };
        let worker = (self.factory)()?;
        reservation.armed = false;

        debug!(
            outstanding = self.outstanding_count(),
            max = self.max_parallelism,
            "created pooled worker"
        );
        Ok(Lease {
            pool: self,
            worker: Some(worker),
        })
    }

    fn unreserve(&self) {
        let mut state = self.lock();
        state.outstanding -= 1;
        drop(state);
        self.available.notify_one();
    }

    fn release(&self, worker: T) {
        let mut state = self.lock();
        state.outstanding -= 1;
        state.idle.push(worker);
        drop(state);
        self.available.notify_one();
    }

    fn lock(&self) -> MutexGuard<'_, PoolState<T>> {
        // Workers are only moved in and out under the lock, so the state
        // stays consistent even if a holder panicked.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Maximum number of workers this pool will create.
    pub fn max_parallelism(&self) -> usize {
        self.max_parallelism
    }

    /// Number of idle workers.
    pub fn idle_count(&self) -> usize {
        self.lock().idle.len()
    }

    /// Number of leased (or in-creation) workers.
    pub fn outstanding_count(&self) -> usize {
        self.lock().outstanding
    }
}

/// A slot reserved for a worker under construction.
struct Reservation<'a, T: Send> {
    pool: &'a ResourcePool<T>,
    armed: bool,
}

impl<T: Send> Drop for Reservation<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.unreserve();
        }
    }
}

/// Exclusive, scoped access to one pooled worker.
pub struct Lease<'a, T: Send> {
    pool: &'a ResourcePool<T>,
    worker: Option<T>,
}

impl<T: Send> Deref for Lease<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.worker.as_ref().expect("worker is only taken on drop")
    }
}

impl<T: Send> DerefMut for Lease<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.worker.as_mut().expect("worker is only taken on drop")
    }
}

impl<T: Send> Drop for Lease<'_, T> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.pool.release(worker);
        }
    }
}
