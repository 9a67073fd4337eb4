//! Bounded worker pools for blocking archive work.
//!
//! # Design
//! - A pool is a chain of generations. Each generation owns a semaphore sized
//!   to its worker count; waiters queue on it in FIFO order.
//! - Resizing installs a fresh generation and retires the previous one without
//!   waiting. Tasks admitted to a retired generation still run under its bound.
//! - Every admitted task runs on its own named thread and carries its permit,
//!   so the bound holds even when the caller stops awaiting the result.
//! - Pools share no execution resource. A backlog of parked stage copies
//!   cannot starve flush or remove of threads.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread;

use hsmlink_config::{PoolKind, WorkerCount};
use hsmlink_telemetry::Metrics;
use serde::Serialize;
use tokio::sync::{Notify, Semaphore, oneshot};
use tracing::{error, info};

use crate::error::{ConnectorError, ConnectorResult};

#[derive(Debug)]
struct Generation {
    number: u64,
    workers: WorkerCount,
    permits: Arc<Semaphore>,
    outstanding: AtomicUsize,
    idle: Notify,
}

impl Generation {
    fn new(number: u64, workers: WorkerCount) -> Self {
        Self {
            number,
            workers,
            permits: Arc::new(Semaphore::new(workers.get().min(Semaphore::MAX_PERMITS))),
            outstanding: AtomicUsize::new(0),
            idle: Notify::new(),
        }
    }

    fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Bookkeeping for one admitted task; released when the task finishes or is
/// rejected while queued.
struct Admission {
    pool: PoolKind,
    generation: Arc<Generation>,
    metrics: Metrics,
}

impl Drop for Admission {
    fn drop(&mut self) {
        self.metrics.dec_in_flight(self.pool.as_str());
        if self.generation.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.generation.idle.notify_waiters();
        }
    }
}

/// Point-in-time view of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Operation type served by the pool.
    pub pool: PoolKind,
    /// Generation currently accepting tasks.
    pub generation: u64,
    /// Worker count of the current generation.
    pub workers: WorkerCount,
    /// Idle workers in the current generation.
    pub available: usize,
    /// Tasks admitted to the current generation and not yet finished.
    pub outstanding: usize,
    /// Tasks still running or queued on retired generations.
    pub retired_outstanding: usize,
    /// Whether the pool accepts new tasks.
    pub accepting: bool,
}

/// Worker pool with a runtime-adjustable concurrency bound.
#[derive(Debug)]
pub struct ConcurrencyPool {
    kind: PoolKind,
    current: RwLock<Arc<Generation>>,
    retired: Mutex<Vec<Arc<Generation>>>,
    next_generation: AtomicU64,
    accepting: AtomicBool,
    metrics: Metrics,
}

impl ConcurrencyPool {
    /// Create a pool with `workers` concurrent slots.
    #[must_use]
    pub fn new(kind: PoolKind, workers: WorkerCount, metrics: Metrics) -> Self {
        metrics.set_pool_workers(kind.as_str(), workers.get());
        Self {
            kind,
            current: RwLock::new(Arc::new(Generation::new(0, workers))),
            retired: Mutex::new(Vec::new()),
            next_generation: AtomicU64::new(1),
            accepting: AtomicBool::new(true),
            metrics,
        }
    }

    /// Create a pool with the default worker count for `kind`.
    #[must_use]
    pub fn with_defaults(kind: PoolKind, metrics: Metrics) -> Self {
        Self::new(kind, kind.default_workers(), metrics)
    }

    /// Operation type served by this pool.
    #[must_use]
    pub const fn kind(&self) -> PoolKind {
        self.kind
    }

    /// Run a blocking task once a worker is free and return its result.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::PoolShutdown`] when the pool no longer accepts
    /// tasks or was shut down while the task waited,
    /// [`ConnectorError::WorkerSpawn`] when no thread could be started, and
    /// [`ConnectorError::Worker`] when the task panicked.
    pub async fn submit<F, T>(&self, task: F) -> ConnectorResult<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let admission = self.admit()?;
        let permit = Arc::clone(&admission.generation.permits)
            .acquire_owned()
            .await
            .map_err(|_| ConnectorError::PoolShutdown { pool: self.kind })?;

        let (respond_to, response) = oneshot::channel();
        thread::Builder::new()
            .name(format!("hsmlink-{}", self.kind))
            .spawn(move || {
                let _admission = admission;
                let _permit = permit;
                let _ = respond_to.send(task());
            })
            .map_err(|source| ConnectorError::WorkerSpawn {
                pool: self.kind,
                source,
            })?;
        // The sender only disappears unanswered when the task unwound.
        response.await.map_err(|_| ConnectorError::Worker {
            pool: self.kind,
            reason: "panicked",
        })
    }

    fn admit(&self) -> ConnectorResult<Admission> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(ConnectorError::PoolShutdown { pool: self.kind });
        }
        // Counted under the read lock so a concurrent resize never retires a
        // generation with an uncounted task.
        let generation = {
            let current = self.read_current();
            current.outstanding.fetch_add(1, Ordering::AcqRel);
            Arc::clone(&current)
        };
        self.metrics.inc_in_flight(self.kind.as_str());
        Ok(Admission {
            pool: self.kind,
            generation,
            metrics: self.metrics.clone(),
        })
    }

    /// Replace the concurrency bound, returning the new generation number.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::InvalidConfiguration`] when `workers` is zero.
    pub fn resize(&self, workers: usize) -> ConnectorResult<u64> {
        let workers = WorkerCount::new(self.kind.property_key(), workers)?;
        Ok(self.resize_to(workers))
    }

    /// Install a new generation with a validated worker count.
    ///
    /// Tasks already admitted to the previous generation keep running under its
    /// bound; new submissions go to the new generation.
    pub fn resize_to(&self, workers: WorkerCount) -> u64 {
        let number = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let previous = {
            let mut current = self.write_current();
            std::mem::replace(&mut *current, Arc::new(Generation::new(number, workers)))
        };
        {
            let mut retired = self.lock_retired();
            retired.retain(|generation| generation.outstanding() > 0);
            if previous.outstanding() > 0 {
                retired.push(Arc::clone(&previous));
            }
        }

        self.metrics.set_pool_workers(self.kind.as_str(), workers.get());
        self.metrics.inc_pool_resize(self.kind.as_str());
        info!(
            pool = %self.kind,
            workers = %workers,
            previous_workers = %previous.workers,
            generation = number,
            retired_outstanding = previous.outstanding(),
            "resized worker pool"
        );
        number
    }

    /// Stop accepting tasks; admitted tasks, running or queued, still complete.
    pub fn shutdown(&self) {
        if self.accepting.swap(false, Ordering::AcqRel) {
            info!(pool = %self.kind, "worker pool stopped accepting tasks");
        }
    }

    /// Stop accepting tasks and reject those still waiting for a worker.
    ///
    /// Running tasks are not interrupted and this call does not wait for them.
    pub fn shutdown_now(&self) {
        self.shutdown();
        for generation in self.generations() {
            generation.permits.close();
        }
        info!(pool = %self.kind, "worker pool rejected queued tasks");
    }

    /// Wait until every task admitted to any generation has finished.
    pub async fn drain(&self) {
        for generation in self.generations() {
            generation.wait_idle().await;
        }
    }

    /// Current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let current = Arc::clone(&self.read_current());
        let retired_outstanding = self
            .lock_retired()
            .iter()
            .map(|generation| generation.outstanding())
            .sum();
        PoolStats {
            pool: self.kind,
            generation: current.number,
            workers: current.workers,
            available: current.permits.available_permits(),
            outstanding: current.outstanding(),
            retired_outstanding,
            accepting: self.accepting.load(Ordering::Acquire),
        }
    }

    fn generations(&self) -> Vec<Arc<Generation>> {
        let mut generations = vec![Arc::clone(&self.read_current())];
        generations.extend(self.lock_retired().iter().cloned());
        generations
    }

    fn read_current(&self) -> RwLockReadGuard<'_, Arc<Generation>> {
        self.current.read().unwrap_or_else(|poisoned| {
            error!(pool = %self.kind, "worker pool lock poisoned; continuing with recovered guard");
            poisoned.into_inner()
        })
    }

    fn write_current(&self) -> RwLockWriteGuard<'_, Arc<Generation>> {
        self.current.write().unwrap_or_else(|poisoned| {
            error!(pool = %self.kind, "worker pool lock poisoned; continuing with recovered guard");
            poisoned.into_inner()
        })
    }

    fn lock_retired(&self) -> MutexGuard<'_, Vec<Arc<Generation>>> {
        self.retired.lock().unwrap_or_else(|poisoned| {
            error!(pool = %self.kind, "retired list poisoned; continuing with recovered guard");
            poisoned.into_inner()
        })
    }
}

/// The three pools of a connector instance.
#[derive(Debug)]
pub struct PoolSet {
    flush: ConcurrencyPool,
    stage: ConcurrencyPool,
    remove: ConcurrencyPool,
}

impl PoolSet {
    /// Create pools with their default worker counts.
    #[must_use]
    pub fn with_defaults(metrics: &Metrics) -> Self {
        Self {
            flush: ConcurrencyPool::with_defaults(PoolKind::Flush, metrics.clone()),
            stage: ConcurrencyPool::with_defaults(PoolKind::Stage, metrics.clone()),
            remove: ConcurrencyPool::with_defaults(PoolKind::Remove, metrics.clone()),
        }
    }

    /// Pool serving `kind`.
    #[must_use]
    pub const fn get(&self, kind: PoolKind) -> &ConcurrencyPool {
        match kind {
            PoolKind::Flush => &self.flush,
            PoolKind::Stage => &self.stage,
            PoolKind::Remove => &self.remove,
        }
    }

    /// Statistics for every pool in flush, stage, remove order.
    #[must_use]
    pub fn stats(&self) -> Vec<PoolStats> {
        PoolKind::ALL
            .into_iter()
            .map(|kind| self.get(kind).stats())
            .collect()
    }

    /// Stop all pools from accepting tasks.
    pub fn shutdown(&self) {
        for kind in PoolKind::ALL {
            self.get(kind).shutdown();
        }
    }

    /// Stop all pools and reject their queued tasks.
    pub fn shutdown_now(&self) {
        for kind in PoolKind::ALL {
            self.get(kind).shutdown_now();
        }
    }

    /// Wait for every admitted task in every pool.
    pub async fn drain(&self) {
        for kind in PoolKind::ALL {
            self.get(kind).drain().await;
        }
    }
}
