//! Fixed-size worker pool
//!
//! A set of OS threads consuming one FIFO job queue. The queue and the
//! lifecycle flags live behind a single lock; condition variables carry the
//! "queue not empty", "queue drained" and "workers joined" signals.
//!
//! Shutdown happens in two phases: intake is closed and the caller waits for
//! the queue to drain, then the workers are told to exit and joined. Jobs
//! that are already queued when shutdown starts always run; jobs submitted
//! afterwards are dropped. Concurrent callers of `shutdown` all block until
//! the first one has joined every worker.

use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::error::{ProxyError, Result};

/// Upper bound on the number of workers a pool may own
pub const MAX_WORKERS: usize = 200;

/// A unit of work handed to the pool
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Externally visible pool state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolLifecycle {
    /// Accepting and executing jobs
    Running,
    /// No longer accepting jobs; queued jobs are still being executed
    Draining,
    /// Every worker has exited
    Terminated,
}

struct PoolState {
    queue: VecDeque<Job>,
    accepting: bool,
    /// Workers exit at their next look at the queue
    stopping: bool,
    /// Set only after every worker has been joined
    terminated: bool,
}

impl PoolState {
    fn lifecycle(&self) -> PoolLifecycle {
        if self.terminated {
            PoolLifecycle::Terminated
        } else if !self.accepting {
            PoolLifecycle::Draining
        } else {
            PoolLifecycle::Running
        }
    }
}

struct Shared {
    state: Mutex<PoolState>,
    not_empty: Condvar,
    drained: Condvar,
    joined: Condvar,
}

/// Bounded pool of worker threads
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl WorkerPool {
    /// Spawn `worker_count` workers. The count must be in `1..=MAX_WORKERS`.
    pub fn new(worker_count: usize) -> Result<Self> {
        if !(1..=MAX_WORKERS).contains(&worker_count) {
            return Err(ProxyError::InvalidPoolSize {
                requested: worker_count,
                max: MAX_WORKERS,
            });
        }

        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                accepting: true,
                stopping: false,
                terminated: false,
            }),
            not_empty: Condvar::new(),
            drained: Condvar::new(),
            joined: Condvar::new(),
        });

        let pool = Self {
            shared,
            workers: Mutex::new(Vec::with_capacity(worker_count)),
            size: worker_count,
        };

        for id in 0..worker_count {
            let shared = pool.shared.clone();
            let spawned = thread::Builder::new()
                .name(format!("webproxy-worker-{}", id))
                .spawn(move || worker_loop(id, shared));

            match spawned {
                Ok(handle) => pool.workers.lock().push(handle),
                Err(e) => {
                    // Dropping the partial pool shuts down what was spawned.
                    return Err(ProxyError::WorkerSpawn(e));
                }
            }
        }

        info!("Worker pool started with {} workers", worker_count);
        Ok(pool)
    }

    /// Queue `job` for execution.
    ///
    /// Once shutdown has begun the job is silently dropped; an accept loop
    /// racing with shutdown is harmless.
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.state.lock();
        if !state.accepting {
            debug!("Pool is not accepting jobs, dropping submission");
            return;
        }
        state.queue.push_back(Box::new(job));
        self.shared.not_empty.notify_one();
    }

    /// Stop intake, wait for queued jobs to finish, then stop and join every
    /// worker.
    ///
    /// Only the first caller drives the shutdown; any other caller blocks
    /// until the pool is terminated.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            if !state.accepting {
                while !state.terminated {
                    self.shared.joined.wait(&mut state);
                }
                return;
            }
            state.accepting = false;
            info!("Worker pool draining {} queued jobs", state.queue.len());

            while !state.queue.is_empty() {
                self.shared.drained.wait(&mut state);
            }

            state.stopping = true;
            self.shared.not_empty.notify_all();
        }

        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in workers {
            if handle.join().is_err() {
                warn!("Worker thread exited abnormally");
            }
        }

        self.shared.state.lock().terminated = true;
        self.shared.joined.notify_all();
        info!("Worker pool terminated");
    }

    pub fn lifecycle(&self) -> PoolLifecycle {
        self.shared.state.lock().lifecycle()
    }

    /// Number of jobs waiting for a worker
    pub fn queued(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Number of workers this pool was created with
    pub fn size(&self) -> usize {
        self.size
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("queued", &state.queue.len())
            .field("lifecycle", &state.lifecycle())
            .finish()
    }
}

fn worker_loop(id: usize, shared: Arc<Shared>) {
    debug!(worker = id, "Worker started");

    loop {
        let job = {
            let mut state = shared.state.lock();
            loop {
                if state.stopping {
                    debug!(worker = id, "Worker exiting");
                    return;
                }
                if let Some(job) = state.queue.pop_front() {
                    break job;
                }
                shared.not_empty.wait(&mut state);
            }
        };

        // The lock is released while the job runs.
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!(worker = id, "Job panicked; worker continues");
        }

        let state = shared.state.lock();
        if state.queue.is_empty() {
            shared.drained.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    fn wait_for(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_rejects_out_of_range_sizes() {
        assert!(matches!(
            WorkerPool::new(0),
            Err(ProxyError::InvalidPoolSize { requested: 0, .. })
        ));
        assert!(matches!(
            WorkerPool::new(MAX_WORKERS + 1),
            Err(ProxyError::InvalidPoolSize { .. })
        ));
        let pool = WorkerPool::new(MAX_WORKERS).unwrap();
        assert_eq!(pool.size(), MAX_WORKERS);
        pool.shutdown();
    }

    #[test]
    fn test_every_job_runs_exactly_once() {
        let pool = WorkerPool::new(3).unwrap();
        let counters: Arc<Vec<AtomicUsize>> =
            Arc::new((0..50).map(|_| AtomicUsize::new(0)).collect());

        for i in 0..50 {
            let counters = counters.clone();
            pool.submit(move || {
                counters[i].fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.shutdown();

        assert!(counters.iter().all(|c| c.load(Ordering::SeqCst) == 1));
        assert_eq!(pool.lifecycle(), PoolLifecycle::Terminated);
    }

    #[test]
    fn test_single_worker_runs_jobs_in_fifo_order() {
        let pool = WorkerPool::new(1).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        // Hold the only worker so everything below is queued behind it.
        let (release_tx, release_rx) = mpsc::channel::<()>();
        pool.submit(move || {
            let _ = release_rx.recv();
        });
        wait_for(|| pool.queued() == 0);

        for i in 0..10 {
            let order = order.clone();
            pool.submit(move || order.lock().push(i));
        }
        assert_eq!(pool.queued(), 10);

        release_tx.send(()).unwrap();
        pool.shutdown();

        assert_eq!(*order.lock(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_concurrency_is_bounded_by_pool_size() {
        let pool = WorkerPool::new(2).unwrap();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let active = active.clone();
            let peak = peak.clone();
            let done = done.clone();
            pool.submit(move || {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(50));
                active.fetch_sub(1, Ordering::SeqCst);
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.shutdown();

        assert_eq!(done.load(Ordering::SeqCst), 5);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(active.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_submit_after_shutdown_is_dropped() {
        let pool = Arc::new(WorkerPool::new(1).unwrap());
        let ran = Arc::new(AtomicUsize::new(0));

        let (release_tx, release_rx) = mpsc::channel::<()>();
        pool.submit(move || {
            let _ = release_rx.recv();
        });
        wait_for(|| pool.queued() == 0);
        // Queued before shutdown starts, so it must run.
        {
            let ran = ran.clone();
            pool.submit(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            });
        }

        let closer = {
            let pool = pool.clone();
            thread::spawn(move || pool.shutdown())
        };
        wait_for(|| pool.lifecycle() == PoolLifecycle::Draining);

        {
            let ran = ran.clone();
            pool.submit(move || {
                ran.fetch_add(100, Ordering::SeqCst);
            });
        }
        assert_eq!(pool.queued(), 1);

        release_tx.send(()).unwrap();
        closer.join().unwrap();

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(pool.lifecycle(), PoolLifecycle::Terminated);
    }

    #[test]
    fn test_shutdown_waits_for_queued_jobs() {
        let pool = WorkerPool::new(2).unwrap();
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..6 {
            let done = done.clone();
            pool.submit(move || {
                thread::sleep(Duration::from_millis(20));
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.shutdown();

        assert_eq!(done.load(Ordering::SeqCst), 6);
        assert_eq!(pool.queued(), 0);
    }

    #[test]
    fn test_concurrent_shutdown_waits_for_first_caller() {
        let pool = Arc::new(WorkerPool::new(1).unwrap());
        let finished = Arc::new(AtomicUsize::new(0));

        let (release_tx, release_rx) = mpsc::channel::<()>();
        {
            let finished = finished.clone();
            pool.submit(move || {
                let _ = release_rx.recv();
                finished.fetch_add(1, Ordering::SeqCst);
            });
        }
        wait_for(|| pool.queued() == 0);

        let first = {
            let pool = pool.clone();
            thread::spawn(move || pool.shutdown())
        };
        wait_for(|| pool.lifecycle() == PoolLifecycle::Draining);

        let second = {
            let pool = pool.clone();
            let finished = finished.clone();
            thread::spawn(move || {
                pool.shutdown();
                finished.load(Ordering::SeqCst)
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!second.is_finished());
        assert_eq!(pool.lifecycle(), PoolLifecycle::Draining);

        release_tx.send(()).unwrap();
        assert_eq!(second.join().unwrap(), 1);
        first.join().unwrap();
        assert_eq!(pool.lifecycle(), PoolLifecycle::Terminated);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let pool = WorkerPool::new(2).unwrap();
        pool.shutdown();
        pool.shutdown();
        assert_eq!(pool.lifecycle(), PoolLifecycle::Terminated);
    }

    #[test]
    fn test_shutdown_of_idle_pool() {
        let pool = WorkerPool::new(4).unwrap();
        assert_eq!(pool.lifecycle(), PoolLifecycle::Running);
        pool.shutdown();
        assert_eq!(pool.lifecycle(), PoolLifecycle::Terminated);
    }

    #[test]
    fn test_panicking_job_does_not_kill_worker() {
        let pool = WorkerPool::new(1).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));

        pool.submit(|| panic!("job failure"));
        {
            let ran = ran.clone();
            pool.submit(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.shutdown();

        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_runs_queued_jobs() {
        let ran = Arc::new(AtomicUsize::new(0));
        {
            let pool = WorkerPool::new(2).unwrap();
            for _ in 0..4 {
                let ran = ran.clone();
                pool.submit(move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                });
            }
        }
        assert_eq!(ran.load(Ordering::SeqCst), 4);
    }
}
