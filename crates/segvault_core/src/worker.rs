//! Fixed pools of worker threads for replica background work.
//!
//! Storage writes and loads run on one pool, eager recovery builds on
//! another, so a build that blocks on a load can never occupy the thread
//! that load needs.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::error;

/// A unit of background work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

struct PoolInner {
    name: String,
    queue: Mutex<VecDeque<Job>>,
    work_ready: Condvar,
    idle: Condvar,
    active: AtomicUsize,
    threads: usize,
    shutdown: AtomicBool,
}

/// A cloneable handle for submitting jobs to a [`WorkerPool`].
///
/// Handles do not keep the pool's threads alive. Once the pool has shut
/// down, or if it was created with no threads, [`WorkerHandle::submit`]
/// runs the job on the calling thread.
#[derive(Clone)]
pub struct WorkerHandle {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("name", &self.inner.name)
            .field("threads", &self.inner.threads)
            .finish()
    }
}

impl WorkerHandle {
    /// Queues `job` in FIFO order.
    ///
    /// Must not be called while holding a lock the job itself takes: with
    /// an inline pool the job runs before this returns.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        if self.inner.threads == 0 {
            run_job(&self.inner.name, Box::new(job));
            return;
        }
        // Shutdown flips under the queue lock, so a queued job is always drained.
        let mut queue = self.inner.queue.lock();
        if self.inner.shutdown.load(Ordering::Acquire) {
            drop(queue);
            run_job(&self.inner.name, Box::new(job));
            return;
        }
        queue.push_back(Box::new(job));
        drop(queue);
        self.inner.work_ready.notify_one();
    }

    /// Blocks until the queue is empty and no job is running.
    pub fn drain(&self) {
        let mut queue = self.inner.queue.lock();
        while !queue.is_empty() || self.inner.active.load(Ordering::Acquire) > 0 {
            self.inner.idle.wait(&mut queue);
        }
    }

    /// Returns the number of jobs waiting to run.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.inner.queue.lock().len()
    }
}

/// A fixed pool of named worker threads.
///
/// Dropping the pool finishes every queued job and joins the threads.
pub struct WorkerPool {
    handle: WorkerHandle,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Starts a pool of `threads` workers named `{name}-0`, `{name}-1`, ...
    ///
    /// # Errors
    ///
    /// Returns an error if a thread cannot be spawned.
    pub fn new(name: &str, threads: usize) -> io::Result<Self> {
        let inner = Arc::new(PoolInner {
            name: name.to_string(),
            queue: Mutex::new(VecDeque::new()),
            work_ready: Condvar::new(),
            idle: Condvar::new(),
            active: AtomicUsize::new(0),
            threads,
            shutdown: AtomicBool::new(false),
        });

        let pool = Self {
            handle: WorkerHandle {
                inner: Arc::clone(&inner),
            },
            workers: Mutex::new(Vec::with_capacity(threads)),
        };
        for i in 0..threads {
            let inner = Arc::clone(&inner);
            let worker = std::thread::Builder::new()
                .name(format!("{name}-{i}"))
                .spawn(move || worker_loop(&inner))?;
            pool.workers.lock().push(worker);
        }
        Ok(pool)
    }

    /// Returns a handle for submitting jobs.
    #[must_use]
    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    /// Returns the number of worker threads.
    #[must_use]
    pub fn threads(&self) -> usize {
        self.handle.inner.threads
    }

    /// Runs the remaining jobs, then stops and joins the workers.
    ///
    /// Jobs submitted afterwards run on the submitting thread.
    pub fn shutdown(&self) {
        let inner = &self.handle.inner;
        {
            let _queue = inner.queue.lock();
            inner.shutdown.store(true, Ordering::Release);
            inner.work_ready.notify_all();
        }
        for worker in self.workers.lock().drain(..) {
            if worker.join().is_err() {
                error!("{} worker exited with a panic", inner.name);
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.handle.inner.name)
            .field("threads", &self.handle.inner.threads)
            .finish()
    }
}

fn run_job(name: &str, job: Job) {
    if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)) {
        error!(
            "{name} job panicked: {}",
            panic
                .downcast_ref::<&str>()
                .copied()
                .unwrap_or("(non-string panic)")
        );
    }
}

fn worker_loop(inner: &PoolInner) {
    loop {
        let job = {
            let mut queue = inner.queue.lock();
            loop {
                if let Some(job) = queue.pop_front() {
                    inner.active.fetch_add(1, Ordering::Release);
                    break job;
                }
                if inner.shutdown.load(Ordering::Acquire) {
                    return;
                }
                inner.work_ready.wait(&mut queue);
            }
        };

        run_job(&inner.name, job);

        let queue = inner.queue.lock();
        inner.active.fetch_sub(1, Ordering::Release);
        if queue.is_empty() && inner.active.load(Ordering::Acquire) == 0 {
            inner.idle.notify_all();
        }
    }
}
