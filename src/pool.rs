//! Fixed worker pool with a single shared FIFO queue (spec §3 "Thread pool",
//! §4.8).
//!
//! Ported from the original `zener::ThreadPool_1` (`include/task/
//! threadpool_1.h`): one `Mutex<VecDeque<Task>>` plus a `Condvar`, a fixed
//! set of worker threads parked on the condvar when the queue is empty, and
//! a `closed` flag broadcast at shutdown so every worker wakes, observes it,
//! and exits instead of blocking forever.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

const DEFAULT_WORKERS: usize = 6;

struct Shared {
    queue: Mutex<VecDeque<Task>>,
    condvar: Condvar,
    closed: Mutex<bool>,
}

pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    pub fn new(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            closed: Mutex::new(false),
        });

        let mut workers = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let shared = shared.clone();
            workers.push(
                std::thread::Builder::new()
                    .name(format!("edgehttpd-worker-{id}"))
                    .spawn(move || worker_loop(shared))
                    .expect("failed to spawn worker thread"),
            );
        }

        Self { shared, workers }
    }

    pub fn with_default_workers() -> Self {
        Self::new(DEFAULT_WORKERS)
    }

    /// Enqueue a task and wake one parked worker. Silently dropped if the
    /// pool has already begun shutting down.
    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if *self.shared.closed.lock().unwrap() {
            return;
        }
        self.shared.queue.lock().unwrap().push_back(Box::new(task));
        self.shared.condvar.notify_one();
    }

    pub fn pending(&self) -> usize {
        self.shared.queue.lock().unwrap().len()
    }

    /// Broadcast shutdown and join every worker. Queued-but-unstarted tasks
    /// are dropped, matching the original's non-draining shutdown.
    pub fn shutdown(mut self) {
        *self.shared.closed.lock().unwrap() = true;
        self.shared.condvar.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        *self.shared.closed.lock().unwrap() = true;
        self.shared.condvar.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let task = {
            let mut queue = shared.queue.lock().unwrap();
            loop {
                if let Some(task) = queue.pop_front() {
                    break Some(task);
                }
                if *shared.closed.lock().unwrap() {
                    break None;
                }
                queue = shared.condvar.wait(queue).unwrap();
            }
        };

        match task {
            Some(task) => task(),
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    #[test]
    fn runs_every_submitted_task() {
        let pool = ThreadPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let counter = counter.clone();
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn workers_actually_run_concurrently() {
        let pool = ThreadPool::new(4);
        let barrier = Arc::new(Barrier::new(4));
        for _ in 0..4 {
            let barrier = barrier.clone();
            pool.submit(move || {
                barrier.wait();
            });
        }
        pool.shutdown();
    }

    #[test]
    fn shutdown_wakes_idle_workers_without_hanging() {
        let pool = ThreadPool::new(2);
        pool.shutdown();
    }
}
