//! Bounded worker-thread pool for transfer execution.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::debug;

use vksnap_core::options::ThreadInitCallback;

pub type Job = Box<dyn FnOnce() + Send>;

struct InFlight {
    count: Mutex<usize>,
    drained: Condvar,
}

/// Fixed-size pool draining a job channel. [`WorkerPool::wait`] blocks until
/// every posted job has finished.
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    in_flight: Arc<InFlight>,
}

impl WorkerPool {
    /// Default worker count when the caller asks for 0 threads.
    pub fn default_size() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .min(8)
    }

    pub fn new(size: usize, thread_init: Option<ThreadInitCallback>) -> Self {
        let (sender, receiver) = unbounded::<Job>();
        let in_flight = Arc::new(InFlight {
            count: Mutex::new(0),
            drained: Condvar::new(),
        });

        let workers = (0..size)
            .map(|index| {
                let receiver = receiver.clone();
                let in_flight = in_flight.clone();
                let init = thread_init.clone();
                std::thread::Builder::new()
                    .name(format!("vksnap-copy-{index}"))
                    .spawn(move || {
                        if let Some(init) = init {
                            init();
                        }
                        while let Ok(job) = receiver.recv() {
                            job();
                            let mut count = in_flight.count.lock();
                            *count -= 1;
                            if *count == 0 {
                                in_flight.drained.notify_all();
                            }
                        }
                        debug!("copy worker exiting");
                    })
                    .expect("spawn copy worker")
            })
            .collect();

        Self {
            sender: Some(sender),
            workers,
            in_flight,
        }
    }

    pub fn execute(&self, job: Job) {
        *self.in_flight.count.lock() += 1;
        if let Some(sender) = &self.sender {
            // The receiver lives as long as the workers; send cannot fail
            // before drop.
            let _ = sender.send(job);
        }
    }

    /// Block until every posted job has completed.
    pub fn wait(&self) {
        let mut count = self.in_flight.count.lock();
        while *count > 0 {
            self.in_flight.drained.wait(&mut count);
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn wait_drains_all_jobs() {
        let pool = WorkerPool::new(3, None);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..32 {
            let counter = counter.clone();
            pool.execute(Box::new(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            }));
        }
        pool.wait();
        assert_eq!(counter.load(Ordering::Relaxed), 32);
    }

    #[test]
    fn thread_init_runs_once_per_worker() {
        let inits = Arc::new(AtomicUsize::new(0));
        let observed = inits.clone();
        let pool = WorkerPool::new(2, Some(Arc::new(move || {
            observed.fetch_add(1, Ordering::Relaxed);
        })));
        // Give workers a job each so both have started.
        pool.execute(Box::new(|| {}));
        pool.execute(Box::new(|| {}));
        pool.wait();
        drop(pool);
        assert_eq!(inits.load(Ordering::Relaxed), 2);
    }
}
