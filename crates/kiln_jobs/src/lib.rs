//! Background job system for the import pipeline.
//!
//! A fixed pool of worker threads executes jobs submitted through
//! [`JobSystem::spawn`]. Each job reports completion through a thread-safe
//! [`JobHandle`]; the scheduler polls handles from its update loop and never
//! shares mutable state with running jobs.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Sender};
use parking_lot::{Condvar, Mutex};
use thiserror::Error;

/// Error produced by a job body.
#[derive(Debug, Error)]
pub enum JobError {
    /// The job body returned an error.
    #[error("{0}")]
    Failed(String),
    /// The job body panicked. The panic is contained by the worker.
    #[error("job panicked: {0}")]
    Panicked(String),
}

impl JobError {
    /// Wrap any error type into a job failure.
    pub fn failed(err: impl std::fmt::Display) -> Self {
        JobError::Failed(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Running,
    Done,
    Failed,
}

struct JobState {
    name: String,
    status: Mutex<Status>,
    signal: Condvar,
}

/// Thread-safe handle to a spawned job.
///
/// Cloneable; all clones observe the same completion state.
#[derive(Clone)]
pub struct JobHandle(Arc<JobState>);

impl JobHandle {
    fn new(name: &str) -> Self {
        Self(Arc::new(JobState {
            name: name.to_string(),
            status: Mutex::new(Status::Running),
            signal: Condvar::new(),
        }))
    }

    /// The name the job was spawned with.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// True once the job finished, successfully or not.
    pub fn is_done(&self) -> bool {
        *self.0.status.lock() != Status::Running
    }

    /// True if the job finished with an error or panic.
    pub fn is_failed(&self) -> bool {
        *self.0.status.lock() == Status::Failed
    }

    /// Block until the job finishes. Cooperative callers may poll
    /// [`JobHandle::is_done`] instead.
    pub fn wait(&self) {
        let mut status = self.0.status.lock();
        while *status == Status::Running {
            self.0.signal.wait(&mut status);
        }
    }

    fn complete(&self, failed: bool) {
        let mut status = self.0.status.lock();
        *status = if failed { Status::Failed } else { Status::Done };
        self.0.signal.notify_all();
    }
}

type JobFn = Box<dyn FnOnce() -> Result<(), JobError> + Send + 'static>;

struct Job {
    handle: JobHandle,
    run: JobFn,
}

/// Fixed-size worker pool.
///
/// Dropping the system closes the queue and joins every worker; jobs already
/// in flight run to completion rather than being cancelled.
pub struct JobSystem {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl JobSystem {
    /// Spawn `worker_count` worker threads (minimum one).
    pub fn new(worker_count: usize) -> Self {
        let (sender, receiver) = unbounded::<Job>();
        let count = worker_count.max(1);

        let workers = (0..count)
            .map(|i| {
                let rx = receiver.clone();
                std::thread::Builder::new()
                    .name(format!("kiln-worker-{}", i))
                    .spawn(move || {
                        for job in rx.iter() {
                            let Job { handle, run } = job;
                            match catch_unwind(AssertUnwindSafe(run)) {
                                Ok(Ok(())) => handle.complete(false),
                                Ok(Err(e)) => {
                                    log::error!("job '{}' failed: {}", handle.name(), e);
                                    handle.complete(true);
                                }
                                Err(payload) => {
                                    let msg = panic_message(&payload);
                                    log::error!("job '{}' panicked: {}", handle.name(), msg);
                                    handle.complete(true);
                                }
                            }
                        }
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self {
            sender: Some(sender),
            workers,
        }
    }

    /// Submit a job and return its handle.
    pub fn spawn<F>(&self, name: &str, f: F) -> JobHandle
    where
        F: FnOnce() -> Result<(), JobError> + Send + 'static,
    {
        let handle = JobHandle::new(name);
        let job = Job {
            handle: handle.clone(),
            run: Box::new(f),
        };

        match &self.sender {
            Some(tx) => {
                // Send only fails if every worker already exited.
                if tx.send(job).is_err() {
                    log::error!("job '{}' rejected: worker pool is gone", name);
                    handle.complete(true);
                }
            }
            None => handle.complete(true),
        }

        handle
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Close the queue and join all workers. In-flight jobs finish first.
    pub fn shutdown(&mut self) {
        self.sender = None;
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for JobSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
