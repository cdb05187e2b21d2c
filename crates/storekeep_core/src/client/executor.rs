//! Single-thread executor serializing all store work.
//!
//! # Responsibility
//! - Own the store state on one dedicated thread.
//! - Run submitted jobs strictly in submission order.
//!
//! # Invariants
//! - Jobs never run concurrently; each sees the effects of all earlier jobs.
//! - After `shutdown` no job is accepted and the state has been dropped.

use crate::client::failure::{FailureCause, Operation, StorageFailure, StoreResult};
use crate::client::session::StoreState;
use crate::config::StoreConfig;
use log::{debug, info};
use parking_lot::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

pub(crate) type Job = Box<dyn FnOnce(&mut StoreState) + Send>;

pub(crate) struct OrderingQueue {
    sender: Mutex<Option<Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    executor_thread: ThreadId,
}

impl OrderingQueue {
    /// Starts the executor and opens the store on it.
    ///
    /// Returns once the store is open, or with the open failure.
    pub(crate) fn start(config: StoreConfig, commits: Arc<AtomicU64>) -> StoreResult<Self> {
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (ready_tx, ready_rx) = mpsc::channel::<StoreResult<()>>();
        let name = config.name.clone();

        let worker = thread::Builder::new()
            .name(format!("storekeep-{name}"))
            .spawn(move || {
                let mut state = match StoreState::open(&config, commits) {
                    Ok(state) => {
                        let _ = ready_tx.send(Ok(()));
                        state
                    }
                    Err(failure) => {
                        let _ = ready_tx.send(Err(failure));
                        return;
                    }
                };
                while let Ok(job) = job_rx.recv() {
                    job(&mut state);
                }
                debug!("event=store_executor module=client status=drained store={name}");
            })
            .map_err(|err| {
                StorageFailure::new(Operation::Open, FailureCause::Executor(err.to_string()))
            })?;

        let executor_thread = worker.thread().id();
        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(failure)) => {
                let _ = worker.join();
                return Err(failure);
            }
            Err(_) => {
                let _ = worker.join();
                return Err(StorageFailure::new(
                    Operation::Open,
                    FailureCause::Executor("executor exited during open".into()),
                ));
            }
        }

        Ok(Self {
            sender: Mutex::new(Some(job_tx)),
            worker: Mutex::new(Some(worker)),
            executor_thread,
        })
    }

    /// Enqueues a job behind every job submitted before it.
    pub(crate) fn submit(&self, operation: Operation, job: Job) -> StoreResult<()> {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            return Err(StorageFailure::new(operation, FailureCause::StoreClosed));
        };
        sender
            .send(job)
            .map_err(|_| StorageFailure::new(operation, FailureCause::StoreClosed))
    }

    pub(crate) fn is_executor_thread(&self) -> bool {
        thread::current().id() == self.executor_thread
    }

    /// Stops accepting jobs, drains queued ones and joins the executor.
    ///
    /// Returns `false` when the queue was already shut down.
    pub(crate) fn shutdown(&self) -> bool {
        let Some(sender) = self.sender.lock().take() else {
            return false;
        };
        drop(sender);
        if let Some(worker) = self.worker.lock().take() {
            if self.is_executor_thread() {
                // Dropped from inside a job: the thread exits on its own.
                return true;
            }
            let _ = worker.join();
        }
        info!("event=store_executor module=client status=stopped");
        true
    }
}
