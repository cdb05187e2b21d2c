//! Persistence client: store lifecycle, execution contexts and the ordering
//! queue every store operation goes through.
//!
//! # Responsibility
//! - Open and close one store and own its executor thread.
//! - Route work to the primary or background context.
//!
//! # Invariants
//! - All store work runs on the executor in submission order.
//! - Records never leave the executor; `perform` only returns `Send` values.
//! - Store work submitted from the executor itself is rejected, not deadlocked.

mod context;
mod executor;
mod failure;
mod session;
mod sql;

pub use context::ContextKind;
pub use failure::{FailureCause, Operation, Severity, StorageFailure, StoreResult};
pub use session::{CommitOutcome, Session};

use crate::config::StoreConfig;
use crate::db::schema::Schema;
use executor::OrderingQueue;
use log::{error, info};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, ThreadId};
use std::time::Instant;

/// Handle to one open store. Clones share the same executor.
#[derive(Clone)]
pub struct PersistenceClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    name: String,
    schema: Schema,
    opener_thread: ThreadId,
    commits: Arc<AtomicU64>,
    queue: OrderingQueue,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.queue.shutdown();
    }
}

impl PersistenceClient {
    /// Validates `config`, starts the executor and opens the store on it.
    ///
    /// The calling thread becomes the primary context's thread.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        let started_at = Instant::now();
        info!(
            "event=store_open module=client status=start store={}",
            config.name
        );
        if let Err(err) = config.validate() {
            error!(
                "event=store_open module=client status=error store={} error={}",
                config.name, err
            );
            return Err(StorageFailure::new(Operation::Open, err));
        }

        let name = config.name.clone();
        let schema = config.schema.clone();
        let commits = Arc::new(AtomicU64::new(0));
        let queue = match OrderingQueue::start(config, Arc::clone(&commits)) {
            Ok(queue) => queue,
            Err(failure) => {
                error!(
                    "event=store_open module=client status=error store={name} duration_ms={} \
                        error={failure}",
                    started_at.elapsed().as_millis()
                );
                return Err(failure);
            }
        };

        info!(
            "event=store_open module=client status=ok store={name} kinds={} duration_ms={}",
            schema.kinds().len(),
            started_at.elapsed().as_millis()
        );
        Ok(Self {
            inner: Arc::new(ClientInner {
                name,
                schema,
                opener_thread: thread::current().id(),
                commits,
                queue,
            }),
        })
    }

    /// Drains queued work and stops the executor.
    ///
    /// Every handle sharing this store observes `StoreClosed` afterwards.
    pub fn close(&self) -> StoreResult<()> {
        if self.inner.queue.is_executor_thread() {
            return Err(StorageFailure::new(Operation::Close, FailureCause::Reentrant));
        }
        if !self.inner.queue.shutdown() {
            return Err(StorageFailure::new(Operation::Close, FailureCause::StoreClosed));
        }
        info!(
            "event=store_close module=client status=ok store={}",
            self.inner.name
        );
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    /// Context for the calling thread: primary on the opening thread,
    /// background everywhere else.
    pub fn current_context(&self) -> ContextKind {
        if thread::current().id() == self.inner.opener_thread {
            ContextKind::Primary
        } else {
            ContextKind::Background
        }
    }

    /// Runs `work` on the executor against `context` and waits for it.
    pub fn perform<R, F>(
        &self,
        context: ContextKind,
        operation: Operation,
        work: F,
    ) -> StoreResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut Session<'_>) -> StoreResult<R> + Send + 'static,
    {
        if self.inner.queue.is_executor_thread() {
            return Err(StorageFailure::new(operation, FailureCause::Reentrant));
        }

        let (reply_tx, reply_rx) = mpsc::channel();
        self.inner.queue.submit(
            operation,
            Box::new(move |state| {
                let mut session = Session::new(state, context);
                let _ = reply_tx.send(work(&mut session));
            }),
        )?;
        reply_rx
            .recv()
            .map_err(|_| StorageFailure::new(operation, FailureCause::StoreClosed))?
    }

    pub fn commit(&self, context: ContextKind) -> StoreResult<CommitOutcome> {
        self.perform(context, Operation::Commit, |session| session.commit())
    }

    /// Deletes every record of every kind; see [`Session::delete_all_records`].
    pub fn delete_all_records(&self, context: ContextKind) -> StoreResult<usize> {
        self.perform(context, Operation::DeleteAll, |session| {
            session.delete_all_records()
        })
    }

    pub fn has_changes(&self, context: ContextKind) -> StoreResult<bool> {
        self.perform(context, Operation::Query, |session| Ok(session.has_changes()))
    }

    /// Engine transactions committed since open.
    pub fn commit_count(&self) -> u64 {
        self.inner.commits.load(Ordering::SeqCst)
    }
}
