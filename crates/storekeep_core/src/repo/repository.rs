//! Repository contract and its store-backed implementation.
//!
//! # Responsibility
//! - Provide save/fetch/delete over entities of one kind.
//! - Run every call as a single item on the store's ordering queue.
//!
//! # Invariants
//! - `save`/`save_several` persist all items or none.
//! - `update` never touches the store.

use crate::client::{
    ContextKind, FailureCause, Operation, PersistenceClient, Session, StorageFailure, StoreResult,
};
use crate::model::query::{PageSpec, Predicate, QueryRequest, SortSpec};
use crate::repo::mapping::MappingContract;
use crate::repo::{RepoError, RepoResult};
use log::{debug, warn};
use std::marker::PhantomData;

/// Deferred mutation accepted by [`BaseRepository::update`].
pub type UpdateBlock = Box<dyn FnOnce() + Send>;

/// Caller-facing operations over one entity type.
pub trait BaseRepository {
    type Entity;

    fn save(&self, item: Self::Entity) -> RepoResult<()>;
    fn save_several(&self, items: Vec<Self::Entity>) -> RepoResult<()>;
    /// Always `NotImplemented`; `block` is dropped uncalled.
    fn update(&self, block: UpdateBlock) -> RepoResult<()>;
    fn delete(&self, predicate: Predicate) -> RepoResult<()>;
    fn delete_all(&self) -> RepoResult<()>;
    fn fetch(
        &self,
        predicate: Option<Predicate>,
        sort: Option<SortSpec>,
        page: Option<PageSpec>,
    ) -> RepoResult<Vec<Self::Entity>>;

    fn fetch_all(&self) -> RepoResult<Vec<Self::Entity>> {
        self.fetch(None, None, None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MutationState {
    Idle,
    Enqueued,
    Executing(ContextKind),
    Committed,
    Failed,
}

impl MutationState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Enqueued => "enqueued",
            Self::Executing(ContextKind::Primary) => "executing_primary",
            Self::Executing(ContextKind::Background) => "executing_background",
            Self::Committed => "committed",
            Self::Failed => "failed",
        }
    }
}

fn log_state(kind: &str, action: &str, state: MutationState) {
    debug!(
        "event=repo_mutation module=repo kind={kind} action={action} state={}",
        state.as_str()
    );
}

/// Repository storing `E` through a [`PersistenceClient`].
pub struct Repository<E> {
    client: PersistenceClient,
    context: Option<ContextKind>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: MappingContract> Repository<E> {
    /// Repository resolving its context per call from the calling thread.
    pub fn new(client: &PersistenceClient) -> RepoResult<Self> {
        Self::build(client, None)
    }

    /// Repository pinned to `context` regardless of the calling thread.
    pub fn with_context(client: &PersistenceClient, context: ContextKind) -> RepoResult<Self> {
        Self::build(client, Some(context))
    }

    fn build(client: &PersistenceClient, context: Option<ContextKind>) -> RepoResult<Self> {
        if client.schema().kind(E::KIND).is_none() {
            return Err(StorageFailure::new(
                Operation::Open,
                FailureCause::UnknownKind(E::KIND.to_string()),
            )
            .into());
        }
        Ok(Self {
            client: client.clone(),
            context,
            _entity: PhantomData,
        })
    }

    pub fn context(&self) -> ContextKind {
        self.context.unwrap_or_else(|| self.client.current_context())
    }

    fn mutate<F>(&self, action: &'static str, operation: Operation, work: F) -> RepoResult<()>
    where
        F: FnOnce(&mut Session<'_>) -> StoreResult<()> + Send + 'static,
    {
        log_state(E::KIND, action, MutationState::Enqueued);
        let result = self.client.perform(self.context(), operation, move |session| {
            log_state(E::KIND, action, MutationState::Executing(session.context()));
            work(session)
        });
        match &result {
            Ok(()) => log_state(E::KIND, action, MutationState::Committed),
            Err(failure) => {
                log_state(E::KIND, action, MutationState::Failed);
                warn!(
                    "event=repo_mutation module=repo status=error kind={} action={action} \
                        severity={:?} error={failure}",
                    E::KIND,
                    failure.severity()
                );
            }
        }
        log_state(E::KIND, action, MutationState::Idle);
        result.map_err(RepoError::from)
    }
}

impl<E: MappingContract> BaseRepository for Repository<E> {
    type Entity = E;

    fn save(&self, item: E) -> RepoResult<()> {
        self.mutate("save", Operation::Save, move |session| {
            session.atomically(|session| {
                session.insert_with(E::KIND, |record| item.write_record(record))?;
                session.commit()?;
                Ok(())
            })
        })
    }

    fn save_several(&self, items: Vec<E>) -> RepoResult<()> {
        if items.is_empty() {
            return Ok(());
        }
        self.mutate("save_several", Operation::Save, move |session| {
            session.atomically(|session| {
                for item in &items {
                    session.insert_with(E::KIND, |record| item.write_record(record))?;
                }
                session.commit()?;
                Ok(())
            })
        })
    }

    fn update(&self, block: UpdateBlock) -> RepoResult<()> {
        drop(block);
        warn!(
            "event=repo_update module=repo status=error kind={} reason=not_implemented",
            E::KIND
        );
        Err(RepoError::NotImplemented("update"))
    }

    fn delete(&self, predicate: Predicate) -> RepoResult<()> {
        self.mutate("delete", Operation::Delete, move |session| {
            session.atomically(|session| {
                let request = QueryRequest::new(E::KIND).filter(Some(predicate));
                let matching = session.query(&request)?;
                session.delete(&matching)?;
                session.commit()?;
                Ok(())
            })
        })
    }

    fn delete_all(&self) -> RepoResult<()> {
        self.mutate("delete_all", Operation::DeleteAll, |session| {
            session.delete_all_records().map(|_| ())
        })
    }

    fn fetch(
        &self,
        predicate: Option<Predicate>,
        sort: Option<SortSpec>,
        page: Option<PageSpec>,
    ) -> RepoResult<Vec<E>> {
        let request = QueryRequest::new(E::KIND)
            .filter(predicate)
            .sorted(sort)
            .paged(page);
        let entities = self
            .client
            .perform(self.context(), Operation::Query, move |session| {
                let records = session.query(&request)?;
                Ok(records.iter().map(E::from_record).collect::<Vec<E>>())
            })?;
        Ok(entities)
    }
}
