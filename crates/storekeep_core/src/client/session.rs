//! Executor-side store state and the session handed to submitted work.
//!
//! # Responsibility
//! - Own the SQLite connection and both contexts' staged changes.
//! - Stage inserts/deletes, run overlaid queries and commit atomically.
//!
//! # Invariants
//! - Lives only on the executor thread; sessions never outlive one job.
//! - A failed commit leaves both contexts exactly as they were before it.

use crate::client::context::{layered_view, ContextKind, KindChanges, PendingChanges};
use crate::client::failure::{failed, FailureCause, Operation, StorageFailure, StoreResult};
use crate::client::sql::{record_exists, select_ids, select_records, write_changes};
use crate::config::{StoreConfig, StoreLocation};
use crate::db::schema::{EntityKind, FieldType, Schema};
use crate::db::{open_db, open_db_in_memory, DbResult};
use crate::model::query::{FieldUse, QueryRequest};
use crate::model::record::{PersistedRecord, RecordId};
use log::{debug, info, warn};
use rusqlite::{Connection, TransactionBehavior};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Result of a commit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The context had nothing staged; no transaction was opened.
    NoChanges,
    Committed { inserted: usize, deleted: usize },
}

pub(crate) struct StoreState {
    conn: Connection,
    schema: Schema,
    fetch_batch_hint: usize,
    primary: PendingChanges,
    background: PendingChanges,
    commits: Arc<AtomicU64>,
}

impl StoreState {
    pub(crate) fn open(config: &StoreConfig, commits: Arc<AtomicU64>) -> StoreResult<Self> {
        let conn = match &config.location {
            StoreLocation::Memory => open_db_in_memory(&config.schema, config.busy_timeout()),
            StoreLocation::File(path) => open_db(path, &config.schema, config.busy_timeout()),
        }
        .map_err(failed(Operation::Open))?;

        Ok(Self {
            conn,
            schema: config.schema.clone(),
            fetch_batch_hint: config.fetch_batch_hint,
            primary: PendingChanges::default(),
            background: PendingChanges::default(),
            commits,
        })
    }

    fn pending(&self, context: ContextKind) -> &PendingChanges {
        match context {
            ContextKind::Primary => &self.primary,
            ContextKind::Background => &self.background,
        }
    }

    fn pending_mut(&mut self, context: ContextKind) -> &mut PendingChanges {
        match context {
            ContextKind::Primary => &mut self.primary,
            ContextKind::Background => &mut self.background,
        }
    }

    /// Changes of `kind` visible from `context`, parent layer first.
    fn view(&self, context: ContextKind, kind: &str) -> KindChanges {
        match context {
            ContextKind::Primary => layered_view(&[&self.primary], kind),
            ContextKind::Background => layered_view(&[&self.primary, &self.background], kind),
        }
    }
}

/// Access to one execution context for the duration of a job.
///
/// Only obtainable inside [`PersistenceClient::perform`]; records produced
/// here cannot leave the executor.
///
/// [`PersistenceClient::perform`]: crate::client::PersistenceClient::perform
pub struct Session<'s> {
    state: &'s mut StoreState,
    context: ContextKind,
}

impl<'s> Session<'s> {
    pub(crate) fn new(state: &'s mut StoreState, context: ContextKind) -> Self {
        Self { state, context }
    }

    pub fn context(&self) -> ContextKind {
        self.context
    }

    pub fn schema(&self) -> &Schema {
        &self.state.schema
    }

    /// Whether this context has staged, uncommitted changes.
    pub fn has_changes(&self) -> bool {
        !self.state.pending(self.context).is_empty()
    }

    fn entity_kind(&self, name: &str, operation: Operation) -> StoreResult<EntityKind> {
        self.state
            .schema
            .kind(name)
            .cloned()
            .ok_or_else(|| StorageFailure::new(operation, FailureCause::UnknownKind(name.into())))
    }

    /// Creates a record of `kind` in this context and stages it for insert.
    ///
    /// Records already visible from this context are not staged again, so
    /// re-saving stored contents leaves nothing to commit.
    pub fn insert_with(
        &mut self,
        kind: &str,
        fill: impl FnOnce(&mut PersistedRecord),
    ) -> StoreResult<RecordId> {
        let entity_kind = self.entity_kind(kind, Operation::Save)?;
        let mut record = PersistedRecord::blank(kind);
        fill(&mut record);
        conform_record(&entity_kind, &mut record)?;
        record.seal();

        let id = record.id();
        if self
            .is_visible(&entity_kind, id)
            .map_err(failed(Operation::Save))?
        {
            debug!(
                "event=store_stage module=client status=skip kind={kind} context={} \
                    reason=already_stored",
                self.context
            );
            return Ok(id);
        }
        self.state.pending_mut(self.context).stage_insert(record);
        Ok(id)
    }

    fn is_visible(&self, kind: &EntityKind, id: RecordId) -> DbResult<bool> {
        let view = self.state.view(self.context, &kind.name);
        if view.is_inserted(id) {
            return Ok(true);
        }
        if view.deleted.contains(&id) {
            return Ok(false);
        }
        record_exists(&self.state.conn, kind, id)
    }

    /// Returns matching records as seen from this context, in request order.
    ///
    /// The page window is pushed into the engine when nothing of the kind is
    /// staged; otherwise it is sliced from the overlaid result.
    pub fn query(&self, request: &QueryRequest) -> StoreResult<Vec<PersistedRecord>> {
        let kind = self.entity_kind(&request.kind, Operation::Query)?;
        validate_query(&kind, request)?;

        let batch_hint = request.batch_hint.unwrap_or(self.state.fetch_batch_hint);
        let predicate = request.predicate.as_ref();
        let view = self.state.view(self.context, &kind.name);
        if view.is_empty() {
            return select_records(
                &self.state.conn,
                &kind,
                predicate,
                &request.sort,
                request.page,
                batch_hint,
            )
            .map_err(failed(Operation::Query));
        }

        let mut records = select_records(
            &self.state.conn,
            &kind,
            predicate,
            &request.sort,
            None,
            batch_hint,
        )
        .map_err(failed(Operation::Query))?;
        records.retain(|record| !view.deleted.contains(&record.id()));

        let durable: HashSet<RecordId> = records.iter().map(PersistedRecord::id).collect();
        let before_overlay = records.len();
        records.extend(
            view.inserted
                .iter()
                .filter(|staged| !durable.contains(&staged.id()))
                .filter(|staged| predicate.map_or(true, |predicate| predicate.matches(staged)))
                .map(PersistedRecord::snapshot),
        );
        if records.len() > before_overlay && !request.sort.is_empty() {
            // Stable: durable rows keep their engine order among ties.
            records.sort_by(|left, right| request.sort.compare(left, right));
        }

        if let Some(page) = request.page {
            let window = page.window(records.len());
            records = records.drain(window).collect();
        }
        Ok(records)
    }

    /// Stages `records` for removal; durable after the next commit.
    pub fn delete(&mut self, records: &[PersistedRecord]) -> StoreResult<usize> {
        for record in records {
            self.entity_kind(record.kind(), Operation::Delete)?;
            self.state
                .pending_mut(self.context)
                .stage_delete(record.kind(), record.id());
        }
        Ok(records.len())
    }

    /// Deletes every record of every schema kind, committing kind by kind.
    ///
    /// Only identifiers are loaded. A failure on a later kind leaves earlier
    /// kinds' deletions durable; the failing kind's deletions are unstaged.
    pub fn delete_all_records(&mut self) -> StoreResult<usize> {
        self.atomically(|session| session.delete_each_kind())
    }

    fn delete_each_kind(&mut self) -> StoreResult<usize> {
        let kinds = self.state.schema.kinds().to_vec();
        let mut removed = 0;
        for kind in &kinds {
            let view = self.state.view(self.context, &kind.name);
            let mut ids =
                select_ids(&self.state.conn, kind).map_err(failed(Operation::DeleteAll))?;
            ids.retain(|id| !view.deleted.contains(id));
            let durable: HashSet<RecordId> = ids.iter().copied().collect();
            ids.extend(
                view.inserted
                    .iter()
                    .map(PersistedRecord::id)
                    .filter(|id| !durable.contains(id)),
            );

            let pending = self.state.pending_mut(self.context);
            for id in &ids {
                pending.stage_delete(&kind.name, *id);
            }
            removed += ids.len();
            self.commit()
                .map_err(|failure| failure.during(Operation::DeleteAll))?;
        }
        Ok(removed)
    }

    /// Drops this context's staged changes.
    pub fn discard(&mut self) {
        self.state.pending_mut(self.context).clear();
    }

    /// Makes this context's staged changes durable.
    ///
    /// A background commit pushes its changes into the primary context and
    /// commits the primary; on failure both are restored.
    pub fn commit(&mut self) -> StoreResult<CommitOutcome> {
        if !self.has_changes() {
            return Ok(CommitOutcome::NoChanges);
        }

        let started_at = Instant::now();
        let saved_primary = match self.context {
            ContextKind::Primary => None,
            ContextKind::Background => {
                let saved = self.state.primary.snapshot();
                self.state.primary.absorb(&self.state.background);
                Some(saved)
            }
        };

        let state = &mut *self.state;
        let (staged_inserts, staged_deletes) = state.primary.counts();
        debug!(
            "event=store_commit module=client status=start context={} \
                staged_inserts={staged_inserts} staged_deletes={staged_deletes}",
            self.context
        );
        match write_pending(&mut state.conn, state.schema.kinds(), &state.primary) {
            Ok((inserted, deleted)) => {
                state.primary.clear();
                if self.context == ContextKind::Background {
                    state.background.clear();
                }
                state.commits.fetch_add(1, Ordering::SeqCst);
                info!(
                    "event=store_commit module=client status=ok context={} inserted={inserted} \
                        deleted={deleted} duration_ms={}",
                    self.context,
                    started_at.elapsed().as_millis()
                );
                Ok(CommitOutcome::Committed { inserted, deleted })
            }
            Err(err) => {
                if let Some(saved) = saved_primary {
                    state.primary = saved;
                }
                warn!(
                    "event=store_commit module=client status=error context={} duration_ms={} \
                        error={}",
                    self.context,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(StorageFailure::new(Operation::Commit, err))
            }
        }
    }

    /// Runs `work`, restoring staged state if it fails.
    ///
    /// When `work` committed before failing, only the leftovers staged after
    /// that commit are dropped.
    pub fn atomically<R>(
        &mut self,
        work: impl FnOnce(&mut Session<'_>) -> StoreResult<R>,
    ) -> StoreResult<R> {
        let commits_before = self.state.commits.load(Ordering::SeqCst);
        let checkpoint = (self.state.primary.snapshot(), self.state.background.snapshot());

        let result = work(self);
        if result.is_err() {
            if self.state.commits.load(Ordering::SeqCst) == commits_before {
                self.state.primary = checkpoint.0;
                self.state.background = checkpoint.1;
            } else {
                self.discard();
            }
        }
        result
    }
}

fn write_pending(
    conn: &mut Connection,
    kinds: &[EntityKind],
    pending: &PendingChanges,
) -> DbResult<(usize, usize)> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let counts = write_changes(&tx, kinds, pending)?;
    tx.commit()?;
    Ok(counts)
}

/// Rejects undeclared fields and converts values to their column's shape,
/// so staged and committed reads of a record agree.
fn conform_record(kind: &EntityKind, record: &mut PersistedRecord) -> StoreResult<()> {
    let mut conformed = BTreeMap::new();
    for (name, value) in record.fields() {
        let Some(spec) = kind.field_spec(name) else {
            return Err(StorageFailure::new(
                Operation::Save,
                FailureCause::UnknownField {
                    kind: kind.name.clone(),
                    field: name.to_string(),
                },
            ));
        };
        let Some(value) = value.clone().coerce(spec.field_type) else {
            return Err(StorageFailure::new(
                Operation::Save,
                FailureCause::FieldTypeMismatch {
                    kind: kind.name.clone(),
                    field: name.to_string(),
                    expected: spec.field_type,
                },
            ));
        };
        conformed.insert(name.to_string(), value);
    }
    record.replace_fields(conformed);
    Ok(())
}

fn validate_query(kind: &EntityKind, request: &QueryRequest) -> StoreResult<()> {
    let mut problem: Option<FailureCause> = None;
    let mut check = |field: &str, usage: FieldUse<'_>| {
        if problem.is_some() {
            return;
        }
        let Some(spec) = kind.field_spec(field) else {
            problem = Some(FailureCause::UnknownField {
                kind: kind.name.clone(),
                field: field.to_string(),
            });
            return;
        };
        let fits = match usage {
            FieldUse::Compare(value) => value.fits(spec.field_type),
            FieldUse::NullTest => true,
            FieldUse::TextMatch => spec.field_type == FieldType::Text,
        };
        if !fits {
            problem = Some(FailureCause::FieldTypeMismatch {
                kind: kind.name.clone(),
                field: field.to_string(),
                expected: spec.field_type,
            });
        }
    };

    if let Some(predicate) = &request.predicate {
        predicate.for_each_field(&mut check);
    }
    for key in request.sort.keys() {
        check(&key.field, FieldUse::NullTest);
    }

    match problem {
        Some(cause) => Err(StorageFailure::new(Operation::Query, cause)),
        None => Ok(()),
    }
}
