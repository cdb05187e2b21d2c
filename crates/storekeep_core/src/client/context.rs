//! Execution contexts and their staged changes.
//!
//! # Invariants
//! - Within one context a record id is either staged for insert or staged
//!   for delete, never both.
//! - Staged changes become durable only through a commit.

use crate::model::record::{PersistedRecord, RecordId};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

/// Confinement boundary for staged record changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    /// Context of the thread that opened the store.
    Primary,
    /// Child of `Primary`; commits are pushed up into the primary.
    Background,
}

impl ContextKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Background => "background",
        }
    }
}

impl Display for ContextKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Staged inserts and deletes of one kind.
#[derive(Debug, Default)]
pub(crate) struct KindChanges {
    pub(crate) inserted: Vec<PersistedRecord>,
    pub(crate) deleted: BTreeSet<RecordId>,
}

impl KindChanges {
    pub(crate) fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.deleted.is_empty()
    }

    pub(crate) fn is_inserted(&self, id: RecordId) -> bool {
        self.inserted.iter().any(|record| record.id() == id)
    }

    fn stage_insert(&mut self, record: PersistedRecord) {
        self.deleted.remove(&record.id());
        if !self.is_inserted(record.id()) {
            self.inserted.push(record);
        }
    }

    fn stage_delete(&mut self, id: RecordId) {
        self.inserted.retain(|record| record.id() != id);
        self.deleted.insert(id);
    }

    /// Applies `child` on top of these changes.
    fn absorb(&mut self, child: &KindChanges) {
        for id in &child.deleted {
            self.stage_delete(*id);
        }
        for record in &child.inserted {
            self.stage_insert(record.snapshot());
        }
    }

    fn snapshot(&self) -> Self {
        Self {
            inserted: self.inserted.iter().map(PersistedRecord::snapshot).collect(),
            deleted: self.deleted.clone(),
        }
    }
}

/// All staged changes of one context, keyed by kind.
#[derive(Debug, Default)]
pub(crate) struct PendingChanges {
    kinds: BTreeMap<String, KindChanges>,
}

impl PendingChanges {
    pub(crate) fn is_empty(&self) -> bool {
        self.kinds.values().all(KindChanges::is_empty)
    }

    pub(crate) fn kind(&self, kind: &str) -> Option<&KindChanges> {
        self.kinds.get(kind)
    }

    pub(crate) fn kinds(&self) -> impl Iterator<Item = (&str, &KindChanges)> {
        self.kinds
            .iter()
            .filter(|(_, changes)| !changes.is_empty())
            .map(|(kind, changes)| (kind.as_str(), changes))
    }

    pub(crate) fn stage_insert(&mut self, record: PersistedRecord) {
        self.kinds
            .entry(record.kind().to_string())
            .or_default()
            .stage_insert(record);
    }

    pub(crate) fn stage_delete(&mut self, kind: &str, id: RecordId) {
        self.kinds.entry(kind.to_string()).or_default().stage_delete(id);
    }

    pub(crate) fn absorb(&mut self, child: &PendingChanges) {
        for (kind, changes) in &child.kinds {
            self.kinds.entry(kind.clone()).or_default().absorb(changes);
        }
    }

    pub(crate) fn snapshot(&self) -> Self {
        Self {
            kinds: self
                .kinds
                .iter()
                .map(|(kind, changes)| (kind.clone(), changes.snapshot()))
                .collect(),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.kinds.clear();
    }

    /// Number of staged inserts and deletes.
    pub(crate) fn counts(&self) -> (usize, usize) {
        self.kinds.values().fold((0, 0), |(inserted, deleted), changes| {
            (
                inserted + changes.inserted.len(),
                deleted + changes.deleted.len(),
            )
        })
    }
}

/// Effective changes of one kind as seen from a context, parent first.
pub(crate) fn layered_view(layers: &[&PendingChanges], kind: &str) -> KindChanges {
    let mut view = KindChanges::default();
    for layer in layers {
        if let Some(changes) = layer.kind(kind) {
            view.absorb(changes);
        }
    }
    view
}
