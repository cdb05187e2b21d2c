//! Filter, sort and paging descriptions for record queries.
//!
//! # Responsibility
//! - Describe predicates independently of the storage engine.
//! - Evaluate predicates in memory with the same results the engine produces.
//!
//! # Invariants
//! - Comparisons involving `Null` never match, also under `Not`.
//! - `PageSpec { limit: 0, .. }` disables paging.

use crate::model::record::PersistedRecord;
use crate::model::value::FieldValue;
use std::cmp::Ordering;
use std::ops::Range;

/// Binary comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub(crate) fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
        }
    }
}

/// Boolean filter over record fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        field: String,
        op: CompareOp,
        value: FieldValue,
    },
    IsNull(String),
    /// Text field starts with the given prefix (case-sensitive).
    StartsWith { field: String, prefix: String },
    /// Text field contains the given fragment (case-sensitive).
    Contains { field: String, fragment: String },
    /// Empty conjunction matches everything.
    And(Vec<Predicate>),
    /// Empty disjunction matches nothing.
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn compare(field: &str, op: CompareOp, value: impl Into<FieldValue>) -> Self {
        Self::Compare {
            field: field.to_string(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: &str, value: impl Into<FieldValue>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    pub fn ne(field: &str, value: impl Into<FieldValue>) -> Self {
        Self::compare(field, CompareOp::Ne, value)
    }

    pub fn lt(field: &str, value: impl Into<FieldValue>) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    pub fn le(field: &str, value: impl Into<FieldValue>) -> Self {
        Self::compare(field, CompareOp::Le, value)
    }

    pub fn gt(field: &str, value: impl Into<FieldValue>) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    pub fn ge(field: &str, value: impl Into<FieldValue>) -> Self {
        Self::compare(field, CompareOp::Ge, value)
    }

    pub fn is_null(field: &str) -> Self {
        Self::IsNull(field.to_string())
    }

    pub fn starts_with(field: &str, prefix: impl Into<String>) -> Self {
        Self::StartsWith {
            field: field.to_string(),
            prefix: prefix.into(),
        }
    }

    pub fn contains(field: &str, fragment: impl Into<String>) -> Self {
        Self::Contains {
            field: field.to_string(),
            fragment: fragment.into(),
        }
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Self::And(mut terms) => {
                terms.push(other);
                Self::And(terms)
            }
            first => Self::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Predicate) -> Self {
        match self {
            Self::Or(mut terms) => {
                terms.push(other);
                Self::Or(terms)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Evaluates the predicate against one record.
    pub fn matches(&self, record: &PersistedRecord) -> bool {
        match self {
            Self::Compare { field, op, value } => record
                .get(field)
                .predicate_cmp(value)
                .is_some_and(|ordering| op.accepts(ordering)),
            Self::IsNull(field) => record.get(field).is_null(),
            Self::StartsWith { field, prefix } => record
                .text(field)
                .is_some_and(|text| text.starts_with(prefix.as_str())),
            Self::Contains { field, fragment } => record
                .text(field)
                .is_some_and(|text| text.contains(fragment.as_str())),
            Self::And(terms) => terms.iter().all(|term| term.matches(record)),
            Self::Or(terms) => terms.iter().any(|term| term.matches(record)),
            Self::Not(inner) => !inner.matches(record),
        }
    }

    /// Visits every field referenced by the predicate and how it is used.
    pub(crate) fn for_each_field<'a>(&'a self, visit: &mut dyn FnMut(&'a str, FieldUse<'a>)) {
        match self {
            Self::Compare { field, value, .. } => visit(field, FieldUse::Compare(value)),
            Self::IsNull(field) => visit(field, FieldUse::NullTest),
            Self::StartsWith { field, .. } | Self::Contains { field, .. } => {
                visit(field, FieldUse::TextMatch)
            }
            Self::And(terms) | Self::Or(terms) => {
                for term in terms {
                    term.for_each_field(visit);
                }
            }
            Self::Not(inner) => inner.for_each_field(visit),
        }
    }
}

/// How a predicate leaf uses a field.
#[derive(Debug, Clone, Copy)]
pub(crate) enum FieldUse<'a> {
    Compare(&'a FieldValue),
    NullTest,
    TextMatch,
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub ascending: bool,
}

/// Ordered list of sort keys; empty means insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec {
    keys: Vec<SortKey>,
}

impl SortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ascending(field: &str) -> Self {
        Self::new().then(field, true)
    }

    pub fn descending(field: &str) -> Self {
        Self::new().then(field, false)
    }

    /// Appends a lower-priority key.
    pub fn then(mut self, field: &str, ascending: bool) -> Self {
        self.keys.push(SortKey {
            field: field.to_string(),
            ascending,
        });
        self
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Compares two records by the keys, engine order per key.
    pub fn compare(&self, left: &PersistedRecord, right: &PersistedRecord) -> Ordering {
        for key in &self.keys {
            let ordering = left.get(&key.field).sort_cmp(right.get(&key.field));
            let ordering = if key.ascending {
                ordering
            } else {
                ordering.reverse()
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

impl From<Vec<(String, bool)>> for SortSpec {
    fn from(pairs: Vec<(String, bool)>) -> Self {
        Self {
            keys: pairs
                .into_iter()
                .map(|(field, ascending)| SortKey { field, ascending })
                .collect(),
        }
    }
}

/// Limit/offset paging request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageSpec {
    pub limit: usize,
    pub offset: usize,
}

impl PageSpec {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }

    /// `limit == 0` means the full result.
    pub fn is_paging(&self) -> bool {
        self.limit > 0
    }

    /// Index range selected from `len` ordered results.
    ///
    /// Starts at `min(offset, len)` and spans `min(limit, len - start)`.
    pub fn window(&self, len: usize) -> Range<usize> {
        if !self.is_paging() {
            return 0..len;
        }
        let start = self.offset.min(len);
        let end = start + self.limit.min(len - start);
        start..end
    }
}

/// Full description of one record query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub kind: String,
    pub predicate: Option<Predicate>,
    pub sort: SortSpec,
    pub page: Option<PageSpec>,
    /// Hydration batch size; `None` uses the store default.
    pub batch_hint: Option<usize>,
}

impl QueryRequest {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            predicate: None,
            sort: SortSpec::default(),
            page: None,
            batch_hint: None,
        }
    }

    pub fn filter(mut self, predicate: Option<Predicate>) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn sorted(mut self, sort: Option<SortSpec>) -> Self {
        self.sort = sort.unwrap_or_default();
        self
    }

    /// Pages that do not page (`limit == 0`) are dropped.
    pub fn paged(mut self, page: Option<PageSpec>) -> Self {
        self.page = page.filter(PageSpec::is_paging);
        self
    }

    pub fn batch_hint(mut self, hint: usize) -> Self {
        self.batch_hint = Some(hint);
        self
    }
}
