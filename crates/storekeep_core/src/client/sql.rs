//! SQL rendering and row hydration for entity tables.
//!
//! # Invariants
//! - Only schema-validated identifiers are spliced into SQL; values are
//!   always bound parameters.
//! - Predicate leaves render two-valued (`COALESCE(.., 0)`) so `NOT` agrees
//!   with in-memory evaluation.

use crate::client::context::PendingChanges;
use crate::db::schema::{quoted, EntityKind, RECORD_ID_COLUMN};
use crate::db::{DbError, DbResult};
use crate::model::query::{PageSpec, Predicate, SortSpec};
use crate::model::record::{PersistedRecord, RecordId};
use crate::model::value::FieldValue;
use log::trace;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Transaction};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Renders a predicate into a WHERE fragment, pushing bound values.
pub(crate) fn render_predicate(predicate: &Predicate, binds: &mut Vec<Value>) -> String {
    match predicate {
        Predicate::Compare { field, op, value } => {
            binds.push(value.to_sql_value());
            format!("COALESCE({} {} ?, 0)", quoted(field), op.sql())
        }
        Predicate::IsNull(field) => format!("({} IS NULL)", quoted(field)),
        Predicate::StartsWith { field, prefix } => {
            binds.push(Value::Text(prefix.clone()));
            binds.push(Value::Text(prefix.clone()));
            format!(
                "COALESCE(substr({0}, 1, length(?)) = ?, 0)",
                quoted(field)
            )
        }
        Predicate::Contains { field, fragment } => {
            binds.push(Value::Text(fragment.clone()));
            format!("COALESCE(instr({}, ?) > 0, 0)", quoted(field))
        }
        Predicate::And(terms) => render_terms(terms, " AND ", "1", binds),
        Predicate::Or(terms) => render_terms(terms, " OR ", "0", binds),
        Predicate::Not(inner) => format!("(NOT {})", render_predicate(inner, binds)),
    }
}

fn render_terms(terms: &[Predicate], joiner: &str, empty: &str, binds: &mut Vec<Value>) -> String {
    if terms.is_empty() {
        return empty.to_string();
    }
    let rendered: Vec<String> = terms
        .iter()
        .map(|term| render_predicate(term, binds))
        .collect();
    format!("({})", rendered.join(joiner))
}

fn render_order_by(sort: &SortSpec) -> String {
    let mut clauses: Vec<String> = sort
        .keys()
        .iter()
        .map(|key| {
            format!(
                "{} {}",
                quoted(&key.field),
                if key.ascending { "ASC" } else { "DESC" }
            )
        })
        .collect();
    // rowid keeps ties (and unsorted queries) in insertion order.
    clauses.push("rowid ASC".to_string());
    format!(" ORDER BY {}", clauses.join(", "))
}

fn column_list(kind: &EntityKind) -> String {
    std::iter::once(RECORD_ID_COLUMN.to_string())
        .chain(kind.fields.iter().map(|field| quoted(&field.name)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Loads matching durable rows in engine order.
///
/// Rows are hydrated `batch_hint` at a time; the hint never changes which
/// rows are returned.
pub(crate) fn select_records(
    conn: &Connection,
    kind: &EntityKind,
    predicate: Option<&Predicate>,
    sort: &SortSpec,
    page: Option<PageSpec>,
    batch_hint: usize,
) -> DbResult<Vec<PersistedRecord>> {
    let mut binds = Vec::new();
    let mut sql = format!("SELECT {} FROM {}", column_list(kind), quoted(&kind.name));
    if let Some(predicate) = predicate {
        sql.push_str(" WHERE ");
        sql.push_str(&render_predicate(predicate, &mut binds));
    }
    sql.push_str(&render_order_by(sort));
    if let Some(page) = page {
        sql.push_str(" LIMIT ? OFFSET ?");
        binds.push(Value::Integer(i64::try_from(page.limit).unwrap_or(i64::MAX)));
        binds.push(Value::Integer(i64::try_from(page.offset).unwrap_or(i64::MAX)));
    }

    let mut stmt = conn.prepare_cached(&sql)?;
    let mut rows = stmt.query(params_from_iter(binds))?;
    let batch_hint = batch_hint.max(1);
    let mut records = Vec::new();
    let mut batch = Vec::with_capacity(batch_hint);
    while let Some(row) = rows.next()? {
        let id = parse_record_id(kind, &row.get::<_, String>(0)?)?;
        let mut fields = BTreeMap::new();
        for (index, field) in kind.fields.iter().enumerate() {
            let value = FieldValue::from_column(row.get_ref(index + 1)?, field.field_type)
                .map_err(|message| {
                    DbError::InvalidRow(format!("{}.{}: {message}", kind.name, field.name))
                })?;
            if !value.is_null() {
                fields.insert(field.name.clone(), value);
            }
        }
        batch.push(PersistedRecord::with_fields(id, &kind.name, fields));
        if batch.len() == batch_hint {
            trace!(
                "event=store_hydrate module=client kind={} batch={}",
                kind.name,
                batch.len()
            );
            records.append(&mut batch);
        }
    }
    records.append(&mut batch);
    Ok(records)
}

/// Loads every record id of a kind without hydrating fields.
pub(crate) fn select_ids(conn: &Connection, kind: &EntityKind) -> DbResult<Vec<RecordId>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {RECORD_ID_COLUMN} FROM {} ORDER BY rowid ASC",
        quoted(&kind.name)
    ))?;
    let mut rows = stmt.query([])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        ids.push(parse_record_id(kind, &row.get::<_, String>(0)?)?);
    }
    Ok(ids)
}

fn parse_record_id(kind: &EntityKind, text: &str) -> DbResult<RecordId> {
    Uuid::parse_str(text).map_err(|_| {
        DbError::InvalidRow(format!(
            "invalid {RECORD_ID_COLUMN} `{text}` in `{}`",
            kind.name
        ))
    })
}

pub(crate) fn record_exists(conn: &Connection, kind: &EntityKind, id: RecordId) -> DbResult<bool> {
    let exists: i64 = conn.query_row(
        &format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE {RECORD_ID_COLUMN} = ?1);",
            quoted(&kind.name)
        ),
        [id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

/// Writes staged changes inside `tx`; returns rows inserted and deleted.
pub(crate) fn write_changes(
    tx: &Transaction<'_>,
    kinds: &[EntityKind],
    pending: &PendingChanges,
) -> DbResult<(usize, usize)> {
    let mut inserted = 0;
    let mut deleted = 0;
    for (kind_name, changes) in pending.kinds() {
        let Some(kind) = kinds.iter().find(|kind| kind.name == kind_name) else {
            continue;
        };
        let table = quoted(&kind.name);

        for id in &changes.deleted {
            deleted += tx.execute(
                &format!("DELETE FROM {table} WHERE {RECORD_ID_COLUMN} = ?1;"),
                [id.to_string()],
            )?;
        }

        let placeholders = vec!["?"; kind.fields.len() + 1].join(", ");
        let insert_sql = format!(
            "INSERT OR IGNORE INTO {table} ({}) VALUES ({placeholders});",
            column_list(kind)
        );
        let mut stmt = tx.prepare_cached(&insert_sql)?;
        for record in &changes.inserted {
            let values = std::iter::once(Value::Text(record.id().to_string())).chain(
                kind.fields
                    .iter()
                    .map(|field| record.get(&field.name).to_sql_value()),
            );
            inserted += stmt.execute(params_from_iter(values))?;
        }
    }
    Ok((inserted, deleted))
}
