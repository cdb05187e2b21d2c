//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure connection pragmas required by the store.
//! - Ensure schema tables before returning a usable connection.
//!
//! # Invariants
//! - Returned connections have every schema kind's table in place.

use super::schema::{ensure_schema, Schema};
use super::DbResult;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

/// Opens a SQLite database file and ensures the schema tables exist.
///
/// # Side effects
/// - Creates the file when missing.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(
    path: impl AsRef<Path>,
    schema: &Schema,
    busy_timeout: Duration,
) -> DbResult<Connection> {
    let path = path.as_ref();
    open_with("file", schema, busy_timeout, || Connection::open(path))
}

/// Opens a private in-memory database and ensures the schema tables exist.
pub fn open_db_in_memory(schema: &Schema, busy_timeout: Duration) -> DbResult<Connection> {
    open_with("memory", schema, busy_timeout, Connection::open_in_memory)
}

fn open_with(
    mode: &str,
    schema: &Schema,
    busy_timeout: Duration,
    connect: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let result = connect()
        .map_err(Into::into)
        .and_then(|mut conn| bootstrap_connection(&mut conn, schema, busy_timeout).map(|()| conn));

    match &result {
        Ok(_) => info!(
            "event=db_open module=db status=ok mode={mode} kinds={} duration_ms={}",
            schema.kinds().len(),
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=db_open module=db status=error mode={mode} duration_ms={} error={}",
            started_at.elapsed().as_millis(),
            err
        ),
    }
    result
}

fn bootstrap_connection(
    conn: &mut Connection,
    schema: &Schema,
    busy_timeout: Duration,
) -> DbResult<()> {
    conn.busy_timeout(busy_timeout)?;
    ensure_schema(conn, schema)?;
    Ok(())
}
