//! Append-only log of transitions and the feedback given on them.

use crate::error::ConductorError;
use anyhow::{Context, Result};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one recorded transition. Returned by
/// [`append`] and required to give feedback on that transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransitionHandle(pub i64);

impl fmt::Display for TransitionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub handle: TransitionHandle,
    pub played_at: String,
    pub from_track_id: Option<i64>,
    pub to_track_id: i64,
    pub explicit_choice: bool,
    pub user_score: i64,
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<HistoryRecord> {
    Ok(HistoryRecord {
        handle: TransitionHandle(row.get(0)?),
        played_at: row.get(1)?,
        from_track_id: row.get(2)?,
        to_track_id: row.get(3)?,
        explicit_choice: row.get(4)?,
        user_score: row.get(5)?,
    })
}

const SELECT_RECORD: &str =
    "SELECT id, played_at, from_track_id, to_track_id, explicit_choice, user_score FROM history";

/// Append a transition.
pub fn append(
    conn: &mut Connection,
    from_track_id: Option<i64>,
    to_track_id: i64,
    explicit_choice: bool,
) -> Result<TransitionHandle> {
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO history (from_track_id, to_track_id, explicit_choice) VALUES (?1, ?2, ?3)",
        params![from_track_id, to_track_id, explicit_choice],
    )
    .context("Failed to append history record")?;
    let handle = TransitionHandle(tx.last_insert_rowid());
    tx.commit().context("Commiting SQL transaction failed.")?;
    debug!("History {handle}: {from_track_id:?} -> {to_track_id} (explicit: {explicit_choice})");
    Ok(handle)
}

/// Store `user_score` on the record, replacing any earlier feedback.
///
/// # Errors
///
/// [`ConductorError::UnknownTransition`] if the handle is not in the log.
pub fn set_user_score(conn: &mut Connection, handle: TransitionHandle, user_score: i64) -> Result<HistoryRecord> {
    let tx = conn.transaction()?;
    let record = tx
        .query_row(
            "UPDATE history SET user_score = ?2 WHERE id = ?1
             RETURNING id, played_at, from_track_id, to_track_id, explicit_choice, user_score",
            params![handle.0, user_score],
            record_from_row,
        )
        .optional()
        .with_context(|| format!("Failed to store feedback on transition {handle}"))?
        .ok_or(ConductorError::UnknownTransition(handle.0))?;
    tx.commit().context("Commiting SQL transaction failed.")?;
    Ok(record)
}

pub fn get(conn: &Connection, handle: TransitionHandle) -> Result<Option<HistoryRecord>> {
    conn.query_row(&format!("{SELECT_RECORD} WHERE id = ?1"), [handle.0], record_from_row)
        .optional()
        .with_context(|| format!("Failed to load transition {handle}"))
}

/// The `limit` newest records, newest first.
pub fn recent(conn: &Connection, limit: usize) -> Result<Vec<HistoryRecord>> {
    let mut stmt = conn
        .prepare(&format!("{SELECT_RECORD} ORDER BY id DESC LIMIT ?1"))
        .context("Invalid SQL statement when selecting history")?;
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let records = stmt
        .query_map([limit], record_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Cannot query history.")?;
    Ok(records)
}

pub fn count(conn: &Connection) -> Result<u64> {
    conn.query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))
        .context("Could not count history records.")
}
