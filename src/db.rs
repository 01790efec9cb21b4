//! SQLite connection handling and schema setup.
//!
//! Everything the engine persists lives in one database file: the catalog
//! (`artist`, `album`, `genre`, `track`), the chain registry (`chain`), a single
//! generic `edge` table shared by all chains, and the `history` log.

use anyhow::{Context, Result};
use log::{debug, trace};
use rusqlite::Connection;
use std::fs;
use std::path::Path;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS artist (
        id      INTEGER PRIMARY KEY AUTOINCREMENT,
        name    TEXT    NOT NULL UNIQUE
    );
    CREATE TABLE IF NOT EXISTS album (
        id      INTEGER PRIMARY KEY AUTOINCREMENT,
        name    TEXT    NOT NULL
    );
    CREATE TABLE IF NOT EXISTS genre (
        id      INTEGER PRIMARY KEY AUTOINCREMENT,
        name    TEXT    NOT NULL
    );
    CREATE TABLE IF NOT EXISTS track (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        name            TEXT    NOT NULL,
        album_id        INTEGER NOT NULL REFERENCES album(id),
        artist_id       INTEGER NOT NULL REFERENCES artist(id),
        genre_id        INTEGER REFERENCES genre(id),
        play_count      INTEGER NOT NULL DEFAULT 0,
        last_played_at  TEXT,
        added_at        TEXT    NOT NULL DEFAULT (datetime('now')),
        UNIQUE(name, album_id, artist_id)
    );
    CREATE INDEX IF NOT EXISTS idx_track_album ON track(album_id);
    CREATE INDEX IF NOT EXISTS idx_track_artist ON track(artist_id);

    CREATE TABLE IF NOT EXISTS chain (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        from_attribute  TEXT    NOT NULL,
        to_attribute    TEXT    NOT NULL,
        UNIQUE(from_attribute, to_attribute)
    );
    CREATE TABLE IF NOT EXISTS edge (
        chain_id    INTEGER NOT NULL REFERENCES chain(id) ON DELETE CASCADE,
        from_value  INTEGER NOT NULL,
        to_value    INTEGER NOT NULL,
        score       INTEGER NOT NULL DEFAULT 0,
        user_score  INTEGER NOT NULL DEFAULT 0,
        UNIQUE(chain_id, from_value, to_value)
    );
    CREATE INDEX IF NOT EXISTS idx_edge_from ON edge(chain_id, from_value);

    CREATE TABLE IF NOT EXISTS history (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        played_at       TEXT    NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
        from_track_id   INTEGER REFERENCES track(id),
        to_track_id     INTEGER NOT NULL REFERENCES track(id),
        explicit_choice INTEGER NOT NULL DEFAULT 0,
        user_score      INTEGER NOT NULL DEFAULT 0
    );
";

/// Open (or create) the database at `path` and make sure the schema exists.
///
/// Parent directories are created as needed.
///
/// # Errors
///
/// Fails if the directory cannot be created, the file cannot be opened, or the
/// schema statements are rejected.
pub fn open(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory {}", parent.display())
            })?;
        }
    }

    let conn = Connection::open(path)
        .with_context(|| format!("Database connection refused. DB location: {}", path.display()))?;
    init_schema(&conn)?;
    debug!("Opened database at {}", path.display());
    Ok(conn)
}

/// In-memory database with the full schema. Used by tests and benchmarks.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Apply connection pragmas and create every table that does not exist yet.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )
    .context("Failed to apply connection pragmas")?;
    conn.execute_batch(SCHEMA)
        .context("Invalid SQL command when creating schema")?;
    trace!("Schema ready");
    Ok(())
}

/// Compact the database file. Run once when the engine shuts down.
pub fn vacuum(conn: &Connection) -> Result<()> {
    conn.execute_batch("VACUUM").context("Failed to vacuum database")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<Vec<String>>>()
            .unwrap()
    }

    #[test]
    fn test_schema_creates_all_tables() {
        let conn = open_in_memory().unwrap();
        let names = table_names(&conn);
        for expected in ["album", "artist", "chain", "edge", "genre", "history", "track"] {
            assert!(names.iter().any(|n| n == expected), "missing table {expected}");
        }
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/conductor.db");
        let conn = open(&path).unwrap();
        drop(conn);
        assert!(path.exists());
    }

    #[test]
    fn test_vacuum_runs() {
        let conn = open_in_memory().unwrap();
        vacuum(&conn).unwrap();
    }
}
