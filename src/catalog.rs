//! Catalog lookups: artists, albums, genres and tracks.
//!
//! Every entity is identified by its natural key and created lazily the first
//! time it is looked up with creation allowed. Nothing is ever deleted.
//! A lookup that finds nothing with creation disallowed returns `Ok(None)`.

use crate::error::ConductorError;
use anyhow::{anyhow, Context, Result};
use log::{debug, trace};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The named catalog entities that share the `(id, name)` shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Artist,
    Album,
    Genre,
}

impl EntityKind {
    const fn select_sql(self) -> &'static str {
        match self {
            Self::Artist => "SELECT id FROM artist WHERE name = ?1",
            Self::Album => "SELECT id FROM album WHERE name = ?1 ORDER BY id LIMIT 1",
            Self::Genre => "SELECT id FROM genre WHERE name = ?1 ORDER BY id LIMIT 1",
        }
    }

    const fn insert_sql(self) -> &'static str {
        match self {
            Self::Artist => "INSERT INTO artist (name) VALUES (?1)",
            Self::Album => "INSERT INTO album (name) VALUES (?1)",
            Self::Genre => "INSERT INTO genre (name) VALUES (?1)",
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Artist => "artist",
            Self::Album => "album",
            Self::Genre => "genre",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A catalog row with an id and a name: an artist, album or genre.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub kind: EntityKind,
    pub id: i64,
    pub name: String,
}

/// A fully resolved track with its album, artist and optional genre.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: i64,
    pub name: String,
    pub album: Entity,
    pub artist: Entity,
    pub genre: Option<Entity>,
    pub play_count: u32,
    pub last_played_at: Option<String>,
    pub added_at: String,
}

impl Track {
    #[must_use]
    pub fn keys(&self) -> TrackKeys {
        TrackKeys {
            track_id: self.id,
            album_id: self.album.id,
            artist_id: self.artist.id,
            genre_id: self.genre.as_ref().map(|g| g.id),
        }
    }

    #[must_use]
    pub fn descriptor(&self) -> TrackDescriptor {
        TrackDescriptor {
            title: self.name.clone(),
            album: self.album.name.clone(),
            artist: self.artist.name.clone(),
            genre: self.genre.as_ref().map(|g| g.name.clone()),
        }
    }
}

/// Just the ids of a track. This is all the chains need to map a track onto
/// attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackKeys {
    pub track_id: i64,
    pub album_id: i64,
    pub artist_id: i64,
    pub genre_id: Option<i64>,
}

/// How the player names a track: plain metadata strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackDescriptor {
    pub title: String,
    pub album: String,
    pub artist: String,
    #[serde(default)]
    pub genre: Option<String>,
}

impl TrackDescriptor {
    pub fn new(title: &str, album: &str, artist: &str, genre: Option<&str>) -> Self {
        Self {
            title: title.to_string(),
            album: album.to_string(),
            artist: artist.to_string(),
            genre: genre.map(str::to_string),
        }
    }
}

impl fmt::Display for TrackDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} ({})", self.artist, self.title, self.album)?;
        if let Some(genre) = &self.genre {
            write!(f, " [{genre}]")?;
        }
        Ok(())
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

fn select_entity_id(conn: &Connection, kind: EntityKind, name: &str) -> Result<Option<i64>> {
    conn.query_row(kind.select_sql(), [name], |row| row.get(0))
        .optional()
        .with_context(|| format!("Failed to look up {kind} '{name}'"))
}

/// Select, and if allowed insert then re-select. A constraint violation on
/// insert means someone else created the row first; the re-select picks it up.
fn get_or_create_in(
    conn: &Connection,
    kind: EntityKind,
    name: &str,
    allow_create: bool,
) -> Result<Option<i64>> {
    if let Some(id) = select_entity_id(conn, kind, name)? {
        return Ok(Some(id));
    }
    if !allow_create {
        return Ok(None);
    }

    match conn.execute(kind.insert_sql(), [name]) {
        Ok(_) => debug!("Created {kind} '{name}'"),
        Err(err) if is_constraint_violation(&err) => {
            debug!("{kind} '{name}' was created concurrently, re-selecting");
        }
        Err(err) => {
            return Err(err).with_context(|| format!("Failed to insert {kind} '{name}'"));
        }
    }

    select_entity_id(conn, kind, name)?
        .map(Some)
        .ok_or_else(|| anyhow!("{kind} '{name}' missing right after insert"))
}

/// Return the id of the `kind` entity called `name`, creating it when
/// `allow_create` is set. `Ok(None)` means not found.
pub fn get_or_create(
    conn: &mut Connection,
    kind: EntityKind,
    name: &str,
    allow_create: bool,
) -> Result<Option<i64>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let id = get_or_create_in(&tx, kind, name, allow_create)?;
    tx.commit().context("Commiting SQL transaction failed.")?;
    Ok(id)
}

fn select_track_id(conn: &Connection, title: &str, album_id: i64, artist_id: i64) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM track WHERE name = ?1 AND album_id = ?2 AND artist_id = ?3",
        params![title, album_id, artist_id],
        |row| row.get(0),
    )
    .optional()
    .with_context(|| format!("Failed to look up track '{title}'"))
}

/// Resolve a track by title, album and artist, creating missing pieces when
/// `allow_create` is set.
///
/// Album and artist are resolved first; if either is missing and creation is
/// disallowed the result is `Ok(None)`. The genre is only resolved when a new
/// track is inserted and never takes part in its identity: the same title,
/// album and artist with a different genre resolve to the same track, and the
/// other genre is not created.
pub fn get_track(
    conn: &mut Connection,
    title: &str,
    album: &str,
    artist: &str,
    genre: Option<&str>,
    allow_create: bool,
) -> Result<Option<Track>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let Some(album_id) = get_or_create_in(&tx, EntityKind::Album, album, allow_create)? else {
        return Ok(None);
    };
    let Some(artist_id) = get_or_create_in(&tx, EntityKind::Artist, artist, allow_create)? else {
        return Ok(None);
    };
    let track_id = match select_track_id(&tx, title, album_id, artist_id)? {
        Some(id) => Some(id),
        None if allow_create => {
            // The genre row only matters for a track that is about to exist.
            let genre_id = genre
                .map(|name| get_or_create_in(&tx, EntityKind::Genre, name, true))
                .transpose()?
                .flatten();
            match tx.execute(
                "INSERT INTO track (name, album_id, artist_id, genre_id) VALUES (?1, ?2, ?3, ?4)",
                params![title, album_id, artist_id, genre_id],
            ) {
                Ok(_) => debug!("Created track '{title}'"),
                Err(err) if is_constraint_violation(&err) => {
                    debug!("Track '{title}' was created concurrently, re-selecting");
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("Failed to insert track '{title}'"));
                }
            }
            select_track_id(&tx, title, album_id, artist_id)?
        }
        None => None,
    };

    let track = match track_id {
        Some(id) => load_track(&tx, id)?,
        None => None,
    };
    tx.commit().context("Commiting SQL transaction failed.")?;
    Ok(track)
}

/// Resolve a descriptor. Shorthand for [`get_track`].
pub fn get_track_by_descriptor(
    conn: &mut Connection,
    desc: &TrackDescriptor,
    allow_create: bool,
) -> Result<Option<Track>> {
    get_track(
        conn,
        &desc.title,
        &desc.album,
        &desc.artist,
        desc.genre.as_deref(),
        allow_create,
    )
}

const TRACK_SELECT: &str = "
    SELECT t.id, t.name, t.play_count, t.last_played_at, t.added_at,
           al.id, al.name, ar.id, ar.name, g.id, g.name
    FROM track t
    JOIN album al ON al.id = t.album_id
    JOIN artist ar ON ar.id = t.artist_id
    LEFT JOIN genre g ON g.id = t.genre_id";

fn track_from_row(row: &Row<'_>) -> rusqlite::Result<Track> {
    let genre_id: Option<i64> = row.get(9)?;
    let genre_name: Option<String> = row.get(10)?;
    Ok(Track {
        id: row.get(0)?,
        name: row.get(1)?,
        play_count: row.get(2)?,
        last_played_at: row.get(3)?,
        added_at: row.get(4)?,
        album: Entity {
            kind: EntityKind::Album,
            id: row.get(5)?,
            name: row.get(6)?,
        },
        artist: Entity {
            kind: EntityKind::Artist,
            id: row.get(7)?,
            name: row.get(8)?,
        },
        genre: genre_id.zip(genre_name).map(|(id, name)| Entity {
            kind: EntityKind::Genre,
            id,
            name,
        }),
    })
}

fn load_track(conn: &Connection, id: i64) -> Result<Option<Track>> {
    conn.query_row(&format!("{TRACK_SELECT} WHERE t.id = ?1"), [id], track_from_row)
        .optional()
        .with_context(|| format!("Failed to load track {id}"))
}

/// Find a track by id.
pub fn get_track_by_id(conn: &Connection, id: i64) -> Result<Option<Track>> {
    load_track(conn, id)
}

/// Every track in the catalog, ordered by id.
pub fn list_tracks(conn: &Connection) -> Result<Vec<Track>> {
    let mut stmt = conn
        .prepare(&format!("{TRACK_SELECT} ORDER BY t.id"))
        .context("Invalid SQL statement when selecting all tracks")?;
    let tracks = stmt
        .query_map([], track_from_row)
        .context("Cannot query tracks.")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Queried track unwrap failed.")?;
    Ok(tracks)
}

/// Ids of every track, ordered by track id. Cheaper than [`list_tracks`] when
/// only the attribute values are needed.
pub fn list_track_keys(conn: &Connection) -> Result<Vec<TrackKeys>> {
    let mut stmt = conn
        .prepare("SELECT id, album_id, artist_id, genre_id FROM track ORDER BY id")
        .context("Invalid SQL statement when selecting track keys")?;
    let keys = stmt
        .query_map([], |row| {
            Ok(TrackKeys {
                track_id: row.get(0)?,
                album_id: row.get(1)?,
                artist_id: row.get(2)?,
                genre_id: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Cannot query track keys.")?;
    Ok(keys)
}

pub fn track_count(conn: &Connection) -> Result<u64> {
    conn.query_row("SELECT COUNT(*) FROM track", [], |row| row.get(0))
        .context("Could not count tracks.")
}

/// Bump the play count and last-played time of a track.
///
/// # Errors
///
/// [`ConductorError::TrackNotFound`] if no track has this id.
pub fn record_play(conn: &mut Connection, track_id: i64) -> Result<()> {
    let tx = conn.transaction()?;
    let changed = tx
        .execute(
            "UPDATE track SET play_count = play_count + 1, last_played_at = datetime('now') WHERE id = ?1",
            [track_id],
        )
        .with_context(|| format!("Failed to record play for track {track_id}"))?;
    if changed == 0 {
        return Err(ConductorError::TrackNotFound(track_id).into());
    }
    tx.commit().context("Commiting SQL transaction failed.")?;
    trace!("Recorded play for track {track_id}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn test_get_or_create_is_stable() -> Result<()> {
        let mut conn = db::open_in_memory()?;
        let first = get_or_create(&mut conn, EntityKind::Artist, "Colors", true)?;
        let second = get_or_create(&mut conn, EntityKind::Artist, "Colors", true)?;
        assert!(first.is_some());
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn test_get_or_create_without_creation_is_absent() -> Result<()> {
        let mut conn = db::open_in_memory()?;
        assert_eq!(get_or_create(&mut conn, EntityKind::Genre, "Jazz", false)?, None);
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM genre", [], |r| r.get(0))?;
        assert_eq!(count, 0);
        Ok(())
    }

    #[test]
    fn test_get_or_create_recovers_from_existing_row() -> Result<()> {
        let mut conn = db::open_in_memory()?;
        conn.execute("INSERT INTO artist (name) VALUES ('Numbers')", [])?;
        let existing: i64 = conn.query_row("SELECT id FROM artist WHERE name = 'Numbers'", [], |r| r.get(0))?;
        assert_eq!(get_or_create(&mut conn, EntityKind::Artist, "Numbers", true)?, Some(existing));
        Ok(())
    }

    #[test]
    fn test_track_identity_is_stable() -> Result<()> {
        let mut conn = db::open_in_memory()?;
        let a = get_track(&mut conn, "T", "Al", "Ar", None, true)?.unwrap();
        let b = get_track(&mut conn, "T", "Al", "Ar", None, true)?.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(track_count(&conn)?, 1);
        Ok(())
    }

    #[test]
    fn test_genre_is_not_part_of_identity() -> Result<()> {
        let mut conn = db::open_in_memory()?;
        let a = get_track(&mut conn, "Blue", "Cold", "Colors", Some("Electronic"), true)?.unwrap();
        let b = get_track(&mut conn, "Blue", "Cold", "Colors", Some("Ambient"), true)?.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.genre.as_ref().map(|g| g.name.as_str()), Some("Electronic"));
        assert_eq!(b.genre, a.genre);
        Ok(())
    }

    #[test]
    fn test_existing_track_lookup_creates_no_genre() -> Result<()> {
        let mut conn = db::open_in_memory()?;
        get_track(&mut conn, "Blue", "Cold", "Colors", Some("Electronic"), true)?;
        get_track(&mut conn, "Blue", "Cold", "Colors", Some("Ambient"), true)?;
        let genres: i64 = conn.query_row("SELECT COUNT(*) FROM genre", [], |r| r.get(0))?;
        assert_eq!(genres, 1);
        assert_eq!(get_or_create(&mut conn, EntityKind::Genre, "Ambient", false)?, None);

        // An unknown genre does not hide a known track.
        let found = get_track(&mut conn, "Blue", "Cold", "Colors", Some("Jazz"), false)?;
        assert!(found.is_some());
        Ok(())
    }

    #[test]
    fn test_track_lookup_without_creation() -> Result<()> {
        let mut conn = db::open_in_memory()?;
        assert!(get_track(&mut conn, "Blue", "Cold", "Colors", None, false)?.is_none());
        get_track(&mut conn, "Blue", "Cold", "Colors", None, true)?;
        assert!(get_track(&mut conn, "Blue", "Cold", "Colors", None, false)?.is_some());
        // Known album, unknown artist.
        assert!(get_track(&mut conn, "Blue", "Cold", "Nobody", None, false)?.is_none());
        Ok(())
    }

    #[test]
    fn test_track_resolves_album_and_artist() -> Result<()> {
        let mut conn = db::open_in_memory()?;
        let track = get_track(&mut conn, "One", "Low", "Numbers", Some("Math Rock"), true)?.unwrap();
        assert_eq!(track.album.name, "Low");
        assert_eq!(track.artist.name, "Numbers");
        assert_eq!(track.genre.unwrap().kind, EntityKind::Genre);
        assert_eq!(track.play_count, 0);
        assert!(track.last_played_at.is_none());
        Ok(())
    }

    #[test]
    fn test_record_play() -> Result<()> {
        let mut conn = db::open_in_memory()?;
        let track = get_track(&mut conn, "Cyan", "Cold", "Colors", None, true)?.unwrap();
        record_play(&mut conn, track.id)?;
        record_play(&mut conn, track.id)?;
        let track = get_track_by_id(&conn, track.id)?.unwrap();
        assert_eq!(track.play_count, 2);
        assert!(track.last_played_at.is_some());
        Ok(())
    }

    #[test]
    fn test_record_play_missing_track() -> Result<()> {
        let mut conn = db::open_in_memory()?;
        let err = record_play(&mut conn, 42).unwrap_err();
        assert!(ConductorError::TrackNotFound(42).matches(&err));
        Ok(())
    }

    #[test]
    fn test_descriptor_round_trip() -> Result<()> {
        let mut conn = db::open_in_memory()?;
        let desc = TrackDescriptor::new("Green", "Cold", "Colors", Some("Electronic"));
        let track = get_track_by_descriptor(&mut conn, &desc, true)?.unwrap();
        assert_eq!(track.descriptor(), desc);
        assert_eq!(list_track_keys(&conn)?, vec![track.keys()]);
        assert_eq!(list_tracks(&conn)?, vec![track]);
        Ok(())
    }
}
