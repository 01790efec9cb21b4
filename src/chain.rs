//! Chains and the registry that keeps track of them.
//!
//! A chain is a directed graph over the values of one track attribute, e.g.
//! `artistid -> artistid` learns which artist tends to follow which. Chains are
//! persisted in the `chain` table; their edges live in the shared `edge` table
//! keyed by the chain id.

use crate::catalog::TrackKeys;
use crate::error::ConductorError;
use anyhow::{Context, Result};
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A track attribute a chain can index on either side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Attribute {
    TrackId,
    AlbumId,
    ArtistId,
    GenreId,
}

impl Attribute {
    pub const ALL: [Attribute; 4] = [
        Attribute::TrackId,
        Attribute::AlbumId,
        Attribute::ArtistId,
        Attribute::GenreId,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TrackId => "trackid",
            Self::AlbumId => "albumid",
            Self::ArtistId => "artistid",
            Self::GenreId => "genreid",
        }
    }

    /// The value this attribute takes for a track. Only the genre can be absent.
    #[must_use]
    pub const fn value_of(self, keys: &TrackKeys) -> Option<i64> {
        match self {
            Self::TrackId => Some(keys.track_id),
            Self::AlbumId => Some(keys.album_id),
            Self::ArtistId => Some(keys.artist_id),
            Self::GenreId => keys.genre_id,
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Attribute {
    type Err = ConductorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|attr| attr.as_str() == normalized)
            .ok_or_else(|| ConductorError::Misconfiguration(format!("unknown attribute '{s}'")))
    }
}

impl TryFrom<String> for Attribute {
    type Error = ConductorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Attribute> for String {
    fn from(value: Attribute) -> Self {
        value.as_str().to_string()
    }
}

/// A registered chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Chain {
    pub id: i64,
    pub from: Attribute,
    pub to: Attribute,
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// An attribute pair as written in configuration, before it is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSpec {
    pub from: Attribute,
    pub to: Attribute,
}

impl ChainSpec {
    #[must_use]
    pub const fn new(from: Attribute, to: Attribute) -> Self {
        Self { from, to }
    }
}

fn parse_attribute(name: &str, column: &str) -> rusqlite::Result<Attribute> {
    name.parse().map_err(|err: ConductorError| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("{column}: {err}").into(),
        )
    })
}

fn find_chain(conn: &Connection, from: Attribute, to: Attribute) -> Result<Option<Chain>> {
    conn.query_row(
        "SELECT id FROM chain WHERE from_attribute = ?1 AND to_attribute = ?2",
        params![from.as_str(), to.as_str()],
        |row| row.get(0),
    )
    .optional()
    .with_context(|| format!("Failed to look up chain {from} -> {to}"))
    .map(|id| id.map(|id| Chain { id, from, to }))
}

/// Every chain stored in the database, ordered by id.
pub fn load_chains(conn: &Connection) -> Result<Vec<Chain>> {
    let mut stmt = conn
        .prepare("SELECT id, from_attribute, to_attribute FROM chain ORDER BY id")
        .context("Invalid SQL statement when selecting chains")?;
    let chains = stmt
        .query_map([], |row| {
            let from: String = row.get(1)?;
            let to: String = row.get(2)?;
            Ok(Chain {
                id: row.get(0)?,
                from: parse_attribute(&from, "from_attribute")?,
                to: parse_attribute(&to, "to_attribute")?,
            })
        })
        .context("Cannot query chains.")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Stored chain could not be read.")?;
    Ok(chains)
}

/// The in-memory view of the active chains, backed by the `chain` table.
#[derive(Debug, Clone, Default)]
pub struct ChainRegistry {
    chains: Vec<Chain>,
}

impl ChainRegistry {
    /// Rebuild the registry from the database.
    pub fn load(conn: &Connection) -> Result<Self> {
        let chains = load_chains(conn)?;
        debug!("Loaded {} chains", chains.len());
        Ok(Self { chains })
    }

    /// Register `from -> to`. Registering an existing pair returns the chain
    /// already stored; it never creates a second one.
    pub fn register(&mut self, conn: &mut Connection, from: Attribute, to: Attribute) -> Result<Chain> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let chain = match find_chain(&tx, from, to)? {
            Some(chain) => chain,
            None => {
                tx.execute(
                    "INSERT INTO chain (from_attribute, to_attribute) VALUES (?1, ?2)",
                    params![from.as_str(), to.as_str()],
                )
                .with_context(|| format!("Failed to register chain {from} -> {to}"))?;
                let chain = Chain {
                    id: tx.last_insert_rowid(),
                    from,
                    to,
                };
                info!("Registered chain {chain}");
                chain
            }
        };
        tx.commit().context("Commiting SQL transaction failed.")?;

        if !self.chains.iter().any(|c| c.id == chain.id) {
            self.chains.push(chain);
        }
        Ok(chain)
    }

    /// Register a chain from attribute names, e.g. `("albumid", "trackid")`.
    ///
    /// # Errors
    ///
    /// [`ConductorError::Misconfiguration`] if either name is not an attribute.
    pub fn register_named(&mut self, conn: &mut Connection, from: &str, to: &str) -> Result<Chain> {
        let from: Attribute = from.parse()?;
        let to: Attribute = to.parse()?;
        self.register(conn, from, to)
    }

    /// Remove `from -> to` together with all of its edges. Returns false if the
    /// chain was not registered.
    pub fn unregister(&mut self, conn: &mut Connection, from: Attribute, to: Attribute) -> Result<bool> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let Some(chain) = find_chain(&tx, from, to)? else {
            return Ok(false);
        };
        let edges = tx
            .execute("DELETE FROM edge WHERE chain_id = ?1", [chain.id])
            .with_context(|| format!("Failed to delete edges of chain {chain}"))?;
        tx.execute("DELETE FROM chain WHERE id = ?1", [chain.id])
            .with_context(|| format!("Failed to delete chain {chain}"))?;
        tx.commit().context("Commiting SQL transaction failed.")?;

        self.chains.retain(|c| c.id != chain.id);
        info!("Removed chain {chain} and its {edges} edges");
        Ok(true)
    }

    #[must_use]
    pub fn list(&self) -> &[Chain] {
        &self.chains
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}
