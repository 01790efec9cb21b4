//! Per-chain edge storage.
//!
//! Every chain owns the rows of the shared `edge` table that carry its id.
//! An edge connects two attribute values and holds two numbers: `score`, the
//! number of observed transitions, and `user_score`, the explicit feedback,
//! always clamped to the configured bounds.

use crate::catalog::TrackKeys;
use crate::chain::Chain;
use anyhow::{Context, Result};
use log::trace;
use rusqlite::{params, Connection, OptionalExtension};

/// The `from_value` of edges leaving the start of a session.
pub const SESSION_START: i64 = -1;

/// Inclusive bounds of an edge's user score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserScoreBounds {
    pub min: i64,
    pub max: i64,
}

impl UserScoreBounds {
    #[must_use]
    pub fn clamp(&self, value: i64) -> i64 {
        value.clamp(self.min, self.max)
    }
}

impl Default for UserScoreBounds {
    fn default() -> Self {
        Self { min: -5, max: 5 }
    }
}

/// One stored edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub from_value: i64,
    pub to_value: i64,
    pub score: i64,
    pub user_score: i64,
}

/// Values a freshly touched edge starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EdgeDefaults {
    pub score: u32,
    pub user_score: i64,
}

/// What a transition does to one edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EdgeDelta {
    pub score: u32,
    pub user_score: i64,
}

impl EdgeDelta {
    /// A plain observed transition.
    #[must_use]
    pub const fn transition() -> Self {
        Self { score: 1, user_score: 0 }
    }

    /// Feedback only; the inferred score stays put.
    #[must_use]
    pub const fn feedback(user_score: i64) -> Self {
        Self { score: 0, user_score }
    }
}

/// The edges of a single chain.
#[derive(Debug, Clone, Copy)]
pub struct EdgeStore {
    chain: Chain,
    bounds: UserScoreBounds,
    defaults: EdgeDefaults,
}

impl EdgeStore {
    #[must_use]
    pub fn new(chain: Chain, bounds: UserScoreBounds, defaults: EdgeDefaults) -> Self {
        Self {
            chain,
            bounds,
            defaults,
        }
    }

    #[must_use]
    pub const fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Source value for a transition leaving `from`, or [`SESSION_START`].
    /// `None` if the source track lacks the attribute (no genre).
    #[must_use]
    pub fn from_value(&self, from: Option<&TrackKeys>) -> Option<i64> {
        match from {
            Some(keys) => self.chain.from.value_of(keys),
            None => Some(SESSION_START),
        }
    }

    #[must_use]
    pub fn to_value(&self, to: &TrackKeys) -> Option<i64> {
        self.chain.to.value_of(to)
    }

    /// Record a transition between two tracks on this chain.
    ///
    /// The edge is touched into existence with the default values and then
    /// updated inside one transaction. The user score is clamped in the same
    /// statement that adds to it. Returns `Ok(None)` when one of the tracks has
    /// no value for this chain's attributes, otherwise the updated edge.
    pub fn record_transition(
        &self,
        conn: &mut Connection,
        from: Option<&TrackKeys>,
        to: &TrackKeys,
        delta: EdgeDelta,
    ) -> Result<Option<Edge>> {
        let (Some(from_value), Some(to_value)) = (self.from_value(from), self.to_value(to)) else {
            trace!("Chain {} does not apply to track {}", self.chain, to.track_id);
            return Ok(None);
        };
        self.apply(conn, from_value, to_value, delta).map(Some)
    }

    /// Touch-then-update the edge `from_value -> to_value`.
    pub fn apply(&self, conn: &mut Connection, from_value: i64, to_value: i64, delta: EdgeDelta) -> Result<Edge> {
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT OR IGNORE INTO edge (chain_id, from_value, to_value, score, user_score)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                self.chain.id,
                from_value,
                to_value,
                self.defaults.score,
                self.bounds.clamp(self.defaults.user_score)
            ],
        )
        .with_context(|| format!("Failed to touch edge {from_value} -> {to_value} in chain {}", self.chain))?;

        let edge = self
            .update_in(&tx, from_value, to_value, delta)?
            .with_context(|| format!("Edge {from_value} -> {to_value} in chain {} vanished after touch", self.chain))?;

        tx.commit().context("Commiting SQL transaction failed.")?;
        trace!(
            "Chain {}: edge {} -> {} now score={} user_score={}",
            self.chain,
            edge.from_value,
            edge.to_value,
            edge.score,
            edge.user_score
        );
        Ok(edge)
    }

    /// Add feedback to the edge between two tracks without creating it.
    ///
    /// Edges only come into existence through observed transitions, so
    /// `Ok(None)` is returned when this chain never saw the pair (for example
    /// when the chain was registered after the transition) or when the chain
    /// does not apply to one of the tracks.
    pub fn record_feedback(
        &self,
        conn: &mut Connection,
        from: Option<&TrackKeys>,
        to: &TrackKeys,
        user_score: i64,
    ) -> Result<Option<Edge>> {
        let (Some(from_value), Some(to_value)) = (self.from_value(from), self.to_value(to)) else {
            return Ok(None);
        };
        let tx = conn.transaction()?;
        let edge = self.update_in(&tx, from_value, to_value, EdgeDelta::feedback(user_score))?;
        tx.commit().context("Commiting SQL transaction failed.")?;
        if edge.is_none() {
            trace!("Chain {} has no edge {from_value} -> {to_value}, feedback skipped", self.chain);
        }
        Ok(edge)
    }

    /// Add `delta` to an existing edge, clamping the user score in the same
    /// statement. `None` if the edge does not exist.
    fn update_in(&self, conn: &Connection, from_value: i64, to_value: i64, delta: EdgeDelta) -> Result<Option<Edge>> {
        conn.query_row(
            "UPDATE edge
             SET score = score + ?4,
                 user_score = MIN(MAX(user_score + ?5, ?6), ?7)
             WHERE chain_id = ?1 AND from_value = ?2 AND to_value = ?3
             RETURNING from_value, to_value, score, user_score",
            params![
                self.chain.id,
                from_value,
                to_value,
                delta.score,
                delta.user_score,
                self.bounds.min,
                self.bounds.max
            ],
            edge_from_row,
        )
        .optional()
        .with_context(|| format!("Failed to update edge {from_value} -> {to_value} in chain {}", self.chain))
    }

    /// All edges leaving `from_value`, ordered by destination.
    pub fn get_edges_from(&self, conn: &Connection, from_value: i64) -> Result<Vec<Edge>> {
        let mut stmt = conn
            .prepare_cached(
                "SELECT from_value, to_value, score, user_score FROM edge
                 WHERE chain_id = ?1 AND from_value = ?2
                 ORDER BY to_value",
            )
            .context("Invalid SQL statement when selecting edges")?;
        let edges = stmt
            .query_map(params![self.chain.id, from_value], edge_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("Cannot query edges of chain {}", self.chain))?;
        Ok(edges)
    }

    pub fn get_edge(&self, conn: &Connection, from_value: i64, to_value: i64) -> Result<Option<Edge>> {
        conn.query_row(
            "SELECT from_value, to_value, score, user_score FROM edge
             WHERE chain_id = ?1 AND from_value = ?2 AND to_value = ?3",
            params![self.chain.id, from_value, to_value],
            edge_from_row,
        )
        .optional()
        .with_context(|| format!("Failed to look up edge in chain {}", self.chain))
    }

    /// Highest score among edges leaving `from_value`; 0 without edges.
    pub fn max_score_from(&self, conn: &Connection, from_value: i64) -> Result<i64> {
        conn.query_row(
            "SELECT COALESCE(MAX(score), 0) FROM edge WHERE chain_id = ?1 AND from_value = ?2",
            params![self.chain.id, from_value],
            |row| row.get(0),
        )
        .context("Failed to compute maximum edge score")
    }

    /// Highest score anywhere in this chain; 0 without edges.
    pub fn max_score(&self, conn: &Connection) -> Result<i64> {
        conn.query_row(
            "SELECT COALESCE(MAX(score), 0) FROM edge WHERE chain_id = ?1",
            [self.chain.id],
            |row| row.get(0),
        )
        .context("Failed to compute maximum edge score")
    }

    pub fn edge_count(&self, conn: &Connection) -> Result<u64> {
        conn.query_row(
            "SELECT COUNT(*) FROM edge WHERE chain_id = ?1",
            [self.chain.id],
            |row| row.get(0),
        )
        .context("Could not count edges.")
    }
}

fn edge_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Edge> {
    Ok(Edge {
        from_value: row.get(0)?,
        to_value: row.get(1)?,
        score: row.get(2)?,
        user_score: row.get(3)?,
    })
}
