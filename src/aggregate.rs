//! Combine the chains into one weight per candidate track.
//!
//! For a source track every active chain contributes, per candidate:
//!
//! ```text
//! normalized = edge.score / max(min_score_divisor, max score leaving the source)
//! user       = clamp(edge.user_score, min_user_score, max_user_score)
//! ```
//!
//! Both are 0 when the chain has no edge for the pair. The contributions are
//! summed over all chains and handed to the configured
//! [`WeightFunction`](crate::config::WeightFunction). Without a source track
//! the session-start edges are used and the divisor is taken over the whole
//! chain.

use crate::catalog::{self, TrackKeys};
use crate::chain::Chain;
use crate::config::EngineConfig;
use crate::edge::{Edge, EdgeStore};
use anyhow::Result;
use log::{debug, warn};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// How one candidate's weight came about.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TransitionWeight {
    pub track_id: i64,
    /// Sum of the normalized scores, between 0 and the number of chains.
    pub score: f64,
    /// Sum of the clamped user scores.
    pub user_score: f64,
    pub weight: f64,
}

/// Edges of one chain leaving the source, indexed by destination value.
struct ChainView {
    store: EdgeStore,
    edges: HashMap<i64, Edge>,
    divisor: f64,
}

pub struct TransitionAggregator<'a> {
    config: &'a EngineConfig,
}

impl<'a> TransitionAggregator<'a> {
    #[must_use]
    pub const fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Weight of every candidate destination of `from`, keyed by track id.
    ///
    /// The source track itself is never a candidate. An empty map means there
    /// is nothing to choose from.
    pub fn compute_weights(
        &self,
        conn: &rusqlite::Connection,
        chains: &[Chain],
        from: Option<&TrackKeys>,
    ) -> Result<BTreeMap<i64, f64>> {
        Ok(self
            .compute_breakdown(conn, chains, from)?
            .into_iter()
            .map(|w| (w.track_id, w.weight))
            .collect())
    }

    /// Same as [`compute_weights`](Self::compute_weights) but keeps the summed
    /// scores next to each weight. Ordered by track id.
    #[allow(clippy::cast_precision_loss)]
    pub fn compute_breakdown(
        &self,
        conn: &rusqlite::Connection,
        chains: &[Chain],
        from: Option<&TrackKeys>,
    ) -> Result<Vec<TransitionWeight>> {
        let views = self.load_views(conn, chains, from)?;
        let bounds = self.config.user_score_bounds();
        let source_id = from.map(|keys| keys.track_id);

        let mut weights = Vec::new();
        for candidate in catalog::list_track_keys(conn)? {
            if Some(candidate.track_id) == source_id {
                continue;
            }

            let mut score = 0.0;
            let mut user_score = 0.0;
            let mut biased = false;
            for view in &views {
                let Some(edge) = view
                    .store
                    .to_value(&candidate)
                    .and_then(|value| view.edges.get(&value))
                else {
                    continue;
                };
                let user = bounds.clamp(edge.user_score);
                score += edge.score as f64 / view.divisor;
                user_score += user as f64;
                biased |= edge.score > 0 || user > 0;
            }

            if !biased && !self.config.explore_unscored {
                continue;
            }

            let mut weight = self.config.weight_function.weight(score, user_score, chains.len());
            if weight.is_nan() || weight < 0.0 {
                warn!(
                    "Weight function returned {weight} for track {} (score {score}, user {user_score}); using 0",
                    candidate.track_id
                );
                weight = 0.0;
            } else if weight.is_infinite() {
                warn!(
                    "Weight function overflowed for track {} (score {score}, user {user_score}); using f64::MAX",
                    candidate.track_id
                );
                weight = f64::MAX;
            }
            weights.push(TransitionWeight {
                track_id: candidate.track_id,
                score,
                user_score,
                weight,
            });
        }

        debug!(
            "Computed {} candidate weights from {:?} over {} chains",
            weights.len(),
            source_id,
            chains.len()
        );
        Ok(weights)
    }

    fn load_views(
        &self,
        conn: &rusqlite::Connection,
        chains: &[Chain],
        from: Option<&TrackKeys>,
    ) -> Result<Vec<ChainView>> {
        let mut views = Vec::with_capacity(chains.len());
        for chain in chains {
            let store = EdgeStore::new(
                *chain,
                self.config.user_score_bounds(),
                self.config.edge_defaults(),
            );
            let Some(from_value) = store.from_value(from) else {
                continue;
            };

            let edges = store.get_edges_from(conn, from_value)?;
            let max_score = match from {
                Some(_) => edges.iter().map(|e| e.score).max().unwrap_or(0),
                None => store.max_score(conn)?,
            };
            #[allow(clippy::cast_precision_loss)]
            let divisor = self.config.min_score_divisor.max(max_score as f64);

            views.push(ChainView {
                store,
                edges: edges.into_iter().map(|e| (e.to_value, e)).collect(),
                divisor,
            });
        }
        Ok(views)
    }
}
