//! The engine the player talks to.
//!
//! [`Conductor`] ties the catalog, the chains, the aggregator, the sampler and
//! the history log together behind the operations a player needs: make sure a
//! track exists, pick the next one, commit a transition and give feedback on it.

use crate::aggregate::{TransitionAggregator, TransitionWeight};
use crate::catalog::{self, Track, TrackDescriptor, TrackKeys};
use crate::chain::{Attribute, Chain, ChainRegistry};
use crate::config::{EngineConfig, RuntimeConfig};
use crate::db;
use crate::edge::{Edge, EdgeDelta, EdgeStore};
use crate::error::ConductorError;
use crate::history::{self, HistoryRecord, TransitionHandle};
use crate::sampler::WeightedSampler;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::path::Path;

/// Result of committing a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub handle: TransitionHandle,
    /// Chains whose edge was updated.
    pub chains_updated: usize,
    /// Chains that failed to update. Their failure was logged; the others
    /// were still updated.
    pub chains_failed: usize,
}

/// How a committed transition or feedback touches each chain.
#[derive(Debug, Clone, Copy)]
enum EdgeUpdate {
    /// Creates the edge if needed and counts the transition.
    Transition,
    /// Adjusts the user score of an edge that already exists.
    Feedback(i64),
}

pub struct Conductor {
    conn: Connection,
    config: EngineConfig,
    registry: ChainRegistry,
    sampler: WeightedSampler,
    pending: Option<TransitionHandle>,
}

impl Conductor {
    /// Open the database at `path` with the given engine settings.
    ///
    /// # Errors
    ///
    /// [`ConductorError::Misconfiguration`] for invalid settings, or any
    /// database error while opening.
    pub fn open(path: &Path, config: EngineConfig) -> Result<Self> {
        let conn = db::open(path)?;
        Self::with_connection(conn, config)
    }

    /// Engine over an in-memory database.
    pub fn open_in_memory(config: EngineConfig) -> Result<Self> {
        Self::with_connection(db::open_in_memory()?, config)
    }

    /// Open as described by a runtime config and register its chains.
    pub fn from_runtime_config(runtime: &RuntimeConfig) -> Result<Self> {
        let mut conductor = Self::open(&runtime.db_path, runtime.engine.clone())?;
        for spec in &runtime.chains {
            conductor.init_chain(spec.from, spec.to)?;
        }
        Ok(conductor)
    }

    /// Wrap an already opened connection. The schema is created if missing.
    pub fn with_connection(conn: Connection, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        db::init_schema(&conn)?;
        let registry = ChainRegistry::load(&conn)?;
        let sampler = WeightedSampler::from_seed_option(config.seed);
        info!("Conductor ready with {} chains", registry.len());
        Ok(Self {
            conn,
            config,
            registry,
            sampler,
            pending: None,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ---------------------------------------------------------------------
    // Chains
    // ---------------------------------------------------------------------

    /// Register a chain. Registering an existing pair is a no-op returning it.
    pub fn init_chain(&mut self, from: Attribute, to: Attribute) -> Result<Chain> {
        self.registry.register(&mut self.conn, from, to)
    }

    /// Register a chain by attribute names.
    ///
    /// # Errors
    ///
    /// [`ConductorError::Misconfiguration`] if a name is not an attribute.
    pub fn init_chain_named(&mut self, from: &str, to: &str) -> Result<Chain> {
        self.registry.register_named(&mut self.conn, from, to)
    }

    /// Remove a chain and all of its edges. False if it was not registered.
    pub fn remove_chain(&mut self, from: Attribute, to: Attribute) -> Result<bool> {
        self.registry.unregister(&mut self.conn, from, to)
    }

    #[must_use]
    pub fn chains(&self) -> &[Chain] {
        self.registry.list()
    }

    /// Edge store of one chain with the engine's bounds and defaults.
    #[must_use]
    pub fn edge_store(&self, chain: Chain) -> EdgeStore {
        EdgeStore::new(
            chain,
            self.config.user_score_bounds(),
            self.config.edge_defaults(),
        )
    }

    /// The edge between two tracks on `chain`, if any transition was seen.
    pub fn edge_between(&self, chain: Chain, from: Option<&TrackDescriptor>, to: &TrackDescriptor) -> Result<Option<Edge>> {
        let store = self.edge_store(chain);
        let from_keys = match from {
            Some(desc) => match self.find_track(desc)? {
                Some(track) => Some(track.keys()),
                None => return Ok(None),
            },
            None => None,
        };
        let Some(to_track) = self.find_track(to)? else {
            return Ok(None);
        };
        let (Some(from_value), Some(to_value)) =
            (store.from_value(from_keys.as_ref()), store.to_value(&to_track.keys()))
        else {
            return Ok(None);
        };
        store.get_edge(&self.conn, from_value, to_value)
    }

    // ---------------------------------------------------------------------
    // Catalog
    // ---------------------------------------------------------------------

    /// Make sure the described track exists in the catalog.
    pub fn touch_track(&mut self, desc: &TrackDescriptor) -> Result<Track> {
        catalog::get_track_by_descriptor(&mut self.conn, desc, true)?
            .with_context(|| format!("Track {desc} could not be created"))
    }

    /// Look a track up without creating anything.
    pub fn find_track(&self, desc: &TrackDescriptor) -> Result<Option<Track>> {
        let found = self.conn.query_row(
            "SELECT t.id FROM track t
             JOIN album al ON al.id = t.album_id
             JOIN artist ar ON ar.id = t.artist_id
             WHERE t.name = ?1 AND al.name = ?2 AND ar.name = ?3
             ORDER BY t.id LIMIT 1",
            rusqlite::params![desc.title, desc.album, desc.artist],
            |row| row.get::<_, i64>(0),
        );
        match found {
            Ok(id) => catalog::get_track_by_id(&self.conn, id),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(err) => Err(err).with_context(|| format!("Failed to look up track {desc}")),
        }
    }

    pub fn get_track_by_id(&self, id: i64) -> Result<Option<Track>> {
        catalog::get_track_by_id(&self.conn, id)
    }

    fn resolve(&mut self, desc: Option<&TrackDescriptor>) -> Result<Option<Track>> {
        desc.map(|d| self.touch_track(d)).transpose()
    }

    // ---------------------------------------------------------------------
    // Decisions
    // ---------------------------------------------------------------------

    /// Weight of every candidate after `from` (or at session start).
    pub fn get_transitions_from(&mut self, from: Option<&TrackDescriptor>) -> Result<BTreeMap<i64, f64>> {
        let source = self.resolve(from)?;
        self.transitions_from_keys(source.as_ref().map(Track::keys).as_ref())
    }

    /// Weights with the summed scores behind them, for display.
    pub fn explain_transitions_from(&mut self, from: Option<&TrackDescriptor>) -> Result<Vec<TransitionWeight>> {
        let source = self.resolve(from)?;
        TransitionAggregator::new(&self.config).compute_breakdown(
            &self.conn,
            self.registry.list(),
            source.as_ref().map(Track::keys).as_ref(),
        )
    }

    fn transitions_from_keys(&self, from: Option<&TrackKeys>) -> Result<BTreeMap<i64, f64>> {
        TransitionAggregator::new(&self.config).compute_weights(&self.conn, self.registry.list(), from)
    }

    /// Run one decision cycle and return the track to play after `from`.
    ///
    /// If no candidate has a positive weight, falls back to a uniform pick over
    /// the whole catalog.
    ///
    /// # Errors
    ///
    /// [`ConductorError::EmptyDomain`] only when the catalog is empty.
    pub fn choose_next_track(&mut self, from: Option<&TrackDescriptor>) -> Result<TrackDescriptor> {
        let source = self.resolve(from)?;
        let weights = self.transitions_from_keys(source.as_ref().map(Track::keys).as_ref())?;

        let chosen = match self.sampler.choose(weights) {
            Ok(id) => id,
            Err(ConductorError::EmptyDomain) => {
                info!("No weighted candidate, falling back to a uniform pick");
                let ids: Vec<i64> = catalog::list_track_keys(&self.conn)?
                    .into_iter()
                    .map(|k| k.track_id)
                    .collect();
                *ids
                    .choose(self.sampler.rng_mut())
                    .ok_or(ConductorError::EmptyDomain)?
            }
            Err(err) => return Err(err.into()),
        };

        let track = catalog::get_track_by_id(&self.conn, chosen)?
            .ok_or(ConductorError::TrackNotFound(chosen))?;
        debug!("Chose track {} ({})", track.id, track.name);
        Ok(track.descriptor())
    }

    // ---------------------------------------------------------------------
    // Learning
    // ---------------------------------------------------------------------

    /// Commit a transition: bump the play count of `to`, update every chain
    /// and append to the history. The returned handle is also remembered as
    /// the target of [`record_feedback`](Self::record_feedback).
    ///
    /// Each chain is updated in its own transaction. A chain that fails is
    /// logged and skipped; the others still update.
    pub fn record_transition(
        &mut self,
        from: Option<&TrackDescriptor>,
        to: &TrackDescriptor,
        explicit_choice: bool,
    ) -> Result<TransitionOutcome> {
        let source = self.resolve(from)?;
        let target = self.touch_track(to)?;
        catalog::record_play(&mut self.conn, target.id)?;

        let source_keys = source.as_ref().map(Track::keys);
        let (chains_updated, chains_failed) =
            self.update_chains(source_keys.as_ref(), &target.keys(), EdgeUpdate::Transition);

        let handle = history::append(
            &mut self.conn,
            source.as_ref().map(|t| t.id),
            target.id,
            explicit_choice,
        )?;
        self.pending = Some(handle);

        info!(
            "Transition {handle}: {} -> {} ({chains_updated} chains updated)",
            source.as_ref().map_or("[start]", |t| t.name.as_str()),
            target.name
        );
        Ok(TransitionOutcome {
            handle,
            chains_updated,
            chains_failed,
        })
    }

    /// Apply explicit feedback to a recorded transition: +1 if liked, -1 if
    /// not. The history record keeps the latest feedback; every active chain's
    /// edge for the same pair gets the delta.
    ///
    /// # Errors
    ///
    /// [`ConductorError::UnknownTransition`] for a handle not in the history.
    pub fn record_user_feedback(&mut self, handle: TransitionHandle, liked: bool) -> Result<HistoryRecord> {
        let delta = if liked { 1 } else { -1 };
        let record = history::set_user_score(&mut self.conn, handle, delta)?;

        let from = match record.from_track_id {
            Some(id) => Some(
                catalog::get_track_by_id(&self.conn, id)?
                    .ok_or(ConductorError::TrackNotFound(id))?
                    .keys(),
            ),
            None => None,
        };
        let to = catalog::get_track_by_id(&self.conn, record.to_track_id)?
            .ok_or(ConductorError::TrackNotFound(record.to_track_id))?
            .keys();

        let (updated, failed) = self.update_chains(from.as_ref(), &to, EdgeUpdate::Feedback(delta));
        info!(
            "Feedback {} on transition {handle} ({updated} chains updated, {failed} failed)",
            if liked { "+1" } else { "-1" }
        );
        Ok(record)
    }

    /// Feedback on the transition most recently recorded by this engine.
    ///
    /// # Errors
    ///
    /// [`ConductorError::NoPendingTransition`] if nothing was recorded yet.
    pub fn record_feedback(&mut self, liked: bool) -> Result<HistoryRecord> {
        let handle = self.pending.ok_or(ConductorError::NoPendingTransition)?;
        self.record_user_feedback(handle, liked)
    }

    /// Record a transition the user explicitly liked.
    pub fn record_transition_like(&mut self, from: Option<&TrackDescriptor>, to: &TrackDescriptor) -> Result<HistoryRecord> {
        let outcome = self.record_transition(from, to, true)?;
        self.record_user_feedback(outcome.handle, true)
    }

    /// Record a transition the user explicitly disliked.
    pub fn record_transition_dislike(&mut self, from: Option<&TrackDescriptor>, to: &TrackDescriptor) -> Result<HistoryRecord> {
        let outcome = self.record_transition(from, to, true)?;
        self.record_user_feedback(outcome.handle, false)
    }

    #[must_use]
    pub const fn pending_transition(&self) -> Option<TransitionHandle> {
        self.pending
    }

    pub fn history(&self, limit: usize) -> Result<Vec<HistoryRecord>> {
        history::recent(&self.conn, limit)
    }

    fn update_chains(&mut self, from: Option<&TrackKeys>, to: &TrackKeys, update: EdgeUpdate) -> (usize, usize) {
        let mut updated = 0;
        let mut failed = 0;
        for chain in self.registry.list().to_vec() {
            let store = self.edge_store(chain);
            let result = match update {
                EdgeUpdate::Transition => store.record_transition(&mut self.conn, from, to, EdgeDelta::transition()),
                EdgeUpdate::Feedback(user_score) => store.record_feedback(&mut self.conn, from, to, user_score),
            };
            match result {
                Ok(Some(_)) => updated += 1,
                Ok(None) => {}
                Err(err) => {
                    failed += 1;
                    warn!(
                        "Chain {} was not updated, continuing with the others: {err:#}",
                        store.chain()
                    );
                }
            }
        }
        (updated, failed)
    }

    /// Compact the database and close it.
    pub fn close(self) -> Result<()> {
        db::vacuum(&self.conn)?;
        self.conn
            .close()
            .map_err(|(_, err)| err)
            .context("Failed to close database")?;
        debug!("Conductor closed");
        Ok(())
    }
}
