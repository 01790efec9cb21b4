//! Learns which track should follow which from how a player is used.
//!
//! Core modules:
//! - [`engine`] - The [`Conductor`] a player talks to
//! - [`catalog`] - Artists, albums, genres and tracks
//! - [`chain`] - Attribute pairs the engine learns transitions over
//! - [`edge`] - Learned transition strengths per chain
//! - [`aggregate`] - Turns every chain's opinion into one weight per candidate
//! - [`sampler`] - Weighted random choice
//! - [`history`] - Log of transitions and the feedback given on them
//!
//! ### Supporting Modules
//!
//! - [`config`] - Engine settings, weight functions and data directory paths
//! - [`db`] - SQLite schema and connection setup
//! - [`error`] - Typed conditions callers can react to
//! - [`cli`] - Command-line interface definitions with clap integration
//! - [`completion`] - Shell completion generation
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use conductor::{Attribute, Conductor, EngineConfig, TrackDescriptor};
//! use anyhow::Result;
//!
//! let mut conductor = Conductor::open_in_memory(EngineConfig::default())?;
//! conductor.init_chain(Attribute::TrackId, Attribute::TrackId)?;
//! conductor.init_chain(Attribute::ArtistId, Attribute::ArtistId)?;
//!
//! let blue = TrackDescriptor::new("Blue", "Cold", "Colors", Some("Electronic"));
//! let cyan = TrackDescriptor::new("Cyan", "Cold", "Colors", Some("Electronic"));
//! conductor.touch_track(&blue)?;
//! conductor.touch_track(&cyan)?;
//!
//! // The player finished Blue and asks what comes next.
//! let next = conductor.choose_next_track(Some(&blue))?;
//! let outcome = conductor.record_transition(Some(&blue), &next, false)?;
//!
//! // The user liked what they heard.
//! conductor.record_user_feedback(outcome.handle, true)?;
//! conductor.close()?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## How a decision is made
//!
//! Every registered chain maps the previous track to a source value (its
//! album id, artist id, ...) and every candidate to a destination value. The
//! chain's edge between the two carries an inferred `score`, the number of
//! times the transition was observed, and a `user_score` moved by explicit
//! feedback and kept within configured bounds.
//!
//! For each candidate the aggregator sums the normalized scores and the user
//! scores over all chains, then a [`WeightFunction`] turns the two sums into a
//! weight. The sampler draws one candidate with probability proportional to
//! its weight. At the start of a session the source value is [`SESSION_START`].
//!
//! ## Error Handling
//!
//! Public functions return `anyhow::Result`. Conditions a caller may want to
//! react to are [`ConductorError`] values inside the `anyhow::Error`:
//!
//! ```no_run
//! # use conductor::{Conductor, ConductorError, EngineConfig};
//! # let mut conductor = Conductor::open_in_memory(EngineConfig::default()).unwrap();
//! match conductor.record_feedback(true) {
//!     Err(err) if ConductorError::NoPendingTransition.matches(&err) => {}
//!     other => { other.unwrap(); }
//! }
//! ```
//!
//! Lookups that find nothing return `Ok(None)`.

pub mod aggregate;
pub mod catalog;
pub mod chain;
pub mod cli;
pub mod completion;
pub mod config;
pub mod db;
pub mod edge;
pub mod engine;
pub mod error;
pub mod history;
pub mod sampler;

pub use catalog::{Track, TrackDescriptor};
pub use chain::{Attribute, Chain};
pub use config::{EngineConfig, RuntimeConfig, WeightFunction};
pub use edge::{Edge, SESSION_START};
pub use engine::{Conductor, TransitionOutcome};
pub use error::ConductorError;
pub use history::{HistoryRecord, TransitionHandle};
pub use sampler::WeightedSampler;
