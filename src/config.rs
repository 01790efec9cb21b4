//! # Configuration Module
//!
//! Engine tuning parameters and runtime settings.
//!
//! ## Data Storage
//!
//! Conductor keeps its database and optional config file in the
//! platform-standard data directory:
//! - Linux: `~/.local/share/conductor/`
//! - macOS: `~/Library/Application Support/conductor/`
//! - Windows: `%APPDATA%\conductor\`
//!
//! ## Config file
//!
//! `config.json` is optional. Every key may be omitted:
//!
//! ```json
//! {
//!   "db_path": "/home/me/.local/share/conductor/conductor.db",
//!   "engine": {
//!     "min_score_divisor": 1.0,
//!     "min_user_score": -5,
//!     "max_user_score": 5,
//!     "weight_function": "exponential"
//!   },
//!   "chains": [
//!     { "from": "trackid", "to": "trackid" },
//!     { "from": "artistid", "to": "artistid" }
//!   ]
//! }
//! ```

use crate::chain::{Attribute, ChainSpec};
use crate::edge::{EdgeDefaults, UserScoreBounds};
use crate::error::ConductorError;
use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Signature of a caller-supplied weight function:
/// `(total_score, total_user_score, chain_count) -> weight`.
pub type WeightFn = dyn Fn(f64, f64, usize) -> f64 + Send + Sync;

/// Turns the summed normalized score `s` and summed user score `u` of a
/// candidate into a sampling weight.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightFunction {
    /// `exp(u) * exp(4s)`. A full-strength score is worth about 55x an
    /// unseen transition; feedback is just as steep but bounded by the clamp.
    #[default]
    Exponential,
    /// `(tanh(u * pi / 10n) + 1) * 5 * 2^s`. Feedback saturates smoothly.
    Conservative,
    /// `(1 + 1/n)^u * (sqrt(s) + 1)`. Reacts strongly to feedback.
    Eager,
    /// Anything else, supplied in code.
    #[serde(skip)]
    Custom(Arc<WeightFn>),
}

impl WeightFunction {
    /// Evaluate for one candidate. `chains` is the number of active chains.
    #[must_use]
    pub fn weight(&self, score: f64, user_score: f64, chains: usize) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let n = chains.max(1) as f64;
        match self {
            Self::Exponential => user_score.exp() * (4.0 * score).exp(),
            Self::Conservative => {
                let eased = ((user_score * std::f64::consts::PI / (10.0 * n)).tanh() + 1.0) * 5.0;
                eased * 2f64.powf(score)
            }
            Self::Eager => (1.0 + 1.0 / n).powf(user_score) * (score.max(0.0).sqrt() + 1.0),
            Self::Custom(f) => f(score, user_score, chains),
        }
    }

    pub fn custom(f: impl Fn(f64, f64, usize) -> f64 + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }
}

impl fmt::Debug for WeightFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exponential => f.write_str("Exponential"),
            Self::Conservative => f.write_str("Conservative"),
            Self::Eager => f.write_str("Eager"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Tuning parameters of the recommendation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Lower bound of the normalization denominator, so a single early
    /// transition does not count as a full-strength score.
    pub min_score_divisor: f64,
    /// Score of a freshly touched edge.
    pub default_score: u32,
    /// User score of a freshly touched edge.
    pub default_user_score: i64,
    pub min_user_score: i64,
    pub max_user_score: i64,
    pub weight_function: WeightFunction,
    /// Offer every catalog track as a candidate, not only those some chain
    /// has a positive score or user bias for.
    pub explore_unscored: bool,
    /// Seed for the sampler. `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_score_divisor: 1.0,
            default_score: 0,
            default_user_score: 0,
            min_user_score: -5,
            max_user_score: 5,
            weight_function: WeightFunction::default(),
            explore_unscored: true,
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Reject settings the engine cannot work with.
    ///
    /// # Errors
    ///
    /// [`ConductorError::Misconfiguration`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConductorError> {
        if !self.min_score_divisor.is_finite() || self.min_score_divisor <= 0.0 {
            return Err(ConductorError::Misconfiguration(format!(
                "min_score_divisor must be positive, got {}",
                self.min_score_divisor
            )));
        }
        if self.min_user_score > self.max_user_score {
            return Err(ConductorError::Misconfiguration(format!(
                "min_user_score {} is above max_user_score {}",
                self.min_user_score, self.max_user_score
            )));
        }
        if !(self.min_user_score..=self.max_user_score).contains(&self.default_user_score) {
            return Err(ConductorError::Misconfiguration(format!(
                "default_user_score {} is outside [{}, {}]",
                self.default_user_score, self.min_user_score, self.max_user_score
            )));
        }
        Ok(())
    }

    #[must_use]
    pub const fn user_score_bounds(&self) -> UserScoreBounds {
        UserScoreBounds {
            min: self.min_user_score,
            max: self.max_user_score,
        }
    }

    #[must_use]
    pub const fn edge_defaults(&self) -> EdgeDefaults {
        EdgeDefaults {
            score: self.default_score,
            user_score: self.default_user_score,
        }
    }
}

fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine system data directory. Please ensure your platform supports standard data directories."
        )
    })?;
    Ok(data_dir.join("conductor"))
}

/// Returns the platform-appropriate database file path.
///
/// The directory itself is created when the database is opened.
///
/// # Errors
///
/// Fails if the system data directory cannot be determined.
pub fn get_db_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("conductor.db"))
}

/// Returns the platform-appropriate config file path.
pub fn get_config_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("config.json"))
}

fn default_chains() -> Vec<ChainSpec> {
    vec![ChainSpec::new(Attribute::TrackId, Attribute::TrackId)]
}

/// Everything needed to start an engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Path to the database file
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default)]
    pub engine: EngineConfig,
    /// Chains registered whenever the engine opens.
    #[serde(default = "default_chains")]
    pub chains: Vec<ChainSpec>,
}

/// A chain as written in the config file, before its attributes are resolved.
#[derive(Deserialize)]
struct RawChainSpec {
    from: String,
    to: String,
}

fn default_db_path() -> PathBuf {
    get_db_path().unwrap_or_else(|_| PathBuf::from("conductor.db"))
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            engine: EngineConfig::default(),
            chains: default_chains(),
        }
    }
}

impl RuntimeConfig {
    /// Configuration with explicit database path
    pub fn with_db_path(db_path: PathBuf) -> Self {
        Self {
            db_path,
            ..Self::default()
        }
    }

    /// Read a JSON config file. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Fails if the file exists but cannot be read or is not valid JSON.
    /// Invalid engine settings and unknown chain attributes fail with
    /// [`ConductorError::Misconfiguration`].
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut value: serde_json::Value = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        // Chains are resolved by name so an unknown attribute is a
        // Misconfiguration rather than a parse error.
        let raw_chains = value.as_object_mut().and_then(|fields| fields.remove("chains"));
        let mut config: Self = serde_json::from_value(value)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        if let Some(raw_chains) = raw_chains {
            let specs: Vec<RawChainSpec> = serde_json::from_value(raw_chains)
                .with_context(|| format!("Invalid chains in config file {}", path.display()))?;
            config.chains = specs
                .into_iter()
                .map(|spec| -> Result<ChainSpec, ConductorError> {
                    Ok(ChainSpec::new(spec.from.parse()?, spec.to.parse()?))
                })
                .collect::<Result<_, _>>()?;
        }
        config.engine.validate()?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }
}
