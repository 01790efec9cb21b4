//! # Conductor
//!
//! Command-line driver for the conductor library. Each invocation opens the
//! database, runs one command and closes it again, so a player can shell out
//! to it between tracks.
//!
//! ## Usage
//!
//! ```bash
//! # Add a track to the catalog
//! conductor touch --title "Blue" --album "Cold" --artist "Colors" --genre "Electronic"
//!
//! # What should follow it?
//! conductor next --from-title "Blue" --from-album "Cold" --from-artist "Colors"
//!
//! # Tell the engine what actually happened, then rate it
//! conductor record --title "Cyan" --album "Cold" --artist "Colors" \
//!     --from-title "Blue" --from-album "Cold" --from-artist "Colors"
//! conductor feedback 1 --like
//! ```

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use conductor::aggregate::TransitionWeight;
use conductor::cli::{self, ChainAction, Command, StoreCommand};
use conductor::completion;
use conductor::config::{self, RuntimeConfig};
use conductor::{Conductor, ConductorError, HistoryRecord, TransitionHandle};
use log::{debug, info};
use std::path::PathBuf;

const HISTOGRAM_WIDTH: f64 = 50.0;

/// Main entry point for the conductor binary.
///
/// Logging is controlled via `RUST_LOG`:
/// - `RUST_LOG=debug conductor next` - Enable debug logging
/// - `RUST_LOG=conductor::edge=trace conductor record ...` - Per-edge updates
fn main() -> Result<()> {
    env_logger::init();

    let cli::Args {
        db,
        config: config_file,
        command,
    } = cli::Args::parse();

    match command {
        Command::Completion { shell } => {
            let mut cmd = cli::Args::command();
            completion::generate_completions(completion::shell_to_completion_shell(shell), &mut cmd);
            Ok(())
        }
        Command::Store(command) => {
            let runtime = load_runtime_config(config_file, db)?;
            debug!("Using database {}", runtime.db_path.display());
            let mut conductor = Conductor::from_runtime_config(&runtime)?;
            run(&mut conductor, command)?;
            conductor.close()
        }
    }
}

/// Runs one command against an open store.
fn run(conductor: &mut Conductor, command: StoreCommand) -> Result<()> {
    match command {
        StoreCommand::Touch { track } => {
            let track = conductor.touch_track(&track.descriptor())?;
            println!("{} {}", track.id, track.descriptor());
        }
        StoreCommand::Next { from } => {
            let next = match conductor.choose_next_track(from.descriptor().as_ref()) {
                Ok(next) => next,
                Err(err) if ConductorError::EmptyDomain.matches(&err) => {
                    return Err(err.context("The catalog is empty. Add tracks with `conductor touch` first"));
                }
                Err(err) => return Err(err),
            };
            println!("{next}");
        }
        StoreCommand::Record { track, from, explicit } => {
            let outcome =
                conductor.record_transition(from.descriptor().as_ref(), &track.descriptor(), explicit)?;
            if outcome.chains_failed > 0 {
                eprintln!(
                    "{} chains could not be updated, see the log for details",
                    outcome.chains_failed
                );
            }
            println!("{}", outcome.handle);
        }
        StoreCommand::Feedback { handle, like, .. } => {
            let record = conductor.record_user_feedback(TransitionHandle(handle), like)?;
            info!("Stored feedback {} on transition {handle}", record.user_score);
            print_history(conductor, &[record])?;
        }
        StoreCommand::Transitions { from, json } => {
            let weights = conductor.explain_transitions_from(from.descriptor().as_ref())?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&weights).context("Failed to serialize transitions")?
                );
            } else if weights.is_empty() {
                println!("No candidates");
            } else {
                print_histogram(conductor, &weights)?;
            }
        }
        StoreCommand::Chain { action } => match action {
            ChainAction::Add { from, to } => {
                let chain = conductor.init_chain_named(&from, &to)?;
                println!("{chain}");
            }
            ChainAction::Remove { from, to } => {
                let removed = conductor.remove_chain(from.parse()?, to.parse()?)?;
                if removed {
                    println!("Removed {from} -> {to}");
                } else {
                    println!("No chain {from} -> {to}");
                }
            }
            ChainAction::List => {
                for chain in conductor.chains() {
                    println!("{chain}");
                }
            }
        },
        StoreCommand::History { limit } => {
            let records = conductor.history(limit)?;
            print_history(conductor, &records)?;
        }
    }
    Ok(())
}

/// Config file from `--config` or the data directory, with `--db` on top.
fn load_runtime_config(config_file: Option<PathBuf>, db: Option<PathBuf>) -> Result<RuntimeConfig> {
    let config_path = match config_file {
        Some(path) => path,
        None => config::get_config_path()?,
    };
    let mut runtime = RuntimeConfig::load(&config_path)?;
    if let Some(db) = db {
        runtime.db_path = db;
    }
    Ok(runtime)
}

fn track_name(conductor: &Conductor, id: i64) -> Result<String> {
    Ok(conductor
        .get_track_by_id(id)?
        .map_or_else(|| format!("#{id}"), |track| track.name))
}

/// One line per candidate: id, title, weight, share of the total and a bar
/// scaled to the heaviest candidate.
fn print_histogram(conductor: &Conductor, weights: &[TransitionWeight]) -> Result<()> {
    let total: f64 = weights.iter().map(|w| w.weight).sum();
    let max = weights.iter().map(|w| w.weight).fold(0.0_f64, f64::max);
    for w in weights {
        let share = if total > 0.0 { 100.0 * w.weight / total } else { 0.0 };
        let bar = if max > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let len = (HISTOGRAM_WIDTH * w.weight / max) as usize;
            "-".repeat(len)
        } else {
            String::new()
        };
        println!(
            "{:4} [{:20.20}]: {:8.2} ({:5.2}) {bar}",
            w.track_id,
            track_name(conductor, w.track_id)?,
            w.weight,
            share
        );
    }
    Ok(())
}

fn print_history(conductor: &Conductor, records: &[HistoryRecord]) -> Result<()> {
    for record in records {
        let from = match record.from_track_id {
            Some(id) => track_name(conductor, id)?,
            None => "[start]".to_string(),
        };
        println!(
            "{:>5}  {}  {} -> {}{}  {:+}",
            record.handle.0,
            record.played_at,
            from,
            track_name(conductor, record.to_track_id)?,
            if record.explicit_choice { " (explicit)" } else { "" },
            record.user_score
        );
    }
    Ok(())
}
