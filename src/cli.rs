//! # Command-Line Interface Module
//!
//! Clap derive definitions for the `conductor` binary. The binary is a thin
//! driver over the library: every command opens the engine, runs one
//! operation and closes it again.
//!
//! ## Commands
//!
//! - `touch`: make sure a track exists in the catalog
//! - `next`: pick the track to play after another one
//! - `record`: commit a transition and print its handle
//! - `feedback`: like or dislike a recorded transition
//! - `transitions`: show the weight of every candidate
//! - `chain`: add, remove or list chains
//! - `history`: show recent transitions
//!
//! ## Examples
//!
//! ```bash
//! conductor touch --title "Blue" --album "Cold" --artist "Colors"
//! conductor next --from-title "Blue" --from-album "Cold" --from-artist "Colors"
//! conductor feedback 12 --like
//! conductor chain add artistid artistid
//! ```

use crate::catalog::TrackDescriptor;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

/// Main application arguments structure.
#[derive(Parser, Debug)]
#[command(name = "conductor")]
#[command(about = "Conductor: learns which track should come next from how you listen")]
#[command(version)]
pub struct Args {
    /// Database file (defaults to the platform data directory)
    #[arg(long, global = true, env = "CONDUCTOR_DB", value_hint = clap::ValueHint::FilePath)]
    pub db: Option<PathBuf>,

    /// JSON config file (defaults to config.json next to the database)
    #[arg(long, global = true, env = "CONDUCTOR_CONFIG", value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// A track named by its metadata.
#[derive(clap::Args, Debug, Clone)]
pub struct TrackArgs {
    /// Track title
    #[arg(long)]
    pub title: String,
    /// Album name
    #[arg(long)]
    pub album: String,
    /// Artist name
    #[arg(long)]
    pub artist: String,
    /// Genre, if the track has one
    #[arg(long)]
    pub genre: Option<String>,
}

impl TrackArgs {
    #[must_use]
    pub fn descriptor(&self) -> TrackDescriptor {
        TrackDescriptor::new(&self.title, &self.album, &self.artist, self.genre.as_deref())
    }
}

/// The track a transition leaves. Omit it entirely for the start of a session.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct FromTrackArgs {
    /// Title of the previous track
    #[arg(long, requires_all = ["from_album", "from_artist"])]
    pub from_title: Option<String>,
    /// Album of the previous track
    #[arg(long, requires = "from_title")]
    pub from_album: Option<String>,
    /// Artist of the previous track
    #[arg(long, requires = "from_title")]
    pub from_artist: Option<String>,
    /// Genre of the previous track
    #[arg(long, requires = "from_title")]
    pub from_genre: Option<String>,
}

impl FromTrackArgs {
    /// `None` at session start.
    #[must_use]
    pub fn descriptor(&self) -> Option<TrackDescriptor> {
        match (&self.from_title, &self.from_album, &self.from_artist) {
            (Some(title), Some(album), Some(artist)) => Some(TrackDescriptor::new(
                title,
                album,
                artist,
                self.from_genre.as_deref(),
            )),
            _ => None,
        }
    }
}

/// Enumeration of all available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(flatten)]
    Store(StoreCommand),

    /// Generate shell completions
    ///
    /// Usage: conductor completion bash > ~/.local/share/bash-completion/completions/conductor
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Subcommands that work on the database.
#[derive(Subcommand, Debug)]
pub enum StoreCommand {
    /// Make sure a track exists in the catalog
    ///
    /// Creates the artist, album, genre and track rows as needed and prints
    /// the track id. Touching an existing track changes nothing.
    Touch {
        #[command(flatten)]
        track: TrackArgs,
    },

    /// Pick the next track
    ///
    /// Runs one decision cycle: sums every chain's opinion of each candidate,
    /// turns it into a weight and draws one track at random by weight. Without
    /// --from-* options the pick is for the start of a session.
    Next {
        #[command(flatten)]
        from: FromTrackArgs,
    },

    /// Record that one track followed another
    ///
    /// Bumps the play count of the new track, strengthens the transition on
    /// every chain and appends it to the history. Prints the transition
    /// handle, which `feedback` takes.
    Record {
        #[command(flatten)]
        track: TrackArgs,

        #[command(flatten)]
        from: FromTrackArgs,

        /// The user picked this track themselves
        #[arg(long)]
        explicit: bool,
    },

    /// Like or dislike a recorded transition
    Feedback {
        /// Handle printed by `record`
        handle: i64,

        /// The transition was a good one
        #[arg(long, conflicts_with = "dislike", required_unless_present = "dislike")]
        like: bool,

        /// The transition was a bad one
        #[arg(long)]
        dislike: bool,
    },

    /// Show the weight of every candidate after a track
    ///
    /// Prints a histogram of id, title, weight and share of the total.
    Transitions {
        #[command(flatten)]
        from: FromTrackArgs,

        /// Print JSON instead of a histogram
        #[arg(long)]
        json: bool,
    },

    /// Manage chains
    ///
    /// A chain maps a track attribute of the previous track to one of the
    /// next track. Attributes: trackid, albumid, artistid, genreid.
    Chain {
        #[command(subcommand)]
        action: ChainAction,
    },

    /// Show recent transitions, newest first
    History {
        /// Number of transitions to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

/// Chain management actions
#[derive(Subcommand, Debug)]
pub enum ChainAction {
    /// Register a chain (no-op if it exists)
    Add {
        /// Attribute of the previous track
        from: String,
        /// Attribute of the next track
        to: String,
    },

    /// Remove a chain and everything it learned
    Remove {
        /// Attribute of the previous track
        from: String,
        /// Attribute of the next track
        to: String,
    },

    /// List registered chains
    List,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_from_track_is_optional() {
        let args = Args::parse_from(["conductor", "next"]);
        match args.command {
            Command::Store(StoreCommand::Next { from }) => assert!(from.descriptor().is_none()),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_record_parses_both_tracks() {
        let args = Args::parse_from([
            "conductor", "--db", "/tmp/c.db", "record", "--title", "Y", "--album", "Al", "--artist", "Ar",
            "--from-title", "X", "--from-album", "Al", "--from-artist", "Ar", "--explicit",
        ]);
        assert_eq!(args.db, Some(PathBuf::from("/tmp/c.db")));
        match args.command {
            Command::Store(StoreCommand::Record { track, from, explicit }) => {
                assert_eq!(track.descriptor().title, "Y");
                assert_eq!(from.descriptor().unwrap().title, "X");
                assert!(explicit);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_completion_is_a_top_level_command() {
        let args = Args::parse_from(["conductor", "completion", "zsh"]);
        assert!(matches!(args.command, Command::Completion { shell: Shell::Zsh }));
    }

    #[test]
    fn test_partial_from_track_is_rejected() {
        assert!(Args::try_parse_from(["conductor", "next", "--from-title", "X"]).is_err());
    }

    #[test]
    fn test_feedback_needs_exactly_one_verdict() {
        assert!(Args::try_parse_from(["conductor", "feedback", "3"]).is_err());
        assert!(Args::try_parse_from(["conductor", "feedback", "3", "--like", "--dislike"]).is_err());
        assert!(Args::try_parse_from(["conductor", "feedback", "3", "--dislike"]).is_ok());
    }
}
