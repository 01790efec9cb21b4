//! # Integration Tests for Conductor
//!
//! End-to-end tests against file-backed databases: the library across
//! reopen cycles, and the `conductor` binary the way a player would call it.

use anyhow::Result;
use conductor::{Attribute, Conductor, ConductorError, EngineConfig, RuntimeConfig, TrackDescriptor};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn seeded_config() -> EngineConfig {
    EngineConfig {
        seed: Some(5),
        ..EngineConfig::default()
    }
}

fn track(title: &str, artist: &str) -> TrackDescriptor {
    TrackDescriptor::new(title, "Test Album", artist, Some("Sample"))
}

/// A temporary directory with the path of a database that does not exist yet.
fn temp_db() -> Result<(TempDir, PathBuf)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("nested").join("conductor.db");
    Ok((temp_dir, db_path))
}

#[cfg(test)]
mod library_tests {
    use super::*;

    #[test]
    fn test_learning_survives_reopen() -> Result<()> {
        let (_dir, db_path) = temp_db()?;
        let (a, b) = (track("A", "One"), track("B", "One"));

        let mut conductor = Conductor::open(&db_path, seeded_config())?;
        conductor.init_chain(Attribute::TrackId, Attribute::TrackId)?;
        for _ in 0..3 {
            conductor.record_transition(Some(&a), &b, false)?;
        }
        conductor.close()?;
        assert!(db_path.exists());

        let conductor = Conductor::open(&db_path, seeded_config())?;
        assert_eq!(conductor.chains().len(), 1);
        let chain = conductor.chains()[0];
        let edge = conductor.edge_between(chain, Some(&a), &b)?.unwrap();
        assert_eq!(edge.score, 3);
        assert_eq!(conductor.history(10)?.len(), 3);
        Ok(())
    }

    #[test]
    fn test_runtime_config_registers_chains() -> Result<()> {
        let (dir, db_path) = temp_db()?;
        let config_path = dir.path().join("config.json");
        std::fs::write(
            &config_path,
            format!(
                r#"{{
                    "db_path": {},
                    "engine": {{ "max_user_score": 3, "weight_function": "eager", "seed": 1 }},
                    "chains": [
                        {{ "from": "trackid", "to": "trackid" }},
                        {{ "from": "artistid", "to": "artistid" }}
                    ]
                }}"#,
                serde_json::to_string(&db_path)?
            ),
        )?;

        let runtime = RuntimeConfig::load(&config_path)?;
        assert_eq!(runtime.engine.max_user_score, 3);
        let mut conductor = Conductor::from_runtime_config(&runtime)?;
        assert_eq!(conductor.chains().len(), 2);

        // Feedback is clamped to the configured bound.
        let (a, b) = (track("A", "One"), track("B", "Two"));
        for _ in 0..6 {
            conductor.record_transition_like(Some(&a), &b)?;
        }
        for chain in conductor.chains().to_vec() {
            let edge = conductor.edge_between(chain, Some(&a), &b)?.unwrap();
            assert_eq!(edge.user_score, 3);
            assert_eq!(edge.score, 6);
        }
        Ok(())
    }

    #[test]
    fn test_artist_chain_generalizes_to_unheard_tracks() -> Result<()> {
        let (_dir, db_path) = temp_db()?;
        let mut conductor = Conductor::open(&db_path, seeded_config())?;
        conductor.init_chain(Attribute::ArtistId, Attribute::ArtistId)?;

        for title in ["A1", "A2"] {
            conductor.touch_track(&track(title, "Alpha"))?;
        }
        for title in ["B1", "B2", "B3"] {
            conductor.touch_track(&track(title, "Beta"))?;
        }
        for _ in 0..5 {
            conductor.record_transition(Some(&track("A1", "Alpha")), &track("B1", "Beta"), false)?;
        }

        // B2 was never played after A1, but shares B1's artist.
        let weights = conductor.get_transitions_from(Some(&track("A1", "Alpha")))?;
        let b2 = conductor.find_track(&track("B2", "Beta"))?.unwrap().id;
        let a2 = conductor.find_track(&track("A2", "Alpha"))?.unwrap().id;
        assert!(weights[&b2] > weights[&a2] * 10.0);
        Ok(())
    }

    #[test]
    fn test_empty_catalog() -> Result<()> {
        let (_dir, db_path) = temp_db()?;
        let mut conductor = Conductor::open(&db_path, seeded_config())?;
        let err = conductor.choose_next_track(None).unwrap_err();
        assert!(ConductorError::EmptyDomain.matches(&err));
        Ok(())
    }
}

#[cfg(test)]
mod cli_tests {
    use super::*;

    fn conductor_cmd(dir: &Path, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_conductor"))
            .arg("--db")
            .arg(dir.join("cli.db"))
            .arg("--config")
            .arg(dir.join("missing-config.json"))
            .args(args)
            .env_remove("RUST_LOG")
            .output()
            .expect("Failed to run conductor")
    }

    fn stdout(output: &Output) -> String {
        String::from_utf8_lossy(&output.stdout).to_string()
    }

    const BLUE: &[&str] = &["--title", "Blue", "--album", "Cold", "--artist", "Colors"];
    const FROM_BLUE: &[&str] = &["--from-title", "Blue", "--from-album", "Cold", "--from-artist", "Colors"];
    const CYAN: &[&str] = &["--title", "Cyan", "--album", "Cold", "--artist", "Colors"];

    #[test]
    fn test_cli_help_displays_correctly() {
        let dir = TempDir::new().unwrap();
        let output = conductor_cmd(dir.path(), &["--help"]);
        assert!(output.status.success());
        let text = stdout(&output);
        assert!(text.contains("conductor"));
        assert!(text.contains("transitions"));
    }

    #[test]
    fn test_cli_next_on_empty_catalog_fails_cleanly() {
        let dir = TempDir::new().unwrap();
        let output = conductor_cmd(dir.path(), &["next"]);
        assert!(!output.status.success());
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("catalog is empty"), "stderr: {stderr}");
        assert!(!stderr.contains("panicked"));
    }

    #[test]
    fn test_cli_record_and_feedback() {
        let dir = TempDir::new().unwrap();
        assert!(conductor_cmd(dir.path(), &[&["touch"][..], BLUE].concat()).status.success());

        let output = conductor_cmd(dir.path(), &[&["record"][..], CYAN, FROM_BLUE].concat());
        assert!(output.status.success());
        let handle = stdout(&output).trim().to_string();
        assert!(handle.parse::<i64>().is_ok(), "handle was {handle:?}");

        let output = conductor_cmd(dir.path(), &["feedback", &handle, "--like"]);
        assert!(output.status.success());
        assert!(stdout(&output).contains("Blue -> Cyan"));

        let output = conductor_cmd(dir.path(), &["history", "--limit", "5"]);
        assert!(stdout(&output).contains("+1"));

        let output = conductor_cmd(dir.path(), &["feedback", "9999", "--dislike"]);
        assert!(!output.status.success());
    }

    #[test]
    fn test_cli_next_picks_the_other_track() {
        let dir = TempDir::new().unwrap();
        conductor_cmd(dir.path(), &[&["touch"][..], BLUE].concat());
        conductor_cmd(dir.path(), &[&["touch"][..], CYAN].concat());

        let output = conductor_cmd(dir.path(), &[&["next"][..], FROM_BLUE].concat());
        assert!(output.status.success());
        assert!(stdout(&output).contains("Cyan"));
    }

    #[test]
    fn test_cli_transitions_json() {
        let dir = TempDir::new().unwrap();
        conductor_cmd(dir.path(), &[&["record"][..], CYAN, FROM_BLUE].concat());

        let output = conductor_cmd(dir.path(), &[&["transitions", "--json"][..], FROM_BLUE].concat());
        assert!(output.status.success());
        let weights: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        let weights = weights.as_array().unwrap();
        assert_eq!(weights.len(), 1);
        assert!(weights[0]["weight"].as_f64().unwrap() > 1.0);
    }

    #[test]
    fn test_cli_chain_management() {
        let dir = TempDir::new().unwrap();
        let output = conductor_cmd(dir.path(), &["chain", "add", "artistid", "genreid"]);
        assert!(output.status.success());

        let listed = stdout(&conductor_cmd(dir.path(), &["chain", "list"]));
        assert!(listed.contains("trackid -> trackid"));
        assert!(listed.contains("artistid -> genreid"));

        let output = conductor_cmd(dir.path(), &["chain", "add", "tempo", "trackid"]);
        assert!(!output.status.success());

        let output = conductor_cmd(dir.path(), &["chain", "remove", "artistid", "genreid"]);
        assert!(stdout(&output).contains("Removed"));
    }

    #[test]
    fn test_cli_completion_needs_no_database() {
        let dir = TempDir::new().unwrap();
        let output = conductor_cmd(dir.path(), &["completion", "bash"]);
        assert!(output.status.success());
        assert!(stdout(&output).contains("conductor"));
        assert!(!dir.path().join("cli.db").exists());
    }
}
