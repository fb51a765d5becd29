//! Seed project persistence
//!
//! A seed project is a self-describing directory snapshot: the input
//! configuration, a metadata descriptor, and the generated MIDI assets.
//! All asset paths are relative to the seed directory so a project can be
//! moved or archived as a unit.

use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::{Config, EngineMode};
use crate::error::{GrooveError, Result};
use crate::midi::write_midi;
use crate::pipeline::GrooveResult;

/// One generated asset inside a seed directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub role: String,
    pub kind: String,
    /// Relative to the seed directory
    pub path: String,
    pub description: String,
}

/// The `metadata.json` descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedMetadata {
    pub seed_id: String,
    pub engine_mode: EngineMode,
    pub bpm: f64,
    pub bars: usize,
    pub ppq: u16,
    pub rng_seed: u64,
    pub tags: Vec<String>,
    pub summary: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub parent_seed_id: Option<String>,
    /// Always `drums/main.mid`
    pub render_path: String,
    pub assets: Vec<AssetRecord>,
}

/// Optional provenance attached when writing a seed project
#[derive(Debug, Clone, Default)]
pub struct SeedProvenance {
    pub prompt: Option<String>,
    pub parent_seed_id: Option<String>,
}

/// Write a complete seed project under `seeds_root/<seed_id>/`
///
/// Layout: `config.json`, `metadata.json`, `drums/main.mid`, and when the
/// engines ran, `bass/main.mid` and `leads/variants/take_01.mid`.
pub fn write_seed_project(
    seeds_root: &Path,
    seed_id: &str,
    config: &Config,
    result: &GrooveResult,
    provenance: SeedProvenance,
) -> Result<SeedMetadata> {
    if seed_id.is_empty() || seed_id.contains('/') || seed_id.contains('\\') {
        return Err(GrooveError::InvalidConfig(format!(
            "seed id '{}' is not a valid directory name",
            seed_id
        )));
    }
    let dir = seeds_root.join(seed_id);
    std::fs::create_dir_all(&dir)?;

    std::fs::write(dir.join("config.json"), config.to_json()?)?;

    let mut assets = Vec::new();
    write_stream_asset(
        &dir,
        result,
        "drums",
        "drums/main.mid",
        "generated drum pattern",
        &mut assets,
    )?;
    if result.bass.is_some() {
        write_stream_asset(
            &dir,
            result,
            "bass",
            "bass/main.mid",
            "generated bass line",
            &mut assets,
        )?;
    }
    if result.lead.is_some() {
        write_stream_asset(
            &dir,
            result,
            "lead",
            "leads/variants/take_01.mid",
            "generated lead take",
            &mut assets,
        )?;
    }

    let metadata = SeedMetadata {
        seed_id: seed_id.to_string(),
        engine_mode: config.mode,
        bpm: config.bpm,
        bars: config.bars,
        ppq: config.ppq,
        rng_seed: config.seed,
        tags: config.tags.clone(),
        summary: summarise(config, result),
        prompt: provenance.prompt,
        parent_seed_id: provenance.parent_seed_id,
        render_path: "drums/main.mid".to_string(),
        assets,
    };
    let json = serde_json::to_string_pretty(&metadata)
        .map_err(|e| GrooveError::Io(e.to_string()))?;
    std::fs::write(dir.join("metadata.json"), json)?;

    debug!("seed project written to {}", dir.display());
    Ok(metadata)
}

fn write_stream_asset(
    dir: &Path,
    result: &GrooveResult,
    stream_name: &str,
    rel_path: &str,
    description: &str,
    assets: &mut Vec<AssetRecord>,
) -> Result<()> {
    let Some(stream) = result.stream(stream_name) else {
        return Ok(());
    };
    let path: PathBuf = dir.join(rel_path);
    write_midi(&path, &result.timebase, std::slice::from_ref(stream))?;
    assets.push(AssetRecord {
        role: stream_name.to_string(),
        kind: "midi".to_string(),
        path: rel_path.to_string(),
        description: description.to_string(),
    });
    Ok(())
}

fn summarise(config: &Config, result: &GrooveResult) -> String {
    let mut parts = vec![format!(
        "{} bars at {} bpm, {} drum events",
        config.bars,
        config.bpm,
        result.drums.events.len()
    )];
    if let Some(bass) = &result.bass {
        parts.push(format!("{} bass notes", bass.notes.len()));
    }
    if let Some(lead) = &result.lead {
        parts.push(format!("{} lead notes", lead.notes.len()));
    }
    if !result.diagnostics.warnings.is_empty() {
        parts.push(result.diagnostics.warnings.join("; "));
    }
    parts.join(", ")
}
