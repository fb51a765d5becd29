//! The full generative pipeline
//!
//! A strict dependency chain: drums first, then the analyzed slot grid,
//! then bass, then lead, then the merged output streams. Each stage gets a
//! read-only view of its predecessors; the grid is frozen before the bass
//! reads it.

use log::debug;

use crate::analyzer::{self, SlotGrid};
use crate::bass::{BassEngine, BassOutput};
use crate::config::Config;
use crate::drums::{DrumEngine, DrumOutput};
use crate::error::Result;
use crate::events::{merge_streams, TrackStream};
use crate::lead::{LeadEngine, LeadOutput};
use crate::timebase::Timebase;

/// MIDI channels per engine stream
pub const DRUM_CHANNEL: u8 = 9;
pub const BASS_CHANNEL: u8 = 0;
pub const LEAD_CHANNEL: u8 = 1;

/// Recovered-condition counters attached to every generation result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// Controller rescue bars taken
    pub rescue_bars: usize,
    /// Bass constraint relaxation level reached (0 = fully constrained)
    pub bass_relaxations: usize,
    /// Lead events dropped by the slot search
    pub dropped_lead_events: usize,
    pub warnings: Vec<String>,
}

/// Everything one generation run produces
#[derive(Debug)]
pub struct GrooveResult {
    pub timebase: Timebase,
    pub drums: DrumOutput,
    pub slot_grid: SlotGrid,
    pub bass: Option<BassOutput>,
    pub lead: Option<LeadOutput>,
    /// Merged, sorted output streams ready for MIDI serialisation
    pub tracks: Vec<TrackStream>,
    pub diagnostics: Diagnostics,
}

impl GrooveResult {
    /// The streams belonging to one engine, by track name
    pub fn stream(&self, name: &str) -> Option<&TrackStream> {
        self.tracks.iter().find(|t| t.name == name)
    }
}

/// Run the whole pipeline for a validated configuration
pub fn generate(config: &Config) -> Result<GrooveResult> {
    config.validate()?;
    let tb = config.timebase()?;

    let drums = DrumEngine::new(config, tb).run()?;
    let slot_grid = analyzer::analyze(&drums.events, &tb);

    let bass = if config.mode.wants_bass() {
        Some(BassEngine::new(config, tb, &slot_grid).run()?)
    } else {
        None
    };

    let lead = if config.mode.wants_lead() {
        let bass_notes = bass.as_ref().map(|b| b.notes.as_slice());
        Some(LeadEngine::new(config, tb, &slot_grid, bass_notes).run()?)
    } else {
        None
    };

    let mut diagnostics = Diagnostics {
        rescue_bars: drums.rescue_bars,
        bass_relaxations: bass.as_ref().map_or(0, |b| b.relaxations),
        dropped_lead_events: lead.as_ref().map_or(0, |l| l.dropped),
        warnings: Vec::new(),
    };
    if diagnostics.bass_relaxations > 0 {
        diagnostics.warnings.push(format!(
            "bass constraints relaxed to level {}",
            diagnostics.bass_relaxations
        ));
    }
    if diagnostics.dropped_lead_events > 0 {
        diagnostics.warnings.push(format!(
            "{} lead events dropped by slot search",
            diagnostics.dropped_lead_events
        ));
    }
    debug!(
        "generated {} bars: {} drum events, {} bass notes, {} lead notes",
        tb.bars,
        drums.events.len(),
        bass.as_ref().map_or(0, |b| b.notes.len()),
        lead.as_ref().map_or(0, |l| l.notes.len()),
    );

    let tracks = build_streams(&tb, &drums, bass.as_ref(), lead.as_ref());

    Ok(GrooveResult {
        timebase: tb,
        drums,
        slot_grid,
        bass,
        lead,
        tracks,
        diagnostics,
    })
}

fn build_streams(
    tb: &Timebase,
    drums: &DrumOutput,
    bass: Option<&BassOutput>,
    lead: Option<&LeadOutput>,
) -> Vec<TrackStream> {
    let total = tb.total_ticks();
    let step_ticks = tb.step_ticks();
    let mut streams = Vec::new();

    let mut drum_stream = TrackStream::new("drums", DRUM_CHANNEL);
    for ev in &drums.events {
        let tick = analyzer::event_tick(ev, tb);
        drum_stream.add_note(tick, ev.note as i32, ev.velocity, ev.duration_ticks, total);
    }
    streams.push(drum_stream);

    if let Some(bass) = bass {
        let mut bass_stream = TrackStream::new("bass", BASS_CHANNEL);
        for n in &bass.notes {
            let tick = tb.step_start_tick(n.bar, n.step) as i64;
            bass_stream.add_note(
                tick,
                n.pitch as i32,
                n.velocity,
                n.duration_steps * step_ticks,
                total,
            );
        }
        streams.push(bass_stream);
    }

    if let Some(lead) = lead {
        let mut lead_stream = TrackStream::new("lead", LEAD_CHANNEL);
        for n in &lead.notes {
            let tick = tb.step_start_tick(n.bar, n.step) as i64;
            lead_stream.add_note(
                tick,
                n.pitch as i32,
                n.velocity,
                n.duration_steps * step_ticks,
                total,
            );
        }
        streams.push(lead_stream);
    }

    merge_streams(streams)
}
