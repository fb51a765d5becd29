//! MIDI export functionality
//!
//! Serialises the merged track streams to a Standard MIDI File (format 1).
//! Track 0 carries the tempo and time-signature meta events; every engine
//! stream becomes one named channel track. Only note timing, pitch, and
//! velocity exist at this layer.

use std::path::Path;

use midly::{
    num::{u15, u24, u28, u4, u7},
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind,
};

use crate::error::{GrooveError, Result};
use crate::events::{EventKind, TrackStream};
use crate::timebase::Timebase;

/// Assemble the in-memory SMF for a set of finished streams
///
/// The streams must already be sorted (see [`TrackStream::finish`]); this
/// function only delta-encodes.
pub fn build_smf<'a>(tb: &Timebase, streams: &'a [TrackStream]) -> Smf<'a> {
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(tb.ppq)),
    ));

    // Track 0: tempo map.
    let mut meta = Vec::with_capacity(3);
    meta.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tb.micros_per_quarter()))),
    });
    meta.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::TimeSignature(4, 2, 24, 8)),
    });
    meta.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(meta);

    for stream in streams {
        let mut track = Vec::with_capacity(stream.events.len() + 2);
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(stream.name.as_bytes())),
        });

        let mut last_tick = 0u32;
        for ev in &stream.events {
            let delta = ev.tick - last_tick;
            last_tick = ev.tick;
            let message = match ev.kind {
                EventKind::NoteOn => MidiMessage::NoteOn {
                    key: u7::new(ev.pitch),
                    vel: u7::new(ev.velocity),
                },
                EventKind::NoteOff => MidiMessage::NoteOff {
                    key: u7::new(ev.pitch),
                    vel: u7::new(0),
                },
            };
            track.push(TrackEvent {
                delta: u28::new(delta),
                kind: TrackEventKind::Midi {
                    channel: u4::new(ev.channel),
                    message,
                },
            });
        }
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });
        smf.tracks.push(track);
    }
    smf
}

/// Serialise to bytes (the determinism law compares these)
pub fn write_midi_bytes(tb: &Timebase, streams: &[TrackStream]) -> Result<Vec<u8>> {
    let smf = build_smf(tb, streams);
    let mut bytes = Vec::new();
    smf.write_std(&mut bytes)
        .map_err(|e| GrooveError::Midi(e.to_string()))?;
    Ok(bytes)
}

/// Write a MIDI file to disk
pub fn write_midi(path: &Path, tb: &Timebase, streams: &[TrackStream]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let smf = build_smf(tb, streams);
    smf.save(path).map_err(|e| GrooveError::Io(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_with_notes() -> TrackStream {
        let mut s = TrackStream::new("drums", 9);
        s.add_note(0, 36, 110, 240, 7680);
        s.add_note(1920, 36, 110, 240, 7680);
        s.finish();
        s
    }

    #[test]
    fn test_header_and_track_count() {
        let tb = Timebase::new(120.0, 480, 1).unwrap();
        let streams = vec![stream_with_notes()];
        let smf = build_smf(&tb, &streams);
        assert_eq!(smf.header.format, Format::Parallel);
        assert_eq!(smf.header.timing, Timing::Metrical(u15::new(480)));
        // Tempo track plus one stream track.
        assert_eq!(smf.tracks.len(), 2);
    }

    #[test]
    fn test_tempo_meta_value() {
        let tb = Timebase::new(132.0, 1920, 1).unwrap();
        let smf = build_smf(&tb, &[]);
        let tempo = smf.tracks[0].iter().find_map(|ev| match ev.kind {
            TrackEventKind::Meta(MetaMessage::Tempo(t)) => Some(t.as_int()),
            _ => None,
        });
        assert_eq!(tempo, Some(454_545));
    }

    #[test]
    fn test_delta_encoding() {
        let tb = Timebase::new(120.0, 480, 1).unwrap();
        let streams = vec![stream_with_notes()];
        let smf = build_smf(&tb, &streams);
        let deltas: Vec<u32> = smf.tracks[1]
            .iter()
            .filter(|ev| matches!(ev.kind, TrackEventKind::Midi { .. }))
            .map(|ev| ev.delta.as_int())
            .collect();
        // on(0), off(+240), on(+1680), off(+240)
        assert_eq!(deltas, vec![0, 240, 1680, 240]);
    }

    #[test]
    fn test_bytes_are_reproducible() {
        let tb = Timebase::new(120.0, 480, 1).unwrap();
        let streams = vec![stream_with_notes()];
        let a = write_midi_bytes(&tb, &streams).unwrap();
        let b = write_midi_bytes(&tb, &streams).unwrap();
        assert!(!a.is_empty());
        assert_eq!(a, b);
    }
}
