//! Timed event streams and the output merger
//!
//! Every engine renders to an absolute-tick [`TrackStream`]; the merger
//! sorts each stream with a total, deterministic order and clips events to
//! the pattern boundary. Delta encoding happens in the MIDI writer.

/// Note event kind; the variant order is the same-tick tie-break
/// (note-offs sort before note-ons so retriggers never swallow each other)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventKind {
    NoteOff,
    NoteOn,
}

/// One channel-voice event at an absolute tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedEvent {
    pub tick: u32,
    pub channel: u8,
    pub kind: EventKind,
    pub pitch: u8,
    pub velocity: u8,
}

/// An engine's output: a named, single-channel event stream
#[derive(Debug, Clone)]
pub struct TrackStream {
    pub name: String,
    pub channel: u8,
    pub events: Vec<TimedEvent>,
}

impl TrackStream {
    pub fn new(name: impl Into<String>, channel: u8) -> Self {
        Self {
            name: name.into(),
            channel,
            events: Vec::new(),
        }
    }

    /// Add a note as an on/off pair, clipped to `[0, total_ticks]`
    ///
    /// `tick` may be negative when a micro offset pulls an onset ahead of
    /// the pattern start; it clamps to zero. Zero-length notes after
    /// clipping are discarded.
    pub fn add_note(&mut self, tick: i64, pitch: i32, velocity: u8, duration: u32, total_ticks: u32) {
        let pitch = pitch.clamp(0, 127) as u8;
        let velocity = velocity.clamp(1, 127);
        let on = tick.clamp(0, total_ticks.saturating_sub(1) as i64) as u32;
        let off = (on + duration.max(1)).min(total_ticks);
        if off <= on {
            return;
        }
        self.events.push(TimedEvent {
            tick: on,
            channel: self.channel,
            kind: EventKind::NoteOn,
            pitch,
            velocity,
        });
        self.events.push(TimedEvent {
            tick: off,
            channel: self.channel,
            kind: EventKind::NoteOff,
            pitch,
            velocity: 0,
        });
    }

    /// Sort into the output order: `(tick, note_off first, pitch)`
    ///
    /// The sort is stable, so equal keys keep insertion order and the
    /// stream is reproducible for identical inputs.
    pub fn finish(&mut self) {
        self.events
            .sort_by_key(|e| (e.tick, e.kind, e.pitch));
    }

    /// Last tick in the stream (0 when empty)
    pub fn end_tick(&self) -> u32 {
        self.events.last().map_or(0, |e| e.tick)
    }
}

/// Finish every stream and order tracks deterministically by name
pub fn merge_streams(mut streams: Vec<TrackStream>) -> Vec<TrackStream> {
    for s in &mut streams {
        s.finish();
    }
    streams.sort_by(|a, b| a.name.cmp(&b.name));
    streams
}
