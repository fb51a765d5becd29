//! Drum analyzer: turns the emitted drum events into per-bar slot grids
//!
//! The grid is built once, after the drum engine finishes, and is read-only
//! for the bass and lead engines. Bucketing works from absolute ticks so
//! re-analyzing previously emitted events reproduces the same grid.

use crate::config::LayerRole;
use crate::drums::DrumEvent;
use crate::timebase::{Timebase, STEPS_PER_BAR};

/// Anchor tags for one 16th-note slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotLabel {
    pub is_kick: bool,
    pub pre_kick: bool,
    pub post_kick: bool,
    pub snare_zone: bool,
    pub bar_start: bool,
    pub bar_end: bool,
    pub fill_zone: bool,
    pub hat_dense: bool,
    pub hat_sparse: bool,
}

/// Per-bar slot labels for the whole pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotGrid {
    bars: Vec<[SlotLabel; STEPS_PER_BAR]>,
}

impl SlotGrid {
    pub fn label(&self, bar: usize, step: usize) -> SlotLabel {
        self.bars[bar][step]
    }

    pub fn bar(&self, bar: usize) -> &[SlotLabel; STEPS_PER_BAR] {
        &self.bars[bar]
    }

    pub fn num_bars(&self) -> usize {
        self.bars.len()
    }
}

/// Absolute tick of a drum event, including its ratchet shift
pub fn event_tick(ev: &DrumEvent, tb: &Timebase) -> i64 {
    tb.step_start_tick(ev.bar, ev.step) as i64
        + ev.micro_offset_ticks as i64
        + ev.ratchet_index as i64 * ev.duration_ticks as i64
}

/// Build the slot grid from the merged drum event stream
///
/// Each event buckets into its nearest 16th step by tick; kicks addition-
/// ally carry their exact tick so the `is_kick` window (± a quarter step)
/// is exact rather than quantised.
pub fn analyze(events: &[DrumEvent], tb: &Timebase) -> SlotGrid {
    let bar_ticks = tb.bar_ticks() as i64;
    let step_ticks = tb.step_ticks() as i64;
    let bars = tb.bars;

    let mut kick_ticks: Vec<Vec<i64>> = vec![Vec::new(); bars];
    let mut snare_steps = vec![[false; STEPS_PER_BAR]; bars];
    let mut hat_counts = vec![[0u32; STEPS_PER_BAR]; bars];

    for ev in events {
        let tick = event_tick(ev, tb).max(0);
        let mut bar = (tick / bar_ticks) as usize;
        let local = tick - bar as i64 * bar_ticks;
        let mut step = ((local as f64 / step_ticks as f64).round() as usize).min(STEPS_PER_BAR);
        if step == STEPS_PER_BAR {
            bar += 1;
            step = 0;
        }
        if bar >= bars {
            continue;
        }
        match ev.role {
            LayerRole::Kick => kick_ticks[bar].push(tick),
            LayerRole::Snare | LayerRole::Clap => snare_steps[bar][step] = true,
            LayerRole::HatClosed | LayerRole::HatOpen => hat_counts[bar][step] += 1,
            LayerRole::Perc => {}
        }
    }

    let mut grid = Vec::with_capacity(bars);
    for bar in 0..bars {
        let mut labels = [SlotLabel::default(); STEPS_PER_BAR];
        let window = step_ticks / 4;

        let kick_here: Vec<bool> = (0..STEPS_PER_BAR)
            .map(|s| {
                let slot_tick = bar as i64 * bar_ticks + s as i64 * step_ticks;
                kick_ticks[bar]
                    .iter()
                    .any(|&k| (k - slot_tick).abs() <= window)
            })
            .collect();

        for (s, label) in labels.iter_mut().enumerate() {
            label.is_kick = kick_here[s];
            label.pre_kick = kick_here[(s + 1) % STEPS_PER_BAR];
            label.post_kick = kick_here[(s + STEPS_PER_BAR - 1) % STEPS_PER_BAR];
            label.snare_zone = (0..=2).any(|d| {
                snare_steps[bar][(s + STEPS_PER_BAR - 1 + d) % STEPS_PER_BAR]
            });
            label.bar_start = s == 0;
            label.bar_end = s == STEPS_PER_BAR - 1;
            label.fill_zone = bar % 4 == 3 && s >= STEPS_PER_BAR - 2;

            let hat_window: u32 = (0..=4)
                .map(|d| hat_counts[bar][(s + STEPS_PER_BAR - 2 + d) % STEPS_PER_BAR])
                .sum();
            label.hat_dense = hat_window >= 3;
            label.hat_sparse = hat_window == 0;
        }
        grid.push(labels);
    }

    SlotGrid { bars: grid }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(role: LayerRole, note: u8, bar: usize, step: usize) -> DrumEvent {
        DrumEvent {
            layer: match role {
                LayerRole::Kick => "kick",
                LayerRole::Snare => "snare",
                LayerRole::Clap => "clap",
                LayerRole::HatClosed => "hat_c",
                LayerRole::HatOpen => "hat_o",
                LayerRole::Perc => "perc",
            }
            .to_string(),
            role,
            note,
            bar,
            step,
            velocity: 100,
            micro_offset_ticks: 0,
            duration_ticks: 120,
            ratchet_index: 0,
        }
    }

    fn four_floor_events(bars: usize) -> Vec<DrumEvent> {
        let mut events = Vec::new();
        for bar in 0..bars {
            for step in [0, 4, 8, 12] {
                events.push(hit(LayerRole::Kick, 36, bar, step));
            }
            for step in [4, 12] {
                events.push(hit(LayerRole::Snare, 38, bar, step));
            }
            for step in (0..16).step_by(2) {
                events.push(hit(LayerRole::HatClosed, 42, bar, step));
            }
        }
        events
    }

    #[test]
    fn test_kick_and_neighbour_labels() {
        let tb = Timebase::new(120.0, 480, 4).unwrap();
        let grid = analyze(&four_floor_events(4), &tb);
        let bar = grid.bar(0);
        assert!(bar[0].is_kick);
        assert!(bar[4].is_kick);
        assert!(!bar[2].is_kick);
        assert!(bar[3].pre_kick);
        assert!(bar[5].post_kick);
        assert!(!bar[6].pre_kick);
    }

    #[test]
    fn test_snare_zone_spans_neighbours() {
        let tb = Timebase::new(120.0, 480, 1).unwrap();
        let grid = analyze(&four_floor_events(1), &tb);
        let bar = grid.bar(0);
        assert!(bar[3].snare_zone);
        assert!(bar[4].snare_zone);
        assert!(bar[5].snare_zone);
        assert!(!bar[6].snare_zone);
    }

    #[test]
    fn test_bar_and_fill_markers() {
        let tb = Timebase::new(120.0, 480, 8).unwrap();
        let grid = analyze(&four_floor_events(8), &tb);
        assert!(grid.bar(0)[0].bar_start);
        assert!(grid.bar(0)[15].bar_end);
        // Fill zone only in bars 3 and 7, steps 14 and 15.
        assert!(grid.bar(3)[14].fill_zone);
        assert!(grid.bar(7)[15].fill_zone);
        assert!(!grid.bar(2)[15].fill_zone);
        assert!(!grid.bar(3)[13].fill_zone);
    }

    #[test]
    fn test_hat_density_window() {
        let tb = Timebase::new(120.0, 480, 1).unwrap();
        // 8th-note hats: any ±2 window sees 3 hat onsets.
        let grid = analyze(&four_floor_events(1), &tb);
        assert!(grid.bar(0)[4].hat_dense);
        assert!(!grid.bar(0)[4].hat_sparse);

        // No hats at all: every slot is sparse.
        let events: Vec<DrumEvent> = four_floor_events(1)
            .into_iter()
            .filter(|e| e.role != LayerRole::HatClosed)
            .collect();
        let grid = analyze(&events, &tb);
        assert!(grid.bar(0)[4].hat_sparse);
        assert!(!grid.bar(0)[4].hat_dense);
    }

    #[test]
    fn test_micro_offset_buckets_to_nearest_step() {
        let tb = Timebase::new(120.0, 480, 1).unwrap();
        let mut ev = hit(LayerRole::Snare, 38, 0, 7);
        // Over half a step late: buckets to step 8.
        ev.micro_offset_ticks = 70;
        let grid = analyze(&[ev], &tb);
        assert!(grid.bar(0)[8].snare_zone);
        assert!(grid.bar(0)[7].snare_zone); // still within ±1 of 8
        assert!(!grid.bar(0)[5].snare_zone);
    }

    #[test]
    fn test_analysis_is_idempotent() {
        let tb = Timebase::new(132.0, 1920, 4).unwrap();
        let events = four_floor_events(4);
        assert_eq!(analyze(&events, &tb), analyze(&events, &tb));
    }
}
