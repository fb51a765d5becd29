//! Per-bar pattern metrics: entrainment, syncopation, hat density, micro spread
//!
//! Metrics are computed on each bar's final masks and events, and are
//! read-only inputs to the feedback controller for the following bar.

use std::collections::BTreeMap;

use crate::config::LayerRole;
use crate::drums::layer::{DrumEvent, LayerMask};
use crate::timebase::{Timebase, STEPS_PER_BAR};

/// Snapshot of one bar's measured character
#[derive(Debug, Clone, PartialEq)]
pub struct BarMetrics {
    /// Entrainment: lag-4 autocorrelation of the union onset mask, [0, 1]
    pub e: f64,
    /// Syncopation: weak-vs-strong onset balance, [0, 1]
    pub s: f64,
    /// Hat density: fraction of 16th steps with any hat onset
    pub h: f64,
    /// Mean absolute micro offset per layer, ms
    pub t_ms: BTreeMap<String, f64>,
    /// Binary entropy of the union onset density (CSV diagnostics)
    pub entropy: f64,
}

/// Compute the metrics for one bar
pub fn compute_metrics(
    masks: &BTreeMap<String, LayerMask>,
    bar_events: &[DrumEvent],
    tb: &Timebase,
) -> BarMetrics {
    let mut union = [false; STEPS_PER_BAR];
    let mut hats = [false; STEPS_PER_BAR];
    for (name, mask) in masks {
        let role = LayerRole::for_name(name);
        for step in mask.onset_steps() {
            union[step] = true;
            if role.is_hat() {
                hats[step] = true;
            }
        }
    }

    BarMetrics {
        e: entrainment(&union),
        s: syncopation(&union),
        h: hats.iter().filter(|&&on| on).count() as f64 / STEPS_PER_BAR as f64,
        t_ms: micro_spread(bar_events, tb),
        entropy: binary_entropy(
            union.iter().filter(|&&on| on).count() as f64 / STEPS_PER_BAR as f64,
        ),
    }
}

/// Normalized autocorrelation of the union mask at the quarter-note period
///
/// A bar with at most one onset reinforces the pulse and contradicts
/// nothing; it reads as fully entrained so the guard has nothing to rescue.
pub fn entrainment(union: &[bool; STEPS_PER_BAR]) -> f64 {
    let count = union.iter().filter(|&&on| on).count();
    if count <= 1 {
        return 1.0;
    }
    let matched = (0..STEPS_PER_BAR)
        .filter(|&i| union[i] && union[(i + 4) % STEPS_PER_BAR])
        .count();
    matched as f64 / count as f64
}

/// Weighted weak-minus-strong onset balance, rescaled to [0, 1]
///
/// Strong positions are the quarters (weight 1), the offbeat 8ths count
/// half, and 16th offsets count full weak weight.
pub fn syncopation(union: &[bool; STEPS_PER_BAR]) -> f64 {
    let mut strong = 0.0;
    let mut weak = 0.0;
    let mut total = 0usize;
    for (step, &on) in union.iter().enumerate() {
        if !on {
            continue;
        }
        total += 1;
        match step % 4 {
            0 => strong += 1.0,
            2 => weak += 0.5,
            _ => weak += 1.0,
        }
    }
    if total == 0 {
        return 0.0;
    }
    let raw = (weak - strong) / total as f64;
    ((raw + 1.0) / 2.0).clamp(0.0, 1.0)
}

fn micro_spread(bar_events: &[DrumEvent], tb: &Timebase) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for ev in bar_events {
        let entry = sums.entry(ev.layer.clone()).or_insert((0.0, 0));
        entry.0 += tb.ms_from_ticks(ev.micro_offset_ticks).abs();
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(layer, (sum, n))| (layer, sum / n as f64))
        .collect()
}

fn binary_entropy(p: f64) -> f64 {
    if p <= 0.0 || p >= 1.0 {
        return 0.0;
    }
    -(p * p.log2() + (1.0 - p) * (1.0 - p).log2())
}
