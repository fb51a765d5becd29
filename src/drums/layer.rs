//! Layer masks, base mask construction, and step-gate conditions

use std::collections::BTreeMap;

use rand::Rng;

use crate::config::{LayerConfig, LayerRole, StepCondition};
use crate::euclid::{euclidean_mask, rotate_mask};
use crate::rng::bernoulli;
use crate::timebase::STEPS_PER_BAR;

/// One bar of onsets and velocities for a single layer
///
/// Created by the step core, mutated by conditions, the probability gate,
/// and the density clamp; frozen before micro-timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerMask {
    pub onsets: [bool; STEPS_PER_BAR],
    pub velocity: [u8; STEPS_PER_BAR],
}

impl LayerMask {
    pub fn empty() -> Self {
        Self {
            onsets: [false; STEPS_PER_BAR],
            velocity: [0; STEPS_PER_BAR],
        }
    }

    pub fn set(&mut self, step: usize, velocity: u8) {
        self.onsets[step] = true;
        self.velocity[step] = velocity;
    }

    pub fn clear(&mut self, step: usize) {
        self.onsets[step] = false;
        self.velocity[step] = 0;
    }

    pub fn onset_count(&self) -> usize {
        self.onsets.iter().filter(|&&on| on).count()
    }

    pub fn onset_steps(&self) -> impl Iterator<Item = usize> + '_ {
        (0..STEPS_PER_BAR).filter(move |&s| self.onsets[s])
    }
}

/// A scheduled drum hit, after micro-timing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrumEvent {
    pub layer: String,
    pub role: LayerRole,
    pub note: u8,
    pub bar: usize,
    pub step: usize,
    pub velocity: u8,
    pub micro_offset_ticks: i32,
    pub duration_ticks: u32,
    /// Position within a ratchet burst; 0 for plain hits
    pub ratchet_index: u8,
}

/// Build a layer's base mask for one bar
///
/// Euclidean distribution, rotated by the initial rotation plus the
/// accumulated drift, then optionally restricted to offbeat 8ths.
pub fn base_mask(layer: &LayerConfig, rotation_accum: f64) -> [bool; STEPS_PER_BAR] {
    let mut mask_vec = euclidean_mask(layer.fills, STEPS_PER_BAR);
    rotate_mask(&mut mask_vec, layer.rot + rotation_accum.round() as i32);

    let mut mask = [false; STEPS_PER_BAR];
    for (i, &on) in mask_vec.iter().enumerate() {
        mask[i] = on;
    }

    if layer.offbeats_only {
        for (s, slot) in mask.iter_mut().enumerate() {
            if s % 4 != 2 {
                *slot = false;
            }
        }
    }
    mask
}

/// Run the condition stack over a mask, in place
///
/// `prev_bar` holds the previous bar's final masks for every layer; PRE and
/// NOT_PRE look up the referenced layer there. Bar 0 has no predecessor, so
/// PRE removes and NOT_PRE keeps.
pub fn apply_conditions(
    mask: &mut [bool; STEPS_PER_BAR],
    conditions: &[StepCondition],
    bar: usize,
    prev_bar: Option<&BTreeMap<String, LayerMask>>,
    rng: &mut impl Rng,
) {
    for step in 0..STEPS_PER_BAR {
        if !mask[step] {
            continue;
        }
        for cond in conditions {
            let keep = match cond {
                StepCondition::Prob { p } => bernoulli(rng, *p),
                StepCondition::Pre { layer } => prev_onset(prev_bar, layer, step),
                StepCondition::NotPre { layer } => !prev_onset(prev_bar, layer, step),
                StepCondition::Fill => bar % 4 == 3,
                StepCondition::EveryN { n, offset } => (bar as u32 + offset) % n == 0,
            };
            if !keep {
                mask[step] = false;
                break;
            }
        }
    }
}

fn prev_onset(prev_bar: Option<&BTreeMap<String, LayerMask>>, layer: &str, step: usize) -> bool {
    prev_bar
        .and_then(|masks| masks.get(layer))
        .map_or(false, |m| m.onsets[step])
}
