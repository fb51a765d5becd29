//! Micro-timing: swing, beat-bin offsets, aggregate caps, and choke groups
//!
//! Offsets are applied in a fixed order so identical seeds reproduce
//! identical timing: swing first, then the sampled beat bin, then the
//! per-layer aggregate cap.

use std::collections::BTreeMap;

use rand::Rng;

use crate::config::LayerConfig;
use crate::drums::layer::LayerMask;
use crate::rng::{normal_trunc, weighted_index};
use crate::timebase::Timebase;

/// Swing displacement for a step, in ticks
///
/// Swing pushes every odd 16th late; 0.5 is straight time and the
/// configured ceiling of 0.62 is a heavy shuffle.
pub fn swing_offset_ticks(step: usize, swing_percent: f64, step_ticks: u32) -> i32 {
    if step % 2 == 0 {
        return 0;
    }
    ((swing_percent - 0.5) * step_ticks as f64 * 2.0).round() as i32
}

/// Sample a beat-bin micro offset for one onset, in ticks
///
/// Draws a bin from the layer's discrete distribution, adds Gaussian
/// humanisation (`micro_ms` std dev, truncated at 3 sigma), and clamps the
/// result to `beat_bin_cap_ms`.
pub fn sample_bin_offset(layer: &LayerConfig, tb: &Timebase, rng: &mut impl Rng) -> i32 {
    let mut ms = if layer.beat_bins_ms.is_empty() {
        0.0
    } else {
        layer.beat_bins_ms[weighted_index(rng, &layer.beat_bins_probs)]
    };
    if layer.micro_ms > 0.0 {
        ms += normal_trunc(rng, 0.0, layer.micro_ms, -3.0 * layer.micro_ms, 3.0 * layer.micro_ms);
    }
    if layer.beat_bin_cap_ms > 0.0 {
        ms = ms.clamp(-layer.beat_bin_cap_ms, layer.beat_bin_cap_ms);
    }
    tb.ticks_from_ms(ms)
}

/// Clamp the combined swing + bin offset to the per-layer aggregate cap
pub fn cap_micro_offset(offset: i32, cap_ticks: i32) -> i32 {
    if cap_ticks <= 0 {
        return offset;
    }
    offset.clamp(-cap_ticks, cap_ticks)
}

/// Apply choke groups across a bar's final masks
///
/// A layer configured with `choke_with_note` is suppressed at every step
/// where the layer carrying that note has an onset. The choked onset is
/// removed outright before scheduling; there is no duration clipping.
pub fn apply_chokes(
    masks: &mut BTreeMap<String, LayerMask>,
    configs: &BTreeMap<String, LayerConfig>,
) {
    for (name, cfg) in configs {
        let Some(choke_note) = cfg.choke_with_note else {
            continue;
        };
        let Some(choker) = configs
            .iter()
            .find(|(other, c)| c.note == choke_note && *other != name)
            .map(|(other, _)| other.clone())
        else {
            continue;
        };
        let choker_onsets = match masks.get(&choker) {
            Some(m) => m.onsets,
            None => continue,
        };
        if let Some(mask) = masks.get_mut(name) {
            for (step, &choked) in choker_onsets.iter().enumerate() {
                if choked {
                    mask.clear(step);
                }
            }
        }
    }
}
