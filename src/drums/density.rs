//! Density clamping and the post-schedule accent pass

use rand::Rng;

use crate::config::{AccentConfig, AccentPlacement};
use crate::drums::layer::LayerMask;
use crate::rng::bernoulli;
use crate::timebase::STEPS_PER_BAR;

/// Local weight of a step: how close it sits to the bar's kick onsets
///
/// Each kick contributes `1 - d/16` where `d` is the circular step
/// distance. Steps far from every kick score low ("voids").
pub fn local_weight(step: usize, kick_mask: &LayerMask) -> f64 {
    kick_mask
        .onset_steps()
        .map(|k| {
            let d = circular_distance(step, k);
            1.0 - d as f64 / STEPS_PER_BAR as f64
        })
        .sum()
}

fn circular_distance(a: usize, b: usize) -> usize {
    let d = a.abs_diff(b);
    d.min(STEPS_PER_BAR - d)
}

/// Clamp a layer's onset count into `[target - tol, target + tol]` of 16
///
/// Overfull bars remove onsets from the lowest-weight steps first (voids
/// thin before the pocket); underfull bars add onsets back into the
/// lowest-weight vacant steps of the base mask, so the clamp can only
/// restore onsets the conditions removed, never invent new positions.
pub fn clamp_density(
    mask: &mut LayerMask,
    base: &[bool; STEPS_PER_BAR],
    kick_mask: &LayerMask,
    target: f64,
    tol: f64,
    base_velocity: u8,
) {
    let lo = ((target - tol) * STEPS_PER_BAR as f64).round().max(0.0) as usize;
    let hi = ((target + tol) * STEPS_PER_BAR as f64).round() as usize;
    let mut count = mask.onset_count();

    if count > hi {
        let mut candidates: Vec<usize> = mask.onset_steps().collect();
        candidates.sort_by(|&a, &b| {
            local_weight(a, kick_mask)
                .partial_cmp(&local_weight(b, kick_mask))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });
        for step in candidates {
            if count <= hi {
                break;
            }
            mask.clear(step);
            count -= 1;
        }
    } else if count < lo {
        let mut vacant: Vec<usize> = (0..STEPS_PER_BAR)
            .filter(|&s| base[s] && !mask.onsets[s])
            .collect();
        vacant.sort_by(|&a, &b| {
            local_weight(a, kick_mask)
                .partial_cmp(&local_weight(b, kick_mask))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });
        for step in vacant {
            if count >= lo {
                break;
            }
            mask.set(step, base_velocity);
            count += 1;
        }
    }
}

/// Thin onsets that coincide with kicks
///
/// Runs after the clamp; each onset sharing a step with a kick is removed
/// with probability `thin_bias`.
pub fn thin_near_kicks(
    mask: &mut LayerMask,
    kick_mask: &LayerMask,
    thin_bias: f64,
    rng: &mut impl Rng,
) {
    for step in 0..STEPS_PER_BAR {
        if mask.onsets[step] && kick_mask.onsets[step] && bernoulli(rng, thin_bias) {
            mask.clear(step);
        }
    }
}

/// Post-schedule accent pass: raises velocities, never moves events
pub fn apply_accents(mask: &mut LayerMask, accent: &AccentConfig, prob: f64, rng: &mut impl Rng) {
    for step in 0..STEPS_PER_BAR {
        if !mask.onsets[step] {
            continue;
        }
        let p = match accent.placement {
            AccentPlacement::Random => prob,
            AccentPlacement::OffbeatFocused => {
                if step % 4 == 0 {
                    prob * 0.5
                } else {
                    (prob * 1.5).min(1.0)
                }
            }
            AccentPlacement::DownbeatFocused => {
                if step % 4 == 0 {
                    (prob * 1.5).min(1.0)
                } else {
                    prob * 0.5
                }
            }
        };
        if bernoulli(rng, p) {
            let boosted = (mask.velocity[step] as f64 * accent.gain).round() as i64;
            mask.velocity[step] = boosted.clamp(1, 127) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::derive_rng;

    fn four_on_floor() -> LayerMask {
        let mut m = LayerMask::empty();
        for s in [0, 4, 8, 12] {
            m.set(s, 110);
        }
        m
    }

    #[test]
    fn test_local_weight_peaks_on_kick() {
        let kick = four_on_floor();
        assert!(local_weight(0, &kick) > local_weight(2, &kick));
    }

    #[test]
    fn test_clamp_removes_down_to_ceiling() {
        let kick = four_on_floor();
        let base = [true; STEPS_PER_BAR];
        let mut mask = LayerMask::empty();
        for s in 0..16 {
            mask.set(s, 90);
        }
        clamp_density(&mut mask, &base, &kick, 0.5, 0.0, 90);
        assert_eq!(mask.onset_count(), 8);
    }

    #[test]
    fn test_clamp_adds_back_only_within_base() {
        let kick = four_on_floor();
        let mut base = [false; STEPS_PER_BAR];
        for s in (0..16).step_by(2) {
            base[s] = true;
        }
        let mut mask = LayerMask::empty();
        mask.set(0, 90);
        clamp_density(&mut mask, &base, &kick, 0.5, 0.0, 90);
        assert_eq!(mask.onset_count(), 8);
        for s in mask.onset_steps() {
            assert!(base[s]);
        }
    }

    #[test]
    fn test_clamp_leaves_in_range_alone() {
        let kick = four_on_floor();
        let base = [true; STEPS_PER_BAR];
        let mut mask = four_on_floor();
        clamp_density(&mut mask, &base, &kick, 0.25, 0.05, 110);
        assert_eq!(mask.onset_count(), 4);
    }

    #[test]
    fn test_thinning_only_touches_kick_steps() {
        let kick = four_on_floor();
        let mut mask = LayerMask::empty();
        for s in 0..16 {
            mask.set(s, 90);
        }
        let mut rng = derive_rng(2, "thin", 0, 0);
        thin_near_kicks(&mut mask, &kick, 1.0, &mut rng);
        for s in [0, 4, 8, 12] {
            assert!(!mask.onsets[s]);
        }
        for s in [1, 2, 3, 5, 6, 7] {
            assert!(mask.onsets[s]);
        }
    }

    #[test]
    fn test_accents_raise_but_never_move() {
        let mut mask = four_on_floor();
        let accent = AccentConfig {
            prob: 1.0,
            gain: 1.2,
            placement: AccentPlacement::Random,
        };
        let mut rng = derive_rng(2, "accent", 0, 0);
        apply_accents(&mut mask, &accent, 1.0, &mut rng);
        assert_eq!(mask.onset_count(), 4);
        for s in [0, 4, 8, 12] {
            assert_eq!(mask.velocity[s], 132u8.min(127));
        }
    }

    #[test]
    fn test_accent_velocity_saturates_at_127() {
        let mut mask = LayerMask::empty();
        mask.set(0, 120);
        let accent = AccentConfig {
            prob: 1.0,
            gain: 2.0,
            placement: AccentPlacement::DownbeatFocused,
        };
        let mut rng = derive_rng(2, "accent", 0, 1);
        apply_accents(&mut mask, &accent, 1.0, &mut rng);
        assert_eq!(mask.velocity[0], 127);
    }
}
