//! Bass mode profiles
//!
//! Each mode is a playing style: how busy, how low, which intervals, and
//! how it sits against the kick. The profiles are static tables in the
//! spirit of scale interval tables; the engine only ever reads them.

use serde::{Deserialize, Serialize};

use crate::analyzer::SlotLabel;

/// The six bass playing styles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BassMode {
    /// Long sub notes anchored to bar starts
    SubAnchor,
    /// Driving root/fifth eighths around the kick
    RootFifthDriver,
    /// Sparse syncopated pocket playing
    PocketGroove,
    /// Dense 16th ostinato
    RollingOstinato,
    /// Offbeat stabs between the kicks
    OffbeatStabs,
    /// Higher-register melodic bass
    LeadIsh,
}

/// Pitch pool entry: a semitone offset from the tonic, or a diatonic
/// passing step relative to the previous note
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolDegree {
    Offset(i32),
    Passing,
}

/// Per-label preference weights for slot scoring
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotWeights {
    pub is_kick: f64,
    pub pre_kick: f64,
    pub post_kick: f64,
    pub snare_zone: f64,
    pub bar_start: f64,
    pub bar_end: f64,
    pub fill_zone: f64,
    pub hat_dense: f64,
    pub hat_sparse: f64,
}

impl SlotWeights {
    /// Sum of the weights whose labels are set
    pub fn score(&self, label: &SlotLabel) -> f64 {
        let mut total = 0.0;
        if label.is_kick {
            total += self.is_kick;
        }
        if label.pre_kick {
            total += self.pre_kick;
        }
        if label.post_kick {
            total += self.post_kick;
        }
        if label.snare_zone {
            total += self.snare_zone;
        }
        if label.bar_start {
            total += self.bar_start;
        }
        if label.bar_end {
            total += self.bar_end;
        }
        if label.fill_zone {
            total += self.fill_zone;
        }
        if label.hat_dense {
            total += self.hat_dense;
        }
        if label.hat_sparse {
            total += self.hat_sparse;
        }
        total
    }
}

/// What a mode rhythmically locks onto
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeAnchor {
    /// The kick itself (strong-beat styles)
    OnKick,
    /// The slots immediately around the kick
    AroundKick,
    /// Offbeat slots away from the kick
    Offbeat,
    /// No particular anchor
    Open,
}

impl ModeAnchor {
    /// How well a slot matches the anchor, in [0, 1]
    pub fn matches(&self, label: &SlotLabel) -> f64 {
        match self {
            ModeAnchor::OnKick => {
                if label.is_kick || label.bar_start {
                    1.0
                } else {
                    0.0
                }
            }
            ModeAnchor::AroundKick => {
                if label.pre_kick || label.post_kick {
                    1.0
                } else if label.is_kick {
                    0.5
                } else {
                    0.0
                }
            }
            ModeAnchor::Offbeat => {
                if label.is_kick || label.bar_start {
                    0.0
                } else if label.pre_kick || label.post_kick {
                    1.0
                } else {
                    0.5
                }
            }
            ModeAnchor::Open => 0.5,
        }
    }
}

/// Static description of one bass mode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeProfile {
    pub name: &'static str,
    /// Note-count range as a fraction of the 16 steps
    pub density: (f64, f64),
    /// Register bounds as semitone offsets from the tonic
    pub register_offset: (i32, i32),
    pub pool: &'static [PoolDegree],
    pub slot_weights: SlotWeights,
    pub anchor: ModeAnchor,
    /// May a note share a step with a kick onset
    pub allow_kick_overlap: bool,
    /// Kick overlap allowed on the bar-start downbeat even when otherwise forbidden
    pub bar_start_overlap: bool,
    pub min_gap: usize,
    pub max_consecutive: usize,
    /// Longest note length in steps
    pub max_len_steps: u32,
}

impl BassMode {
    pub fn profile(&self) -> ModeProfile {
        match self {
            BassMode::SubAnchor => ModeProfile {
                name: "sub_anchor",
                density: (0.06, 0.25),
                register_offset: (-12, 7),
                pool: &[PoolDegree::Offset(0), PoolDegree::Offset(-12)],
                slot_weights: SlotWeights {
                    is_kick: 0.2,
                    pre_kick: 0.1,
                    post_kick: 0.4,
                    snare_zone: 0.0,
                    bar_start: 1.0,
                    bar_end: 0.1,
                    fill_zone: 0.0,
                    hat_dense: 0.0,
                    hat_sparse: 0.3,
                },
                anchor: ModeAnchor::OnKick,
                allow_kick_overlap: false,
                bar_start_overlap: true,
                min_gap: 3,
                max_consecutive: 1,
                max_len_steps: 8,
            },
            BassMode::RootFifthDriver => ModeProfile {
                name: "root_fifth_driver",
                density: (0.19, 0.44),
                register_offset: (-12, 12),
                pool: &[
                    PoolDegree::Offset(0),
                    PoolDegree::Offset(7),
                    PoolDegree::Offset(12),
                ],
                slot_weights: SlotWeights {
                    is_kick: 0.0,
                    pre_kick: 0.6,
                    post_kick: 0.8,
                    snare_zone: 0.2,
                    bar_start: 0.6,
                    bar_end: 0.2,
                    fill_zone: 0.2,
                    hat_dense: 0.2,
                    hat_sparse: 0.1,
                },
                anchor: ModeAnchor::AroundKick,
                allow_kick_overlap: false,
                bar_start_overlap: true,
                min_gap: 1,
                max_consecutive: 3,
                max_len_steps: 2,
            },
            BassMode::PocketGroove => ModeProfile {
                name: "pocket_groove",
                density: (0.12, 0.38),
                register_offset: (-12, 12),
                pool: &[
                    PoolDegree::Offset(0),
                    PoolDegree::Offset(7),
                    PoolDegree::Offset(10),
                    PoolDegree::Offset(-12),
                ],
                slot_weights: SlotWeights {
                    is_kick: 0.0,
                    pre_kick: 0.5,
                    post_kick: 0.7,
                    snare_zone: 0.4,
                    bar_start: 0.3,
                    bar_end: 0.3,
                    fill_zone: 0.3,
                    hat_dense: 0.1,
                    hat_sparse: 0.4,
                },
                anchor: ModeAnchor::AroundKick,
                allow_kick_overlap: false,
                bar_start_overlap: true,
                min_gap: 1,
                max_consecutive: 2,
                max_len_steps: 3,
            },
            BassMode::RollingOstinato => ModeProfile {
                name: "rolling_ostinato",
                density: (0.44, 0.69),
                register_offset: (-12, 12),
                pool: &[
                    PoolDegree::Offset(0),
                    PoolDegree::Offset(0),
                    PoolDegree::Offset(12),
                    PoolDegree::Offset(10),
                ],
                slot_weights: SlotWeights {
                    is_kick: 0.2,
                    pre_kick: 0.5,
                    post_kick: 0.5,
                    snare_zone: 0.2,
                    bar_start: 0.4,
                    bar_end: 0.4,
                    fill_zone: 0.3,
                    hat_dense: 0.4,
                    hat_sparse: 0.0,
                },
                anchor: ModeAnchor::Open,
                allow_kick_overlap: true,
                bar_start_overlap: true,
                min_gap: 1,
                max_consecutive: 6,
                max_len_steps: 1,
            },
            BassMode::OffbeatStabs => ModeProfile {
                name: "offbeat_stabs",
                density: (0.19, 0.31),
                register_offset: (-12, 7),
                pool: &[
                    PoolDegree::Offset(0),
                    PoolDegree::Offset(-12),
                    PoolDegree::Offset(7),
                ],
                slot_weights: SlotWeights {
                    is_kick: 0.0,
                    pre_kick: 0.7,
                    post_kick: 0.9,
                    snare_zone: 0.1,
                    bar_start: 0.0,
                    bar_end: 0.2,
                    fill_zone: 0.1,
                    hat_dense: 0.3,
                    hat_sparse: 0.0,
                },
                anchor: ModeAnchor::Offbeat,
                allow_kick_overlap: false,
                bar_start_overlap: false,
                min_gap: 1,
                max_consecutive: 2,
                max_len_steps: 1,
            },
            BassMode::LeadIsh => ModeProfile {
                name: "lead_ish",
                density: (0.25, 0.5),
                register_offset: (0, 19),
                pool: &[
                    PoolDegree::Offset(0),
                    PoolDegree::Offset(7),
                    PoolDegree::Offset(12),
                    PoolDegree::Offset(14),
                    PoolDegree::Offset(10),
                    PoolDegree::Passing,
                ],
                slot_weights: SlotWeights {
                    is_kick: 0.1,
                    pre_kick: 0.4,
                    post_kick: 0.4,
                    snare_zone: 0.3,
                    bar_start: 0.4,
                    bar_end: 0.4,
                    fill_zone: 0.5,
                    hat_dense: 0.3,
                    hat_sparse: 0.2,
                },
                anchor: ModeAnchor::Open,
                allow_kick_overlap: true,
                bar_start_overlap: true,
                min_gap: 1,
                max_consecutive: 4,
                max_len_steps: 2,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_are_well_formed() {
        for mode in [
            BassMode::SubAnchor,
            BassMode::RootFifthDriver,
            BassMode::PocketGroove,
            BassMode::RollingOstinato,
            BassMode::OffbeatStabs,
            BassMode::LeadIsh,
        ] {
            let p = mode.profile();
            assert!(p.density.0 <= p.density.1, "{}", p.name);
            assert!(p.register_offset.0 < p.register_offset.1, "{}", p.name);
            assert!(!p.pool.is_empty(), "{}", p.name);
            assert!(p.max_consecutive >= 1, "{}", p.name);
        }
    }

    #[test]
    fn test_sub_anchor_is_sparse_and_low() {
        let p = BassMode::SubAnchor.profile();
        // 1 to 4 notes per bar
        assert_eq!((p.density.0 * 16.0).round() as usize, 1);
        assert_eq!((p.density.1 * 16.0).round() as usize, 4);
        // Root 45 gives the 33..=52 register
        assert_eq!(45 + p.register_offset.0, 33);
        assert_eq!(45 + p.register_offset.1, 52);
    }

    #[test]
    fn test_offbeat_anchor_rejects_kick_slots() {
        let kick_slot = SlotLabel {
            is_kick: true,
            ..SlotLabel::default()
        };
        let off_slot = SlotLabel {
            post_kick: true,
            ..SlotLabel::default()
        };
        assert_eq!(ModeAnchor::Offbeat.matches(&kick_slot), 0.0);
        assert_eq!(ModeAnchor::Offbeat.matches(&off_slot), 1.0);
    }

    #[test]
    fn test_slot_weight_sum() {
        let p = BassMode::RootFifthDriver.profile();
        let label = SlotLabel {
            post_kick: true,
            bar_start: true,
            ..SlotLabel::default()
        };
        assert!((p.slot_weights.score(&label) - 1.4).abs() < 1e-9);
    }
}
