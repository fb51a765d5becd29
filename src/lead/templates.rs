//! Rhythm and contour template tables, plus the tone-function profiles
//!
//! Templates are static data; the realiser draws from them with weighted
//! RNG and fuses one rhythm with one contour per phrase segment.

use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::analyzer::SlotLabel;
use crate::lead::planner::{BeatStrength, PhrasePosition, Role};
use crate::lead::LeadMode;

/// How a rhythm event wants to sit against the drum anchors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorType {
    KickAligned,
    OffKick,
    SnareZone,
    Free,
}

impl AnchorType {
    /// Anchor affinity of a slot, in [0, 1]
    pub fn matches(&self, label: &SlotLabel) -> f64 {
        match self {
            AnchorType::KickAligned => {
                if label.is_kick || label.bar_start {
                    1.0
                } else {
                    0.2
                }
            }
            AnchorType::OffKick => {
                if label.is_kick {
                    0.0
                } else if label.pre_kick || label.post_kick {
                    1.0
                } else {
                    0.6
                }
            }
            AnchorType::SnareZone => {
                if label.snare_zone {
                    1.0
                } else {
                    0.3
                }
            }
            AnchorType::Free => 0.5,
        }
    }
}

/// One event of a one-bar rhythm template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RhythmStep {
    pub step_offset: usize,
    pub length_steps: u32,
    pub accent: bool,
    pub anchor: AnchorType,
}

const fn rs(step_offset: usize, length_steps: u32, accent: bool, anchor: AnchorType) -> RhythmStep {
    RhythmStep {
        step_offset,
        length_steps,
        accent,
        anchor,
    }
}

/// A named one-bar rhythm cell with role and style affinities
#[derive(Debug, Clone, Copy)]
pub struct RhythmTemplate {
    pub name: &'static str,
    pub roles: &'static [Role],
    /// Mode whose draws weight this template double, if any
    pub style: Option<LeadMode>,
    pub weight: f64,
    pub steps: &'static [RhythmStep],
}

pub const RHYTHM_TEMPLATES: &[RhythmTemplate] = &[
    RhythmTemplate {
        name: "sustain_arc",
        roles: &[Role::Call, Role::Resp],
        style: Some(LeadMode::LyricalCr),
        weight: 1.2,
        steps: &[
            rs(0, 6, true, AnchorType::KickAligned),
            rs(8, 6, false, AnchorType::Free),
        ],
    },
    RhythmTemplate {
        name: "call_statement",
        roles: &[Role::Call],
        style: Some(LeadMode::LyricalCr),
        weight: 1.5,
        steps: &[
            rs(0, 3, true, AnchorType::KickAligned),
            rs(4, 2, false, AnchorType::Free),
            rs(7, 3, false, AnchorType::OffKick),
            rs(12, 4, true, AnchorType::SnareZone),
        ],
    },
    RhythmTemplate {
        name: "answer_offbeats",
        roles: &[Role::Resp],
        style: None,
        weight: 1.2,
        steps: &[
            rs(2, 2, false, AnchorType::OffKick),
            rs(6, 2, false, AnchorType::OffKick),
            rs(10, 2, true, AnchorType::OffKick),
            rs(14, 2, false, AnchorType::OffKick),
        ],
    },
    RhythmTemplate {
        name: "sparse_answer",
        roles: &[Role::Resp],
        style: Some(LeadMode::LyricalCr),
        weight: 1.3,
        steps: &[
            rs(2, 3, false, AnchorType::SnareZone),
            rs(10, 5, true, AnchorType::Free),
        ],
    },
    RhythmTemplate {
        name: "hypnotic_cell",
        roles: &[Role::Call, Role::Resp],
        style: Some(LeadMode::HypnoticLoop),
        weight: 1.0,
        steps: &[
            rs(0, 1, true, AnchorType::KickAligned),
            rs(3, 1, false, AnchorType::Free),
            rs(6, 1, false, AnchorType::OffKick),
            rs(8, 1, true, AnchorType::Free),
            rs(11, 1, false, AnchorType::Free),
            rs(14, 1, false, AnchorType::OffKick),
        ],
    },
    RhythmTemplate {
        name: "drive_eighths",
        roles: &[Role::Call, Role::Resp],
        style: Some(LeadMode::HypnoticLoop),
        weight: 0.9,
        steps: &[
            rs(0, 2, true, AnchorType::KickAligned),
            rs(4, 2, false, AnchorType::Free),
            rs(8, 2, true, AnchorType::KickAligned),
            rs(12, 2, false, AnchorType::Free),
        ],
    },
];

/// Tension label carried by each contour position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tension {
    Rise,
    Hold,
    Resolve,
}

/// A melodic contour: degree intervals, emphasis points, tension profile
#[derive(Debug, Clone, Copy)]
pub struct ContourTemplate {
    pub name: &'static str,
    /// Degree deltas per event; the first entry is always 0
    pub intervals: &'static [i32],
    pub emphasis: &'static [usize],
    pub tension: &'static [Tension],
    pub weight: f64,
}

pub const CONTOUR_TEMPLATES: &[ContourTemplate] = &[
    ContourTemplate {
        name: "arch",
        intervals: &[0, 1, 1, 1, -1, -2],
        emphasis: &[0, 3],
        tension: &[
            Tension::Hold,
            Tension::Rise,
            Tension::Rise,
            Tension::Rise,
            Tension::Hold,
            Tension::Resolve,
        ],
        weight: 1.4,
    },
    ContourTemplate {
        name: "descent",
        intervals: &[0, -1, -1, -1],
        emphasis: &[0],
        tension: &[
            Tension::Hold,
            Tension::Hold,
            Tension::Hold,
            Tension::Resolve,
        ],
        weight: 1.0,
    },
    ContourTemplate {
        name: "pendulum",
        intervals: &[0, 2, -2, 2, -2, 1],
        emphasis: &[1, 3],
        tension: &[
            Tension::Hold,
            Tension::Rise,
            Tension::Hold,
            Tension::Rise,
            Tension::Hold,
            Tension::Resolve,
        ],
        weight: 1.1,
    },
    ContourTemplate {
        name: "plateau",
        intervals: &[0, 0, 1, 0, -1, 0],
        emphasis: &[2],
        tension: &[
            Tension::Hold,
            Tension::Hold,
            Tension::Rise,
            Tension::Hold,
            Tension::Hold,
            Tension::Resolve,
        ],
        weight: 0.9,
    },
    ContourTemplate {
        name: "reach",
        intervals: &[0, 2, 1, -1],
        emphasis: &[1, 2],
        tension: &[Tension::Hold, Tension::Rise, Tension::Rise, Tension::Resolve],
        weight: 1.0,
    },
];

lazy_static! {
    /// Probabilities over (chord, color, passing) conditioned on role,
    /// phrase position, and beat strength
    pub static ref FUNCTION_PROFILES: HashMap<(Role, PhrasePosition, BeatStrength), [f64; 3]> = {
        use BeatStrength::*;
        use PhrasePosition::*;
        use Role::*;
        let mut m = HashMap::new();
        m.insert((Call, Start, Strong), [0.80, 0.15, 0.05]);
        m.insert((Call, Start, Weak), [0.60, 0.25, 0.15]);
        m.insert((Call, Inner, Strong), [0.60, 0.30, 0.10]);
        m.insert((Call, Inner, Weak), [0.35, 0.30, 0.35]);
        m.insert((Call, End, Strong), [0.75, 0.20, 0.05]);
        m.insert((Call, End, Weak), [0.65, 0.25, 0.10]);
        m.insert((Resp, Start, Strong), [0.65, 0.25, 0.10]);
        m.insert((Resp, Start, Weak), [0.45, 0.30, 0.25]);
        m.insert((Resp, Inner, Strong), [0.50, 0.35, 0.15]);
        m.insert((Resp, Inner, Weak), [0.30, 0.35, 0.35]);
        m.insert((Resp, End, Strong), [0.85, 0.10, 0.05]);
        m.insert((Resp, End, Weak), [0.75, 0.15, 0.10]);
        m
    };
}

/// Rhythm templates admissible for a role, with style-adjusted weights
pub fn rhythm_candidates(role: Role, mode: LeadMode) -> Vec<(&'static RhythmTemplate, f64)> {
    RHYTHM_TEMPLATES
        .iter()
        .filter(|t| t.roles.contains(&role))
        .map(|t| {
            let weight = if t.style == Some(mode) {
                t.weight * 2.0
            } else {
                t.weight
            };
            (t, weight)
        })
        .collect()
}
