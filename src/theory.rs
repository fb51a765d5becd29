//! Scales, keys, and degree arithmetic for the pitched engines
//!
//! The bass and lead engines work in scale degrees and only convert to MIDI
//! pitches at the edge. Everything here is tonic-minor flavoured: the four
//! recognised scales are the minor modes the groove aesthetic actually uses.

use crate::error::{GrooveError, Result};
use serde::{Deserialize, Serialize};

/// Scale interval tables (semitone offsets within one octave)
///
/// # Example
/// ```
/// use grooves::theory::ScaleType;
///
/// assert_eq!(ScaleType::Aeolian.intervals(), &[0, 2, 3, 5, 7, 8, 10]);
/// assert_eq!(ScaleType::MinorPent.intervals().len(), 5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleType {
    /// Natural minor
    Aeolian,
    /// Minor with raised 6th
    Dorian,
    /// Minor with lowered 2nd
    Phrygian,
    /// Minor pentatonic
    MinorPent,
}

impl ScaleType {
    /// Ascending semitone offsets from the root, one octave
    pub fn intervals(&self) -> &'static [i32] {
        match self {
            ScaleType::Aeolian => &[0, 2, 3, 5, 7, 8, 10],
            ScaleType::Dorian => &[0, 2, 3, 5, 7, 9, 10],
            ScaleType::Phrygian => &[0, 1, 3, 5, 7, 8, 10],
            ScaleType::MinorPent => &[0, 3, 5, 7, 10],
        }
    }

    /// Number of degrees per octave
    pub fn degree_count(&self) -> usize {
        self.intervals().len()
    }

    /// Parse a scale name as it appears in seed tags (`key_9_aeolian`)
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "aeolian" | "minor" => Ok(ScaleType::Aeolian),
            "dorian" => Ok(ScaleType::Dorian),
            "phrygian" => Ok(ScaleType::Phrygian),
            "minor_pent" | "minor_pentatonic" => Ok(ScaleType::MinorPent),
            other => Err(GrooveError::UnknownScale(other.to_string())),
        }
    }
}

/// Key specification: pitch class, scale, and default root octave
///
/// MIDI octave convention: octave -1 starts at note 0, so the root note is
/// `12 * (root_octave + 1) + root_pc`. A2 (MIDI 45) is
/// `KeySpec { root_pc: 9, scale: .., root_octave: 2 }`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeySpec {
    pub root_pc: u8,
    pub scale: ScaleType,
    pub root_octave: i8,
}

impl KeySpec {
    pub fn new(root_pc: u8, scale: ScaleType, root_octave: i8) -> Self {
        Self {
            root_pc: root_pc % 12,
            scale,
            root_octave,
        }
    }

    /// MIDI note of the root in the default octave
    pub fn root_note(&self) -> i32 {
        12 * (self.root_octave as i32 + 1) + self.root_pc as i32
    }

    /// MIDI pitch for a 1-based scale degree with an octave offset
    ///
    /// Degrees beyond the scale length wrap upward: degree 8 of a 7-note
    /// scale is the root one octave up.
    pub fn pitch_for_degree(&self, degree: usize, octave_offset: i32) -> i32 {
        debug_assert!(degree >= 1);
        let n = self.scale.degree_count();
        let idx = (degree - 1) % n;
        let wrap = ((degree - 1) / n) as i32;
        self.root_note() + self.scale.intervals()[idx] + 12 * (octave_offset + wrap)
    }

    /// Whether a MIDI pitch lies in the scale
    pub fn is_diatonic(&self, pitch: i32) -> bool {
        let pc = (pitch - self.root_pc as i32).rem_euclid(12);
        self.scale.intervals().contains(&pc)
    }

    /// The 1-based degree of a diatonic pitch, if any
    pub fn degree_of(&self, pitch: i32) -> Option<usize> {
        let pc = (pitch - self.root_pc as i32).rem_euclid(12);
        self.scale
            .intervals()
            .iter()
            .position(|&i| i == pc)
            .map(|i| i + 1)
    }

    /// Nearest in-scale pitch to `target` (ties resolve downward)
    pub fn nearest_scale_pitch(&self, target: i32) -> i32 {
        for d in 0..=6 {
            if self.is_diatonic(target - d) {
                return target - d;
            }
            if self.is_diatonic(target + d) {
                return target + d;
            }
        }
        target
    }

    /// Step one degree up or down from a diatonic pitch
    ///
    /// Non-diatonic inputs are first snapped to the nearest scale pitch.
    pub fn diatonic_step(&self, pitch: i32, direction: i32) -> i32 {
        let mut p = self.nearest_scale_pitch(pitch);
        if direction == 0 {
            return p;
        }
        let step = direction.signum();
        loop {
            p += step;
            if self.is_diatonic(p) {
                return p;
            }
        }
    }
}
