//! Lead planning: key derivation, harmony, and phrase structure

use crate::bass::BassNote;
use crate::error::{GrooveError, Result};
use crate::theory::{KeySpec, ScaleType};

/// Phrase role in the call/response scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Call,
    Resp,
}

/// Where a note sits inside its phrase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhrasePosition {
    Start,
    Inner,
    End,
}

/// Metric strength bucket used by the function profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BeatStrength {
    Strong,
    Weak,
}

/// One role-tagged phrase segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhraseSegment {
    pub id: usize,
    pub start_bar: usize,
    pub bars: usize,
    pub role: Role,
    pub resolution_required: bool,
}

impl PhraseSegment {
    pub fn bar_range(&self) -> std::ops::Range<usize> {
        self.start_bar..self.start_bar + self.bars
    }
}

/// The complete phrase plan; segments tile `[0, bars)` exactly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhrasePlan {
    pub segments: Vec<PhraseSegment>,
}

/// Plan phrases over the pattern
///
/// Picks the largest phrase length in `[min_bars, max_bars]` that divides
/// the bar count; when none divides, the last phrase truncates. Roles
/// follow `pattern` cyclically; a segment closing a pattern cycle (or the
/// final segment) requires resolution.
pub fn plan_phrases(
    bars: usize,
    min_bars: usize,
    max_bars: usize,
    pattern: &str,
) -> PhrasePlan {
    let min_bars = min_bars.max(1);
    let max_bars = max_bars.max(min_bars);
    let length = (min_bars..=max_bars)
        .rev()
        .find(|l| bars % l == 0)
        .unwrap_or(max_bars.min(bars.max(1)));

    let roles: Vec<Role> = pattern
        .chars()
        .map(|c| if c == 'C' { Role::Call } else { Role::Resp })
        .collect();
    let roles = if roles.is_empty() {
        vec![Role::Call]
    } else {
        roles
    };

    let mut segments = Vec::new();
    let mut start = 0usize;
    let mut id = 0usize;
    while start < bars {
        let seg_bars = length.min(bars - start);
        segments.push(PhraseSegment {
            id,
            start_bar: start,
            bars: seg_bars,
            role: roles[id % roles.len()],
            resolution_required: id % roles.len() == roles.len() - 1,
        });
        start += seg_bars;
        id += 1;
    }
    if let Some(last) = segments.last_mut() {
        last.resolution_required = true;
    }
    PhrasePlan { segments }
}

/// Constant tonic-minor harmony, identical every bar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarmonyTrack {
    pub tonic_degree: usize,
    pub chord_tone_degrees: Vec<usize>,
    pub color_tone_degrees: Vec<usize>,
}

impl HarmonyTrack {
    /// The static i-minor harmony; degree count adapts to the scale
    pub fn tonic_minor(scale: ScaleType) -> Self {
        match scale {
            ScaleType::MinorPent => Self {
                tonic_degree: 1,
                chord_tone_degrees: vec![1, 2, 4],
                color_tone_degrees: vec![3, 5],
            },
            _ => Self {
                tonic_degree: 1,
                chord_tone_degrees: vec![1, 3, 5],
                color_tone_degrees: vec![2, 4, 6, 7],
            },
        }
    }
}

/// Derive the key from seed tags, bass content, or the default
///
/// Order: an explicit override, then a `key_<pc>_<scale>` tag (an unknown
/// scale name is fatal), then the pitch-class histogram of the bass, then
/// A aeolian.
pub fn derive_key(
    explicit: Option<KeySpec>,
    tags: &[String],
    bass: Option<&[BassNote]>,
) -> Result<KeySpec> {
    if let Some(key) = explicit {
        return Ok(key);
    }

    for tag in tags {
        if let Some(rest) = tag.strip_prefix("key_") {
            let mut parts = rest.splitn(2, '_');
            let pc: u8 = parts
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| GrooveError::InvalidConfig(format!("malformed key tag '{}'", tag)))?;
            let scale = ScaleType::from_name(parts.next().unwrap_or("aeolian"))?;
            return Ok(KeySpec::new(pc % 12, scale, 4));
        }
    }

    if let Some(notes) = bass {
        if !notes.is_empty() {
            let mut histogram = [0usize; 12];
            for n in notes {
                histogram[(n.pitch % 12) as usize] += 1;
            }
            let root_pc = histogram
                .iter()
                .enumerate()
                .max_by_key(|&(pc, &count)| (count, 11 - pc))
                .map(|(pc, _)| pc as u8)
                .unwrap_or(9);
            return Ok(KeySpec::new(root_pc, ScaleType::Aeolian, 4));
        }
    }

    Ok(KeySpec::new(9, ScaleType::Aeolian, 4))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bass::BassMode;

    #[test]
    fn test_phrases_tile_exactly() {
        for bars in [2, 4, 6, 8, 12, 16, 7] {
            let plan = plan_phrases(bars, 2, 4, "CR");
            let covered: usize = plan.segments.iter().map(|s| s.bars).sum();
            assert_eq!(covered, bars, "bars {}", bars);
            for w in plan.segments.windows(2) {
                assert_eq!(w[0].start_bar + w[0].bars, w[1].start_bar);
            }
        }
    }

    #[test]
    fn test_prefers_largest_divisor() {
        let plan = plan_phrases(8, 2, 4, "CR");
        assert_eq!(plan.segments.len(), 2);
        assert_eq!(plan.segments[0].bars, 4);
    }

    #[test]
    fn test_truncated_last_phrase() {
        let plan = plan_phrases(7, 2, 4, "CR");
        assert_eq!(plan.segments.last().unwrap().bars, 3);
        assert!(plan.segments.last().unwrap().resolution_required);
    }

    #[test]
    fn test_roles_cycle_and_resolution_marks() {
        let plan = plan_phrases(16, 2, 2, "CRCR");
        let roles: Vec<Role> = plan.segments.iter().map(|s| s.role).collect();
        assert_eq!(
            &roles[..4],
            &[Role::Call, Role::Resp, Role::Call, Role::Resp]
        );
        // Every 4th segment closes the CRCR cycle.
        assert!(plan.segments[3].resolution_required);
        assert!(!plan.segments[1].resolution_required);
    }

    #[test]
    fn test_key_from_tag() {
        let key = derive_key(None, &["key_7_dorian".to_string()], None).unwrap();
        assert_eq!(key.root_pc, 7);
        assert_eq!(key.scale, ScaleType::Dorian);
    }

    #[test]
    fn test_unknown_scale_is_fatal() {
        let err = derive_key(None, &["key_4_lydian".to_string()], None);
        assert!(matches!(err, Err(GrooveError::UnknownScale(_))));
    }

    #[test]
    fn test_key_from_bass_histogram() {
        let note = |pitch: u8| BassNote {
            pitch,
            bar: 0,
            step: 0,
            duration_steps: 1,
            velocity: 100,
            mode: BassMode::SubAnchor,
        };
        let bass = vec![note(45), note(45), note(52), note(33)];
        let key = derive_key(None, &[], Some(&bass)).unwrap();
        assert_eq!(key.root_pc, 9); // A dominates the histogram
        assert_eq!(key.scale, ScaleType::Aeolian);
    }

    #[test]
    fn test_default_key() {
        let key = derive_key(None, &[], None).unwrap();
        assert_eq!(key.root_pc, 9);
        assert_eq!(key.scale, ScaleType::Aeolian);
    }
}
