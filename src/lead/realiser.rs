//! The lead realiser: template fusion, tone-function sampling, degree-to-
//! pitch voice-leading, slot alignment, and bass interaction
//!
//! Notes that find no admissible slot are dropped and counted; nothing in
//! this module fails the pipeline.

use log::debug;
use rand::Rng;

use crate::analyzer::{SlotGrid, SlotLabel};
use crate::bass::BassNote;
use crate::config::Config;
use crate::error::Result;
use crate::lead::planner::{
    derive_key, plan_phrases, BeatStrength, HarmonyTrack, PhrasePlan, PhrasePosition,
    PhraseSegment, Role,
};
use crate::lead::templates::{
    rhythm_candidates, AnchorType, ContourTemplate, RhythmTemplate, Tension, CONTOUR_TEMPLATES,
    FUNCTION_PROFILES,
};
use crate::rng::{derive_rng, weighted_index};
use crate::theory::KeySpec;
use crate::timebase::{Timebase, STEPS_PER_BAR};

/// Harmonic function of an assigned tone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToneCategory {
    Chord,
    Color,
    Passing,
}

/// A fully realised lead note
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadNote {
    pub pitch: u8,
    /// 1-based scale degree
    pub degree: usize,
    pub category: ToneCategory,
    pub bar: usize,
    pub step: usize,
    pub duration_steps: u32,
    pub velocity: u8,
    pub accent: bool,
    pub segment_id: usize,
    pub position: PhrasePosition,
}

impl LeadNote {
    fn global_step(&self) -> usize {
        self.bar * STEPS_PER_BAR + self.step
    }
}

/// Lead engine result with its diagnostics
#[derive(Debug)]
pub struct LeadOutput {
    pub notes: Vec<LeadNote>,
    pub plan: PhrasePlan,
    pub key: KeySpec,
    /// Events dropped because no slot satisfied the minimum gap
    pub dropped: usize,
}

/// A fused but not yet pitched note
struct LogicalNote {
    bar: usize,
    nominal_step: usize,
    length_steps: u32,
    accent: bool,
    anchor: AnchorType,
    position: PhrasePosition,
    tension: Tension,
    contour_offset: i32,
    contour_interval: i32,
    emphasized: bool,
}

pub struct LeadEngine<'a> {
    config: &'a Config,
    tb: Timebase,
    grid: &'a SlotGrid,
    bass: Option<&'a [BassNote]>,
}

impl<'a> LeadEngine<'a> {
    pub fn new(
        config: &'a Config,
        tb: Timebase,
        grid: &'a SlotGrid,
        bass: Option<&'a [BassNote]>,
    ) -> Self {
        Self {
            config,
            tb,
            grid,
            bass,
        }
    }

    pub fn run(&self) -> Result<LeadOutput> {
        let lead = &self.config.lead;
        let key = derive_key(lead.key, &self.config.tags, self.bass)?;
        let harmony = HarmonyTrack::tonic_minor(key.scale);
        let plan = plan_phrases(
            self.tb.bars,
            lead.phrase_min_bars,
            lead.phrase_max_bars,
            &lead.call_response_pattern,
        );

        let mut notes: Vec<LeadNote> = Vec::new();
        let mut dropped = 0usize;
        let mut prev_pitch: Option<i32> = None;
        let mut prev_degree: Option<usize> = None;

        for segment in &plan.segments {
            let rhythm = self.pick_rhythm(segment);
            let contour = self.pick_contour(segment);
            let logical = fuse(segment, rhythm, contour);
            let gravity = self.phrase_gravity(segment);

            for (i, ln) in logical.iter().enumerate() {
                let label = self.grid.label(ln.bar, ln.nominal_step);
                let strength = if label.bar_start || label.snare_zone || label.is_kick {
                    BeatStrength::Strong
                } else {
                    BeatStrength::Weak
                };

                let (category, degree) = self.assign_tone(
                    segment,
                    ln,
                    i,
                    strength,
                    &key,
                    &harmony,
                    prev_degree,
                );
                let pitch = self.lead_pitch(&key, degree, prev_pitch, gravity, ln);

                match self.align_slot(ln, &notes) {
                    Some(step) => {
                        let mut velocity = lead.velocity;
                        if ln.accent {
                            velocity = velocity.saturating_add(12).min(127);
                        }
                        notes.push(LeadNote {
                            pitch: pitch.clamp(0, 127) as u8,
                            degree,
                            category,
                            bar: ln.bar,
                            step,
                            duration_steps: ln.length_steps,
                            velocity,
                            accent: ln.accent,
                            segment_id: segment.id,
                            position: ln.position,
                        });
                        prev_pitch = Some(pitch);
                        prev_degree = Some(degree);
                    }
                    None => {
                        debug!(
                            "lead event dropped at bar {} step {}",
                            ln.bar, ln.nominal_step
                        );
                        dropped += 1;
                    }
                }
            }
        }

        clip_durations(&mut notes);
        if lead.bass_interaction.enabled {
            if let Some(bass) = self.bass {
                self.interact_with_bass(&mut notes, bass, &key);
            }
        }

        Ok(LeadOutput {
            notes,
            plan,
            key,
            dropped,
        })
    }

    fn pick_rhythm(&self, segment: &PhraseSegment) -> &'static RhythmTemplate {
        let candidates = rhythm_candidates(segment.role, self.config.lead.mode);
        let weights: Vec<f64> = candidates.iter().map(|&(_, w)| w).collect();
        let mut rng = derive_rng(self.config.seed, "lead/rhythm", segment.id as u64, 0);
        candidates[weighted_index(&mut rng, &weights)].0
    }

    fn pick_contour(&self, segment: &PhraseSegment) -> &'static ContourTemplate {
        let weights: Vec<f64> = CONTOUR_TEMPLATES.iter().map(|c| c.weight).collect();
        let mut rng = derive_rng(self.config.seed, "lead/contour", segment.id as u64, 0);
        &CONTOUR_TEMPLATES[weighted_index(&mut rng, &weights)]
    }

    /// Gravity centre for one phrase: the configured centre plus a bounded
    /// per-phrase drift
    fn phrase_gravity(&self, segment: &PhraseSegment) -> i32 {
        let lead = &self.config.lead;
        let base = lead.gravity_center as i32;
        let d = lead.register_drift_per_phrase;
        if d == 0 {
            return base;
        }
        let mut rng = derive_rng(self.config.seed, "lead/drift", segment.id as u64, 0);
        let drift = rng.random_range(-d..=d);
        (base + drift).clamp(lead.register_low as i32, lead.register_high as i32)
    }

    /// Tone category and degree for one logical note
    #[allow(clippy::too_many_arguments)]
    fn assign_tone(
        &self,
        segment: &PhraseSegment,
        ln: &LogicalNote,
        index: usize,
        strength: BeatStrength,
        key: &KeySpec,
        harmony: &HarmonyTrack,
        prev_degree: Option<usize>,
    ) -> (ToneCategory, usize) {
        let n = key.scale.degree_count();
        let implied = wrap_degree(1i32 + ln.contour_offset, n);

        // Phrase-end resolution overrides sampling.
        let resolving = ln.position == PhrasePosition::End
            && (segment.resolution_required || ln.tension == Tension::Resolve);
        if resolving {
            let degree = nearest_degree(
                implied,
                &self.config.lead.phrase_end_resolution_degrees,
                n,
            );
            return (ToneCategory::Chord, degree);
        }

        let profile = FUNCTION_PROFILES
            .get(&(segment.role, ln.position, strength))
            .copied()
            .unwrap_or([0.6, 0.25, 0.15]);
        let mut rng = derive_rng(
            self.config.seed,
            "lead/function",
            segment.id as u64,
            index as u64,
        );
        match weighted_index(&mut rng, &profile) {
            0 => (
                ToneCategory::Chord,
                nearest_degree(implied, &harmony.chord_tone_degrees, n),
            ),
            1 => (
                ToneCategory::Color,
                nearest_degree(implied, &harmony.color_tone_degrees, n),
            ),
            _ => {
                // Passing tones on weak beats step one degree from the
                // previous note; without history they fall back to the
                // contour-implied degree.
                let degree = match prev_degree {
                    Some(prev) => {
                        let dir = if ln.contour_interval >= 0 { 1 } else { -1 };
                        wrap_degree(prev as i32 + dir, n)
                    }
                    None => implied,
                };
                (ToneCategory::Passing, degree)
            }
        }
    }

    /// Voice-leading pitch choice over neighbouring octaves
    fn lead_pitch(
        &self,
        key: &KeySpec,
        degree: usize,
        prev_pitch: Option<i32>,
        gravity: i32,
        ln: &LogicalNote,
    ) -> i32 {
        let lead = &self.config.lead;
        let lo = lead.register_low as i32;
        let hi = lead.register_high as i32;
        let w = &lead.weights;

        let reference = prev_pitch.unwrap_or_else(|| key.nearest_scale_pitch(gravity));

        // Candidate octaves around the reference pitch.
        let base = key.pitch_for_degree(degree, 0);
        let center_shift = ((reference - base) as f64 / 12.0).round() as i32;
        let mut best: Option<(f64, i32)> = None;
        for octave in [center_shift - 1, center_shift, center_shift + 1] {
            let candidate = base + 12 * octave;
            if candidate < lo || candidate > hi {
                continue;
            }
            let jump = (candidate - reference).abs() as f64;
            let spread = (candidate - gravity).abs() as f64;
            let violates = ln.emphasized
                && ln.contour_interval != 0
                && (candidate - reference).signum() != ln.contour_interval.signum();
            let cost = w.alpha * jump + w.beta * spread + w.gamma * f64::from(violates as u8);
            if best.map_or(true, |(b, _)| cost < b) {
                best = Some((cost, candidate));
            }
        }
        match best {
            Some((_, pitch)) => pitch,
            // Register too narrow for any candidate octave: clamp the raw
            // degree pitch and snap back into the scale.
            None => key.nearest_scale_pitch(base.clamp(lo, hi)),
        }
    }

    /// Scored slot search within the jitter window
    fn align_slot(&self, ln: &LogicalNote, placed: &[LeadNote]) -> Option<usize> {
        let lead = &self.config.lead;
        let w = &lead.weights;
        let jitter = lead.max_step_jitter as i32;
        let min_gap = lead.min_inter_note_gap_steps.max(1);
        let labels = self.grid.bar(ln.bar);
        let global_nominal = ln.bar * STEPS_PER_BAR + ln.nominal_step;

        let mut best: Option<(f64, usize)> = None;
        for delta in -jitter..=jitter {
            let step_i = ln.nominal_step as i32 + delta;
            if step_i < 0 || step_i >= STEPS_PER_BAR as i32 {
                continue;
            }
            let step = step_i as usize;
            let global = ln.bar * STEPS_PER_BAR + step;
            if placed
                .iter()
                .any(|p| p.global_step().abs_diff(global) < min_gap)
            {
                continue;
            }

            let label = &labels[step];
            let occupied_near = placed
                .iter()
                .filter(|p| p.global_step().abs_diff(global) <= 2)
                .count();
            let strong = label.bar_start || label.is_kick || label.snare_zone;
            let score = w.w_role_tag * role_slot_pref(ln_role_of(ln), label)
                + w.w_anchor * ln.anchor.matches(label)
                + w.w_strength * f64::from((ln.accent && strong) as u8)
                + w.w_density * (1.0 - (occupied_near.min(3) as f64) / 3.0)
                - w.w_overlap * (occupied_near as f64 / 3.0)
                - 0.05 * (global as i64 - global_nominal as i64).unsigned_abs() as f64;
            if best.map_or(true, |(b, _)| score > b) {
                best = Some((score, step));
            }
        }
        best.map(|(_, step)| step)
    }

    /// Resolve collisions with the bass: substitute, then shift octave,
    /// then shorten
    fn interact_with_bass(&self, notes: &mut [LeadNote], bass: &[BassNote], key: &KeySpec) {
        let cfg = &self.config.lead.bass_interaction;
        let lo = self.config.lead.register_low as i32;
        let hi = self.config.lead.register_high as i32;
        let n = key.scale.degree_count();

        let harmony = HarmonyTrack::tonic_minor(key.scale);
        for note in notes.iter_mut() {
            // A phrase-end resolution keeps its degree; clashes against it
            // resolve by octave or duration only.
            let preserve_degree = note.position == PhrasePosition::End;

            // Several bass notes can overlap one lead note; resolve them
            // one at a time with a bounded pass.
            for _ in 0..4 {
                let note_start = (note.bar * STEPS_PER_BAR + note.step) as u32;
                let note_end = note_start + note.duration_steps;
                let clash = bass.iter().find(|b| {
                    let b_start = (b.bar * STEPS_PER_BAR + b.step) as u32;
                    let b_end = b_start + b.duration_steps;
                    if b_start >= note_end || note_start >= b_end {
                        return false;
                    }
                    let root_clash = cfg.avoid_root_on_bass_hits
                        && !preserve_degree
                        && b.step % 4 == 0
                        && (b.pitch % 12) == key.root_pc
                        && note.degree == 1;
                    let too_close = (note.pitch as i32 - b.pitch as i32).abs()
                        < cfg.min_semitone_distance;
                    too_close || root_clash
                });
                let Some(clash) = clash else { break };
                let bass_pitch = clash.pitch as i32;

                // 1. Same-category neighbour degree.
                let pool = match note.category {
                    ToneCategory::Chord => &harmony.chord_tone_degrees,
                    ToneCategory::Color => &harmony.color_tone_degrees,
                    ToneCategory::Passing => &harmony.color_tone_degrees,
                };
                let neighbour = if preserve_degree {
                    None
                } else {
                    pool.iter()
                        .copied()
                        .filter(|&d| d != note.degree && d != 1)
                        .min_by_key(|&d| degree_distance(d, note.degree, n))
                };
                if let Some(d) = neighbour {
                    let candidate = nearest_octave_pitch(key, d, note.pitch as i32, lo, hi);
                    if (candidate - bass_pitch).abs() >= cfg.min_semitone_distance {
                        note.degree = d;
                        note.pitch = candidate.clamp(0, 127) as u8;
                        continue;
                    }
                }

                // 2. Octave shift within the register.
                let up = note.pitch as i32 + 12;
                let down = note.pitch as i32 - 12;
                if up <= hi && (up - bass_pitch).abs() >= cfg.min_semitone_distance {
                    note.pitch = up as u8;
                    continue;
                }
                if down >= lo && (down - bass_pitch).abs() >= cfg.min_semitone_distance {
                    note.pitch = down as u8;
                    continue;
                }

                // 3. Shorten so the clash window closes.
                let b_start = (clash.bar * STEPS_PER_BAR + clash.step) as u32;
                note.duration_steps = if b_start > note_start {
                    b_start - note_start
                } else {
                    1
                };
                break;
            }
        }
    }
}

fn ln_role_of(ln: &LogicalNote) -> Role {
    // The fused note keeps its anchor and position; role-based slot
    // preference only needs start/end shading, carried via position.
    match ln.position {
        PhrasePosition::Start => Role::Call,
        _ => Role::Resp,
    }
}

/// Role-conditioned slot preference
fn role_slot_pref(role: Role, label: &SlotLabel) -> f64 {
    match role {
        Role::Call => {
            if label.bar_start {
                1.0
            } else if label.is_kick {
                0.6
            } else if label.snare_zone {
                0.4
            } else {
                0.2
            }
        }
        Role::Resp => {
            if label.pre_kick || label.post_kick {
                0.8
            } else if label.fill_zone {
                0.6
            } else if label.bar_end {
                0.5
            } else {
                0.3
            }
        }
    }
}

/// Fuse one rhythm and one contour over a segment into logical notes
fn fuse(
    segment: &PhraseSegment,
    rhythm: &RhythmTemplate,
    contour: &ContourTemplate,
) -> Vec<LogicalNote> {
    let events_per_bar = rhythm.steps.len();
    let total = events_per_bar * segment.bars;
    let clen = contour.intervals.len();

    let mut notes = Vec::with_capacity(total);
    let mut cum = 0i32;
    for i in 0..total {
        let bar = segment.start_bar + i / events_per_bar;
        let rs = &rhythm.steps[i % events_per_bar];
        let interval = contour.intervals[i % clen];
        // The contour restarts from its anchor on wrap, not cumulatively.
        if i % clen == 0 {
            cum = 0;
        }
        cum += interval;

        let position = if i == 0 {
            PhrasePosition::Start
        } else if i == total - 1 {
            PhrasePosition::End
        } else {
            PhrasePosition::Inner
        };
        let tension = if position == PhrasePosition::End {
            Tension::Resolve
        } else {
            contour.tension[i % clen]
        };

        notes.push(LogicalNote {
            bar,
            nominal_step: rs.step_offset,
            length_steps: rs.length_steps,
            accent: rs.accent,
            anchor: rs.anchor,
            position,
            tension,
            contour_offset: cum,
            contour_interval: interval,
            emphasized: contour.emphasis.contains(&(i % clen)),
        });
    }
    notes
}

/// Clip each note so it ends before the next onset
fn clip_durations(notes: &mut [LeadNote]) {
    notes.sort_by_key(|n| n.global_step());
    for i in 0..notes.len().saturating_sub(1) {
        let gap = (notes[i + 1].global_step() - notes[i].global_step()) as u32;
        if gap >= 1 {
            notes[i].duration_steps = notes[i].duration_steps.min(gap);
        }
    }
}

/// Wrap an arbitrary degree expression into `1..=n`
fn wrap_degree(degree: i32, n: usize) -> usize {
    ((degree - 1).rem_euclid(n as i32)) as usize + 1
}

/// Nearest member of a degree set, circular over the scale
fn nearest_degree(target: usize, pool: &[usize], n: usize) -> usize {
    pool.iter()
        .copied()
        .min_by_key(|&d| (degree_distance(d, target, n), d))
        .unwrap_or(target)
}

fn degree_distance(a: usize, b: usize, n: usize) -> usize {
    let d = a.abs_diff(b);
    d.min(n - d)
}

/// The octave copy of a degree closest to a reference pitch, inside the register
fn nearest_octave_pitch(key: &KeySpec, degree: usize, reference: i32, lo: i32, hi: i32) -> i32 {
    let base = key.pitch_for_degree(degree, 0);
    let mut best = base;
    let mut best_dist = i32::MAX;
    for octave in -3..=3 {
        let candidate = base + 12 * octave;
        if candidate < lo || candidate > hi {
            continue;
        }
        let dist = (candidate - reference).abs();
        if dist < best_dist {
            best_dist = dist;
            best = candidate;
        }
    }
    best.clamp(lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer;
    use crate::config::{EngineMode, LayerConfig};
    use crate::drums::DrumEngine;
    use crate::theory::ScaleType;

    fn lead_config(bars: usize) -> Config {
        let mut config = Config::new(EngineMode::Full, 126.0, 1920, bars, 33);
        config.layers.insert(
            "kick".to_string(),
            LayerConfig {
                fills: 4,
                note: 36,
                ..LayerConfig::default()
            },
        );
        config.layers.insert(
            "snare".to_string(),
            LayerConfig {
                fills: 2,
                rot: 4,
                note: 38,
                ..LayerConfig::default()
            },
        );
        config.layers.insert(
            "hat_c".to_string(),
            LayerConfig {
                fills: 8,
                note: 42,
                ..LayerConfig::default()
            },
        );
        config.tags = vec!["key_9_aeolian".to_string()];
        config
    }

    fn run_lead(config: &Config) -> LeadOutput {
        let tb = config.timebase().unwrap();
        let drums = DrumEngine::new(config, tb).run().unwrap();
        let grid = analyzer::analyze(&drums.events, &tb);
        LeadEngine::new(config, tb, &grid, None).run().unwrap()
    }

    #[test]
    fn test_all_notes_diatonic() {
        let config = lead_config(4);
        let out = run_lead(&config);
        assert!(!out.notes.is_empty());
        for n in &out.notes {
            assert!(
                out.key.is_diatonic(n.pitch as i32),
                "pitch {} not in key",
                n.pitch
            );
        }
    }

    #[test]
    fn test_phrase_ends_resolve() {
        let config = lead_config(4);
        let out = run_lead(&config);
        for segment in &out.plan.segments {
            if !segment.resolution_required {
                continue;
            }
            let last = out
                .notes
                .iter()
                .filter(|n| n.segment_id == segment.id)
                .last();
            if let Some(n) = last {
                assert!(
                    config.lead.phrase_end_resolution_degrees.contains(&n.degree),
                    "segment {} ends on degree {}",
                    segment.id,
                    n.degree
                );
            }
        }
    }

    #[test]
    fn test_first_note_lands_early_in_phrase() {
        let config = lead_config(4);
        let out = run_lead(&config);
        for segment in &out.plan.segments {
            let first = out.notes.iter().find(|n| n.segment_id == segment.id);
            if let Some(n) = first {
                assert_eq!(n.bar, segment.start_bar);
                assert!(n.step <= 3, "first note at step {}", n.step);
            }
        }
    }

    #[test]
    fn test_average_jump_is_small() {
        let config = lead_config(8);
        let out = run_lead(&config);
        let pitches: Vec<i32> = out.notes.iter().map(|n| n.pitch as i32).collect();
        if pitches.len() < 2 {
            return;
        }
        let total: i32 = pitches.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
        let avg = total as f64 / (pitches.len() - 1) as f64;
        assert!(avg <= 5.0, "average jump {}", avg);
    }

    #[test]
    fn test_register_respected() {
        let config = lead_config(8);
        let out = run_lead(&config);
        for n in &out.notes {
            assert!(n.pitch >= config.lead.register_low);
            assert!(n.pitch <= config.lead.register_high);
        }
    }

    #[test]
    fn test_min_gap_between_onsets() {
        let config = lead_config(8);
        let out = run_lead(&config);
        let mut steps: Vec<usize> = out.notes.iter().map(|n| n.global_step()).collect();
        steps.sort_unstable();
        for w in steps.windows(2) {
            assert!(w[1] - w[0] >= config.lead.min_inter_note_gap_steps);
        }
    }

    #[test]
    fn test_determinism() {
        let config = lead_config(8);
        let a = run_lead(&config);
        let b = run_lead(&config);
        assert_eq!(a.notes, b.notes);
        assert_eq!(a.dropped, b.dropped);
    }

    #[test]
    fn test_wrap_and_nearest_degree() {
        assert_eq!(wrap_degree(8, 7), 1);
        assert_eq!(wrap_degree(0, 7), 7);
        assert_eq!(wrap_degree(-1, 7), 6);
        assert_eq!(nearest_degree(6, &[1, 5], 7), 5);
        assert_eq!(nearest_degree(7, &[1, 5], 7), 1);
    }

    #[test]
    fn test_bass_interaction_keeps_distance() {
        use crate::bass::{BassEngine, BassMode};
        use crate::config::BassModeSelect;

        let mut config = lead_config(8);
        config.bass.mode = Some(BassModeSelect::Fixed(BassMode::LeadIsh));
        // Push the bass up into the lead register to force interactions.
        config.bass.root_note = 57;
        config.lead.register_low = 55;
        let tb = config.timebase().unwrap();
        let drums = DrumEngine::new(&config, tb).run().unwrap();
        let grid = analyzer::analyze(&drums.events, &tb);
        let bass = BassEngine::new(&config, tb, &grid).run().unwrap();
        let out = LeadEngine::new(&config, tb, &grid, Some(&bass.notes))
            .run()
            .unwrap();

        let min_dist = config.lead.bass_interaction.min_semitone_distance;
        for n in &out.notes {
            let n_start = (n.bar * STEPS_PER_BAR + n.step) as u32;
            let n_end = n_start + n.duration_steps;
            for b in &bass.notes {
                let b_start = (b.bar * STEPS_PER_BAR + b.step) as u32;
                let b_end = b_start + b.duration_steps;
                if b_start < n_end && n_start < b_end && b_start != n_start {
                    continue;
                }
                if b_start == n_start {
                    // Same-onset clashes either moved apart or shortened.
                    let dist = (n.pitch as i32 - b.pitch as i32).abs();
                    assert!(
                        dist >= min_dist || n.duration_steps == 1,
                        "lead {} vs bass {} at {}",
                        n.pitch,
                        b.pitch,
                        n_start
                    );
                }
            }
        }
    }

    #[test]
    fn test_key_override_from_config() {
        let mut config = lead_config(4);
        config.tags.clear();
        config.lead.key = Some(KeySpec::new(2, ScaleType::Phrygian, 4));
        let out = run_lead(&config);
        assert_eq!(out.key.root_pc, 2);
        assert_eq!(out.key.scale, ScaleType::Phrygian);
    }
}
