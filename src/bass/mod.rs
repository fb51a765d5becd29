//! The groove-aware bass engine
//!
//! The bass re-reads the analyzed drum grid and realises a pitched line
//! under the selected mode's density, register, and collision constraints.
//! Construction is motif-driven: bar 0 of a mode run is scored from the
//! slot labels, later bars repeat the motif with controlled variations at
//! 2-bar boundaries. Validation retries with fresh RNG streams and then
//! relaxes constraints in a fixed order; it never fails the pipeline.

pub mod modes;
pub mod motif;

use log::debug;
use rand::Rng;

use crate::analyzer::{SlotGrid, SlotLabel};
use crate::config::{BassModeSelect, Config};
use crate::error::Result;
use crate::rng::{derive_rng, uniform_usize, weighted_index};
use crate::theory::{KeySpec, ScaleType};
use crate::timebase::{Timebase, STEPS_PER_BAR};

pub use modes::{BassMode, ModeAnchor, ModeProfile, PoolDegree, SlotWeights};
pub use motif::{hamming_similarity, Motif};

/// Number of fresh-RNG retries before constraints relax
const MAX_RETRIES: u64 = 4;

/// A realised bass note
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BassNote {
    pub pitch: u8,
    pub bar: usize,
    pub step: usize,
    pub duration_steps: u32,
    pub velocity: u8,
    pub mode: BassMode,
}

impl BassNote {
    /// Onset in quarter-note beats from the pattern start
    pub fn start_beat(&self) -> f64 {
        self.bar as f64 * 4.0 + self.step as f64 / 4.0
    }

    pub fn duration_beats(&self) -> f64 {
        self.duration_steps as f64 / 4.0
    }
}

/// Bass engine result with its diagnostics
#[derive(Debug)]
pub struct BassOutput {
    pub notes: Vec<BassNote>,
    /// The mode active in each bar
    pub modes: Vec<BassMode>,
    /// Constraint relaxation level reached (0 = fully constrained)
    pub relaxations: usize,
}

pub struct BassEngine<'a> {
    config: &'a Config,
    tb: Timebase,
    grid: &'a SlotGrid,
    key: KeySpec,
}

impl<'a> BassEngine<'a> {
    pub fn new(config: &'a Config, tb: Timebase, grid: &'a SlotGrid) -> Self {
        let root = config.bass.root_note as i32;
        let key = KeySpec::new((root % 12) as u8, ScaleType::Aeolian, (root / 12 - 1) as i8);
        Self {
            config,
            tb,
            grid,
            key,
        }
    }

    pub fn run(&self) -> Result<BassOutput> {
        let modes = self.select_modes();

        let mut last = Vec::new();
        for relax in 0..=3usize {
            let attempts = if relax == 0 { MAX_RETRIES } else { 1 };
            for attempt in 0..attempts {
                let attempt_id = relax as u64 * MAX_RETRIES + attempt;
                let notes = self.build(&modes, attempt_id, relax);
                if self.validate(&notes, &modes, relax) {
                    if relax > 0 {
                        debug!("bass constraints relaxed to level {}", relax);
                    }
                    return Ok(BassOutput {
                        notes,
                        modes,
                        relaxations: relax,
                    });
                }
                last = notes;
            }
        }
        // Everything relaxed and still failing would mean an empty grid;
        // hand back the best effort.
        Ok(BassOutput {
            notes: last,
            modes,
            relaxations: 3,
        })
    }

    /// Resolve the per-bar mode list from config, seed tags, or drum energy
    fn select_modes(&self) -> Vec<BassMode> {
        let bars = self.tb.bars;
        if let Some(select) = &self.config.bass.mode {
            return match select {
                BassModeSelect::Fixed(mode) => vec![*mode; bars],
                BassModeSelect::PerBar(list) if list.is_empty() => {
                    vec![self.mode_from_energy(); bars]
                }
                BassModeSelect::PerBar(list) => {
                    (0..bars).map(|bar| list[bar % list.len()]).collect()
                }
            };
        }

        let candidates: Option<&[BassMode]> = if self.has_tag(&["minimal", "dubby"]) {
            Some(&[BassMode::SubAnchor, BassMode::OffbeatStabs])
        } else if self.has_tag(&["warehouse", "urgent", "industrial"]) {
            Some(&[
                BassMode::RootFifthDriver,
                BassMode::PocketGroove,
                BassMode::RollingOstinato,
            ])
        } else if self.has_tag(&["rolling", "hypnotic"]) {
            Some(&[BassMode::RollingOstinato, BassMode::PocketGroove])
        } else {
            None
        };

        let mode = match candidates {
            Some(set) => {
                let mut rng = derive_rng(self.config.seed, "bass/mode", 0, 0);
                set[uniform_usize(&mut rng, set.len())]
            }
            None => self.mode_from_energy(),
        };
        vec![mode; bars]
    }

    fn has_tag(&self, names: &[&str]) -> bool {
        self.config.tags.iter().any(|t| names.contains(&t.as_str()))
    }

    /// Energy band from the analyzed grid: kick count, hat density, snare presence
    fn mode_from_energy(&self) -> BassMode {
        let bars = self.grid.num_bars().max(1);
        let mut kicks = 0usize;
        let mut dense_hats = 0usize;
        let mut snares = 0usize;
        for bar in 0..self.grid.num_bars() {
            for label in self.grid.bar(bar) {
                if label.is_kick {
                    kicks += 1;
                }
                if label.hat_dense {
                    dense_hats += 1;
                }
                if label.snare_zone {
                    snares += 1;
                }
            }
        }
        let energy = kicks as f64 / bars as f64
            + 4.0 * dense_hats as f64 / (bars * STEPS_PER_BAR) as f64
            + 0.5 * snares as f64 / (bars * STEPS_PER_BAR) as f64;

        if energy < 4.5 {
            BassMode::SubAnchor
        } else if energy < 6.0 {
            BassMode::OffbeatStabs
        } else if energy < 7.5 {
            BassMode::PocketGroove
        } else {
            BassMode::RootFifthDriver
        }
    }

    fn note_count_bounds(&self, profile: &ModeProfile) -> (usize, usize, usize) {
        let min_notes = ((profile.density.0 * STEPS_PER_BAR as f64).round() as usize).max(1);
        let max_notes =
            ((profile.density.1 * STEPS_PER_BAR as f64).round() as usize).max(min_notes);
        let target = self
            .config
            .bass
            .density_target
            .map(|d| (d * STEPS_PER_BAR as f64).round() as usize)
            .unwrap_or((min_notes + max_notes) / 2)
            .clamp(min_notes, max_notes);
        (min_notes, max_notes, target)
    }

    fn register(&self, profile: &ModeProfile) -> (i32, i32) {
        match self.config.bass.register {
            Some((lo, hi)) => (lo as i32, hi as i32),
            None => {
                let root = self.config.bass.root_note as i32;
                (root + profile.register_offset.0, root + profile.register_offset.1)
            }
        }
    }

    fn build(&self, modes: &[BassMode], attempt: u64, relax: usize) -> Vec<BassNote> {
        let seed = self.config.seed;
        let mut notes = Vec::new();
        let mut current_motif: Option<(BassMode, Motif)> = None;

        for bar in 0..self.tb.bars {
            let mode = modes[bar];
            let profile = mode.profile();
            let (min_notes, max_notes, target) = self.note_count_bounds(&profile);

            let keep_motif = matches!(&current_motif, Some((active, _)) if *active == mode);
            let motif = if keep_motif {
                let (_, motif) = current_motif.as_mut().expect("motif present");
                if bar > 0 && bar % 2 == 0 {
                    let mut rng = derive_rng(seed, "bass/vary", attempt, bar as u64);
                    motif.vary(&profile, min_notes, max_notes, &mut rng);
                }
                motif.clone()
            } else {
                let mut slot_rng = derive_rng(seed, "bass/slots", attempt, bar as u64);
                let steps = self.select_steps(bar, &profile, target, relax, &mut slot_rng);
                let mut pool_rng = derive_rng(seed, "bass/pool", attempt, bar as u64);
                let fresh = self.assign_pool(&steps, bar, &profile, &mut pool_rng);
                current_motif = Some((mode, fresh.clone()));
                fresh
            };

            let cells = self.project_motif(&motif, bar, &profile, min_notes, relax);
            self.realise_bar(bar, mode, &cells, &profile, &mut notes);
        }
        notes
    }

    /// Greedy slot selection under the scoring formula and hard constraints
    fn select_steps(
        &self,
        bar: usize,
        profile: &ModeProfile,
        target: usize,
        relax: usize,
        rng: &mut impl Rng,
    ) -> Vec<usize> {
        let weights = &self.config.bass.weights;
        let labels = self.grid.bar(bar);
        let mut selected: Vec<usize> = Vec::with_capacity(target);

        while selected.len() < target {
            let mut best: Option<(f64, usize)> = None;
            for step in 0..STEPS_PER_BAR {
                if selected.contains(&step)
                    || !self.step_admissible(step, &labels[step], profile, &selected, relax)
                {
                    continue;
                }
                let label = &labels[step];
                let mut score = weights.w_tag * profile.slot_weights.score(label)
                    + weights.w_anchor * profile.anchor.matches(label)
                    + weights.w_strength * beat_strength(step, label)
                    + weights.w_density * sparsity_bonus(&selected, step)
                    - weights.w_overlap * overlap_penalty(&selected, step);
                if label.is_kick && !profile.allow_kick_overlap {
                    score -= weights.w_kick_avoid;
                }
                // Small jitter keeps equal-scored bars from always picking
                // the same slot across attempts.
                score += rng.random::<f64>() * 1e-3;
                if best.map_or(true, |(b, _)| score > b) {
                    best = Some((score, step));
                }
            }
            match best {
                Some((_, step)) => selected.push(step),
                None => break,
            }
        }
        selected.sort_unstable();
        selected
    }

    /// Hard admission: minimum gap, consecutive-run cap, kick policy
    fn step_admissible(
        &self,
        step: usize,
        label: &SlotLabel,
        profile: &ModeProfile,
        selected: &[usize],
        relax: usize,
    ) -> bool {
        let gap = profile.min_gap.max(1);
        if selected.iter().any(|&o| step.abs_diff(o) < gap) {
            return false;
        }
        if run_length_with(selected, step) > profile.max_consecutive {
            return false;
        }
        if relax == 0
            && label.is_kick
            && !profile.allow_kick_overlap
            && !(profile.bar_start_overlap && step == 0)
        {
            return false;
        }
        true
    }

    /// Pool indices for a fresh motif: downbeats take the root, the rest
    /// draw from the pool with the root weighted double
    fn assign_pool(
        &self,
        steps: &[usize],
        bar: usize,
        profile: &ModeProfile,
        rng: &mut impl Rng,
    ) -> Motif {
        let root_pos = profile
            .pool
            .iter()
            .position(|&d| matches!(d, PoolDegree::Offset(0)))
            .unwrap_or(0);
        let labels = self.grid.bar(bar);
        let cells = steps
            .iter()
            .map(|&step| {
                let idx = if labels[step].bar_start || step == 0 {
                    root_pos
                } else {
                    let weights: Vec<f64> = (0..profile.pool.len())
                        .map(|i| if i == root_pos { 2.0 } else { 1.0 })
                        .collect();
                    weighted_index(rng, &weights)
                };
                (step, idx)
            })
            .collect();
        Motif::new(cells)
    }

    /// Project the motif onto one bar, dropping cells this bar's labels forbid
    fn project_motif(
        &self,
        motif: &Motif,
        bar: usize,
        profile: &ModeProfile,
        min_notes: usize,
        relax: usize,
    ) -> Vec<(usize, usize)> {
        let labels = self.grid.bar(bar);
        let mut cells: Vec<(usize, usize)> = motif
            .cells
            .iter()
            .copied()
            .filter(|&(step, _)| {
                relax >= 1
                    || profile.allow_kick_overlap
                    || !labels[step].is_kick
                    || (profile.bar_start_overlap && step == 0)
            })
            .collect();

        // Top up from vacant admissible slots if the projection got too thin.
        if cells.len() < min_notes {
            let mut selected: Vec<usize> = cells.iter().map(|&(s, _)| s).collect();
            for step in 0..STEPS_PER_BAR {
                if cells.len() >= min_notes {
                    break;
                }
                if self.step_admissible(step, &labels[step], profile, &selected, relax) {
                    cells.push((step, 0));
                    selected.push(step);
                }
            }
            cells.sort_by_key(|&(s, _)| s);
        }
        cells
    }

    /// Turn one bar of cells into pitched notes
    fn realise_bar(
        &self,
        bar: usize,
        mode: BassMode,
        cells: &[(usize, usize)],
        profile: &ModeProfile,
        notes: &mut Vec<BassNote>,
    ) {
        let (lo, hi) = self.register(profile);
        let root = self.config.bass.root_note as i32;
        let gravity = self
            .config
            .bass
            .gravity_center
            .map(|g| g as i32)
            .unwrap_or(root);
        let labels = self.grid.bar(bar);

        for (i, &(step, pool_idx)) in cells.iter().enumerate() {
            let prev_pitch = notes.last().map(|n: &BassNote| n.pitch as i32);
            let raw = match profile.pool[pool_idx.min(profile.pool.len() - 1)] {
                PoolDegree::Offset(off) => root + off,
                PoolDegree::Passing => {
                    let from = prev_pitch.unwrap_or(root);
                    let direction = if from > gravity { -1 } else { 1 };
                    self.key.diatonic_step(from, direction)
                }
            };
            let pitch = gravitate(raw, gravity, lo, hi);

            let next_step = cells
                .get(i + 1)
                .map(|&(s, _)| s)
                .unwrap_or(STEPS_PER_BAR);
            let gap = (next_step - step) as u32;
            let duration = gap.clamp(1, profile.max_len_steps.max(1));

            let mut velocity = self.config.bass.velocity;
            if labels[step].bar_start {
                velocity = velocity.saturating_add(8).min(127);
            }

            notes.push(BassNote {
                pitch: pitch.clamp(0, 127) as u8,
                bar,
                step,
                duration_steps: duration,
                velocity,
                mode,
            });
        }
    }

    /// Post-construction validation at the current relaxation level
    fn validate(&self, notes: &[BassNote], modes: &[BassMode], relax: usize) -> bool {
        let mut per_bar: Vec<Vec<&BassNote>> = vec![Vec::new(); self.tb.bars];
        for n in notes {
            per_bar[n.bar].push(n);
        }

        for bar in 0..self.tb.bars {
            let profile = modes[bar].profile();
            let (lo, hi) = self.register(&profile);
            let (min_notes, max_notes, _) = self.note_count_bounds(&profile);
            let labels = self.grid.bar(bar);

            for n in &per_bar[bar] {
                let p = n.pitch as i32;
                if p < lo || p > hi {
                    return false;
                }
                if relax < 1
                    && !profile.allow_kick_overlap
                    && labels[n.step].is_kick
                    && !(profile.bar_start_overlap && n.step == 0)
                {
                    return false;
                }
            }
            if relax < 2 {
                let count = per_bar[bar].len();
                if count < min_notes || count > max_notes {
                    return false;
                }
            }
            if relax < 3 && bar > 0 && modes[bar] == modes[bar - 1] && bar % 2 != 0 {
                let a: Vec<usize> = per_bar[bar - 1].iter().map(|n| n.step).collect();
                let b: Vec<usize> = per_bar[bar].iter().map(|n| n.step).collect();
                if hamming_similarity(&a, &b) < 0.5 {
                    return false;
                }
            }
        }
        true
    }
}

/// Metric strength of a slot for scoring
fn beat_strength(step: usize, label: &SlotLabel) -> f64 {
    if label.bar_start || label.is_kick || label.snare_zone {
        1.0
    } else if step % 4 == 0 {
        0.8
    } else if step % 2 == 0 {
        0.5
    } else {
        0.25
    }
}

/// Bonus for landing away from already-selected notes
fn sparsity_bonus(selected: &[usize], step: usize) -> f64 {
    let near = selected.iter().filter(|&&o| step.abs_diff(o) <= 2).count();
    1.0 - (near.min(3) as f64) / 3.0
}

/// Soft crowding penalty against already-selected notes
fn overlap_penalty(selected: &[usize], step: usize) -> f64 {
    selected
        .iter()
        .map(|&o| {
            let d = step.abs_diff(o);
            if d >= 3 {
                0.0
            } else {
                (3 - d) as f64 / 3.0
            }
        })
        .sum()
}

/// Run length of adjacent selected steps if `step` were added
fn run_length_with(selected: &[usize], step: usize) -> usize {
    let mut len = 1;
    let mut s = step;
    while s > 0 && selected.contains(&(s - 1)) {
        len += 1;
        s -= 1;
    }
    let mut s = step;
    while s + 1 < STEPS_PER_BAR && selected.contains(&(s + 1)) {
        len += 1;
        s += 1;
    }
    len
}

/// Fold a pitch into the register and toward the gravity centre
///
/// Deliberate pool offsets (the sub octave, the fifth) stay put; only
/// pitches more than an octave from gravity, or outside the register, are
/// folded by octaves.
fn gravitate(mut pitch: i32, gravity: i32, lo: i32, hi: i32) -> i32 {
    while pitch - gravity > 12 && pitch - 12 >= lo {
        pitch -= 12;
    }
    while gravity - pitch > 12 && pitch + 12 <= hi {
        pitch += 12;
    }
    while pitch > hi && pitch - 12 >= lo {
        pitch -= 12;
    }
    while pitch < lo && pitch + 12 <= hi {
        pitch += 12;
    }
    pitch.clamp(lo, hi)
}
