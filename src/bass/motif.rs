//! The bass motif store and its controlled variations
//!
//! A motif is a one-bar cell of `(step, pool index)` pairs. Bars start
//! from the motif and only drift at 2/4/8-bar boundaries, one mode-safe
//! variation at a time, so adjacent bars stay recognisably related.

use rand::Rng;

use crate::bass::modes::{ModeProfile, PoolDegree};
use crate::rng::uniform_usize;
use crate::timebase::STEPS_PER_BAR;

/// One bar of bass cells, sorted by step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Motif {
    pub cells: Vec<(usize, usize)>,
}

impl Motif {
    pub fn new(mut cells: Vec<(usize, usize)>) -> Self {
        cells.sort_by_key(|&(step, _)| step);
        cells.dedup_by_key(|&mut (step, _)| step);
        Self { cells }
    }

    pub fn steps(&self) -> Vec<usize> {
        self.cells.iter().map(|&(step, _)| step).collect()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Apply one mode-safe variation in place
    ///
    /// The op is drawn from: nudge a pool index, swap root and fifth,
    /// substitute an octave, add a note, remove a note. Note-count ops are
    /// only offered while they keep the count inside `[min_notes, max_notes]`.
    pub fn vary(
        &mut self,
        profile: &ModeProfile,
        min_notes: usize,
        max_notes: usize,
        rng: &mut impl Rng,
    ) {
        if self.cells.is_empty() {
            return;
        }
        let mut ops: Vec<u8> = vec![0, 1, 2];
        if self.cells.len() < max_notes {
            ops.push(3);
        }
        if self.cells.len() > min_notes.max(1) {
            ops.push(4);
        }

        match ops[uniform_usize(rng, ops.len())] {
            // Nudge one cell's pool index by one position.
            0 => {
                let i = uniform_usize(rng, self.cells.len());
                let delta = if rng.random::<bool>() { 1 } else { profile.pool.len() - 1 };
                self.cells[i].1 = (self.cells[i].1 + delta) % profile.pool.len();
            }
            // Swap every root cell with the fifth and vice versa, when the
            // pool carries both.
            1 => {
                let root = pool_position(profile, 0);
                let fifth = pool_position(profile, 7);
                if let (Some(root), Some(fifth)) = (root, fifth) {
                    for cell in &mut self.cells {
                        if cell.1 == root {
                            cell.1 = fifth;
                        } else if cell.1 == fifth {
                            cell.1 = root;
                        }
                    }
                }
            }
            // Substitute one cell with its octave partner.
            2 => {
                let i = uniform_usize(rng, self.cells.len());
                if let PoolDegree::Offset(off) = profile.pool[self.cells[i].1] {
                    for target in [off + 12, off - 12] {
                        if let Some(pos) = pool_position(profile, target) {
                            self.cells[i].1 = pos;
                            break;
                        }
                    }
                }
            }
            // Add one note into a vacant step honouring the minimum gap.
            3 => {
                let occupied = self.steps();
                let vacant: Vec<usize> = (0..STEPS_PER_BAR)
                    .filter(|&s| {
                        occupied
                            .iter()
                            .all(|&o| circular_gap(s, o) > profile.min_gap.saturating_sub(1))
                    })
                    .collect();
                if !vacant.is_empty() {
                    let step = vacant[uniform_usize(rng, vacant.len())];
                    let pool_idx = uniform_usize(rng, profile.pool.len());
                    self.cells.push((step, pool_idx));
                    self.cells.sort_by_key(|&(s, _)| s);
                }
            }
            // Remove one note.
            _ => {
                let i = uniform_usize(rng, self.cells.len());
                self.cells.remove(i);
            }
        }
    }
}

fn pool_position(profile: &ModeProfile, offset: i32) -> Option<usize> {
    profile
        .pool
        .iter()
        .position(|&d| matches!(d, PoolDegree::Offset(o) if o == offset))
}

fn circular_gap(a: usize, b: usize) -> usize {
    let d = a.abs_diff(b);
    d.min(STEPS_PER_BAR - d)
}

/// Hamming similarity between two step-onset sets: `1 - d_H / 16`
pub fn hamming_similarity(a: &[usize], b: &[usize]) -> f64 {
    let mut set_a = [false; STEPS_PER_BAR];
    let mut set_b = [false; STEPS_PER_BAR];
    for &s in a {
        set_a[s % STEPS_PER_BAR] = true;
    }
    for &s in b {
        set_b[s % STEPS_PER_BAR] = true;
    }
    let distance = (0..STEPS_PER_BAR).filter(|&i| set_a[i] != set_b[i]).count();
    1.0 - distance as f64 / STEPS_PER_BAR as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bass::modes::BassMode;
    use crate::rng::derive_rng;

    #[test]
    fn test_motif_orders_and_dedups() {
        let m = Motif::new(vec![(8, 0), (0, 1), (8, 2)]);
        assert_eq!(m.steps(), vec![0, 8]);
    }

    #[test]
    fn test_hamming_similarity_bounds() {
        assert_eq!(hamming_similarity(&[0, 4, 8], &[0, 4, 8]), 1.0);
        let s = hamming_similarity(&[0, 4], &[1, 5]);
        assert!((s - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_variation_stays_in_count_bounds() {
        let profile = BassMode::PocketGroove.profile();
        let mut rng = derive_rng(3, "bass/vary", 0, 0);
        let mut motif = Motif::new(vec![(0, 0), (6, 1), (10, 0)]);
        for _ in 0..64 {
            motif.vary(&profile, 2, 6, &mut rng);
            assert!(motif.len() >= 2 && motif.len() <= 6);
            for &(step, pool_idx) in &motif.cells {
                assert!(step < STEPS_PER_BAR);
                assert!(pool_idx < profile.pool.len());
            }
        }
    }

    #[test]
    fn test_single_variation_keeps_coherence() {
        // One add/remove op changes at most one step: similarity >= 15/16.
        let profile = BassMode::RollingOstinato.profile();
        let motif = Motif::new(vec![(0, 0), (2, 0), (4, 1), (8, 0), (12, 1)]);
        for trial in 0..32 {
            let mut varied = motif.clone();
            let mut r = derive_rng(4, "bass/vary", 1, trial);
            varied.vary(&profile, 3, 10, &mut r);
            let s = hamming_similarity(&motif.steps(), &varied.steps());
            assert!(s >= 1.0 - 1.0 / 16.0 - 1e-9);
        }
    }
}
