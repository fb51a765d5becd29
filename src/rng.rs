//! Deterministic seed derivation and sampling primitives
//!
//! There is no global RNG anywhere in the pipeline. Every component derives
//! its own stream from the root seed plus a stage tag and indices, so the
//! same configuration and seed always reproduce the same output, and
//! reordering unrelated stages cannot perturb each other's draws.
//!
//! Derivation is a SplitMix64 hash over a canonical byte encoding of the
//! tags; the 64-bit result seeds a ChaCha stream used for all sampling.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Advance a SplitMix64 state and return the next output word
///
/// The standard finaliser from Steele et al.; stable across platforms.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Fold one word into a running hash state
fn absorb(state: u64, word: u64) -> u64 {
    let mut s = state ^ word.wrapping_mul(0xD6E8_FEB8_6659_FD93);
    splitmix64(&mut s)
}

/// Compute the stable 64-bit seed for `(root, stage, component, bar)`
///
/// The stage tag is absorbed byte by byte (prefixed with its length, so
/// `"ab" + "c"` and `"a" + "bc"` cannot collide), followed by the two
/// indices.
pub fn derive_seed(root: u64, stage: &str, component: u64, bar: u64) -> u64 {
    let mut s = root;
    s = splitmix64(&mut s);
    s = absorb(s, stage.len() as u64);
    for &b in stage.as_bytes() {
        s = absorb(s, b as u64);
    }
    s = absorb(s, component);
    absorb(s, bar)
}

/// Derive a sampler for one pipeline component
///
/// # Example
/// ```
/// use grooves::rng::derive_rng;
/// use rand::Rng;
///
/// let mut a = derive_rng(7, "drums/prob", 0, 3);
/// let mut b = derive_rng(7, "drums/prob", 0, 3);
/// assert_eq!(a.random::<u64>(), b.random::<u64>());
/// ```
pub fn derive_rng(root: u64, stage: &str, component: u64, bar: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(derive_seed(root, stage, component, bar))
}

/// Bernoulli draw with probability `p` (clamped to [0, 1])
pub fn bernoulli(rng: &mut impl Rng, p: f64) -> bool {
    if p <= 0.0 {
        return false;
    }
    if p >= 1.0 {
        return true;
    }
    rng.random::<f64>() < p
}

/// Uniform integer in `[0, n)`; `n` must be nonzero
pub fn uniform_usize(rng: &mut impl Rng, n: usize) -> usize {
    rng.random_range(0..n)
}

/// Index draw from unnormalised non-negative weights
///
/// Zero-total weights fall back to a uniform draw so callers never have to
/// special-case a degenerate table.
pub fn weighted_index(rng: &mut impl Rng, weights: &[f64]) -> usize {
    let total: f64 = weights.iter().map(|w| w.max(0.0)).sum();
    if total <= 0.0 {
        return uniform_usize(rng, weights.len().max(1));
    }
    let mut x = rng.random::<f64>() * total;
    for (i, w) in weights.iter().enumerate() {
        x -= w.max(0.0);
        if x <= 0.0 {
            return i;
        }
    }
    weights.len() - 1
}

/// Truncated normal draw via Box-Muller, clamped to `[lo, hi]`
pub fn normal_trunc(rng: &mut impl Rng, mean: f64, sd: f64, lo: f64, hi: f64) -> f64 {
    let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.random::<f64>();
    let z = (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
    (mean + sd * z).clamp(lo, hi)
}
