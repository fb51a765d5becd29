//! Closed-loop feedback controller for the drum engine
//!
//! The controller owns per-layer step probability vectors and a set of
//! long-horizon parameter modulators. Every bar it runs the same cycle:
//! MEASURE the previous bar's metrics, BIAS the probability vectors toward
//! the syncopation window, MODULATE the named parameters, GUARD against an
//! entrainment collapse (entering a one-bar rescue when needed), then EMIT
//! the parameter set the step core uses for the coming bar.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::PathBuf;

use log::{debug, warn};
use rand::Rng;

use crate::config::{
    resolve_param_path, Config, Guard, LayerRole, ModulatorConfig, ModulatorMode, ParamTarget,
    Targets,
};
use crate::drums::metrics::BarMetrics;
use crate::error::Result;
use crate::rng::{derive_rng, normal_trunc};
use crate::timebase::STEPS_PER_BAR;

/// Bound on how far the sync bias may move one step probability per bar
const MAX_BIAS_DELTA: f64 = 0.15;

/// Probability profile favouring the main pulse
fn weight_strong(step: usize) -> f64 {
    match step % 4 {
        0 => 1.0,
        2 => 0.6,
        _ => 0.3,
    }
}

/// Offbeat-favouring profile used when syncopation overshoots the window
fn weight_offbeat(step: usize) -> f64 {
    match step % 4 {
        0 => 0.4,
        2 => 0.9,
        _ => 0.7,
    }
}

/// Parameter set handed to the step core for one bar
#[derive(Debug, Clone)]
pub struct RuntimeParams {
    pub thin_bias: f64,
    pub accent_prob: f64,
    /// Effective swing per layer (0.5 while a rescue straightens timing)
    pub swing: BTreeMap<String, f64>,
    pub ratchet_prob: BTreeMap<String, f64>,
    pub kick_rotation_rate: f64,
    /// Rescue asked for rotation accumulators to be zeroed this bar
    pub reset_rotation: bool,
    pub rescue: bool,
}

struct ModulatorState {
    cfg: ModulatorConfig,
    target: ParamTarget,
    value: f64,
}

/// The only stateful component in the pipeline
pub struct Controller {
    seed: u64,
    targets: Targets,
    guard: Guard,
    probs: BTreeMap<String, [f64; STEPS_PER_BAR]>,
    modulators: Vec<ModulatorState>,
    base_thin_bias: f64,
    base_accent_prob: f64,
    base_swing: BTreeMap<String, f64>,
    base_ratchet: BTreeMap<String, f64>,
    base_kick_rotation_rate: f64,
    rescue_bars: usize,
    csv_path: Option<PathBuf>,
    csv_started: bool,
    csv_failed: bool,
}

impl Controller {
    pub fn new(config: &Config) -> Result<Self> {
        let mut probs = BTreeMap::new();
        let mut base_swing = BTreeMap::new();
        let mut base_ratchet = BTreeMap::new();
        let mut base_kick_rotation_rate = 0.0;
        for (name, layer) in &config.layers {
            probs.insert(name.clone(), [1.0; STEPS_PER_BAR]);
            base_swing.insert(name.clone(), layer.swing_percent);
            base_ratchet.insert(name.clone(), layer.ratchet_prob);
            if LayerRole::for_name(name) == LayerRole::Kick {
                base_kick_rotation_rate = layer.rotation_rate_per_bar;
            }
        }

        let mut modulators = Vec::with_capacity(config.modulators.len());
        for cfg in &config.modulators {
            let target = resolve_param_path(&cfg.param_path, &config.layers)?;
            let initial = match &target {
                ParamTarget::ThinBias => config.thin_bias,
                ParamTarget::AccentProb => config.accent.prob,
                ParamTarget::Swing(layer) => base_swing[layer],
                ParamTarget::RatchetProb(layer) => base_ratchet[layer],
                ParamTarget::KickRotationRate => base_kick_rotation_rate,
            };
            modulators.push(ModulatorState {
                value: initial.clamp(cfg.min_val, cfg.max_val),
                target,
                cfg: cfg.clone(),
            });
        }

        Ok(Self {
            seed: config.seed,
            targets: config.targets,
            guard: config.guard,
            probs,
            modulators,
            base_thin_bias: config.thin_bias,
            base_accent_prob: config.accent.prob,
            base_swing,
            base_ratchet,
            base_kick_rotation_rate,
            rescue_bars: 0,
            csv_path: config.metrics_csv.clone(),
            csv_started: false,
            csv_failed: false,
        })
    }

    /// Run one MEASURE → BIAS → MODULATE → GUARD cycle and emit parameters
    pub fn begin_bar(&mut self, bar: usize, prev: Option<&BarMetrics>) -> RuntimeParams {
        if let Some(metrics) = prev {
            self.bias_step(metrics);
        }
        self.modulate(bar);

        let rescue = prev.map_or(false, |m| m.e < self.guard.min_e);
        if rescue {
            self.apply_rescue(bar);
        }
        self.emit(rescue)
    }

    /// Current gate probability for a layer step
    pub fn step_prob(&self, layer: &str, step: usize) -> f64 {
        if self.guard.kick_immutable && LayerRole::for_name(layer) == LayerRole::Kick {
            return 1.0;
        }
        self.probs.get(layer).map_or(1.0, |p| p[step])
    }

    pub fn rescue_bars(&self) -> usize {
        self.rescue_bars
    }

    /// Markov sync bias: pull probabilities toward the strong-beat profile
    /// when syncopation undershoots, toward the offbeat profile when it
    /// overshoots. Movement per bar is bounded.
    fn bias_step(&mut self, metrics: &BarMetrics) {
        let profile: Option<fn(usize) -> f64> = if metrics.s < self.targets.s_low {
            Some(weight_strong)
        } else if metrics.s > self.targets.s_high {
            Some(weight_offbeat)
        } else {
            None
        };
        let Some(profile) = profile else {
            return;
        };

        let kick_immutable = self.guard.kick_immutable;
        for (name, probs) in &mut self.probs {
            if kick_immutable && LayerRole::for_name(name) == LayerRole::Kick {
                continue;
            }
            for (step, p) in probs.iter_mut().enumerate() {
                let target = 0.5 * (*p + profile(step));
                let delta = (target - *p).clamp(-MAX_BIAS_DELTA, MAX_BIAS_DELTA);
                *p = (*p + delta).clamp(0.0, 1.0);
            }
        }
    }

    fn modulate(&mut self, bar: usize) {
        for (idx, m) in self.modulators.iter_mut().enumerate() {
            let mut rng = derive_rng(self.seed, "ctrl/mod", idx as u64, bar as u64);
            let cfg = &m.cfg;
            let mid = 0.5 * (cfg.min_val + cfg.max_val);
            let proposal = match cfg.mode {
                ModulatorMode::RandomWalk => {
                    m.value + (rng.random::<f64>() * 2.0 - 1.0) * cfg.step_per_bar
                }
                ModulatorMode::Ou => {
                    let tau = cfg.tau.unwrap_or(8.0).max(f64::MIN_POSITIVE);
                    let noise = normal_trunc(&mut rng, 0.0, 1.0, -3.0, 3.0);
                    m.value + (mid - m.value) / tau + noise * cfg.step_per_bar
                }
                ModulatorMode::Sine => {
                    let amp = 0.5 * (cfg.max_val - cfg.min_val);
                    let phase = cfg.phase.unwrap_or(0.0);
                    mid + amp * (std::f64::consts::TAU * cfg.step_per_bar * bar as f64 + phase).sin()
                }
            };
            let delta =
                (proposal - m.value).clamp(-cfg.max_delta_per_bar, cfg.max_delta_per_bar);
            m.value = (m.value + delta).clamp(cfg.min_val, cfg.max_val);
        }
    }

    /// One-bar rescue: halve offbeat probabilities, zero rotation, and
    /// straighten swing for the coming bar. Not an error path.
    fn apply_rescue(&mut self, bar: usize) {
        debug!("entrainment rescue at bar {}", bar);
        let kick_immutable = self.guard.kick_immutable;
        for (name, probs) in &mut self.probs {
            if kick_immutable && LayerRole::for_name(name) == LayerRole::Kick {
                continue;
            }
            for (step, p) in probs.iter_mut().enumerate() {
                if step % 4 != 0 {
                    *p *= 0.5;
                }
            }
        }
        self.rescue_bars += 1;
    }

    fn emit(&self, rescue: bool) -> RuntimeParams {
        let mut params = RuntimeParams {
            thin_bias: self.base_thin_bias,
            accent_prob: self.base_accent_prob,
            swing: self.base_swing.clone(),
            ratchet_prob: self.base_ratchet.clone(),
            kick_rotation_rate: self.base_kick_rotation_rate,
            reset_rotation: rescue,
            rescue,
        };
        for m in &self.modulators {
            match &m.target {
                ParamTarget::ThinBias => params.thin_bias = m.value,
                ParamTarget::AccentProb => params.accent_prob = m.value,
                ParamTarget::Swing(layer) => {
                    params.swing.insert(layer.clone(), m.value);
                }
                ParamTarget::RatchetProb(layer) => {
                    params.ratchet_prob.insert(layer.clone(), m.value);
                }
                ParamTarget::KickRotationRate => params.kick_rotation_rate = m.value,
            }
        }
        if rescue {
            for swing in params.swing.values_mut() {
                *swing = 0.5;
            }
        }
        params
    }

    /// Append one metrics row to the configured CSV; best-effort
    pub fn log_csv(&mut self, bar: usize, metrics: &BarMetrics) {
        let Some(path) = self.csv_path.clone() else {
            return;
        };
        if self.csv_failed {
            return;
        }
        let result = (|| -> std::io::Result<()> {
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?;
            if !self.csv_started {
                writeln!(file, "bar,E,S,H_density,entropy")?;
            }
            writeln!(
                file,
                "{},{:.4},{:.4},{:.4},{:.4}",
                bar, metrics.e, metrics.s, metrics.h, metrics.entropy
            )
        })();
        match result {
            Ok(()) => self.csv_started = true,
            Err(e) => {
                warn!("metrics CSV write failed ({}); disabling", e);
                self.csv_failed = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineMode, LayerConfig};

    fn config_with_layers() -> Config {
        let mut config = Config::new(EngineMode::DrumsOnly, 130.0, 480, 8, 11);
        config.layers.insert(
            "kick".to_string(),
            LayerConfig {
                fills: 4,
                rotation_rate_per_bar: 0.25,
                ..LayerConfig::default()
            },
        );
        config.layers.insert(
            "hat_c".to_string(),
            LayerConfig {
                fills: 12,
                note: 42,
                swing_percent: 0.56,
                ..LayerConfig::default()
            },
        );
        config
    }

    fn metrics(e: f64, s: f64) -> BarMetrics {
        BarMetrics {
            e,
            s,
            h: 0.7,
            t_ms: BTreeMap::new(),
            entropy: 0.5,
        }
    }

    #[test]
    fn test_low_syncopation_pulls_toward_strong_profile() {
        let config = config_with_layers();
        let mut ctrl = Controller::new(&config).unwrap();
        ctrl.begin_bar(1, Some(&metrics(0.9, 0.1)));
        // Offbeat probabilities move down toward the strong profile.
        assert!(ctrl.step_prob("hat_c", 1) < 1.0);
        // Strong steps move less (their profile weight is already 1.0).
        assert!(ctrl.step_prob("hat_c", 0) > ctrl.step_prob("hat_c", 1));
    }

    #[test]
    fn test_kick_probabilities_immutable() {
        let config = config_with_layers();
        let mut ctrl = Controller::new(&config).unwrap();
        for bar in 1..5 {
            ctrl.begin_bar(bar, Some(&metrics(0.5, 0.9)));
        }
        for step in 0..STEPS_PER_BAR {
            assert_eq!(ctrl.step_prob("kick", step), 1.0);
        }
    }

    #[test]
    fn test_bias_step_is_bounded() {
        let config = config_with_layers();
        let mut ctrl = Controller::new(&config).unwrap();
        ctrl.begin_bar(1, Some(&metrics(0.9, 0.0)));
        for step in 0..STEPS_PER_BAR {
            let p = ctrl.step_prob("hat_c", step);
            assert!(p >= 1.0 - MAX_BIAS_DELTA - 1e-9);
        }
    }

    #[test]
    fn test_rescue_straightens_swing_and_resets_rotation() {
        let config = config_with_layers();
        let mut ctrl = Controller::new(&config).unwrap();
        let params = ctrl.begin_bar(1, Some(&metrics(0.3, 0.5)));
        assert!(params.rescue);
        assert!(params.reset_rotation);
        assert_eq!(params.swing["hat_c"], 0.5);
        assert_eq!(ctrl.rescue_bars(), 1);

        // A healthy bar emits the configured swing again.
        let params = ctrl.begin_bar(2, Some(&metrics(0.9, 0.5)));
        assert!(!params.rescue);
        assert_eq!(params.swing["hat_c"], 0.56);
    }

    #[test]
    fn test_modulator_clamps_to_bounds_and_delta() {
        let mut config = config_with_layers();
        config.modulators.push(ModulatorConfig {
            param_path: "hat_c.swing_percent".to_string(),
            mode: ModulatorMode::RandomWalk,
            min_val: 0.5,
            max_val: 0.6,
            step_per_bar: 0.5,
            tau: None,
            max_delta_per_bar: 0.01,
            phase: None,
        });
        let mut ctrl = Controller::new(&config).unwrap();
        let mut prev = 0.56;
        for bar in 0..32 {
            let params = ctrl.begin_bar(bar, None);
            let v = params.swing["hat_c"];
            assert!((0.5..=0.6).contains(&v));
            assert!((v - prev).abs() <= 0.01 + 1e-12);
            prev = v;
        }
    }

    #[test]
    fn test_sine_modulator_is_phase_locked_to_bar() {
        let mut config = config_with_layers();
        config.modulators.push(ModulatorConfig {
            param_path: "accent.prob".to_string(),
            mode: ModulatorMode::Sine,
            min_val: 0.1,
            max_val: 0.5,
            step_per_bar: 0.125,
            tau: None,
            max_delta_per_bar: 1.0,
            phase: None,
        });
        let mut a = Controller::new(&config).unwrap();
        let mut b = Controller::new(&config).unwrap();
        for bar in 0..8 {
            let pa = a.begin_bar(bar, None);
            let pb = b.begin_bar(bar, None);
            assert_eq!(pa.accent_prob, pb.accent_prob);
        }
    }
}
