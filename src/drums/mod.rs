//! The drum engine: step masks, gates, feedback control, and micro-timing
//!
//! Bars are generated strictly in order; the controller reads bar `i-1`'s
//! metrics before bar `i` is emitted. All buffers are per-bar and the
//! previous bar's masks are the only state carried across the loop.

pub mod controller;
pub mod density;
pub mod layer;
pub mod metrics;
pub mod microtiming;

use std::collections::BTreeMap;

use crate::config::{Config, LayerRole};
use crate::error::Result;
use crate::rng::{bernoulli, derive_rng};
use crate::timebase::{Timebase, STEPS_PER_BAR};

pub use controller::{Controller, RuntimeParams};
pub use layer::{DrumEvent, LayerMask};
pub use metrics::BarMetrics;

/// Everything the drum engine hands downstream
#[derive(Debug)]
pub struct DrumOutput {
    pub events: Vec<DrumEvent>,
    /// Final per-bar masks, frozen after the accent pass
    pub bar_masks: Vec<BTreeMap<String, LayerMask>>,
    pub metrics: Vec<BarMetrics>,
    pub rescue_bars: usize,
}

/// Drum pattern generator over a validated configuration
pub struct DrumEngine<'a> {
    config: &'a Config,
    tb: Timebase,
}

impl<'a> DrumEngine<'a> {
    pub fn new(config: &'a Config, tb: Timebase) -> Self {
        Self { config, tb }
    }

    pub fn run(&self) -> Result<DrumOutput> {
        let mut controller = Controller::new(self.config)?;
        let mut history: Vec<BTreeMap<String, LayerMask>> = Vec::with_capacity(self.tb.bars);
        let mut all_metrics: Vec<BarMetrics> = Vec::with_capacity(self.tb.bars);
        let mut events: Vec<DrumEvent> = Vec::new();
        let mut rotation_accum: BTreeMap<String, f64> =
            self.config.layers.keys().map(|k| (k.clone(), 0.0)).collect();

        for bar in 0..self.tb.bars {
            let prev_metrics = if bar > 0 { all_metrics.last() } else { None };
            let params = controller.begin_bar(bar, prev_metrics);

            self.advance_rotation(&mut rotation_accum, &params, bar);
            let mut masks = self.build_masks(bar, &controller, history.last(), &rotation_accum);
            self.articulate(bar, &mut masks);
            microtiming::apply_chokes(&mut masks, &self.config.layers);
            self.shape_density(bar, &mut masks, &params);
            self.accent(bar, &mut masks, &params);

            let bar_events = self.schedule(bar, &masks, &params);
            let bar_metrics = metrics::compute_metrics(&masks, &bar_events, &self.tb);
            controller.log_csv(bar, &bar_metrics);

            events.extend(bar_events);
            history.push(masks);
            all_metrics.push(bar_metrics);
        }

        Ok(DrumOutput {
            events,
            bar_masks: history,
            metrics: all_metrics,
            rescue_bars: controller.rescue_bars(),
        })
    }

    /// Accrue per-layer rotation drift, honouring the guard cap and rescue resets
    fn advance_rotation(
        &self,
        accum: &mut BTreeMap<String, f64>,
        params: &RuntimeParams,
        bar: usize,
    ) {
        if params.reset_rotation {
            for v in accum.values_mut() {
                *v = 0.0;
            }
            return;
        }
        if bar == 0 {
            return;
        }
        let cap = self.config.guard.max_rot_rate;
        for (name, layer) in &self.config.layers {
            let mut rate = if LayerRole::for_name(name) == LayerRole::Kick {
                params.kick_rotation_rate
            } else {
                layer.rotation_rate_per_bar
            };
            if cap > 0.0 {
                rate = rate.clamp(-cap, cap);
            }
            if let Some(v) = accum.get_mut(name) {
                *v += rate;
            }
        }
    }

    /// Base masks, condition stacks, and the controller's probability gate
    fn build_masks(
        &self,
        bar: usize,
        controller: &Controller,
        prev_bar: Option<&BTreeMap<String, LayerMask>>,
        rotation_accum: &BTreeMap<String, f64>,
    ) -> BTreeMap<String, LayerMask> {
        let kick_immutable = self.config.guard.kick_immutable;
        let mut masks = BTreeMap::new();
        for (idx, (name, cfg)) in self.config.layers.iter().enumerate() {
            let is_kick = LayerRole::for_name(name) == LayerRole::Kick;
            let mut onsets = layer::base_mask(cfg, rotation_accum[name]);

            if !(is_kick && kick_immutable) {
                let mut rng = derive_rng(self.config.seed, "drums/cond", idx as u64, bar as u64);
                layer::apply_conditions(&mut onsets, &cfg.conditions, bar, prev_bar, &mut rng);

                let mut gate = derive_rng(self.config.seed, "drums/gate", idx as u64, bar as u64);
                for (step, slot) in onsets.iter_mut().enumerate() {
                    if *slot && !bernoulli(&mut gate, controller.step_prob(name, step)) {
                        *slot = false;
                    }
                }
            }

            let mut mask = LayerMask::empty();
            for (step, &on) in onsets.iter().enumerate() {
                if on {
                    mask.set(step, cfg.velocity);
                }
            }
            masks.insert(name.clone(), mask);
        }
        masks
    }

    /// Ghost hits and step-0 displacement
    fn articulate(&self, bar: usize, masks: &mut BTreeMap<String, LayerMask>) {
        let kick_immutable = self.config.guard.kick_immutable;
        for (idx, (name, cfg)) in self.config.layers.iter().enumerate() {
            let role = LayerRole::for_name(name);
            if role == LayerRole::Kick && kick_immutable {
                continue;
            }
            if cfg.ghost_pre1_prob <= 0.0 && cfg.displace_into_2_prob <= 0.0 {
                continue;
            }
            let mut rng = derive_rng(self.config.seed, "drums/ghost", idx as u64, bar as u64);
            let Some(mask) = masks.get_mut(name) else {
                continue;
            };

            if cfg.ghost_pre1_prob > 0.0 {
                let onsets: Vec<usize> = mask.onset_steps().collect();
                for step in onsets {
                    let ghost_step = (step + STEPS_PER_BAR - 1) % STEPS_PER_BAR;
                    if !mask.onsets[ghost_step] && bernoulli(&mut rng, cfg.ghost_pre1_prob) {
                        let ghost_vel = ((cfg.velocity as f64) * 0.4).round().max(1.0) as u8;
                        mask.set(ghost_step, ghost_vel);
                    }
                }
            }

            if cfg.displace_into_2_prob > 0.0
                && mask.onsets[0]
                && !mask.onsets[2]
                && bernoulli(&mut rng, cfg.displace_into_2_prob)
            {
                let vel = mask.velocity[0];
                mask.clear(0);
                mask.set(2, vel);
            }
        }
    }

    /// Hat density clamp and near-kick thinning
    fn shape_density(
        &self,
        bar: usize,
        masks: &mut BTreeMap<String, LayerMask>,
        params: &RuntimeParams,
    ) {
        let kick_mask = self.union_of_role(masks, LayerRole::Kick);
        let targets = &self.config.targets;
        for (idx, (name, cfg)) in self.config.layers.iter().enumerate() {
            let role = LayerRole::for_name(name);
            if !role.is_hat() {
                continue;
            }
            let base = layer::base_mask(cfg, 0.0);
            let Some(mask) = masks.get_mut(name) else {
                continue;
            };
            density::clamp_density(
                mask,
                &base,
                &kick_mask,
                targets.hat_density_target,
                targets.hat_density_tol,
                cfg.velocity,
            );
            let mut rng = derive_rng(self.config.seed, "drums/thin", idx as u64, bar as u64);
            density::thin_near_kicks(mask, &kick_mask, params.thin_bias, &mut rng);
        }
    }

    fn accent(&self, bar: usize, masks: &mut BTreeMap<String, LayerMask>, params: &RuntimeParams) {
        let kick_immutable = self.config.guard.kick_immutable;
        for (idx, name) in self.config.layers.keys().enumerate() {
            if LayerRole::for_name(name) == LayerRole::Kick && kick_immutable {
                continue;
            }
            let mut rng = derive_rng(self.config.seed, "drums/accent", idx as u64, bar as u64);
            let Some(mask) = masks.get_mut(name) else {
                continue;
            };
            density::apply_accents(mask, &self.config.accent, params.accent_prob, &mut rng);
        }
    }

    /// Micro-timing and ratchet expansion; masks are frozen by now
    fn schedule(
        &self,
        bar: usize,
        masks: &BTreeMap<String, LayerMask>,
        params: &RuntimeParams,
    ) -> Vec<DrumEvent> {
        let step_ticks = self.tb.step_ticks();
        let cap_ticks = self.tb.ticks_from_ms(self.config.targets.t_ms_cap);
        let mut events = Vec::new();

        for (idx, (name, cfg)) in self.config.layers.iter().enumerate() {
            let role = LayerRole::for_name(name);
            let mask = &masks[name];
            let swing = params.swing.get(name).copied().unwrap_or(0.5);
            let ratchet_prob = params.ratchet_prob.get(name).copied().unwrap_or(0.0);
            let mut micro_rng = derive_rng(self.config.seed, "drums/micro", idx as u64, bar as u64);
            let mut ratchet_rng =
                derive_rng(self.config.seed, "drums/ratchet", idx as u64, bar as u64);

            for step in mask.onset_steps() {
                let swing_ticks = microtiming::swing_offset_ticks(step, swing, step_ticks);
                let bin_ticks = microtiming::sample_bin_offset(cfg, &self.tb, &mut micro_rng);
                let micro = microtiming::cap_micro_offset(swing_ticks + bin_ticks, cap_ticks);
                let velocity = mask.velocity[step];

                let ratchets = if role.is_hat() && bernoulli(&mut ratchet_rng, ratchet_prob) {
                    cfg.ratchet_repeat.max(2)
                } else {
                    1
                };
                let duration = if ratchets > 1 {
                    step_ticks / ratchets as u32
                } else {
                    step_ticks / 2
                };

                for r in 0..ratchets {
                    let decay = 0.8f64.powi(r as i32);
                    events.push(DrumEvent {
                        layer: name.clone(),
                        role,
                        note: cfg.note,
                        bar,
                        step,
                        velocity: ((velocity as f64 * decay).round().max(1.0) as u8).min(127),
                        micro_offset_ticks: micro,
                        duration_ticks: duration.max(1),
                        ratchet_index: r as u8,
                    });
                }
            }
        }
        events
    }

    fn union_of_role(&self, masks: &BTreeMap<String, LayerMask>, role: LayerRole) -> LayerMask {
        let mut union = LayerMask::empty();
        for (name, mask) in masks {
            if LayerRole::for_name(name) != role {
                continue;
            }
            for step in mask.onset_steps() {
                union.set(step, mask.velocity[step]);
            }
        }
        union
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineMode, LayerConfig};

    fn metronome_config(bars: usize) -> Config {
        let mut config = Config::new(EngineMode::DrumsOnly, 120.0, 960, bars, 1);
        config.layers.insert(
            "kick".to_string(),
            LayerConfig {
                fills: 4,
                note: 36,
                velocity: 110,
                ..LayerConfig::default()
            },
        );
        config
    }

    #[test]
    fn test_metronome_baseline() {
        let config = metronome_config(2);
        let tb = config.timebase().unwrap();
        let out = DrumEngine::new(&config, tb).run().unwrap();

        assert_eq!(out.events.len(), 8);
        let ticks: Vec<u32> = out
            .events
            .iter()
            .map(|e| {
                (tb.step_start_tick(e.bar, e.step) as i64 + e.micro_offset_ticks as i64) as u32
            })
            .collect();
        assert_eq!(
            ticks,
            vec![0, 960, 1920, 2880, 3840, 4800, 5760, 6720]
        );
        assert!(out.events.iter().all(|e| e.velocity == 110));
        assert_eq!(out.rescue_bars, 0);
    }

    #[test]
    fn test_kick_immutable_across_bars() {
        let mut config = metronome_config(8);
        config.layers.insert(
            "hat_c".to_string(),
            LayerConfig {
                fills: 12,
                note: 42,
                swing_percent: 0.55,
                ..LayerConfig::default()
            },
        );
        let tb = config.timebase().unwrap();
        let out = DrumEngine::new(&config, tb).run().unwrap();
        for bar in 0..8 {
            let kick_steps: Vec<usize> = out.bar_masks[bar]["kick"].onset_steps().collect();
            assert_eq!(kick_steps, vec![0, 4, 8, 12], "bar {}", bar);
        }
    }

    #[test]
    fn test_step_and_micro_invariants() {
        let mut config = metronome_config(4);
        config.ppq = 1920;
        config.layers.insert(
            "hat_c".to_string(),
            LayerConfig {
                fills: 12,
                note: 42,
                swing_percent: 0.58,
                beat_bins_ms: vec![-6.0, 0.0, 6.0],
                beat_bins_probs: vec![0.25, 0.5, 0.25],
                beat_bin_cap_ms: 6.0,
                ..LayerConfig::default()
            },
        );
        let tb = config.timebase().unwrap();
        let cap = tb.ticks_from_ms(config.targets.t_ms_cap);
        let out = DrumEngine::new(&config, tb).run().unwrap();
        for e in &out.events {
            assert!(e.step < STEPS_PER_BAR);
            assert!(e.micro_offset_ticks.abs() <= cap);
        }
    }

    #[test]
    fn test_deterministic_replay() {
        let mut config = metronome_config(8);
        config.layers.insert(
            "hat_c".to_string(),
            LayerConfig {
                fills: 12,
                note: 42,
                ratchet_prob: 0.2,
                micro_ms: 2.0,
                ..LayerConfig::default()
            },
        );
        let tb = config.timebase().unwrap();
        let a = DrumEngine::new(&config, tb).run().unwrap();
        let b = DrumEngine::new(&config, tb).run().unwrap();
        assert_eq!(a.events, b.events);
    }

    #[test]
    fn test_hat_density_within_tolerance() {
        let mut config = metronome_config(8);
        config.layers.insert(
            "hat_c".to_string(),
            LayerConfig {
                fills: 12,
                note: 42,
                ..LayerConfig::default()
            },
        );
        config.targets.hat_density_target = 0.7;
        config.targets.hat_density_tol = 0.05;
        config.thin_bias = 0.0;
        let tb = config.timebase().unwrap();
        let out = DrumEngine::new(&config, tb).run().unwrap();

        let mut in_range = 0;
        for m in &out.metrics {
            if (0.60..=0.80).contains(&m.h) {
                in_range += 1;
            }
        }
        assert!(in_range >= 7, "hat density in range in {}/8 bars", in_range);
    }
}
