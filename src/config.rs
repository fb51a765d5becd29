//! Declarative configuration for the generative pipeline
//!
//! The embedding program hands the engine a fully-parsed [`Config`]; file
//! reading and CLI plumbing live outside this crate. Unknown keys are
//! rejected at parse time, and every numeric range is checked by
//! [`Config::validate`] before any generation starts.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::bass::BassMode;
use crate::error::{GrooveError, Result};
use crate::lead::LeadMode;
use crate::theory::KeySpec;
use crate::timebase::{Timebase, STEPS_PER_BAR};

/// Which engines run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineMode {
    #[serde(rename = "drums_only")]
    DrumsOnly,
    #[serde(rename = "drums+bass")]
    DrumsBass,
    #[serde(rename = "full")]
    Full,
}

impl EngineMode {
    pub fn wants_bass(&self) -> bool {
        matches!(self, EngineMode::DrumsBass | EngineMode::Full)
    }

    pub fn wants_lead(&self) -> bool {
        matches!(self, EngineMode::Full)
    }
}

/// Instrument role of a drum layer, inferred from its name
///
/// The analyzer and the choke/ghost passes need to know which layers are
/// kicks, snares, and hats; the convention is carried by the layer name
/// (`kick`, `snare`, `clap`, `hat_c`, `hat_o`, anything else is generic
/// percussion).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerRole {
    Kick,
    Snare,
    Clap,
    HatClosed,
    HatOpen,
    Perc,
}

impl LayerRole {
    /// Infer the role from a layer name
    pub fn for_name(name: &str) -> Self {
        if name.starts_with("kick") {
            LayerRole::Kick
        } else if name.starts_with("snare") {
            LayerRole::Snare
        } else if name.starts_with("clap") {
            LayerRole::Clap
        } else if name.starts_with("hat_o") || name.starts_with("open_hat") {
            LayerRole::HatOpen
        } else if name.starts_with("hat") || name.starts_with("hh") {
            LayerRole::HatClosed
        } else {
            LayerRole::Perc
        }
    }

    pub fn is_hat(&self) -> bool {
        matches!(self, LayerRole::HatClosed | LayerRole::HatOpen)
    }

    pub fn is_backbeat(&self) -> bool {
        matches!(self, LayerRole::Snare | LayerRole::Clap)
    }
}

/// Step gate conditions, composed left to right; an onset survives iff all pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepCondition {
    /// Keep the onset with probability `p`
    Prob { p: f64 },
    /// Keep only if `layer` had an onset at the same step of the prior bar
    Pre { layer: String },
    /// Keep only if `layer` did NOT have an onset there in the prior bar
    NotPre { layer: String },
    /// Keep only in the final bar of each 4-bar phrase
    Fill,
    /// Keep when `(bar + offset) mod n == 0`
    EveryN { n: u32, offset: u32 },
}

/// Per-layer rhythm, timing, and articulation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LayerConfig {
    /// Steps per bar; fixed at 16 in this engine
    pub steps: usize,
    /// Euclidean fill count
    pub fills: usize,
    /// Initial rotation of the Euclidean mask
    pub rot: i32,
    /// MIDI note emitted by this layer
    pub note: u8,
    /// Base velocity
    pub velocity: u8,
    /// Swing amount; 0.5 is straight, capped at 0.62
    pub swing_percent: f64,
    /// Gaussian humanisation applied on top of the beat bins (std dev, ms)
    pub micro_ms: f64,
    /// Discrete micro-offset bins (ms), sampled per onset
    pub beat_bins_ms: Vec<f64>,
    /// Sampling weights for `beat_bins_ms`, same length
    pub beat_bins_probs: Vec<f64>,
    /// Hard clamp on the sampled bin offset (ms)
    pub beat_bin_cap_ms: f64,
    /// Restrict the base mask to offbeat 8ths (steps 2, 6, 10, 14)
    pub offbeats_only: bool,
    /// Probability that an onset ratchets into sub-hits
    pub ratchet_prob: f64,
    /// Number of sub-hits in a ratchet
    pub ratchet_repeat: usize,
    /// Onsets in the layer carrying this MIDI note choke this layer
    pub choke_with_note: Option<u8>,
    /// Rotation drift accrued per bar
    pub rotation_rate_per_bar: f64,
    /// Probability of a ghost hit one step before a backbeat onset
    pub ghost_pre1_prob: f64,
    /// Probability that a step-0 onset is displaced into step 2
    pub displace_into_2_prob: f64,
    /// Condition stack applied after mask generation
    pub conditions: Vec<StepCondition>,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            steps: STEPS_PER_BAR,
            fills: 0,
            rot: 0,
            note: 36,
            velocity: 100,
            swing_percent: 0.5,
            micro_ms: 0.0,
            beat_bins_ms: Vec::new(),
            beat_bins_probs: Vec::new(),
            beat_bin_cap_ms: 0.0,
            offbeats_only: false,
            ratchet_prob: 0.0,
            ratchet_repeat: 2,
            choke_with_note: None,
            rotation_rate_per_bar: 0.0,
            ghost_pre1_prob: 0.0,
            displace_into_2_prob: 0.0,
            conditions: Vec::new(),
        }
    }
}

/// Controller targets for the per-bar metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Targets {
    pub s_low: f64,
    pub s_high: f64,
    pub e_target: f64,
    /// Cap on mean absolute micro offset per layer (ms)
    pub t_ms_cap: f64,
    pub h_low: f64,
    pub h_high: f64,
    pub hat_density_target: f64,
    pub hat_density_tol: f64,
}

impl Default for Targets {
    fn default() -> Self {
        Self {
            s_low: 0.35,
            s_high: 0.65,
            e_target: 0.75,
            t_ms_cap: 12.0,
            h_low: 0.4,
            h_high: 0.9,
            hat_density_target: 0.7,
            hat_density_tol: 0.05,
        }
    }
}

/// Continuity guardrails for the feedback controller
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Guard {
    /// Entrainment floor; falling below triggers a rescue bar
    pub min_e: f64,
    /// Cap on rotation drift rate (steps per bar); 0 disables the cap
    pub max_rot_rate: f64,
    /// Never let conditions, probability gates, or the controller touch the kick
    pub kick_immutable: bool,
}

impl Default for Guard {
    fn default() -> Self {
        Self {
            min_e: 0.7,
            max_rot_rate: 0.5,
            kick_immutable: true,
        }
    }
}

/// Accent placement strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccentPlacement {
    Random,
    OffbeatFocused,
    DownbeatFocused,
}

/// Post-schedule accent pass settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AccentConfig {
    pub prob: f64,
    /// Velocity multiplier for accented onsets
    pub gain: f64,
    pub placement: AccentPlacement,
}

impl Default for AccentConfig {
    fn default() -> Self {
        Self {
            prob: 0.25,
            gain: 1.25,
            placement: AccentPlacement::Random,
        }
    }
}

/// Long-horizon modulator modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModulatorMode {
    RandomWalk,
    Ou,
    Sine,
}

/// One long-horizon parameter modulator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModulatorConfig {
    /// Dotted path of the driven parameter (see [`ParamTarget`])
    pub param_path: String,
    pub mode: ModulatorMode,
    pub min_val: f64,
    pub max_val: f64,
    /// Step scale per bar (walk increment, OU noise, or sine amplitude rate)
    pub step_per_bar: f64,
    /// OU relaxation time constant in bars
    #[serde(default)]
    pub tau: Option<f64>,
    /// Hard cap on per-bar movement
    pub max_delta_per_bar: f64,
    /// Sine phase offset in radians
    #[serde(default)]
    pub phase: Option<f64>,
}

/// Resolved modulator destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamTarget {
    ThinBias,
    AccentProb,
    Swing(String),
    RatchetProb(String),
    KickRotationRate,
}

/// Resolve a modulator `param_path` against the configured layers
///
/// Recognised paths: `thin_bias`, `accent.prob`, `<layer>.swing_percent`,
/// `<layer>.ratchet_prob`, `kick.rotation_rate_per_bar`.
pub fn resolve_param_path(
    path: &str,
    layers: &BTreeMap<String, LayerConfig>,
) -> Result<ParamTarget> {
    match path {
        "thin_bias" => return Ok(ParamTarget::ThinBias),
        "accent.prob" => return Ok(ParamTarget::AccentProb),
        "kick.rotation_rate_per_bar" => return Ok(ParamTarget::KickRotationRate),
        _ => {}
    }
    if let Some(layer) = path.strip_suffix(".swing_percent") {
        if layers.contains_key(layer) {
            return Ok(ParamTarget::Swing(layer.to_string()));
        }
    }
    if let Some(layer) = path.strip_suffix(".ratchet_prob") {
        if layers.contains_key(layer) {
            return Ok(ParamTarget::RatchetProb(layer.to_string()));
        }
    }
    Err(GrooveError::UnknownParamPath(path.to_string()))
}

/// How the bass mode is chosen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BassModeSelect {
    /// One mode for the whole pattern
    Fixed(BassMode),
    /// Explicit per-bar list, cycled if shorter than the pattern
    PerBar(Vec<BassMode>),
}

/// Slot-scoring weights for the bass engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BassWeights {
    pub w_tag: f64,
    pub w_anchor: f64,
    pub w_strength: f64,
    pub w_density: f64,
    pub w_overlap: f64,
    pub w_kick_avoid: f64,
}

impl Default for BassWeights {
    fn default() -> Self {
        Self {
            w_tag: 1.0,
            w_anchor: 0.6,
            w_strength: 0.5,
            w_density: 0.3,
            w_overlap: 2.0,
            w_kick_avoid: 2.0,
        }
    }
}

/// Bass engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BassConfig {
    /// Mode override; `None` selects from seed tags and drum energy
    pub mode: Option<BassModeSelect>,
    /// Tonic MIDI note (A1 = 33, A2 = 45)
    pub root_note: u8,
    /// Register override; `None` uses the mode's range
    pub register: Option<(u8, u8)>,
    /// Density override as a fraction of 16 steps; `None` uses the mode's midpoint
    pub density_target: Option<f64>,
    /// Register gravitation centre; `None` centres on the root
    pub gravity_center: Option<u8>,
    pub weights: BassWeights,
    pub velocity: u8,
}

impl Default for BassConfig {
    fn default() -> Self {
        Self {
            mode: None,
            root_note: 45,
            register: None,
            density_target: None,
            gravity_center: None,
            weights: BassWeights::default(),
            velocity: 100,
        }
    }
}

/// Slot-scoring and voice-leading weights for the lead realiser
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LeadWeights {
    pub w_role_tag: f64,
    pub w_anchor: f64,
    pub w_strength: f64,
    pub w_density: f64,
    pub w_overlap: f64,
    /// Voice-leading: semitone jump cost
    pub alpha: f64,
    /// Voice-leading: distance-from-gravity cost
    pub beta: f64,
    /// Voice-leading: contour emphasis violation cost
    pub gamma: f64,
}

impl Default for LeadWeights {
    fn default() -> Self {
        Self {
            w_role_tag: 1.0,
            w_anchor: 0.6,
            w_strength: 0.5,
            w_density: 0.3,
            w_overlap: 2.0,
            alpha: 1.0,
            beta: 0.3,
            gamma: 0.5,
        }
    }
}

/// Lead/bass collision avoidance settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BassInteractionConfig {
    pub enabled: bool,
    pub min_semitone_distance: i32,
    /// Keep the lead off the root when the bass plays it on a strong beat
    pub avoid_root_on_bass_hits: bool,
}

impl Default for BassInteractionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_semitone_distance: 3,
            avoid_root_on_bass_hits: true,
        }
    }
}

/// Lead engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LeadConfig {
    pub mode: LeadMode,
    /// Explicit key override; `None` derives from seed tags or bass content
    pub key: Option<KeySpec>,
    pub register_low: u8,
    pub register_high: u8,
    pub gravity_center: u8,
    /// Slot search radius around a note's nominal step
    pub max_step_jitter: usize,
    pub min_inter_note_gap_steps: usize,
    /// Bounded register drift applied once per new phrase (semitones)
    pub register_drift_per_phrase: i32,
    pub phrase_min_bars: usize,
    pub phrase_max_bars: usize,
    /// Cyclic role pattern, e.g. "CRCR"
    pub call_response_pattern: String,
    /// 1-based degrees a phrase may resolve to
    pub phrase_end_resolution_degrees: Vec<usize>,
    pub weights: LeadWeights,
    pub bass_interaction: BassInteractionConfig,
    pub velocity: u8,
}

impl Default for LeadConfig {
    fn default() -> Self {
        Self {
            mode: LeadMode::LyricalCr,
            key: None,
            register_low: 57,
            register_high: 81,
            gravity_center: 69,
            max_step_jitter: 1,
            min_inter_note_gap_steps: 1,
            register_drift_per_phrase: 2,
            phrase_min_bars: 2,
            phrase_max_bars: 4,
            call_response_pattern: "CR".to_string(),
            phrase_end_resolution_degrees: vec![1, 5],
            weights: LeadWeights::default(),
            bass_interaction: BassInteractionConfig::default(),
            velocity: 96,
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub mode: EngineMode,
    pub bpm: f64,
    pub ppq: u16,
    pub bars: usize,
    /// Root seed; every stage derives its own stream from this
    pub seed: u64,
    /// Aesthetic tags (`warehouse`, `hypnotic`, `key_9_aeolian`, ...)
    #[serde(default)]
    pub tags: Vec<String>,
    pub layers: BTreeMap<String, LayerConfig>,
    #[serde(default)]
    pub targets: Targets,
    #[serde(default)]
    pub guard: Guard,
    #[serde(default)]
    pub accent: AccentConfig,
    /// Strength of near-kick thinning in the density clamp
    #[serde(default = "default_thin_bias")]
    pub thin_bias: f64,
    #[serde(default)]
    pub modulators: Vec<ModulatorConfig>,
    #[serde(default)]
    pub bass: BassConfig,
    #[serde(default)]
    pub lead: LeadConfig,
    /// Per-bar metrics CSV destination; best-effort writes
    #[serde(default)]
    pub metrics_csv: Option<PathBuf>,
}

fn default_thin_bias() -> f64 {
    0.3
}

impl Config {
    /// Minimal configuration with no layers
    pub fn new(mode: EngineMode, bpm: f64, ppq: u16, bars: usize, seed: u64) -> Self {
        Self {
            mode,
            bpm,
            ppq,
            bars,
            seed,
            tags: Vec::new(),
            layers: BTreeMap::new(),
            targets: Targets::default(),
            guard: Guard::default(),
            accent: AccentConfig::default(),
            thin_bias: default_thin_bias(),
            modulators: Vec::new(),
            bass: BassConfig::default(),
            lead: LeadConfig::default(),
            metrics_csv: None,
        }
    }

    pub fn timebase(&self) -> Result<Timebase> {
        Timebase::new(self.bpm, self.ppq, self.bars)
    }

    /// Parse a configuration from JSON, rejecting unknown keys
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)
            .map_err(|e| GrooveError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| GrooveError::Io(e.to_string()))
    }

    /// Check every declared range; fatal before any generation
    pub fn validate(&self) -> Result<()> {
        self.timebase()?;

        for (name, layer) in &self.layers {
            if layer.steps != STEPS_PER_BAR {
                return Err(GrooveError::InvalidConfig(format!(
                    "layer '{}': steps {} != {}",
                    name, layer.steps, STEPS_PER_BAR
                )));
            }
            if layer.fills > STEPS_PER_BAR {
                return Err(GrooveError::InvalidConfig(format!(
                    "layer '{}': fills {} > {}",
                    name, layer.fills, STEPS_PER_BAR
                )));
            }
            if !(0.5..=0.62).contains(&layer.swing_percent) {
                return Err(GrooveError::InvalidConfig(format!(
                    "layer '{}': swing_percent {} outside [0.5, 0.62]",
                    name, layer.swing_percent
                )));
            }
            if !(0.0..=0.3).contains(&layer.ratchet_prob) {
                return Err(GrooveError::InvalidConfig(format!(
                    "layer '{}': ratchet_prob {} outside [0, 0.3]",
                    name, layer.ratchet_prob
                )));
            }
            if layer.ratchet_repeat < 2 || layer.ratchet_repeat > 4 {
                return Err(GrooveError::InvalidConfig(format!(
                    "layer '{}': ratchet_repeat {} outside [2, 4]",
                    name, layer.ratchet_repeat
                )));
            }
            if layer.beat_bins_ms.len() != layer.beat_bins_probs.len() {
                return Err(GrooveError::InvalidConfig(format!(
                    "layer '{}': {} beat bins but {} probabilities",
                    name,
                    layer.beat_bins_ms.len(),
                    layer.beat_bins_probs.len()
                )));
            }
            if layer.velocity == 0 {
                return Err(GrooveError::InvalidConfig(format!(
                    "layer '{}': velocity must be >= 1",
                    name
                )));
            }
            for p in [layer.ghost_pre1_prob, layer.displace_into_2_prob] {
                if !(0.0..=1.0).contains(&p) {
                    return Err(GrooveError::InvalidConfig(format!(
                        "layer '{}': probability {} outside [0, 1]",
                        name, p
                    )));
                }
            }
            for cond in &layer.conditions {
                match cond {
                    StepCondition::Prob { p } if !(0.0..=1.0).contains(p) => {
                        return Err(GrooveError::InvalidConfig(format!(
                            "layer '{}': condition probability {} outside [0, 1]",
                            name, p
                        )));
                    }
                    StepCondition::Pre { layer: other } | StepCondition::NotPre { layer: other }
                        if !self.layers.contains_key(other) =>
                    {
                        return Err(GrooveError::InvalidConfig(format!(
                            "layer '{}': condition references unknown layer '{}'",
                            name, other
                        )));
                    }
                    StepCondition::EveryN { n, .. } if *n == 0 => {
                        return Err(GrooveError::InvalidConfig(format!(
                            "layer '{}': every_n with n = 0",
                            name
                        )));
                    }
                    _ => {}
                }
            }
        }

        for m in &self.modulators {
            resolve_param_path(&m.param_path, &self.layers)?;
            if m.min_val > m.max_val {
                return Err(GrooveError::InvalidConfig(format!(
                    "modulator '{}': min_val {} > max_val {}",
                    m.param_path, m.min_val, m.max_val
                )));
            }
            if m.mode == ModulatorMode::Ou && m.tau.map_or(true, |t| t <= 0.0) {
                return Err(GrooveError::InvalidConfig(format!(
                    "modulator '{}': ou mode requires tau > 0",
                    m.param_path
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.accent.prob) {
            return Err(GrooveError::InvalidConfig(format!(
                "accent.prob {} outside [0, 1]",
                self.accent.prob
            )));
        }
        if !(0.0..=1.0).contains(&self.thin_bias) {
            return Err(GrooveError::InvalidConfig(format!(
                "thin_bias {} outside [0, 1]",
                self.thin_bias
            )));
        }

        if let Some((lo, hi)) = self.bass.register {
            if lo >= hi {
                return Err(GrooveError::InvalidConfig(format!(
                    "bass register [{}, {}] is empty",
                    lo, hi
                )));
            }
        }

        let lead = &self.lead;
        if lead.register_low >= lead.register_high {
            return Err(GrooveError::InvalidConfig(format!(
                "lead register [{}, {}] is empty",
                lead.register_low, lead.register_high
            )));
        }
        if lead.phrase_min_bars == 0 || lead.phrase_min_bars > lead.phrase_max_bars {
            return Err(GrooveError::InvalidConfig(format!(
                "lead phrase bars [{}, {}] invalid",
                lead.phrase_min_bars, lead.phrase_max_bars
            )));
        }
        if lead.call_response_pattern.is_empty()
            || !lead
                .call_response_pattern
                .chars()
                .all(|c| c == 'C' || c == 'R')
        {
            return Err(GrooveError::InvalidConfig(format!(
                "call_response_pattern '{}' must be a non-empty string of C and R",
                lead.call_response_pattern
            )));
        }
        if lead.phrase_end_resolution_degrees.is_empty()
            || lead
                .phrase_end_resolution_degrees
                .iter()
                .any(|&d| d == 0 || d > 7)
        {
            return Err(GrooveError::InvalidConfig(
                "phrase_end_resolution_degrees must be non-empty, degrees in 1..=7".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        let mut config = Config::new(EngineMode::DrumsOnly, 120.0, 1920, 2, 7);
        config.layers.insert(
            "kick".to_string(),
            LayerConfig {
                fills: 4,
                note: 36,
                ..LayerConfig::default()
            },
        );
        config
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_swing_range_enforced() {
        let mut config = base_config();
        config.layers.get_mut("kick").unwrap().swing_percent = 0.7;
        assert!(matches!(
            config.validate(),
            Err(GrooveError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_condition_layer_reference_checked() {
        let mut config = base_config();
        config.layers.get_mut("kick").unwrap().conditions = vec![StepCondition::Pre {
            layer: "ghost".to_string(),
        }];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_param_path_rejected() {
        let mut config = base_config();
        config.modulators.push(ModulatorConfig {
            param_path: "kick.sizzle".to_string(),
            mode: ModulatorMode::RandomWalk,
            min_val: 0.0,
            max_val: 1.0,
            step_per_bar: 0.01,
            tau: None,
            max_delta_per_bar: 0.05,
            phase: None,
        });
        assert!(matches!(
            config.validate(),
            Err(GrooveError::UnknownParamPath(_))
        ));
    }

    #[test]
    fn test_param_path_resolution() {
        let config = base_config();
        assert_eq!(
            resolve_param_path("thin_bias", &config.layers).unwrap(),
            ParamTarget::ThinBias
        );
        assert_eq!(
            resolve_param_path("kick.swing_percent", &config.layers).unwrap(),
            ParamTarget::Swing("kick".to_string())
        );
        assert_eq!(
            resolve_param_path("kick.rotation_rate_per_bar", &config.layers).unwrap(),
            ParamTarget::KickRotationRate
        );
        assert!(resolve_param_path("hat_c.swing_percent", &config.layers).is_err());
    }

    #[test]
    fn test_layer_roles() {
        assert_eq!(LayerRole::for_name("kick"), LayerRole::Kick);
        assert_eq!(LayerRole::for_name("hat_c"), LayerRole::HatClosed);
        assert_eq!(LayerRole::for_name("hat_o"), LayerRole::HatOpen);
        assert_eq!(LayerRole::for_name("clap"), LayerRole::Clap);
        assert_eq!(LayerRole::for_name("ride"), LayerRole::Perc);
    }

    #[test]
    fn test_json_round_trip_rejects_unknown_keys() {
        let config = base_config();
        let json = config.to_json().unwrap();
        let parsed = Config::from_json(&json).unwrap();
        assert_eq!(config, parsed);

        let broken = json.replace("\"bpm\"", "\"bpmm\"");
        assert!(Config::from_json(&broken).is_err());
    }
}
