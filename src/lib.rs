//! # grooves
//!
//! A deterministic generative groove engine: drum, bass, and lead patterns
//! as streams of timed note events, rendered to Standard MIDI Files.
//!
//! Given a configuration and a seed, the pipeline always reproduces the
//! same output byte for byte: drums are generated by a Euclidean step core
//! under a feedback controller, the emitted grid is analyzed into anchor
//! labels, and the bass and lead engines realise pitched lines against
//! those anchors.
//!
//! ## Quick Start
//!
//! ```no_run
//! use grooves::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::new(EngineMode::Full, 132.0, 1920, 8, 0xBEA7);
//!     config.layers.insert("kick".into(), LayerConfig {
//!         fills: 4, note: 36, ..LayerConfig::default()
//!     });
//!     config.layers.insert("hat_c".into(), LayerConfig {
//!         fills: 12, note: 42, swing_percent: 0.55, ..LayerConfig::default()
//!     });
//!
//!     let result = generate(&config)?;
//!     write_midi("groove.mid".as_ref(), &result.timebase, &result.tracks)?;
//!     Ok(())
//! }
//! ```

pub mod analyzer;
pub mod bass;
pub mod config;
pub mod drums;
pub mod error;
pub mod euclid;
pub mod events;
pub mod lead;
pub mod midi;
pub mod pipeline;
pub mod rng;
pub mod seed_dir;
pub mod theory;
pub mod timebase;

/// Prelude module for convenient imports
pub mod prelude {
    // Pipeline entry points
    pub use crate::pipeline::{generate, Diagnostics, GrooveResult};

    // Configuration
    pub use crate::config::{
        AccentConfig, BassConfig, Config, EngineMode, Guard, LayerConfig, LeadConfig,
        ModulatorConfig, ModulatorMode, StepCondition, Targets,
    };

    // Timebase
    pub use crate::timebase::{Timebase, STEPS_PER_BAR};

    // Engines and their outputs
    pub use crate::analyzer::{SlotGrid, SlotLabel};
    pub use crate::bass::{BassMode, BassNote};
    pub use crate::drums::{DrumEvent, LayerMask};
    pub use crate::lead::{LeadMode, LeadNote};

    // Theory
    pub use crate::theory::{KeySpec, ScaleType};

    // Output
    pub use crate::error::{GrooveError, Result};
    pub use crate::events::{EventKind, TrackStream};
    pub use crate::midi::{write_midi, write_midi_bytes};
    pub use crate::seed_dir::{write_seed_project, SeedMetadata, SeedProvenance};
}
