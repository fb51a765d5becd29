//! The theory-aware lead engine
//!
//! Planning (key, harmony, phrases) lives in [`planner`], the static
//! rhythm/contour tables in [`templates`], and the realiser that fuses
//! them into pitched, slot-aligned notes in [`realiser`].

pub mod planner;
pub mod realiser;
pub mod templates;

use serde::{Deserialize, Serialize};

pub use planner::{derive_key, plan_phrases, HarmonyTrack, PhrasePlan, PhraseSegment, Role};
pub use realiser::{LeadEngine, LeadNote, LeadOutput, ToneCategory};

/// Lead playing style; biases template selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadMode {
    /// Lyrical call/response phrases with sustained arcs
    LyricalCr,
    /// Short repeating cells, minimal contour movement
    HypnoticLoop,
}
