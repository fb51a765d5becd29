//! Error types for the grooves library
//!
//! Configuration and reference errors are fatal and surfaced before any
//! generation begins. Constraint failures inside the engines (bass
//! validation, lead slot search) are recovered locally and reported through
//! [`crate::pipeline::Diagnostics`], never through this type.

use std::fmt;

/// Main error type for the grooves library
#[derive(Debug, Clone)]
pub enum GrooveError {
    /// A configuration value is outside its declared range
    InvalidConfig(String),

    /// A modulator references a parameter path that does not exist
    UnknownParamPath(String),

    /// Key derivation met a scale name that is not recognised
    UnknownScale(String),

    /// MIDI serialisation failed
    Midi(String),

    /// IO error (seed directory or CSV writer)
    Io(String),
}

impl fmt::Display for GrooveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrooveError::InvalidConfig(msg) => {
                write!(f, "Invalid configuration: {}", msg)
            }
            GrooveError::UnknownParamPath(path) => {
                write!(
                    f,
                    "Unknown modulator parameter path '{}'. Recognised paths: thin_bias, \
                     accent.prob, <layer>.swing_percent, <layer>.ratchet_prob, \
                     kick.rotation_rate_per_bar",
                    path
                )
            }
            GrooveError::UnknownScale(name) => {
                write!(
                    f,
                    "Unknown scale '{}'. Recognised scales: aeolian, dorian, phrygian, minor_pent",
                    name
                )
            }
            GrooveError::Midi(msg) => {
                write!(f, "MIDI error: {}", msg)
            }
            GrooveError::Io(msg) => {
                write!(f, "IO error: {}", msg)
            }
        }
    }
}

impl std::error::Error for GrooveError {}

impl From<std::io::Error> for GrooveError {
    fn from(err: std::io::Error) -> Self {
        GrooveError::Io(err.to_string())
    }
}

/// Result type alias for grooves operations
pub type Result<T> = std::result::Result<T, GrooveError>;
