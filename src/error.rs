//! Error types for host-side table management
//!
//! The device-side operations (`claim`, `announce`) cannot fail. Every
//! variant here surfaces at a host boundary: index validation, launch
//! confirmation, or configuration.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which fixed-capacity table an out-of-range index was aimed at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapacityKind {
    /// Color id against the block-index table
    Color,
    /// Physical block slot against the indicator table
    BlockSlot,
}

impl fmt::Display for CapacityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Color => write!(f, "color"),
            Self::BlockSlot => write!(f, "block slot"),
        }
    }
}

/// Error type for fgpu host-side operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FgpuError {
    /// Color or block slot id is beyond the table capacity
    #[error("{kind} {index} exceeds capacity {capacity}")]
    CapacityExceeded {
        /// Which table was indexed
        kind: CapacityKind,
        /// Offending index
        index: usize,
        /// Table capacity
        capacity: usize,
    },

    /// Fewer blocks announced than were launched
    #[error("Under-launch: expected {expected} blocks, observed {observed}")]
    UnderLaunch {
        /// Blocks the host asked for
        expected: usize,
        /// Blocks that announced before the timeout
        observed: usize,
    },

    /// Generation selector other than 0 or 1
    #[error("Invalid generation selector: {0}")]
    InvalidGeneration(u32),

    /// A block slot was assigned to more than one color
    #[error("Block slot {slot} already assigned to color {color}")]
    SlotConflict {
        /// Slot assigned twice
        slot: usize,
        /// Color that already owns the slot
        color: usize,
    },

    /// Invalid configuration value
    #[error("Configuration error: {reason}")]
    Config {
        /// What was wrong
        reason: String,
    },

    /// Report or layout could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Writing output failed
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<serde_json::Error> for FgpuError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for FgpuError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl FgpuError {
    /// Shorthand for a color capacity violation
    pub(crate) fn color(index: usize, capacity: usize) -> Self {
        Self::CapacityExceeded {
            kind: CapacityKind::Color,
            index,
            capacity,
        }
    }

    /// Shorthand for a block slot capacity violation
    pub(crate) fn slot(index: usize, capacity: usize) -> Self {
        Self::CapacityExceeded {
            kind: CapacityKind::BlockSlot,
            index,
            capacity,
        }
    }

    /// Whether the host can recover by relaunching with adjusted parameters
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::UnderLaunch { .. })
    }
}

/// Result alias for fgpu operations
pub type Result<T> = std::result::Result<T, FgpuError>;
