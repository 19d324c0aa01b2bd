//! Host-side round transitions
//!
//! Each color owns two counters. Under [`RoundPolicy::DoubleBuffered`] a new
//! round is armed on the counter nobody is draining: the host zeroes it and
//! flips the color's active generation, while slow blocks of the previous
//! round finish against the old counter. No global barrier stalls other
//! colors.
//!
//! Flipping a color twice while blocks from two rounds ago are still running
//! would zero a counter under them. Waiting for those blocks is the caller's
//! job; the controller only keeps the bookkeeping.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::bindex::{BlockIndexTable, Generation};
use crate::error::{FgpuError, Result};
use crate::layout::MAX_NUM_COLORS;

/// How a color moves from one round of work to the next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RoundPolicy {
    /// Alternate between the two counters; arm the idle one each round
    #[default]
    DoubleBuffered,
    /// Always use generation zero; the caller quiesces the color first
    SingleBuffer,
}

impl fmt::Display for RoundPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DoubleBuffered => write!(f, "double"),
            Self::SingleBuffer => write!(f, "single"),
        }
    }
}

impl FromStr for RoundPolicy {
    type Err = FgpuError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "double" | "double_buffered" | "double-buffered" => Ok(Self::DoubleBuffered),
            "single" | "single_buffer" | "single-buffer" => Ok(Self::SingleBuffer),
            other => Err(FgpuError::Config {
                reason: format!("unknown round policy: {other}"),
            }),
        }
    }
}

/// Per-color active generation and round count
#[derive(Debug, Clone)]
pub struct RoundController<const N: usize = MAX_NUM_COLORS> {
    policy: RoundPolicy,
    active: [Option<Generation>; N],
    rounds: [u64; N],
}

impl<const N: usize> Default for RoundController<N> {
    fn default() -> Self {
        Self::new(RoundPolicy::default())
    }
}

impl<const N: usize> RoundController<N> {
    /// Create a controller with no round started for any color
    #[must_use]
    pub fn new(policy: RoundPolicy) -> Self {
        Self {
            policy,
            active: [None; N],
            rounds: [0; N],
        }
    }

    /// Policy in effect
    #[must_use]
    pub fn policy(&self) -> RoundPolicy {
        self.policy
    }

    /// Generation the current round of `color` draws from, if any round began
    #[must_use]
    pub fn active(&self, color: usize) -> Option<Generation> {
        self.active.get(color).copied().flatten()
    }

    /// Rounds started for `color`
    #[must_use]
    pub fn round(&self, color: usize) -> u64 {
        self.rounds.get(color).copied().unwrap_or(0)
    }

    /// Generation the next round of `color` would use
    #[must_use]
    pub fn next_generation(&self, color: usize) -> Generation {
        match (self.policy, self.active(color)) {
            (RoundPolicy::SingleBuffer, _) | (RoundPolicy::DoubleBuffered, None) => {
                Generation::Zero
            }
            (RoundPolicy::DoubleBuffered, Some(active)) => active.flip(),
        }
    }

    /// Arm and activate the next round of `color`
    ///
    /// Zeroes the counter of the next generation in `table` and makes it
    /// active. Returns the generation to pass to the blocks of the new round.
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` if `color >= N`.
    pub fn begin_round(&mut self, table: &BlockIndexTable<N>, color: usize) -> Result<Generation> {
        table.check_color(color)?;
        let next = self.next_generation(color);
        table.reset(color, next);
        self.active[color] = Some(next);
        self.rounds[color] += 1;
        tracing::debug!(
            color,
            generation = next.index(),
            round = self.rounds[color],
            policy = %self.policy,
            "round started"
        );
        Ok(next)
    }

    /// Begin a round for each listed color
    ///
    /// Validates every color before touching the table.
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` for the first out-of-range color.
    pub fn begin_rounds(
        &mut self,
        table: &BlockIndexTable<N>,
        colors: &[usize],
    ) -> Result<Vec<Generation>> {
        for &color in colors {
            table.check_color(color)?;
        }
        colors
            .iter()
            .map(|&color| self.begin_round(table, color))
            .collect()
    }

    /// Forget all rounds and zero the table
    pub fn reset(&mut self, table: &BlockIndexTable<N>) {
        table.reset_all();
        self.active = [None; N];
        self.rounds = [0; N];
    }
}
