//! Per-color block-index allocator
//!
//! Persistent blocks of a color pull work by atomically incrementing one of
//! their color's two counters. The pre-increment value is the claimed
//! ordinal. Each color's counters sit on their own cacheline, so blocks of
//! different colors never touch the same line.
//!
//! ## Ownership
//!
//! - Device blocks only increment (`claim`, `claim_bounded`).
//! - The host only zeroes (`reset`, `reset_color`, `reset_all`), and only a
//!   generation no block is currently draining.
//!
//! Nothing enforces the split at runtime; a lock would defeat the point.
//!
//! ## Example
//!
//! ```rust
//! use fgpu::bindex::{BlockIndexTable, Generation};
//!
//! let table: BlockIndexTable = BlockIndexTable::new();
//! assert_eq!(table.claim(0, Generation::Zero), 0);
//! assert_eq!(table.claim(0, Generation::Zero), 1);
//! assert_eq!(table.claim(1, Generation::Zero), 0);
//! ```

use std::sync::atomic::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{FgpuError, Result};
use crate::layout::{BlockIndex, TableLayout, MAX_NUM_COLORS, NUM_GENERATIONS};

/// Which of a color's two counters a round draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Generation {
    /// `index[0]`
    #[default]
    Zero,
    /// `index[1]`
    One,
}

impl Generation {
    /// Both generations in index order
    pub const ALL: [Generation; NUM_GENERATIONS] = [Generation::Zero, Generation::One];

    /// Counter index addressed by this generation
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Zero => 0,
            Self::One => 1,
        }
    }

    /// The other generation
    #[inline]
    #[must_use]
    pub const fn flip(self) -> Self {
        match self {
            Self::Zero => Self::One,
            Self::One => Self::Zero,
        }
    }
}

impl TryFrom<u32> for Generation {
    type Error = FgpuError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Self::Zero),
            1 => Ok(Self::One),
            other => Err(FgpuError::InvalidGeneration(other)),
        }
    }
}

impl From<Generation> for u32 {
    fn from(generation: Generation) -> Self {
        generation.index() as u32
    }
}

/// Fixed-capacity table of per-color counter pairs
///
/// `N` is the color capacity and never changes after allocation.
#[derive(Debug)]
pub struct BlockIndexTable<const N: usize = MAX_NUM_COLORS> {
    slots: Box<[BlockIndex]>,
}

impl<const N: usize> Default for BlockIndexTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> BlockIndexTable<N> {
    /// Allocate a zeroed table
    #[must_use]
    pub fn new() -> Self {
        let slots = (0..N).map(|_| BlockIndex::default()).collect();
        Self { slots }
    }

    /// Color capacity
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Validate a color id against the capacity
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` if `color >= N`.
    pub fn check_color(&self, color: usize) -> Result<()> {
        if color < N {
            Ok(())
        } else {
            Err(FgpuError::color(color, N))
        }
    }

    /// Claim the next ordinal of `color`'s `generation` counter
    ///
    /// Atomic fetch-and-increment; returns the pre-increment value. No upper
    /// bound is applied: the caller compares the ordinal against its own work
    /// count. `color` must already be validated; an out-of-range color is a
    /// contract violation and panics on the slice index.
    #[inline]
    pub fn claim(&self, color: usize, generation: Generation) -> i32 {
        self.slots[color].index[generation.index()].fetch_add(1, Ordering::AcqRel)
    }

    /// Claim with host-side validation of the color id
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` if `color >= N`.
    pub fn try_claim(&self, color: usize, generation: Generation) -> Result<i32> {
        self.check_color(color)?;
        Ok(self.claim(color, generation))
    }

    /// Claim and compare against the round's work count
    ///
    /// Returns `None` once the ordinal reaches `total`, which is the signal
    /// for a persistent block to leave its loop. The counter still advances
    /// on the terminating claim, so after a round it reads `total` plus the
    /// number of blocks that observed exhaustion.
    ///
    /// The counter is a device `int` and wraps at `i32::MAX`. A wrapped,
    /// negative ordinal still compares below `total` and is handed out, so a
    /// color's counter must be reset before `i32::MAX` claims accumulate on it.
    #[inline]
    pub fn claim_bounded(&self, color: usize, generation: Generation, total: i32) -> Option<i32> {
        let ordinal = self.claim(color, generation);
        (ordinal < total).then_some(ordinal)
    }

    /// Current value of a counter
    #[must_use]
    pub fn load(&self, color: usize, generation: Generation) -> i32 {
        self.slots[color].index[generation.index()].load(Ordering::Acquire)
    }

    /// Zero one counter
    ///
    /// Host only, and only for a generation no block is draining.
    pub fn reset(&self, color: usize, generation: Generation) {
        self.slots[color].index[generation.index()].store(0, Ordering::Release);
        tracing::trace!(color, generation = generation.index(), "block index reset");
    }

    /// Zero both counters of a color
    pub fn reset_color(&self, color: usize) {
        for generation in Generation::ALL {
            self.reset(color, generation);
        }
    }

    /// Zero every counter in the table
    pub fn reset_all(&self) {
        for slot in self.slots.iter() {
            for counter in &slot.index {
                counter.store(0, Ordering::Release);
            }
        }
        tracing::debug!(colors = N, "block index table reset");
    }

    /// Copy of every counter pair, indexed by color
    #[must_use]
    pub fn snapshot(&self) -> Vec<[i32; NUM_GENERATIONS]> {
        self.slots
            .iter()
            .map(|slot| {
                [
                    slot.index[0].load(Ordering::Acquire),
                    slot.index[1].load(Ordering::Acquire),
                ]
            })
            .collect()
    }

    /// Address of the first record, for handing to a device mapping
    #[must_use]
    pub fn as_ptr(&self) -> *const BlockIndex {
        self.slots.as_ptr()
    }

    /// Byte size of the table
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        std::mem::size_of_val(&*self.slots)
    }

    /// Layout description of this table
    #[must_use]
    pub fn layout(&self) -> TableLayout {
        TableLayout::block_index(N)
    }
}
