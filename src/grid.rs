//! CPU emulation of a persistent-kernel launch
//!
//! Runs the device side of the protocol on the rayon pool: every scheduled
//! block announces its slot, then claims ordinals from its color's counter
//! until the color's work is exhausted. `max_resident` models device
//! occupancy. Blocks past that limit are never scheduled and never announce,
//! which is exactly the under-launch the host has to detect.
//!
//! ## Example
//!
//! ```rust
//! use fgpu::bindex::Generation;
//! use fgpu::grid::PersistentGrid;
//! use fgpu::launch::LaunchPlan;
//! use fgpu::shared::SharedTables;
//!
//! let tables: SharedTables<2, 8> = SharedTables::new();
//! let plan = LaunchPlan::contiguous(&[4, 4], 2, 8).unwrap();
//! let outcome = PersistentGrid::new(&tables, &plan)
//!     .with_max_resident(6)
//!     .run(&[Generation::Zero; 2], &[100, 50])
//!     .unwrap();
//!
//! assert_eq!(outcome.ran_slots.len(), 6);
//! assert!(outcome.is_exhaustive(0, 100));
//! assert!(outcome.is_exhaustive(1, 50));
//! ```

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::bindex::Generation;
use crate::error::{FgpuError, Result};
use crate::launch::LaunchPlan;
use crate::shared::SharedTables;

/// What one emulated block did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRun {
    /// Indicator slot of the block
    pub slot: usize,
    /// Color the block worked for
    pub color: usize,
    /// Ordinals claimed, in claim order
    pub claimed: Vec<i32>,
}

/// Aggregate result of an emulated launch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridOutcome {
    /// Per-block record, ascending by slot
    pub blocks: Vec<BlockRun>,
    /// Slots that were scheduled, ascending
    pub ran_slots: Vec<usize>,
    /// Every ordinal claimed per color, sorted
    pub ordinals: Vec<Vec<i32>>,
}

impl GridOutcome {
    /// Whether `color` saw exactly `0..total`, each once
    #[must_use]
    pub fn is_exhaustive(&self, color: usize, total: i32) -> bool {
        self.ordinals
            .get(color)
            .is_some_and(|ords| ords.iter().copied().eq(0..total))
    }

    /// Work units claimed by blocks of `color`
    #[must_use]
    pub fn claimed(&self, color: usize) -> usize {
        self.ordinals.get(color).map_or(0, Vec::len)
    }
}

/// Emulated launch of a [`LaunchPlan`] against shared tables
#[derive(Debug)]
pub struct PersistentGrid<'a, const C: usize, const P: usize> {
    tables: &'a SharedTables<C, P>,
    plan: &'a LaunchPlan,
    max_resident: usize,
}

impl<'a, const C: usize, const P: usize> PersistentGrid<'a, C, P> {
    /// Grid that schedules every planned block
    #[must_use]
    pub fn new(tables: &'a SharedTables<C, P>, plan: &'a LaunchPlan) -> Self {
        Self {
            tables,
            plan,
            max_resident: usize::MAX,
        }
    }

    /// Limit how many blocks the emulated device schedules
    #[must_use]
    pub fn with_max_resident(mut self, max_resident: usize) -> Self {
        self.max_resident = max_resident;
        self
    }

    /// Run one round
    ///
    /// `generations[c]` and `work[c]` are the generation selector and the
    /// work count passed to blocks of color `c`. Blocks are scheduled in slot
    /// order up to `max_resident`.
    ///
    /// # Errors
    ///
    /// Returns `Config` if `generations` or `work` do not cover every planned
    /// color, and `CapacityExceeded` if the plan does not fit the tables.
    pub fn run(&self, generations: &[Generation], work: &[i32]) -> Result<GridOutcome> {
        let num_colors = self.plan.num_colors();
        if generations.len() < num_colors || work.len() < num_colors {
            return Err(FgpuError::Config {
                reason: format!(
                    "plan has {num_colors} colors, got {} generations and {} work counts",
                    generations.len(),
                    work.len()
                ),
            });
        }

        let mut scheduled = Vec::new();
        for (slot, color) in self.plan.assignments() {
            self.tables.bindexes().check_color(color)?;
            self.tables.indicators().check_slot(slot)?;
            if scheduled.len() < self.max_resident {
                scheduled.push((slot, color));
            }
        }
        tracing::debug!(
            planned = self.plan.total_blocks(),
            scheduled = scheduled.len(),
            "emulated launch"
        );

        let bindexes = self.tables.bindexes();
        let indicators = self.tables.indicators();
        let mut blocks: Vec<BlockRun> = scheduled
            .into_par_iter()
            .map(|(slot, color)| {
                indicators.announce(slot);
                let claimed = std::iter::from_fn(|| {
                    bindexes.claim_bounded(color, generations[color], work[color])
                })
                .collect();
                BlockRun {
                    slot,
                    color,
                    claimed,
                }
            })
            .collect();
        blocks.sort_by_key(|b| b.slot);

        let mut ordinals = vec![Vec::new(); num_colors];
        for block in &blocks {
            ordinals[block.color].extend_from_slice(&block.claimed);
        }
        for ords in &mut ordinals {
            ords.sort_unstable();
        }
        let ran_slots = blocks.iter().map(|b| b.slot).collect();

        Ok(GridOutcome {
            blocks,
            ran_slots,
            ordinals,
        })
    }
}
