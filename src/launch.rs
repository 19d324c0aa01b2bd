//! Launch planning and confirmation
//!
//! The host decides which indicator slots each color's blocks occupy, launches
//! the grid, then confirms occupancy from the indicator table before it trusts
//! throughput numbers or starts a dependent phase. The policy for a degraded
//! launch (retry, shrink a color, abort) stays with the caller; this module
//! only produces the report.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::{FgpuConfig, PollConfig};
use crate::error::{FgpuError, Result};
use crate::indicator::IndicatorTable;

/// Host bookkeeping of which block slots belong to which color
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchPlan {
    /// Slots per color, in assignment order
    colors: Vec<Vec<usize>>,
    /// Owning color per slot
    owner: Vec<Option<usize>>,
}

impl LaunchPlan {
    /// Empty plan for `num_colors` colors over `num_pblocks` block slots
    #[must_use]
    pub fn new(num_colors: usize, num_pblocks: usize) -> Self {
        Self {
            colors: vec![Vec::new(); num_colors],
            owner: vec![None; num_pblocks],
        }
    }

    /// Empty plan sized from a configuration
    #[must_use]
    pub fn from_config(config: &FgpuConfig) -> Self {
        Self::new(config.num_colors, config.num_pblocks)
    }

    /// Plan giving color `i` the next `blocks_per_color[i]` consecutive slots
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` if the colors or the total block count do
    /// not fit.
    pub fn contiguous(
        blocks_per_color: &[usize],
        num_colors: usize,
        num_pblocks: usize,
    ) -> Result<Self> {
        let mut plan = Self::new(num_colors, num_pblocks);
        let mut next = 0;
        for (color, &count) in blocks_per_color.iter().enumerate() {
            plan.assign(color, next..next + count)?;
            next += count;
        }
        Ok(plan)
    }

    /// Give `slots` to `color`
    ///
    /// All slots are checked before any is recorded.
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` for an out-of-range color or slot, and
    /// `SlotConflict` if a slot already belongs to a color or is listed twice.
    pub fn assign(&mut self, color: usize, slots: impl IntoIterator<Item = usize>) -> Result<()> {
        if color >= self.colors.len() {
            return Err(FgpuError::color(color, self.colors.len()));
        }
        let slots: Vec<usize> = slots.into_iter().collect();
        let mut pending = std::collections::HashSet::with_capacity(slots.len());
        for &slot in &slots {
            let owner = self
                .owner
                .get(slot)
                .ok_or_else(|| FgpuError::slot(slot, self.owner.len()))?;
            if let Some(existing) = owner {
                return Err(FgpuError::SlotConflict {
                    slot,
                    color: *existing,
                });
            }
            if !pending.insert(slot) {
                return Err(FgpuError::SlotConflict { slot, color });
            }
        }
        for &slot in &slots {
            self.owner[slot] = Some(color);
        }
        self.colors[color].extend(slots);
        Ok(())
    }

    /// Slots assigned to `color`
    #[must_use]
    pub fn slots(&self, color: usize) -> &[usize] {
        self.colors.get(color).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Color owning `slot`, if assigned
    #[must_use]
    pub fn color_of(&self, slot: usize) -> Option<usize> {
        self.owner.get(slot).copied().flatten()
    }

    /// Number of colors the plan covers
    #[must_use]
    pub fn num_colors(&self) -> usize {
        self.colors.len()
    }

    /// Blocks assigned across all colors
    #[must_use]
    pub fn total_blocks(&self) -> usize {
        self.colors.iter().map(Vec::len).sum()
    }

    /// `(slot, color)` pairs in ascending slot order
    pub fn assignments(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.owner
            .iter()
            .enumerate()
            .filter_map(|(slot, owner)| owner.map(|color| (slot, color)))
    }
}

/// Outcome classification of a launch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaunchStatus {
    /// Every planned block announced
    Complete,
    /// Some planned blocks never announced
    Degraded,
}

/// Occupancy of one color after launch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorOccupancy {
    /// Color id
    pub color: usize,
    /// Blocks planned for the color
    pub expected: usize,
    /// Blocks of the color that announced
    pub observed: usize,
}

/// Result of confirming a launch against the indicator table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchReport {
    /// Blocks planned
    pub expected: usize,
    /// Planned blocks that announced
    pub observed: usize,
    /// Per-color breakdown
    pub colors: Vec<ColorOccupancy>,
    /// Planned slots that never announced
    pub missing_slots: Vec<usize>,
    /// Time spent polling
    pub elapsed: Duration,
}

impl LaunchReport {
    /// Complete or degraded
    #[must_use]
    pub fn status(&self) -> LaunchStatus {
        if self.observed >= self.expected {
            LaunchStatus::Complete
        } else {
            LaunchStatus::Degraded
        }
    }

    /// Fraction of planned blocks that came up
    #[must_use]
    pub fn occupancy(&self) -> f64 {
        if self.expected == 0 {
            1.0
        } else {
            self.observed as f64 / self.expected as f64
        }
    }
}

/// Poll the indicators for `plan` and report, without failing on a shortfall
///
/// # Errors
///
/// Returns `CapacityExceeded` if the plan addresses slots beyond the table.
pub fn inspect_launch<const P: usize>(
    plan: &LaunchPlan,
    indicators: &IndicatorTable<P>,
    poll: &PollConfig,
) -> Result<LaunchReport> {
    let planned: Vec<usize> = plan.assignments().map(|(slot, _)| slot).collect();
    if let Some(&slot) = planned.iter().find(|&&slot| slot >= P) {
        return Err(FgpuError::slot(slot, P));
    }

    let expected = planned.len();
    let start = Instant::now();
    let polled = indicators.poll_slots(&planned, poll);
    let elapsed = start.elapsed();

    let mut colors: Vec<ColorOccupancy> = (0..plan.num_colors())
        .map(|color| ColorOccupancy {
            color,
            expected: plan.slots(color).len(),
            observed: 0,
        })
        .collect();
    let mut missing_slots = Vec::new();
    for (slot, color) in plan.assignments() {
        if indicators.is_started(slot) {
            colors[color].observed += 1;
        } else {
            missing_slots.push(slot);
        }
    }
    let observed = expected - missing_slots.len();
    // A slot can only go from unset to set, so the recount never drops
    debug_assert!(observed >= polled);

    Ok(LaunchReport {
        expected,
        observed,
        colors,
        missing_slots,
        elapsed,
    })
}

/// Poll the indicators for `plan` and fail on a shortfall
///
/// # Errors
///
/// Returns `UnderLaunch` if fewer than the planned blocks announced before
/// the timeout, or `CapacityExceeded` if the plan does not fit the table.
pub fn validate_launch<const P: usize>(
    plan: &LaunchPlan,
    indicators: &IndicatorTable<P>,
    poll: &PollConfig,
) -> Result<LaunchReport> {
    let report = inspect_launch(plan, indicators, poll)?;
    match report.status() {
        LaunchStatus::Complete => {
            tracing::info!(
                blocks = report.observed,
                elapsed_us = report.elapsed.as_micros() as u64,
                "launch confirmed"
            );
            Ok(report)
        }
        LaunchStatus::Degraded => {
            tracing::warn!(
                expected = report.expected,
                observed = report.observed,
                missing = report.missing_slots.len(),
                "launch degraded: blocks never started"
            );
            Err(FgpuError::UnderLaunch {
                expected: report.expected,
                observed: report.observed,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn quick_poll() -> PollConfig {
        PollConfig::new()
            .with_timeout(Duration::from_millis(20))
            .with_interval(Duration::from_micros(100))
    }

    #[test]
    fn test_assign_and_lookup() {
        let mut plan = LaunchPlan::new(2, 8);
        plan.assign(0, [0, 1, 2]).expect("color 0");
        plan.assign(1, [5, 6]).expect("color 1");
        assert_eq!(plan.slots(0), &[0, 1, 2]);
        assert_eq!(plan.color_of(6), Some(1));
        assert_eq!(plan.color_of(3), None);
        assert_eq!(plan.total_blocks(), 5);
        assert_eq!(
            plan.assignments().collect::<Vec<_>>(),
            vec![(0, 0), (1, 0), (2, 0), (5, 1), (6, 1)]
        );
    }

    #[test]
    fn test_assign_rejects_overlap() {
        let mut plan = LaunchPlan::new(2, 8);
        plan.assign(0, 0..4).expect("color 0");
        let err = plan.assign(1, [3, 4]).unwrap_err();
        assert_eq!(err, FgpuError::SlotConflict { slot: 3, color: 0 });
        // Nothing from the failed call was recorded
        assert_eq!(plan.color_of(4), None);
        assert!(plan.slots(1).is_empty());
    }

    #[test]
    fn test_assign_rejects_duplicate_in_call() {
        let mut plan = LaunchPlan::new(1, 4);
        let err = plan.assign(0, [1, 1]).unwrap_err();
        assert_eq!(err, FgpuError::SlotConflict { slot: 1, color: 0 });
    }

    #[test]
    fn test_assign_rejects_out_of_range() {
        let mut plan = LaunchPlan::new(2, 4);
        assert_eq!(plan.assign(2, [0]), Err(FgpuError::color(2, 2)));
        assert_eq!(plan.assign(0, [4]), Err(FgpuError::slot(4, 4)));
    }

    #[test]
    fn test_contiguous_plan() {
        let plan = LaunchPlan::contiguous(&[2, 3], 2, 8).expect("plan");
        assert_eq!(plan.slots(0), &[0, 1]);
        assert_eq!(plan.slots(1), &[2, 3, 4]);
        assert!(LaunchPlan::contiguous(&[4, 5], 2, 8).is_err());
    }

    #[test]
    fn test_validate_complete_launch() {
        let plan = LaunchPlan::contiguous(&[2, 2], 2, 8).expect("plan");
        let indicators: IndicatorTable<8> = IndicatorTable::new();
        (0..4).for_each(|s| indicators.announce(s));

        let report = validate_launch(&plan, &indicators, &quick_poll()).expect("complete");
        assert_eq!(report.status(), LaunchStatus::Complete);
        assert_eq!(report.observed, 4);
        assert!(report.missing_slots.is_empty());
        assert!((report.occupancy() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_validate_detects_under_launch() {
        let plan = LaunchPlan::contiguous(&[3, 3], 2, 8).expect("plan");
        let indicators: IndicatorTable<8> = IndicatorTable::new();
        for slot in [0, 1, 2, 3] {
            indicators.announce(slot);
        }

        let err = validate_launch(&plan, &indicators, &quick_poll()).unwrap_err();
        assert_eq!(
            err,
            FgpuError::UnderLaunch {
                expected: 6,
                observed: 4
            }
        );
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_inspect_reports_per_color() {
        let plan = LaunchPlan::contiguous(&[3, 3], 2, 8).expect("plan");
        let indicators: IndicatorTable<8> = IndicatorTable::new();
        for slot in [0, 1, 2, 3] {
            indicators.announce(slot);
        }

        let report = inspect_launch(&plan, &indicators, &quick_poll()).expect("report");
        assert_eq!(report.status(), LaunchStatus::Degraded);
        assert_eq!(report.colors[0].observed, 3);
        assert_eq!(report.colors[1].observed, 1);
        assert_eq!(report.missing_slots, vec![4, 5]);
        assert!((report.occupancy() - 4.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_validate_waits_for_late_planned_slot() {
        let mut plan = LaunchPlan::new(1, 8);
        plan.assign(0, 4..8).expect("color 0");
        let indicators: Arc<IndicatorTable<8>> = Arc::new(IndicatorTable::new());
        // Slots 0..4 belong to another color's kernel
        (0..7).for_each(|s| indicators.announce(s));
        let late = {
            let indicators = Arc::clone(&indicators);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(50));
                indicators.announce(7);
            })
        };

        let poll = PollConfig::new().with_timeout(Duration::from_secs(2));
        let report = validate_launch(&plan, &indicators, &poll);
        late.join().expect("late block panicked");

        let report = report.expect("late slot should be waited for");
        assert_eq!(report.observed, 4);
        assert!(report.missing_slots.is_empty());
    }

    #[test]
    fn test_inspect_rejects_plan_larger_than_table() {
        let plan = LaunchPlan::contiguous(&[6], 1, 16).expect("plan");
        let indicators: IndicatorTable<4> = IndicatorTable::new();
        assert_eq!(
            inspect_launch(&plan, &indicators, &quick_poll()),
            Err(FgpuError::slot(4, 4))
        );
    }

    #[test]
    fn test_report_serializes_to_json() {
        let plan = LaunchPlan::contiguous(&[1], 1, 2).expect("plan");
        let indicators: IndicatorTable<2> = IndicatorTable::new();
        indicators.announce(0);
        let report = inspect_launch(&plan, &indicators, &quick_poll()).expect("report");
        let json = serde_json::to_value(&report).expect("json");
        assert_eq!(json["expected"], 1);
        assert_eq!(json["observed"], 1);
    }
}
