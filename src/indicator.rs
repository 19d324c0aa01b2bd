//! Launch indicator handshake
//!
//! An oversubscribed persistent-kernel launch can silently come up short: the
//! device schedules only as many blocks as fit, and the rest never run. Each
//! block therefore sets its own indicator once, right after it starts and
//! before it claims any work. The host counts indicators after launch to learn
//! how many blocks really came up.
//!
//! A slot is written by exactly one block and never cleared within a kernel
//! generation. The store is a single release store; there is no read-modify-
//! write and no intra-slot race.

use std::ops::Range;
use std::sync::atomic::Ordering;
use std::time::Instant;

use crate::config::PollConfig;
use crate::error::{FgpuError, Result};
use crate::layout::{Indicator, TableLayout, MAX_NUM_PBLOCKS};

/// Fixed-capacity table of per-block launch flags
#[derive(Debug)]
pub struct IndicatorTable<const N: usize = MAX_NUM_PBLOCKS> {
    slots: Box<[Indicator]>,
}

impl<const N: usize> Default for IndicatorTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> IndicatorTable<N> {
    /// Allocate a table with every indicator cleared
    #[must_use]
    pub fn new() -> Self {
        let slots = (0..N).map(|_| Indicator::default()).collect();
        Self { slots }
    }

    /// Block slot capacity
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Validate a block slot against the capacity
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` if `slot >= N`.
    pub fn check_slot(&self, slot: usize) -> Result<()> {
        if slot < N {
            Ok(())
        } else {
            Err(FgpuError::slot(slot, N))
        }
    }

    /// Mark `slot` as started
    ///
    /// Called once by the block that owns the slot, before its claim loop.
    /// `slot` must already be validated.
    #[inline]
    pub fn announce(&self, slot: usize) {
        self.slots[slot].started.store(true, Ordering::Release);
    }

    /// Whether the block in `slot` has announced
    #[inline]
    #[must_use]
    pub fn is_started(&self, slot: usize) -> bool {
        self.slots[slot].started.load(Ordering::Acquire)
    }

    /// Number of announced slots in the whole table
    #[must_use]
    pub fn count_started(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.started.load(Ordering::Acquire))
            .count()
    }

    /// Number of announced slots within `range`
    #[must_use]
    pub fn count_started_in(&self, range: Range<usize>) -> usize {
        let end = range.end.min(N);
        let start = range.start.min(end);
        self.slots[start..end]
            .iter()
            .filter(|s| s.started.load(Ordering::Acquire))
            .count()
    }

    /// Indices of announced slots, ascending
    #[must_use]
    pub fn started_slots(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.started.load(Ordering::Acquire))
            .map(|(i, _)| i)
            .collect()
    }

    /// Slots in `0..expected` that have not announced
    #[must_use]
    pub fn missing_slots(&self, expected: usize) -> Vec<usize> {
        (0..expected.min(N))
            .filter(|&slot| !self.is_started(slot))
            .collect()
    }

    /// Clear every indicator ahead of a new kernel generation
    ///
    /// Host only; no block of the previous generation may still be starting.
    pub fn reset(&self) {
        for slot in self.slots.iter() {
            slot.started.store(false, Ordering::Release);
        }
        tracing::debug!(slots = N, "indicator table reset");
    }

    /// Wait until `expected` blocks announce or `timeout` elapses
    ///
    /// Uses the default cadence from [`PollConfig`] with the given timeout.
    /// Returns the observed count, which is below `expected` on an
    /// under-launch.
    #[must_use]
    pub fn poll(&self, expected: usize, timeout: std::time::Duration) -> usize {
        self.poll_with(expected, &PollConfig::default().with_timeout(timeout))
    }

    /// Wait until `expected` blocks announce or `config.timeout` elapses
    ///
    /// Returns as soon as the count reaches `expected`. Each sleep is clamped
    /// to the remaining budget so the call never outlives the timeout by more
    /// than one final count.
    #[must_use]
    pub fn poll_with(&self, expected: usize, config: &PollConfig) -> usize {
        Self::poll_until(expected, config, || self.count_started())
    }

    /// Wait until every slot in `slots` announces or `config.timeout` elapses
    ///
    /// Only the listed slots are counted, so indicators left set by other
    /// colors or a previous generation cannot end the wait early. Returns the
    /// number of listed slots that announced. Every slot must be in range.
    #[must_use]
    pub fn poll_slots(&self, slots: &[usize], config: &PollConfig) -> usize {
        Self::poll_until(slots.len(), config, || {
            slots.iter().filter(|&&slot| self.is_started(slot)).count()
        })
    }

    fn poll_until(expected: usize, config: &PollConfig, count: impl Fn() -> usize) -> usize {
        let start = Instant::now();
        let mut attempt = 0u32;
        loop {
            let observed = count();
            if observed >= expected {
                tracing::debug!(
                    expected,
                    observed,
                    elapsed_us = start.elapsed().as_micros() as u64,
                    "all blocks announced"
                );
                return observed;
            }

            let elapsed = start.elapsed();
            if elapsed >= config.timeout {
                tracing::debug!(expected, observed, attempts = attempt, "indicator poll timed out");
                return observed;
            }

            let remaining = config.timeout - elapsed;
            std::thread::sleep(config.delay(attempt).min(remaining));
            attempt = attempt.saturating_add(1);
        }
    }

    /// Address of the first record, for handing to a device mapping
    #[must_use]
    pub fn as_ptr(&self) -> *const Indicator {
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
        TableLayout::indicator(N)
    }
}
