//! Host/device shared table pair
//!
//! Bundles one block-index table and one indicator table, the unit a
//! scheduler allocates at start and hands to every block of a launch. The
//! host side owns lifecycle: zeroing at allocation, clearing indicators per
//! kernel generation, and optionally page-locking the memory so an external
//! driver can map it for device access.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::bindex::BlockIndexTable;
use crate::config::FgpuConfig;
use crate::error::{FgpuError, Result};
use crate::indicator::IndicatorTable;
use crate::layout::{TableLayout, MAX_NUM_COLORS, MAX_NUM_PBLOCKS};

/// Result of page-locking table memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinResult {
    /// Memory is locked
    Locked,
    /// Not permitted (RLIMIT_MEMLOCK or missing capability)
    InsufficientPrivileges,
    /// Locking failed for another resource reason
    ResourceLimit,
    /// Platform has no mlock
    Unsupported,
}

/// Page-locked span of table memory, unlocked on drop
struct PinnedRegion {
    ptr: *const u8,
    len: usize,
}

// Safety: the region only records an address range for munlock, never dereferences it
unsafe impl Send for PinnedRegion {}
unsafe impl Sync for PinnedRegion {}

impl PinnedRegion {
    /// # Safety
    ///
    /// `ptr` must point to `len` bytes that outlive the returned region.
    unsafe fn lock(ptr: *const u8, len: usize) -> std::result::Result<Self, PinResult> {
        match Self::mlock_impl(ptr, len) {
            PinResult::Locked => Ok(Self { ptr, len }),
            other => Err(other),
        }
    }

    #[cfg(target_family = "unix")]
    fn mlock_impl(ptr: *const u8, len: usize) -> PinResult {
        // SAFETY: caller guarantees the range is live
        let result = unsafe { libc::mlock(ptr.cast(), len) };
        if result == 0 {
            PinResult::Locked
        } else {
            let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            if errno == libc::EPERM {
                PinResult::InsufficientPrivileges
            } else {
                PinResult::ResourceLimit
            }
        }
    }

    #[cfg(not(target_family = "unix"))]
    fn mlock_impl(_ptr: *const u8, _len: usize) -> PinResult {
        PinResult::Unsupported
    }
}

impl Drop for PinnedRegion {
    fn drop(&mut self) {
        #[cfg(target_family = "unix")]
        // SAFETY: the range was locked by `lock` and is still owned by the tables
        unsafe {
            libc::munlock(self.ptr.cast(), self.len);
        }
    }
}

/// Block-index and indicator tables for one scheduler
pub struct SharedTables<const C: usize = MAX_NUM_COLORS, const P: usize = MAX_NUM_PBLOCKS> {
    // Declared first so the regions unlock before the tables are freed
    pinned: Vec<PinnedRegion>,
    bindexes: BlockIndexTable<C>,
    indicators: IndicatorTable<P>,
    kernel_generation: AtomicU64,
}

impl<const C: usize, const P: usize> Default for SharedTables<C, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const C: usize, const P: usize> std::fmt::Debug for SharedTables<C, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedTables")
            .field("colors", &C)
            .field("pblocks", &P)
            .field("kernel_generation", &self.kernel_generation())
            .field("pinned", &self.is_pinned())
            .finish()
    }
}

impl<const C: usize, const P: usize> SharedTables<C, P> {
    /// Allocate both tables zeroed
    #[must_use]
    pub fn new() -> Self {
        let tables = Self {
            pinned: Vec::new(),
            bindexes: BlockIndexTable::new(),
            indicators: IndicatorTable::new(),
            kernel_generation: AtomicU64::new(0),
        };
        tracing::debug!(
            colors = C,
            pblocks = P,
            bytes = tables.size_bytes(),
            "shared tables allocated"
        );
        tables
    }

    /// Allocate after checking `config` fits the compiled capacities
    ///
    /// # Errors
    ///
    /// Returns `Config` if the configuration is invalid or asks for more
    /// colors or block slots than `C` and `P`.
    pub fn from_config(config: &FgpuConfig) -> Result<Self> {
        config.validate()?;
        if config.num_colors > C || config.num_pblocks > P {
            return Err(FgpuError::Config {
                reason: format!(
                    "config asks for {} colors / {} blocks, tables hold {C} / {P}",
                    config.num_colors, config.num_pblocks
                ),
            });
        }
        Ok(Self::new())
    }

    /// Per-color counters
    #[must_use]
    pub fn bindexes(&self) -> &BlockIndexTable<C> {
        &self.bindexes
    }

    /// Per-block launch flags
    #[must_use]
    pub fn indicators(&self) -> &IndicatorTable<P> {
        &self.indicators
    }

    /// Kernel generations started so far
    #[must_use]
    pub fn kernel_generation(&self) -> u64 {
        self.kernel_generation.load(Ordering::Acquire)
    }

    /// Prepare for a new kernel launch: clear every indicator
    ///
    /// Host only, with no block of the previous kernel still starting.
    /// Returns the new generation number.
    pub fn begin_generation(&self) -> u64 {
        self.indicators.reset();
        let generation = self.kernel_generation.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(generation, "kernel generation started");
        generation
    }

    /// Page-lock both tables
    ///
    /// Best effort; failure leaves the tables usable but unpinned. Calling
    /// again after success is a no-op.
    pub fn pin(&mut self) -> PinResult {
        if self.is_pinned() {
            return PinResult::Locked;
        }
        let spans = [
            (self.bindexes.as_ptr().cast::<u8>(), self.bindexes.size_bytes()),
            (self.indicators.as_ptr().cast::<u8>(), self.indicators.size_bytes()),
        ];
        let mut regions = Vec::with_capacity(spans.len());
        for (ptr, len) in spans {
            if len == 0 {
                continue;
            }
            // SAFETY: both spans are owned by self and live as long as `pinned`
            match unsafe { PinnedRegion::lock(ptr, len) } {
                Ok(region) => regions.push(region),
                Err(result) => {
                    tracing::warn!(?result, bytes = len, "failed to pin shared tables");
                    return result;
                }
            }
        }
        self.pinned = regions;
        tracing::info!(bytes = self.size_bytes(), "shared tables pinned");
        PinResult::Locked
    }

    /// Whether both tables are page-locked
    #[must_use]
    pub fn is_pinned(&self) -> bool {
        !self.pinned.is_empty()
    }

    /// Total bytes of both tables
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.bindexes.size_bytes() + self.indicators.size_bytes()
    }

    /// Layout of both tables, block-index first
    #[must_use]
    pub fn layouts(&self) -> [TableLayout; 2] {
        [self.bindexes.layout(), self.indicators.layout()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindex::Generation;
    use crate::layout::CACHELINE_SIZE;

    #[test]
    fn test_new_tables_zeroed() {
        let tables: SharedTables<2, 8> = SharedTables::new();
        assert_eq!(tables.bindexes().snapshot(), vec![[0, 0], [0, 0]]);
        assert_eq!(tables.indicators().count_started(), 0);
        assert_eq!(tables.kernel_generation(), 0);
        assert_eq!(tables.size_bytes(), 10 * CACHELINE_SIZE);
    }

    #[test]
    fn test_begin_generation_clears_indicators_only() {
        let tables: SharedTables<2, 8> = SharedTables::new();
        tables.indicators().announce(3);
        tables.bindexes().claim(1, Generation::Zero);

        assert_eq!(tables.begin_generation(), 1);
        assert_eq!(tables.indicators().count_started(), 0);
        assert_eq!(tables.bindexes().load(1, Generation::Zero), 1);
        assert_eq!(tables.begin_generation(), 2);
    }

    #[test]
    fn test_from_config_checks_capacity() {
        let config = FgpuConfig::new().with_num_colors(4).with_num_pblocks(8);
        assert!(SharedTables::<4, 8>::from_config(&config).is_ok());
        assert!(matches!(
            SharedTables::<2, 8>::from_config(&config),
            Err(FgpuError::Config { .. })
        ));
    }

    #[test]
    fn test_pin_is_best_effort() {
        let mut tables: SharedTables<2, 4> = SharedTables::new();
        let result = tables.pin();
        assert_eq!(tables.is_pinned(), result == PinResult::Locked);
        // Tables stay usable either way
        tables.indicators().announce(0);
        assert!(tables.indicators().is_started(0));
    }

    #[test]
    fn test_layouts() {
        let tables: SharedTables<3, 5> = SharedTables::new();
        let [bindex, indicator] = tables.layouts();
        assert_eq!(bindex.entries, 3);
        assert_eq!(indicator.entries, 5);
    }
}
