//! # fgpu
//!
//! Spatial partitioning of a GPU's streaming multiprocessors among isolated
//! logical contexts ("colors") with persistent kernels.
//!
//! A persistent kernel launches a fixed grid of blocks that loop internally,
//! pulling work from a shared counter instead of exiting after one unit. Each
//! color gets its own blocks and its own counters, so colors never contend on
//! the same memory. This crate provides the shared memory layout and the
//! lock-free protocol both sides of such a system rely on:
//!
//! - **Block-index allocator**: per-color, cacheline-isolated pairs of
//!   counters that blocks atomically increment to claim work ordinals.
//! - **Launch handshake**: per-block indicators that blocks set on start, and
//!   a bounded host-side poll that detects under-provisioned launches.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use fgpu::bindex::Generation;
//! use fgpu::shared::SharedTables;
//!
//! let tables: SharedTables<2, 4> = SharedTables::new();
//!
//! // Device side: a block announces itself, then claims work
//! tables.indicators().announce(0);
//! assert_eq!(tables.bindexes().claim(1, Generation::Zero), 0);
//! assert_eq!(tables.bindexes().claim(1, Generation::Zero), 1);
//!
//! // Host side: confirm how many blocks came up
//! let observed = tables.indicators().poll(1, Duration::from_millis(10));
//! assert_eq!(observed, 1);
//! ```
//!
//! ## Ownership rule
//!
//! The host exclusively initializes and resets both tables; device blocks
//! exclusively increment counters and set indicators. The rule is a calling
//! convention; the tables take no locks.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
// Clippy allows (MUST come after deny/warn to override them)
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)] // u128 -> u64 for durations is safe
#![allow(clippy::cast_possible_wrap)] // usize -> i32 ordinals in tests
#![allow(clippy::cast_precision_loss)] // usize -> f64 occupancy ratio
#![allow(clippy::must_use_candidate)] // Not all methods need #[must_use]
#![allow(clippy::doc_markdown)] // Allow technical terms without backticks
#![allow(clippy::missing_panics_doc)] // Unchecked indices panic by contract

/// Per-color block-index allocator
pub mod bindex;
/// CLI command implementations (extracted for testability)
pub mod cli;
pub mod config;
pub mod error;
/// CPU emulation of a persistent-kernel launch
///
/// Runs the device half of the protocol on rayon threads, with a configurable
/// occupancy limit for reproducing under-launch.
pub mod grid;
/// C declarations of the shared tables for kernel code
pub mod header;
/// Launch indicator handshake
pub mod indicator;
/// Launch planning and host-side confirmation
pub mod launch;
/// Cacheline-isolated record layout
pub mod layout;
/// Round transitions over the double-buffered counters
pub mod round;
/// Host/device shared table pair
pub mod shared;

// Re-exports for convenience
pub use bindex::{BlockIndexTable, Generation};
pub use config::{FgpuConfig, PollConfig};
pub use error::{FgpuError, Result};
pub use indicator::IndicatorTable;
pub use launch::{validate_launch, LaunchPlan, LaunchReport, LaunchStatus};
pub use layout::{CACHELINE_SIZE, MAX_NUM_COLORS, MAX_NUM_PBLOCKS};
pub use round::{RoundController, RoundPolicy};
pub use shared::SharedTables;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
