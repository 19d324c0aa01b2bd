//! Shared-memory record layout
//!
//! Both tables live in memory that device blocks write and the host reads.
//! Every record is padded to a full device cacheline so that no two colors'
//! counters, and no two blocks' indicators, ever share a line. Atomic updates
//! from different colors would otherwise serialize through false sharing.
//!
//! ## Memory Layout
//!
//! ```text
//! BlockIndexTable (MAX_NUM_COLORS records):
//! ┌──────────────────────────────────────────────┐
//! │ color 0: index[0]: i32 │ index[1]: i32 │ pad │  CACHELINE_SIZE bytes
//! ├──────────────────────────────────────────────┤
//! │ color 1: index[0]: i32 │ index[1]: i32 │ pad │
//! └──────────────────────────────────────────────┘
//!
//! IndicatorTable (MAX_NUM_PBLOCKS records):
//! ┌──────────────────────────────────────────────┐
//! │ slot 0: started: bool │ pad                  │  CACHELINE_SIZE bytes
//! └──────────────────────────────────────────────┘
//! ```
//!
//! `AtomicI32` and `AtomicBool` have the same in-memory representation as
//! `int` and `bool` on the device side, so the records are ABI-compatible with
//! the C declarations rendered by [`crate::header`].

use std::mem::{align_of, offset_of, size_of};
use std::sync::atomic::{AtomicBool, AtomicI32};

use serde::{Deserialize, Serialize};

/// Device cacheline size in bytes
#[cfg(not(feature = "cacheline-64"))]
pub const CACHELINE_SIZE: usize = 128;

/// Device cacheline size in bytes
#[cfg(feature = "cacheline-64")]
pub const CACHELINE_SIZE: usize = 64;

/// Maximum number of colors (block-index table capacity)
pub const MAX_NUM_COLORS: usize = 8;

/// Maximum number of physical persistent blocks (indicator table capacity)
pub const MAX_NUM_PBLOCKS: usize = 1024;

/// Number of alternating counters per color
pub const NUM_GENERATIONS: usize = 2;

/// Per-color pair of work counters, one cacheline wide
#[cfg_attr(not(feature = "cacheline-64"), repr(C, align(128)))]
#[cfg_attr(feature = "cacheline-64", repr(C, align(64)))]
#[derive(Debug, Default)]
pub struct BlockIndex {
    pub(crate) index: [AtomicI32; NUM_GENERATIONS],
}

/// Per-block launch flag, one cacheline wide
#[cfg_attr(not(feature = "cacheline-64"), repr(C, align(128)))]
#[cfg_attr(feature = "cacheline-64", repr(C, align(64)))]
#[derive(Debug, Default)]
pub struct Indicator {
    pub(crate) started: AtomicBool,
}

// Compile-time layout verification
const _: () = assert!(size_of::<BlockIndex>() == CACHELINE_SIZE);
const _: () = assert!(align_of::<BlockIndex>() == CACHELINE_SIZE);
const _: () = assert!(size_of::<Indicator>() == CACHELINE_SIZE);
const _: () = assert!(align_of::<Indicator>() == CACHELINE_SIZE);
const _: () = assert!(size_of::<AtomicI32>() == size_of::<i32>());
const _: () = assert!(size_of::<AtomicBool>() == size_of::<bool>());

/// Byte offset of a color's record from the start of the block-index table
#[must_use]
pub const fn offset_of_color(color: usize) -> usize {
    color * size_of::<BlockIndex>()
}

/// Byte offset of a block slot's record from the start of the indicator table
#[must_use]
pub const fn offset_of_slot(slot: usize) -> usize {
    slot * size_of::<Indicator>()
}

/// One field inside a table record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLayout {
    /// Field name as the device code spells it
    pub name: String,
    /// Byte offset within the record
    pub offset: usize,
    /// Field size in bytes
    pub size: usize,
}

/// Description of a table's in-memory layout, for inspection and debugging
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLayout {
    /// Table name
    pub name: String,
    /// Number of records
    pub entries: usize,
    /// Distance in bytes between consecutive records
    pub stride: usize,
    /// Record alignment in bytes
    pub alignment: usize,
    /// Total table size in bytes
    pub total_bytes: usize,
    /// Fields inside each record
    pub fields: Vec<FieldLayout>,
}

impl TableLayout {
    /// Layout of a block-index table with `entries` colors
    #[must_use]
    pub fn block_index(entries: usize) -> Self {
        let base = offset_of!(BlockIndex, index);
        let fields = (0..NUM_GENERATIONS)
            .map(|g| FieldLayout {
                name: format!("index[{g}]"),
                offset: base + g * size_of::<i32>(),
                size: size_of::<i32>(),
            })
            .collect();
        Self {
            name: "fgpu_bindexes".to_string(),
            entries,
            stride: size_of::<BlockIndex>(),
            alignment: align_of::<BlockIndex>(),
            total_bytes: entries * size_of::<BlockIndex>(),
            fields,
        }
    }

    /// Layout of an indicator table with `entries` block slots
    #[must_use]
    pub fn indicator(entries: usize) -> Self {
        Self {
            name: "fgpu_indicators".to_string(),
            entries,
            stride: size_of::<Indicator>(),
            alignment: align_of::<Indicator>(),
            total_bytes: entries * size_of::<Indicator>(),
            fields: vec![FieldLayout {
                name: "started".to_string(),
                offset: offset_of!(Indicator, started),
                size: size_of::<bool>(),
            }],
        }
    }

    /// Whether every pair of records is at least one cacheline apart
    #[must_use]
    pub fn is_line_isolated(&self) -> bool {
        self.stride >= CACHELINE_SIZE && self.stride % CACHELINE_SIZE == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_sizes_match_cacheline() {
        assert_eq!(size_of::<BlockIndex>(), CACHELINE_SIZE);
        assert_eq!(size_of::<Indicator>(), CACHELINE_SIZE);
        assert_eq!(align_of::<BlockIndex>(), CACHELINE_SIZE);
        assert_eq!(align_of::<Indicator>(), CACHELINE_SIZE);
    }

    #[test]
    fn test_offsets_are_one_line_apart() {
        for color in 1..MAX_NUM_COLORS {
            assert_eq!(
                offset_of_color(color) - offset_of_color(color - 1),
                CACHELINE_SIZE
            );
        }
        assert_eq!(offset_of_slot(3) - offset_of_slot(2), CACHELINE_SIZE);
    }

    #[test]
    fn test_block_index_layout_fields() {
        let layout = TableLayout::block_index(MAX_NUM_COLORS);
        assert_eq!(layout.entries, MAX_NUM_COLORS);
        assert_eq!(layout.total_bytes, MAX_NUM_COLORS * CACHELINE_SIZE);
        assert_eq!(layout.fields.len(), 2);
        assert_eq!(layout.fields[0].offset, 0);
        assert_eq!(layout.fields[1].offset, 4);
        assert!(layout.is_line_isolated());
    }

    #[test]
    fn test_indicator_layout_fields() {
        let layout = TableLayout::indicator(16);
        assert_eq!(layout.fields.len(), 1);
        assert_eq!(layout.fields[0].name, "started");
        assert_eq!(layout.fields[0].size, 1);
        assert_eq!(layout.total_bytes, 16 * CACHELINE_SIZE);
        assert!(layout.is_line_isolated());
    }

    #[test]
    fn test_layout_serializes() {
        let layout = TableLayout::indicator(4);
        let json = serde_json::to_string(&layout).expect("serialize");
        let back: TableLayout = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, layout);
    }
}
