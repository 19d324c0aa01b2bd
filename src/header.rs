//! Device-side declarations of the shared tables
//!
//! Kernel code has to agree with the host on the exact record layout. This
//! renders the C declarations from the same constants the Rust records are
//! built from, so a build step can write them next to the kernel sources.

use std::fmt::Write as _;

use crate::layout::{CACHELINE_SIZE, MAX_NUM_COLORS, MAX_NUM_PBLOCKS, NUM_GENERATIONS};

/// Header for the compiled capacities
#[must_use]
pub fn render() -> String {
    render_with(MAX_NUM_COLORS, MAX_NUM_PBLOCKS)
}

/// Header for explicit capacities
#[must_use]
pub fn render_with(num_colors: usize, num_pblocks: usize) -> String {
    let mut out = String::with_capacity(1024);
    let _ = writeln!(out, "/* Generated by fgpu {}; do not edit. */", env!("CARGO_PKG_VERSION"));
    let _ = writeln!(out, "#ifndef FGPU_PERSISTENT_H");
    let _ = writeln!(out, "#define FGPU_PERSISTENT_H");
    let _ = writeln!(out);
    let _ = writeln!(out, "#define FGPU_DEVICE_CACHELINE_SIZE {CACHELINE_SIZE}");
    let _ = writeln!(out, "#define FGPU_MAX_NUM_COLORS {num_colors}");
    let _ = writeln!(out, "#define FGPU_MAX_NUM_PBLOCKS {num_pblocks}");
    let _ = writeln!(out);
    let _ = writeln!(out, "struct __align__(FGPU_DEVICE_CACHELINE_SIZE) fgpu_bindex {{");
    let _ = writeln!(out, "    int index[{NUM_GENERATIONS}];");
    let _ = writeln!(out, "}};");
    let _ = writeln!(out);
    let _ = writeln!(out, "typedef struct fgpu_bindexes {{");
    let _ = writeln!(out, "    struct fgpu_bindex bindexes[FGPU_MAX_NUM_COLORS];");
    let _ = writeln!(out, "}} fgpu_bindexes_t;");
    let _ = writeln!(out);
    let _ = writeln!(out, "struct __align__(FGPU_DEVICE_CACHELINE_SIZE) fgpu_indicator {{");
    let _ = writeln!(out, "    bool started;");
    let _ = writeln!(out, "}};");
    let _ = writeln!(out);
    let _ = writeln!(out, "typedef struct fgpu_indicators {{");
    let _ = writeln!(out, "    struct fgpu_indicator indicators[FGPU_MAX_NUM_PBLOCKS];");
    let _ = writeln!(out, "}} fgpu_indicators_t;");
    let _ = writeln!(out);
    let _ = writeln!(out, "#endif /* FGPU_PERSISTENT_H */");
    out
}
