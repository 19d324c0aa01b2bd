//! CLI command implementations
//!
//! The logic behind the `fgpu` binary, kept here so it can be tested without
//! spawning a process. Every command returns the text it would print.

// CLI glue code - relaxed lint requirements
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::needless_pass_by_value)]

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::error::{CapacityKind, FgpuError, Result};
use crate::grid::PersistentGrid;
use crate::launch::{inspect_launch, LaunchPlan, LaunchReport};
use crate::layout::{TableLayout, MAX_NUM_COLORS, MAX_NUM_PBLOCKS};
use crate::round::RoundController;
use crate::shared::SharedTables;
use crate::{header, FgpuConfig};

/// fgpu - persistent-kernel table tooling
#[derive(Debug, Parser)]
#[command(name = "fgpu")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// fgpu subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Render the C declarations of both tables
    ///
    /// Examples:
    ///   fgpu header
    ///   fgpu header --colors 4 --pblocks 256 -o persistent.h
    Header {
        /// Color capacity, 1 up to the compiled maximum (the default)
        #[arg(long)]
        colors: Option<usize>,

        /// Block slot capacity, 1 up to the compiled maximum (the default)
        #[arg(long)]
        pblocks: Option<usize>,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the table layouts as JSON
    Layout,
    /// Emulate one launch and print the launch report as JSON
    ///
    /// Examples:
    ///   fgpu emulate --blocks 8,8 --work 1000,500
    ///   fgpu emulate --blocks 16,16 --work 100,100 --max-resident 24
    Emulate {
        /// Blocks per color, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        blocks: Vec<usize>,

        /// Work units per color, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        work: Vec<i32>,

        /// Blocks the emulated device can keep resident
        #[arg(long)]
        max_resident: Option<usize>,

        /// Poll timeout in milliseconds (defaults to FGPU_POLL_TIMEOUT_MS or 500)
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

/// Launch report plus claim totals, as printed by `fgpu emulate`
#[derive(Debug, Serialize)]
pub struct EmulationSummary {
    /// Occupancy report from the indicator table
    pub report: LaunchReport,
    /// Work units claimed per color
    pub claimed: Vec<usize>,
    /// Whether each color saw every ordinal exactly once
    pub exhaustive: Vec<bool>,
}

/// Run a parsed command and return its output
pub fn entrypoint(cli: Cli) -> Result<String> {
    match cli.command {
        Commands::Header {
            colors,
            pblocks,
            output,
        } => {
            let colors = header_capacity(colors, CapacityKind::Color)?;
            let pblocks = header_capacity(pblocks, CapacityKind::BlockSlot)?;
            let text = header::render_with(colors, pblocks);
            match output {
                Some(path) => {
                    std::fs::write(&path, &text)?;
                    Ok(format!("wrote {}", path.display()))
                },
                None => Ok(text),
            }
        },
        Commands::Layout => handle_layout(),
        Commands::Emulate {
            blocks,
            work,
            max_resident,
            timeout_ms,
        } => handle_emulate(&blocks, &work, max_resident, timeout_ms),
    }
}

/// Header capacities must describe tables the host can actually allocate
fn header_capacity(value: Option<usize>, kind: CapacityKind) -> Result<usize> {
    let capacity = match kind {
        CapacityKind::Color => MAX_NUM_COLORS,
        CapacityKind::BlockSlot => MAX_NUM_PBLOCKS,
    };
    match value {
        None => Ok(capacity),
        Some(0) => Err(FgpuError::Config {
            reason: format!("{kind} capacity must be at least 1"),
        }),
        Some(index) if index > capacity => Err(FgpuError::CapacityExceeded {
            kind,
            index,
            capacity,
        }),
        Some(n) => Ok(n),
    }
}

fn handle_layout() -> Result<String> {
    let layouts = [
        TableLayout::block_index(MAX_NUM_COLORS),
        TableLayout::indicator(MAX_NUM_PBLOCKS),
    ];
    Ok(serde_json::to_string_pretty(&layouts)?)
}

fn handle_emulate(
    blocks: &[usize],
    work: &[i32],
    max_resident: Option<usize>,
    timeout_ms: Option<u64>,
) -> Result<String> {
    if blocks.len() != work.len() {
        return Err(FgpuError::Config {
            reason: format!(
                "--blocks has {} colors but --work has {}",
                blocks.len(),
                work.len()
            ),
        });
    }
    let mut config = FgpuConfig::from_env()?;
    if let Some(ms) = timeout_ms {
        config.poll.timeout = Duration::from_millis(ms);
    }
    let num_colors = blocks.len();
    if num_colors > config.num_colors {
        return Err(FgpuError::color(num_colors - 1, config.num_colors));
    }
    let tables: SharedTables = SharedTables::from_config(&config)?;
    let plan = LaunchPlan::contiguous(blocks, num_colors, config.num_pblocks)?;
    let mut rounds: RoundController = RoundController::new(config.round_policy);

    tables.begin_generation();
    let colors: Vec<usize> = (0..num_colors).collect();
    let generations = rounds.begin_rounds(tables.bindexes(), &colors)?;

    let mut grid = PersistentGrid::new(&tables, &plan);
    if let Some(limit) = max_resident {
        grid = grid.with_max_resident(limit);
    }
    let outcome = grid.run(&generations, work)?;
    let report = inspect_launch(&plan, tables.indicators(), &config.poll)?;

    let summary = EmulationSummary {
        report,
        claimed: (0..num_colors).map(|c| outcome.claimed(c)).collect(),
        exhaustive: work
            .iter()
            .enumerate()
            .map(|(c, &total)| outcome.is_exhaustive(c, total))
            .collect(),
    };
    Ok(serde_json::to_string_pretty(&summary)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("fgpu").chain(args.iter().copied()))
            .expect("valid args")
    }

    #[test]
    fn test_header_to_stdout() {
        let out = entrypoint(parse(&["header", "--colors", "4"])).expect("header");
        assert!(out.contains("#define FGPU_MAX_NUM_COLORS 4"));
        assert!(out.contains(&format!("#define FGPU_MAX_NUM_PBLOCKS {MAX_NUM_PBLOCKS}")));
    }

    #[test]
    fn test_header_rejects_capacity_beyond_tables() {
        let colors = (MAX_NUM_COLORS + 8).to_string();
        let err = entrypoint(parse(&["header", "--colors", colors.as_str()])).unwrap_err();
        assert_eq!(err, FgpuError::color(MAX_NUM_COLORS + 8, MAX_NUM_COLORS));

        let pblocks = (MAX_NUM_PBLOCKS + 1).to_string();
        let err = entrypoint(parse(&["header", "--pblocks", pblocks.as_str()])).unwrap_err();
        assert_eq!(err, FgpuError::slot(MAX_NUM_PBLOCKS + 1, MAX_NUM_PBLOCKS));
    }

    #[test]
    fn test_header_rejects_zero_capacity() {
        for flag in ["--colors", "--pblocks"] {
            let err = entrypoint(parse(&["header", flag, "0"])).unwrap_err();
            assert!(matches!(err, FgpuError::Config { .. }), "{flag}: {err:?}");
        }
    }

    #[test]
    fn test_layout_is_json() {
        let out = entrypoint(parse(&["layout"])).expect("layout");
        let value: serde_json::Value = serde_json::from_str(&out).expect("json");
        assert_eq!(value[0]["name"], "fgpu_bindexes");
        assert_eq!(value[1]["name"], "fgpu_indicators");
    }

    #[test]
    fn test_emulate_args_parse() {
        let cli = parse(&["emulate", "--blocks", "2,3", "--work", "10,20", "--max-resident", "4"]);
        match cli.command {
            Commands::Emulate {
                blocks,
                work,
                max_resident,
                timeout_ms,
            } => {
                assert_eq!(blocks, vec![2, 3]);
                assert_eq!(work, vec![10, 20]);
                assert_eq!(max_resident, Some(4));
                assert_eq!(timeout_ms, None);
            },
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_emulate_rejects_mismatched_lists() {
        let err = handle_emulate(&[1, 2], &[5], None, Some(1)).unwrap_err();
        assert!(matches!(err, FgpuError::Config { .. }));
    }

    #[test]
    fn test_emulate_missing_blocks_is_parse_error() {
        assert!(Cli::try_parse_from(["fgpu", "emulate", "--work", "1"]).is_err());
    }
}
