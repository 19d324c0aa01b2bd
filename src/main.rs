//! fgpu CLI - persistent-kernel table tooling
//!
//! # Commands
//!
//! - `header` - Render the C declarations of the shared tables
//! - `layout` - Print table layouts as JSON
//! - `emulate` - Run an emulated launch and print the launch report
//!
//! Log output goes to stderr and is filtered by `FGPU_LOG` (e.g.
//! `FGPU_LOG=fgpu=debug`).

use clap::Parser;
use fgpu::cli::{entrypoint, Cli};
use fgpu::error::Result;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("FGPU_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let output = entrypoint(Cli::parse())?;
    println!("{output}");
    Ok(())
}
