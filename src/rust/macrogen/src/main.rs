// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Command-line front end: run a full generation pass against a
//! simulated pod and print the resulting artifacts.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use macro_compiler::GenerationPass;
use macro_compiler::bootstrap::{self, BootstrapStore};
use std::path::PathBuf;
use virtual_device::VirtualDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// C source for embedding the command table in firmware.
    C,
    /// Nested JSON, one byte array per captured command.
    Nested,
    /// Hex dump of the device configuration snapshot.
    Blob,
}

#[derive(Debug, Parser)]
#[command(about = "Generate the state-machine macro table for a pod revision")]
struct Args {
    /// Firmware revision to generate for.
    #[arg(long, default_value = "1.5.0")]
    firmware: String,

    /// Hardware revision to generate for.
    #[arg(long, default_value = "0.4")]
    hardware: String,

    #[arg(long, value_enum, default_value_t = OutputFormat::C)]
    format: OutputFormat,

    /// Record the configuration snapshot into this bootstrap store,
    /// keyed by firmware/hardware revision.
    #[arg(long)]
    store: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let device = VirtualDevice::spoof(&args.firmware, &args.hardware);
    let mut pass = GenerationPass::new(device);
    let output = pass.run().await.with_context(|| {
        format!(
            "generation failed for firmware {} / hardware {}",
            args.firmware, args.hardware
        )
    })?;

    if let Some(path) = &args.store {
        let mut store = BootstrapStore::load(path)?;
        store.record(&args.firmware, &args.hardware, &output.snapshot);
        store.save(path)?;
        log::info!("recorded snapshot in {}", path.display());
    }

    match args.format {
        OutputFormat::C => {
            print!("{}", output.firmware_constants());
            print!("{}", output.table.to_c_source(&output.programs));
        }
        OutputFormat::Nested => {
            println!("{}", serde_json::to_string_pretty(&output.nested)?);
        }
        OutputFormat::Blob => {
            println!("{}", bootstrap::to_hex(&output.snapshot));
        }
    }
    Ok(())
}
