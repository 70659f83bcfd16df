// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

pub mod bootstrap;
pub mod capture;
pub mod filters;
pub mod pass;
pub mod programs;
pub mod table;

pub use capture::{CapturedCommand, MacroRecorder, Program};
pub use filters::FilterGraph;
pub use pass::{GenerationOutput, GenerationPass};
pub use programs::ProgramId;
pub use table::ProgramTable;

pub use device_api::{Error, Result};

/// Every captured command is padded to this boundary in the table form,
/// which is what lets the firmware index commands at a fixed stride.
pub const COMMAND_ALIGNMENT: usize = 4;

/// Padding byte, also repeated four times as the table terminator.
pub const FILLER_BYTE: u8 = 0xFF;
