// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Host-side capture of the command frames sent while a program is
//! being generated. The recorder hangs off the transport's frame
//! observer, so what lands here is the literal wire encoding.

use crate::{COMMAND_ALIGNMENT, FILLER_BYTE};
use device_api::device::FrameObserver;
use device_api::{Error, Result};

/// One command frame exactly as transmitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedCommand {
    bytes: Vec<u8>,
}

impl CapturedCommand {
    pub fn new(bytes: Vec<u8>) -> Self {
        CapturedCommand { bytes }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Length of this command in the table form: one length byte plus
    /// the frame, rounded up to the alignment boundary.
    pub fn padded_len(&self) -> usize {
        (1 + self.bytes.len()).next_multiple_of(COMMAND_ALIGNMENT)
    }

    /// Table-form encoding: length byte, frame bytes, filler padding.
    pub fn table_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.padded_len());
        out.push(self.bytes.len() as u8);
        out.extend_from_slice(&self.bytes);
        out.resize(self.padded_len(), FILLER_BYTE);
        out
    }
}

/// A sealed state program: the ordered commands captured for one state,
/// immutable once handed to the table builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    description: String,
    is_boot: bool,
    commands: Vec<CapturedCommand>,
}

impl Program {
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Whether the device runs this program automatically at power-on.
    pub fn is_boot(&self) -> bool {
        self.is_boot
    }

    pub fn commands(&self) -> &[CapturedCommand] {
        &self.commands
    }

    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    /// Total table-form length. Always a multiple of the alignment.
    pub fn byte_len(&self) -> usize {
        self.commands.iter().map(CapturedCommand::padded_len).sum()
    }

    /// Nested-form view: one byte vector per command, unpadded.
    pub fn nested(&self) -> Vec<Vec<u8>> {
        self.commands.iter().map(|c| c.bytes.clone()).collect()
    }
}

/// Accumulates frames into the program currently being generated.
///
/// Exactly one program is open at a time; the serial generation chain
/// guarantees single-writer access. Frames arriving while no program is
/// open (connection setup traffic, for example) are dropped.
#[derive(Debug, Default)]
pub struct MacroRecorder {
    current: Option<Vec<CapturedCommand>>,
    programs: Vec<Program>,
}

impl MacroRecorder {
    pub fn new() -> Self {
        MacroRecorder::default()
    }

    /// Start capturing a fresh program. Any unsealed capture from an
    /// aborted program is discarded, never emitted.
    pub fn begin_program(&mut self) {
        if let Some(partial) = self.current.take() {
            log::warn!(
                "discarding {} unsealed captured commands from an aborted program",
                partial.len()
            );
        }
        self.current = Some(Vec::new());
    }

    /// Seal the open program. Fails when no program is open.
    pub fn finish_program(&mut self, description: &str, is_boot: bool) -> Result<()> {
        let commands = self.current.take().ok_or_else(|| {
            Error::ProtocolViolation(format!(
                "finish_program(\"{description}\") without a matching begin_program"
            ))
        })?;
        log::debug!(
            "sealed program {}: \"{}\" with {} commands, {} bytes, boot: {}",
            self.programs.len(),
            description,
            commands.len(),
            commands.iter().map(CapturedCommand::padded_len).sum::<usize>(),
            is_boot,
        );
        self.programs.push(Program {
            description: description.to_owned(),
            is_boot,
            commands,
        });
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    pub fn programs(&self) -> &[Program] {
        &self.programs
    }

    pub fn take_programs(&mut self) -> Vec<Program> {
        std::mem::take(&mut self.programs)
    }

    /// The nested output encoding: program, then command, then bytes.
    pub fn nested_form(&self) -> Vec<Vec<Vec<u8>>> {
        self.programs.iter().map(Program::nested).collect()
    }
}

impl FrameObserver for MacroRecorder {
    fn frame_written(&mut self, frame: &[u8]) {
        match &mut self.current {
            Some(commands) => commands.push(CapturedCommand::new(frame.to_vec())),
            None => log::trace!("frame outside any program, not captured: {frame:02X?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_rounds_up_to_alignment() {
        // 3 payload bytes + length byte fit the boundary exactly
        let cmd = CapturedCommand::new(vec![0x0A, 0x02, 0x07]);
        assert_eq!(cmd.padded_len(), 4);
        assert_eq!(cmd.table_bytes(), vec![3, 0x0A, 0x02, 0x07]);

        let cmd = CapturedCommand::new(vec![0x0A, 0x02, 0x07, 0x01]);
        assert_eq!(cmd.padded_len(), 8);
        assert_eq!(
            cmd.table_bytes(),
            vec![4, 0x0A, 0x02, 0x07, 0x01, 0xFF, 0xFF, 0xFF]
        );
    }

    #[test]
    fn frames_outside_programs_are_dropped() {
        let mut recorder = MacroRecorder::new();
        recorder.frame_written(&[0x11, 0x01, 0x00]);
        recorder.begin_program();
        recorder.frame_written(&[0x11, 0x01, 0x01]);
        recorder.finish_program("adv on", false).unwrap();
        assert_eq!(recorder.programs().len(), 1);
        assert_eq!(recorder.programs()[0].command_count(), 1);
        assert_eq!(recorder.programs()[0].commands()[0].bytes(), [0x11, 0x01, 0x01]);
    }

    #[test]
    fn finish_without_begin_is_a_protocol_violation() {
        let mut recorder = MacroRecorder::new();
        let err = recorder.finish_program("nothing", false).unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));
    }

    #[test]
    fn sealed_length_is_always_aligned() {
        let mut recorder = MacroRecorder::new();
        recorder.begin_program();
        for len in 1..9 {
            recorder.frame_written(&vec![0xAB; len]);
        }
        recorder.finish_program("mixed lengths", false).unwrap();
        assert_eq!(recorder.programs()[0].byte_len() % COMMAND_ALIGNMENT, 0);
    }
}
