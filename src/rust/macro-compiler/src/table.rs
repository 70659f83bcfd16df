// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Concatenates the sealed programs of one pass into the flat command
//! blob plus fixed-stride descriptor table the firmware embeds, and
//! parses such a blob back into discrete commands for verification.

use crate::capture::Program;
use crate::{COMMAND_ALIGNMENT, FILLER_BYTE};
use device_api::{Error, Result};

/// Terminates the flat command array.
pub const TABLE_SENTINEL: [u8; 4] = [FILLER_BYTE; COMMAND_ALIGNMENT];

/// One fixed-stride table entry. The firmware walks commands by count,
/// not by byte length, which is why the count is stored per program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub reserved: u8,
    pub command_count: u8,
    pub is_boot: u8,
    pub byte_offset: u32,
}

impl Descriptor {
    /// Packed size of one entry, offset little-endian, one pad byte
    /// after the boot flag.
    pub const STRIDE: usize = 8;

    pub fn to_bytes(self) -> [u8; Self::STRIDE] {
        let off = self.byte_offset.to_le_bytes();
        [
            self.reserved,
            self.command_count,
            self.is_boot,
            0,
            off[0],
            off[1],
            off[2],
            off[3],
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramTable {
    descriptors: Vec<Descriptor>,
    /// All table-form commands in generation order, sentinel included.
    all_commands: Vec<u8>,
}

impl ProgramTable {
    /// Concatenate sealed programs in generation order, offsets equal
    /// to the cumulative sum of prior byte lengths.
    pub fn build(programs: &[Program]) -> Result<ProgramTable> {
        let mut descriptors = Vec::with_capacity(programs.len());
        let mut all_commands = Vec::new();
        let mut offset: u32 = 0;
        for (index, program) in programs.iter().enumerate() {
            if program.command_count() > usize::from(u8::MAX) {
                return Err(Error::Serialization {
                    program: index,
                    command: program.command_count(),
                    reason: "program exceeds the one-byte command count".into(),
                });
            }
            for (cmd_index, command) in program.commands().iter().enumerate() {
                // 0xFF is reserved for the filler, so the length
                // prefix tops out one short of u8::MAX
                if command.bytes().len() >= usize::from(FILLER_BYTE) {
                    return Err(Error::Serialization {
                        program: index,
                        command: cmd_index,
                        reason: "frame too long for the one-byte length prefix".into(),
                    });
                }
                all_commands.extend_from_slice(&command.table_bytes());
            }
            descriptors.push(Descriptor {
                reserved: 0,
                command_count: program.command_count() as u8,
                is_boot: program.is_boot().into(),
                byte_offset: offset,
            });
            offset += program.byte_len() as u32;
        }
        all_commands.extend_from_slice(&TABLE_SENTINEL);
        Ok(ProgramTable {
            descriptors,
            all_commands,
        })
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    pub fn all_commands(&self) -> &[u8] {
        &self.all_commands
    }

    /// The descriptor array as packed bytes, one `STRIDE` per program.
    pub fn descriptor_bytes(&self) -> Vec<u8> {
        self.descriptors
            .iter()
            .flat_map(|d| d.to_bytes())
            .collect()
    }

    /// Render both arrays as C source for direct firmware embedding.
    /// `programs` must be the same sealed set the table was built from;
    /// it supplies the per-macro comment lines.
    pub fn to_c_source(&self, programs: &[Program]) -> String {
        let mut out = String::from("const macro_command_t static_macro_commands[] = {\n");
        for (index, program) in programs.iter().enumerate() {
            out.push_str(&format!(
                "// Macro:{} lines:{} bytes:{} bootup:{} - {}\n",
                index,
                program.command_count(),
                program.byte_len(),
                if program.is_boot() { "yes" } else { "no" },
                program.description(),
            ));
            for command in program.commands() {
                let encoded = command
                    .table_bytes()
                    .iter()
                    .map(|b| format!("0x{b:02X}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                out.push_str(&format!("  {encoded},\n"));
            }
        }
        out.push_str("  0xFF, 0xFF, 0xFF, 0xFF,\n};\n");
        out.push_str("const macro_entry_t static_macro_macros[] = {\n");
        for descriptor in &self.descriptors {
            out.push_str(&format!(
                "  {{{}, {}, {}, {}}},\n",
                descriptor.reserved,
                descriptor.command_count,
                descriptor.is_boot,
                descriptor.byte_offset,
            ));
        }
        out.push_str("};\n");
        out
    }

    /// Parse this table back into per-program command lists.
    pub fn parse(&self) -> Result<Vec<Vec<Vec<u8>>>> {
        parse_table(&self.all_commands, &self.descriptors)
    }
}

/// Recover the nested form from a dumped table blob. Any malformed
/// frame names the offending program and command instead of being
/// dropped; the output feeds a firmware build.
pub fn parse_table(
    all_commands: &[u8],
    descriptors: &[Descriptor],
) -> Result<Vec<Vec<Vec<u8>>>> {
    let mut programs = Vec::with_capacity(descriptors.len());
    let mut end_of_last = 0usize;
    for (index, descriptor) in descriptors.iter().enumerate() {
        let mut pos = descriptor.byte_offset as usize;
        let mut commands = Vec::with_capacity(descriptor.command_count.into());
        for cmd_index in 0..descriptor.command_count {
            let malformed = |reason: &str| Error::Serialization {
                program: index,
                command: cmd_index.into(),
                reason: reason.into(),
            };
            let len = *all_commands
                .get(pos)
                .ok_or_else(|| malformed("length prefix past end of blob"))? as usize;
            if len == 0 || len == usize::from(FILLER_BYTE) {
                return Err(malformed("implausible length prefix"));
            }
            let body = all_commands
                .get(pos + 1..pos + 1 + len)
                .ok_or_else(|| malformed("frame truncated"))?;
            let padded = (1 + len).next_multiple_of(COMMAND_ALIGNMENT);
            let padding = all_commands
                .get(pos + 1 + len..pos + padded)
                .ok_or_else(|| malformed("padding truncated"))?;
            if padding.iter().any(|b| *b != FILLER_BYTE) {
                return Err(malformed("padding is not the filler byte"));
            }
            commands.push(body.to_vec());
            pos += padded;
        }
        end_of_last = end_of_last.max(pos);
        programs.push(commands);
    }
    let tail = all_commands
        .get(end_of_last..)
        .ok_or_else(|| Error::new("table blob shorter than its descriptors claim"))?;
    if tail != TABLE_SENTINEL {
        return Err(Error::new("table blob does not end in the sentinel"));
    }
    Ok(programs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MacroRecorder;
    use device_api::device::FrameObserver;

    fn sealed(specs: &[(&str, bool, &[&[u8]])]) -> Vec<Program> {
        let mut recorder = MacroRecorder::new();
        for (description, is_boot, frames) in specs {
            recorder.begin_program();
            for frame in *frames {
                recorder.frame_written(frame);
            }
            recorder.finish_program(description, *is_boot).unwrap();
        }
        recorder.take_programs()
    }

    fn sample_programs() -> Vec<Program> {
        sealed(&[
            ("boot", true, &[&[0x11, 0x01, 0x00], &[0x0A, 0x02, 0x07, 0x01, 0x00]]),
            ("wait", false, &[&[0x02, 0x01, 0x01]]),
            ("stream", false, &[&[0x19, 0x01, 0x01], &[0xFE, 0x06]]),
        ])
    }

    #[test]
    fn offsets_are_cumulative_byte_lengths() {
        let programs = sample_programs();
        let table = ProgramTable::build(&programs).unwrap();
        let descriptors = table.descriptors();
        assert_eq!(descriptors[0].byte_offset, 0);
        for i in 1..descriptors.len() {
            assert!(descriptors[i].byte_offset > descriptors[i - 1].byte_offset);
            assert_eq!(
                descriptors[i].byte_offset - descriptors[i - 1].byte_offset,
                programs[i - 1].byte_len() as u32
            );
        }
        let total: usize = programs.iter().map(Program::byte_len).sum();
        assert_eq!(table.all_commands().len(), total + TABLE_SENTINEL.len());
    }

    #[test]
    fn descriptor_bytes_are_fixed_stride() {
        let table = ProgramTable::build(&sample_programs()).unwrap();
        let bytes = table.descriptor_bytes();
        assert_eq!(bytes.len(), table.descriptors().len() * Descriptor::STRIDE);
        // boot flag of the first entry, offset of the second
        assert_eq!(bytes[2], 1);
        let second_offset = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
        assert_eq!(second_offset, table.descriptors()[1].byte_offset);
    }

    #[test]
    fn parse_recovers_the_nested_form() {
        let programs = sample_programs();
        let table = ProgramTable::build(&programs).unwrap();
        let nested: Vec<Vec<Vec<u8>>> = programs.iter().map(Program::nested).collect();
        assert_eq!(table.parse().unwrap(), nested);
    }

    #[test]
    fn truncated_blob_names_the_bad_command() {
        let table = ProgramTable::build(&sample_programs()).unwrap();
        let truncated = &table.all_commands()[..table.all_commands().len() - 6];
        let err = parse_table(truncated, table.descriptors()).unwrap_err();
        match err {
            Error::Serialization { program, .. } => assert_eq!(program, 2),
            other => panic!("expected a serialization error, got {other:?}"),
        }
    }

    #[test]
    fn corrupt_padding_is_rejected() {
        let table = ProgramTable::build(&sample_programs()).unwrap();
        let mut blob = table.all_commands().to_vec();
        // first command is 3 bytes + length prefix, no padding; second
        // program starts at offset 12 after the 5-byte command's pad
        blob[11] = 0x00;
        let err = parse_table(&blob, table.descriptors()).unwrap_err();
        assert!(matches!(err, Error::Serialization { .. }));
    }

    #[test]
    fn c_source_contains_both_arrays_and_the_sentinel() {
        let programs = sample_programs();
        let table = ProgramTable::build(&programs).unwrap();
        let source = table.to_c_source(&programs);
        assert!(source.contains("static_macro_commands"));
        assert!(source.contains("static_macro_macros"));
        assert!(source.contains("0xFF, 0xFF, 0xFF, 0xFF,"));
        assert!(source.contains("bootup:yes - boot"));
        assert!(source.contains("{0, 1, 0, 12}"));
    }
}
