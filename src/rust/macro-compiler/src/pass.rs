// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! One generation pass against one connected device. The pass owns the
//! device session and the capture log and is threaded by reference
//! through every generator, so there is no ambient shared state.

use crate::capture::{MacroRecorder, Program};
use crate::programs;
use crate::table::ProgramTable;
use device_api::device::Device;
use device_api::{Error, FrameObserver, ProcessorId, Result, SignalHandle};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

/// Fixed interval each generator waits before sealing, giving the
/// device time to finish internal bookkeeping.
pub const SETTLE_INTERVAL: Duration = Duration::from_millis(200);

/// Everything one pass produces for a firmware/hardware revision pair.
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub programs: Vec<Program>,
    pub table: ProgramTable,
    /// Nested output encoding for host-side replay: program, command,
    /// bytes.
    pub nested: Vec<Vec<Vec<u8>>>,
    /// Full device configuration snapshot for the bootstrap store.
    pub snapshot: Vec<u8>,
    pub quaternion_processor_id: ProcessorId,
    pub firmware_revision: String,
    pub hardware_revision: String,
}

impl GenerationOutput {
    /// Constants the firmware build needs alongside the table.
    pub fn firmware_constants(&self) -> String {
        format!(
            "const uint8_t stream_state_id = {};\nconst uint8_t quaternion_average_id = {};\n",
            programs::ProgramId::Stream.id(),
            self.quaternion_processor_id,
        )
    }
}

pub struct GenerationPass<D: Device> {
    device: D,
    recorder: Rc<RefCell<MacroRecorder>>,
    open_scope: Option<SignalHandle>,
}

impl<D: Device> GenerationPass<D> {
    pub fn new(mut device: D) -> Self {
        let recorder = Rc::new(RefCell::new(MacroRecorder::new()));
        device.set_frame_observer(Rc::clone(&recorder) as Rc<RefCell<dyn FrameObserver>>);
        GenerationPass {
            device,
            recorder,
            open_scope: None,
        }
    }

    /// Generate all five state programs in slot order and build the
    /// output artifacts. Idempotent for a given device revision; on
    /// failure the programs sealed so far remain available through
    /// [`GenerationPass::sealed_programs`].
    pub async fn run(&mut self) -> Result<GenerationOutput> {
        let info = self.device.info().clone();
        log::info!(
            "generating macros for firmware {} / hardware {}",
            info.firmware_revision,
            info.hardware_revision
        );
        let graph = programs::generate_boot(self).await?;
        programs::generate_wait(self, &graph).await?;
        programs::generate_stream(self, &graph).await?;
        programs::generate_sleep_on_button_release(self, &graph).await?;
        programs::generate_plugged_in(self, &graph).await?;

        let sealed = self.recorder.borrow().programs().to_vec();
        let table = ProgramTable::build(&sealed)?;
        let nested = sealed.iter().map(Program::nested).collect();
        let quaternion_processor_id = self.device.processor_id(graph.quaternion_average)?;
        Ok(GenerationOutput {
            programs: sealed,
            table,
            nested,
            snapshot: self.device.serialize(),
            quaternion_processor_id,
            firmware_revision: info.firmware_revision,
            hardware_revision: info.hardware_revision,
        })
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn firmware_revision(&self) -> String {
        self.device.info().firmware_revision.clone()
    }

    /// Programs sealed so far. After a failed pass these are the ones
    /// that remain valid; the in-flight capture is never included.
    pub fn sealed_programs(&self) -> Vec<Program> {
        self.recorder.borrow().programs().to_vec()
    }

    /// Reset the capture log for the next program.
    pub fn begin_program(&mut self) -> Result<()> {
        if let Some(trigger) = self.open_scope {
            return Err(Error::ProtocolViolation(format!(
                "program started while a recording scope for {trigger:?} is still open"
            )));
        }
        self.recorder.borrow_mut().begin_program();
        Ok(())
    }

    /// Settle, then seal the open program.
    pub async fn seal_program(&mut self, description: &str, is_boot: bool) -> Result<()> {
        if let Some(trigger) = self.open_scope {
            return Err(Error::ProtocolViolation(format!(
                "program \"{description}\" sealed while a recording scope for {trigger:?} is still open"
            )));
        }
        self.device.settle(SETTLE_INTERVAL).await?;
        self.recorder.borrow_mut().finish_program(description, is_boot)
    }

    /// Open a recording scope: subsequent commands become the trigger's
    /// event body on-device instead of executing.
    pub async fn begin_recording(&mut self, trigger: SignalHandle) -> Result<()> {
        if let Some(open) = self.open_scope {
            return Err(Error::ProtocolViolation(format!(
                "begin_recording({trigger:?}) while the scope for {open:?} is still open"
            )));
        }
        self.device.begin_recording(trigger).await?;
        self.open_scope = Some(trigger);
        Ok(())
    }

    /// Close the scope opened for `trigger`. An incomplete close leaves
    /// the device's program memory undefined for that trigger, so any
    /// error here is pipeline-fatal.
    pub async fn end_recording(&mut self, trigger: SignalHandle) -> Result<()> {
        match self.open_scope {
            Some(open) if open == trigger => {}
            Some(open) => {
                return Err(Error::ProtocolViolation(format!(
                    "end_recording({trigger:?}) does not match the open scope for {open:?}"
                )));
            }
            None => {
                return Err(Error::ProtocolViolation(format!(
                    "end_recording({trigger:?}) without an open scope"
                )));
            }
        }
        self.device.end_recording(trigger).await?;
        self.open_scope = None;
        Ok(())
    }
}
