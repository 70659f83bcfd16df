// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! A host-side simulated pod. It answers the full device capability
//! surface without any radio: commands are encoded into the same wire
//! frames a physical board would receive, reported to the frame
//! observer, and applied to an in-memory model of the board (signal
//! arena, event bindings, recording scope). Generation passes run
//! against this stand-in both in tests and in the CLI.

pub mod wire;

use device_api::device::{
    AccelerometerRange, AdvertisingParams, Device, DeviceInfo, FilterKind, FrameObserver,
    FusionMode, GyroRange, LedColor, LedPattern, PassthroughMode, SensorFusionConfig, SignalKind,
    Value,
};
use device_api::{Capability, Error, ProcessorId, Result, SignalHandle};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

/// A trigger and the command frames stored for it in program memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBinding {
    pub trigger: SignalHandle,
    pub commands: Vec<Vec<u8>>,
}

#[derive(Debug, Clone)]
enum NodeKind {
    Raw(SignalKind),
    Filter(FilterKind),
}

/// One arena slot. Parent relationships live inside the stored
/// `FilterKind` as handle values, never as pointers.
#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    processor_id: Option<ProcessorId>,
    timer_id: Option<u8>,
}

struct PendingBinding {
    trigger: SignalHandle,
    commands: Vec<Vec<u8>>,
}

pub struct VirtualDevice {
    info: DeviceInfo,
    nodes: Vec<Node>,
    next_processor_id: ProcessorId,
    next_timer_id: u8,
    recording: Option<PendingBinding>,
    bindings: Vec<EventBinding>,
    observer: Option<Rc<RefCell<dyn FrameObserver>>>,
    frames_sent: usize,
    fail_after: Option<usize>,
}

fn fusion_mode_byte(mode: FusionMode) -> u8 {
    match mode {
        FusionMode::Ndof => 1,
        FusionMode::ImuPlus => 2,
        FusionMode::Compass => 3,
    }
}

fn acc_range_byte(range: AccelerometerRange) -> u8 {
    match range {
        AccelerometerRange::G2 => 0,
        AccelerometerRange::G4 => 1,
        AccelerometerRange::G8 => 2,
        AccelerometerRange::G16 => 3,
    }
}

fn gyro_range_byte(range: GyroRange) -> u8 {
    match range {
        GyroRange::Dps2000 => 0,
        GyroRange::Dps1000 => 1,
        GyroRange::Dps500 => 2,
    }
}

fn passthrough_mode_byte(mode: PassthroughMode) -> u8 {
    match mode {
        PassthroughMode::All => 0,
        PassthroughMode::Conditional => 1,
        PassthroughMode::Count => 2,
    }
}

fn led_color_byte(color: LedColor) -> u8 {
    match color {
        LedColor::Red => 0,
        LedColor::Green => 1,
        LedColor::Blue => 2,
        LedColor::Orange => 3,
    }
}

fn raw_signal_route(kind: SignalKind) -> (u8, u8) {
    match kind {
        SignalKind::Button => (wire::module::SWITCH, wire::switch::STATE),
        SignalKind::PowerStatus => (wire::module::SETTINGS, wire::settings::POWER_STATUS),
        SignalKind::ChargeStatus | SignalKind::ChargeStatusRead => {
            (wire::module::SETTINGS, wire::settings::CHARGE_STATUS)
        }
        SignalKind::QuaternionFusion => {
            (wire::module::SENSOR_FUSION, wire::sensor_fusion::QUATERNION)
        }
        SignalKind::DisconnectEvent => {
            (wire::module::SETTINGS, wire::settings::DISCONNECT_EVENT)
        }
    }
}

impl VirtualDevice {
    pub fn new(info: DeviceInfo) -> Self {
        let mut device = VirtualDevice {
            info,
            nodes: Vec::new(),
            next_processor_id: 0,
            next_timer_id: 0,
            recording: None,
            bindings: Vec::new(),
            observer: None,
            frames_sent: 0,
            fail_after: None,
        };
        for kind in [
            SignalKind::Button,
            SignalKind::PowerStatus,
            SignalKind::ChargeStatus,
            SignalKind::ChargeStatusRead,
            SignalKind::QuaternionFusion,
            SignalKind::DisconnectEvent,
        ] {
            device.nodes.push(Node {
                kind: NodeKind::Raw(kind),
                processor_id: None,
                timer_id: None,
            });
        }
        device
    }

    /// A board with the usual identity for the given revision pair.
    pub fn spoof(firmware_revision: &str, hardware_revision: &str) -> Self {
        VirtualDevice::new(DeviceInfo {
            manufacturer: "Sensor Labs".to_owned(),
            model_number: "5".to_owned(),
            serial_number: "0478BC".to_owned(),
            firmware_revision: firmware_revision.to_owned(),
            hardware_revision: hardware_revision.to_owned(),
        })
    }

    /// Drop the sensor-fusion module, as on older hardware.
    pub fn without_sensor_fusion(mut self) -> Self {
        self.nodes.retain(
            |node| !matches!(node.kind, NodeKind::Raw(SignalKind::QuaternionFusion)),
        );
        self
    }

    /// Sever the link after `frames` frames have gone out; every
    /// subsequent command fails with `DeviceCommunication`.
    pub fn fail_after_frames(&mut self, frames: usize) {
        self.fail_after = Some(frames);
    }

    pub fn frames_sent(&self) -> usize {
        self.frames_sent
    }

    /// Committed bindings in commit order.
    pub fn bindings(&self) -> &[EventBinding] {
        &self.bindings
    }

    pub fn bindings_for(&self, trigger: SignalHandle) -> Vec<&EventBinding> {
        self.bindings.iter().filter(|b| b.trigger == trigger).collect()
    }

    fn node(&self, handle: SignalHandle) -> Result<&Node> {
        self.nodes
            .get(handle.0 as usize)
            .ok_or_else(|| Error::new(&format!("unknown signal handle {}", handle.0)))
    }

    fn push_node(&mut self, node: Node) -> SignalHandle {
        self.nodes.push(node);
        SignalHandle((self.nodes.len() - 1) as u16)
    }

    /// Transmit one frame: link check, observer callback, and capture
    /// into the open recording scope if there is one.
    fn send(&mut self, frame: Vec<u8>) -> Result<()> {
        if let Some(limit) = self.fail_after
            && self.frames_sent >= limit
        {
            return Err(Error::DeviceCommunication(format!(
                "link lost after {limit} frames"
            )));
        }
        self.frames_sent += 1;
        log::trace!("tx {frame:02X?}");
        if let Some(observer) = &self.observer {
            observer.borrow_mut().frame_written(&frame);
        }
        if let Some(pending) = &mut self.recording {
            pending.commands.push(frame);
        }
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    fn snapshot_node(&self, out: &mut Vec<u8>, node: &Node) {
        match &node.kind {
            NodeKind::Raw(kind) => {
                let (module, register) = raw_signal_route(*kind);
                out.extend_from_slice(&[0, module, register]);
            }
            NodeKind::Filter(FilterKind::Timer {
                period_ms,
                repetitions,
                immediate_fire,
            }) => {
                out.push(1);
                out.extend_from_slice(&period_ms.to_le_bytes());
                out.extend_from_slice(&repetitions.to_le_bytes());
                out.push((*immediate_fire).into());
            }
            NodeKind::Filter(FilterKind::Passthrough { parent, mode, count }) => {
                out.push(2);
                out.extend_from_slice(&wire::handle_bytes(*parent));
                out.push(passthrough_mode_byte(*mode));
                out.extend_from_slice(&count.to_le_bytes());
            }
            NodeKind::Filter(FilterKind::QuaternionAverage {
                parent,
                depth,
                processor_id,
            }) => {
                out.push(3);
                out.extend_from_slice(&wire::handle_bytes(*parent));
                out.extend_from_slice(&[*depth, *processor_id]);
            }
            NodeKind::Filter(FilterKind::ValueMatch { parent, value }) => {
                out.push(4);
                out.extend_from_slice(&wire::handle_bytes(*parent));
                out.push(*value);
            }
        }
    }
}

impl Device for VirtualDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn set_frame_observer(&mut self, observer: Rc<RefCell<dyn FrameObserver>>) {
        self.observer = Some(observer);
    }

    fn signal(&self, kind: SignalKind) -> Result<SignalHandle> {
        self.nodes
            .iter()
            .position(|node| matches!(node.kind, NodeKind::Raw(k) if k == kind))
            .map(|index| SignalHandle(index as u16))
            .ok_or(Error::UnsupportedCapability(match kind {
                SignalKind::QuaternionFusion => Capability::SensorFusion,
                _ => Capability::DataProcessor,
            }))
    }

    fn processor_id(&self, filter: SignalHandle) -> Result<ProcessorId> {
        self.node(filter)?
            .processor_id
            .ok_or_else(|| Error::new(&format!("signal {} is not a data processor", filter.0)))
    }

    fn serialize(&self) -> Vec<u8> {
        let mut out = vec![1u8]; // snapshot format version
        for text in [&self.info.firmware_revision, &self.info.hardware_revision] {
            out.push(text.len() as u8);
            out.extend_from_slice(text.as_bytes());
        }
        out.extend_from_slice(&(self.nodes.len() as u16).to_le_bytes());
        for node in &self.nodes {
            self.snapshot_node(&mut out, node);
        }
        out.extend_from_slice(&(self.bindings.len() as u16).to_le_bytes());
        for binding in &self.bindings {
            out.extend_from_slice(&wire::handle_bytes(binding.trigger));
            out.push(binding.commands.len() as u8);
            for command in &binding.commands {
                out.push(command.len() as u8);
                out.extend_from_slice(command);
            }
        }
        out
    }

    async fn create_filter(&mut self, kind: FilterKind) -> Result<SignalHandle> {
        match kind {
            FilterKind::Timer {
                period_ms,
                repetitions,
                immediate_fire,
            } => {
                let mut frame = vec![wire::module::TIMER, wire::timer::CREATE];
                frame.extend_from_slice(&period_ms.to_le_bytes());
                frame.extend_from_slice(&repetitions.to_le_bytes());
                frame.push(immediate_fire.into());
                self.send(frame)?;
                let timer_id = self.next_timer_id;
                self.next_timer_id += 1;
                Ok(self.push_node(Node {
                    kind: NodeKind::Filter(kind),
                    processor_id: None,
                    timer_id: Some(timer_id),
                }))
            }
            FilterKind::Passthrough { parent, mode, count } => {
                self.node(parent)?;
                let mut frame = vec![wire::module::DATA_PROCESSOR, wire::data_processor::CREATE];
                frame.extend_from_slice(&wire::handle_bytes(parent));
                frame.push(wire::data_processor::TYPE_PASSTHROUGH);
                frame.push(passthrough_mode_byte(mode));
                frame.extend_from_slice(&count.to_le_bytes());
                self.send(frame)?;
                let processor_id = self.next_processor_id;
                self.next_processor_id += 1;
                Ok(self.push_node(Node {
                    kind: NodeKind::Filter(kind),
                    processor_id: Some(processor_id),
                    timer_id: None,
                }))
            }
            FilterKind::QuaternionAverage {
                parent,
                depth,
                processor_id,
            } => {
                if !matches!(
                    self.node(parent)?.kind,
                    NodeKind::Raw(SignalKind::QuaternionFusion)
                ) {
                    return Err(Error::UnsupportedCapability(Capability::SensorFusion));
                }
                let mut frame = vec![wire::module::DATA_PROCESSOR, wire::data_processor::CREATE];
                frame.extend_from_slice(&wire::handle_bytes(parent));
                frame.extend_from_slice(&[
                    wire::data_processor::TYPE_QUATERNION_AVERAGE,
                    depth,
                    processor_id,
                ]);
                self.send(frame)?;
                self.next_processor_id = self.next_processor_id.max(processor_id + 1);
                Ok(self.push_node(Node {
                    kind: NodeKind::Filter(kind),
                    processor_id: Some(processor_id),
                    timer_id: None,
                }))
            }
            // Value-isolated children are a host-side view of the
            // parent's event routing; nothing crosses the wire.
            FilterKind::ValueMatch { parent, .. } => {
                self.node(parent)?;
                Ok(self.push_node(Node {
                    kind: NodeKind::Filter(kind),
                    processor_id: None,
                    timer_id: None,
                }))
            }
        }
    }

    async fn begin_recording(&mut self, trigger: SignalHandle) -> Result<()> {
        self.node(trigger)?;
        if let Some(pending) = &self.recording {
            return Err(Error::ProtocolViolation(format!(
                "device already recording for trigger {}",
                pending.trigger.0
            )));
        }
        let mut frame = vec![wire::module::EVENT, wire::event::RECORD];
        frame.extend_from_slice(&wire::handle_bytes(trigger));
        self.send(frame)?;
        self.recording = Some(PendingBinding {
            trigger,
            commands: Vec::new(),
        });
        Ok(())
    }

    async fn end_recording(&mut self, trigger: SignalHandle) -> Result<()> {
        let pending = match self.recording.take() {
            Some(pending) if pending.trigger == trigger => pending,
            Some(pending) => {
                return Err(Error::ProtocolViolation(format!(
                    "end of recording for trigger {} while recording trigger {}",
                    trigger.0, pending.trigger.0
                )));
            }
            None => {
                return Err(Error::ProtocolViolation(format!(
                    "end of recording for trigger {} while not recording",
                    trigger.0
                )));
            }
        };
        let mut frame = vec![wire::module::EVENT, wire::event::END_RECORD];
        frame.extend_from_slice(&wire::handle_bytes(trigger));
        // A failure here loses the pending binding: program memory for
        // the trigger is undefined and the pass must abort.
        self.send(frame)?;
        self.bindings.push(EventBinding {
            trigger: pending.trigger,
            commands: pending.commands,
        });
        Ok(())
    }

    async fn invoke_program(&mut self, program: u8) -> Result<()> {
        self.send(vec![wire::module::MACRO, wire::macros::EXECUTE, program])
    }

    async fn erase_all_bindings(&mut self) -> Result<()> {
        self.send(vec![wire::module::EVENT, wire::event::REMOVE_ALL])?;
        if !self.is_recording() {
            self.bindings.clear();
        }
        Ok(())
    }

    async fn erase_bindings(&mut self, trigger: SignalHandle) -> Result<()> {
        self.node(trigger)?;
        let mut frame = vec![wire::module::EVENT, wire::event::ERASE];
        frame.extend_from_slice(&wire::handle_bytes(trigger));
        self.send(frame)?;
        if !self.is_recording() {
            self.bindings.retain(|binding| binding.trigger != trigger);
        }
        Ok(())
    }

    async fn timer_start(&mut self, timer: SignalHandle) -> Result<()> {
        let timer_id = self
            .node(timer)?
            .timer_id
            .ok_or_else(|| Error::new(&format!("signal {} is not a timer", timer.0)))?;
        self.send(vec![wire::module::TIMER, wire::timer::START, timer_id])
    }

    async fn timer_stop(&mut self, timer: SignalHandle) -> Result<()> {
        let timer_id = self
            .node(timer)?
            .timer_id
            .ok_or_else(|| Error::new(&format!("signal {} is not a timer", timer.0)))?;
        self.send(vec![wire::module::TIMER, wire::timer::STOP, timer_id])
    }

    async fn set_advertising(&mut self, params: &AdvertisingParams) -> Result<()> {
        self.send(vec![
            wire::module::SETTINGS,
            wire::settings::TX_POWER,
            params.tx_power as u8,
        ])?;
        let mut frame = vec![wire::module::SETTINGS, wire::settings::AD_INTERVAL];
        frame.extend_from_slice(&params.interval_ms.to_le_bytes());
        frame.push(params.timeout_s);
        self.send(frame)?;
        let mut frame = vec![wire::module::SETTINGS, wire::settings::SCAN_RESPONSE];
        frame.extend_from_slice(&params.scan_response);
        self.send(frame)?;
        self.send(vec![wire::module::SETTINGS, wire::settings::ADVERTISING, 1])
    }

    async fn stop_advertising(&mut self) -> Result<()> {
        self.send(vec![wire::module::SETTINGS, wire::settings::ADVERTISING, 0])
    }

    async fn led_stop_and_clear(&mut self) -> Result<()> {
        self.send(vec![wire::module::LED, wire::led::STOP_CLEAR, 1])
    }

    async fn led_write_pattern(&mut self, pattern: &LedPattern, color: LedColor) -> Result<()> {
        let mut frame = vec![wire::module::LED, wire::led::PATTERN, led_color_byte(color)];
        frame.push(pattern.high_intensity);
        frame.push(pattern.low_intensity);
        frame.extend_from_slice(&pattern.rise_time_ms.to_le_bytes());
        frame.extend_from_slice(&pattern.high_time_ms.to_le_bytes());
        frame.extend_from_slice(&pattern.fall_time_ms.to_le_bytes());
        frame.extend_from_slice(&pattern.pulse_duration_ms.to_le_bytes());
        frame.extend_from_slice(&pattern.delay_time_ms.to_le_bytes());
        frame.push(pattern.repeat_count);
        self.send(frame)
    }

    async fn led_play(&mut self) -> Result<()> {
        self.send(vec![wire::module::LED, wire::led::PLAY, 1])
    }

    async fn configure_sensor_fusion(&mut self, config: &SensorFusionConfig) -> Result<()> {
        self.signal(SignalKind::QuaternionFusion)?;
        self.send(vec![
            wire::module::SENSOR_FUSION,
            wire::sensor_fusion::CONFIG,
            fusion_mode_byte(config.mode),
            acc_range_byte(config.acc_range),
            gyro_range_byte(config.gyro_range),
        ])
    }

    async fn sensor_fusion_enable_quaternion(&mut self) -> Result<()> {
        self.signal(SignalKind::QuaternionFusion)?;
        self.send(vec![
            wire::module::SENSOR_FUSION,
            wire::sensor_fusion::OUTPUT_ENABLE,
            wire::sensor_fusion::QUATERNION,
            1,
        ])
    }

    async fn sensor_fusion_start(&mut self) -> Result<()> {
        self.signal(SignalKind::QuaternionFusion)?;
        self.send(vec![wire::module::SENSOR_FUSION, wire::sensor_fusion::ENABLE, 1])
    }

    async fn enable_power_save(&mut self) -> Result<()> {
        self.send(vec![wire::module::DEBUG, wire::debug::POWER_SAVE])
    }

    async fn soft_reset(&mut self) -> Result<()> {
        self.send(vec![wire::module::DEBUG, wire::debug::RESET])
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.send(vec![wire::module::DEBUG, wire::debug::DISCONNECT])
    }

    async fn spoof_notification(&mut self, notification: &[u8]) -> Result<()> {
        let mut frame = vec![wire::module::DEBUG, wire::debug::SPOOF_NOTIFICATION];
        frame.extend_from_slice(notification);
        self.send(frame)
    }

    async fn read(&mut self, signal: SignalHandle) -> Result<Value> {
        let kind = match &self.node(signal)?.kind {
            NodeKind::Raw(kind) => *kind,
            NodeKind::Filter(_) => {
                return Err(Error::new(&format!("signal {} is not readable", signal.0)));
            }
        };
        let (module, register) = raw_signal_route(kind);
        self.send(vec![module, register | wire::READ_FLAG])?;
        // The model board sits unplugged with the button up.
        Ok(0)
    }

    async fn settle(&mut self, duration: Duration) -> Result<()> {
        log::trace!("settle for {duration:?}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn button_released(device: &mut VirtualDevice) -> SignalHandle {
        let button = device.signal(SignalKind::Button).unwrap();
        device
            .create_filter(FilterKind::ValueMatch { parent: button, value: 0 })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn recording_scope_commits_a_binding() {
        let mut device = VirtualDevice::spoof("1.5.0", "0.4");
        let trigger = button_released(&mut device).await;
        device.begin_recording(trigger).await.unwrap();
        device.enable_power_save().await.unwrap();
        device.soft_reset().await.unwrap();
        device.end_recording(trigger).await.unwrap();

        assert_eq!(device.bindings().len(), 1);
        let binding = &device.bindings()[0];
        assert_eq!(binding.trigger, trigger);
        assert_eq!(
            binding.commands,
            vec![
                vec![wire::module::DEBUG, wire::debug::POWER_SAVE],
                vec![wire::module::DEBUG, wire::debug::RESET],
            ]
        );
    }

    #[tokio::test]
    async fn overlapping_scopes_are_rejected() {
        let mut device = VirtualDevice::spoof("1.5.0", "0.4");
        let trigger = button_released(&mut device).await;
        device.begin_recording(trigger).await.unwrap();
        let err = device.begin_recording(trigger).await.unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn erase_inside_a_scope_is_recorded_not_executed() {
        let mut device = VirtualDevice::spoof("1.5.0", "0.4");
        let trigger = button_released(&mut device).await;
        device.begin_recording(trigger).await.unwrap();
        device.led_play().await.unwrap();
        device.end_recording(trigger).await.unwrap();

        let other = device.signal(SignalKind::PowerStatus).unwrap();
        device.begin_recording(other).await.unwrap();
        device.erase_bindings(trigger).await.unwrap();
        device.end_recording(other).await.unwrap();

        // the first binding survives; the erase only lives inside the
        // second binding's body
        assert_eq!(device.bindings().len(), 2);
        assert_eq!(device.bindings()[0].trigger, trigger);
    }

    #[tokio::test]
    async fn link_failure_is_device_communication() {
        let mut device = VirtualDevice::spoof("1.5.0", "0.4");
        device.fail_after_frames(1);
        device.led_play().await.unwrap();
        let err = device.led_play().await.unwrap_err();
        assert!(matches!(err, Error::DeviceCommunication(_)));
    }

    #[tokio::test]
    async fn missing_sensor_fusion_is_unsupported() {
        let device = VirtualDevice::spoof("1.4.97", "0.3").without_sensor_fusion();
        let err = device.signal(SignalKind::QuaternionFusion).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedCapability(Capability::SensorFusion)
        ));
    }

    #[tokio::test]
    async fn snapshots_are_deterministic() {
        let mut first = VirtualDevice::spoof("1.4.4", "0.4");
        let mut second = VirtualDevice::spoof("1.4.4", "0.4");
        for device in [&mut first, &mut second] {
            let trigger = button_released(device).await;
            device.begin_recording(trigger).await.unwrap();
            device.soft_reset().await.unwrap();
            device.end_recording(trigger).await.unwrap();
        }
        assert_eq!(first.serialize(), second.serialize());
    }
}
