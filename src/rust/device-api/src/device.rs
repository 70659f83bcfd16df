// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use crate::{ProcessorId, Result, SignalHandle};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

/// Result of reading a data signal.
pub type Value = i32;

/// Identity the device reports after connect and setup.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DeviceInfo {
    pub manufacturer: String,
    pub model_number: String,
    pub serial_number: String,
    pub firmware_revision: String,
    pub hardware_revision: String,
}

/// Raw status signals the board exposes without any filter in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SignalKind {
    /// Push button state, 1 while pressed.
    Button,
    /// External power source, 1 while present.
    PowerStatus,
    /// Battery charger, 1 while charging.
    ChargeStatus,
    /// On-demand readout of the charger status (as opposed to the
    /// change notification above).
    ChargeStatusRead,
    /// Quaternion output of the sensor-fusion module.
    QuaternionFusion,
    /// Fires when the host connection drops.
    DisconnectEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PassthroughMode {
    All,
    Conditional,
    Count,
}

/// What to instantiate on the device's data-processor module.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum FilterKind {
    Timer {
        period_ms: u32,
        repetitions: u16,
        immediate_fire: bool,
    },
    Passthrough {
        parent: SignalHandle,
        mode: PassthroughMode,
        count: u16,
    },
    QuaternionAverage {
        parent: SignalHandle,
        depth: u8,
        /// Data-processor id the filter must land on. Shipped firmware
        /// hard-codes this number, so it is part of the binary contract.
        processor_id: ProcessorId,
    },
    /// A value-isolated child of `parent` that fires only when the
    /// parent produces exactly `value`.
    ValueMatch { parent: SignalHandle, value: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisingParams {
    pub tx_power: i8,
    pub interval_ms: u16,
    pub timeout_s: u8,
    /// Raw scan-response payload appended to the advertisement.
    pub scan_response: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedColor {
    Red,
    Green,
    Blue,
    Orange,
}

/// One channel of the LED pattern engine, mirroring the wire layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedPattern {
    pub high_intensity: u8,
    pub low_intensity: u8,
    pub rise_time_ms: u16,
    pub high_time_ms: u16,
    pub fall_time_ms: u16,
    pub pulse_duration_ms: u16,
    pub delay_time_ms: u16,
    pub repeat_count: u8,
}

impl LedPattern {
    /// Simple on/off flash, `intensity` in 0.0..=1.0 of full scale (31).
    pub fn flash(intensity: f32, on_time_ms: u16, period_ms: u16, repeat_count: u8) -> Self {
        LedPattern {
            high_intensity: (31.0 * intensity).round() as u8,
            low_intensity: 0,
            rise_time_ms: 0,
            high_time_ms: on_time_ms,
            fall_time_ms: 0,
            pulse_duration_ms: period_ms,
            delay_time_ms: 0,
            repeat_count,
        }
    }

    /// Long solid pulse with no off phase, used for the power-down and
    /// fully-charged indicators.
    pub fn solid_pulse(intensity: f32, high_time_ms: u16) -> Self {
        LedPattern {
            high_intensity: (31.0 * intensity).round() as u8,
            low_intensity: 0,
            rise_time_ms: 0,
            high_time_ms,
            fall_time_ms: 0,
            pulse_duration_ms: high_time_ms,
            delay_time_ms: 0,
            repeat_count: 0xFF,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccelerometerRange {
    G2,
    G4,
    G8,
    G16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GyroRange {
    Dps500,
    Dps1000,
    Dps2000,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionMode {
    Ndof,
    ImuPlus,
    Compass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorFusionConfig {
    pub acc_range: AccelerometerRange,
    pub gyro_range: GyroRange,
    pub mode: FusionMode,
}

impl Default for SensorFusionConfig {
    fn default() -> Self {
        SensorFusionConfig {
            acc_range: AccelerometerRange::G16,
            gyro_range: GyroRange::Dps2000,
            mode: FusionMode::ImuPlus,
        }
    }
}

/// Observes the exact bytes of every command frame the transport sends.
/// This is the only faithful source of the wire encoding; the capture
/// log is built from these callbacks, never from log text.
pub trait FrameObserver {
    fn frame_written(&mut self, frame: &[u8]);
}

/// The command/control surface of one connected pod, transport-agnostic.
///
/// Every method that talks to the device is a suspension point; the
/// pipeline awaits each round trip before issuing the next command, so
/// ordering on the wire matches call order exactly. There is no
/// parallelism and only one session per device.
#[allow(async_fn_in_trait)]
pub trait Device {
    fn info(&self) -> &DeviceInfo;

    /// Register the observer that receives every transmitted frame.
    fn set_frame_observer(&mut self, observer: Rc<RefCell<dyn FrameObserver>>);

    /// Look up a raw status signal. Fails with `UnsupportedCapability`
    /// when the backing module is absent on this board.
    fn signal(&self, kind: SignalKind) -> Result<SignalHandle>;

    /// Device-assigned data-processor id of a filter.
    fn processor_id(&self, filter: SignalHandle) -> Result<ProcessorId>;

    /// Snapshot of the full device configuration state, suitable for
    /// replay onto a factory-fresh board of the same revision.
    fn serialize(&self) -> Vec<u8>;

    async fn create_filter(&mut self, kind: FilterKind) -> Result<SignalHandle>;

    /// Commands issued after this call are stored as the trigger's event
    /// body instead of executing. Exactly one scope may be open.
    async fn begin_recording(&mut self, trigger: SignalHandle) -> Result<()>;

    /// Completes once the device confirms the scope is closed and the
    /// binding is committed to program memory.
    async fn end_recording(&mut self, trigger: SignalHandle) -> Result<()>;

    /// Run another stored program by its fixed numeric slot.
    async fn invoke_program(&mut self, program: u8) -> Result<()>;

    async fn erase_all_bindings(&mut self) -> Result<()>;

    /// Erase the bindings of a single trigger, leaving the rest intact.
    async fn erase_bindings(&mut self, trigger: SignalHandle) -> Result<()>;

    async fn timer_start(&mut self, timer: SignalHandle) -> Result<()>;
    async fn timer_stop(&mut self, timer: SignalHandle) -> Result<()>;

    /// Configure tx power, interval and scan response, then start
    /// advertising.
    async fn set_advertising(&mut self, params: &AdvertisingParams) -> Result<()>;
    async fn stop_advertising(&mut self) -> Result<()>;

    async fn led_stop_and_clear(&mut self) -> Result<()>;
    async fn led_write_pattern(&mut self, pattern: &LedPattern, color: LedColor) -> Result<()>;
    async fn led_play(&mut self) -> Result<()>;

    async fn configure_sensor_fusion(&mut self, config: &SensorFusionConfig) -> Result<()>;
    async fn sensor_fusion_enable_quaternion(&mut self) -> Result<()>;
    async fn sensor_fusion_start(&mut self) -> Result<()>;

    async fn enable_power_save(&mut self) -> Result<()>;
    async fn soft_reset(&mut self) -> Result<()>;
    async fn disconnect(&mut self) -> Result<()>;

    /// Inject a synthetic notification as if the device itself had
    /// produced it.
    async fn spoof_notification(&mut self, frame: &[u8]) -> Result<()>;

    /// Issue a read command for a readable signal.
    async fn read(&mut self, signal: SignalHandle) -> Result<Value>;

    /// Give the device time to finish internal bookkeeping.
    async fn settle(&mut self, duration: Duration) -> Result<()>;
}
