// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

pub mod device;

pub use device::{
    AdvertisingParams, Device, DeviceInfo, FilterKind, FrameObserver, LedColor, LedPattern,
    PassthroughMode, SensorFusionConfig, SignalKind, Value,
};

/// Arena index of a signal node on the device. Covers both raw status
/// signals and derived filters; opaque to the generation pipeline except
/// that creation order determines device-assigned data-processor ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SignalHandle(pub u16);

/// Numeric id of a data-processing filter as assigned by the device.
/// Baked into shipped firmware as a literal constant.
pub type ProcessorId = u8;

/// An on-device module a filter may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    SensorFusion,
    DataProcessor,
    Macro,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Capability::SensorFusion => "sensor fusion",
            Capability::DataProcessor => "data processor",
            Capability::Macro => "macro",
        };
        f.write_str(name)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Transport failure mid-pipeline. The pass aborts; programs sealed
    /// earlier remain valid, the in-flight program is discarded.
    #[error("device communication failed: {0}")]
    DeviceCommunication(String),
    /// A required on-device module is absent. Raised before any
    /// recording begins, nothing is partially committed.
    #[error("device lacks required module: {0}")]
    UnsupportedCapability(Capability),
    /// An unclosed or overlapping recording scope requested by the
    /// generation logic itself. A programming defect, never recovered.
    #[error("recording protocol violation: {0}")]
    ProtocolViolation(String),
    /// A captured byte log could not be parsed back into discrete
    /// commands. The offending program and command are named so the
    /// output can be held for review instead of silently dropped.
    #[error("cannot parse command {command} of program {program}: {reason}")]
    Serialization {
        program: usize,
        command: usize,
        reason: String,
    },
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    pub fn new(msg: &str) -> Self {
        Error::Anyhow(anyhow::anyhow!(msg.to_string()))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
