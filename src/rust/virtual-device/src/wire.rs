// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Byte layout of the command frames. Every frame starts with a module
//! id and a register id; reads set the high bit of the register.

use device_api::SignalHandle;

pub mod module {
    pub const SWITCH: u8 = 0x01;
    pub const LED: u8 = 0x02;
    pub const DATA_PROCESSOR: u8 = 0x09;
    pub const EVENT: u8 = 0x0A;
    pub const TIMER: u8 = 0x0C;
    pub const MACRO: u8 = 0x0F;
    pub const SETTINGS: u8 = 0x11;
    pub const SENSOR_FUSION: u8 = 0x19;
    pub const DEBUG: u8 = 0xFE;
}

pub mod led {
    pub const PLAY: u8 = 0x01;
    pub const STOP_CLEAR: u8 = 0x02;
    pub const PATTERN: u8 = 0x03;
}

pub mod data_processor {
    pub const CREATE: u8 = 0x02;

    pub const TYPE_PASSTHROUGH: u8 = 0x01;
    pub const TYPE_QUATERNION_AVERAGE: u8 = 0x02;
}

pub mod event {
    pub const RECORD: u8 = 0x02;
    pub const END_RECORD: u8 = 0x03;
    pub const REMOVE_ALL: u8 = 0x04;
    pub const ERASE: u8 = 0x05;
}

pub mod timer {
    pub const CREATE: u8 = 0x02;
    pub const START: u8 = 0x03;
    pub const STOP: u8 = 0x04;
}

pub mod macros {
    pub const EXECUTE: u8 = 0x02;
}

pub mod settings {
    pub const ADVERTISING: u8 = 0x01;
    pub const AD_INTERVAL: u8 = 0x02;
    pub const TX_POWER: u8 = 0x03;
    pub const SCAN_RESPONSE: u8 = 0x07;
    pub const DISCONNECT_EVENT: u8 = 0x0A;
    pub const POWER_STATUS: u8 = 0x11;
    pub const CHARGE_STATUS: u8 = 0x12;
}

pub mod switch {
    pub const STATE: u8 = 0x01;
}

pub mod sensor_fusion {
    pub const ENABLE: u8 = 0x01;
    pub const CONFIG: u8 = 0x02;
    pub const OUTPUT_ENABLE: u8 = 0x03;
    pub const QUATERNION: u8 = 0x07;
}

pub mod debug {
    pub const RESET: u8 = 0x01;
    pub const DISCONNECT: u8 = 0x06;
    pub const POWER_SAVE: u8 = 0x07;
    pub const SPOOF_NOTIFICATION: u8 = 0x0A;
}

pub const READ_FLAG: u8 = 0x80;

/// Frames reference arena nodes by their handle, little-endian.
pub fn handle_bytes(handle: SignalHandle) -> [u8; 2] {
    handle.0.to_le_bytes()
}
