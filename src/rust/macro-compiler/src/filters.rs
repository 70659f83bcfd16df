// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Builds the fixed set of on-device signal-processing handles shared
//! by all generated programs.
//!
//! Creation order is part of the binary contract: the device assigns
//! data-processor ids in creation order, and shipped firmware
//! hard-codes the quaternion averager's id. Do not reorder, and do not
//! remove the placeholder filters.

use crate::pass::GenerationPass;
use device_api::device::{Device, FilterKind, PassthroughMode, SensorFusionConfig, SignalKind};
use device_api::{ProcessorId, Result, SignalHandle};

/// Timer that powers the device down after sitting idle in the wait
/// state.
pub const IDLE_TIMEOUT_MS: u32 = 10 * 60 * 1000;

/// How long the button must be held before a hold is acted on.
pub const BUTTON_HOLD_MS: u32 = 600;

/// Averaging window of the quaternion filter.
pub const QUATERNION_AVERAGE_DEPTH: u8 = 2;

/// Data-processor id the quaternion averager must land on. Firmware
/// 1.4.97 allocates processor ids differently, so the target id is
/// special-cased on the reported revision string.
pub fn quaternion_processor_id(firmware_revision: &str) -> ProcessorId {
    if firmware_revision == "1.4.97" { 18 } else { 26 }
}

/// Named handles of every filter and derived signal the state programs
/// use. Built exactly once per pass, before any recording.
#[derive(Debug, Clone)]
pub struct FilterGraph {
    pub idle_timeout_timer: SignalHandle,
    pub button_hold_timer: SignalHandle,
    pub quaternion_average: SignalHandle,
    pub button_pressed: SignalHandle,
    pub button_released: SignalHandle,
    pub power_present: SignalHandle,
    pub power_absent: SignalHandle,
    pub charging: SignalHandle,
    pub not_charging: SignalHandle,
    pub charge_status_read: SignalHandle,
    pub disconnect: SignalHandle,
}

/// Allocate the full filter set in its fixed, revision-independent
/// order and write the sensor-fusion configuration.
///
/// Fails with `UnsupportedCapability` before anything is recorded when
/// the board lacks the sensor-fusion module.
pub async fn build_filter_graph<D: Device>(pass: &mut GenerationPass<D>) -> Result<FilterGraph> {
    let firmware_revision = pass.firmware_revision();
    let device = pass.device_mut();

    let button = device.signal(SignalKind::Button)?;
    let power_status = device.signal(SignalKind::PowerStatus)?;
    let charge_status = device.signal(SignalKind::ChargeStatus)?;
    // Probe for sensor fusion up front so an unsupported board aborts
    // the pass before any program memory is touched.
    let quaternion = device.signal(SignalKind::QuaternionFusion)?;

    let idle_timeout_timer = device
        .create_filter(FilterKind::Timer {
            period_ms: IDLE_TIMEOUT_MS,
            repetitions: 1,
            immediate_fire: false,
        })
        .await?;
    let button_hold_timer = device
        .create_filter(FilterKind::Timer {
            period_ms: BUTTON_HOLD_MS,
            repetitions: 1,
            immediate_fire: false,
        })
        .await?;

    // Two placeholder filters whose only purpose is to consume
    // data-processor id slots so the quaternion averager lands on the
    // id shipped firmware expects. The count is load-bearing.
    for _ in 0..2 {
        device
            .create_filter(FilterKind::Passthrough {
                parent: button,
                mode: PassthroughMode::Conditional,
                count: 0,
            })
            .await?;
    }

    let quaternion_average = device
        .create_filter(FilterKind::QuaternionAverage {
            parent: quaternion,
            depth: QUATERNION_AVERAGE_DEPTH,
            processor_id: quaternion_processor_id(&firmware_revision),
        })
        .await?;

    device
        .configure_sensor_fusion(&SensorFusionConfig::default())
        .await?;

    let button_pressed = device
        .create_filter(FilterKind::ValueMatch { parent: button, value: 1 })
        .await?;
    let button_released = device
        .create_filter(FilterKind::ValueMatch { parent: button, value: 0 })
        .await?;
    let power_present = device
        .create_filter(FilterKind::ValueMatch { parent: power_status, value: 1 })
        .await?;
    let power_absent = device
        .create_filter(FilterKind::ValueMatch { parent: power_status, value: 0 })
        .await?;
    let charging = device
        .create_filter(FilterKind::ValueMatch { parent: charge_status, value: 1 })
        .await?;
    let not_charging = device
        .create_filter(FilterKind::ValueMatch { parent: charge_status, value: 0 })
        .await?;

    Ok(FilterGraph {
        idle_timeout_timer,
        button_hold_timer,
        quaternion_average,
        button_pressed,
        button_released,
        power_present,
        power_absent,
        charging,
        not_charging,
        charge_status_read: device.signal(SignalKind::ChargeStatusRead)?,
        disconnect: device.signal(SignalKind::DisconnectEvent)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quaternion_id_is_special_cased_per_revision() {
        assert_eq!(quaternion_processor_id("1.4.97"), 18);
        assert_eq!(quaternion_processor_id("1.4.4"), 26);
        assert_eq!(quaternion_processor_id("1.5.0"), 26);
        assert_eq!(quaternion_processor_id("2.0.0"), 26);
    }
}
