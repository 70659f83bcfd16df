// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! The five state programs of the pod's autonomous lifecycle. Each
//! generator follows the same skeleton: reset the capture log, erase
//! the previous state's bindings, record the event scopes, settle and
//! seal. Programs are mutually exclusive on-device; invoking one wipes
//! the bindings of the one before it.

use crate::filters::{FilterGraph, build_filter_graph};
use crate::pass::GenerationPass;
use device_api::device::{AdvertisingParams, Device, FilterKind, LedColor, LedPattern};
use device_api::Result;

/// Fixed program slots. Cross-invocations ("state transitions") name
/// these numbers literally in recorded bodies, so they never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramId {
    Boot = 0,
    Wait = 1,
    Stream = 2,
    SleepOnButtonRelease = 3,
    PluggedIn = 4,
}

impl ProgramId {
    pub fn id(self) -> u8 {
        self as u8
    }
}

/// Scan-response payload advertised in the wait state. The trailing
/// byte identifies the firmware revision to a passively scanning host,
/// no connection required.
pub const SCAN_RESPONSE_PREFIX: [u8; 5] = [0x05, 0xFF, 0x7E, 0x06, 0x04];

pub fn scan_response_device_id(firmware_revision: &str) -> u8 {
    match firmware_revision {
        "1.5.0" => 2,
        "1.4.4" => 1,
        _ => 0,
    }
}

fn scan_response(firmware_revision: &str) -> Vec<u8> {
    let mut payload = SCAN_RESPONSE_PREFIX.to_vec();
    payload.push(scan_response_device_id(firmware_revision));
    payload
}

/// Synthetic charge-status notifications injected while plugged in, so
/// the LED updates without the physical charge signal changing.
const NOT_CHARGING_NOTIFICATION: [u8; 4] = [0x11, 0x12, 0x00, 0x00];
const CHARGING_NOTIFICATION: [u8; 4] = [0x11, 0x12, 0x00, 0x01];

async fn set_led<D: Device>(device: &mut D, pattern: LedPattern, color: LedColor) -> Result<()> {
    device.led_stop_and_clear().await?;
    device.led_write_pattern(&pattern, color).await?;
    device.led_play().await
}

/// Slow blue flash while advertising and waiting for a host.
async fn led_during_wait<D: Device>(device: &mut D) -> Result<()> {
    set_led(device, LedPattern::flash(0.5, 200, 1000, 0xFF), LedColor::Blue).await
}

/// Green flash while streaming quaternions to a connected host.
async fn led_during_stream<D: Device>(device: &mut D) -> Result<()> {
    set_led(device, LedPattern::flash(0.75, 200, 3000, 0xFF), LedColor::Green).await
}

/// Slow pulse signalling imminent power-down.
async fn led_during_power_down<D: Device>(device: &mut D) -> Result<()> {
    set_led(device, LedPattern::solid_pulse(0.8, 2000), LedColor::Blue).await
}

async fn led_during_charging<D: Device>(device: &mut D) -> Result<()> {
    set_led(device, LedPattern::flash(0.6, 200, 2500, 0xFF), LedColor::Orange).await
}

async fn led_during_charged<D: Device>(device: &mut D) -> Result<()> {
    set_led(device, LedPattern::solid_pulse(0.6, 2000), LedColor::Green).await
}

/// Transition to the plugged-in state the moment external power shows
/// up. Bound identically by boot, wait and stream.
async fn plugged_in_on_power<D: Device>(
    pass: &mut GenerationPass<D>,
    graph: &FilterGraph,
) -> Result<()> {
    pass.begin_recording(graph.power_present).await?;
    pass.device_mut().invoke_program(ProgramId::PluggedIn.id()).await?;
    pass.end_recording(graph.power_present).await
}

/// Arm the button-hold timer on press, cancel on release; a completed
/// hold invokes the sleep program.
async fn sleep_on_button_held<D: Device>(
    pass: &mut GenerationPass<D>,
    graph: &FilterGraph,
) -> Result<()> {
    pass.begin_recording(graph.button_pressed).await?;
    pass.device_mut().timer_start(graph.button_hold_timer).await?;
    pass.end_recording(graph.button_pressed).await?;

    pass.begin_recording(graph.button_released).await?;
    pass.device_mut().timer_stop(graph.button_hold_timer).await?;
    pass.end_recording(graph.button_released).await?;

    pass.begin_recording(graph.button_hold_timer).await?;
    pass.device_mut()
        .invoke_program(ProgramId::SleepOnButtonRelease.id())
        .await?;
    pass.end_recording(graph.button_hold_timer).await
}

/// Power down after the idle timeout expires, then arm the timeout.
async fn sleep_on_timeout<D: Device>(
    pass: &mut GenerationPass<D>,
    graph: &FilterGraph,
) -> Result<()> {
    pass.begin_recording(graph.idle_timeout_timer).await?;
    pass.device_mut().enable_power_save().await?;
    pass.device_mut().soft_reset().await?;
    pass.end_recording(graph.idle_timeout_timer).await?;
    pass.device_mut().timer_start(graph.idle_timeout_timer).await
}

/// Re-enter the wait state whenever the host connection drops.
async fn wait_on_disconnect<D: Device>(
    pass: &mut GenerationPass<D>,
    graph: &FilterGraph,
) -> Result<()> {
    pass.begin_recording(graph.disconnect).await?;
    pass.device_mut().invoke_program(ProgramId::Wait.id()).await?;
    pass.end_recording(graph.disconnect).await
}

/// Boot-only: a 600 ms button hold carries the device into the wait
/// state, an earlier release puts it straight back to sleep.
async fn wait_on_button_held<D: Device>(
    pass: &mut GenerationPass<D>,
    graph: &FilterGraph,
) -> Result<()> {
    pass.begin_recording(graph.button_released).await?;
    pass.device_mut().enable_power_save().await?;
    pass.device_mut().soft_reset().await?;
    pass.end_recording(graph.button_released).await?;

    pass.begin_recording(graph.button_hold_timer).await?;
    pass.device_mut().invoke_program(ProgramId::Wait.id()).await?;
    pass.end_recording(graph.button_hold_timer).await?;

    pass.device_mut().timer_start(graph.button_hold_timer).await
}

/// LED handling while on external power. The charge indication is
/// driven twice over: by the physical charge-status change signal, and
/// by synthetic notifications spoofed from an explicit readout so the
/// indicator is correct immediately on plug-in.
async fn led_while_plugged_in<D: Device>(
    pass: &mut GenerationPass<D>,
    graph: &FilterGraph,
) -> Result<()> {
    pass.begin_recording(graph.charging).await?;
    led_during_charging(pass.device_mut()).await?;
    pass.end_recording(graph.charging).await?;

    pass.begin_recording(graph.not_charging).await?;
    led_during_charged(pass.device_mut()).await?;
    pass.end_recording(graph.not_charging).await?;

    let not_charging_read = pass
        .device_mut()
        .create_filter(FilterKind::ValueMatch {
            parent: graph.charge_status_read,
            value: 0,
        })
        .await?;
    let charging_read = pass
        .device_mut()
        .create_filter(FilterKind::ValueMatch {
            parent: graph.charge_status_read,
            value: 1,
        })
        .await?;

    pass.begin_recording(not_charging_read).await?;
    pass.device_mut().spoof_notification(&NOT_CHARGING_NOTIFICATION).await?;
    pass.end_recording(not_charging_read).await?;

    pass.begin_recording(charging_read).await?;
    pass.device_mut().spoof_notification(&CHARGING_NOTIFICATION).await?;
    pass.end_recording(charging_read).await?;

    pass.device_mut().read(graph.charge_status_read).await?;
    Ok(())
}

/// Slot 0. Runs automatically at power-on: allocates the filter graph,
/// keeps the radio quiet and dispatches to plugged-in or wait.
pub async fn generate_boot<D: Device>(pass: &mut GenerationPass<D>) -> Result<FilterGraph> {
    pass.begin_program()?;
    let graph = build_filter_graph(pass).await?;
    pass.device_mut().stop_advertising().await?;
    plugged_in_on_power(pass, &graph).await?;
    wait_on_button_held(pass, &graph).await?;
    pass.seal_program("call wait state if button held through boot", true)
        .await?;
    Ok(graph)
}

/// Slot 1. Advertise and wait for a host, with every exit wired up.
pub async fn generate_wait<D: Device>(
    pass: &mut GenerationPass<D>,
    graph: &FilterGraph,
) -> Result<()> {
    pass.begin_program()?;
    pass.device_mut().erase_all_bindings().await?;
    led_during_wait(pass.device_mut()).await?;
    let params = AdvertisingParams {
        tx_power: 4,
        interval_ms: 20,
        timeout_s: 0,
        scan_response: scan_response(&pass.firmware_revision()),
    };
    pass.device_mut().set_advertising(&params).await?;
    plugged_in_on_power(pass, graph).await?;
    sleep_on_button_held(pass, graph).await?;
    sleep_on_timeout(pass, graph).await?;
    wait_on_disconnect(pass, graph).await?;
    pass.seal_program("go into wait state", false).await
}

/// Slot 2. Host connected: stream sensor-fusion quaternions.
pub async fn generate_stream<D: Device>(
    pass: &mut GenerationPass<D>,
    graph: &FilterGraph,
) -> Result<()> {
    pass.begin_program()?;
    pass.device_mut().erase_all_bindings().await?;
    led_during_stream(pass.device_mut()).await?;
    pass.device_mut().sensor_fusion_enable_quaternion().await?;
    pass.device_mut().sensor_fusion_start().await?;
    plugged_in_on_power(pass, graph).await?;
    wait_on_disconnect(pass, graph).await?;
    sleep_on_button_held(pass, graph).await?;
    pass.seal_program("go into stream state", false).await
}

/// Slot 3. Announce power-down and sleep the moment the button is let
/// go. Deliberately binds nothing else.
pub async fn generate_sleep_on_button_release<D: Device>(
    pass: &mut GenerationPass<D>,
    graph: &FilterGraph,
) -> Result<()> {
    pass.begin_program()?;
    pass.device_mut().erase_all_bindings().await?;
    led_during_power_down(pass.device_mut()).await?;
    pass.begin_recording(graph.button_released).await?;
    pass.device_mut().enable_power_save().await?;
    pass.device_mut().soft_reset().await?;
    pass.end_recording(graph.button_released).await?;
    pass.seal_program("go into sleep state", false).await
}

/// Slot 4. On external power: radio off, charge indication on, reset
/// on unplug.
pub async fn generate_plugged_in<D: Device>(
    pass: &mut GenerationPass<D>,
    graph: &FilterGraph,
) -> Result<()> {
    pass.begin_program()?;
    pass.device_mut().erase_all_bindings().await?;
    pass.device_mut().stop_advertising().await?;
    pass.device_mut().disconnect().await?;
    led_while_plugged_in(pass, graph).await?;

    pass.begin_recording(graph.power_absent).await?;
    pass.device_mut().soft_reset().await?;
    pass.end_recording(graph.power_absent).await?;

    // The charging and not-charging indications must not oscillate:
    // once the charger reports done, drop the charging binding. This
    // has to be the last binding recorded in the program.
    pass.begin_recording(graph.not_charging).await?;
    pass.device_mut().erase_bindings(graph.charging).await?;
    pass.end_recording(graph.not_charging).await?;

    pass.seal_program("go to plugged in state", false).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_response_identifies_firmware_revision() {
        assert_eq!(scan_response_device_id("1.5.0"), 2);
        assert_eq!(scan_response_device_id("1.4.4"), 1);
        assert_eq!(scan_response_device_id("1.4.97"), 0);
        assert_eq!(scan_response_device_id("0.3.1"), 0);
    }

    #[test]
    fn scan_response_is_prefix_plus_device_id() {
        let payload = scan_response("1.5.0");
        assert_eq!(payload.len(), 6);
        assert_eq!(payload[..5], SCAN_RESPONSE_PREFIX);
        assert_eq!(payload[5], 2);
    }

    #[test]
    fn program_slots_are_fixed() {
        assert_eq!(ProgramId::Boot.id(), 0);
        assert_eq!(ProgramId::Wait.id(), 1);
        assert_eq!(ProgramId::Stream.id(), 2);
        assert_eq!(ProgramId::SleepOnButtonRelease.id(), 3);
        assert_eq!(ProgramId::PluggedIn.id(), 4);
    }
}
