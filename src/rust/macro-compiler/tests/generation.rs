// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! End-to-end generation runs against the simulated pod.

use macro_compiler::pass::GenerationPass;
use macro_compiler::programs::{
    self, SCAN_RESPONSE_PREFIX, generate_boot, generate_plugged_in, generate_sleep_on_button_release,
    generate_stream, generate_wait,
};
use macro_compiler::{Error, GenerationOutput};
use virtual_device::{VirtualDevice, wire};

async fn run_pass(firmware: &str, hardware: &str) -> GenerationOutput {
    let mut pass = GenerationPass::new(VirtualDevice::spoof(firmware, hardware));
    pass.run().await.unwrap()
}

#[tokio::test]
async fn full_pass_produces_five_aligned_programs() {
    let output = run_pass("1.5.0", "0.4").await;

    assert_eq!(output.programs.len(), 5);
    for program in &output.programs {
        assert!(!program.commands().is_empty());
        assert_eq!(program.byte_len() % 4, 0);
    }

    let descriptors = output.table.descriptors();
    assert_eq!(descriptors.len(), 5);
    // boot flag only on slot 0
    assert_eq!(descriptors[0].is_boot, 1);
    for descriptor in &descriptors[1..] {
        assert_eq!(descriptor.is_boot, 0);
    }
    // offsets are cumulative over the padded program lengths
    let mut expected_offset = 0u32;
    for (descriptor, program) in descriptors.iter().zip(&output.programs) {
        assert_eq!(descriptor.byte_offset, expected_offset);
        assert_eq!(usize::from(descriptor.command_count), program.commands().len());
        expected_offset += program.byte_len() as u32;
    }
    // the byte pool ends with the sentinel row
    assert_eq!(
        output.table.all_commands().len(),
        expected_offset as usize + 4
    );
    assert!(output.table.all_commands().ends_with(&[0xFF; 4]));
}

#[tokio::test]
async fn passes_are_deterministic_per_revision() {
    let first = run_pass("1.4.4", "0.4").await;
    let second = run_pass("1.4.4", "0.4").await;
    assert_eq!(first.table.all_commands(), second.table.all_commands());
    assert_eq!(first.table.descriptor_bytes(), second.table.descriptor_bytes());
    assert_eq!(first.nested, second.nested);
    assert_eq!(first.snapshot, second.snapshot);
}

#[tokio::test]
async fn table_parses_back_to_the_nested_form() {
    let output = run_pass("1.5.0", "0.4").await;
    assert_eq!(output.table.parse().unwrap(), output.nested);
}

#[tokio::test]
async fn wait_program_advertises_the_revision_device_id() {
    for (firmware, device_id) in [("1.5.0", 2u8), ("1.4.4", 1), ("1.4.97", 0)] {
        let output = run_pass(firmware, "0.4").await;
        let wait = &output.programs[programs::ProgramId::Wait.id() as usize];
        let mut expected = vec![wire::module::SETTINGS, wire::settings::SCAN_RESPONSE];
        expected.extend_from_slice(&SCAN_RESPONSE_PREFIX);
        expected.push(device_id);
        assert!(
            wait.commands().iter().any(|c| c.bytes() == expected),
            "no scan response frame for firmware {firmware}"
        );
    }
}

#[tokio::test]
async fn quaternion_averager_lands_on_the_expected_id() {
    let output = run_pass("1.5.0", "0.4").await;
    assert_eq!(output.quaternion_processor_id, 26);
    assert!(output.firmware_constants().contains("quaternion_average_id = 26"));

    let legacy = run_pass("1.4.97", "0.3").await;
    assert_eq!(legacy.quaternion_processor_id, 18);
}

#[tokio::test]
async fn sleep_program_binds_only_the_button_release() {
    let mut pass = GenerationPass::new(VirtualDevice::spoof("1.5.0", "0.4"));
    let graph = generate_boot(&mut pass).await.unwrap();
    generate_wait(&mut pass, &graph).await.unwrap();
    generate_stream(&mut pass, &graph).await.unwrap();
    generate_sleep_on_button_release(&mut pass, &graph).await.unwrap();

    let bindings = pass.device().bindings();
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].trigger, graph.button_released);
    assert_eq!(
        bindings[0].commands,
        vec![
            vec![wire::module::DEBUG, wire::debug::POWER_SAVE],
            vec![wire::module::DEBUG, wire::debug::RESET],
        ]
    );
}

#[tokio::test]
async fn plugged_in_erases_the_charging_binding_last() {
    let mut pass = GenerationPass::new(VirtualDevice::spoof("1.5.0", "0.4"));
    let graph = generate_boot(&mut pass).await.unwrap();
    generate_wait(&mut pass, &graph).await.unwrap();
    generate_stream(&mut pass, &graph).await.unwrap();
    generate_sleep_on_button_release(&mut pass, &graph).await.unwrap();
    generate_plugged_in(&mut pass, &graph).await.unwrap();

    let bindings = pass.device().bindings();
    // the charging LED binding is present, and the very last binding
    // drops it again once charging completes
    assert!(bindings.iter().any(|b| b.trigger == graph.charging));
    let last = bindings.last().unwrap();
    assert_eq!(last.trigger, graph.not_charging);
    let mut erase = vec![wire::module::EVENT, wire::event::ERASE];
    erase.extend_from_slice(&wire::handle_bytes(graph.charging));
    assert_eq!(last.commands, vec![erase]);
}

#[tokio::test]
async fn link_loss_keeps_the_programs_sealed_so_far() {
    // learn how many frames the boot program takes on a healthy link
    let mut healthy = GenerationPass::new(VirtualDevice::spoof("1.5.0", "0.4"));
    generate_boot(&mut healthy).await.unwrap();
    let boot_frames = healthy.device().frames_sent();

    let mut device = VirtualDevice::spoof("1.5.0", "0.4");
    device.fail_after_frames(boot_frames + 3);
    let mut pass = GenerationPass::new(device);
    let err = pass.run().await.unwrap_err();
    assert!(matches!(err, Error::DeviceCommunication(_)));
    // boot sealed cleanly, the in-flight wait capture is discarded
    assert_eq!(pass.sealed_programs().len(), 1);
    assert!(pass.sealed_programs()[0].is_boot());
}

#[tokio::test]
async fn missing_sensor_fusion_aborts_before_any_recording() {
    let device = VirtualDevice::spoof("1.4.97", "0.3").without_sensor_fusion();
    let mut pass = GenerationPass::new(device);
    let err = pass.run().await.unwrap_err();
    assert!(matches!(err, Error::UnsupportedCapability(_)));
    assert!(pass.sealed_programs().is_empty());
    assert_eq!(pass.device().frames_sent(), 0);
}
