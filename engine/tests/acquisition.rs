mod common;

use common::{fast_options, harness, harness_mapped, harness_with};
use hogout_engine::exclusive::lock::current_pid;
use hogout_engine::hw::sim::{Fault, SimDevice, SimHardware, SimStream, default_device};
use hogout_engine::hw::{DeviceId, NotificationSource, StreamId};
use hogout_engine::exclusive::render::RenderStatus;
use hogout_engine::format::{FLAG_IS_ALIGNED_HIGH, FLAG_IS_PACKED};
use hogout_engine::{
    AudioDriver, ChannelMapper, Error, FormatFamily, OutputParams, PhysicalFormat, SampleFormat,
    Stage,
};
use std::sync::Arc;

const DEVICE: DeviceId = DeviceId(1);
const OUTPUT: StreamId = StreamId(11);

fn stereo_48k() -> OutputParams {
    OutputParams::new(SampleFormat::S16, 48_000, 2)
}

fn failed_stage(err: &Error) -> Stage {
    err.stage().expect("acquisition error carries its stage")
}

fn inner(err: &Error) -> &Error {
    match err {
        Error::Acquire { source, .. } => source,
        other => other,
    }
}

#[test]
fn acquires_device_and_negotiates_format() {
    let mut h = harness();
    let mut params = stereo_48k();
    h.driver.init(&mut params).unwrap();

    assert_eq!(h.driver.stage(), Stage::Running);
    assert_eq!(h.driver.device(), Some(DEVICE));
    assert_eq!(h.driver.stream(), Some((OUTPUT, 1)));
    assert!(h.driver.holds_hog_mode());
    assert_eq!(h.hw.hog_owner(DEVICE), Some(current_pid()));
    assert_eq!(h.hw.mixing(DEVICE), Some(false));

    // 48k wins on rate, then 24 bits over 16.
    assert_eq!(params.format, SampleFormat::S24);
    assert_eq!(params.sample_rate, 48_000);
    assert_eq!(params.channels, 2);
    let configured = h.driver.configured_format().unwrap();
    assert_eq!(configured.bits_per_channel, 24);
    assert_eq!(h.hw.current_physical_format(OUTPUT), Some(configured));
    assert_eq!(
        h.driver.original_format().unwrap().sample_rate,
        44_100.0
    );

    // (32 + 512 + 24) frames at 48kHz.
    assert_eq!(h.driver.hw_latency_us(), Some(11_833));
    assert_eq!(h.hw.listener_count(), 2);
    assert_eq!(h.hw.io_proc_count(), 1);
    assert_eq!(h.hw.running_io_procs(), 0);
    assert!(h.driver.is_paused());
}

#[test]
fn failed_init_leaves_params_untouched() {
    let mut h = harness();
    h.hw.inject(Fault::CreateIoProc);
    let mut params = stereo_48k();
    assert!(h.driver.init(&mut params).is_err());
    assert_eq!(params, stereo_48k());
}

#[test]
fn planar_request_is_packed_before_negotiation() {
    let mut h = harness();
    let mut params = OutputParams::new(SampleFormat::S16P, 44_100, 2);
    h.driver.init(&mut params).unwrap();
    assert_eq!(params.format, SampleFormat::S16);
    assert_eq!(params.sample_rate, 44_100);
    // Already running the best format, no switch needed.
    assert!(
        !h.hw
            .events()
            .iter()
            .any(|e| matches!(e, hogout_engine::hw::sim::SimEvent::PhysicalFormatSet(..)))
    );
}

#[test]
fn rollback_restores_device_at_every_failing_stage() {
    let cases = [
        (Fault::ResolveDevice, Stage::Selecting),
        (Fault::ListStreams, Stage::StreamSelecting),
        (Fault::AvailableFormats, Stage::Negotiating),
        (Fault::ReadPhysicalFormat, Stage::Switching),
        (Fault::SetPhysicalFormat, Stage::Switching),
        (Fault::ReadVirtualFormat, Stage::ChannelMapping),
        (
            Fault::AddListener(NotificationSource::DeviceHasChanged(DEVICE)),
            Stage::WatcherArming,
        ),
        (
            Fault::AddListener(NotificationSource::DeviceList),
            Stage::WatcherArming,
        ),
        (Fault::CreateIoProc, Stage::CallbackRegistering),
    ];

    for (fault, stage) in cases {
        let mut h = harness();
        let before = h.hw.snapshot(DEVICE).unwrap();
        h.hw.inject(fault);

        let err = h.driver.init(&mut stereo_48k()).unwrap_err();
        assert_eq!(failed_stage(&err), stage, "{fault:?}");
        assert_eq!(h.driver.stage(), Stage::Failed, "{fault:?}");

        h.hw.clear_fault(fault);
        assert_eq!(h.hw.snapshot(DEVICE).unwrap(), before, "{fault:?}");
        assert!(!h.driver.holds_hog_mode(), "{fault:?}");
    }
}

#[test]
fn rollback_undoes_the_format_switch() {
    let mut h = harness();
    let original = h.hw.current_physical_format(OUTPUT).unwrap();
    h.hw.inject(Fault::CreateIoProc);

    h.driver.init(&mut stereo_48k()).unwrap_err();

    let sets: Vec<PhysicalFormat> = h
        .hw
        .events()
        .into_iter()
        .filter_map(|e| match e {
            hogout_engine::hw::sim::SimEvent::PhysicalFormatSet(_, f) => Some(f),
            _ => None,
        })
        .collect();
    assert_eq!(sets.len(), 2);
    assert_eq!(sets[1], original);
    assert_eq!(h.hw.current_physical_format(OUTPUT), Some(original));
}

#[test]
fn format_switch_times_out_when_never_confirmed() {
    let mut h = harness();
    let before = h.hw.snapshot(DEVICE).unwrap();
    h.hw.set_confirm_switches(false);

    let err = h.driver.init(&mut stereo_48k()).unwrap_err();
    assert_eq!(failed_stage(&err), Stage::Switching);
    assert!(matches!(inner(&err), Error::FormatSwitchTimeout(_)));
    assert_eq!(h.hw.snapshot(DEVICE).unwrap(), before);
}

#[test]
fn slow_format_switch_is_awaited() {
    let mut h = harness();
    h.hw.set_switch_latency_reads(3);
    let mut params = stereo_48k();
    h.driver.init(&mut params).unwrap();
    assert_eq!(params.format, SampleFormat::S24);
}

#[test]
fn foreign_hog_owner_is_only_a_warning() {
    let foreign = current_pid().wrapping_add(1000);
    let mut h = harness();
    h.hw.set_foreign_hog_owner(DEVICE, Some(foreign));

    h.driver.init(&mut stereo_48k()).unwrap();
    assert!(!h.driver.holds_hog_mode());

    h.driver.uninit();
    assert_eq!(h.hw.hog_owner(DEVICE), Some(foreign));
}

#[test]
fn hog_mode_write_failure_is_only_a_warning() {
    let mut h = harness();
    h.hw.inject(Fault::SetHogMode);
    h.driver.init(&mut stereo_48k()).unwrap();
    assert!(!h.driver.holds_hog_mode());
    assert_eq!(h.driver.stage(), Stage::Running);
}

#[test]
fn exclusive_can_be_turned_off() {
    let options = hogout_engine::hw::options::DriverOptions {
        exclusive: false,
        ..fast_options()
    };
    let mut h = harness_with(SimHardware::with_default_device(), options);
    h.driver.init(&mut stereo_48k()).unwrap();
    assert_eq!(h.hw.hog_owner(DEVICE), None);
}

#[test]
fn mixing_left_alone_when_unsupported_or_already_off() {
    for mixing in [None, Some(false)] {
        let hw = SimHardware::new();
        hw.add_device(default_device().with_mixing(mixing));
        let mut h = harness_with(hw, fast_options());

        h.driver.init(&mut stereo_48k()).unwrap();
        assert!(!h.driver.mixing_state().unwrap().changed());
        h.driver.uninit();
        assert_eq!(h.hw.mixing(DEVICE), mixing);
    }
}

#[test]
fn spdif_uses_the_stream_offering_compressed_formats() {
    let mut h = harness();
    let mut params = OutputParams::new(SampleFormat::Spdif, 48_000, 2);
    h.driver.init(&mut params).unwrap();

    assert_eq!(h.driver.stream(), Some((OUTPUT, 1)));
    assert_eq!(params.format, SampleFormat::Spdif);
    let configured = h.driver.configured_format().unwrap();
    assert_eq!(configured.family(), Some(FormatFamily::Compressed));
}

#[test]
fn spdif_without_compressed_stream_fails() {
    let pcm = PhysicalFormat::for_request(SampleFormat::S16, 48_000, 2);
    let hw = SimHardware::new();
    hw.add_device(SimDevice::new(1, "PCM Only").with_stream(SimStream::output(11, vec![pcm])));
    let mut h = harness_with(hw, fast_options());

    let err = h
        .driver
        .init(&mut OutputParams::new(SampleFormat::Spdif, 48_000, 2))
        .unwrap_err();
    assert_eq!(failed_stage(&err), Stage::StreamSelecting);
    assert!(matches!(inner(&err), Error::NoUsableStream));
    assert_eq!(h.hw.hog_owner(DEVICE), None);
    assert_eq!(h.hw.mixing(DEVICE), Some(true));
}

/// 24-bit samples in the high bytes of 4-byte containers.
fn padded_s24(rate: u32) -> PhysicalFormat {
    let mut format = PhysicalFormat::for_request(SampleFormat::S24, rate, 2);
    format.format_flags = (format.format_flags & !FLAG_IS_PACKED) | FLAG_IS_ALIGNED_HIGH;
    format.bytes_per_frame = 8;
    format.bytes_per_packet = 8;
    format
}

#[test]
fn padded_24_bit_candidate_is_passed_over() {
    let s16 = PhysicalFormat::for_request(SampleFormat::S16, 48_000, 2);
    let hw = SimHardware::new();
    hw.add_device(
        SimDevice::new(1, "Padded").with_stream(SimStream::output(11, vec![s16, padded_s24(48_000)])),
    );
    let mut h = harness_with(hw, fast_options());

    let mut params = stereo_48k();
    h.driver.init(&mut params).unwrap();
    assert_eq!(params.format, SampleFormat::S16);
    assert_eq!(h.driver.configured_format(), Some(s16));

    h.driver.resume();
    let stride = h.driver.configured_format().unwrap().bytes_per_frame as usize;
    assert_eq!(stride, params.frame_stride());
    assert_eq!(h.hw.run_cycle(stride * 512, 0), vec![RenderStatus::Ok]);
    assert_eq!(h.source.pulls()[0].frames, 512);
}

#[test]
fn padded_virtual_format_is_fatal() {
    let s16 = PhysicalFormat::for_request(SampleFormat::S16, 48_000, 2);
    let hw = SimHardware::new();
    hw.add_device(SimDevice::new(1, "Padded").with_stream(SimStream::output(11, vec![s16])));
    hw.set_live_format(OUTPUT, Some(padded_s24(48_000)));
    let mut h = harness_with(hw, fast_options());
    let before = h.hw.snapshot(DEVICE).unwrap();

    let err = h.driver.init(&mut stereo_48k()).unwrap_err();
    assert_eq!(failed_stage(&err), Stage::ChannelMapping);
    assert!(matches!(inner(&err), Error::UnsupportedHardwareFormat(_)));
    assert_eq!(h.hw.snapshot(DEVICE).unwrap(), before);
}

#[test]
fn only_padded_candidates_leave_nothing_to_negotiate() {
    let hw = SimHardware::new();
    hw.add_device(
        SimDevice::new(1, "Padded").with_stream(SimStream::output(11, vec![padded_s24(48_000)])),
    );
    let mut h = harness_with(hw, fast_options());

    let err = h.driver.init(&mut stereo_48k()).unwrap_err();
    assert_eq!(failed_stage(&err), Stage::Negotiating);
    assert!(matches!(inner(&err), Error::NoMatchingFormat(_)));
    assert_eq!(h.hw.hog_owner(DEVICE), None);
}

#[test]
fn unknown_device_name_fails_selection() {
    let mut h = harness();
    let err = h
        .driver
        .init(&mut stereo_48k().with_device("Nope"))
        .unwrap_err();
    assert_eq!(failed_stage(&err), Stage::Selecting);
    assert!(matches!(inner(&err), Error::DeviceNotFound(name) if name == "Nope"));
}

#[test]
fn device_found_by_uid() {
    let mut h = harness();
    h.driver.init(&mut stereo_48k().with_device("sim-1")).unwrap();
    assert_eq!(h.driver.device(), Some(DEVICE));
}

/// Leaves the host layout alone, so any hardware mismatch is left standing.
struct KeepLayout;

impl ChannelMapper for KeepLayout {
    fn init_channel_map(
        &self,
        _device: DeviceId,
        _hardware: &PhysicalFormat,
        _params: &mut OutputParams,
    ) -> Result<(), String> {
        Ok(())
    }
}

struct RejectLayout;

impl ChannelMapper for RejectLayout {
    fn init_channel_map(
        &self,
        _device: DeviceId,
        _hardware: &PhysicalFormat,
        _params: &mut OutputParams,
    ) -> Result<(), String> {
        Err("no layout for this device".to_string())
    }
}

#[test]
fn unreconciled_channel_count_is_fatal() {
    let mut h = harness_mapped(
        SimHardware::with_default_device(),
        fast_options(),
        Arc::new(KeepLayout),
    );
    let before = h.hw.snapshot(DEVICE).unwrap();
    let err = h
        .driver
        .init(&mut OutputParams::new(SampleFormat::S16, 48_000, 6))
        .unwrap_err();
    assert_eq!(failed_stage(&err), Stage::ChannelMapping);
    assert!(matches!(
        inner(&err),
        Error::ChannelCountChanged {
            requested: 6,
            hardware: 2
        }
    ));
    assert_eq!(h.hw.snapshot(DEVICE).unwrap(), before);
}

#[test]
fn channel_map_failure_is_fatal() {
    let mut h = harness_mapped(
        SimHardware::with_default_device(),
        fast_options(),
        Arc::new(RejectLayout),
    );
    let err = h.driver.init(&mut stereo_48k()).unwrap_err();
    assert_eq!(failed_stage(&err), Stage::ChannelMapping);
    assert!(matches!(inner(&err), Error::ChannelMap(_)));
}

#[test]
fn latency_read_failures_count_as_zero() {
    let mut h = harness();
    h.hw.inject(Fault::Latency(hogout_engine::hw::LatencyProperty::BufferFrameSize));
    h.driver.init(&mut stereo_48k()).unwrap();
    // (32 + 24) frames at 48kHz.
    assert_eq!(h.driver.hw_latency_us(), Some(1_166));
}
