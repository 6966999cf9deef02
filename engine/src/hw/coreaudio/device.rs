#![cfg(target_os = "macos")]

use super::props;
use crate::error::{Error, Result};
use crate::hw::{DeviceId, DeviceInfo};
use coreaudio_sys::{
    AudioBufferList, AudioDeviceID, AudioObjectGetPropertyData, AudioObjectGetPropertyDataSize,
    OSStatus, UInt32, kAudioDevicePropertyDeviceNameCFString, kAudioDevicePropertyDeviceUID,
    kAudioDevicePropertyStreamConfiguration, kAudioHardwareNoError,
    kAudioHardwarePropertyDefaultOutputDevice, kAudioHardwarePropertyDevices,
    kAudioObjectSystemObject,
};
use std::os::raw::c_void;
use std::ptr;

pub fn list_devices() -> Result<Vec<DeviceInfo>> {
    let device_ids: Vec<AudioDeviceID> = props::get_array(
        kAudioObjectSystemObject,
        &props::global(kAudioHardwarePropertyDevices),
        "get device list",
    )?;

    let mut devices = Vec::with_capacity(device_ids.len());
    for id in device_ids {
        let output_channels = output_channel_count(id);
        if output_channels == 0 {
            continue;
        }
        let name = props::get_string(
            id,
            &props::global(kAudioDevicePropertyDeviceNameCFString),
            "get device name",
        )
        .unwrap_or_else(|_| format!("Unknown ({id})"));
        let uid = props::get_string(
            id,
            &props::global(kAudioDevicePropertyDeviceUID),
            "get device UID",
        )
        .unwrap_or_default();
        devices.push(DeviceInfo {
            id: DeviceId(id),
            name,
            uid,
            output_channels,
        });
    }
    Ok(devices)
}

pub fn default_output_device() -> Result<DeviceId> {
    let id: AudioDeviceID = props::get(
        kAudioObjectSystemObject,
        &props::global(kAudioHardwarePropertyDefaultOutputDevice),
        "get default output device",
    )?;
    Ok(DeviceId(id))
}

/// Find a device by UID or display name; an empty name means the default
/// output device.
pub fn select_device(name: Option<&str>) -> Result<DeviceId> {
    let Some(name) = name.filter(|n| !n.is_empty()) else {
        return default_output_device();
    };
    list_devices()?
        .into_iter()
        .find(|d| d.uid == name || d.name == name)
        .map(|d| d.id)
        .ok_or_else(|| Error::DeviceNotFound(name.to_string()))
}

fn output_channel_count(device_id: AudioDeviceID) -> u32 {
    let address = props::output(kAudioDevicePropertyStreamConfiguration);

    let mut size: UInt32 = 0;
    let status: OSStatus =
        unsafe { AudioObjectGetPropertyDataSize(device_id, &address, 0, ptr::null(), &mut size) };
    if status != kAudioHardwareNoError as OSStatus || size == 0 {
        return 0;
    }

    // u64 backing keeps the AudioBufferList header aligned.
    let mut buf: Vec<u64> = vec![0u64; (size as usize).div_ceil(8)];
    let status: OSStatus = unsafe {
        AudioObjectGetPropertyData(
            device_id,
            &address,
            0,
            ptr::null(),
            &mut size,
            buf.as_mut_ptr() as *mut c_void,
        )
    };
    if status != kAudioHardwareNoError as OSStatus {
        return 0;
    }

    let buffer_list = buf.as_ptr() as *const AudioBufferList;
    let n_buffers = unsafe { (*buffer_list).mNumberBuffers };
    let buffers_ptr = unsafe { (*buffer_list).mBuffers.as_ptr() };

    let mut total: u32 = 0;
    for i in 0..n_buffers as usize {
        total += unsafe { (*buffers_ptr.add(i)).mNumberChannels };
    }
    total
}
