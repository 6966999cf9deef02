#![cfg(target_os = "macos")]

//! Typed wrappers around `AudioObjectGetPropertyData` and friends.

use crate::error::{Error, OsStatus, Result};
use crate::format::PhysicalFormat;
use coreaudio_sys::{
    AudioObjectGetPropertyData, AudioObjectGetPropertyDataSize, AudioObjectHasProperty,
    AudioObjectID, AudioObjectIsPropertySettable, AudioObjectPropertyAddress,
    AudioObjectSetPropertyData, AudioStreamBasicDescription, Boolean, CFRelease,
    CFStringGetCString, CFStringRef, OSStatus, UInt32, kAudioHardwareNoError,
    kAudioObjectPropertyElementMain, kAudioObjectPropertyScopeGlobal,
    kAudioObjectPropertyScopeOutput,
};
use std::mem::{self, MaybeUninit};
use std::os::raw::c_void;
use std::ptr;

pub(super) fn global(selector: u32) -> AudioObjectPropertyAddress {
    AudioObjectPropertyAddress {
        mSelector: selector,
        mScope: kAudioObjectPropertyScopeGlobal,
        mElement: kAudioObjectPropertyElementMain,
    }
}

pub(super) fn output(selector: u32) -> AudioObjectPropertyAddress {
    AudioObjectPropertyAddress {
        mSelector: selector,
        mScope: kAudioObjectPropertyScopeOutput,
        mElement: kAudioObjectPropertyElementMain,
    }
}

pub(super) fn check(operation: &'static str, status: OSStatus) -> Result<()> {
    if status == kAudioHardwareNoError as OSStatus {
        Ok(())
    } else {
        Err(Error::hardware(operation, OsStatus(status)))
    }
}

/// Read a fixed-size property.
pub(super) fn get<T: Copy>(
    object: AudioObjectID,
    address: &AudioObjectPropertyAddress,
    operation: &'static str,
) -> Result<T> {
    let mut value = MaybeUninit::<T>::zeroed();
    let mut size = mem::size_of::<T>() as UInt32;
    let status: OSStatus = unsafe {
        AudioObjectGetPropertyData(
            object,
            address,
            0,
            ptr::null(),
            &mut size,
            value.as_mut_ptr() as *mut c_void,
        )
    };
    check(operation, status)?;
    if size as usize != mem::size_of::<T>() {
        return Err(Error::hardware(operation, OsStatus::BAD_PROPERTY_SIZE));
    }
    Ok(unsafe { value.assume_init() })
}

/// Read a property holding an array of `T`.
pub(super) fn get_array<T: Copy>(
    object: AudioObjectID,
    address: &AudioObjectPropertyAddress,
    operation: &'static str,
) -> Result<Vec<T>> {
    let mut size: UInt32 = 0;
    let status: OSStatus =
        unsafe { AudioObjectGetPropertyDataSize(object, address, 0, ptr::null(), &mut size) };
    check(operation, status)?;

    let count = size as usize / mem::size_of::<T>();
    let mut items: Vec<T> = Vec::with_capacity(count);
    if count == 0 {
        return Ok(items);
    }
    let status: OSStatus = unsafe {
        AudioObjectGetPropertyData(
            object,
            address,
            0,
            ptr::null(),
            &mut size,
            items.as_mut_ptr() as *mut c_void,
        )
    };
    check(operation, status)?;

    let actual = (size as usize / mem::size_of::<T>()).min(count);
    unsafe { items.set_len(actual) };
    Ok(items)
}

pub(super) fn set<T: Copy>(
    object: AudioObjectID,
    address: &AudioObjectPropertyAddress,
    value: &T,
    operation: &'static str,
) -> Result<()> {
    let status: OSStatus = unsafe {
        AudioObjectSetPropertyData(
            object,
            address,
            0,
            ptr::null(),
            mem::size_of::<T>() as UInt32,
            value as *const T as *const c_void,
        )
    };
    check(operation, status)
}

pub(super) fn has(object: AudioObjectID, address: &AudioObjectPropertyAddress) -> bool {
    unsafe { AudioObjectHasProperty(object, address) != 0 }
}

pub(super) fn is_settable(
    object: AudioObjectID,
    address: &AudioObjectPropertyAddress,
    operation: &'static str,
) -> Result<bool> {
    let mut settable: Boolean = 0;
    let status: OSStatus = unsafe { AudioObjectIsPropertySettable(object, address, &mut settable) };
    check(operation, status)?;
    Ok(settable != 0)
}

/// Read a `CFString` property and copy it out as UTF-8.
pub(super) fn get_string(
    object: AudioObjectID,
    address: &AudioObjectPropertyAddress,
    operation: &'static str,
) -> Result<String> {
    let cf: CFStringRef = get(object, address, operation)?;
    if cf.is_null() {
        return Err(Error::hardware(operation, OsStatus::UNSPECIFIED));
    }

    let mut buf = [0 as std::os::raw::c_char; 256];
    let ok = unsafe { CFStringGetCString(cf, buf.as_mut_ptr(), buf.len() as _, 0x0800_0100) };
    unsafe { CFRelease(cf as *const c_void) };
    if ok == 0 {
        return Err(Error::hardware(operation, OsStatus::UNSPECIFIED));
    }

    let c_str = unsafe { std::ffi::CStr::from_ptr(buf.as_ptr()) };
    Ok(c_str.to_string_lossy().into_owned())
}

pub(super) fn to_asbd(format: &PhysicalFormat) -> AudioStreamBasicDescription {
    AudioStreamBasicDescription {
        mSampleRate: format.sample_rate,
        mFormatID: format.format_id,
        mFormatFlags: format.format_flags,
        mBytesPerPacket: format.bytes_per_packet,
        mFramesPerPacket: format.frames_per_packet,
        mBytesPerFrame: format.bytes_per_frame,
        mChannelsPerFrame: format.channels_per_frame,
        mBitsPerChannel: format.bits_per_channel,
        mReserved: 0,
    }
}

pub(super) fn from_asbd(asbd: &AudioStreamBasicDescription) -> PhysicalFormat {
    PhysicalFormat {
        sample_rate: asbd.mSampleRate,
        format_id: asbd.mFormatID,
        format_flags: asbd.mFormatFlags,
        bytes_per_packet: asbd.mBytesPerPacket,
        frames_per_packet: asbd.mFramesPerPacket,
        bytes_per_frame: asbd.mBytesPerFrame,
        channels_per_frame: asbd.mChannelsPerFrame,
        bits_per_channel: asbd.mBitsPerChannel,
    }
}
