#![cfg(target_os = "macos")]

use super::props;
use crate::error::{Error, OsStatus, Result};
use crate::hw::{NotificationSource, PropertyListener};
use coreaudio_sys::{
    AudioObjectAddPropertyListener, AudioObjectID, AudioObjectPropertyAddress,
    AudioObjectRemovePropertyListener, OSStatus, UInt32, kAudioDevicePropertyDeviceHasChanged,
    kAudioHardwarePropertyDevices, kAudioObjectSystemObject,
};
use std::os::raw::c_void;
use std::sync::{Arc, Mutex, PoisonError};

struct ListenerClient {
    source: NotificationSource,
    listener: Arc<dyn PropertyListener>,
}

unsafe extern "C" fn property_listener(
    _object: AudioObjectID,
    _count: UInt32,
    _addresses: *const AudioObjectPropertyAddress,
    client_data: *mut c_void,
) -> OSStatus {
    let client = unsafe { &*(client_data as *const ListenerClient) };
    client.listener.property_changed(client.source);
    0
}

fn target(source: NotificationSource) -> (AudioObjectID, AudioObjectPropertyAddress) {
    match source {
        NotificationSource::DeviceHasChanged(device) => (
            device.0,
            props::global(kAudioDevicePropertyDeviceHasChanged),
        ),
        NotificationSource::DeviceList => (
            kAudioObjectSystemObject,
            props::global(kAudioHardwarePropertyDevices),
        ),
    }
}

struct Registration {
    object: AudioObjectID,
    address: AudioObjectPropertyAddress,
    client: *mut ListenerClient,
}

// The client pointer is only dereferenced by the HAL callback, and freed here
// once the HAL has let go of it.
unsafe impl Send for Registration {}

/// Keeps each registration's client data alive until it is removed.
#[derive(Default)]
pub struct ListenerRegistry {
    entries: Mutex<Vec<Registration>>,
}

impl ListenerRegistry {
    pub fn add(&self, source: NotificationSource, listener: Arc<dyn PropertyListener>) -> Result<()> {
        let (object, address) = target(source);
        let client = Box::into_raw(Box::new(ListenerClient { source, listener }));
        let status: OSStatus = unsafe {
            AudioObjectAddPropertyListener(
                object,
                &address,
                Some(property_listener),
                client as *mut c_void,
            )
        };
        if let Err(e) = props::check("add property listener", status) {
            drop(unsafe { Box::from_raw(client) });
            return Err(e);
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Registration {
                object,
                address,
                client,
            });
        Ok(())
    }

    pub fn remove(
        &self,
        source: NotificationSource,
        listener: &Arc<dyn PropertyListener>,
    ) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let pos = entries
            .iter()
            .position(|r| {
                let client = unsafe { &*r.client };
                client.source == source && Arc::ptr_eq(&client.listener, listener)
            })
            .ok_or_else(|| {
                Error::hardware("remove property listener", OsStatus::ILLEGAL_OPERATION)
            })?;

        let registration = &entries[pos];
        let status: OSStatus = unsafe {
            AudioObjectRemovePropertyListener(
                registration.object,
                &registration.address,
                Some(property_listener),
                registration.client as *mut c_void,
            )
        };
        props::check("remove property listener", status)?;

        let registration = entries.remove(pos);
        drop(unsafe { Box::from_raw(registration.client) });
        Ok(())
    }
}

impl Drop for ListenerRegistry {
    fn drop(&mut self) {
        let entries = self.entries.get_mut().unwrap_or_else(PoisonError::into_inner);
        for registration in entries.drain(..) {
            unsafe {
                AudioObjectRemovePropertyListener(
                    registration.object,
                    &registration.address,
                    Some(property_listener),
                    registration.client as *mut c_void,
                );
                drop(Box::from_raw(registration.client));
            }
        }
    }
}
