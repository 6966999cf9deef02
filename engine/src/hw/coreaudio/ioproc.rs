#![cfg(target_os = "macos")]

use super::props;
use crate::error::{Error, OsStatus, Result};
use crate::exclusive::render::RenderServicer;
use crate::hw::{DeviceId, IoProcId};
use coreaudio_sys::{
    AudioBufferList, AudioConvertHostTimeToNanos, AudioDeviceCreateIOProcID,
    AudioDeviceDestroyIOProcID, AudioDeviceID, AudioDeviceIOProcID, AudioDeviceStart,
    AudioDeviceStop, AudioTimeStamp, OSStatus,
};
use std::os::raw::c_void;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

unsafe extern "C" fn render_proc(
    _device: AudioDeviceID,
    _now: *const AudioTimeStamp,
    _input_data: *const AudioBufferList,
    _input_time: *const AudioTimeStamp,
    output_data: *mut AudioBufferList,
    output_time: *const AudioTimeStamp,
    client_data: *mut c_void,
) -> OSStatus {
    let servicer = unsafe { &*(client_data as *const RenderServicer) };
    if output_data.is_null() {
        return 0;
    }

    let abl = unsafe { &mut *output_data };
    let n_buffers = abl.mNumberBuffers as usize;
    let idx = servicer.stream_index();
    if idx >= n_buffers {
        return OsStatus::UNSPECIFIED.0;
    }
    let buffers = unsafe { std::slice::from_raw_parts_mut(abl.mBuffers.as_mut_ptr(), n_buffers) };
    let buf = &mut buffers[idx];
    let out: &mut [u8] = if buf.mData.is_null() || buf.mDataByteSize == 0 {
        &mut []
    } else {
        unsafe { std::slice::from_raw_parts_mut(buf.mData as *mut u8, buf.mDataByteSize as usize) }
    };

    let output_host_time_ns = if output_time.is_null() {
        0
    } else {
        unsafe { AudioConvertHostTimeToNanos((*output_time).mHostTime) }
    };
    servicer.render(output_host_time_ns, out).os_status().0
}

struct IoProc {
    id: IoProcId,
    device: AudioDeviceID,
    proc_id: AudioDeviceIOProcID,
    client: *const RenderServicer,
}

// `client` is an `Arc` leaked into the HAL and reclaimed on destroy.
unsafe impl Send for IoProc {}

#[derive(Default)]
pub struct IoProcRegistry {
    procs: Mutex<Vec<IoProc>>,
    next_id: Mutex<usize>,
}

impl IoProcRegistry {
    fn procs(&self) -> MutexGuard<'_, Vec<IoProc>> {
        self.procs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn find(&self, device: DeviceId, id: IoProcId) -> Result<AudioDeviceIOProcID> {
        self.procs()
            .iter()
            .find(|p| p.id == id && p.device == device.0)
            .map(|p| p.proc_id)
            .ok_or_else(|| Error::hardware("find IO proc", OsStatus::ILLEGAL_OPERATION))
    }

    pub fn create(&self, device: DeviceId, servicer: Arc<RenderServicer>) -> Result<IoProcId> {
        let client = Arc::into_raw(servicer);
        let mut proc_id: AudioDeviceIOProcID = None;
        let status: OSStatus = unsafe {
            AudioDeviceCreateIOProcID(
                device.0,
                Some(render_proc),
                client as *mut c_void,
                &mut proc_id,
            )
        };
        if let Err(e) = props::check("register audio render callback", status) {
            drop(unsafe { Arc::from_raw(client) });
            return Err(e);
        }

        let id = {
            let mut next = self.next_id.lock().unwrap_or_else(PoisonError::into_inner);
            *next += 1;
            IoProcId(*next)
        };
        self.procs().push(IoProc {
            id,
            device: device.0,
            proc_id,
            client,
        });
        Ok(id)
    }

    pub fn start(&self, device: DeviceId, id: IoProcId) -> Result<()> {
        let proc_id = self.find(device, id)?;
        let status: OSStatus = unsafe { AudioDeviceStart(device.0, proc_id) };
        props::check("start audio device", status)
    }

    pub fn stop(&self, device: DeviceId, id: IoProcId) -> Result<()> {
        let proc_id = self.find(device, id)?;
        let status: OSStatus = unsafe { AudioDeviceStop(device.0, proc_id) };
        props::check("stop audio device", status)
    }

    pub fn destroy(&self, device: DeviceId, id: IoProcId) -> Result<()> {
        let mut procs = self.procs();
        let pos = procs
            .iter()
            .position(|p| p.id == id && p.device == device.0)
            .ok_or_else(|| Error::hardware("find IO proc", OsStatus::ILLEGAL_OPERATION))?;
        let status: OSStatus =
            unsafe { AudioDeviceDestroyIOProcID(device.0, procs[pos].proc_id) };
        props::check("remove device render callback", status)?;

        let io_proc = procs.remove(pos);
        drop(unsafe { Arc::from_raw(io_proc.client) });
        Ok(())
    }
}

impl Drop for IoProcRegistry {
    fn drop(&mut self) {
        let procs = self.procs.get_mut().unwrap_or_else(PoisonError::into_inner);
        for io_proc in procs.drain(..) {
            unsafe {
                AudioDeviceStop(io_proc.device, io_proc.proc_id);
                AudioDeviceDestroyIOProcID(io_proc.device, io_proc.proc_id);
                drop(Arc::from_raw(io_proc.client));
            }
        }
    }
}
