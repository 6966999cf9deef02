use byteorder::{ByteOrder, NativeEndian};
use hogout_engine::{AudioSource, OutputParams, SampleFormat};
use std::f64::consts::TAU;
use std::sync::{Mutex, TryLockError};

const AMPLITUDE: f64 = 0.2;

#[derive(Debug)]
struct ToneState {
    format: SampleFormat,
    sample_rate: u32,
    channels: usize,
    phase: f64,
}

/// Sine generator feeding every channel the same signal.
#[derive(Debug)]
pub struct Tone {
    hz: f64,
    state: Mutex<ToneState>,
}

impl Tone {
    pub fn new(hz: f64) -> Self {
        Self {
            hz,
            state: Mutex::new(ToneState {
                format: SampleFormat::S16,
                sample_rate: 48_000,
                channels: 2,
                phase: 0.0,
            }),
        }
    }

    /// Follow the layout the driver negotiated. Call before the device starts.
    pub fn configure(&self, params: &OutputParams) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.format = params.format;
        state.sample_rate = params.sample_rate;
        state.channels = params.channels as usize;
        state.phase = 0.0;
    }
}

fn write_sample(format: SampleFormat, value: f64, out: &mut [u8]) {
    match format {
        SampleFormat::U8 => out[0] = (value * 127.0 + 128.0) as u8,
        SampleFormat::S16 => NativeEndian::write_i16(out, (value * i16::MAX as f64) as i16),
        SampleFormat::S24 => NativeEndian::write_i24(out, (value * 8_388_607.0) as i32),
        SampleFormat::S32 => NativeEndian::write_i32(out, (value * i32::MAX as f64) as i32),
        SampleFormat::F32 => NativeEndian::write_f32(out, value as f32),
        SampleFormat::F64 => NativeEndian::write_f64(out, value),
        // Compressed passthrough needs an encoder; send silence.
        _ => out.fill(0),
    }
}

impl AudioSource for Tone {
    fn pull(&self, out: &mut [u8], frames: usize, _deadline_us: i64) {
        // Never wait on the device thread; a reconfigure in flight means silence.
        let mut state = match self.state.try_lock() {
            Ok(state) => state,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                out.fill(0);
                return;
            }
        };

        let bytes = state.format.bytes_per_sample() as usize;
        let stride = bytes * state.channels;
        if stride == 0 || state.sample_rate == 0 {
            out.fill(0);
            return;
        }
        let step = TAU * self.hz / state.sample_rate as f64;
        for frame in out.chunks_exact_mut(stride).take(frames) {
            let value = state.phase.sin() * AMPLITUDE;
            for sample in frame.chunks_exact_mut(bytes) {
                write_sample(state.format, value, sample);
            }
            state.phase = (state.phase + step) % TAU;
        }
    }
}
