use crate::tone::Tone;
use hogout_engine::hw::config::{env_flag, env_value};
use hogout_engine::hw::options::DriverOptions;
use hogout_engine::host::HardwareLayout;
use hogout_engine::{
    AudioDriver, Error, ExclusiveDriver, Host, OutputParams, ReloadSink, Result,
    SampleFormat,
};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::{Receiver, Sender, channel};
use tracing::{error, info, warn};

pub const CONFIG_ENV: &str = "HOGOUT_CONFIG";
pub const LIST_DEVICES_ENV: &str = "HOGOUT_LIST_DEVICES";
pub const SECONDS_ENV: &str = "HOGOUT_SECONDS";
pub const TONE_HZ_ENV: &str = "HOGOUT_TONE_HZ";

/// `[player]` table of the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub format: SampleFormat,
    pub sample_rate: u32,
    pub channels: u32,
    pub tone_hz: f64,
    /// Stop after this long; play until interrupted when unset.
    pub seconds: Option<u64>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            format: SampleFormat::S16,
            sample_rate: 48_000,
            channels: 2,
            tone_hz: 440.0,
            seconds: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    player: PlayerConfig,
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    env_value(key)
        .map(|v| {
            v.parse()
                .map_err(|_| Error::Config(format!("{key}={v} is not a number")))
        })
        .transpose()
}

fn load_config() -> Result<(DriverOptions, PlayerConfig)> {
    let (options, mut player) = match env_value(CONFIG_ENV) {
        Some(path) => {
            let path = Path::new(&path);
            let text = std::fs::read_to_string(path)
                .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
            let file: ConfigFile =
                toml::from_str(&text).map_err(|e| Error::Config(e.to_string()))?;
            (DriverOptions::from_toml_str(&text)?, file.player)
        }
        None => (DriverOptions::default(), PlayerConfig::default()),
    };
    if let Some(seconds) = parse_env(SECONDS_ENV)? {
        player.seconds = Some(seconds);
    }
    if let Some(hz) = parse_env(TONE_HZ_ENV)? {
        player.tone_hz = hz;
    }
    Ok((options.with_env_overrides()?, player))
}

/// Reload requests raised by the driver, possibly from a HAL thread.
struct ReloadRequests(Sender<()>);

impl ReloadSink for ReloadRequests {
    fn request_reload(&self) {
        if let Err(e) = self.0.try_send(()) {
            warn!("dropping reload request: {e}");
        }
    }
}

/// Bytes per frame of the running session, read by the simulated device clock.
type SharedStride = Arc<AtomicUsize>;

#[cfg(target_os = "macos")]
fn open_driver(
    options: DriverOptions,
    source: Arc<Tone>,
    reload: Arc<dyn ReloadSink>,
    _stride: SharedStride,
) -> Box<dyn AudioDriver> {
    use hogout_engine::{PlatformClock, PlatformHardware};

    let host = Host {
        source,
        reload,
        channel_map: Arc::new(HardwareLayout),
        clock: Arc::new(PlatformClock::default()),
    };
    Box::new(ExclusiveDriver::new(
        Arc::new(PlatformHardware::new()),
        host,
        options,
    ))
}

/// Off macOS there is no HAL to hog; play into the simulated device instead
/// and tick its clock from a timer.
#[cfg(not(target_os = "macos"))]
fn open_driver(
    options: DriverOptions,
    source: Arc<Tone>,
    reload: Arc<dyn ReloadSink>,
    stride: SharedStride,
) -> Box<dyn AudioDriver> {
    use hogout_engine::Clock;
    use hogout_engine::host::MonotonicClock;
    use hogout_engine::hw::sim::SimHardware;

    const PERIOD: Duration = Duration::from_millis(10);
    const PERIOD_FRAMES: usize = 480;

    warn!("no CoreAudio on this platform, using the simulated device");
    let hw = Arc::new(SimHardware::with_default_device());
    let clock = Arc::new(MonotonicClock::new());
    let host = Host {
        source,
        reload,
        channel_map: Arc::new(HardwareLayout),
        clock: clock.clone(),
    };

    let device_clock = hw.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PERIOD);
        loop {
            ticker.tick().await;
            let bytes = stride.load(Ordering::Acquire) * PERIOD_FRAMES;
            if bytes == 0 {
                continue;
            }
            let output_time = clock.host_time_ns() + PERIOD.as_nanos() as u64;
            device_clock.run_cycle(bytes, output_time);
        }
    });

    Box::new(ExclusiveDriver::new(hw, host, options))
}

pub struct Player {
    driver: Box<dyn AudioDriver>,
    tone: Arc<Tone>,
    requested: OutputParams,
    stride: SharedStride,
    reloads: Receiver<()>,
    seconds: Option<u64>,
}

impl Player {
    pub fn new() -> Result<Self> {
        let (options, config) = load_config()?;
        let (tx, reloads) = channel::<()>(4);
        let tone = Arc::new(Tone::new(config.tone_hz));
        let stride: SharedStride = Arc::new(AtomicUsize::new(0));
        let mut requested = OutputParams::new(config.format, config.sample_rate, config.channels);
        requested.device = options.device.clone();
        let driver = open_driver(
            options,
            tone.clone(),
            Arc::new(ReloadRequests(tx)),
            stride.clone(),
        );
        info!("using {} ({})", driver.name(), driver.description());
        Ok(Self {
            driver,
            tone,
            requested,
            stride,
            reloads,
            seconds: config.seconds,
        })
    }

    pub fn list_devices(&self) -> Result<String> {
        let devices = self.driver.list_devices()?;
        serde_json::to_string_pretty(&devices).map_err(|e| Error::Config(e.to_string()))
    }

    fn start(&mut self) -> Result<()> {
        let mut params = self.requested.clone();
        self.driver.init(&mut params)?;
        self.tone.configure(&params);
        self.stride.store(params.frame_stride(), Ordering::Release);
        self.driver.resume();
        info!(
            "playing {:?} {}Hz {}ch",
            params.format, params.sample_rate, params.channels
        );
        Ok(())
    }

    fn stop(&mut self) {
        self.stride.store(0, Ordering::Release);
        self.driver.pause();
        self.driver.uninit();
    }

    fn reload(&mut self) -> Result<()> {
        info!("reloading audio output");
        self.stop();
        // Coalesce requests that arrived while the old session was torn down.
        while self.reloads.try_recv().is_ok() {}
        self.start()
    }

    pub async fn run(mut self) -> Result<()> {
        self.start()?;

        let seconds = self.seconds;
        let deadline = async move {
            match seconds {
                Some(s) => tokio::time::sleep(Duration::from_secs(s)).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted");
                    break;
                }
                _ = &mut deadline => break,
                request = self.reloads.recv() => {
                    if request.is_none() {
                        break;
                    }
                    if let Err(e) = self.reload() {
                        error!("reload failed: {e}");
                        return Err(e);
                    }
                }
            }
        }
        self.stop();
        Ok(())
    }
}

pub fn wants_device_list() -> bool {
    env_flag(LIST_DEVICES_ENV)
}
