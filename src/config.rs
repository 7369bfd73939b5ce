use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareMode {
    /// Linux sysfs sensors and GPIO, camera per `camera_device`.
    Linux,
    /// Simulated probes and relay; camera still per `camera_device`.
    Simulated,
}

impl FromStr for HardwareMode {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "linux" | "pi" => Ok(Self::Linux),
            "simulated" | "sim" => Ok(Self::Simulated),
            other => Err(anyhow!("unknown hardware mode {other:?}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub hardware: HardwareMode,

    pub w1_devices_dir: PathBuf,
    pub internal_sensor_id: String,
    pub external_sensor_id: String,
    pub temp_read_hz: f64,
    pub temp_log_interval: Duration,

    pub relay_gpio: u32,
    pub gpio_sysfs_dir: PathBuf,

    pub camera_device: String,
    pub camera_width: u32,
    pub camera_height: u32,
    pub video_frame_rate_hz: f64,
    pub jpeg_quality: u8,
    pub viewer_queue: usize,

    pub log_dir: PathBuf,
    pub http_bind: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hardware: HardwareMode::Linux,
            w1_devices_dir: PathBuf::from("/sys/bus/w1/devices"),
            internal_sensor_id: "2029ab000999".to_string(),
            external_sensor_id: "2029ab00098b".to_string(),
            temp_read_hz: 2.0,
            temp_log_interval: Duration::from_secs(30),
            relay_gpio: 24,
            gpio_sysfs_dir: PathBuf::from("/sys/class/gpio"),
            camera_device: "/dev/video0".to_string(),
            camera_width: 640,
            camera_height: 480,
            video_frame_rate_hz: 30.0,
            jpeg_quality: 80,
            viewer_queue: 2,
            log_dir: PathBuf::from("."),
            http_bind: "0.0.0.0:5001".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let hardware = match env_optional("ENCLOSURE_HARDWARE") {
            Some(raw) => raw.parse().context("invalid ENCLOSURE_HARDWARE")?,
            None => defaults.hardware,
        };

        let w1_devices_dir = PathBuf::from(env_string(
            "ENCLOSURE_W1_DEVICES_DIR",
            Some(defaults.w1_devices_dir.display().to_string()),
        )?);
        let internal_sensor_id =
            env_string("ENCLOSURE_INTERNAL_SENSOR_ID", Some(defaults.internal_sensor_id))?;
        let external_sensor_id =
            env_string("ENCLOSURE_EXTERNAL_SENSOR_ID", Some(defaults.external_sensor_id))?;

        let temp_read_hz = env_rate("ENCLOSURE_TEMP_READ_HZ", defaults.temp_read_hz)?;
        let temp_log_interval = Duration::from_secs(
            env_u64(
                "ENCLOSURE_TEMP_LOG_INTERVAL_SECONDS",
                Some(defaults.temp_log_interval.as_secs()),
            )?
            .clamp(1, MAX_LOG_INTERVAL_SECS),
        );

        let relay_gpio = env_u32("ENCLOSURE_RELAY_GPIO", defaults.relay_gpio)?;
        let gpio_sysfs_dir = PathBuf::from(env_string(
            "ENCLOSURE_GPIO_SYSFS_DIR",
            Some(defaults.gpio_sysfs_dir.display().to_string()),
        )?);

        let camera_device = env_string("ENCLOSURE_CAMERA_DEVICE", Some(defaults.camera_device))?;
        let camera_width = env_u32("ENCLOSURE_CAMERA_WIDTH", defaults.camera_width)?;
        let camera_height = env_u32("ENCLOSURE_CAMERA_HEIGHT", defaults.camera_height)?;
        let video_frame_rate_hz =
            env_rate("ENCLOSURE_VIDEO_FRAME_RATE_HZ", defaults.video_frame_rate_hz)?;
        let jpeg_quality = env_u64("ENCLOSURE_JPEG_QUALITY", Some(defaults.jpeg_quality as u64))?
            .clamp(1, 100) as u8;
        let viewer_queue =
            env_u64("ENCLOSURE_VIEWER_QUEUE", Some(defaults.viewer_queue as u64))?.max(1) as usize;

        let log_dir = PathBuf::from(env_string(
            "ENCLOSURE_LOG_DIR",
            Some(defaults.log_dir.display().to_string()),
        )?);
        let http_bind = env_string("ENCLOSURE_HTTP_BIND", Some(defaults.http_bind))?;

        Ok(Self {
            hardware,
            w1_devices_dir,
            internal_sensor_id,
            external_sensor_id,
            temp_read_hz,
            temp_log_interval,
            relay_gpio,
            gpio_sysfs_dir,
            camera_device,
            camera_width,
            camera_height,
            video_frame_rate_hz,
            jpeg_quality,
            viewer_queue,
            log_dir,
            http_bind,
        })
    }

    pub fn temp_read_period(&self) -> Duration {
        period_from_hz(self.temp_read_hz)
    }

    pub fn frame_period(&self) -> Duration {
        period_from_hz(self.video_frame_rate_hz)
    }
}

/// Slowest accepted rate: one tick every ~16 minutes.
pub const MIN_RATE_HZ: f64 = 0.001;
/// Fastest accepted rate: one tick per millisecond.
pub const MAX_RATE_HZ: f64 = 1000.0;

/// Longest accepted gap between log records: one day.
pub const MAX_LOG_INTERVAL_SECS: u64 = 86_400;

/// Interval period for `hz`, clamped to the accepted rate range so the
/// result is never zero and always representable.
pub fn period_from_hz(hz: f64) -> Duration {
    let hz = if hz.is_nan() {
        MIN_RATE_HZ
    } else {
        hz.clamp(MIN_RATE_HZ, MAX_RATE_HZ)
    };
    Duration::from_secs_f64(1.0 / hz)
}

fn parse_rate(raw: &str) -> Result<f64> {
    let hz = raw.trim().parse::<f64>()?;
    if !hz.is_finite() || hz <= 0.0 {
        bail!("rate must be a positive number of Hz, got {hz}");
    }
    if !(MIN_RATE_HZ..=MAX_RATE_HZ).contains(&hz) {
        bail!("rate {hz} Hz is outside {MIN_RATE_HZ}..={MAX_RATE_HZ} Hz");
    }
    Ok(hz)
}

fn env_rate(key: &str, default: f64) -> Result<f64> {
    match env::var(key) {
        Ok(value) => parse_rate(&value).with_context(|| format!("invalid {key}")),
        Err(_) => Ok(default),
    }
}

fn env_string(key: &str, default: Option<String>) -> Result<String> {
    match env::var(key) {
        Ok(value) => Ok(value.trim().to_string()),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_u64(key: &str, default: Option<u64>) -> Result<u64> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .with_context(|| format!("invalid {key}")),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_u32(key: &str, default: u32) -> Result<u32> {
    let value = env_u64(key, Some(u64::from(default)))?;
    narrow_u32(key, value)
}

fn narrow_u32(key: &str, value: u64) -> Result<u32> {
    u32::try_from(value).with_context(|| format!("{key} out of range: {value}"))
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_must_be_positive_and_finite() {
        assert_eq!(parse_rate(" 2.5 ").unwrap(), 2.5);
        assert!(parse_rate("0").is_err());
        assert!(parse_rate("-1").is_err());
        assert!(parse_rate("inf").is_err());
        assert!(parse_rate("fast").is_err());
    }

    #[test]
    fn rate_outside_the_tick_range_is_rejected() {
        assert!(parse_rate("1e12").is_err());
        assert!(parse_rate("1e-30").is_err());
        assert_eq!(parse_rate("1000").unwrap(), MAX_RATE_HZ);
        assert_eq!(parse_rate("0.001").unwrap(), MIN_RATE_HZ);
    }

    #[test]
    fn period_is_never_zero_or_unbounded() {
        assert_eq!(period_from_hz(1e12), Duration::from_millis(1));
        assert_eq!(period_from_hz(f64::INFINITY), Duration::from_millis(1));
        assert_eq!(period_from_hz(1e-30), Duration::from_secs(1000));
        assert_eq!(period_from_hz(0.0), Duration::from_secs(1000));
        assert_eq!(period_from_hz(-5.0), Duration::from_secs(1000));
        assert_eq!(period_from_hz(f64::NAN), Duration::from_secs(1000));
        assert_eq!(period_from_hz(2.0), Duration::from_millis(500));
    }

    #[test]
    fn integer_settings_reject_values_past_u32() {
        assert_eq!(narrow_u32("ENCLOSURE_CAMERA_WIDTH", 640).unwrap(), 640);
        assert_eq!(
            narrow_u32("ENCLOSURE_RELAY_GPIO", u64::from(u32::MAX)).unwrap(),
            u32::MAX
        );
        let err = narrow_u32("ENCLOSURE_CAMERA_WIDTH", 4_294_967_296).unwrap_err();
        assert!(err.to_string().contains("ENCLOSURE_CAMERA_WIDTH"));
    }

    #[test]
    fn default_periods_match_rates() {
        let config = Config::default();
        assert_eq!(config.temp_read_period(), Duration::from_millis(500));
        assert_eq!(config.temp_log_interval, Duration::from_secs(30));
        let frame = config.frame_period();
        assert!(frame > Duration::from_millis(33) && frame < Duration::from_millis(34));
    }

    #[test]
    fn hardware_mode_parses_aliases() {
        assert_eq!("linux".parse::<HardwareMode>().unwrap(), HardwareMode::Linux);
        assert_eq!(" SIM ".parse::<HardwareMode>().unwrap(), HardwareMode::Simulated);
        assert!("arduino".parse::<HardwareMode>().is_err());
    }
}
