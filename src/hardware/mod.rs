//! Hardware ports and their Linux / simulated backends.
//!
//! Every call here may block (1-Wire conversions take ~750 ms, camera reads
//! wait for the next frame), so callers run them on the blocking pool and
//! never while holding shared state.

pub mod camera;
pub mod gpio;
pub mod sim;
pub mod w1;

use crate::config::{Config, HardwareMode};
use crate::error::{ActuatorError, CaptureError, SensorError};
use bytes::Bytes;

pub trait TemperatureProbe: Send {
    /// Human-readable id used in logs.
    fn name(&self) -> &str;

    fn read_celsius(&mut self) -> Result<f64, SensorError>;
}

/// A binary output line. `true` means energised.
pub trait RelayLine: Send {
    fn name(&self) -> &str;

    fn read(&mut self) -> Result<bool, ActuatorError>;

    fn write(&mut self, energised: bool) -> Result<(), ActuatorError>;
}

pub trait FrameSource: Send {
    fn name(&self) -> &str;

    fn capture(&mut self) -> Result<CapturedFrame, CaptureError>;
}

#[derive(Debug, Clone)]
pub enum CapturedFrame {
    /// Already-compressed still (MJPEG devices, snapshot files).
    Jpeg(Bytes),
    /// Packed 8-bit RGB.
    Rgb {
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    },
}

/// Result of opening every device at startup. Each entry fails independently.
pub struct HardwareSet {
    pub internal_probe: Result<Box<dyn TemperatureProbe>, SensorError>,
    pub external_probe: Result<Box<dyn TemperatureProbe>, SensorError>,
    pub relay: Result<Box<dyn RelayLine>, ActuatorError>,
    pub camera: Result<Box<dyn FrameSource>, CaptureError>,
}

pub fn open(config: &Config) -> HardwareSet {
    let camera = camera::open(config);
    match config.hardware {
        HardwareMode::Linux => HardwareSet {
            internal_probe: w1::Ds18b20::open(&config.w1_devices_dir, &config.internal_sensor_id)
                .map(|probe| Box::new(probe) as Box<dyn TemperatureProbe>),
            external_probe: w1::Ds18b20::open(&config.w1_devices_dir, &config.external_sensor_id)
                .map(|probe| Box::new(probe) as Box<dyn TemperatureProbe>),
            relay: gpio::SysfsRelay::open(&config.gpio_sysfs_dir, config.relay_gpio)
                .map(|relay| Box::new(relay) as Box<dyn RelayLine>),
            camera,
        },
        HardwareMode::Simulated => HardwareSet {
            internal_probe: Ok(Box::new(sim::SimulatedProbe::new("internal", 30.0, 1.5))),
            external_probe: Ok(Box::new(sim::SimulatedProbe::new("external", 18.0, 3.0))),
            relay: Ok(Box::new(sim::SimulatedRelay::new(config.relay_gpio))),
            camera,
        },
    }
}
