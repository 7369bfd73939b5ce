//! Bench stand-ins for running the node without a Pi attached.

use super::{RelayLine, TemperatureProbe};
use crate::error::{ActuatorError, SensorError};
use std::f64::consts::TAU;
use std::time::Instant;

const DRIFT_PERIOD_SECS: f64 = 300.0;

/// Slow sine drift around a base temperature.
pub struct SimulatedProbe {
    name: String,
    base_celsius: f64,
    amplitude: f64,
    started: Instant,
}

impl SimulatedProbe {
    pub fn new(name: &str, base_celsius: f64, amplitude: f64) -> Self {
        Self {
            name: format!("sim-{name}"),
            base_celsius,
            amplitude,
            started: Instant::now(),
        }
    }
}

impl TemperatureProbe for SimulatedProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_celsius(&mut self) -> Result<f64, SensorError> {
        let phase = self.started.elapsed().as_secs_f64() / DRIFT_PERIOD_SECS * TAU;
        Ok(self.base_celsius + self.amplitude * phase.sin())
    }
}

pub struct SimulatedRelay {
    name: String,
    energised: bool,
}

impl SimulatedRelay {
    pub fn new(line: u32) -> Self {
        Self {
            name: format!("sim-gpio{line}"),
            energised: false,
        }
    }
}

impl RelayLine for SimulatedRelay {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self) -> Result<bool, ActuatorError> {
        Ok(self.energised)
    }

    fn write(&mut self, energised: bool) -> Result<(), ActuatorError> {
        self.energised = energised;
        Ok(())
    }
}
