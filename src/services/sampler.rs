use super::FailureStreak;
use crate::error::SensorError;
use crate::hardware::TemperatureProbe;
use crate::readings::{ReadingUpdate, SharedReadings, TemperatureReading};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

type SharedProbe = Arc<Mutex<Box<dyn TemperatureProbe>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Internal,
    External,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::External => "external",
        }
    }

    fn update(self, celsius: f64) -> ReadingUpdate {
        match self {
            Self::Internal => ReadingUpdate {
                internal: Some(celsius),
                external: None,
            },
            Self::External => ReadingUpdate {
                internal: None,
                external: Some(celsius),
            },
        }
    }
}

/// One probe and its own failure streak. Each slot commits its field as soon
/// as its read returns, so a stalled sensor never holds back the other one.
struct ProbeSlot {
    role: Role,
    name: String,
    probe: SharedProbe,
    streak: FailureStreak,
}

impl ProbeSlot {
    fn new(role: Role, probe: Box<dyn TemperatureProbe>) -> Self {
        Self {
            role,
            name: probe.name().to_string(),
            probe: Arc::new(Mutex::new(probe)),
            streak: FailureStreak::default(),
        }
    }

    async fn sample(&mut self, readings: &SharedReadings) -> Result<f64, SensorError> {
        let result = read_probe(self.probe.clone()).await;
        if let Ok(celsius) = result {
            let reading = readings.commit(self.role.update(celsius), Utc::now());
            tracing::debug!(
                sensor = %self.name,
                role = self.role.as_str(),
                internal = %reading.internal.formatted(),
                external = %reading.external.formatted(),
                "temperature sampled"
            );
        }
        self.report(&result);
        result
    }

    async fn run(mut self, readings: SharedReadings, period: Duration, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                // Failures are reported by the slot itself.
                _ = self.sample(&readings) => {}
            }
        }
    }

    fn report(&mut self, result: &Result<f64, SensorError>) {
        let role = self.role.as_str();
        match result {
            Ok(_) => {
                if let Some(failures) = self.streak.succeed() {
                    tracing::info!(sensor = %self.name, role, failures, "sensor recovered");
                }
            }
            Err(err) => {
                if self.streak.fail() {
                    tracing::warn!(
                        sensor = %self.name,
                        role,
                        error = %err,
                        "temperature read failed; keeping last value"
                    );
                } else {
                    tracing::debug!(sensor = %self.name, role, error = %err, "temperature read failed");
                }
            }
        }
    }
}

/// What one round produced. A `None` read means that probe is not configured.
#[derive(Debug)]
pub struct SampleOutcome {
    pub internal: Option<Result<f64, SensorError>>,
    pub external: Option<Result<f64, SensorError>>,
    pub reading: TemperatureReading,
}

/// Sole writer of [`SharedReadings`].
pub struct TemperatureSampler {
    readings: SharedReadings,
    internal: Option<ProbeSlot>,
    external: Option<ProbeSlot>,
    period: Duration,
}

impl TemperatureSampler {
    pub fn new(
        readings: SharedReadings,
        internal: Option<Box<dyn TemperatureProbe>>,
        external: Option<Box<dyn TemperatureProbe>>,
        period: Duration,
    ) -> Self {
        Self {
            readings,
            internal: internal.map(|probe| ProbeSlot::new(Role::Internal, probe)),
            external: external.map(|probe| ProbeSlot::new(Role::External, probe)),
            period,
        }
    }

    pub fn start(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    /// Runs one loop per configured probe, each on its own interval.
    async fn run(self, cancel: CancellationToken) {
        let Self {
            readings,
            internal,
            external,
            period,
        } = self;
        tracing::info!(
            rate_hz = 1.0 / period.as_secs_f64(),
            internal = internal.as_ref().map(|slot| slot.name.as_str()),
            external = external.as_ref().map(|slot| slot.name.as_str()),
            "temperature sampler started"
        );
        let loops: Vec<_> = internal
            .into_iter()
            .chain(external)
            .map(|slot| tokio::spawn(slot.run(readings.clone(), period, cancel.clone())))
            .collect();
        for handle in loops {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "sensor loop ended abnormally");
            }
        }
        tracing::info!("temperature sampler stopped");
    }

    /// Samples both probes concurrently. Each commits its own field when its
    /// read returns.
    pub async fn sample_once(&mut self) -> SampleOutcome {
        let readings = self.readings.clone();
        let (internal, external) = tokio::join!(
            sample_slot(self.internal.as_mut(), &readings),
            sample_slot(self.external.as_mut(), &readings),
        );
        SampleOutcome {
            internal,
            external,
            reading: readings.get(),
        }
    }
}

async fn sample_slot(
    slot: Option<&mut ProbeSlot>,
    readings: &SharedReadings,
) -> Option<Result<f64, SensorError>> {
    match slot {
        Some(slot) => Some(slot.sample(readings).await),
        None => None,
    }
}

async fn read_probe(probe: SharedProbe) -> Result<f64, SensorError> {
    tokio::task::spawn_blocking(move || -> Result<f64, SensorError> {
        let mut guard = probe
            .lock()
            .map_err(|_| SensorError::Worker("probe lock poisoned".to_string()))?;
        guard.read_celsius()
    })
    .await
    .unwrap_or_else(|err| Err(SensorError::Worker(err.to_string())))
}
