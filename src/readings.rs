use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};

/// Value every field holds until its sensor produces a first good read.
pub const SENTINEL_CELSIUS: f64 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorValue {
    pub celsius: f64,
    /// `None` while the field still holds the sentinel.
    pub captured_at: Option<DateTime<Utc>>,
}

impl SensorValue {
    const fn sentinel() -> Self {
        Self {
            celsius: SENTINEL_CELSIUS,
            captured_at: None,
        }
    }

    pub fn formatted(&self) -> String {
        format!("{:.1}", self.celsius)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TemperatureReading {
    pub internal: SensorValue,
    pub external: SensorValue,
}

impl TemperatureReading {
    pub const fn sentinel() -> Self {
        Self {
            internal: SensorValue::sentinel(),
            external: SensorValue::sentinel(),
        }
    }

    /// Most recent capture time across both fields.
    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        self.internal.captured_at.max(self.external.captured_at)
    }
}

impl Default for TemperatureReading {
    fn default() -> Self {
        Self::sentinel()
    }
}

/// Successful reads to commit. A `None` field keeps its last good value.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadingUpdate {
    pub internal: Option<f64>,
    pub external: Option<f64>,
}

/// Shared handle to the latest temperature pair.
///
/// The sampler is the only writer. The lock is held for the copy in or out,
/// never across sensor I/O.
#[derive(Debug, Clone, Default)]
pub struct SharedReadings {
    inner: Arc<RwLock<TemperatureReading>>,
}

impl SharedReadings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> TemperatureReading {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace both fields together with a single capture time.
    pub fn set(&self, internal: f64, external: f64, at: DateTime<Utc>) {
        self.commit(
            ReadingUpdate {
                internal: Some(internal),
                external: Some(external),
            },
            at,
        );
    }

    /// Apply whichever fields the update carries; the rest keep their values.
    pub fn commit(&self, update: ReadingUpdate, at: DateTime<Utc>) -> TemperatureReading {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(celsius) = update.internal {
            guard.internal = SensorValue {
                celsius,
                captured_at: Some(at),
            };
        }
        if let Some(celsius) = update.external {
            guard.external = SensorValue {
                celsius,
                captured_at: Some(at),
            };
        }
        *guard
    }
}
