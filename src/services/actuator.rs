use crate::error::ActuatorError;
use crate::hardware::RelayLine;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActuatorState {
    On,
    Off,
}

impl ActuatorState {
    pub fn from_energised(energised: bool) -> Self {
        if energised {
            Self::On
        } else {
            Self::Off
        }
    }
}

impl fmt::Display for ActuatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::On => "ON",
            Self::Off => "OFF",
        })
    }
}

/// Serializes toggles of the relay line. The line's mutex is the only lock
/// taken here and is unrelated to the readings lock.
#[derive(Clone)]
pub struct ActuatorController {
    name: Arc<str>,
    line: Arc<Mutex<Box<dyn RelayLine>>>,
    energised: Arc<AtomicBool>,
}

impl ActuatorController {
    /// Drives the line OFF so the relay starts de-energised. Blocks for one line write.
    pub fn open(mut line: Box<dyn RelayLine>) -> Result<Self, ActuatorError> {
        line.write(false)?;
        let name: Arc<str> = Arc::from(line.name());
        tracing::info!(line = %name, "actuator ready (OFF)");
        Ok(Self {
            name,
            line: Arc::new(Mutex::new(line)),
            energised: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Last state successfully applied to the hardware. Never waits on a toggle in flight.
    pub fn state(&self) -> ActuatorState {
        ActuatorState::from_energised(self.energised.load(Ordering::SeqCst))
    }

    /// Reads the line, writes the opposite value and reports the new state.
    /// On failure the reported state is left untouched and nothing is retried.
    pub async fn toggle(&self) -> Result<ActuatorState, ActuatorError> {
        let line = self.line.clone();
        let energised = self.energised.clone();
        let result = tokio::task::spawn_blocking(move || -> Result<ActuatorState, ActuatorError> {
            let mut guard = line
                .lock()
                .map_err(|_| ActuatorError::Worker("line lock poisoned".to_string()))?;
            let target = !guard.read()?;
            guard.write(target)?;
            energised.store(target, Ordering::SeqCst);
            Ok(ActuatorState::from_energised(target))
        })
        .await
        .unwrap_or_else(|err| Err(ActuatorError::Worker(err.to_string())));

        match &result {
            Ok(state) => tracing::info!(line = %self.name, state = %state, "actuator toggled"),
            Err(err) => tracing::warn!(
                line = %self.name,
                state = %self.state(),
                error = %err,
                "actuator toggle failed; state unchanged"
            ),
        }
        result
    }
}
