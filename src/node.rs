//! Startup and lifetime of the monitoring node.
//!
//! [`Node::start`] opens what it can, starts the long-running loops and hands
//! back a cheap handle that the transport calls into.


use crate::config::Config;
use crate::error::{ActuatorError, SessionError};
use crate::frame::FrameEncoder;
use crate::hardware::HardwareSet;
use crate::readings::{SharedReadings, TemperatureReading};
use crate::services::actuator::{ActuatorController, ActuatorState};
use crate::services::logger::{SessionLog, TemperatureLogger};
use crate::services::sampler::TemperatureSampler;
use crate::services::sessions::{FrameStream, SessionRegistry, ViewerSession};
use crate::services::streamer::FrameStreamer;
use chrono::Local;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    InternalSensor,
    ExternalSensor,
    Actuator,
    Camera,
    Logger,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InternalSensor => "internal_sensor",
            Self::ExternalSensor => "external_sensor",
            Self::Actuator => "actuator",
            Self::Camera => "camera",
            Self::Logger => "logger",
        })
    }
}

#[derive(Debug, Clone)]
pub struct StartupFailure {
    pub component: Component,
    pub error: String,
}

/// Initialization failures. Each one disables only the loop that depends on it.
#[derive(Debug, Clone, Default)]
pub struct StartupReport {
    pub failures: Vec<StartupFailure>,
}

impl StartupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed(&self, component: Component) -> bool {
        self.failures.iter().any(|f| f.component == component)
    }

    fn record(&mut self, component: Component, error: impl fmt::Display) {
        self.failures.push(StartupFailure {
            component,
            error: error.to_string(),
        });
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ComponentStatus {
    pub internal_sensor: bool,
    pub external_sensor: bool,
    pub actuator: bool,
    pub camera: bool,
    pub logger: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub readings: TemperatureReading,
    pub actuator: Option<ActuatorState>,
    pub viewer: Option<ViewerSession>,
    pub components: ComponentStatus,
    pub log_file: Option<String>,
}

struct NodeInner {
    readings: SharedReadings,
    actuator: Option<ActuatorController>,
    sessions: Option<SessionRegistry>,
    components: ComponentStatus,
    log_path: Option<PathBuf>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl Node {
    /// Opens every device independently and starts the sampler and logger.
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: &Config,
        hardware: HardwareSet,
        cancel: CancellationToken,
    ) -> (Self, StartupReport) {
        let mut report = StartupReport::default();
        let mut components = ComponentStatus::default();
        let mut tasks = Vec::new();
        let readings = SharedReadings::new();

        let internal = match hardware.internal_probe {
            Ok(probe) => Some(probe),
            Err(err) => {
                report.record(Component::InternalSensor, err);
                None
            }
        };
        let external = match hardware.external_probe {
            Ok(probe) => Some(probe),
            Err(err) => {
                report.record(Component::ExternalSensor, err);
                None
            }
        };
        components.internal_sensor = internal.is_some();
        components.external_sensor = external.is_some();
        if internal.is_some() || external.is_some() {
            let sampler = TemperatureSampler::new(
                readings.clone(),
                internal,
                external,
                config.temp_read_period(),
            );
            tasks.push(sampler.start(cancel.clone()));
        } else {
            tracing::warn!("no temperature sensors available; readings stay at their initial values");
        }

        let log_path = match SessionLog::create(&config.log_dir, Local::now()) {
            Ok(log) => {
                let path = log.path().to_path_buf();
                tracing::info!(path = %path.display(), "temperature log opened");
                let logger =
                    TemperatureLogger::new(readings.clone(), Box::new(log), config.temp_log_interval);
                tasks.push(logger.start(cancel.clone()));
                components.logger = true;
                Some(path)
            }
            Err(err) => {
                report.record(
                    Component::Logger,
                    format!("log directory {} unusable: {err}", config.log_dir.display()),
                );
                None
            }
        };

        let actuator = match hardware.relay.and_then(ActuatorController::open) {
            Ok(controller) => Some(controller),
            Err(err) => {
                report.record(Component::Actuator, err);
                None
            }
        };
        components.actuator = actuator.is_some();

        let sessions = match hardware.camera {
            Ok(camera) => {
                let streamer = FrameStreamer::new(
                    camera,
                    FrameEncoder::new(config.jpeg_quality),
                    readings.clone(),
                    config.frame_period(),
                );
                Some(SessionRegistry::new(streamer, config.viewer_queue))
            }
            Err(err) => {
                report.record(Component::Camera, err);
                None
            }
        };
        components.camera = sessions.is_some();

        for failure in &report.failures {
            tracing::warn!(component = %failure.component, error = %failure.error, "component unavailable");
        }

        let node = Self {
            inner: Arc::new(NodeInner {
                readings,
                actuator,
                sessions,
                components,
                log_path,
                cancel,
                tasks: Mutex::new(tasks),
            }),
        };
        (node, report)
    }

    pub fn readings(&self) -> TemperatureReading {
        self.inner.readings.get()
    }

    pub fn actuator_state(&self) -> Option<ActuatorState> {
        self.inner.actuator.as_ref().map(ActuatorController::state)
    }

    pub fn components(&self) -> ComponentStatus {
        self.inner.components
    }

    pub fn log_path(&self) -> Option<&PathBuf> {
        self.inner.log_path.as_ref()
    }

    pub async fn on_viewer_attach(&self, session_id: Uuid) -> Result<FrameStream, SessionError> {
        match &self.inner.sessions {
            Some(sessions) => sessions.attach(session_id).await,
            None => Err(SessionError::CameraUnavailable),
        }
    }

    /// Returns once the session's streaming loop has exited.
    pub async fn on_viewer_detach(&self, session_id: Uuid) -> bool {
        match &self.inner.sessions {
            Some(sessions) => sessions.detach(session_id).await,
            None => false,
        }
    }

    pub async fn on_toggle_command(&self) -> Result<ActuatorState, ActuatorError> {
        match &self.inner.actuator {
            Some(actuator) => actuator.toggle().await,
            None => Err(ActuatorError::Unavailable),
        }
    }

    pub async fn status(&self) -> NodeStatus {
        let viewer = match &self.inner.sessions {
            Some(sessions) => sessions.current().await,
            None => None,
        };
        NodeStatus {
            readings: self.readings(),
            actuator: self.actuator_state(),
            viewer,
            components: self.inner.components,
            log_file: self
                .inner
                .log_path
                .as_ref()
                .map(|path| path.display().to_string()),
        }
    }

    /// Stops the attached viewer, then the sampler and logger.
    pub async fn shutdown(&self) {
        if let Some(sessions) = &self.inner.sessions {
            sessions.close().await;
        }
        self.inner.cancel.cancel();
        let tasks = std::mem::take(
            &mut *self
                .inner
                .tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for task in tasks {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "background task ended abnormally");
            }
        }
        tracing::info!("node stopped");
    }
}
