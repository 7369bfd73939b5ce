use super::FailureStreak;
use crate::error::LogWriteError;
use crate::readings::{SharedReadings, TemperatureReading};
use chrono::{DateTime, Local};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub internal: f64,
    pub external: f64,
}

impl LogRecord {
    pub fn new(timestamp: DateTime<Local>, reading: &TemperatureReading) -> Self {
        Self {
            timestamp,
            internal: reading.internal.celsius,
            external: reading.external.celsius,
        }
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{:.1},{:.1}",
            self.timestamp.format("%Y%m%d %H:%M:%S"),
            self.internal,
            self.external
        )
    }
}

/// `YYYYMMDD-HHMM.log`, fixed for the life of the process.
pub fn log_file_name(started: DateTime<Local>) -> String {
    format!("{}.log", started.format("%Y%m%d-%H%M"))
}

pub trait RecordSink: Send {
    fn append(&mut self, record: &LogRecord) -> Result<(), LogWriteError>;
}

/// Append-only session log. Reopened on every append so a transient failure
/// (full disk, remounted volume) does not poison later ticks.
#[derive(Debug)]
pub struct SessionLog {
    path: PathBuf,
}

impl SessionLog {
    pub fn create(dir: &Path, started: DateTime<Local>) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(log_file_name(started));
        OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for SessionLog {
    fn append(&mut self, record: &LogRecord) -> Result<(), LogWriteError> {
        let append_err = |source| LogWriteError::Append {
            path: self.path.display().to_string(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(append_err)?;
        writeln!(file, "{record}").map_err(append_err)?;
        file.flush().map_err(append_err)
    }
}

pub struct TemperatureLogger {
    readings: SharedReadings,
    sink: Box<dyn RecordSink>,
    interval: Duration,
    streak: FailureStreak,
}

impl TemperatureLogger {
    pub fn new(readings: SharedReadings, sink: Box<dyn RecordSink>, interval: Duration) -> Self {
        Self {
            readings,
            sink,
            interval,
            streak: FailureStreak::default(),
        }
    }

    pub fn start(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.interval.as_secs_f64(),
            "temperature logger started"
        );
        // First record lands one full interval after start.
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    // tick() logs its own failures; the loop keeps going.
                    self.tick().ok();
                }
            }
        }
        tracing::info!("temperature logger stopped");
    }

    pub fn tick(&mut self) -> Result<LogRecord, LogWriteError> {
        let record = LogRecord::new(Local::now(), &self.readings.get());
        match self.sink.append(&record) {
            Ok(()) => {
                if let Some(failures) = self.streak.succeed() {
                    tracing::info!(failures, "temperature log writable again");
                }
                tracing::info!(record = %record, "temperature recorded");
                Ok(record)
            }
            Err(err) => {
                if self.streak.fail() {
                    tracing::warn!(error = %err, "failed to write temperature record");
                } else {
                    tracing::debug!(error = %err, "failed to write temperature record");
                }
                Err(err)
            }
        }
    }
}
