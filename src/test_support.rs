//! In-memory hardware and sinks for unit and end-to-end tests.

use crate::error::{ActuatorError, CaptureError, LogWriteError, SensorError};
use crate::hardware::{CapturedFrame, FrameSource, RelayLine, TemperatureProbe};
use crate::services::logger::{LogRecord, RecordSink};
use bytes::Bytes;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// SOI, an empty comment segment, EOI. Enough to pass the encoder's JPEG check.
pub const TINY_JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xFE, 0x00, 0x02, 0xFF, 0xD9];

fn injected(what: &str) -> io::Error {
    io::Error::other(format!("injected {what} failure"))
}

/// Tracks how many callers are inside a fake at once.
#[derive(Default)]
struct AccessGauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl AccessGauge {
    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

enum ProbeScript {
    Steps(VecDeque<Result<f64, ()>>),
    Failing,
    Counting(f64),
}

pub struct ScriptedProbe {
    name: String,
    script: ProbeScript,
    reads: Arc<AtomicUsize>,
    delay: Duration,
}

impl ScriptedProbe {
    /// Plays `steps` in order, then reports the sensor as gone.
    pub fn new(name: &str, steps: Vec<Result<f64, ()>>) -> Self {
        Self::with_script(name, ProbeScript::Steps(steps.into()))
    }

    pub fn failing(name: &str) -> Self {
        Self::with_script(name, ProbeScript::Failing)
    }

    /// Returns `start`, `start + 1`, ... on successive reads.
    pub fn counting(name: &str, start: f64) -> Self {
        Self::with_script(name, ProbeScript::Counting(start))
    }

    fn with_script(name: &str, script: ProbeScript) -> Self {
        Self {
            name: name.to_string(),
            script,
            reads: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
        }
    }

    /// Every read blocks for `delay` before answering, like a stuck bus.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn reads(&self) -> Arc<AtomicUsize> {
        self.reads.clone()
    }
}

impl TemperatureProbe for ScriptedProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_celsius(&mut self) -> Result<f64, SensorError> {
        let count = self.reads.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let sensor = self.name.clone();
        let crc = || SensorError::Crc {
            sensor: sensor.clone(),
        };
        match &mut self.script {
            ProbeScript::Steps(steps) => match steps.pop_front() {
                Some(Ok(celsius)) => Ok(celsius),
                Some(Err(())) => Err(crc()),
                None => Err(SensorError::NotPresent { sensor }),
            },
            ProbeScript::Failing => Err(crc()),
            ProbeScript::Counting(start) => Ok(*start + count as f64),
        }
    }
}

#[derive(Default)]
struct RelayInner {
    energised: AtomicBool,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
    gauge: AccessGauge,
}

/// Relay whose handles share one line, so tests keep a clone to inspect it.
#[derive(Clone, Default)]
pub struct FakeRelay {
    inner: Arc<RelayInner>,
}

impl FakeRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn energised(&self) -> bool {
        self.inner.energised.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Successful writes, including the one made when a controller opens the line.
    pub fn writes(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_access(&self) -> usize {
        self.inner.gauge.peak()
    }

    fn access<T>(&self, op: impl FnOnce(&RelayInner) -> T) -> T {
        self.inner.gauge.enter();
        // Widen the window so overlapping callers would be observed.
        std::thread::sleep(Duration::from_millis(1));
        let result = op(&self.inner);
        self.inner.gauge.leave();
        result
    }
}

impl RelayLine for FakeRelay {
    fn name(&self) -> &str {
        "fake-relay"
    }

    fn read(&mut self) -> Result<bool, ActuatorError> {
        self.access(|inner| {
            if inner.fail_reads.load(Ordering::SeqCst) {
                return Err(ActuatorError::Read(injected("read")));
            }
            Ok(inner.energised.load(Ordering::SeqCst))
        })
    }

    fn write(&mut self, energised: bool) -> Result<(), ActuatorError> {
        self.access(|inner| {
            if inner.fail_writes.load(Ordering::SeqCst) {
                return Err(ActuatorError::Write(injected("write")));
            }
            inner.energised.store(energised, Ordering::SeqCst);
            inner.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

#[derive(Default)]
struct CameraInner {
    captures: AtomicUsize,
    fail_next: AtomicUsize,
    delay: Mutex<Duration>,
    gauge: AccessGauge,
}

/// Camera returning [`TINY_JPEG`] on every capture unless told to fail.
#[derive(Clone, Default)]
pub struct FakeCamera {
    inner: Arc<CameraInner>,
}

impl FakeCamera {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` captures return [`CaptureError::NoFrame`].
    pub fn fail_next(&self, count: usize) {
        self.inner.fail_next.store(count, Ordering::SeqCst);
    }

    pub fn set_capture_delay(&self, delay: Duration) {
        *self.inner.delay.lock().unwrap() = delay;
    }

    /// Capture attempts started so far.
    pub fn captures(&self) -> usize {
        self.inner.captures.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_captures(&self) -> usize {
        self.inner.gauge.peak()
    }
}

impl FrameSource for FakeCamera {
    fn name(&self) -> &str {
        "fake-camera"
    }

    fn capture(&mut self) -> Result<CapturedFrame, CaptureError> {
        self.inner.gauge.enter();
        self.inner.captures.fetch_add(1, Ordering::SeqCst);
        let delay = *self.inner.delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        let fail = self
            .inner
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        self.inner.gauge.leave();
        if fail {
            Err(CaptureError::NoFrame)
        } else {
            Ok(CapturedFrame::Jpeg(Bytes::from_static(TINY_JPEG)))
        }
    }
}

/// Record sink that fails on chosen (1-based) append calls.
pub struct FlakySink {
    calls: usize,
    fail_on: Vec<usize>,
    written: Arc<Mutex<Vec<LogRecord>>>,
}

impl FlakySink {
    pub fn failing_on(calls: &[usize]) -> Self {
        Self {
            calls: 0,
            fail_on: calls.to_vec(),
            written: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn written(&self) -> Arc<Mutex<Vec<LogRecord>>> {
        self.written.clone()
    }
}

impl RecordSink for FlakySink {
    fn append(&mut self, record: &LogRecord) -> Result<(), LogWriteError> {
        self.calls += 1;
        if self.fail_on.contains(&self.calls) {
            return Err(LogWriteError::Append {
                path: "flaky-sink".to_string(),
                source: injected("append"),
            });
        }
        self.written.lock().unwrap().push(record.clone());
        Ok(())
    }
}
