use std::io;
use thiserror::Error;

/// A failed temperature read. Always transient from the sampler's point of view.
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("sensor {sensor} is not present on the bus")]
    NotPresent { sensor: String },
    #[error("sensor {sensor} failed its CRC check")]
    Crc { sensor: String },
    #[error("sensor {sensor} returned its power-on reset value")]
    ResetValue { sensor: String },
    #[error("sensor {sensor} returned a malformed reading: {detail}")]
    Malformed { sensor: String, detail: String },
    #[error("sensor bus unavailable at {path}")]
    BusUnavailable { path: String },
    #[error("sensor worker failed: {0}")]
    Worker(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("failed to set up output line {line}: {source}")]
    Setup {
        line: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to read output line: {0}")]
    Read(#[source] io::Error),
    #[error("failed to write output line: {0}")]
    Write(#[source] io::Error),
    #[error("output line reported unexpected value {0:?}")]
    UnexpectedValue(String),
    #[error("actuator unavailable")]
    Unavailable,
    #[error("actuator worker failed: {0}")]
    Worker(String),
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("camera returned no frame")]
    NoFrame,
    #[error("camera device {device} could not be opened: {source}")]
    Open {
        device: String,
        #[source]
        source: io::Error,
    },
    #[error("camera device {0} is not supported by this build")]
    Unsupported(String),
    #[error("camera lock poisoned")]
    Poisoned,
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("frame is not a JPEG still")]
    NotJpeg,
    #[error("frame buffer holds {actual} bytes, expected {expected} for {width}x{height} RGB")]
    Dimensions {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// Anything that stops a single streamer tick from producing an image.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),
    #[error("encode failed: {0}")]
    Encode(#[from] EncodeError),
    #[error("frame worker failed: {0}")]
    Worker(String),
}

#[derive(Debug, Error)]
pub enum LogWriteError {
    #[error("failed to append to {path}: {source}")]
    Append {
        path: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("camera is already streaming to session {holder}")]
    Busy { holder: String },
    #[error("session {0} is already attached")]
    AlreadyAttached(String),
    #[error("camera unavailable")]
    CameraUnavailable,
}
