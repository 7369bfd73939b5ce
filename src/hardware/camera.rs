//! Camera backends selected by the `camera_device` setting:
//!
//! - `testpattern`: synthetic RGB frames, no hardware needed
//! - `file:<path>`: the latest JPEG still written by an external capture tool
//! - `/dev/videoN`: V4L2 MJPEG capture (requires the `v4l2` feature)

use super::{CapturedFrame, FrameSource};
use crate::config::Config;
use crate::error::CaptureError;
use bytes::Bytes;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

const TEST_PATTERN: &str = "testpattern";
const FILE_PREFIX: &str = "file:";

pub fn open(config: &Config) -> Result<Box<dyn FrameSource>, CaptureError> {
    let device = config.camera_device.trim();
    if device == TEST_PATTERN {
        return Ok(Box::new(TestPatternCamera::new(
            config.camera_width,
            config.camera_height,
        )));
    }
    if let Some(path) = device.strip_prefix(FILE_PREFIX) {
        return SnapshotCamera::open(PathBuf::from(path))
            .map(|camera| Box::new(camera) as Box<dyn FrameSource>);
    }
    open_device(device, config.camera_width, config.camera_height)
}

#[cfg(feature = "v4l2")]
fn open_device(
    device: &str,
    width: u32,
    height: u32,
) -> Result<Box<dyn FrameSource>, CaptureError> {
    v4l2::V4l2Camera::open(device, width, height)
        .map(|camera| Box::new(camera) as Box<dyn FrameSource>)
}

#[cfg(not(feature = "v4l2"))]
fn open_device(
    device: &str,
    _width: u32,
    _height: u32,
) -> Result<Box<dyn FrameSource>, CaptureError> {
    Err(CaptureError::Unsupported(device.to_string()))
}

/// Moving vertical bar over a gradient.
pub struct TestPatternCamera {
    width: u32,
    height: u32,
    frame: u32,
}

impl TestPatternCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            frame: 0,
        }
    }
}

impl FrameSource for TestPatternCamera {
    fn name(&self) -> &str {
        TEST_PATTERN
    }

    fn capture(&mut self) -> Result<CapturedFrame, CaptureError> {
        let (width, height) = (u64::from(self.width), u64::from(self.height));
        let bar = u64::from(self.frame) % width;
        let bar_width = (width / 16).max(1);
        let mut pixels = Vec::with_capacity(self.width as usize * self.height as usize * 3);
        for y in 0..height {
            let g = (y * 255 / height) as u8;
            for x in 0..width {
                if x >= bar && x < bar + bar_width {
                    pixels.extend_from_slice(&[255, 255, 255]);
                } else {
                    let r = (x * 255 / width) as u8;
                    pixels.extend_from_slice(&[r, g, 96]);
                }
            }
        }
        self.frame = self.frame.wrapping_add(4);
        Ok(CapturedFrame::Rgb {
            width: self.width,
            height: self.height,
            pixels,
        })
    }
}

/// Reads whatever still an external tool (e.g. `rpicam-still --timelapse`) last wrote.
pub struct SnapshotCamera {
    name: String,
    path: PathBuf,
}

impl SnapshotCamera {
    pub fn open(path: PathBuf) -> Result<Self, CaptureError> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        if !parent.is_dir() {
            return Err(CaptureError::Open {
                device: path.display().to_string(),
                source: std::io::Error::new(ErrorKind::NotFound, "snapshot directory missing"),
            });
        }
        Ok(Self {
            name: format!("{FILE_PREFIX}{}", path.display()),
            path,
        })
    }
}

impl FrameSource for SnapshotCamera {
    fn name(&self) -> &str {
        &self.name
    }

    fn capture(&mut self) -> Result<CapturedFrame, CaptureError> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Err(CaptureError::NoFrame),
            Ok(bytes) => Ok(CapturedFrame::Jpeg(Bytes::from(bytes))),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(CaptureError::NoFrame),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(feature = "v4l2")]
mod v4l2 {
    use super::{CapturedFrame, FrameSource};
    use crate::error::CaptureError;
    use bytes::Bytes;
    use v4l::buffer::Type;
    use v4l::io::mmap::Stream;
    use v4l::io::traits::CaptureStream;
    use v4l::video::Capture;
    use v4l::{Device, FourCC};

    const BUFFER_COUNT: u32 = 4;

    pub struct V4l2Camera {
        name: String,
        stream: Stream<'static>,
        _device: Device,
    }

    impl V4l2Camera {
        pub fn open(path: &str, width: u32, height: u32) -> Result<Self, CaptureError> {
            let open_err = |source| CaptureError::Open {
                device: path.to_string(),
                source,
            };
            let device = Device::with_path(path).map_err(open_err)?;

            let mjpg = FourCC::new(b"MJPG");
            let mut format = device.format().map_err(open_err)?;
            format.width = width;
            format.height = height;
            format.fourcc = mjpg;
            let format = device.set_format(&format).map_err(open_err)?;
            if format.fourcc != mjpg {
                return Err(CaptureError::Unsupported(format!(
                    "{path} does not offer MJPG (got {})",
                    format.fourcc
                )));
            }
            tracing::info!(device = path, width = format.width, height = format.height, "v4l2 camera opened");

            let stream =
                Stream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT).map_err(open_err)?;
            Ok(Self {
                name: path.to_string(),
                stream,
                _device: device,
            })
        }
    }

    impl FrameSource for V4l2Camera {
        fn name(&self) -> &str {
            &self.name
        }

        fn capture(&mut self) -> Result<CapturedFrame, CaptureError> {
            let (buf, meta) = self.stream.next()?;
            let used = (meta.bytesused as usize).min(buf.len());
            if used == 0 {
                return Err(CaptureError::NoFrame);
            }
            Ok(CapturedFrame::Jpeg(Bytes::copy_from_slice(&buf[..used])))
        }
    }
}
