use crate::error::EncodeError;
use crate::hardware::CapturedFrame;
use crate::readings::TemperatureReading;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// One streamer tick as delivered to a viewer's transport.
#[derive(Debug, Clone)]
pub struct FrameMessage {
    pub internal_temp: String,
    pub external_temp: String,
    /// JPEG still.
    pub image: Bytes,
}

impl FrameMessage {
    pub fn new(reading: &TemperatureReading, image: Bytes) -> Self {
        Self {
            internal_temp: reading.internal.formatted(),
            external_temp: reading.external.formatted(),
            image,
        }
    }
}

/// Turns captured frames into JPEG stills.
#[derive(Debug, Clone, Copy)]
pub struct FrameEncoder {
    quality: u8,
}

impl FrameEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn encode(&self, frame: CapturedFrame) -> Result<Bytes, EncodeError> {
        match frame {
            CapturedFrame::Jpeg(bytes) => {
                if bytes.len() < JPEG_SOI.len() || bytes[..2] != JPEG_SOI {
                    return Err(EncodeError::NotJpeg);
                }
                Ok(bytes)
            }
            CapturedFrame::Rgb {
                width,
                height,
                pixels,
            } => {
                let expected = width as usize * height as usize * 3;
                if width == 0 || height == 0 || pixels.len() != expected {
                    return Err(EncodeError::Dimensions {
                        width,
                        height,
                        expected,
                        actual: pixels.len(),
                    });
                }
                let mut out = Vec::with_capacity(expected / 8);
                JpegEncoder::new_with_quality(&mut out, self.quality).encode(
                    &pixels,
                    width,
                    height,
                    ExtendedColorType::Rgb8,
                )?;
                Ok(Bytes::from(out))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readings::SharedReadings;
    use chrono::Utc;

    #[test]
    fn encodes_rgb_to_jpeg() {
        let encoder = FrameEncoder::new(75);
        let frame = CapturedFrame::Rgb {
            width: 16,
            height: 16,
            pixels: vec![128; 16 * 16 * 3],
        };
        let jpeg = encoder.encode(frame).unwrap();
        assert_eq!(&jpeg[..2], &JPEG_SOI);
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFFu8, 0xD9]);
    }

    #[test]
    fn rejects_short_rgb_buffer() {
        let encoder = FrameEncoder::new(75);
        let frame = CapturedFrame::Rgb {
            width: 4,
            height: 4,
            pixels: vec![0; 10],
        };
        assert!(matches!(
            encoder.encode(frame),
            Err(EncodeError::Dimensions { expected: 48, actual: 10, .. })
        ));
    }

    #[test]
    fn jpeg_passthrough_checks_marker() {
        let encoder = FrameEncoder::new(75);
        let still = Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xE0, 0xFF, 0xD9]);
        assert_eq!(encoder.encode(CapturedFrame::Jpeg(still.clone())).unwrap(), still);
        assert!(matches!(
            encoder.encode(CapturedFrame::Jpeg(Bytes::from_static(b"PNG"))),
            Err(EncodeError::NotJpeg)
        ));
    }

    #[test]
    fn message_carries_formatted_temperatures() {
        let readings = SharedReadings::new();
        readings.set(30.04, -2.26, Utc::now());
        let message = FrameMessage::new(&readings.get(), Bytes::from_static(b"img"));
        assert_eq!(message.internal_temp, "30.0");
        assert_eq!(message.external_temp, "-2.3");
    }
}
