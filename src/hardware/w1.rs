//! DS18B20 probes on the Linux 1-Wire sysfs interface.
//!
//! `w1_slave` looks like:
//!
//! ```text
//! 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
//! 72 01 4b 46 7f ff 0e 10 57 t=23125
//! ```

use super::TemperatureProbe;
use crate::error::SensorError;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const FAMILY_PREFIX: &str = "28-";
/// 85.000 C is what the scratchpad holds before the first conversion.
const RESET_MILLIDEGREES: i64 = 85_000;

#[derive(Debug)]
pub struct Ds18b20 {
    name: String,
    slave_path: PathBuf,
}

impl Ds18b20 {
    /// Fails only when the bus itself is missing; an absent slave is a read failure
    /// so a probe plugged in later starts reporting without a restart.
    pub fn open(devices_dir: &Path, sensor_id: &str) -> Result<Self, SensorError> {
        if !devices_dir.is_dir() {
            return Err(SensorError::BusUnavailable {
                path: devices_dir.display().to_string(),
            });
        }
        let sensor_id = sensor_id.trim();
        let name = if sensor_id.starts_with(FAMILY_PREFIX) {
            sensor_id.to_string()
        } else {
            format!("{FAMILY_PREFIX}{sensor_id}")
        };
        let slave_path = devices_dir.join(&name).join("w1_slave");
        Ok(Self { name, slave_path })
    }
}

impl TemperatureProbe for Ds18b20 {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_celsius(&mut self) -> Result<f64, SensorError> {
        let contents = match fs::read_to_string(&self.slave_path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(SensorError::NotPresent {
                    sensor: self.name.clone(),
                });
            }
            Err(err) => return Err(err.into()),
        };
        parse_w1_slave(&self.name, &contents)
    }
}

pub(crate) fn parse_w1_slave(sensor: &str, contents: &str) -> Result<f64, SensorError> {
    let mut lines = contents.lines();
    let malformed = |detail: &str| SensorError::Malformed {
        sensor: sensor.to_string(),
        detail: detail.to_string(),
    };

    let crc_line = lines.next().ok_or_else(|| malformed("empty"))?;
    if !crc_line.trim_end().ends_with("YES") {
        return Err(SensorError::Crc {
            sensor: sensor.to_string(),
        });
    }

    let data_line = lines.next().ok_or_else(|| malformed("missing data line"))?;
    let (_, raw) = data_line
        .rsplit_once("t=")
        .ok_or_else(|| malformed("missing t= field"))?;
    let millidegrees = raw
        .trim()
        .parse::<i64>()
        .map_err(|_| malformed("non-numeric temperature"))?;
    if millidegrees == RESET_MILLIDEGREES {
        return Err(SensorError::ResetValue {
            sensor: sensor.to_string(),
        });
    }
    Ok(millidegrees as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const GOOD: &str = "72 01 4b 46 7f ff 0e 10 57 : crc=57 YES\n72 01 4b 46 7f ff 0e 10 57 t=23125\n";

    #[test]
    fn parses_good_reading() {
        assert_eq!(parse_w1_slave("28-x", GOOD).unwrap(), 23.125);
    }

    #[test]
    fn parses_negative_reading() {
        let raw = "5e ff 4b 46 7f ff 0c 10 1c : crc=1c YES\n5e ff 4b 46 7f ff 0c 10 1c t=-10125\n";
        assert_eq!(parse_w1_slave("28-x", raw).unwrap(), -10.125);
    }

    #[test]
    fn rejects_crc_failure() {
        let raw = "72 01 4b 46 7f ff 0e 10 57 : crc=00 NO\n72 01 4b 46 7f ff 0e 10 57 t=23125\n";
        assert!(matches!(
            parse_w1_slave("28-x", raw),
            Err(SensorError::Crc { .. })
        ));
    }

    #[test]
    fn rejects_power_on_reset_value() {
        let raw = "50 05 4b 46 7f ff 0c 10 1c : crc=1c YES\n50 05 4b 46 7f ff 0c 10 1c t=85000\n";
        assert!(matches!(
            parse_w1_slave("28-x", raw),
            Err(SensorError::ResetValue { .. })
        ));
    }

    #[test]
    fn rejects_truncated_file() {
        assert!(matches!(
            parse_w1_slave("28-x", "72 01 : crc=57 YES\n"),
            Err(SensorError::Malformed { .. })
        ));
        assert!(matches!(
            parse_w1_slave("28-x", ""),
            Err(SensorError::Malformed { .. })
        ));
    }

    #[test]
    fn missing_bus_fails_open() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("w1");
        assert!(matches!(
            Ds18b20::open(&missing, "2029ab000999"),
            Err(SensorError::BusUnavailable { .. })
        ));
    }

    #[test]
    fn missing_slave_is_a_read_failure() {
        let dir = TempDir::new().unwrap();
        let mut probe = Ds18b20::open(dir.path(), "2029ab000999").unwrap();
        assert_eq!(probe.name(), "28-2029ab000999");
        assert!(matches!(
            probe.read_celsius(),
            Err(SensorError::NotPresent { .. })
        ));

        let slave_dir = dir.path().join("28-2029ab000999");
        fs::create_dir_all(&slave_dir).unwrap();
        fs::write(slave_dir.join("w1_slave"), GOOD).unwrap();
        assert_eq!(probe.read_celsius().unwrap(), 23.125);
    }
}
