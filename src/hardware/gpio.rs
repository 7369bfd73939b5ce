//! Relay output over the legacy GPIO sysfs interface.

use super::RelayLine;
use crate::error::ActuatorError;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// udev may take a moment to fix permissions on a freshly exported line.
const EXPORT_SETTLE_ATTEMPTS: u32 = 20;
const EXPORT_SETTLE_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug)]
pub struct SysfsRelay {
    name: String,
    value_path: PathBuf,
}

impl SysfsRelay {
    /// Exports the line if needed and configures it as an output driven low.
    pub fn open(sysfs_dir: &Path, line: u32) -> Result<Self, ActuatorError> {
        let name = format!("gpio{line}");
        let line_dir = sysfs_dir.join(&name);
        let setup_err = |source| ActuatorError::Setup {
            line: name.clone(),
            source,
        };

        if !line_dir.exists() {
            fs::write(sysfs_dir.join("export"), line.to_string()).map_err(setup_err)?;
        }

        // "low" sets output direction and drives the line low atomically.
        let direction_path = line_dir.join("direction");
        let mut attempt = 0;
        loop {
            match fs::write(&direction_path, "low") {
                Ok(()) => break,
                Err(err) if attempt + 1 < EXPORT_SETTLE_ATTEMPTS => {
                    tracing::debug!(line = %name, error = %err, "waiting for exported gpio line");
                    attempt += 1;
                    thread::sleep(EXPORT_SETTLE_DELAY);
                }
                Err(err) => return Err(setup_err(err)),
            }
        }

        Ok(Self {
            value_path: line_dir.join("value"),
            name,
        })
    }
}

impl RelayLine for SysfsRelay {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self) -> Result<bool, ActuatorError> {
        let raw = fs::read_to_string(&self.value_path).map_err(ActuatorError::Read)?;
        match raw.trim() {
            "1" => Ok(true),
            "0" => Ok(false),
            other => Err(ActuatorError::UnexpectedValue(other.to_string())),
        }
    }

    fn write(&mut self, energised: bool) -> Result<(), ActuatorError> {
        let value = if energised { "1" } else { "0" };
        fs::write(&self.value_path, value).map_err(ActuatorError::Write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fake_exported_line(dir: &Path, line: u32) -> PathBuf {
        let line_dir = dir.join(format!("gpio{line}"));
        fs::create_dir_all(&line_dir).unwrap();
        fs::write(line_dir.join("direction"), "in").unwrap();
        fs::write(line_dir.join("value"), "1").unwrap();
        line_dir
    }

    #[test]
    fn open_configures_output_low() {
        let dir = TempDir::new().unwrap();
        let line_dir = fake_exported_line(dir.path(), 24);

        let mut relay = SysfsRelay::open(dir.path(), 24).unwrap();
        assert_eq!(relay.name(), "gpio24");
        assert_eq!(fs::read_to_string(line_dir.join("direction")).unwrap(), "low");

        relay.write(true).unwrap();
        assert!(relay.read().unwrap());
        relay.write(false).unwrap();
        assert!(!relay.read().unwrap());
    }

    #[test]
    fn garbage_value_is_reported() {
        let dir = TempDir::new().unwrap();
        let line_dir = fake_exported_line(dir.path(), 5);
        let mut relay = SysfsRelay::open(dir.path(), 5).unwrap();
        fs::write(line_dir.join("value"), "x").unwrap();
        assert!(matches!(relay.read(), Err(ActuatorError::UnexpectedValue(_))));
    }

    #[test]
    fn missing_sysfs_fails_setup() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("gpio");
        assert!(matches!(
            SysfsRelay::open(&missing, 24),
            Err(ActuatorError::Setup { .. })
        ));
    }
}
