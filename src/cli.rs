use crate::config::{Config, HardwareMode};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "enclosure-monitor",
    version,
    about = "Enclosure temperature, camera and relay node"
)]
pub struct Args {
    /// Overrides ENCLOSURE_HTTP_BIND.
    #[arg(long)]
    pub http_bind: Option<String>,
    /// Overrides ENCLOSURE_LOG_DIR.
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
    /// Use simulated probes and relay regardless of ENCLOSURE_HARDWARE.
    #[arg(long, default_value_t = false)]
    pub simulate: bool,
}

impl Args {
    pub fn apply(&self, config: &mut Config) {
        if let Some(bind) = &self.http_bind {
            config.http_bind = bind.clone();
        }
        if let Some(dir) = &self.log_dir {
            config.log_dir = dir.clone();
        }
        if self.simulate {
            config.hardware = HardwareMode::Simulated;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_environment_config() {
        let args = Args::parse_from([
            "enclosure-monitor",
            "--http-bind",
            "127.0.0.1:6000",
            "--log-dir",
            "/var/log/enclosure",
            "--simulate",
        ]);
        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config.http_bind, "127.0.0.1:6000");
        assert_eq!(config.log_dir, PathBuf::from("/var/log/enclosure"));
        assert_eq!(config.hardware, HardwareMode::Simulated);
    }

    #[test]
    fn absent_flags_leave_config_alone() {
        let args = Args::parse_from(["enclosure-monitor"]);
        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config.http_bind, "0.0.0.0:5001");
        assert_eq!(config.hardware, HardwareMode::Linux);
    }
}
