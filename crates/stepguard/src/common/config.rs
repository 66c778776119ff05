use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use devmap::cgroup::DEFAULT_DEVICES_MOUNTPOINT;
use devmap::device::{DEFAULT_DEVICE_PREFIX, DEFAULT_DRIVER_ROOT};

use crate::common::error::GuardError;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/stepguard/stepguard.toml";

/// Replaced by the short hostname in `root_cgroup`, for nodes that share a hierarchy.
const HOSTNAME_PLACEHOLDER: &str = "%n";

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GuardConfig {
    /// Mountpoint of the cgroup v1 `devices` controller.
    pub cgroup_mountpoint: PathBuf,
    /// Group under the mountpoint that holds all user, job and step groups.
    pub root_cgroup: String,
    /// Devices (glob patterns, one per line) every job may always use.
    pub allowed_devices_file: PathBuf,
    /// Where the host-wide device mapping is kept.
    pub state_dir: PathBuf,
    pub driver_root: PathBuf,
    pub device_prefix: String,
    pub vacate_timeout_secs: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            cgroup_mountpoint: DEFAULT_DEVICES_MOUNTPOINT.into(),
            root_cgroup: "slurm".to_string(),
            allowed_devices_file: "/etc/stepguard/cgroup_allowed_devices_file.conf".into(),
            state_dir: "/var/spool/stepguard".into(),
            driver_root: DEFAULT_DRIVER_ROOT.into(),
            device_prefix: DEFAULT_DEVICE_PREFIX.to_string(),
            vacate_timeout_secs: 30,
        }
    }
}

impl GuardConfig {
    /// Loads the configuration file; a file that does not exist means the defaults.
    pub fn load(path: &Path) -> crate::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let config = Self::parse(&content).map_err(|error| match error {
                    GuardError::ConfigError(message) => {
                        GuardError::ConfigError(format!("{}: {message}", path.display()))
                    }
                    error => error,
                })?;
                log::debug!("Configuration loaded from {}: {config:?}", path.display());
                Ok(config)
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                log::info!(
                    "Configuration file {} not found, using defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(error) => Err(GuardError::ConfigError(format!(
                "Cannot read {}: {error}",
                path.display()
            ))),
        }
    }

    pub fn parse(content: &str) -> crate::Result<Self> {
        let config: GuardConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> crate::Result<()> {
        if self.root_cgroup.trim_matches('/').is_empty() {
            return Err(GuardError::ConfigError(
                "root_cgroup cannot be empty".to_string(),
            ));
        }
        if self.device_prefix.is_empty() {
            return Err(GuardError::ConfigError(
                "device_prefix cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn root_cgroup_for(&self, hostname: &str) -> String {
        self.root_cgroup.replace(HOSTNAME_PLACEHOLDER, hostname)
    }

    pub fn root_cgroup(&self) -> String {
        let hostname = gethostname::gethostname();
        let hostname = hostname.to_string_lossy();
        // Short name, as the workload manager knows the node
        let short = hostname.split('.').next().unwrap_or(&hostname);
        self.root_cgroup_for(short)
    }

    pub fn vacate_timeout(&self) -> Duration {
        Duration::from_secs(self.vacate_timeout_secs)
    }
}
