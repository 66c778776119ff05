use std::path::Path;

use crate::internal::access::decision::DeviceTarget;
use crate::internal::common::error::fatal;
use crate::internal::device::number::DeviceInspector;

/// Reads the allowed devices file and returns the devices every job and step may use.
///
/// Each line is a glob pattern (e.g. `/dev/sd*`); every matching device node is allowed.
/// Blank lines and `#` comments are ignored, and so are matches that are not device nodes.
/// The file is mandatory.
pub fn load_allowed_devices(
    path: &Path,
    inspector: &dyn DeviceInspector,
) -> crate::Result<Vec<DeviceTarget>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(error) => {
            return fatal(format!(
                "Allowed devices file {} cannot be read ({error}), it is needed for constraining devices",
                path.display()
            ));
        }
    };

    let mut targets: Vec<DeviceTarget> = Vec::new();
    for pattern in content
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
    {
        let mut matched = false;
        for entry in glob::glob(pattern)? {
            let device_path = match entry {
                Ok(device_path) => device_path,
                Err(error) => {
                    log::debug!("Cannot access {}: {error}", error.path().display());
                    continue;
                }
            };
            matched = true;
            match inspector.device_number(&device_path) {
                Some(device) => {
                    let target = DeviceTarget::Device(device);
                    if !targets.contains(&target) {
                        targets.push(target);
                    }
                }
                None => log::debug!(
                    "Allowed device {} is not a device node, skipping",
                    device_path.display()
                ),
            }
        }
        if !matched {
            log::debug!("Device {pattern} does not exist");
        }
    }
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::load_allowed_devices;
    use crate::internal::access::decision::DeviceTarget;
    use crate::internal::device::number::{DeviceNumber, SysDeviceInspector};
    use tempfile::TempDir;

    #[test]
    fn test_load_allowed_devices() {
        let dir = TempDir::with_prefix("allowed").unwrap();
        std::fs::write(dir.path().join("regular"), "").unwrap();
        let file = dir.path().join("cgroup_allowed_devices_file.conf");
        std::fs::write(
            &file,
            format!(
                "# system devices\n/dev/null\n\n/dev/zer[o]\n/dev/null\n/nonexistent/device*\n{}/reg*\n",
                dir.path().display()
            ),
        )
        .unwrap();

        let targets = load_allowed_devices(&file, &SysDeviceInspector).unwrap();
        assert_eq!(
            targets,
            vec![
                DeviceTarget::Device(DeviceNumber::char(1, 3)),
                DeviceTarget::Device(DeviceNumber::char(1, 5)),
            ]
        );
    }

    #[test]
    fn test_missing_allowed_devices_file() {
        let dir = TempDir::with_prefix("allowed").unwrap();
        let error = load_allowed_devices(&dir.path().join("missing.conf"), &SysDeviceInspector)
            .unwrap_err();
        assert!(error.is_fatal());
    }

    #[test]
    fn test_invalid_pattern() {
        let dir = TempDir::with_prefix("allowed").unwrap();
        let file = dir.path().join("allowed.conf");
        std::fs::write(&file, "/dev/[\n").unwrap();
        assert!(
            load_allowed_devices(&file, &SysDeviceInspector)
                .unwrap_err()
                .is_fatal()
        );
    }
}
