use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::internal::device::number::{DeviceKind, DeviceNumber};

/// Access bits written with every rule (read, write, mknod).
const DEVICE_ACCESS: &str = "rwm";

#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum AccessAction {
    Allow,
    Deny,
}

impl AccessAction {
    /// Name of the cgroup control file that receives the rule.
    pub fn param_name(&self) -> &'static str {
        match self {
            AccessAction::Allow => "devices.allow",
            AccessAction::Deny => "devices.deny",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum AccessScope {
    Job,
    Step,
}

impl Display for AccessScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessScope::Job => f.write_str("job"),
            AccessScope::Step => f.write_str("step"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DeviceTarget {
    Device(DeviceNumber),
    /// Every minor of a major number.
    Class { kind: DeviceKind, major: u32 },
}

impl Display for DeviceTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceTarget::Device(device) => write!(f, "{device} {DEVICE_ACCESS}"),
            DeviceTarget::Class { kind, major } => {
                write!(f, "{} {major}:* {DEVICE_ACCESS}", kind.as_char())
            }
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq)]
pub struct AccessDecision {
    pub target: DeviceTarget,
    pub action: AccessAction,
    pub scope: AccessScope,
}

#[cfg(test)]
mod tests {
    use super::{AccessAction, DeviceTarget};
    use crate::internal::device::number::{DeviceKind, DeviceNumber};

    #[test]
    fn test_target_format() {
        assert_eq!(
            DeviceTarget::Device(DeviceNumber::char(195, 0)).to_string(),
            "c 195:0 rwm"
        );
        assert_eq!(
            DeviceTarget::Class {
                kind: DeviceKind::Block,
                major: 8
            }
            .to_string(),
            "b 8:* rwm"
        );
    }

    #[test]
    fn test_action_files() {
        assert_eq!(AccessAction::Allow.param_name(), "devices.allow");
        assert_eq!(AccessAction::Deny.param_name(), "devices.deny");
    }
}
