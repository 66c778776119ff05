use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::internal::common::ids::{JobId, StepId};
use crate::internal::device::slot::DeviceSlot;

/// Which kind of step is being set up; each kind gets its own cgroup name.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[serde(try_from = "RawStep", into = "RawStep")]
pub enum StepKind {
    /// The batch script of a job.
    Batch,
    /// Bookkeeping step that adopts processes started outside of the workload manager.
    Extern,
    Numbered(StepId),
}

impl StepKind {
    /// Only ordinary steps get their own device rules, batch and extern steps
    /// inherit what the job allows.
    pub fn has_own_devices(&self) -> bool {
        matches!(self, StepKind::Numbered(_))
    }

    pub fn cgroup_name(&self) -> String {
        format!("step_{self}")
    }
}

impl Display for StepKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StepKind::Batch => f.write_str("batch"),
            StepKind::Extern => f.write_str("extern"),
            StepKind::Numbered(step_id) => step_id.fmt(f),
        }
    }
}

impl FromStr for StepKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "batch" => Ok(StepKind::Batch),
            "extern" => Ok(StepKind::Extern),
            _ => s
                .parse::<StepId>()
                .map(StepKind::Numbered)
                .map_err(|_| format!("Invalid step `{s}`, expected `batch`, `extern` or a number")),
        }
    }
}

#[derive(Serialize, Deserialize, Clone)]
#[serde(untagged)]
enum RawStep {
    Number(u32),
    Name(String),
}

impl TryFrom<RawStep> for StepKind {
    type Error = String;

    fn try_from(value: RawStep) -> Result<Self, Self::Error> {
        match value {
            RawStep::Number(step_id) => Ok(StepKind::Numbered(step_id.into())),
            RawStep::Name(name) => name.parse(),
        }
    }
}

impl From<StepKind> for RawStep {
    fn from(value: StepKind) -> Self {
        match value {
            StepKind::Numbered(step_id) => RawStep::Number(step_id.as_num()),
            kind => RawStep::Name(kind.to_string()),
        }
    }
}

fn current_pid() -> u32 {
    std::process::id()
}

/// Everything the orchestrator needs to know about the job step it sets up.
///
/// `job_devices` lists every GPU slot of the node with the job's allocation flags,
/// `step_devices` the same for the step.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StepContext {
    pub job_id: JobId,
    pub step: StepKind,
    pub uid: u32,
    pub gid: u32,
    /// Process that is attached to the step cgroup (the step daemon itself by default).
    #[serde(default = "current_pid")]
    pub pid: u32,
    #[serde(default)]
    pub job_devices: Vec<DeviceSlot>,
    #[serde(default)]
    pub step_devices: Vec<DeviceSlot>,
}

impl StepContext {
    /// All slots known on the node, used to build the device mapping.
    pub fn node_devices(&self) -> &[DeviceSlot] {
        if self.job_devices.is_empty() {
            &self.step_devices
        } else {
            &self.job_devices
        }
    }
}
