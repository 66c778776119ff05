use std::path::Path;

use devmap::orchestrator::StepContext;

use crate::common::error::error;

/// Reads the allocation record that the step daemon hands over for the step.
///
/// ```json
/// {
///   "job_id": 42, "step": 0, "uid": 1000, "gid": 100, "pid": 31337,
///   "job_devices": [{"path": "/dev/nvidia0", "index": 0, "allocated": true}, ...],
///   "step_devices": [...]
/// }
/// ```
pub fn load_allocation(path: &Path) -> crate::Result<StepContext> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => return error(format!("Cannot read allocation {}: {e}", path.display())),
    };
    parse_allocation(&content)
}

pub fn parse_allocation(content: &str) -> crate::Result<StepContext> {
    let ctx: StepContext = serde_json::from_str(content)?;
    if !ctx.step.has_own_devices() && !ctx.step_devices.is_empty() {
        log::warn!(
            "Step {}.{} inherits the devices of its job, ignoring its own device list",
            ctx.job_id,
            ctx.step
        );
    }
    Ok(ctx)
}
