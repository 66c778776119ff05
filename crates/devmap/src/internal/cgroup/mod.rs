//! Primitives of a cgroup hierarchy that the device orchestration relies on.
//!
//! Paths are relative to the root of the hierarchy, `""` being the root itself.

pub(crate) mod fs;

use std::time::{Duration, Instant};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Instantiated {
    Created,
    Existing,
}

pub trait CgroupTree {
    /// Exclusive lock of a group, released when dropped.
    type Lock;

    /// Creates the group. An already existing group is not an error.
    /// `owner` (uid, gid) is applied to newly created groups.
    fn instantiate(&self, path: &str, owner: Option<(u32, u32)>) -> crate::Result<Instantiated>;

    fn lock(&self, path: &str) -> crate::Result<Self::Lock>;

    fn set_param(&self, path: &str, name: &str, value: &str) -> crate::Result<()>;

    /// Moves processes into the group.
    fn add_pids(&self, path: &str, pids: &[u32]) -> crate::Result<()>;

    /// Processes currently in the group; a group that does not exist has none.
    fn pids(&self, path: &str) -> crate::Result<Vec<u32>>;

    /// Removes an empty group.
    fn delete(&self, path: &str) -> crate::Result<()>;

    /// Waits until no process is left in the group.
    fn wait_vacated(&self, path: &str, poll: Duration, timeout: Duration) -> crate::Result<()> {
        let start = Instant::now();
        loop {
            let pids = self.pids(path)?;
            if pids.is_empty() {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(crate::Error::CgroupError(format!(
                    "Processes {pids:?} did not leave cgroup {path} within {timeout:?}"
                )));
            }
            log::debug!("Waiting for processes {pids:?} to leave cgroup {path}");
            std::thread::sleep(poll);
        }
    }
}
