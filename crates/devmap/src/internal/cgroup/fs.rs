use std::fs::File;
use std::io::ErrorKind;
use std::path::PathBuf;

use nix::unistd::{Gid, Uid, chown};

use crate::internal::cgroup::{CgroupTree, Instantiated};

pub const DEFAULT_DEVICES_MOUNTPOINT: &str = "/sys/fs/cgroup/devices";

const PROCS_FILE: &str = "cgroup.procs";

/// cgroup v1 hierarchy mounted on the filesystem (typically the `devices` controller).
///
/// ```text
/// /sys/fs/cgroup/devices/          <- mountpoint
/// └── slurm/                       <- root scope, locked while steps are set up
///     └── uid_1000/
///         └── job_42/
///             ├── devices.allow
///             ├── devices.deny
///             └── step_0/
///                 └── cgroup.procs
/// ```
#[derive(Debug, Clone)]
pub struct FsCgroupTree {
    mountpoint: PathBuf,
}

impl FsCgroupTree {
    pub fn new(mountpoint: PathBuf) -> Self {
        Self { mountpoint }
    }

    fn group_path(&self, path: &str) -> PathBuf {
        self.mountpoint.join(path.trim_start_matches('/'))
    }
}

/// flock(2) held on the group directory.
pub struct FsCgroupLock {
    file: File,
    path: PathBuf,
}

impl Drop for FsCgroupLock {
    fn drop(&mut self) {
        if let Err(error) = fs2::FileExt::unlock(&self.file) {
            log::warn!("Cannot unlock cgroup {}: {error}", self.path.display());
        }
    }
}

impl CgroupTree for FsCgroupTree {
    type Lock = FsCgroupLock;

    fn instantiate(&self, path: &str, owner: Option<(u32, u32)>) -> crate::Result<Instantiated> {
        let group_path = self.group_path(path);
        match std::fs::create_dir(&group_path) {
            Ok(()) => {
                if let Some((uid, gid)) = owner {
                    chown(
                        &group_path,
                        Some(Uid::from_raw(uid)),
                        Some(Gid::from_raw(gid)),
                    )
                    .map_err(|error| {
                        crate::Error::CgroupError(format!(
                            "Cannot change owner of cgroup {}: {error}",
                            group_path.display()
                        ))
                    })?;
                }
                Ok(Instantiated::Created)
            }
            Err(error) if error.kind() == ErrorKind::AlreadyExists => Ok(Instantiated::Existing),
            Err(error) => Err(crate::Error::CgroupError(format!(
                "Cannot create cgroup {}: {error}",
                group_path.display()
            ))),
        }
    }

    fn lock(&self, path: &str) -> crate::Result<Self::Lock> {
        let group_path = self.group_path(path);
        let file = File::open(&group_path).map_err(|error| {
            crate::Error::LockError(format!("{}: {error}", group_path.display()))
        })?;
        fs2::FileExt::lock_exclusive(&file).map_err(|error| {
            crate::Error::LockError(format!("{}: {error}", group_path.display()))
        })?;
        Ok(FsCgroupLock {
            file,
            path: group_path,
        })
    }

    fn set_param(&self, path: &str, name: &str, value: &str) -> crate::Result<()> {
        let param_path = self.group_path(path).join(name);
        std::fs::write(&param_path, value).map_err(|error| {
            crate::Error::CgroupError(format!(
                "Cannot write `{value}` to {}: {error}",
                param_path.display()
            ))
        })
    }

    fn add_pids(&self, path: &str, pids: &[u32]) -> crate::Result<()> {
        // The kernel accepts a single pid per write
        for pid in pids {
            self.set_param(path, PROCS_FILE, &pid.to_string())?;
        }
        Ok(())
    }

    fn pids(&self, path: &str) -> crate::Result<Vec<u32>> {
        let content = match std::fs::read_to_string(self.group_path(path).join(PROCS_FILE)) {
            Ok(content) => content,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };
        Ok(content
            .lines()
            .filter_map(|line| line.trim().parse::<u32>().ok())
            .collect())
    }

    fn delete(&self, path: &str) -> crate::Result<()> {
        let group_path = self.group_path(path);
        // rmdir, the kernel removes the control files itself
        std::fs::remove_dir(&group_path).map_err(|error| {
            crate::Error::CgroupError(format!(
                "Cannot remove cgroup {}: {error}",
                group_path.display()
            ))
        })
    }
}
