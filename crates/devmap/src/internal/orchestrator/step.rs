use std::cell::{Cell, OnceCell};
use std::time::Duration;

use crate::internal::access::decision::{AccessDecision, AccessScope, DeviceTarget};
use crate::internal::access::plan::{AccessPlan, ProgramReport};
use crate::internal::cgroup::{CgroupTree, Instantiated};
use crate::internal::device::bus::BusResolver;
use crate::internal::device::identity::DeviceIdentityResolver;
use crate::internal::device::mapping::DeviceMappingStore;
use crate::internal::device::number::DeviceInspector;
use crate::internal::device::slot::DeviceSlot;
use crate::internal::orchestrator::context::StepContext;
use crate::internal::orchestrator::paths::ScopePaths;

const VACATE_POLL_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_VACATE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SetupState {
    Uninitialized,
    RootLocked,
    UserReady,
    JobReady,
    StepReady,
    Attached,
    /// Setup failed and the scopes created by it were removed.
    Released,
}

#[derive(Debug, Default, Clone)]
pub struct SetupReport {
    pub job: ProgramReport,
    /// `None` for batch and extern steps, which do not program devices of their own.
    pub step: Option<ProgramReport>,
    /// Scopes that did not exist before the setup.
    pub created: Vec<String>,
}

impl SetupReport {
    pub fn failed_writes(&self) -> usize {
        self.job.failed + self.step.map(|r| r.failed).unwrap_or(0)
    }
}

/// Sets up (and tears down) the device cgroups of a single job step.
///
/// The root scope is locked for the whole setup: a cleanup agent running between steps
/// may remove the hierarchy, and it has to take the same lock. Once the controlling
/// process is attached to the step scope the scope cannot be reaped as empty anymore and
/// the lock is released.
pub struct DeviceCgroupOrchestrator<'a, C: CgroupTree> {
    tree: C,
    root: String,
    defaults: Vec<DeviceTarget>,
    mapping: &'a DeviceMappingStore,
    buses: &'a dyn BusResolver,
    inspector: &'a dyn DeviceInspector,
    vacate_timeout: Duration,
    paths: OnceCell<ScopePaths>,
    state: Cell<SetupState>,
}

impl<'a, C: CgroupTree> DeviceCgroupOrchestrator<'a, C> {
    pub fn new(
        tree: C,
        root: String,
        defaults: Vec<DeviceTarget>,
        mapping: &'a DeviceMappingStore,
        buses: &'a dyn BusResolver,
        inspector: &'a dyn DeviceInspector,
    ) -> Self {
        Self {
            tree,
            root,
            defaults,
            mapping,
            buses,
            inspector,
            vacate_timeout: DEFAULT_VACATE_TIMEOUT,
            paths: OnceCell::new(),
            state: Cell::new(SetupState::Uninitialized),
        }
    }

    pub fn with_vacate_timeout(mut self, timeout: Duration) -> Self {
        self.vacate_timeout = timeout;
        self
    }

    pub fn state(&self) -> SetupState {
        self.state.get()
    }

    /// Paths are computed for the first step context and kept for the lifetime of the
    /// orchestrator.
    pub fn paths(&self, ctx: &StepContext) -> &ScopePaths {
        self.paths.get_or_init(|| {
            let paths = ScopePaths::new(&self.root, ctx);
            log::debug!("Device cgroup of step {}.{} is {}", ctx.job_id, ctx.step, paths.step);
            paths
        })
    }

    pub fn create(&self, ctx: &StepContext) -> crate::Result<SetupReport> {
        let paths = self.paths(ctx);

        self.tree.instantiate(&self.root, None).inspect_err(|_| {
            log::error!("Unable to create root devices cgroup");
        })?;
        let lock = self.tree.lock(&self.root).inspect_err(|_| {
            log::error!("Unable to lock root devices cgroup");
        })?;
        self.state.set(SetupState::RootLocked);
        log::debug!("Managing devices for job {}", ctx.job_id);

        let mut created = Vec::new();
        let result = self.setup_locked(ctx, paths, &mut created);
        if let Err(error) = &result {
            log::error!(
                "Device cgroup setup of step {}.{} failed: {error}",
                ctx.job_id,
                ctx.step
            );
            self.unwind(&created);
            self.state.set(SetupState::Released);
        }
        drop(lock);

        result.map(|(job, step)| SetupReport { job, step, created })
    }

    fn setup_locked(
        &self,
        ctx: &StepContext,
        paths: &ScopePaths,
        created: &mut Vec<String>,
    ) -> crate::Result<(ProgramReport, Option<ProgramReport>)> {
        // User and job scopes may already exist for other steps
        self.instantiate_scope(&paths.user, None, created)?;
        self.state.set(SetupState::UserReady);

        self.instantiate_scope(&paths.job, None, created)?;
        let job_report = self.program(ctx, AccessScope::Job, &paths.job, &ctx.job_devices)?;
        self.state.set(SetupState::JobReady);

        // The user owns the step scope so that task cgroups can be created below it
        self.instantiate_scope(&paths.step, Some((ctx.uid, ctx.gid)), created)?;
        let step_report = if ctx.step.has_own_devices() {
            Some(self.program(ctx, AccessScope::Step, &paths.step, &ctx.step_devices)?)
        } else {
            None
        };
        self.state.set(SetupState::StepReady);

        self.tree
            .add_pids(&paths.step, &[ctx.pid])
            .inspect_err(|_| {
                log::error!(
                    "Unable to add process {} to devices cgroup {}",
                    ctx.pid,
                    paths.step
                );
            })?;
        self.state.set(SetupState::Attached);
        Ok((job_report, step_report))
    }

    fn instantiate_scope(
        &self,
        path: &str,
        owner: Option<(u32, u32)>,
        created: &mut Vec<String>,
    ) -> crate::Result<()> {
        if self.tree.instantiate(path, owner)? == Instantiated::Created {
            created.push(path.to_string());
        }
        Ok(())
    }

    /// Removes scopes created by a failed setup, deepest first.
    fn unwind(&self, created: &[String]) {
        for path in created.iter().rev() {
            if let Err(error) = self.tree.delete(path) {
                log::debug!("Unable to remove devices cgroup {path}: {error}");
            }
        }
    }

    /// Resolves every slot and writes the resulting plan into the scope.
    ///
    /// All decisions are made before the first write, so a fatal mapping problem leaves
    /// the scope untouched.
    fn program(
        &self,
        ctx: &StepContext,
        scope: AccessScope,
        path: &str,
        devices: &[DeviceSlot],
    ) -> crate::Result<ProgramReport> {
        let decisions = self.decide_all(ctx, scope, devices)?;
        let plan = AccessPlan::new(scope, &self.defaults, decisions);
        for target in &self.defaults {
            log::debug!("Default access allowed to device {target} for {scope}");
        }
        let report = plan.apply(&self.tree, path);
        if report.failed > 0 {
            log::error!(
                "{} of {} device rules could not be written for {scope} ({path})",
                report.failed,
                plan.writes().len()
            );
        }
        Ok(report)
    }

    fn decide_all(
        &self,
        ctx: &StepContext,
        scope: AccessScope,
        devices: &[DeviceSlot],
    ) -> crate::Result<Vec<AccessDecision>> {
        if devices.is_empty() {
            return Ok(Vec::new());
        }
        let table = self.mapping.build_or_load(ctx.node_devices(), self.buses)?;
        let resolver = DeviceIdentityResolver::new(table, self.buses, self.inspector);
        let mut decisions = Vec::with_capacity(devices.len());
        for slot in devices {
            if let Some(decision) = resolver.decide(slot, scope)? {
                decisions.push(decision);
            }
        }
        Ok(decisions)
    }

    /// Adds another process to the step scope.
    pub fn add_pid(&self, ctx: &StepContext, pid: u32) -> crate::Result<()> {
        let paths = self.paths(ctx);
        self.tree.add_pids(&paths.step, &[pid])
    }

    /// Removes the step, job and user scopes when the step ends.
    ///
    /// Job and user scopes are usually still used by other steps, so failing to delete
    /// them is expected and not an error.
    pub fn teardown(&self, ctx: &StepContext) -> crate::Result<()> {
        let paths = self.paths(ctx);

        self.tree.instantiate(&self.root, None).inspect_err(|_| {
            log::error!("Unable to create root devices cgroup");
        })?;
        let _lock = self.tree.lock(&self.root).inspect_err(|_| {
            log::error!("Unable to lock root devices cgroup");
        })?;

        // Leave the step scope first, otherwise it can never become empty
        if let Err(error) = self.tree.add_pids(&self.root, &[ctx.pid]) {
            log::error!("Unable to move process {} to root devices cgroup: {error}", ctx.pid);
        }
        if let Err(error) =
            self.tree
                .wait_vacated(&paths.step, VACATE_POLL_INTERVAL, self.vacate_timeout)
        {
            log::warn!("{error}");
        }

        if let Err(error) = self.tree.delete(&paths.step) {
            log::debug!("Unable to remove step devices: {error}");
        }
        if let Err(error) = self.tree.delete(&paths.job) {
            log::debug!("Not removing job devices: {error}");
        }
        if let Err(error) = self.tree.delete(&paths.user) {
            log::debug!("Not removing user devices: {error}");
        }
        Ok(())
    }
}
