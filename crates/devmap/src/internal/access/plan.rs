use std::fmt::{Display, Formatter};

use crate::internal::access::decision::{AccessAction, AccessDecision, AccessScope, DeviceTarget};
use crate::internal::cgroup::CgroupTree;

/// A single rule written into a scope's device controller.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AccessWrite {
    pub action: AccessAction,
    pub target: DeviceTarget,
}

impl Display for AccessWrite {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.action.param_name(), self.target)
    }
}

/// Ordered list of rules for one scope.
///
/// The controller is whitelist-only, so the order is part of the contract:
/// default allows first, then every resource deny, then every resource allow.
/// A deny therefore never comes after an allow of the same device class.
///
/// Class-wide denies (`c <major>:* rwm`) only come from slots whose device could not
/// be resolved. A resolved device that is withheld gets a deny of that device only,
/// so the other devices of its class can still be allowed after it.
#[derive(Debug, Clone)]
pub struct AccessPlan {
    scope: AccessScope,
    writes: Vec<AccessWrite>,
}

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct ProgramReport {
    pub written: usize,
    pub failed: usize,
}

impl AccessPlan {
    pub fn new(
        scope: AccessScope,
        defaults: &[DeviceTarget],
        decisions: impl IntoIterator<Item = AccessDecision>,
    ) -> Self {
        let mut writes: Vec<AccessWrite> = defaults
            .iter()
            .map(|target| AccessWrite {
                action: AccessAction::Allow,
                target: *target,
            })
            .collect();

        let (allows, denies): (Vec<AccessDecision>, Vec<AccessDecision>) = decisions
            .into_iter()
            .inspect(|decision| debug_assert_eq!(decision.scope, scope))
            .partition(|decision| decision.action == AccessAction::Allow);
        writes.extend(denies.into_iter().chain(allows).map(|decision| AccessWrite {
            action: decision.action,
            target: decision.target,
        }));

        Self { scope, writes }
    }

    pub fn scope(&self) -> AccessScope {
        self.scope
    }

    pub fn writes(&self) -> &[AccessWrite] {
        &self.writes
    }

    /// Writes all rules into the group at `path`.
    ///
    /// A failed write does not stop the remaining ones; it is logged and counted.
    pub fn apply<C: CgroupTree + ?Sized>(&self, tree: &C, path: &str) -> ProgramReport {
        let mut report = ProgramReport::default();
        for write in &self.writes {
            let value = write.target.to_string();
            match tree.set_param(path, write.action.param_name(), &value) {
                Ok(()) => {
                    log::debug!("{} `{value}` for {} ({path})", write.action.param_name(), self.scope);
                    report.written += 1;
                }
                Err(error) => {
                    log::error!("Cannot program {} device access: {error}", self.scope);
                    report.failed += 1;
                }
            }
        }
        report
    }
}

impl Display for AccessPlan {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for write in &self.writes {
            writeln!(f, "{write}")?;
        }
        Ok(())
    }
}
