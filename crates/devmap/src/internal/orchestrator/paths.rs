use crate::internal::orchestrator::context::StepContext;

/// Relative cgroup paths of one job step: `<root>/uid_<uid>/job_<job>/step_<step>`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ScopePaths {
    pub user: String,
    pub job: String,
    pub step: String,
}

impl ScopePaths {
    pub fn new(root: &str, ctx: &StepContext) -> Self {
        let user = join(root, &format!("uid_{}", ctx.uid));
        let job = join(&user, &format!("job_{}", ctx.job_id));
        let step = join(&job, &ctx.step.cgroup_name());
        Self { user, job, step }
    }
}

fn join(parent: &str, name: &str) -> String {
    let parent = parent.trim_end_matches('/');
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}
