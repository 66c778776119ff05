#[macro_use]
pub(crate) mod common;

pub(crate) mod access;
pub(crate) mod cgroup;
pub(crate) mod device;
pub(crate) mod orchestrator;

#[cfg(test)]
pub(crate) mod tests;
