pub(crate) mod context;
pub(crate) mod paths;
pub(crate) mod step;
