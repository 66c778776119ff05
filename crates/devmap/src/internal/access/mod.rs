pub(crate) mod decision;
pub(crate) mod defaults;
pub(crate) mod plan;
