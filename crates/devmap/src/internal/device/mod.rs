pub(crate) mod bus;
pub(crate) mod identity;
pub(crate) mod mapping;
pub(crate) mod number;
pub(crate) mod slot;
