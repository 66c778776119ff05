#[macro_use]
pub(crate) mod macros;

pub(crate) mod error;
pub(crate) mod ids;
pub(crate) mod utils;
