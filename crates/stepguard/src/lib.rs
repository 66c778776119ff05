pub mod commands;
pub mod common;

pub type Error = crate::common::error::GuardError;
pub type Result<T> = std::result::Result<T, Error>;

pub const STEPGUARD_VERSION: &str = env!("CARGO_PKG_VERSION");
