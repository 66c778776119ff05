pub mod add_pid;
pub mod create;
pub mod mapping;
pub mod resolve;
pub mod teardown;
