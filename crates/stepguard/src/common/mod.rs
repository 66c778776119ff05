pub mod allocation;
pub mod cli;
pub mod config;
pub mod error;
pub mod settings;
pub mod setup;
