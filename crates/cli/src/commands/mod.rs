//! CLI subcommand implementations

pub mod log;
pub mod predict;
pub mod status;
