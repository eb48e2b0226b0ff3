//! Command-line interface definitions and helpers.
//!
//! This module contains all CLI argument parsing, enums, and subcommand handlers.

mod args;
mod commands;
mod enums;

pub use args::{Args, Command, ConfigAction};
pub use commands::{
    handle_config_action, list_devices, run_session, scan_crop, scan_grid, CliError, Resolved,
};
pub use enums::ModeArg;
