//! CLI module - argument parsing and subcommand runners

mod args;
pub mod commands;

pub use args::{derive_output_path, Cli, Commands, TableOptions};
pub use commands::run;
