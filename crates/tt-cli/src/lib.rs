//! Time tracker CLI library.
//!
//! This crate provides the CLI interface for the time tracker.

pub mod backend;
mod cli;
pub mod commands;
mod config;
mod console;

pub use backend::Backend;
pub use cli::{AfkAction, AlertsAction, Cli, Commands, EditArgs, InArgs, LsArgs};
pub use config::Config;
pub use console::Console;
