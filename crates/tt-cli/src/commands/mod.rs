//! CLI subcommand implementations.

pub mod afk;
pub mod alerts;
pub mod edit;
pub mod list;
pub mod remove;
pub mod resolve;
pub mod serve;
pub mod start;
pub mod status;
pub mod stop;
pub mod util;
pub mod watch;
