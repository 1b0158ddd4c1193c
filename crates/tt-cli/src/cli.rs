//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tt_core::{AlertId, AlertType, EntryId, TimeSpanShorthand};

/// Terminal time tracker.
///
/// Records what you work on as entries, raises alerts while you are away
/// from the keyboard, and asks how the away time should be recorded.
#[derive(Debug, Parser)]
#[command(name = "tt", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Talk to the running daemon instead of opening the database.
    #[arg(long, global = true)]
    pub remote: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the active entry and pending alerts.
    Status,

    /// Start a new entry, stopping the active one.
    In(InArgs),

    /// Stop the active entry.
    Out {
        /// When the entry ended (e.g. "10:30", "15m ago"). Defaults to now.
        #[arg(long)]
        at: Option<String>,
    },

    /// Change an entry. Edits the active or latest entry without an ID.
    Edit(EditArgs),

    /// Delete an entry.
    Rm {
        /// Entry ID, e.g. 12 or #12.
        id: EntryId,
    },

    /// List entries.
    Ls(LsArgs),

    /// List or dismiss alerts.
    Alerts {
        #[command(subcommand)]
        action: Option<AlertsAction>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Report that you left or came back to the keyboard.
    Afk {
        #[command(subcommand)]
        action: AfkAction,
    },

    /// Decide how to record time spent away from the keyboard.
    Resolve,

    /// Run the daemon in the foreground.
    Serve,

    /// Follow entry and alert events from the daemon.
    Watch,
}

#[derive(Debug, Args)]
pub struct InArgs {
    /// Name of the entry.
    #[arg(required = true, num_args = 1..)]
    pub name: Vec<String>,

    /// When the entry started. Defaults to now.
    #[arg(long, conflicts_with_all = ["after", "after_last"])]
    pub at: Option<String>,

    /// When the entry ended, for recording past work.
    #[arg(long, conflicts_with = "before")]
    pub end: Option<String>,

    /// Start where this entry ended.
    #[arg(long, conflicts_with = "after_last")]
    pub after: Option<EntryId>,

    /// Start where the most recent entry ended.
    #[arg(long)]
    pub after_last: bool,

    /// End where this entry started.
    #[arg(long)]
    pub before: Option<EntryId>,
}

#[derive(Debug, Args)]
pub struct EditArgs {
    /// Entry ID. Defaults to the active entry, then the latest one.
    pub id: Option<EntryId>,

    /// New name.
    #[arg(long)]
    pub name: Option<String>,

    /// Append `--name` to the current name instead of replacing it.
    #[arg(long, requires = "name")]
    pub append: bool,

    /// New start time (e.g. "9:15", "2 hours ago").
    #[arg(long, conflicts_with_all = ["after", "after_last"])]
    pub start: Option<String>,

    /// New end time.
    #[arg(long, conflicts_with = "before")]
    pub end: Option<String>,

    /// Start where this entry ended.
    #[arg(long, conflicts_with = "after_last")]
    pub after: Option<EntryId>,

    /// Start where the previous entry ended.
    #[arg(long)]
    pub after_last: bool,

    /// End where this entry started.
    #[arg(long)]
    pub before: Option<EntryId>,
}

#[derive(Debug, Args)]
pub struct LsArgs {
    /// Time window: today, yesterday, this-week, last-week, all.
    /// Defaults to today unless `--from` or `--to` is given.
    pub span: Option<TimeSpanShorthand>,

    /// Only entries overlapping this time or later.
    #[arg(long)]
    pub from: Option<String>,

    /// Only entries starting before this time.
    #[arg(long)]
    pub to: Option<String>,

    /// Fuzzy name filter; matched characters must appear in order.
    #[arg(short, long)]
    pub search: Option<String>,

    /// Keep only the latest N entries (0 for all).
    #[arg(short = 'n', long, default_value_t = 0)]
    pub limit: u64,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Subcommand)]
pub enum AlertsAction {
    /// List pending alerts.
    List,

    /// Dismiss one alert.
    Rm {
        /// Alert ID.
        id: AlertId,
    },

    /// Dismiss all alerts of a type: plain_message, afk, formerly_afk.
    Clear {
        alert_type: AlertType,
    },
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum AfkAction {
    /// You left the keyboard.
    Away,
    /// You are back.
    Back,
}
