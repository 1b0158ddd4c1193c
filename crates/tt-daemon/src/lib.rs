//! Network daemon for the time tracker.
//!
//! The daemon serves the entry and alert stores over TCP using length-prefixed
//! JSON frames (see [`protocol`]), relays store events to streaming clients,
//! and turns idle-sensor samples into AFK alerts.

pub mod afk;
pub mod client;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod server;

pub use afk::{AfkState, AfkTracker};
pub use client::{Client, EventStream, StreamEvent};
pub use error::DaemonError;
pub use protocol::{Request, Response};
pub use relay::{EventSink, FrameSink, relay};
pub use server::Server;
