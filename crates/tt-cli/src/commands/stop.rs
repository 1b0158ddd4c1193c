//! `tt out`: stop the active entry.

use std::fmt;
use std::io::Write;

use anyhow::Result;
use chrono::{TimeZone, Utc};

use super::util::{describe_entry, parse_time};
use crate::Backend;

pub async fn run<W, Tz>(
    writer: &mut W,
    backend: &mut Backend,
    at: Option<&str>,
    tz: &Tz,
) -> Result<()>
where
    W: Write,
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let end = match at {
        Some(at) => parse_time(at, tz)?,
        None => Utc::now(),
    };
    match backend.stop_active_entry(end).await? {
        Some(entry) => writeln!(writer, "Stopped {}", describe_entry(&entry, tz))?,
        None => writeln!(writer, "No active entry.")?,
    }
    Ok(())
}
