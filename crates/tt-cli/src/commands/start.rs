//! `tt in`: start an entry.

use std::fmt;
use std::io::Write;

use anyhow::Result;
use chrono::TimeZone;
use tt_core::NewEntry;

use super::util::{describe_entry, parse_time};
use crate::{Backend, InArgs};

pub async fn run<W, Tz>(writer: &mut W, backend: &mut Backend, args: &InArgs, tz: &Tz) -> Result<()>
where
    W: Write,
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let entry = NewEntry {
        name: args.name.join(" "),
        start: args.at.as_deref().map(|at| parse_time(at, tz)).transpose()?,
        end: args.end.as_deref().map(|end| parse_time(end, tz)).transpose()?,
        start_after_id: args.after,
        end_before_id: args.before,
        start_after_last: args.after_last,
    };
    let started = backend.create_entry(entry).await?;
    if let Some(stopped) = &started.stopped {
        writeln!(writer, "Stopped {}", describe_entry(stopped, tz))?;
    }
    writeln!(writer, "Started {}", describe_entry(&started.started, tz))?;
    Ok(())
}
