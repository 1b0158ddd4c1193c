//! `tt rm`: delete an entry.

use std::fmt;
use std::io::Write;

use anyhow::{Context, Result};
use chrono::TimeZone;
use tt_core::EntryId;

use super::util::describe_entry;
use crate::Backend;

pub async fn run<W, Tz>(writer: &mut W, backend: &mut Backend, id: EntryId, tz: &Tz) -> Result<()>
where
    W: Write,
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let entry = backend
        .delete_entry(id)
        .await
        .with_context(|| format!("failed to delete entry {id}"))?;
    writeln!(writer, "Deleted {}", describe_entry(&entry, tz))?;
    Ok(())
}
