//! `tt ls`: list entries in a time window.

use std::fmt;
use std::io::Write;

use anyhow::Result;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use tt_core::{SearchEntry, TimeSpanShorthand, format_duration};

use super::util::{describe_entry, parse_time};
use crate::{Backend, LsArgs};

const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Lists matching entries grouped by local day, followed by a total.
///
/// With `highlight`, characters matching `--search` are shown in bold.
pub async fn run<W, Tz>(
    writer: &mut W,
    backend: &mut Backend,
    args: &LsArgs,
    highlight: bool,
    tz: &Tz,
) -> Result<()>
where
    W: Write,
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let from = args.from.as_deref().map(|s| parse_time(s, tz)).transpose()?;
    let to = args.to.as_deref().map(|s| parse_time(s, tz)).transpose()?;
    let default_span = if from.is_some() || to.is_some() {
        TimeSpanShorthand::None
    } else {
        TimeSpanShorthand::Today
    };
    let highlight = highlight && !args.json;
    let search = SearchEntry {
        start: from,
        end: to,
        limit: args.limit,
        shorthand: args.span.unwrap_or(default_span),
        name_fuzzy: args.search.clone(),
        name_highlight_start: highlight.then(|| BOLD.to_string()),
        name_highlight_end: highlight.then(|| RESET.to_string()),
    };
    let entries = backend.get_entry_list(search).await?;

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&entries)?)?;
        return Ok(());
    }
    if entries.is_empty() {
        writeln!(writer, "No entries.")?;
        return Ok(());
    }

    let now = Utc::now();
    let mut day: Option<NaiveDate> = None;
    let mut total = Duration::zero();
    for entry in &entries {
        let date = entry.start.with_timezone(tz).date_naive();
        if day != Some(date) {
            writeln!(writer, "{}", date.format("%a %Y-%m-%d"))?;
            day = Some(date);
        }
        writeln!(writer, "  {}", describe_entry(entry, tz))?;
        total += entry.elapsed(now);
    }
    writeln!(writer, "Total: {}", format_duration(total))?;
    Ok(())
}
