//! Status command for showing the active entry and pending alerts.

use std::fmt;
use std::io::Write;

use anyhow::Result;
use chrono::{TimeZone, Utc};
use tt_core::format_duration;

use super::util::describe_entry;
use crate::Backend;

pub async fn run<W, Tz>(writer: &mut W, backend: &mut Backend, tz: &Tz) -> Result<()>
where
    W: Write,
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    match backend.get_active_entry().await? {
        Some(entry) => writeln!(
            writer,
            "Active: {} ({} so far)",
            describe_entry(&entry, tz),
            format_duration(entry.elapsed(Utc::now()))
        )?,
        None => writeln!(writer, "No active entry.")?,
    }

    let alerts = backend.get_alert_list().await?.len();
    match alerts {
        0 => {}
        1 => writeln!(writer, "1 pending alert. Run `tt alerts` to see it.")?,
        n => writeln!(writer, "{n} pending alerts. Run `tt alerts` to see them.")?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;
    use insta::assert_snapshot;
    use tt_core::NewEntry;
    use tt_db::Store;

    #[tokio::test]
    async fn status_without_entries() {
        let mut backend = Backend::Local(Store::open_in_memory().await.unwrap());
        let mut output = Vec::new();
        run(&mut output, &mut backend, &Utc).await.unwrap();
        assert_snapshot!(String::from_utf8(output).unwrap(), @"No active entry.");
    }

    #[tokio::test]
    async fn status_shows_elapsed_time_and_alerts() {
        let mut backend = Backend::Local(Store::open_in_memory().await.unwrap());
        let start = Utc::now() - Duration::minutes(90);
        backend
            .create_entry(NewEntry::named("Work").starting_at(start))
            .await
            .unwrap();
        backend.afk_away().await.unwrap();

        let mut output = Vec::new();
        run(&mut output, &mut backend, &Utc).await.unwrap();
        let output = String::from_utf8(output).unwrap();
        assert!(output.starts_with("Active: #1 \"Work\" "), "{output}");
        assert!(output.contains(" - now (1h 30m so far)\n"), "{output}");
        assert!(output.ends_with("1 pending alert. Run `tt alerts` to see it.\n"));
    }
}
