//! `tt edit`: change an entry's name or times.

use std::fmt;
use std::io::Write;

use anyhow::Result;
use chrono::TimeZone;
use tt_core::EditEntry;

use super::util::{describe_entry, parse_time};
use crate::{Backend, EditArgs};

pub async fn run<W, Tz>(
    writer: &mut W,
    backend: &mut Backend,
    args: &EditArgs,
    tz: &Tz,
) -> Result<()>
where
    W: Write,
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let edit = EditEntry {
        id: args.id,
        name: args.name.clone(),
        append_name: args.append,
        start: args.start.as_deref().map(|s| parse_time(s, tz)).transpose()?,
        end: args.end.as_deref().map(|s| parse_time(s, tz)).transpose()?,
        start_after_id: args.after,
        end_before_id: args.before,
        start_after_last: args.after_last,
        ..EditEntry::default()
    };
    let updated = backend.update_entry(edit).await?;
    writeln!(writer, "Updated {}", updated.after.id)?;
    writeln!(writer, "  before: {}", describe_entry(&updated.before, tz))?;
    writeln!(writer, "  after:  {}", describe_entry(&updated.after, tz))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{DateTime, Utc};
    use insta::assert_snapshot;
    use tt_core::{EntryId, NewEntry};
    use tt_db::Store;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn args() -> EditArgs {
        EditArgs {
            id: None,
            name: None,
            append: false,
            start: None,
            end: None,
            after: None,
            after_last: false,
            before: None,
        }
    }

    async fn backend_with_two_entries() -> Backend {
        let mut backend = Backend::Local(Store::open_in_memory().await.unwrap());
        backend
            .create_entry(
                NewEntry::named("Standup")
                    .starting_at(at("2026-01-15T09:00:00Z"))
                    .ending_at(at("2026-01-15T09:30:00Z")),
            )
            .await
            .unwrap();
        backend
            .create_entry(
                NewEntry::named("Review")
                    .starting_at(at("2026-01-15T10:00:00Z"))
                    .ending_at(at("2026-01-15T11:00:00Z")),
            )
            .await
            .unwrap();
        backend
    }

    #[tokio::test]
    async fn edits_latest_entry_by_default() {
        let mut backend = backend_with_two_entries().await;
        let mut output = Vec::new();
        let args = EditArgs {
            name: Some("PR #12".to_string()),
            append: true,
            after_last: true,
            ..args()
        };
        run(&mut output, &mut backend, &args, &Utc).await.unwrap();

        assert_snapshot!(String::from_utf8(output).unwrap(), @r#"
        Updated #2
          before: #2 "Review" 10:00 - 11:00 (1h 00m)
          after:  #2 "Review PR #12" 09:30 - 11:00 (1h 30m)
        "#);
    }

    #[tokio::test]
    async fn end_before_start_leaves_entry_unchanged() {
        let mut backend = backend_with_two_entries().await;
        let mut output = Vec::new();
        let args = EditArgs {
            id: Some(EntryId::new(1)),
            end: Some("2026-01-15T08:00:00Z".to_string()),
            ..args()
        };
        let err = run(&mut output, &mut backend, &args, &Utc)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("before start"), "{err}");

        let entry = backend.get_entry(EntryId::new(1)).await.unwrap().unwrap();
        assert_eq!(entry.end, Some(at("2026-01-15T09:30:00Z")));
        assert!(output.is_empty());
    }
}
