//! `tt resolve`: ask how to record away time for each "formerly AFK" alert.

use std::fmt;
use std::io::Write;

use anyhow::{Context, Result};
use chrono::TimeZone;
use tt_core::{AfkResolution, AfkResolver, Alert, AlertType, Prompter};

use super::util::describe_entry;
use crate::Backend;

pub async fn run<W, P, Tz>(
    writer: &mut W,
    backend: &mut Backend,
    resolver: &mut AfkResolver<P>,
    tz: &Tz,
) -> Result<()>
where
    W: Write,
    P: Prompter,
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let pending: Vec<Alert> = backend
        .get_alert_list()
        .await?
        .into_iter()
        .filter(|alert| alert.kind.alert_type() == AlertType::FormerlyAfk)
        .collect();
    if pending.is_empty() {
        writeln!(writer, "Nothing to resolve.")?;
        return Ok(());
    }
    for alert in &pending {
        let Some(resolution) = resolver.handle(alert)? else {
            continue;
        };
        apply(writer, backend, alert, resolution, tz).await?;
    }
    Ok(())
}

/// Applies `resolution` and dismisses the alert it was made for.
pub async fn apply<W, Tz>(
    writer: &mut W,
    backend: &mut Backend,
    alert: &Alert,
    resolution: AfkResolution,
    tz: &Tz,
) -> Result<()>
where
    W: Write,
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    if !resolution.is_empty() {
        let applied = backend
            .apply_afk_resolution(resolution)
            .await
            .with_context(|| format!("failed to apply resolution of alert {}", alert.id))?;
        if let Some(updated) = &applied.updated {
            writeln!(writer, "Updated {}", describe_entry(&updated.after, tz))?;
        }
        for started in &applied.started {
            writeln!(writer, "Started {}", describe_entry(&started.started, tz))?;
        }
    }
    backend.delete_alert(alert.id).await?;
    tracing::debug!(alert = %alert.id, "resolved alert");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    use chrono::{DateTime, Duration, SubsecRound, Utc};
    use insta::assert_snapshot;
    use tt_core::{AlertKind, Entry, NewEntry, PromptError};
    use tt_db::{Alerts, Entries, Store};

    use crate::Console;

    struct Fixture {
        backend: Backend,
        active: Entry,
        afk_since: DateTime<Utc>,
    }

    async fn fixture() -> Fixture {
        let store = Store::open_in_memory().await.unwrap();
        let now = Utc::now().trunc_subsecs(0);
        let afk_since = now - Duration::minutes(30);
        let active = store
            .create_entry(NewEntry::named("Work").starting_at(now - Duration::hours(2)))
            .await
            .unwrap()
            .started;
        store
            .create_plain_message("Backup finished".to_string())
            .await
            .unwrap();
        store
            .create_alert(AlertKind::FormerlyAfk {
                afk_since,
                active_entry: Some(active.clone()),
            })
            .await
            .unwrap();
        Fixture {
            backend: Backend::Local(store),
            active,
            afk_since,
        }
    }

    fn console(input: &str, interactive: bool) -> Console<Cursor<String>, Vec<u8>> {
        Console::new(Cursor::new(input.to_string()), Vec::new(), interactive)
    }

    async fn remaining_alert_types(backend: &mut Backend) -> Vec<AlertType> {
        backend
            .get_alert_list()
            .await
            .unwrap()
            .iter()
            .map(|alert| alert.kind.alert_type())
            .collect()
    }

    #[tokio::test]
    async fn discarding_ends_the_entry_when_away_started() {
        let Fixture {
            mut backend,
            active,
            afk_since,
        } = fixture().await;
        let mut resolver = AfkResolver::new(console("2\n", true));
        let mut output = Vec::new();
        run(&mut output, &mut backend, &mut resolver, &Utc)
            .await
            .unwrap();

        let entry = backend.get_entry(active.id).await.unwrap().unwrap();
        assert_eq!((entry.start, entry.end), (active.start, Some(afk_since)));
        assert_eq!(
            String::from_utf8(output).unwrap(),
            format!("Updated {}\n", describe_entry(&entry, &Utc))
        );
        assert_eq!(
            remaining_alert_types(&mut backend).await,
            vec![AlertType::PlainMessage]
        );
    }

    #[tokio::test]
    async fn saving_creates_an_entry_for_the_away_time() {
        let Fixture {
            mut backend,
            active,
            afk_since,
        } = fixture().await;
        let mut resolver = AfkResolver::new(console("3\n\nLunch\n", true));
        let mut output = Vec::new();
        run(&mut output, &mut backend, &mut resolver, &Utc)
            .await
            .unwrap();

        let lunch = backend.get_active_entry().await.unwrap().unwrap();
        assert_eq!(lunch.name, "Lunch");
        assert_eq!(lunch.start, afk_since);
        let work = backend.get_entry(active.id).await.unwrap().unwrap();
        assert_eq!(work.end, Some(afk_since));

        let prompts = String::from_utf8(resolver.into_prompter().into_output()).unwrap();
        assert!(prompts.contains("Please enter a value."), "{prompts}");
        let output = String::from_utf8(output).unwrap();
        assert!(output.ends_with(&format!("Started {}\n", describe_entry(&lunch, &Utc))));
    }

    #[tokio::test]
    async fn non_interactive_terminals_leave_entries_as_is() {
        let Fixture {
            mut backend,
            active,
            ..
        } = fixture().await;
        let mut resolver = AfkResolver::new(console("", false));
        let mut output = Vec::new();
        run(&mut output, &mut backend, &mut resolver, &Utc)
            .await
            .unwrap();

        assert!(output.is_empty());
        assert_eq!(backend.get_active_entry().await.unwrap(), Some(active));
        assert_eq!(
            remaining_alert_types(&mut backend).await,
            vec![AlertType::PlainMessage]
        );

        let mut output = Vec::new();
        run(&mut output, &mut backend, &mut resolver, &Utc)
            .await
            .unwrap();
        assert_snapshot!(String::from_utf8(output).unwrap(), @"Nothing to resolve.");
    }

    #[tokio::test]
    async fn end_of_input_keeps_the_alert() {
        let Fixture { mut backend, .. } = fixture().await;
        let mut resolver = AfkResolver::new(console("", true));
        let err = run(&mut Vec::new(), &mut backend, &mut resolver, &Utc)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PromptError>(),
            Some(PromptError::EndOfInput)
        ));
        assert_eq!(
            remaining_alert_types(&mut backend).await,
            vec![AlertType::PlainMessage, AlertType::FormerlyAfk]
        );
    }
}
