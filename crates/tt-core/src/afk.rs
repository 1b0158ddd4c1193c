//! Resolution of "formerly AFK" alerts.
//!
//! When the user comes back from being away while an entry was active, the
//! [`AfkResolver`] asks how the away time should be recorded and turns the
//! answer into an [`AfkResolution`]: an optional edit of the active entry plus
//! any entries to create. The resolver never touches storage; callers hand the
//! resolution to the entry store.
//!
//! ```text
//! Idle --FormerlyAfk--> AwaitingDecision --{LeaveAsIs | DiscardAwayTime | SaveAsNewTask}--> Idle
//! ```


use chrono::{DateTime, Duration, Local, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::alert::{Alert, AlertKind};
use crate::cancel::CancelToken;
use crate::entry::{EditEntry, Entry, NewEntry};
use crate::timeutil::clock;

/// Errors that abort a resolution.
#[derive(Debug, Error)]
pub enum PromptError {
    /// Resolution was cancelled before a valid selection was made.
    #[error("no answer chosen")]
    NoAnswerChosen,
    /// The input stream ended while prompting.
    #[error("end of input while prompting (maybe stdin is piped?)")]
    EndOfInput,
    #[error("prompt I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Line-based terminal primitive used by the resolver.
pub trait Prompter {
    /// False when nobody can answer, e.g. stdout is not a terminal.
    fn is_interactive(&self) -> bool;

    /// Shows informational text to the user.
    fn notice(&mut self, message: &str);

    /// Shows `prompt` and reads one line without its trailing newline.
    ///
    /// Returns `Ok(None)` at end of input.
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>, PromptError>;
}

/// What should change as decided by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AfkResolution {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit: Option<EditEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub new_entries: Vec<NewEntry>,
}

impl AfkResolution {
    pub const fn is_empty(&self) -> bool {
        self.edit.is_none() && self.new_entries.is_empty()
    }

    /// Truncates `active` to end when the user went away.
    pub fn discard_away_time(active: &Entry, afk_since: DateTime<Utc>) -> Self {
        Self {
            edit: Some(EditEntry::end_entry(active.id, afk_since)),
            new_entries: Vec::new(),
        }
    }

    /// Truncates `active` and records the away time as a new entry right after it.
    pub fn save_as_new_entry(active: &Entry, afk_since: DateTime<Utc>, name: String) -> Self {
        Self {
            edit: Some(EditEntry::end_entry(active.id, afk_since)),
            new_entries: vec![NewEntry {
                name,
                start: Some(afk_since),
                start_after_id: Some(active.id),
                ..NewEntry::default()
            }],
        }
    }
}

/// The three ways to record away time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfkChoice {
    LeaveAsIs,
    DiscardAwayTime,
    SaveAsNewTask,
}

impl AfkChoice {
    /// Maps a 1-based menu selection.
    pub const fn from_menu(selection: u32) -> Option<Self> {
        match selection {
            1 => Some(Self::LeaveAsIs),
            2 => Some(Self::DiscardAwayTime),
            3 => Some(Self::SaveAsNewTask),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverState {
    Idle,
    AwaitingDecision,
}

/// Interactive decision procedure for "formerly AFK" alerts.
#[derive(Debug)]
pub struct AfkResolver<P> {
    prompter: P,
    state: ResolverState,
    cancel: Option<CancelToken>,
}

impl<P: Prompter> AfkResolver<P> {
    pub const fn new(prompter: P) -> Self {
        Self {
            prompter,
            state: ResolverState::Idle,
            cancel: None,
        }
    }

    /// Aborts pending prompts with [`PromptError::NoAnswerChosen`] once `cancel` fires.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub const fn state(&self) -> ResolverState {
        self.state
    }

    pub fn into_prompter(self) -> P {
        self.prompter
    }

    /// Resolves `alert` if it is a "formerly AFK" alert.
    ///
    /// Other alert kinds need no decision and yield `Ok(None)`.
    pub fn handle(&mut self, alert: &Alert) -> Result<Option<AfkResolution>, PromptError> {
        match &alert.kind {
            AlertKind::PlainMessage { .. } | AlertKind::Afk { .. } => Ok(None),
            AlertKind::FormerlyAfk {
                afk_since,
                active_entry,
            } => self.resolve(*afk_since, active_entry.as_ref()).map(Some),
        }
    }

    /// Asks the user how to record the time away since `afk_since`.
    pub fn resolve(
        &mut self,
        afk_since: DateTime<Utc>,
        active: Option<&Entry>,
    ) -> Result<AfkResolution, PromptError> {
        self.state = ResolverState::AwaitingDecision;
        let resolution = self.decide(afk_since, active);
        self.state = ResolverState::Idle;
        resolution
    }

    fn decide(
        &mut self,
        afk_since: DateTime<Utc>,
        active: Option<&Entry>,
    ) -> Result<AfkResolution, PromptError> {
        let Some(active) = active else {
            tracing::debug!("formerly AFK without an active entry, nothing to resolve");
            return Ok(AfkResolution::default());
        };
        let now = Utc::now();
        let summary = format!(
            "! Note: You were away since {} ({})\n\
             ! while having an active entry {} \"{}\" started {}.",
            clock(afk_since, &Local),
            format_duration(now.signed_duration_since(afk_since)),
            active.id,
            active.name,
            clock(active.start, &Local),
        );
        self.prompter.notice(&summary);

        if !self.prompter.is_interactive() {
            self.prompter.notice(
                "! The terminal seems to be non-interactive. Skipping prompt.\n\
                 ! Assuming option \"1. Leave the active entry as-is\".",
            );
            return Ok(AfkResolution::default());
        }

        let menu = format!(
            "How do you want to save this away time?\n \
             1. Leave the active entry as-is.\n \
             2. Discard the away time, changing the active entry to {} - {} ({}).\n \
             3. Save the away time as a new entry {} - now ({}), naming it next.",
            clock(active.start, &Local),
            clock(afk_since, &Local),
            format_duration(afk_since.signed_duration_since(active.start)),
            clock(afk_since, &Local),
            format_duration(now.signed_duration_since(afk_since)),
        );
        self.prompter.notice(&menu);

        let selection = self.prompt_in_range("Select option [1-3]:", 1, 3)?;
        match AfkChoice::from_menu(selection).ok_or(PromptError::NoAnswerChosen)? {
            AfkChoice::LeaveAsIs => {
                self.prompter.notice("No changes made.");
                Ok(AfkResolution::default())
            }
            AfkChoice::DiscardAwayTime => {
                self.prompter
                    .notice("Discarding the away time from the active entry.");
                Ok(AfkResolution::discard_away_time(active, afk_since))
            }
            AfkChoice::SaveAsNewTask => {
                let name = self.prompt_non_empty("Enter name of new entry:")?;
                self.prompter
                    .notice(&format!("Saving the away time as a new entry named \"{name}\"."));
                Ok(AfkResolution::save_as_new_entry(active, afk_since, name))
            }
        }
    }

    fn ensure_not_cancelled(&self) -> Result<(), PromptError> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(PromptError::NoAnswerChosen);
        }
        Ok(())
    }

    fn prompt_non_empty(&mut self, prompt: &str) -> Result<String, PromptError> {
        loop {
            self.ensure_not_cancelled()?;
            let answer = self
                .prompter
                .read_line(prompt)?
                .ok_or(PromptError::EndOfInput)?;
            self.ensure_not_cancelled()?;
            let answer = answer.trim();
            if answer.is_empty() {
                self.prompter.notice("Please enter a value.");
                continue;
            }
            return Ok(answer.to_string());
        }
    }

    fn prompt_in_range(&mut self, prompt: &str, lower: u32, upper: u32) -> Result<u32, PromptError> {
        loop {
            let answer = self.prompt_non_empty(prompt)?;
            match answer.parse::<u32>() {
                Ok(n) if (lower..=upper).contains(&n) => return Ok(n),
                Ok(_) => self.prompter.notice(&format!(
                    "Please enter a value in the range {lower}-{upper}."
                )),
                Err(err) => self.prompter.notice(&format!("Invalid answer: {err}")),
            }
        }
    }
}

/// Formats a duration as `45m` or `2h 05m`. Negative durations show as `0m`.
pub fn format_duration(duration: Duration) -> String {
    let minutes = duration.num_minutes().max(0);
    if minutes < 60 {
        format!("{minutes}m")
    } else {
        format!("{}h {:02}m", minutes / 60, minutes % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use chrono::TimeZone;

    use crate::types::{AlertId, EntryId};

    #[derive(Debug, Default)]
    struct ScriptedPrompter {
        interactive: bool,
        answers: VecDeque<String>,
        notices: Vec<String>,
        prompts: usize,
    }

    impl ScriptedPrompter {
        fn answering(answers: &[&str]) -> Self {
            Self {
                interactive: true,
                answers: answers.iter().map(ToString::to_string).collect(),
                ..Self::default()
            }
        }
    }

    impl Prompter for ScriptedPrompter {
        fn is_interactive(&self) -> bool {
            self.interactive
        }

        fn notice(&mut self, message: &str) {
            self.notices.push(message.to_string());
        }

        fn read_line(&mut self, _prompt: &str) -> Result<Option<String>, PromptError> {
            self.prompts += 1;
            Ok(self.answers.pop_front())
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 3, 9, 0, 0).unwrap()
    }

    fn t1() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 3, 11, 30, 0).unwrap()
    }

    fn active() -> Entry {
        Entry {
            id: EntryId::new(42),
            name: "Writing report".to_string(),
            start: t0(),
            end: None,
            created_at: t0(),
            updated_at: t0(),
        }
    }

    fn formerly_afk(active_entry: Option<Entry>) -> Alert {
        Alert {
            id: AlertId::new(1),
            created_at: t1(),
            updated_at: t1(),
            kind: AlertKind::FormerlyAfk {
                afk_since: t1(),
                active_entry,
            },
        }
    }

    #[test]
    fn non_interactive_leaves_as_is_without_prompting() {
        let prompter = ScriptedPrompter::default();
        let mut resolver = AfkResolver::new(prompter);
        let resolution = resolver.handle(&formerly_afk(Some(active()))).unwrap();
        assert_eq!(resolution, Some(AfkResolution::default()));
        assert_eq!(resolver.state(), ResolverState::Idle);
        assert_eq!(resolver.into_prompter().prompts, 0);
    }

    #[test]
    fn leave_as_is_produces_empty_resolution() {
        let mut resolver = AfkResolver::new(ScriptedPrompter::answering(&["1"]));
        let resolution = resolver.resolve(t1(), Some(&active())).unwrap();
        assert!(resolution.is_empty());
    }

    #[test]
    fn discard_truncates_active_entry_at_afk_since() {
        let mut resolver = AfkResolver::new(ScriptedPrompter::answering(&["2"]));
        let resolution = resolver.resolve(t1(), Some(&active())).unwrap();
        assert_eq!(
            resolution,
            AfkResolution {
                edit: Some(EditEntry {
                    id: Some(EntryId::new(42)),
                    end: Some(t1()),
                    ..EditEntry::default()
                }),
                new_entries: Vec::new(),
            }
        );
    }

    #[test]
    fn save_as_new_task_splices_after_active_entry() {
        let mut resolver = AfkResolver::new(ScriptedPrompter::answering(&["3", "", "Lunch"]));
        let resolution = resolver.resolve(t1(), Some(&active())).unwrap();
        assert_eq!(
            resolution.edit,
            Some(EditEntry::end_entry(EntryId::new(42), t1()))
        );
        assert_eq!(
            resolution.new_entries,
            vec![NewEntry {
                name: "Lunch".to_string(),
                start: Some(t1()),
                start_after_id: Some(EntryId::new(42)),
                ..NewEntry::default()
            }]
        );
        let prompter = resolver.into_prompter();
        assert_eq!(prompter.prompts, 3);
        assert!(prompter.notices.iter().any(|n| n == "Please enter a value."));
    }

    #[test]
    fn invalid_selections_reprompt() {
        let mut resolver =
            AfkResolver::new(ScriptedPrompter::answering(&["lunch", "7", "0", "2"]));
        let resolution = resolver.resolve(t1(), Some(&active())).unwrap();
        assert!(resolution.edit.is_some());
        let prompter = resolver.into_prompter();
        assert_eq!(prompter.prompts, 4);
        assert!(prompter.notices.iter().any(|n| n.starts_with("Invalid answer")));
        assert!(
            prompter
                .notices
                .iter()
                .any(|n| n == "Please enter a value in the range 1-3.")
        );
    }

    #[test]
    fn end_of_input_aborts() {
        let mut resolver = AfkResolver::new(ScriptedPrompter::answering(&["3"]));
        let err = resolver.resolve(t1(), Some(&active())).unwrap_err();
        assert!(matches!(err, PromptError::EndOfInput));
        assert_eq!(resolver.state(), ResolverState::Idle);
    }

    #[test]
    fn cancellation_aborts_with_no_answer() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut resolver =
            AfkResolver::new(ScriptedPrompter::answering(&["2"])).with_cancel(cancel);
        let err = resolver.resolve(t1(), Some(&active())).unwrap_err();
        assert!(matches!(err, PromptError::NoAnswerChosen));
    }

    #[test]
    fn other_alert_kinds_need_no_decision() {
        let mut resolver = AfkResolver::new(ScriptedPrompter::answering(&[]));
        let alert = Alert {
            kind: AlertKind::Afk {
                active_entry: active(),
            },
            ..formerly_afk(None)
        };
        assert_eq!(resolver.handle(&alert).unwrap(), None);
    }

    #[test]
    fn missing_active_entry_resolves_to_nothing() {
        let mut resolver = AfkResolver::new(ScriptedPrompter::answering(&["2"]));
        let resolution = resolver.handle(&formerly_afk(None)).unwrap();
        assert_eq!(resolution, Some(AfkResolution::default()));
        assert_eq!(resolver.into_prompter().prompts, 0);
    }

    #[test]
    fn durations_format_as_hours_and_minutes() {
        assert_eq!(format_duration(Duration::minutes(45)), "45m");
        assert_eq!(format_duration(Duration::minutes(125)), "2h 05m");
        assert_eq!(format_duration(Duration::minutes(-3)), "0m");
    }
}
