//! `tt afk away|back`: manual idle-sensor signals.

use std::fmt;
use std::io::Write;

use anyhow::Result;
use chrono::TimeZone;

use super::util::describe_alert;
use crate::{AfkAction, Backend};

pub async fn run<W, Tz>(writer: &mut W, backend: &mut Backend, action: AfkAction, tz: &Tz) -> Result<()>
where
    W: Write,
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    match action {
        AfkAction::Away => match backend.afk_away().await? {
            Some(alert) => writeln!(writer, "Raised {}", describe_alert(&alert, tz))?,
            None => writeln!(writer, "Nothing to mark: no active entry or already away.")?,
        },
        AfkAction::Back => match backend.afk_back().await? {
            Some(alert) => {
                writeln!(writer, "Raised {}", describe_alert(&alert, tz))?;
                writeln!(writer, "Run `tt resolve` to decide how to record the away time.")?;
            }
            None => writeln!(writer, "Not marked as away.")?,
        },
    }
    Ok(())
}
