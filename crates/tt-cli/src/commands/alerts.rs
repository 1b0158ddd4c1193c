//! `tt alerts`: list and dismiss alerts.

use std::fmt;
use std::io::Write;

use anyhow::Result;
use chrono::TimeZone;

use super::util::describe_alert;
use crate::{AlertsAction, Backend};

pub async fn run<W, Tz>(
    writer: &mut W,
    backend: &mut Backend,
    action: Option<&AlertsAction>,
    json: bool,
    tz: &Tz,
) -> Result<()>
where
    W: Write,
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    match action.unwrap_or(&AlertsAction::List) {
        AlertsAction::List => {
            let alerts = backend.get_alert_list().await?;
            if json {
                writeln!(writer, "{}", serde_json::to_string_pretty(&alerts)?)?;
            } else if alerts.is_empty() {
                writeln!(writer, "No alerts.")?;
            } else {
                for alert in &alerts {
                    writeln!(writer, "{}", describe_alert(alert, tz))?;
                }
            }
        }
        AlertsAction::Rm { id } => {
            let alert = backend.delete_alert(*id).await?;
            writeln!(writer, "Dismissed {}", describe_alert(&alert, tz))?;
        }
        AlertsAction::Clear { alert_type } => {
            let alerts = backend.delete_alert_type(*alert_type).await?;
            writeln!(writer, "Dismissed {} {alert_type} alert(s).", alerts.len())?;
        }
    }
    Ok(())
}
