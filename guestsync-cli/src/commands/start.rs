use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use guestsync_core::syncer::Syncer;
use owo_colors::OwoColorize;

use crate::utils::tui;

pub async fn run(syncer: &Syncer, after: Option<&str>, before: Option<&str>) -> Result<()> {
    let after = after.map(parse_date).transpose()?;
    let before = before.map(parse_date).transpose()?;

    if let (Some(a), Some(b)) = (after, before) {
        if a >= b {
            bail!("--after must be earlier than --before");
        }
    }

    let spinner = tui::create_spinner("Listing events".to_string());
    let result = syncer.start(after, before).await;
    spinner.finish_and_clear();

    let status = result.context("Failed to start sync")?;

    println!(
        "{} Queued {} event(s); event sheet written",
        "✓".green(),
        status.total_events
    );
    println!(
        "Run {} (or schedule {}) to sync guest lists",
        "guestsync run".bold(),
        "guestsync tick".bold()
    );

    Ok(())
}

fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{s}', expected YYYY-MM-DD"))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .context("Invalid time of day")?;
    Ok(DateTime::from_naive_utc_and_offset(midnight, Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iso_dates() {
        let dt = parse_date("2026-03-15").unwrap();
        assert_eq!(dt.to_rfc3339(), "2026-03-15T00:00:00+00:00");
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_date("15/03/2026").is_err());
        assert!(parse_date("soon").is_err());
    }
}
