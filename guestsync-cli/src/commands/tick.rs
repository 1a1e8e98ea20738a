use anyhow::{Context, Result};
use guestsync_core::state::Stage;
use guestsync_core::syncer::Syncer;
use owo_colors::OwoColorize;

pub async fn run(syncer: &Syncer) -> Result<()> {
    let status = syncer.tick().await.context("Sync tick failed")?;

    match status.stage {
        Stage::Events => println!(
            "{} No run in progress. Start one with {}",
            "!".yellow(),
            "guestsync start".bold()
        ),
        Stage::Guests => println!(
            "{}% ({}/{} events, {} failed)",
            status.progress_percent,
            status.processed_events,
            status.total_events,
            status.failed_events
        ),
        Stage::Completed => println!(
            "{} Sync completed ({} events, {} failed)",
            "✓".green(),
            status.total_events,
            status.failed_events
        ),
    }

    Ok(())
}
