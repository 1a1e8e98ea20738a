use anyhow::{Context, Result};
use guestsync_core::syncer::Syncer;
use owo_colors::OwoColorize;

pub async fn run(syncer: &Syncer) -> Result<()> {
    let status = syncer.stop().await.context("Failed to stop sync")?;

    println!(
        "{} Sync stopped ({} events failed so far)",
        "✓".green(),
        status.failed_events
    );
    println!(
        "Buffered rows were not flushed; run {} to start over",
        "guestsync start".bold()
    );

    Ok(())
}
