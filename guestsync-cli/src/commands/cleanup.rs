use anyhow::{Context, Result};
use guestsync_core::syncer::Syncer;
use owo_colors::OwoColorize;

pub fn run(syncer: &Syncer) -> Result<()> {
    syncer.cleanup().context("Failed to clean up sync state")?;
    println!("{} Sync state removed", "✓".green());
    Ok(())
}
