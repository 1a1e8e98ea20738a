use anyhow::{Context, Result};
use guestsync_core::syncer::Syncer;
use owo_colors::OwoColorize;

pub fn run(syncer: &Syncer) -> Result<()> {
    syncer.reset().context("Failed to reset sync state")?;
    println!("{} Sync state reset", "✓".green());
    Ok(())
}
