use anyhow::{Context, Result};
use guestsync_core::config::Config;
use guestsync_core::state::{Stage, StateStore};
use guestsync_core::syncer::Syncer;
use owo_colors::OwoColorize;

pub async fn run(syncer: &Syncer, config: &Config, json: bool) -> Result<()> {
    let status = syncer.status().context("Failed to read sync state")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let stage_label = match status.stage {
        Stage::Events => "not started".to_string(),
        Stage::Guests => "syncing guests".to_string(),
        Stage::Completed => "completed".green().to_string(),
    };

    println!("Stage:     {stage_label}");
    println!(
        "Progress:  {}% ({}/{} events)",
        status.progress_percent, status.processed_events, status.total_events
    );

    if status.failed_events > 0 {
        println!("Failed:    {}", status.failed_events.to_string().red());

        let state = StateStore::new(config.state_path()?).load()?;
        for id in &state.failed_event_ids {
            println!("   {}", id.red());
        }
    }

    Ok(())
}
