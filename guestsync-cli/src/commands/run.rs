use std::time::Duration;

use anyhow::{Result, bail};
use guestsync_core::state::Stage;
use guestsync_core::syncer::Syncer;
use owo_colors::OwoColorize;
use tracing::warn;

use crate::utils::tui;

const MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// Drive `tick` until the run completes.
///
/// Individual tick errors are reported and retried on the next interval;
/// only a sustained failure streak aborts the loop.
pub async fn run(syncer: &Syncer, interval_secs: u64) -> Result<()> {
    let initial = syncer.status()?;
    if initial.stage == Stage::Events {
        println!(
            "{} No run in progress. Start one with {}",
            "!".yellow(),
            "guestsync start".bold()
        );
        return Ok(());
    }

    let bar = tui::create_progress_bar(100);
    bar.set_message("Syncing guest lists".to_string());
    bar.set_position(initial.progress_percent as u64);

    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    let mut consecutive_failures = 0u32;

    loop {
        interval.tick().await;

        match syncer.tick().await {
            Ok(status) => {
                consecutive_failures = 0;
                bar.set_position(status.progress_percent as u64);

                if status.stage == Stage::Completed {
                    bar.finish_and_clear();
                    println!(
                        "{} Sync completed: {} events, {} failed",
                        "✓".green(),
                        status.total_events,
                        status.failed_events
                    );
                    if status.failed_events > 0 {
                        println!(
                            "Run {} to see which events failed",
                            "guestsync status".bold()
                        );
                    }
                    return Ok(());
                }
            }
            Err(e) => {
                consecutive_failures += 1;
                warn!(error = %e, consecutive_failures, "tick failed");
                bar.println(format!("   {}", e.to_string().red()));

                if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                    bar.finish_and_clear();
                    bail!(
                        "Aborting after {consecutive_failures} consecutive failures; \
                         state is saved, rerun `guestsync run` to resume"
                    );
                }
            }
        }
    }
}
