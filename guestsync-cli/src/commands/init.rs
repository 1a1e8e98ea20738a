use std::path::Path;

use anyhow::Result;
use guestsync_core::config::{API_KEY_ENV, Config};
use owo_colors::OwoColorize;

pub fn run(config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => Config::config_path()?,
    };

    if path.exists() {
        println!(
            "{} Config already exists at {}",
            "!".yellow(),
            path.display()
        );
        return Ok(());
    }

    Config::create_default_config(&path)?;

    println!("{} Created config at {}", "✓".green(), path.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit the file and set api.base_url");
    println!("  2. Export {API_KEY_ENV} (or set api.api_key)");
    println!("  3. Run {} to begin a sync", "guestsync start".bold());

    Ok(())
}
