use crate::core::Config;
use anyhow::{Context, Result};
use colored::Colorize;

pub fn execute(matches: &clap::ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("show", _)) => show(),
        Some(("path", _)) => path(),
        Some(("reset", _)) => reset(),
        _ => {
            println!("Use 'sysdash config --help' for more information.");
            Ok(())
        }
    }
}

fn show() -> Result<()> {
    let config = Config::load()?;
    let json = serde_json::to_string_pretty(&config).context("Failed to render config")?;
    println!("{json}");
    Ok(())
}

fn path() -> Result<()> {
    let path = Config::get_config_path()?;
    let status = if path.exists() {
        "exists".green()
    } else {
        "not created yet".dimmed()
    };
    println!("{} ({})", path.display(), status);
    Ok(())
}

fn reset() -> Result<()> {
    Config::reset()?;
    let path = Config::get_config_path()?;
    println!(
        "{} {}",
        "Configuration reset to defaults:".green().bold(),
        path.display()
    );
    Ok(())
}
