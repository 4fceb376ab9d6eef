//! Configuration view and validation commands — `taskboard config`.

use std::path::Path;

use anyhow::{Context, Result};
use taskboard::config::TaskboardConfig;

use super::super::ConfigCommands;

pub fn cmd_config(
    explicit_path: Option<&Path>,
    effective: &TaskboardConfig,
    command: Option<ConfigCommands>,
) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            match explicit_path
                .map(Path::to_path_buf)
                .or_else(|| TaskboardConfig::default_locations().into_iter().find(|p| p.exists()))
            {
                Some(path) => println!("Config file: {}", path.display()),
                None => println!("No taskboard.toml found; using defaults."),
            }
            println!();

            let mut shown = effective.clone();
            if shown.auth.token.is_some() {
                shown.auth.token = Some("<redacted>".to_string());
            }
            let rendered = toml::to_string_pretty(&shown).context("Failed to render configuration")?;
            println!("Effective values (with env/CLI overrides):");
            println!();
            println!("{}", rendered);
        }
        Some(ConfigCommands::Validate) => {
            let problems = effective.validate();
            if problems.is_empty() {
                println!("{}", console::style("Configuration is valid.").green());
            } else {
                println!("Configuration problems:");
                for problem in &problems {
                    println!("  - {}", problem);
                }
                anyhow::bail!("{} configuration problem(s) found", problems.len());
            }
        }
        Some(ConfigCommands::Init { path, force }) => {
            if path.exists() && !force {
                println!("{} already exists.", path.display());
                println!("Pass --force to overwrite it.");
                return Ok(());
            }
            TaskboardConfig::default().save(&path)?;
            println!("Created {}", path.display());
        }
    }
    Ok(())
}
