//! Configuration view and validation commands — `qaforge config`.

use anyhow::Result;
use std::path::Path;

use qaforge::config::{CONFIG_FILE, QAFORGE_DIR, QaforgeConfig, QaforgeToml};

use super::super::ConfigCommands;

fn print_toml(toml: &QaforgeToml) {
    println!("[generator]");
    println!("  command = \"{}\"", toml.generator.command);
    println!("  args = {:?}", toml.generator.args);
    println!("  timeout_secs = {}", toml.generator.timeout_secs);
    println!();
    println!("[review]");
    println!("  renderer = \"{}\"", toml.review.renderer);
    println!();
    println!("[store]");
    println!("  dir = \"{}\"", toml.store.dir);
    println!();
}

pub fn cmd_config(project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let qaforge_dir = project_dir.join(QAFORGE_DIR);
    let config_path = qaforge_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("qaforge Configuration");
            println!("=====================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
                println!();
                print_toml(&QaforgeToml::load(&config_path)?);
            } else {
                println!("No qaforge.toml found at {}", config_path.display());
                println!();
                println!("Using default configuration:");
                print_toml(&QaforgeToml::default());
                println!("Run 'qaforge config init' to create a qaforge.toml file.");
                println!();
            }

            println!("Effective values (with env overrides):");
            let config = QaforgeConfig::new(project_dir.to_path_buf())?;
            println!("  generator.command = \"{}\"", config.toml.generator.command);
            match config.timeout() {
                Some(timeout) => println!("  timeout = {}s", timeout.as_secs()),
                None => println!("  timeout = none"),
            }
            println!("  store = {}", config.store_dir().display());
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let toml = if config_path.exists() {
                QaforgeToml::load(&config_path)?
            } else {
                println!("No qaforge.toml found. Checking defaults.");
                QaforgeToml::default()
            };
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("qaforge.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            std::fs::create_dir_all(&qaforge_dir)?;
            QaforgeToml::default().save(&config_path)?;

            println!("Created qaforge.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [generator] command, args, timeout_secs");
            println!("  - [review] renderer (\"template\" or \"generator\")");
            println!("  - [store] dir");
            println!();
        }
    }

    Ok(())
}
