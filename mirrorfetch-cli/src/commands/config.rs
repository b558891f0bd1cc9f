//! `mirrorfetch config`: inspect and edit `config.ini`.
//!
//! Values are always shown next to their built-in defaults so it is clear
//! which settings the file actually overrides.

use clap::Subcommand;
use console::style;
use mirrorfetch::config::{config_file_path, format_size, ConfigFile, ConfigKey};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print one setting (e.g. `download.workers`)
    Get {
        #[arg(value_parser = parse_key)]
        key: ConfigKey,
    },

    /// Change one setting and save the file
    Set {
        #[arg(value_parser = parse_key)]
        key: ConfigKey,
        value: String,
    },

    /// Show every setting with its default
    List {
        /// Only show settings that differ from the default
        #[arg(long)]
        changed: bool,
    },

    /// Print where the config file lives
    Path,
}

pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Get { key } => {
            let config = ConfigFile::load()?;
            let row = Row::new(key, &config);
            if row.overridden {
                println!("{} (default: {})", row.value, row.default);
            } else {
                println!("{}", row.value);
            }
            Ok(())
        }
        ConfigCommands::Set { key, value } => {
            let mut config = ConfigFile::load()?;
            let before = display_value(key, &config);
            key.set(&mut config, &value)?;
            config.save()?;
            println!("{}: {} -> {}", key, before, display_value(key, &config));
            Ok(())
        }
        ConfigCommands::List { changed } => {
            let config = ConfigFile::load()?;
            print_table(&rows(&config, changed));
            Ok(())
        }
        ConfigCommands::Path => {
            let path = config_file_path();
            if path.exists() {
                println!("{}", path.display());
            } else {
                println!("{} {}", path.display(), style("(not created yet)").dim());
            }
            Ok(())
        }
    }
}

fn parse_key(s: &str) -> Result<ConfigKey, String> {
    s.parse::<ConfigKey>()
        .map_err(|e| format!("{e}; run `mirrorfetch config list` for the known keys"))
}

/// One line of `config list`.
#[derive(Debug, Clone, PartialEq)]
struct Row {
    key: ConfigKey,
    value: String,
    default: String,
    overridden: bool,
}

impl Row {
    fn new(key: ConfigKey, config: &ConfigFile) -> Self {
        let defaults = ConfigFile::default();
        Self {
            key,
            value: display_value(key, config),
            default: display_value(key, &defaults),
            overridden: key.get(config) != key.get(&defaults),
        }
    }
}

fn rows(config: &ConfigFile, changed_only: bool) -> Vec<Row> {
    ConfigKey::all()
        .iter()
        .map(|&key| Row::new(key, config))
        .filter(|row| row.overridden || !changed_only)
        .collect()
}

/// Human-readable value: sizes get a unit, unset limits read `auto`.
fn display_value(key: ConfigKey, config: &ConfigFile) -> String {
    let raw = key.get(config);
    match key {
        ConfigKey::DownloadChunkSize => format!(
            "{} ({})",
            raw,
            format_size(config.download.chunk_size as usize)
        ),
        ConfigKey::DownloadMaxBufferedChunks if raw.is_empty() => "auto".to_string(),
        _ => raw,
    }
}

fn print_table(rows: &[Row]) {
    if rows.is_empty() {
        println!("All settings use their defaults.");
        return;
    }

    let key_width = rows.iter().map(|r| r.key.name().len()).max().unwrap_or(0);
    let value_width = rows.iter().map(|r| r.value.len()).max().unwrap_or(0);

    println!(
        "{:key_width$}  {:value_width$}  {}",
        style("KEY").bold(),
        style("VALUE").bold(),
        style("DEFAULT").bold()
    );
    for row in rows {
        let marker = if row.overridden { "*" } else { " " };
        println!(
            "{:key_width$}  {:value_width$}  {}{}",
            row.key.name(),
            row.value,
            style(&row.default).dim(),
            marker
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_not_overridden() {
        let all = rows(&ConfigFile::default(), false);
        assert_eq!(all.len(), ConfigKey::all().len());
        assert!(all.iter().all(|r| !r.overridden && r.value == r.default));
        assert!(rows(&ConfigFile::default(), true).is_empty());
    }

    #[test]
    fn test_changed_rows_only() {
        let mut config = ConfigFile::default();
        ConfigKey::DownloadWorkers.set(&mut config, "9").unwrap();

        let changed = rows(&config, true);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].key, ConfigKey::DownloadWorkers);
        assert_eq!(changed[0].value, "9");
    }

    #[test]
    fn test_display_value_units() {
        let mut config = ConfigFile::default();
        ConfigKey::DownloadChunkSize.set(&mut config, "1536").unwrap();
        assert_eq!(
            display_value(ConfigKey::DownloadChunkSize, &config),
            "1536 (1.5 KB)"
        );
        assert_eq!(
            display_value(ConfigKey::DownloadMaxBufferedChunks, &config),
            "auto"
        );
    }

    #[test]
    fn test_parse_key_hint() {
        assert_eq!(parse_key("download.retries"), Ok(ConfigKey::DownloadRetries));
        let err = parse_key("download.nope").unwrap_err();
        assert!(err.contains("config list"));
    }
}
