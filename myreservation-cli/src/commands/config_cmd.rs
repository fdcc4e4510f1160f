use clap::{Args, Subcommand};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::OutputFormat;
use crate::config::{Config, ConfigValue};

const DEFAULT_CONFIG: &str = r#"# resv configuration

# Language of messages: ja or en
locale: ja

# Directory holding the remembered session (default: platform data dir)
# data_dir: ~/.local/share/resv

# Milliseconds between refreshes of the reservation list
# poll_interval_ms: 2000

firebase:
  # api_key: your-web-api-key
  # project_id: your-project-id
  # Local emulators, host:port
  # auth_emulator_host: 127.0.0.1:9099
  # firestore_emulator_host: 127.0.0.1:8080
"#;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Initialize configuration file
    Init,
}

impl ConfigCommand {
    pub fn run(
        &self,
        config: &Config,
        config_path: Option<PathBuf>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let mut out = io::stdout();
        match &self.command {
            ConfigSubcommand::Show { format } => show(config, *format, &mut out),
            ConfigSubcommand::Init => {
                let path = config_path.unwrap_or_else(Config::default_config_path);
                init(&path, &mut out)
            }
        }
    }
}

fn show<W: Write>(
    config: &Config,
    format: OutputFormat,
    out: &mut W,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => {
            writeln!(out, "{}", serde_json::to_string_pretty(config)?)?;
        }
        OutputFormat::Text => {
            writeln!(out, "Configuration")?;
            writeln!(out, "=============\n")?;

            if let Some(path) = &config.config_file {
                writeln!(out, "Config file: {}", path.display())?;
            } else {
                writeln!(
                    out,
                    "Config file: {} (not found)",
                    Config::default_config_path().display()
                )?;
            }
            writeln!(out)?;

            writeln!(out, "data_dir: {}", config.data_dir.value.display())?;
            writeln!(out, "  source: {}", config.data_dir.source)?;
            writeln!(out)?;

            writeln!(out, "locale: {}", config.locale.value)?;
            writeln!(out, "  source: {}", config.locale.source)?;
            writeln!(out)?;

            writeln!(out, "poll_interval_ms: {}", config.poll_interval_ms.value)?;
            writeln!(out, "  source: {}", config.poll_interval_ms.source)?;

            let firebase = &config.firebase;
            for (name, setting) in [
                ("firebase.api_key", &firebase.api_key),
                ("firebase.project_id", &firebase.project_id),
                ("firebase.auth_emulator_host", &firebase.auth_emulator_host),
                (
                    "firebase.firestore_emulator_host",
                    &firebase.firestore_emulator_host,
                ),
            ] {
                writeln!(out)?;
                write_optional(out, name, setting)?;
            }
        }
    }
    Ok(())
}

fn write_optional<W: Write>(
    out: &mut W,
    name: &str,
    setting: &ConfigValue<Option<String>>,
) -> io::Result<()> {
    match &setting.value {
        Some(value) => writeln!(out, "{}: {}", name, value)?,
        None => writeln!(out, "{}: (not set)", name)?,
    }
    writeln!(out, "  source: {}", setting.source)
}

fn init<W: Write>(path: &Path, out: &mut W) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        writeln!(out, "Config file already exists: {}", path.display())?;
        writeln!(out, "Use 'resv config show' to view current configuration.")?;
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, DEFAULT_CONFIG)?;

    writeln!(out, "Created config file: {}", path.display())?;
    writeln!(
        out,
        "\nSet firebase.api_key and firebase.project_id before signing in."
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_init_writes_loadable_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("resv").join("config.yaml");
        let mut out = Vec::new();

        init(&path, &mut out).unwrap();

        let config = Config::load_with_env(Some(path.clone()), no_env).unwrap();
        assert_eq!(config.config_file, Some(path));
        assert!(String::from_utf8(out)
            .unwrap()
            .starts_with("Created config file:"));
    }

    #[test]
    fn test_init_keeps_existing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        fs::write(&path, "locale: en\n").unwrap();
        let mut out = Vec::new();

        init(&path, &mut out).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "locale: en\n");
        assert!(String::from_utf8(out)
            .unwrap()
            .starts_with("Config file already exists"));
    }

    #[test]
    fn test_show_text_lists_sources() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        fs::write(&path, "locale: en\nfirebase:\n  project_id: demo\n").unwrap();
        let config = Config::load_with_env(Some(path), no_env).unwrap();
        let mut out = Vec::new();

        show(&config, OutputFormat::Text, &mut out).unwrap();

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("locale: en\n  source: file"));
        assert!(out.contains("firebase.project_id: demo\n  source: file"));
        assert!(out.contains("firebase.api_key: (not set)\n  source: default"));
    }

    #[test]
    fn test_show_json() {
        let temp = TempDir::new().unwrap();
        let config =
            Config::load_with_env(Some(temp.path().join("missing.yaml")), no_env).unwrap();
        let mut out = Vec::new();

        show(&config, OutputFormat::Json, &mut out).unwrap();

        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(json["locale"]["value"], "ja");
        assert_eq!(json["locale"]["source"], "default");
    }
}
