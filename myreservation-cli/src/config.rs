use myreservation_core::firebase::{Endpoints, FirebaseConfig};
use myreservation_core::Locale;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Firebase project settings
#[derive(Debug, Clone, Serialize)]
pub struct FirebaseSettings {
    pub api_key: ConfigValue<Option<String>>,
    pub project_id: ConfigValue<Option<String>>,
    pub auth_emulator_host: ConfigValue<Option<String>>,
    pub firestore_emulator_host: ConfigValue<Option<String>>,
}

impl Default for FirebaseSettings {
    fn default() -> Self {
        let unset = || ConfigValue::new(None, ConfigSource::Default);
        Self {
            api_key: unset(),
            project_id: unset(),
            auth_emulator_host: unset(),
            firestore_emulator_host: unset(),
        }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Directory holding the durable session
    pub data_dir: ConfigValue<PathBuf>,
    /// Language of user-facing messages
    pub locale: ConfigValue<Locale>,
    /// How often live queries are re-run
    pub poll_interval_ms: ConfigValue<u64>,
    pub firebase: FirebaseSettings,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    locale: Option<Locale>,
    poll_interval_ms: Option<u64>,
    firebase: Option<FirebaseFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct FirebaseFile {
    api_key: Option<String>,
    project_id: Option<String>,
    auth_emulator_host: Option<String>,
    firestore_emulator_host: Option<String>,
}

fn set_from_file(target: &mut ConfigValue<Option<String>>, value: Option<String>) {
    if value.is_some() {
        *target = ConfigValue::new(value, ConfigSource::File);
    }
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::load_with_env(config_path, |name| std::env::var(name).ok())
    }

    /// Like [`load`](Self::load), reading environment variables through `env`.
    pub fn load_with_env(
        config_path: Option<PathBuf>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        // Start with defaults
        let mut data_dir = ConfigValue::new(Self::default_data_dir(), ConfigSource::Default);
        let mut locale = ConfigValue::new(Locale::default(), ConfigSource::Default);
        let mut poll_interval_ms =
            ConfigValue::new(DEFAULT_POLL_INTERVAL_MS, ConfigSource::Default);
        let mut firebase = FirebaseSettings::default();
        let mut config_file = None;

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(dir) = file_config.data_dir {
                // Resolve relative paths against config file's directory
                let resolved = if dir.is_relative() {
                    path.parent().map(|p| p.join(&dir)).unwrap_or(dir)
                } else {
                    dir
                };
                data_dir = ConfigValue::new(resolved, ConfigSource::File);
            }
            if let Some(l) = file_config.locale {
                locale = ConfigValue::new(l, ConfigSource::File);
            }
            if let Some(ms) = file_config.poll_interval_ms {
                if ms == 0 {
                    return Err(ConfigError::InvalidValue(
                        path.clone(),
                        "poll_interval_ms",
                        "must be at least 1".to_string(),
                    ));
                }
                poll_interval_ms = ConfigValue::new(ms, ConfigSource::File);
            }
            if let Some(fb) = file_config.firebase {
                set_from_file(&mut firebase.api_key, fb.api_key);
                set_from_file(&mut firebase.project_id, fb.project_id);
                set_from_file(&mut firebase.auth_emulator_host, fb.auth_emulator_host);
                set_from_file(
                    &mut firebase.firestore_emulator_host,
                    fb.firestore_emulator_host,
                );
            }
        }

        // Apply environment variable overrides
        if let Some(dir) = env("RESV_DATA_DIR") {
            data_dir = ConfigValue::new(PathBuf::from(dir), ConfigSource::Environment);
        }
        if let Some(value) = env("RESV_LOCALE") {
            let parsed = value
                .parse::<Locale>()
                .map_err(|reason| ConfigError::InvalidEnv("RESV_LOCALE", reason))?;
            locale = ConfigValue::new(parsed, ConfigSource::Environment);
        }
        if let Some(value) = env("RESV_POLL_INTERVAL_MS") {
            let parsed = value.parse::<u64>().map_err(|e| {
                ConfigError::InvalidEnv("RESV_POLL_INTERVAL_MS", format!("{}: {}", value, e))
            })?;
            if parsed == 0 {
                return Err(ConfigError::InvalidEnv(
                    "RESV_POLL_INTERVAL_MS",
                    "must be at least 1".to_string(),
                ));
            }
            poll_interval_ms = ConfigValue::new(parsed, ConfigSource::Environment);
        }
        let overrides = [
            ("RESV_API_KEY", &mut firebase.api_key),
            ("RESV_PROJECT_ID", &mut firebase.project_id),
            ("FIREBASE_AUTH_EMULATOR_HOST", &mut firebase.auth_emulator_host),
            ("FIRESTORE_EMULATOR_HOST", &mut firebase.firestore_emulator_host),
        ];
        for (name, target) in overrides {
            if let Some(value) = env(name) {
                *target = ConfigValue::new(Some(value), ConfigSource::Environment);
            }
        }

        Ok(Self {
            data_dir,
            locale,
            poll_interval_ms,
            firebase,
            config_file,
        })
    }

    /// Firebase client settings, or the names of the missing keys.
    pub fn firebase_config(&self) -> Result<FirebaseConfig, ConfigError> {
        let (api_key, project_id) = match (
            &self.firebase.api_key.value,
            &self.firebase.project_id.value,
        ) {
            (Some(key), Some(project)) => (key, project),
            (key, project) => {
                let mut missing = Vec::new();
                if key.is_none() {
                    missing.push("firebase.api_key");
                }
                if project.is_none() {
                    missing.push("firebase.project_id");
                }
                return Err(ConfigError::NotConfigured(missing));
            }
        };

        let endpoints = Endpoints::with_emulators(
            self.firebase.auth_emulator_host.value.as_deref(),
            self.firebase.firestore_emulator_host.value.as_deref(),
        );
        Ok(FirebaseConfig::new(api_key.as_str(), project_id.as_str()).with_endpoints(endpoints))
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/resv/
    /// - macOS: ~/Library/Application Support/resv/
    /// - Windows: %APPDATA%/resv/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("resv")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/resv/
    /// - macOS: ~/Library/Application Support/resv/
    /// - Windows: %APPDATA%/resv/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("resv")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidEnv(&'static str, String),
    InvalidValue(PathBuf, &'static str, String),
    NotConfigured(Vec<&'static str>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidEnv(name, reason) => {
                write!(f, "Invalid value for {}: {}", name, reason)
            }
            ConfigError::InvalidValue(path, key, reason) => {
                write!(
                    f,
                    "Invalid value for {} in '{}': {}",
                    key,
                    path.display(),
                    reason
                )
            }
            ConfigError::NotConfigured(missing) => {
                write!(
                    f,
                    "Firebase not configured. Set {} in config.",
                    missing.join(" and ")
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::tempdir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_default_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nonexistent.yaml");

        let config = Config::load_with_env(Some(config_path), no_env).unwrap();
        assert!(config.data_dir.value.ends_with("resv"));
        assert_eq!(config.data_dir.source, ConfigSource::Default);
        assert_eq!(config.locale.value, Locale::Ja);
        assert_eq!(config.poll_interval_ms.value, 2000);
        assert_eq!(config.firebase.api_key.value, None);
        assert_eq!(config.config_file, None);
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "data_dir: state").unwrap();
        writeln!(file, "locale: en").unwrap();
        writeln!(file, "poll_interval_ms: 500").unwrap();
        writeln!(file, "firebase:").unwrap();
        writeln!(file, "  api_key: AIza-test").unwrap();
        writeln!(file, "  project_id: salon-demo").unwrap();

        let config = Config::load_with_env(Some(config_path.clone()), no_env).unwrap();
        assert_eq!(config.data_dir.value, temp_dir.path().join("state"));
        assert_eq!(config.data_dir.source, ConfigSource::File);
        assert_eq!(config.locale.value, Locale::En);
        assert_eq!(config.poll_interval_ms.value, 500);
        assert_eq!(config.firebase.api_key.value.as_deref(), Some("AIza-test"));
        assert_eq!(config.firebase.api_key.source, ConfigSource::File);
        assert_eq!(config.firebase.auth_emulator_host.source, ConfigSource::Default);
        assert_eq!(config.config_file, Some(config_path));

        let firebase = config.firebase_config().unwrap();
        assert_eq!(firebase.project_id, "salon-demo");
        assert_eq!(firebase.endpoints, Endpoints::production());
    }

    #[test]
    fn test_env_overrides_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "locale: en\nfirebase:\n  project_id: from-file\n").unwrap();

        let env: HashMap<&str, &str> = [
            ("RESV_LOCALE", "ja"),
            ("RESV_PROJECT_ID", "from-env"),
            ("RESV_API_KEY", "key"),
            ("FIREBASE_AUTH_EMULATOR_HOST", "127.0.0.1:9099"),
        ]
        .into_iter()
        .collect();

        let config =
            Config::load_with_env(Some(config_path), |k| env.get(k).map(|v| v.to_string()))
                .unwrap();
        assert_eq!(config.locale.value, Locale::Ja);
        assert_eq!(config.locale.source, ConfigSource::Environment);
        assert_eq!(config.firebase.project_id.value.as_deref(), Some("from-env"));
        assert_eq!(config.firebase.project_id.source, ConfigSource::Environment);

        let firebase = config.firebase_config().unwrap();
        assert_eq!(
            firebase.endpoints.identity_toolkit,
            "http://127.0.0.1:9099/identitytoolkit.googleapis.com/v1"
        );
    }

    #[test]
    #[ignore] // Run with --ignored; env vars can pollute parallel tests
    fn test_process_env_override() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "poll_interval_ms: 100\n").unwrap();

        std::env::set_var("RESV_POLL_INTERVAL_MS", "250");

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.poll_interval_ms.value, 250);
        assert_eq!(config.poll_interval_ms.source, ConfigSource::Environment);

        std::env::remove_var("RESV_POLL_INTERVAL_MS");
    }

    #[test]
    fn test_invalid_env_value() {
        let temp_dir = tempdir().unwrap();
        let result = Config::load_with_env(Some(temp_dir.path().join("none.yaml")), |k| {
            (k == "RESV_LOCALE").then(|| "fr".to_string())
        });
        let err = result.unwrap_err();
        assert!(err.to_string().contains("RESV_LOCALE"));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "poll_interval_ms: 0\n").unwrap();

        let err = Config::load_with_env(Some(config_path.clone()), no_env).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue(_, "poll_interval_ms", _)
        ));

        let err = Config::load_with_env(Some(temp_dir.path().join("none.yaml")), |k| {
            (k == "RESV_POLL_INTERVAL_MS").then(|| "0".to_string())
        })
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid value for RESV_POLL_INTERVAL_MS: must be at least 1"
        );
    }

    #[test]
    fn test_invalid_yaml_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "invalid: yaml: content: [").unwrap();

        let result = Config::load_with_env(Some(config_path), no_env);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_missing_firebase_keys_named() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "firebase:\n  project_id: demo\n").unwrap();

        let config = Config::load_with_env(Some(config_path), no_env).unwrap();
        let err = config.firebase_config().unwrap_err();

        assert_eq!(
            err.to_string(),
            "Firebase not configured. Set firebase.api_key in config."
        );
    }
}
