use std::path::Path;

use camino::Utf8PathBuf;
use config::Config;
use config::ConfigError as ExternalConfigError;
use config::Environment;
use config::File;
use config::FileFormat;
use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

const ENV_PREFIX: &str = "VNOTES";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration build/deserialize error")]
    Config(#[from] ExternalConfigError),
    #[error("No platform data directory available for notes")]
    NoDataDir,
    #[error("Notes directory is not valid UTF-8: {0}")]
    NonUtf8Path(String),
}

#[derive(Debug, Deserialize, PartialEq, Eq, Clone)]
#[serde(default)]
pub struct Settings {
    pub debug: bool,
    pub debounce_ms: u64,
    pub typing_window_ms: u64,
    pub retry_backoff_ms: u64,
    pub sweep_interval_ms: u64,
    pub notes_dir: Option<Utf8PathBuf>,
    pub seed_welcome: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: false,
            debounce_ms: 1000,
            typing_window_ms: 500,
            retry_backoff_ms: 2000,
            sweep_interval_ms: 3000,
            notes_dir: None,
            seed_welcome: true,
        }
    }
}

impl Settings {
    /// Load settings from the user config file, an optional explicit file, and
    /// `VNOTES_*` environment variables, in increasing priority.
    pub fn new(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let user_config_file = project_dirs().map(|dirs| dirs.config_dir().join("vnotes.toml"));

        Self::load_from_sources(user_config_file.as_deref(), explicit, None)
    }

    fn load_from_sources(
        user_config_path: Option<&Path>,
        explicit_path: Option<&Path>,
        env_override: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = user_config_path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        if let Some(path) = explicit_path {
            tracing::debug!(path = %path.display(), "Loading explicit config file");
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .source(env_override),
        );

        let config = builder.build()?;
        let settings = config.try_deserialize()?;
        Ok(settings)
    }

    /// Directory holding one JSON file per note.
    ///
    /// Falls back to `<platform data dir>/notes` when no override is configured.
    pub fn notes_dir(&self) -> Result<Utf8PathBuf, ConfigError> {
        if let Some(dir) = &self.notes_dir {
            return Ok(dir.clone());
        }

        let dirs = project_dirs().ok_or(ConfigError::NoDataDir)?;
        let notes = dirs.data_local_dir().join("notes");
        Utf8PathBuf::from_path_buf(notes)
            .map_err(|path| ConfigError::NonUtf8Path(path.display().to_string()))
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com.github", "voidnotes", "vnotes")
}
