// Configuration loading and parsing (draftroom.toml).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::draft::board::DEFAULT_BOARD_MAX_SIZE;
use crate::engine::EngineSettings;

/// Seconds a team has to pick before autopick fires.
pub const DEFAULT_PICK_TIMER_SECS: u64 = 240;

/// Seconds remaining when the time warning goes out.
pub const DEFAULT_WARNING_SECS: u64 = 60;

/// Clock for teams in forklift mode.
pub const DEFAULT_FORKLIFT_TIMER_SECS: u64 = 10;

const CONFIG_FILE: &str = "draftroom.toml";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub draft: DraftConfig,
    pub autopick: AutopickConfig,
    pub db_path: String,
    pub data_paths: DataPaths,
}

/// Raw deserialization target for the entire draftroom.toml file.
#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    draft: DraftConfig,
    #[serde(default)]
    autopick: AutopickConfig,
    database: DatabaseSection,
    data_paths: DataPaths,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DraftConfig {
    /// Fixed session id. When absent the stored current session is resumed,
    /// or a new one is generated.
    pub session_id: Option<String>,
    pub pick_timer_secs: u64,
    pub warning_secs: u64,
    pub forklift_timer_secs: u64,
    pub board_max_size: usize,
}

impl Default for DraftConfig {
    fn default() -> Self {
        DraftConfig {
            session_id: None,
            pick_timer_secs: DEFAULT_PICK_TIMER_SECS,
            warning_secs: DEFAULT_WARNING_SECS,
            forklift_timer_secs: DEFAULT_FORKLIFT_TIMER_SECS,
            board_max_size: DEFAULT_BOARD_MAX_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AutopickConfig {
    /// Slot tags that restrict the fallback ranking to players carrying the
    /// same tag.
    #[serde(default)]
    pub restricted_tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataPaths {
    pub draft_order: String,
    pub players: String,
    pub event_log: String,
}

impl Config {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            pick_timer: Duration::from_secs(self.draft.pick_timer_secs),
            warning: Duration::from_secs(self.draft.warning_secs),
            forklift_timer: Duration::from_secs(self.draft.forklift_timer_secs),
            board_max_size: self.draft.board_max_size,
            restricted_tags: self.autopick.restricted_tags.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate `config/draftroom.toml` relative to `base_dir`.
///
/// Does not copy defaults; `load_config()` does.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = read_file(&path)?;
    let config = parse_config(&text, &path)?;
    validate(&config)?;
    Ok(config)
}

fn parse_config(text: &str, path: &Path) -> Result<Config, ConfigError> {
    let file: ConfigFile = toml::from_str(text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(Config {
        draft: file.draft,
        autopick: file.autopick,
        db_path: file.database.path,
        data_paths: file.data_paths,
    })
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files and
/// never overwrites an existing file.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    let mut copied = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Load config relative to the current working directory, copying defaults
/// first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let draft = &config.draft;

    if draft.pick_timer_secs == 0 {
        return Err(ConfigError::ValidationError {
            field: "draft.pick_timer_secs".into(),
            message: "must be greater than 0".into(),
        });
    }

    if draft.warning_secs >= draft.pick_timer_secs {
        return Err(ConfigError::ValidationError {
            field: "draft.warning_secs".into(),
            message: format!(
                "must be less than pick_timer_secs ({}), got {}",
                draft.pick_timer_secs, draft.warning_secs
            ),
        });
    }

    if draft.forklift_timer_secs == 0 || draft.forklift_timer_secs > draft.pick_timer_secs {
        return Err(ConfigError::ValidationError {
            field: "draft.forklift_timer_secs".into(),
            message: format!(
                "must be between 1 and pick_timer_secs ({}), got {}",
                draft.pick_timer_secs, draft.forklift_timer_secs
            ),
        });
    }

    if draft.board_max_size == 0 {
        return Err(ConfigError::ValidationError {
            field: "draft.board_max_size".into(),
            message: "must be greater than 0".into(),
        });
    }

    if draft.session_id.as_deref().is_some_and(|s| s.trim().is_empty()) {
        return Err(ConfigError::ValidationError {
            field: "draft.session_id".into(),
            message: "must not be empty when set".into(),
        });
    }

    let paths: &[(&str, &str)] = &[
        ("database.path", config.db_path.as_str()),
        ("data_paths.draft_order", config.data_paths.draft_order.as_str()),
        ("data_paths.players", config.data_paths.players.as_str()),
        ("data_paths.event_log", config.data_paths.event_log.as_str()),
    ];
    for (name, val) in paths {
        if val.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must not be empty".into(),
            });
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
