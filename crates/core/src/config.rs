//! TOML-based configuration for bibsync.
//!
//! Every section is optional; a missing file section falls back to its
//! defaults. The merge core itself reads no configuration: callers turn the
//! loaded values into explicit arguments (see [`AppConfig::writer_options`]).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bib::WriterOptions;
use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Repository and library file location.
    #[serde(default)]
    pub repository: RepositoryConfig,

    /// Identity used for merge commits.
    #[serde(default)]
    pub author: AuthorConfig,

    /// Output layout for rewritten entries.
    #[serde(default)]
    pub codec: CodecConfig,

    /// Logging.
    #[serde(default)]
    pub general: GeneralConfig,
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Path to the git working copy (default: current directory).
    #[serde(default = "default_repo_path")]
    pub path: PathBuf,

    /// Library file, relative to the repository root.
    #[serde(default = "default_library")]
    pub library: String,
}

fn default_repo_path() -> PathBuf {
    PathBuf::from(".")
}
fn default_library() -> String {
    "library.bib".into()
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            path: default_repo_path(),
            library: default_library(),
        }
    }
}

// ---------------------------------------------------------------------------
// Author
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorConfig {
    #[serde(default = "default_author_name")]
    pub name: String,
    #[serde(default = "default_author_email")]
    pub email: String,
}

fn default_author_name() -> String {
    "bibsync".into()
}
fn default_author_email() -> String {
    "bibsync@localhost".into()
}

impl Default for AuthorConfig {
    fn default() -> Self {
        Self {
            name: default_author_name(),
            email: default_author_email(),
        }
    }
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Indentation for fields of rewritten entries.
    #[serde(default = "default_indent")]
    pub indent: String,
}

fn default_indent() -> String {
    "  ".into()
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            indent: default_indent(),
        }
    }
}

// ---------------------------------------------------------------------------
// General
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "warn".into()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Validate that all fields are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let library = self.repository.library.trim();
        if library.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "repository.library".into(),
                detail: "library path must not be empty".into(),
            });
        }
        if Path::new(library).is_absolute() || library.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "repository.library".into(),
                detail: "library path must be relative to the repository root".into(),
            });
        }
        if !self.codec.indent.chars().all(|c| c == ' ' || c == '\t') {
            return Err(ConfigError::InvalidValue {
                field: "codec.indent".into(),
                detail: "indent may only contain spaces and tabs".into(),
            });
        }
        if self.author.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "author.name".into(),
                detail: "author name must not be empty".into(),
            });
        }
        if !self.author.email.contains('@') {
            return Err(ConfigError::InvalidValue {
                field: "author.email".into(),
                detail: "author email must contain '@'".into(),
            });
        }

        Ok(())
    }

    /// Convenience: load and validate in one call.
    pub fn load_and_validate<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML, e.g. for writing a starter file.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Codec layout derived from the `[codec]` section.
    pub fn writer_options(&self) -> WriterOptions {
        WriterOptions {
            indent: self.codec.indent.clone(),
        }
    }
}
