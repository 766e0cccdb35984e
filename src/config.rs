//! Archive configuration, read from an `[archive]` table in TOML.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::algo::{host_supports_streaming, Algorithm};
use crate::error::{ArchiveError, Result};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "TREEPACK_CONFIG";

/// Which implementation handles the tar family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TarBackend {
    /// Delegate to the host `tar` program.
    #[default]
    External,
    /// In-process `tar` crate with Rust codecs.
    Native,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveConfig {
    pub quiet: bool,
    pub verbose: bool,
    /// Algorithm used for compression when none is requested.
    pub default_algo: Algorithm,
    pub tar_backend: TarBackend,
    /// Archiver binary; looked up on `PATH` when unset.
    pub tar_program: Option<PathBuf>,
    /// Overrides host detection of streaming-format support.
    pub streaming_formats: Option<bool>,
    /// Legacy extraction semantics: top directory renaming and algorithm
    /// re-guessing.
    pub compat: bool,
    /// Write a `.sha256` file next to each created archive.
    pub checksum: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            quiet: false,
            verbose: false,
            default_algo: Algorithm::Zip,
            tar_backend: TarBackend::External,
            tar_program: None,
            streaming_formats: None,
            compat: false,
            checksum: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigToml {
    #[serde(default)]
    archive: ArchiveConfig,
}

impl ArchiveConfig {
    /// Whether tar formats are handled at all.
    pub fn streaming_supported(&self) -> bool {
        self.streaming_formats.unwrap_or_else(host_supports_streaming)
    }

    /// Parse a TOML document.
    pub fn from_toml_str(content: &str, origin: &Path) -> Result<Self> {
        let parsed: ConfigToml = toml::from_str(content).map_err(|source| ArchiveError::Config {
            path: origin.to_path_buf(),
            source,
        })?;
        Ok(parsed.archive)
    }

    /// Load from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content, path)
    }

    /// Default per-user config location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("treepack").join("config.toml"))
    }

    /// Resolve the config: explicit path, then `$TREEPACK_CONFIG`, then the
    /// per-user file when it exists, else defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::load(Path::new(&path));
        }
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }
}
