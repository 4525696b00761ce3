//! `.git/spire/config.toml`.
//!
//! Every field is optional. A missing file means defaults; command-line flags
//! win over anything set here.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::inspector::DEFAULT_READ_RETRIES;

/// Repository-local settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default, skip_serializing_if = "GitHubConfig::is_empty")]
    pub github: GitHubConfig,
}

impl Config {
    /// Read the config at `path`, or defaults when there is no file.
    ///
    /// # Errors
    /// Returns `StateParseError` naming the file when it isn't valid TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(err.into()),
        };

        toml::from_str(&text).map_err(|err| Error::StateParseError {
            file: path.to_path_buf(),
            message: err.message().to_string(),
        })
    }

    /// Write the config to `path`.
    ///
    /// # Errors
    /// Returns error if the file can't be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, text)?;
        Ok(())
    }

    /// `flag` if given, else the configured base.
    #[must_use]
    pub fn base<'a>(&'a self, flag: Option<&'a str>) -> &'a str {
        flag.unwrap_or(&self.general.default_base)
    }

    /// `flag` if given, else the configured remote.
    #[must_use]
    pub fn remote<'a>(&'a self, flag: Option<&'a str>) -> &'a str {
        flag.unwrap_or(&self.general.default_remote)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Remote that sync and push talk to.
    pub default_remote: String,

    /// Base used when `--base` is omitted.
    pub default_base: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_remote: "origin".into(),
            default_base: "main".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Attempts for read-only history queries before giving up.
    pub read_retries: u32,

    /// Push moved branches at the end of `sync-stack`.
    pub push: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            read_retries: DEFAULT_READ_RETRIES,
            push: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// API root for GitHub Enterprise installs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl GitHubConfig {
    const fn is_empty(&self) -> bool {
        self.api_url.is_none()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.general.default_remote, "origin");
        assert_eq!(config.general.default_base, "main");
        assert_eq!(config.sync.read_retries, DEFAULT_READ_RETRIES);
        assert!(config.sync.push);
        assert!(config.github.api_url.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let config = Config {
            general: GeneralConfig {
                default_remote: "upstream".into(),
                default_base: "develop".into(),
            },
            sync: SyncConfig {
                read_retries: 5,
                push: false,
            },
            github: GitHubConfig {
                api_url: Some("https://github.example.com/api/v3".into()),
            },
        };
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config: Config = toml::from_str("[sync]\npush = false\n").unwrap();
        assert!(!config.sync.push);
        assert_eq!(config.sync.read_retries, DEFAULT_READ_RETRIES);
        assert_eq!(config.general.default_base, "main");
    }

    #[test]
    fn test_missing_file_is_default() {
        let temp = TempDir::new().unwrap();
        let config = Config::load(temp.path().join("nope.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_invalid_file_names_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "[sync\n").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, Error::StateParseError { ref file, .. } if *file == path));
    }

    #[test]
    fn test_flags_override_config() {
        let config = Config::default();
        assert_eq!(config.base(None), "main");
        assert_eq!(config.base(Some("trunk")), "trunk");
        assert_eq!(config.remote(None), "origin");
        assert_eq!(config.remote(Some("fork")), "fork");
    }
}
