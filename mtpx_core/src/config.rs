//! Engine configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Names that are never walked or transferred.
///
/// Platform metadata files plus a sentinel used by device test fixtures.
pub const DISALLOWED_FILES: &[&str] = &[
    ".DS_Store",
    "._.DS_Store",
    "Thumbs.db",
    "desktop.ini",
    "mtpx-disallowed-test-file",
];

/// Prefix marking hidden files.
pub const HIDDEN_PREFIX: &str = ".";

/// Mode for directories created on the local side.
pub const LOCAL_DIR_MODE: u32 = 0o755;

/// Configuration shared by every operation of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Exact file names skipped by walks and transfers.
    pub disallowed_files: Vec<String>,
    /// Names starting with this prefix count as hidden.
    pub hidden_prefix: String,
    /// Permission bits for local directories (unix only).
    pub local_dir_mode: u32,
    /// Replace existing remote files on upload.
    pub overwrite: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            disallowed_files: DISALLOWED_FILES.iter().map(|s| s.to_string()).collect(),
            hidden_prefix: HIDDEN_PREFIX.to_string(),
            local_dir_mode: LOCAL_DIR_MODE,
            overwrite: true,
        }
    }
}

impl Config {
    /// Parse a `key=value` configuration.
    ///
    /// Blank lines and `#` comments are ignored. Unknown keys are rejected.
    /// Keys not present keep their default value.
    ///
    /// ```text
    /// disallowed=.DS_Store,Thumbs.db
    /// hidden_prefix=.
    /// local_dir_mode=750
    /// overwrite=false
    /// ```
    pub fn parse(content: &str) -> Result<Self> {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| Error::invalid_config(format!("expected key=value: {:?}", line)))?;
            let value = value.trim();

            match key.trim() {
                "disallowed" => {
                    config.disallowed_files = value
                        .split(',')
                        .map(str::trim)
                        .filter(|name| !name.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                "hidden_prefix" => {
                    if value.is_empty() {
                        return Err(Error::invalid_config("hidden_prefix cannot be empty"));
                    }
                    config.hidden_prefix = value.to_string();
                }
                "local_dir_mode" => {
                    config.local_dir_mode = u32::from_str_radix(value, 8).map_err(|e| {
                        Error::invalid_config(format!("local_dir_mode {:?}: {}", value, e))
                    })?;
                }
                "overwrite" => {
                    config.overwrite = value.parse().map_err(|e| {
                        Error::invalid_config(format!("overwrite {:?}: {}", value, e))
                    })?;
                }
                other => return Err(Error::invalid_config(format!("unknown key {:?}", other))),
            }
        }

        Ok(config)
    }

    /// Returns true if `name` is on the disallowed list (exact match).
    pub fn is_disallowed(&self, name: &str) -> bool {
        self.disallowed_files.iter().any(|d| d == name)
    }

    /// Returns true if `name` is hidden.
    pub fn is_hidden(&self, name: &str) -> bool {
        name.starts_with(&self.hidden_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.is_disallowed(".DS_Store"));
        assert!(config.is_disallowed("mtpx-disallowed-test-file"));
        assert!(!config.is_disallowed(".ds_store"));
        assert!(config.is_hidden(".ssh"));
        assert!(!config.is_hidden("a.txt"));
        assert_eq!(config.local_dir_mode, 0o755);
        assert!(config.overwrite);
    }

    #[test]
    fn test_parse_config() {
        let content = "# device profile\ndisallowed=foo, bar\nlocal_dir_mode=750\noverwrite=false\n";
        let config = Config::parse(content).unwrap();
        assert_eq!(config.disallowed_files, vec!["foo", "bar"]);
        assert_eq!(config.local_dir_mode, 0o750);
        assert!(!config.overwrite);
        assert_eq!(config.hidden_prefix, ".");
    }

    #[test]
    fn test_parse_config_empty_keeps_defaults() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn test_parse_config_unknown_key() {
        assert!(Config::parse("chunk=4\n").is_err());
    }

    #[test]
    fn test_parse_config_invalid_mode() {
        assert!(Config::parse("local_dir_mode=999\n").is_err());
    }

    #[test]
    fn test_parse_config_missing_separator() {
        assert!(Config::parse("overwrite\n").is_err());
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: Config = serde_json::from_str(r#"{"overwrite": false}"#).unwrap();
        assert!(!config.overwrite);
        assert!(config.is_disallowed(".DS_Store"));
    }
}
