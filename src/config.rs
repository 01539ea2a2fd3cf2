//! Configuration loading.
//!
//! The configuration lives in a TOML file at the platform's per-user
//! config directory, `idxgrep/idxgrep.conf`. A missing file yields the
//! defaults; a malformed file is a [`FormatError`].

use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;

use serde::Deserialize;

/// Default maximum size of an indexable file (10 MiB).
pub const DEFAULT_MAX_FILESIZE: u64 = 10 * 1024 * 1024;

/// Default per-request deadline for short store calls, in seconds.
pub const DEFAULT_TIMEOUT: u64 = 30;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub regexp_index: RegexpIndex,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Global {
    /// Base URL of the backing store.
    #[serde(default = "default_server")]
    pub server: String,
    /// Per-request deadline in seconds for search/delete/create calls.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegexpIndex {
    /// Name of the index holding file documents.
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default = "default_max_filesize")]
    pub max_filesize: u64,
}

fn default_server() -> String {
    "http://localhost:9200".to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT
}

fn default_index() -> String {
    "files".to_string()
}

fn default_max_filesize() -> u64 {
    DEFAULT_MAX_FILESIZE
}

impl Default for Global {
    fn default() -> Self {
        Global {
            server: default_server(),
            timeout: default_timeout(),
        }
    }
}

impl Default for RegexpIndex {
    fn default() -> Self {
        RegexpIndex {
            index: default_index(),
            max_filesize: default_max_filesize(),
        }
    }
}

/// A syntactically invalid configuration file.
#[derive(Debug)]
pub struct FormatError(pub toml::de::Error);

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid configuration: {}", self.0)
    }
}

impl std::error::Error for FormatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

/// Path of the configuration file for the current user.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("idxgrep")
        .join("idxgrep.conf")
}

/// Parse a configuration from TOML text.
pub fn parse(text: &str) -> Result<Config, FormatError> {
    toml::from_str(text).map_err(FormatError)
}

/// Load the configuration file at `path`. A missing file is not an
/// error; the defaults are substituted silently.
pub fn load_file(path: &PathBuf) -> anyhow::Result<Config> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Config::default()),
        Err(err) => return Err(err.into()),
    };
    Ok(parse(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.global.server, "http://localhost:9200");
        assert_eq!(cfg.regexp_index.index, "files");
        assert_eq!(cfg.regexp_index.max_filesize, DEFAULT_MAX_FILESIZE);
    }

    #[test]
    fn parse_full() {
        let cfg = parse(
            r#"
            [global]
            server = "http://search.example.net:9200"

            [regexp_index]
            index = "code"
            max_filesize = 1048576
            "#,
        )
        .unwrap();
        assert_eq!(cfg.global.server, "http://search.example.net:9200");
        assert_eq!(cfg.regexp_index.index, "code");
        assert_eq!(cfg.regexp_index.max_filesize, 1048576);
    }

    #[test]
    fn parse_partial_uses_defaults() {
        let cfg = parse("[global]\nserver = \"http://other:9200\"\n").unwrap();
        assert_eq!(cfg.global.server, "http://other:9200");
        assert_eq!(cfg.regexp_index.index, "files");
    }

    #[test]
    fn unknown_sections_are_tolerated() {
        // Config files from older installs may carry sections we no
        // longer read, e.g. a chat index.
        let cfg = parse("[chat_index]\nindex = \"chat\"\n").unwrap();
        assert_eq!(cfg.regexp_index.index, "files");
    }

    #[test]
    fn malformed_is_format_error() {
        assert!(parse("[global\nserver=").is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = load_file(&PathBuf::from("/nonexistent/idxgrep.conf")).unwrap();
        assert_eq!(cfg.regexp_index.index, "files");
    }
}
