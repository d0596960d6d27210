// Configuration for protolens
// Defaults, then an optional protolens.yaml in the first root, then environment variables

use crate::cache::DEFAULT_MAX_CACHE_SIZE;
use crate::proto::url::DEFAULT_HOST;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "protolens.yaml";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Analysis cache capacity in files (PROTOLENS_CACHE_SIZE)
    pub max_cache_size: usize,

    /// Compare parameter and return type text when matching (PROTOLENS_STRICT_SIGNATURES)
    pub strict_signatures: bool,

    pub proto_include: Vec<String>,

    pub go_include: Vec<String>,

    pub exclude: Vec<String>,

    /// Extra proto include directories (PROTOLENS_IMPORT_PATHS, a path list)
    pub import_paths: Vec<PathBuf>,

    /// Host used for generated URLs (PROTOLENS_HOST)
    pub default_host: String,

    pub no_ignore: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            strict_signatures: false,
            proto_include: vec!["**/*.proto".to_string()],
            go_include: vec!["**/*.go".to_string()],
            exclude: vec!["**/vendor/**".to_string(), "**/node_modules/**".to_string()],
            import_paths: Vec::new(),
            default_host: DEFAULT_HOST.to_string(),
            no_ignore: false,
        }
    }
}

impl Config {
    /// Load configuration for a workspace whose first root is `root`
    pub fn load(root: Option<&Path>) -> Self {
        let mut config = root
            .and_then(|root| Self::from_file(&root.join(CONFIG_FILE_NAME)))
            .unwrap_or_default();
        config.apply_env(|key| env::var(key).ok());
        config
    }

    /// Parse a config file; a missing file is not an error, a broken one is logged
    pub fn from_file(path: &Path) -> Option<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "config file unreadable, using defaults");
                return None;
            }
        };
        match Self::from_yaml(&raw) {
            Ok(config) => Some(config),
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "invalid config file, using defaults");
                None
            }
        }
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml_ng::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml_ng::from_str(raw)
    }

    /// Apply overrides from `lookup` (the process environment outside of tests)
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("PROTOLENS_CACHE_SIZE") {
            match val.trim().parse() {
                Ok(parsed) if parsed > 0 => self.max_cache_size = parsed,
                _ => tracing::warn!(
                    "Invalid PROTOLENS_CACHE_SIZE value: {}, using: {}",
                    val,
                    self.max_cache_size
                ),
            }
        }

        if let Some(val) = lookup("PROTOLENS_STRICT_SIGNATURES") {
            match parse_bool(&val) {
                Some(parsed) => self.strict_signatures = parsed,
                None => tracing::warn!(
                    "Invalid PROTOLENS_STRICT_SIGNATURES value: {}, using: {}",
                    val,
                    self.strict_signatures
                ),
            }
        }

        if let Some(val) = lookup("PROTOLENS_IMPORT_PATHS") {
            self.import_paths
                .extend(env::split_paths(&val).filter(|path| !path.as_os_str().is_empty()));
        }

        if let Some(val) = lookup("PROTOLENS_HOST") {
            let host = crate::proto::url::format_host(&val);
            if crate::proto::url::validate_host(&host) {
                self.default_host = host;
            } else {
                tracing::warn!(
                    "Invalid PROTOLENS_HOST value: {}, using: {}",
                    val,
                    self.default_host
                );
            }
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
