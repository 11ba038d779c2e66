//! Analyzer configuration parsing and management.

use polyweave_types::DocPath;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration struct matching the polyweave.yml schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Directory documents are loaded from by the filesystem loader
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Default tracing filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Fail a dependant's analysis when one of its imports failed to load
    #[serde(default)]
    pub strict_imports: bool,

    /// Treat `rel="lazy-import"` links as dependency edges
    #[serde(default = "default_true")]
    pub lazy_imports: bool,

    /// Extra lazy-import edges, keyed by importing document
    #[serde(default)]
    pub lazy_edges: BTreeMap<String, Vec<String>>,

    // Internal: path to config file (for relative path resolution)
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_log_level() -> String {
    String::from("info")
}

fn default_true() -> bool {
    true
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            log_level: default_log_level(),
            strict_imports: false,
            lazy_imports: true,
            lazy_edges: BTreeMap::new(),
            config_path: None,
        }
    }
}

impl AnalyzerConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml_str(&contents)?;

        // Store config file path for relative path resolution
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: AnalyzerConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every lazy edge names a document inside the root
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (from, targets) in &self.lazy_edges {
            if DocPath::normalize(from).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "lazy edge source '{from}' is not a document path"
                )));
            }
            for target in targets {
                if DocPath::normalize(target).is_none() {
                    return Err(ConfigError::Invalid(format!(
                        "lazy edge target '{target}' (from '{from}') is not a document path"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Get the document root, resolved relative to the config file
    pub fn root_dir(&self) -> PathBuf {
        if self.root.is_absolute() {
            return self.root.clone();
        }
        match self.config_path.as_ref().and_then(|path| path.parent()) {
            Some(parent) => parent.join(&self.root),
            None => self.root.clone(),
        }
    }

    /// Configured lazy edges for `path`, as root-relative document paths
    pub fn lazy_edges_for(&self, path: &DocPath) -> Vec<DocPath> {
        self.lazy_edges
            .iter()
            .filter(|(from, _)| DocPath::normalize(from).as_ref() == Some(path))
            .flat_map(|(_, targets)| targets.iter())
            .filter_map(|target| DocPath::normalize(target))
            .collect()
    }
}
