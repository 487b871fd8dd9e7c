use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::RunnerError;
use crate::table::CsvOptions;

/// Runner configuration, every section optional
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunnerConfig {
    #[serde(default)]
    pub plugins: PluginConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PluginConfig {
    /// Directories searched for relative plugin paths that don't exist in the working directory
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,

    /// Strip os.execute, os.exit and io.popen from plugin states
    #[serde(default)]
    pub restrict_process_access: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Field delimiter for dataset files
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Parse numbers and booleans out of dataset fields
    #[serde(default = "default_true")]
    pub infer_types: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// File written inside the model directory after training
    #[serde(default = "default_train_info_file")]
    pub train_info_file: String,

    /// Indent JSON documents; compact single-line output otherwise
    #[serde(default)]
    pub pretty_json: bool,
}

// Default value functions
fn default_delimiter() -> char {
    ','
}

fn default_true() -> bool {
    true
}

fn default_train_info_file() -> String {
    "train_info.json".to_string()
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            infer_types: true,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            train_info_file: default_train_info_file(),
            pretty_json: false,
        }
    }
}

impl DataConfig {
    /// Delimited-text options; the delimiter must be a single ASCII character
    pub fn csv_options(&self) -> crate::error::Result<CsvOptions> {
        if !self.delimiter.is_ascii() {
            return Err(RunnerError::config(format!(
                "delimiter {:?} is not an ASCII character",
                self.delimiter
            )));
        }
        Ok(CsvOptions {
            delimiter: self.delimiter as u8,
            infer_types: self.infer_types,
        })
    }
}

impl RunnerConfig {
    /// Load configuration from default location
    pub fn load_default() -> Result<Self> {
        match Self::default_config_path() {
            Some(config_path) if config_path.exists() => Self::load_from_file(&config_path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;

        let config: RunnerConfig =
            serde_yaml::from_str(&contents).context("Failed to parse config file")?;

        config.data.csv_options()?;
        Ok(config)
    }

    /// `~/.model-runner/config.yaml`, when a home directory exists
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".model-runner").join("config.yaml"))
    }
}
