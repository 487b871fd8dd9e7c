use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::api::ModelType;
use super::lua::{LuaModelType, LuaStateOptions};
use crate::config::PluginConfig;
use crate::error::{Result, RunnerError};
use crate::types::ModelDescriptor;

static IDENTIFIER_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

static URI_SCHEME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z][A-Za-z0-9+.\-]*)://").unwrap());

static LUA_KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if",
        "in", "local", "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
    ]
    .into_iter()
    .collect()
});

/// Resolves a [`ModelDescriptor`] into a model type.
///
/// Every call must hand back an independent unit: nothing loaded by one call
/// may be observable from another, even for the same location.
pub trait PluginLoader {
    fn load(&self, descriptor: &ModelDescriptor) -> Result<Box<dyn ModelType>>;
}

/// Check that `class_name` can name a plugin symbol
pub fn validate_class_name(class_name: &str) -> Result<()> {
    if IDENTIFIER_REGEX.is_match(class_name) && !LUA_KEYWORDS.contains(class_name) {
        Ok(())
    } else {
        Err(RunnerError::InvalidClassName(class_name.to_string()))
    }
}

/// Loads Lua script plugins, one fresh interpreter state per load
#[derive(Debug, Clone, Default)]
pub struct LuaPluginLoader {
    search_paths: Vec<PathBuf>,
    restrict_process_access: bool,
}

impl LuaPluginLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_config(config: &PluginConfig) -> Self {
        Self {
            search_paths: config.search_paths.clone(),
            restrict_process_access: config.restrict_process_access,
        }
    }

    /// Additional directories consulted for relative plugin paths
    #[must_use]
    pub fn with_search_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_paths.push(dir.into());
        self
    }

    /// Turn a source location into a local script path
    pub fn resolve(&self, location: &str) -> Result<PathBuf> {
        let path = if let Some(rest) = location.strip_prefix("file://") {
            PathBuf::from(rest.strip_prefix("localhost").unwrap_or(rest))
        } else if let Some(caps) = URI_SCHEME_REGEX.captures(location) {
            return Err(RunnerError::plugin_not_found(
                location,
                format!(
                    "unsupported URI scheme '{}': only local paths and file:// URIs can be loaded",
                    &caps[1]
                ),
            ));
        } else {
            PathBuf::from(location)
        };

        if path.is_absolute() || path.exists() {
            return Ok(path);
        }

        for dir in &self.search_paths {
            let candidate = dir.join(&path);
            if candidate.exists() {
                debug!("Resolved plugin '{}' via search path {}", location, dir.display());
                return Ok(candidate);
            }
        }

        Ok(path)
    }

    fn read_source(location: &str, path: &Path) -> Result<String> {
        if path.is_dir() {
            return Err(RunnerError::plugin_not_found(location, "location is a directory"));
        }
        fs::read_to_string(path).map_err(|e| RunnerError::plugin_not_found(location, e))
    }
}

impl PluginLoader for LuaPluginLoader {
    fn load(&self, descriptor: &ModelDescriptor) -> Result<Box<dyn ModelType>> {
        let class_name = descriptor.class_name();
        let location = descriptor.source_location();
        validate_class_name(class_name)?;

        let path = self.resolve(location)?;
        let source = Self::read_source(location, &path)?;
        debug!("Loading plugin class '{}' from {}", class_name, path.display());

        let options = LuaStateOptions {
            script_path: path,
            restrict_process_access: self.restrict_process_access,
        };
        let model_type = LuaModelType::evaluate(&source, class_name, location, &options)?;
        Ok(Box::new(model_type))
    }
}
