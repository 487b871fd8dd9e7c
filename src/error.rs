//! Error taxonomy for plugin loading and lifecycle dispatch

use std::path::PathBuf;

use crate::plugins::api::Capability;

/// Result type alias using the runner's error type
pub type Result<T> = std::result::Result<T, RunnerError>;

/// Every failure the loader and dispatcher can surface.
///
/// None of these are recovered locally; they travel unchanged to the CLI
/// boundary.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The source location is unreadable, uses an unsupported scheme, or does not evaluate
    #[error("plugin not found at '{location}': {reason}")]
    PluginNotFound { location: String, reason: String },

    /// The loaded unit has no usable symbol named `class_name`
    #[error("symbol '{class_name}' missing from '{location}': {reason}")]
    SymbolMissing {
        class_name: String,
        location: String,
        reason: String,
    },

    /// `class_name` is not a valid identifier
    #[error("invalid class name '{0}'")]
    InvalidClassName(String),

    /// The model type does not provide a capability of the contract
    #[error("model type '{class_name}' does not implement capability '{capability}'")]
    CapabilityMissing {
        class_name: String,
        capability: Capability,
    },

    /// The constructor raised or did not produce a usable instance
    #[error("failed to construct '{class_name}': {message}")]
    Construction { class_name: String, message: String },

    /// Saving or loading the model artifact failed
    #[error("artifact {capability} failed for '{}': {message}", .path.display())]
    ArtifactIo {
        capability: Capability,
        path: PathBuf,
        message: String,
    },

    /// A train/synopsis/infer/list_hyperparameters call raised or returned garbage
    #[error("capability '{capability}' failed: {message}")]
    Capability {
        capability: Capability,
        message: String,
    },

    /// Reading or writing a dataset or document failed
    #[error("data error: {0}")]
    Data(String),

    /// Invalid runner configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl RunnerError {
    pub fn plugin_not_found(location: impl Into<String>, reason: impl ToString) -> Self {
        Self::PluginNotFound {
            location: location.into(),
            reason: reason.to_string(),
        }
    }

    pub fn symbol_missing(
        class_name: impl Into<String>,
        location: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::SymbolMissing {
            class_name: class_name.into(),
            location: location.into(),
            reason: reason.into(),
        }
    }

    pub fn construction(class_name: impl Into<String>, message: impl ToString) -> Self {
        Self::Construction {
            class_name: class_name.into(),
            message: message.to_string(),
        }
    }

    pub fn capability(capability: Capability, message: impl ToString) -> Self {
        Self::Capability {
            capability,
            message: message.to_string(),
        }
    }

    pub fn artifact(capability: Capability, path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::ArtifactIo {
            capability,
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn data(message: impl ToString) -> Self {
        Self::Data(message.to_string())
    }

    pub fn config(message: impl ToString) -> Self {
        Self::Config(message.to_string())
    }
}

impl From<csv::Error> for RunnerError {
    fn from(err: csv::Error) -> Self {
        Self::Data(err.to_string())
    }
}

impl From<serde_json::Error> for RunnerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Data(err.to_string())
    }
}
