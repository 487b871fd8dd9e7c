//! Values exchanged between the CLI, the dispatcher and plugins

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, RunnerError};
use crate::table::Cell;

/// Identifies a plugin: which class to instantiate and where its code lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    class_name: String,
    source_location: String,
}

impl ModelDescriptor {
    pub fn new(class_name: impl Into<String>, source_location: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            source_location: source_location.into(),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn source_location(&self) -> &str {
        &self.source_location
    }
}

/// Table metadata document handed to the plugin.
///
/// Only `options` is interpreted (it becomes the constructor's keyword
/// configuration); everything else is kept verbatim for `train`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    #[serde(default)]
    pub options: Map<String, Value>,
    #[serde(flatten)]
    pub schema: Map<String, Value>,
}

impl TableMetadata {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| RunnerError::data(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// The whole document, options included
    pub fn to_value(&self) -> Value {
        let mut doc = self.schema.clone();
        doc.insert("options".to_string(), Value::Object(self.options.clone()));
        Value::Object(doc)
    }
}

/// Outcome of a training run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainInfo {
    pub base_table_rows: usize,
    pub trained_rows: usize,
}

/// Arguments of an approximate aggregate query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferQuery {
    pub agg_expr: String,
    pub group_by_column: String,
    pub where_condition: String,
}

impl InferQuery {
    pub fn new(
        agg_expr: impl Into<String>,
        group_by_column: impl Into<String>,
        where_condition: impl Into<String>,
    ) -> Self {
        Self {
            agg_expr: agg_expr.into(),
            group_by_column: group_by_column.into(),
            where_condition: where_condition.into(),
        }
    }
}

/// Aggregate rows plus the plugin's confidence-interval data
#[derive(Debug, Clone, PartialEq)]
pub struct InferResult {
    pub rows: Vec<Vec<Cell>>,
    pub confidence_interval: Value,
}

/// Hyperparameter metadata exactly as the plugin reported it.
///
/// Usually a mapping of name to `{type, default, description}`, or a list of
/// entries carrying a `name`. The document is written out unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HyperparameterSpec(pub Value);

impl HyperparameterSpec {
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(_) | Value::Array(_) | Value::Null => Ok(Self(value)),
            other => Err(RunnerError::data(format!(
                "hyperparameters must be a mapping or a list, got {other}"
            ))),
        }
    }

    /// Metadata of one hyperparameter, in either document shape
    pub fn get(&self, name: &str) -> Option<&Value> {
        match &self.0 {
            Value::Object(map) => map.get(name),
            Value::Array(entries) => entries
                .iter()
                .find(|entry| entry.get("name").and_then(Value::as_str) == Some(name)),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        match &self.0 {
            Value::Object(map) => map.len(),
            Value::Array(entries) => entries.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
