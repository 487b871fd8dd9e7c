/// Plugin API definitions
use std::fmt;
use std::path::Path;

use serde_json::{Map, Value};

use crate::error::Result;
use crate::table::Table;
use crate::types::{HyperparameterSpec, InferQuery, InferResult, TableMetadata};

/// One entry of the capability contract every model type must satisfy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Construct,
    Train,
    Save,
    Load,
    Synopsis,
    Infer,
    ListHyperparameters,
}

impl Capability {
    /// The full contract, in lifecycle order
    pub const ALL: [Capability; 7] = [
        Capability::Construct,
        Capability::Train,
        Capability::Save,
        Capability::Load,
        Capability::Synopsis,
        Capability::Infer,
        Capability::ListHyperparameters,
    ];

    /// Capabilities called on an instance rather than on the type
    pub const INSTANCE: [Capability; 5] = [
        Capability::Train,
        Capability::Save,
        Capability::Load,
        Capability::Synopsis,
        Capability::Infer,
    ];

    /// Name of the method a script plugin defines for this capability
    pub fn method_name(self) -> &'static str {
        match self {
            Capability::Construct => "new",
            Capability::Train => "train",
            Capability::Save => "save",
            Capability::Load => "load",
            Capability::Synopsis => "synopsis",
            Capability::Infer => "infer",
            Capability::ListHyperparameters => "list_hyperparameters",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Construct => "construct",
            other => other.method_name(),
        };
        f.write_str(name)
    }
}

/// A loaded, not-yet-instantiated model type
pub trait ModelType {
    /// Name the type was resolved under
    fn class_name(&self) -> &str;

    /// Instantiate the type.
    ///
    /// `None` constructs without any options (used before `load`), `Some`
    /// passes the table metadata's options as keyword configuration.
    fn construct(&self, options: Option<&Map<String, Value>>) -> Result<Box<dyn Model>>;

    /// Class-level hyperparameter listing, no instance required
    fn list_hyperparameters(&self) -> Result<HyperparameterSpec>;
}

/// An instantiated model driven through the lifecycle
pub trait Model {
    /// Fit the model to `real_data`
    fn train(&mut self, real_data: &Table, metadata: &TableMetadata) -> Result<()>;

    /// Persist model state to `path`
    fn save(&self, path: &Path) -> Result<()>;

    /// Restore model state from `path`
    fn load(&mut self, path: &Path) -> Result<()>;

    /// Generate `row_count` synthetic rows
    fn synopsis(&self, row_count: usize) -> Result<Table>;

    /// Answer an aggregate query approximately
    fn infer(&self, query: &InferQuery) -> Result<InferResult>;
}
