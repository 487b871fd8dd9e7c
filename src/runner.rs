//! Lifecycle dispatcher
//!
//! Each operation loads the plugin afresh, walks it through a fixed call
//! sequence and hands back the result untouched. There are no retries and no
//! cleanup: the first failure ends the operation.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::plugins::api::ModelType;
use crate::plugins::loader::{LuaPluginLoader, PluginLoader};
use crate::table::Table;
use crate::types::{HyperparameterSpec, InferQuery, InferResult, ModelDescriptor, TableMetadata, TrainInfo};

/// Drives model plugins through train, synopsis, infer and hyperparameter listing
pub struct ModelRunner<L = LuaPluginLoader> {
    loader: L,
}

impl<L: PluginLoader> ModelRunner<L> {
    pub fn new(loader: L) -> Self {
        Self { loader }
    }

    fn load_type(&self, descriptor: &ModelDescriptor) -> Result<Box<dyn ModelType>> {
        let model_type = self.loader.load(descriptor)?;
        debug!(
            "Loaded model type '{}' from {}",
            model_type.class_name(),
            descriptor.source_location()
        );
        Ok(model_type)
    }

    /// construct(options) → train → save
    pub fn train_model(
        &self,
        descriptor: &ModelDescriptor,
        real_data: &Table,
        metadata: &TableMetadata,
        model_path: &Path,
    ) -> Result<TrainInfo> {
        let model_type = self.load_type(descriptor)?;
        let mut model = model_type.construct(Some(&metadata.options))?;

        info!(
            "Training '{}' on {} rows",
            descriptor.class_name(),
            real_data.row_count()
        );
        model.train(real_data, metadata)?;

        if let Err(e) = model.save(model_path) {
            warn!(
                "Training finished but saving to {} failed; partial artifact left in place",
                model_path.display()
            );
            return Err(e);
        }

        // Partial training would make these diverge; today both are the full input
        Ok(TrainInfo {
            base_table_rows: real_data.row_count(),
            trained_rows: real_data.row_count(),
        })
    }

    /// construct() → load → synopsis
    pub fn generate_synopsis(
        &self,
        descriptor: &ModelDescriptor,
        model_path: &Path,
        row_count: usize,
    ) -> Result<Table> {
        let model_type = self.load_type(descriptor)?;
        let mut model = model_type.construct(None)?;
        model.load(model_path)?;

        let synopsis = model.synopsis(row_count)?;
        if synopsis.row_count() != row_count {
            warn!(
                "'{}' generated {} rows, {} were requested",
                descriptor.class_name(),
                synopsis.row_count(),
                row_count
            );
        }
        info!("Generated synopsis with {} rows", synopsis.row_count());
        Ok(synopsis)
    }

    /// construct() → load → infer
    pub fn infer(
        &self,
        descriptor: &ModelDescriptor,
        model_path: &Path,
        query: &InferQuery,
    ) -> Result<InferResult> {
        let model_type = self.load_type(descriptor)?;
        let mut model = model_type.construct(None)?;
        model.load(model_path)?;

        debug!(
            "Inferring '{}' grouped by '{}' where '{}'",
            query.agg_expr, query.group_by_column, query.where_condition
        );
        let result = model.infer(query)?;
        debug!("Confidence interval: {}", result.confidence_interval);
        Ok(result)
    }

    /// Type-level listing; nothing is constructed and no artifact is touched
    pub fn list_hyperparameters(&self, descriptor: &ModelDescriptor) -> Result<HyperparameterSpec> {
        let model_type = self.load_type(descriptor)?;
        model_type.list_hyperparameters()
    }
}

impl Default for ModelRunner<LuaPluginLoader> {
    fn default() -> Self {
        Self::new(LuaPluginLoader::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RunnerError;
    use crate::plugins::api::{Capability, Model};
    use crate::table::Cell;
    use serde_json::{Map, Value};
    use std::cell::RefCell;
    use std::rc::Rc;

    type Calls = Rc<RefCell<Vec<String>>>;

    struct RecordingType {
        calls: Calls,
        fail_save: bool,
    }

    struct RecordingModel {
        calls: Calls,
        fail_save: bool,
    }

    struct RecordingLoader {
        calls: Calls,
        fail_save: bool,
    }

    impl PluginLoader for RecordingLoader {
        fn load(&self, descriptor: &ModelDescriptor) -> Result<Box<dyn ModelType>> {
            self.calls.borrow_mut().push(format!("load_type {}", descriptor.class_name()));
            Ok(Box::new(RecordingType {
                calls: Rc::clone(&self.calls),
                fail_save: self.fail_save,
            }))
        }
    }

    impl ModelType for RecordingType {
        fn class_name(&self) -> &str {
            "Recording"
        }

        fn construct(&self, options: Option<&Map<String, Value>>) -> Result<Box<dyn Model>> {
            let label = match options {
                Some(options) => format!("construct {}", options.len()),
                None => "construct none".to_string(),
            };
            self.calls.borrow_mut().push(label);
            Ok(Box::new(RecordingModel {
                calls: Rc::clone(&self.calls),
                fail_save: self.fail_save,
            }))
        }

        fn list_hyperparameters(&self) -> Result<HyperparameterSpec> {
            self.calls.borrow_mut().push("list_hyperparameters".to_string());
            Ok(HyperparameterSpec::default())
        }
    }

    impl Model for RecordingModel {
        fn train(&mut self, real_data: &Table, _metadata: &TableMetadata) -> Result<()> {
            self.calls.borrow_mut().push(format!("train {}", real_data.row_count()));
            Ok(())
        }

        fn save(&self, path: &Path) -> Result<()> {
            self.calls.borrow_mut().push(format!("save {}", path.display()));
            if self.fail_save {
                return Err(RunnerError::artifact(Capability::Save, path, "read-only"));
            }
            Ok(())
        }

        fn load(&mut self, path: &Path) -> Result<()> {
            self.calls.borrow_mut().push(format!("load {}", path.display()));
            Ok(())
        }

        fn synopsis(&self, row_count: usize) -> Result<Table> {
            self.calls.borrow_mut().push(format!("synopsis {row_count}"));
            Table::from_rows(vec!["n".to_string()], (0..row_count as i64).map(|i| vec![Cell::Int(i)]).collect())
        }

        fn infer(&self, query: &InferQuery) -> Result<InferResult> {
            self.calls.borrow_mut().push(format!("infer {}", query.agg_expr));
            Ok(InferResult {
                rows: vec![vec![Cell::Int(1)]],
                confidence_interval: Value::Null,
            })
        }
    }

    fn runner(fail_save: bool) -> (ModelRunner<RecordingLoader>, Calls) {
        let calls = Calls::default();
        let loader = RecordingLoader {
            calls: Rc::clone(&calls),
            fail_save,
        };
        (ModelRunner::new(loader), calls)
    }

    fn three_rows() -> Table {
        Table::from_rows(
            vec!["v".to_string()],
            vec![vec![Cell::Int(1)], vec![Cell::Int(2)], vec![Cell::Int(3)]],
        )
        .unwrap()
    }

    #[test]
    fn test_train_call_sequence() {
        let (runner, calls) = runner(false);
        let descriptor = ModelDescriptor::new("Recording", "mem");
        let metadata = TableMetadata::from_json_str(r#"{"options": {"a": 1, "b": 2}}"#).unwrap();

        let info = runner
            .train_model(&descriptor, &three_rows(), &metadata, Path::new("/m"))
            .unwrap();

        assert_eq!(info.base_table_rows, 3);
        assert_eq!(info.trained_rows, 3);
        assert_eq!(
            *calls.borrow(),
            vec!["load_type Recording", "construct 2", "train 3", "save /m"]
        );
    }

    #[test]
    fn test_synopsis_and_infer_construct_without_options() {
        let (runner, calls) = runner(false);
        let descriptor = ModelDescriptor::new("Recording", "mem");

        let synopsis = runner.generate_synopsis(&descriptor, Path::new("/m"), 4).unwrap();
        assert_eq!(synopsis.row_count(), 4);
        runner
            .infer(&descriptor, Path::new("/m"), &InferQuery::new("SUM(v)", "", ""))
            .unwrap();

        assert_eq!(
            *calls.borrow(),
            vec![
                "load_type Recording",
                "construct none",
                "load /m",
                "synopsis 4",
                "load_type Recording",
                "construct none",
                "load /m",
                "infer SUM(v)",
            ]
        );
    }

    #[test]
    fn test_list_hyperparameters_never_constructs() {
        let (runner, calls) = runner(false);
        let descriptor = ModelDescriptor::new("Recording", "mem");
        runner.list_hyperparameters(&descriptor).unwrap();
        assert_eq!(*calls.borrow(), vec!["load_type Recording", "list_hyperparameters"]);
    }

    #[test]
    fn test_save_failure_propagates_unchanged() {
        let (runner, calls) = runner(true);
        let descriptor = ModelDescriptor::new("Recording", "mem");
        let err = runner
            .train_model(&descriptor, &three_rows(), &TableMetadata::default(), Path::new("/ro"))
            .unwrap_err();

        assert!(matches!(err, RunnerError::ArtifactIo { capability: Capability::Save, .. }));
        assert_eq!(calls.borrow().last().map(String::as_str), Some("save /ro"));
    }
}
