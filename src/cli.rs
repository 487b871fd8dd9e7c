//! Command-line surface: one subcommand per lifecycle phase

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::RunnerConfig;
use crate::plugins::loader::LuaPluginLoader;
use crate::runner::ModelRunner;
use crate::table::{self, Table};
use crate::types::{InferQuery, ModelDescriptor, TableMetadata};

/// Model Runner - drive model plugins through train, synopsis, infer and list
#[derive(Parser, Debug)]
#[command(name = "model-runner", author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Train a model and save it under the model path
    Train {
        /// Model type class name
        modeltype_class: String,
        /// Path (or file:// URI) of the model type's code
        modeltype_uri: String,
        /// Path to the .csv training data
        data_file: PathBuf,
        /// Path to the .json table metadata
        metadata_file: PathBuf,
        /// Directory the trained model is saved to
        model_path: PathBuf,
    },

    /// Generate a synopsis (synthetic rows) from a trained model
    Synopsis {
        modeltype_class: String,
        modeltype_uri: String,
        model_path: PathBuf,
        /// Number of rows to generate
        row_count: usize,
        /// Where to write the generated .csv
        output_file: PathBuf,
    },

    /// Answer an aggregate query from a trained model
    Infer {
        modeltype_class: String,
        modeltype_uri: String,
        model_path: PathBuf,
        /// Aggregation expression, e.g. "COUNT(*)"
        #[arg(allow_hyphen_values = true)]
        agg_expr: String,
        /// Column from the GROUP BY clause
        #[arg(allow_hyphen_values = true)]
        group_by_column: String,
        /// Filter condition from the WHERE clause
        #[arg(allow_hyphen_values = true)]
        where_condition: String,
        /// Where to write the result rows; printed to stdout when omitted
        output_file: Option<PathBuf>,
        /// Also write the confidence interval as JSON
        #[arg(long)]
        confidence_output: Option<PathBuf>,
    },

    /// List the hyperparameters a model type accepts
    List {
        modeltype_class: String,
        modeltype_uri: String,
        /// Where to write the .json hyperparameter listing
        output_file: PathBuf,
    },
}

/// Run one subcommand to completion
pub fn execute(command: Command, config: &RunnerConfig) -> Result<()> {
    let runner = ModelRunner::new(LuaPluginLoader::from_config(&config.plugins));
    let csv_options = config.data.csv_options()?;
    let pretty = config.output.pretty_json;

    match command {
        Command::Train {
            modeltype_class,
            modeltype_uri,
            data_file,
            metadata_file,
            model_path,
        } => {
            let descriptor = ModelDescriptor::new(modeltype_class, modeltype_uri);
            let real_data = Table::read_csv_file(&data_file, csv_options)
                .with_context(|| format!("Failed to read training data {}", data_file.display()))?;
            let metadata = TableMetadata::from_file(&metadata_file)
                .with_context(|| format!("Failed to read table metadata {}", metadata_file.display()))?;

            fs::create_dir_all(&model_path).with_context(|| {
                format!("Failed to create model directory {}", model_path.display())
            })?;

            let train_info = runner.train_model(&descriptor, &real_data, &metadata, &model_path)?;
            let info_path = model_path.join(&config.output.train_info_file);
            write_json(&info_path, &train_info, pretty)?;
            info!("Wrote train info to {}", info_path.display());
        }

        Command::Synopsis {
            modeltype_class,
            modeltype_uri,
            model_path,
            row_count,
            output_file,
        } => {
            let descriptor = ModelDescriptor::new(modeltype_class, modeltype_uri);
            let synopsis = runner.generate_synopsis(&descriptor, &model_path, row_count)?;
            synopsis
                .write_csv_file(&output_file, csv_options)
                .with_context(|| format!("Failed to write synopsis {}", output_file.display()))?;
        }

        Command::Infer {
            modeltype_class,
            modeltype_uri,
            model_path,
            agg_expr,
            group_by_column,
            where_condition,
            output_file,
            confidence_output,
        } => {
            let descriptor = ModelDescriptor::new(modeltype_class, modeltype_uri);
            let query = InferQuery::new(agg_expr, group_by_column, where_condition);
            let result = runner.infer(&descriptor, &model_path, &query)?;

            // An empty output argument means "print", same as omitting it
            match output_file.filter(|p| !p.as_os_str().is_empty()) {
                None => {
                    let stdout = std::io::stdout();
                    table::write_rows(stdout.lock(), &result.rows, csv_options)?;
                }
                Some(path) => {
                    let file = fs::File::create(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    table::write_rows(file, &result.rows, csv_options)?;
                }
            }

            if let Some(path) = confidence_output {
                write_json(&path, &result.confidence_interval, pretty)?;
            }
        }

        Command::List {
            modeltype_class,
            modeltype_uri,
            output_file,
        } => {
            let descriptor = ModelDescriptor::new(modeltype_class, modeltype_uri);
            let hyperparameters = runner.list_hyperparameters(&descriptor)?;
            write_json(&output_file, &hyperparameters, pretty)?;
        }
    }

    Ok(())
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .context("Failed to serialize result")?;

    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
