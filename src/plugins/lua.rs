//! Lua-scripted model plugins
//!
//! A plugin script defines a class table named after the model type. Methods
//! use the colon convention, so the class (or instance) arrives as the first
//! argument:
//!
//! ```lua
//! Sampler = {}
//! Sampler.__index = Sampler
//!
//! function Sampler:new(options) return setmetatable({ options = options or {} }, self) end
//! function Sampler:train(data, metadata) ... end
//! function Sampler:save(path) ... end
//! function Sampler:load(path) ... end
//! function Sampler:synopsis(row_count) return { columns = {...}, rows = {...} } end
//! function Sampler:infer(agg_expr, group_by, where) return rows, confidence end
//! function Sampler:list_hyperparameters() return { ... } end
//! ```

use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::{
    DeserializeOptions, Function, Lua, LuaSerdeExt, RegistryKey, SerializeOptions,
    Table as LuaTable, Value as LuaValue,
};
use serde_json::{Map, Value};
use tracing::debug;

use super::api::{Capability, Model, ModelType};
use crate::error::{Result, RunnerError};
use crate::table::{Cell, Table};
use crate::types::{HyperparameterSpec, InferQuery, InferResult, TableMetadata};

/// Removed from the plugin state when process access is restricted
const RESTRICT_PROCESS_ACCESS: &str = r#"
    os.execute = nil
    os.exit = nil
    io.popen = nil
"#;

/// How a fresh plugin state is prepared before the script runs
#[derive(Debug, Clone)]
pub struct LuaStateOptions {
    pub script_path: PathBuf,
    pub restrict_process_access: bool,
}

/// A class table living in its own Lua state
pub struct LuaModelType {
    class: RegistryKey,
    class_name: String,
    lua: Rc<Lua>,
}

/// An instance table created by [`LuaModelType::construct`]
pub struct LuaModel {
    instance: RegistryKey,
    class_name: String,
    lua: Rc<Lua>,
}

impl LuaModelType {
    /// Evaluate `source` in a brand-new state and pick out `class_name`.
    ///
    /// The whole capability set is checked here, before any lifecycle call.
    pub fn evaluate(
        source: &str,
        class_name: &str,
        location: &str,
        options: &LuaStateOptions,
    ) -> Result<Self> {
        let lua = Rc::new(Lua::new());
        let not_found = |e: mlua::Error| RunnerError::plugin_not_found(location, e);

        let class = {
            let lua: &Lua = &lua;
            prepare_state(lua, options).map_err(not_found)?;

            let chunk_name = format!("@{}", options.script_path.display());
            let module = lua
                .load(source)
                .set_name(chunk_name)
                .into_function()
                .map_err(not_found)?;
            let returned: LuaValue = module.call(()).map_err(not_found)?;

            let mut symbol = LuaValue::Nil;
            if let LuaValue::Table(exports) = &returned {
                symbol = exports.get(class_name).map_err(not_found)?;
            }
            if matches!(symbol, LuaValue::Nil) {
                symbol = lua.globals().get(class_name).map_err(not_found)?;
            }

            let class = match symbol {
                LuaValue::Table(class) => class,
                LuaValue::Nil => {
                    return Err(RunnerError::symbol_missing(
                        class_name,
                        location,
                        "not defined by the script",
                    ))
                }
                other => {
                    return Err(RunnerError::symbol_missing(
                        class_name,
                        location,
                        format!("is a {}, expected a class table", other.type_name()),
                    ))
                }
            };

            for capability in Capability::ALL {
                let method: LuaValue = class.get(capability.method_name()).map_err(not_found)?;
                if !matches!(method, LuaValue::Function(_)) {
                    return Err(RunnerError::CapabilityMissing {
                        class_name: class_name.to_string(),
                        capability,
                    });
                }
            }

            lua.create_registry_value(class).map_err(not_found)?
        };

        debug!("Plugin class '{}' passed capability validation", class_name);
        Ok(Self {
            class,
            class_name: class_name.to_string(),
            lua,
        })
    }
}

impl ModelType for LuaModelType {
    fn class_name(&self) -> &str {
        &self.class_name
    }

    fn construct(&self, options: Option<&Map<String, Value>>) -> Result<Box<dyn Model>> {
        let lua: &Lua = &self.lua;
        let fail = |e: mlua::Error| RunnerError::construction(&self.class_name, e);

        let class: LuaTable = lua.registry_value(&self.class).map_err(fail)?;
        let new: Function = class.get(Capability::Construct.method_name()).map_err(fail)?;
        let options = match options {
            Some(options) => json_to_lua(lua, &Value::Object(options.clone())).map_err(fail)?,
            None => LuaValue::Nil,
        };

        let instance = match new.call::<_, LuaValue>((class, options)).map_err(fail)? {
            LuaValue::Table(instance) => instance,
            other => {
                return Err(RunnerError::construction(
                    &self.class_name,
                    format!("constructor returned a {} instead of an instance table", other.type_name()),
                ))
            }
        };

        for capability in Capability::INSTANCE {
            let method: LuaValue = instance.get(capability.method_name()).map_err(fail)?;
            if !matches!(method, LuaValue::Function(_)) {
                return Err(RunnerError::construction(
                    &self.class_name,
                    format!("instance has no '{}' method", capability.method_name()),
                ));
            }
        }

        let instance = lua.create_registry_value(instance).map_err(fail)?;
        Ok(Box::new(LuaModel {
            instance,
            class_name: self.class_name.clone(),
            lua: Rc::clone(&self.lua),
        }))
    }

    fn list_hyperparameters(&self) -> Result<HyperparameterSpec> {
        let lua: &Lua = &self.lua;
        let fail = |e: mlua::Error| RunnerError::capability(Capability::ListHyperparameters, e);

        let class: LuaTable = lua.registry_value(&self.class).map_err(fail)?;
        let list: Function = class
            .get(Capability::ListHyperparameters.method_name())
            .map_err(fail)?;
        let listed: LuaValue = list.call(class).map_err(fail)?;
        let json = lua_to_json(lua, listed).map_err(fail)?;

        HyperparameterSpec::from_value(json)
            .map_err(|e| RunnerError::capability(Capability::ListHyperparameters, e))
    }
}

impl LuaModel {
    fn method<'lua>(
        &self,
        lua: &'lua Lua,
        capability: Capability,
    ) -> mlua::Result<(LuaTable<'lua>, Function<'lua>)> {
        let instance: LuaTable = lua.registry_value(&self.instance)?;
        let method: Function = instance.get(capability.method_name())?;
        Ok((instance, method))
    }

    fn artifact_call(&self, capability: Capability, path: &Path) -> Result<()> {
        let lua: &Lua = &self.lua;
        let fail = |e: mlua::Error| RunnerError::artifact(capability, path, e);

        let (instance, method) = self.method(lua, capability).map_err(fail)?;
        let path_arg = path.to_string_lossy().into_owned();
        method.call::<_, ()>((instance, path_arg)).map_err(fail)
    }
}

impl Model for LuaModel {
    fn train(&mut self, real_data: &Table, metadata: &TableMetadata) -> Result<()> {
        let lua: &Lua = &self.lua;
        let fail = |e: mlua::Error| RunnerError::capability(Capability::Train, e);

        let (instance, train) = self.method(lua, Capability::Train).map_err(fail)?;
        let data = dataset_to_lua(lua, real_data).map_err(fail)?;
        let metadata = json_to_lua(lua, &metadata.to_value()).map_err(fail)?;

        debug!("{}:train with {} rows", self.class_name, real_data.row_count());
        train.call::<_, ()>((instance, data, metadata)).map_err(fail)
    }

    fn save(&self, path: &Path) -> Result<()> {
        self.artifact_call(Capability::Save, path)
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        self.artifact_call(Capability::Load, path)
    }

    fn synopsis(&self, row_count: usize) -> Result<Table> {
        let lua: &Lua = &self.lua;
        let fail = |e: mlua::Error| RunnerError::capability(Capability::Synopsis, e);

        let (instance, synopsis) = self.method(lua, Capability::Synopsis).map_err(fail)?;
        let count = i64::try_from(row_count).map_err(|e| RunnerError::capability(Capability::Synopsis, e))?;
        let generated: LuaValue = synopsis.call((instance, count)).map_err(fail)?;

        dataset_from_lua(generated).map_err(fail)
    }

    fn infer(&self, query: &InferQuery) -> Result<InferResult> {
        let lua: &Lua = &self.lua;
        let fail = |e: mlua::Error| RunnerError::capability(Capability::Infer, e);

        let (instance, infer) = self.method(lua, Capability::Infer).map_err(fail)?;
        let (result, confidence): (LuaValue, LuaValue) = infer
            .call((
                instance,
                query.agg_expr.as_str(),
                query.group_by_column.as_str(),
                query.where_condition.as_str(),
            ))
            .map_err(fail)?;

        let rows = rows_from_lua(result).map_err(fail)?;
        let confidence_interval = lua_to_json(lua, confidence).map_err(fail)?;
        Ok(InferResult {
            rows,
            confidence_interval,
        })
    }
}

fn prepare_state(lua: &Lua, options: &LuaStateOptions) -> mlua::Result<()> {
    // Let the script `require` modules sitting next to it
    let dir = match options.script_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_string_lossy().into_owned(),
        _ => ".".to_string(),
    };
    let package: LuaTable = lua.globals().get("package")?;
    let search_path: String = package.get("path")?;
    package.set("path", format!("{dir}/?.lua;{dir}/?/init.lua;{search_path}"))?;

    if options.restrict_process_access {
        lua.load(RESTRICT_PROCESS_ACCESS).exec()?;
    }
    Ok(())
}

fn json_to_lua<'lua>(lua: &'lua Lua, value: &Value) -> mlua::Result<LuaValue<'lua>> {
    let options = SerializeOptions::new()
        .serialize_none_to_null(false)
        .serialize_unit_to_null(false);
    lua.to_value_with(value, options)
}

fn lua_to_json<'lua>(lua: &'lua Lua, value: LuaValue<'lua>) -> mlua::Result<Value> {
    let options = DeserializeOptions::new().deny_unsupported_types(false);
    lua.from_value_with(value, options)
}

fn cell_to_lua<'lua>(lua: &'lua Lua, cell: &Cell) -> mlua::Result<LuaValue<'lua>> {
    Ok(match cell {
        Cell::Null => LuaValue::Nil,
        Cell::Bool(b) => LuaValue::Boolean(*b),
        Cell::Int(i) => LuaValue::Integer(*i),
        Cell::Float(f) => LuaValue::Number(*f),
        Cell::Text(s) => LuaValue::String(lua.create_string(s)?),
    })
}

fn cell_from_lua(value: LuaValue) -> mlua::Result<Cell> {
    match value {
        // mlua's null sentinel is a light userdata
        LuaValue::Nil | LuaValue::LightUserData(_) => Ok(Cell::Null),
        LuaValue::Boolean(b) => Ok(Cell::Bool(b)),
        LuaValue::Integer(i) => Ok(Cell::Int(i)),
        LuaValue::Number(f) => Ok(Cell::Float(f)),
        LuaValue::String(s) => Ok(Cell::Text(s.to_string_lossy().into_owned())),
        other => Err(mlua::Error::RuntimeError(format!(
            "a {} cannot be stored in a table cell",
            other.type_name()
        ))),
    }
}

/// `{ columns = {...}, rows = { {column = value, ...}, ... } }`
fn dataset_to_lua<'lua>(lua: &'lua Lua, table: &Table) -> mlua::Result<LuaTable<'lua>> {
    let columns = lua.create_sequence_from(table.columns().iter().map(String::as_str))?;
    let rows = lua.create_table()?;
    for (i, row) in table.rows().iter().enumerate() {
        let record = lua.create_table()?;
        for (name, cell) in table.columns().iter().zip(row) {
            record.set(name.as_str(), cell_to_lua(lua, cell)?)?;
        }
        rows.raw_set(i as i64 + 1, record)?;
    }

    let dataset = lua.create_table()?;
    dataset.set("columns", columns)?;
    dataset.set("rows", rows)?;
    Ok(dataset)
}

/// Rows may be keyed by column name or positional
fn dataset_from_lua(value: LuaValue) -> mlua::Result<Table> {
    let LuaValue::Table(dataset) = value else {
        return Err(mlua::Error::RuntimeError(
            "synopsis must return a table with 'columns' and 'rows'".to_string(),
        ));
    };

    let columns: Option<LuaTable> = dataset.get("columns")?;
    let Some(columns) = columns else {
        return Err(mlua::Error::RuntimeError(
            "synopsis result has no 'columns' sequence".to_string(),
        ));
    };
    let columns = columns
        .sequence_values::<String>()
        .collect::<mlua::Result<Vec<_>>>()?;

    let mut rows = Vec::new();
    let records: Option<LuaTable> = dataset.get("rows")?;
    for record in records.into_iter().flat_map(|r| r.sequence_values::<LuaValue>()) {
        let LuaValue::Table(record) = record? else {
            return Err(mlua::Error::RuntimeError(format!(
                "synopsis row {} is not a table",
                rows.len() + 1
            )));
        };
        let mut row = Vec::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            let mut value: LuaValue = record.get(name.as_str())?;
            if matches!(value, LuaValue::Nil) {
                value = record.get(i as i64 + 1)?;
            }
            row.push(cell_from_lua(value)?);
        }
        rows.push(row);
    }

    Table::from_rows(columns, rows).map_err(|e| mlua::Error::RuntimeError(e.to_string()))
}

/// A sequence of rows; a scalar row counts as a one-cell row
fn rows_from_lua(value: LuaValue) -> mlua::Result<Vec<Vec<Cell>>> {
    let rows = match value {
        LuaValue::Nil => return Ok(Vec::new()),
        // a synopsis-shaped result contributes its rows
        LuaValue::Table(rows) => match rows.get::<_, Option<LuaTable>>("rows")? {
            Some(inner) => inner,
            None => rows,
        },
        scalar => return Ok(vec![vec![cell_from_lua(scalar)?]]),
    };
    ensure_sequence(&rows, "infer result")?;

    let mut out = Vec::new();
    for row in rows.sequence_values::<LuaValue>() {
        match row? {
            LuaValue::Table(cells) => {
                ensure_sequence(&cells, &format!("infer row {}", out.len() + 1))?;
                let row = cells
                    .sequence_values::<LuaValue>()
                    .map(|cell| cell.and_then(cell_from_lua))
                    .collect::<mlua::Result<Vec<_>>>()?;
                out.push(row);
            }
            scalar => out.push(vec![cell_from_lua(scalar)?]),
        }
    }
    Ok(out)
}

/// Keyed entries would be skipped by a sequence walk
fn ensure_sequence(table: &LuaTable, what: &str) -> mlua::Result<()> {
    if table.raw_len() > 0 {
        return Ok(());
    }
    if let Some(entry) = table.clone().pairs::<LuaValue, LuaValue>().next() {
        let key = match entry?.0 {
            LuaValue::String(s) => format!("'{}'", s.to_string_lossy()),
            LuaValue::Integer(i) => i.to_string(),
            other => other.type_name().to_string(),
        };
        return Err(mlua::Error::RuntimeError(format!(
            "{what} must be a sequence, found key {key}"
        )));
    }
    Ok(())
}
