// Plugin system: the capability contract and how plugins are resolved
pub mod api;
pub mod loader;
pub mod lua;

pub use api::{Capability, Model, ModelType};
pub use loader::{LuaPluginLoader, PluginLoader};
