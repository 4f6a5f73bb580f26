//! Configuration inputs: the extension list files and the settings file.
pub mod extension_list;
pub mod settings;
mod toml_loader;

pub use extension_list::ExtensionList;
pub use settings::{Settings, SettingsOverrides};
