pub mod completions;
pub mod install;
pub mod version;
