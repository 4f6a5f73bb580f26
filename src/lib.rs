//! Extension resolution and installation engine.
//!
//! Given a list of marketplace extension identifiers, `extpack` queries the
//! gallery catalog, walks the transitive dependency and extension-pack
//! graph, picks the package for the current platform, and unpacks every
//! reachable extension exactly once into a destination directory.
//!
//! The public API is organised into layers:
//!
//! - **[`identifier`]** and **[`platform`]**: value types
//! - **[`http`]**, **[`catalog`]** and **[`fetcher`]**: talking to the marketplace
//! - **[`resolver`]** and **[`installer`]**: graph walk and run coordination
//! - **[`packager`]** and **[`config`]**: where to install and what to install
//! - **[`commands`]**: top-level subcommand orchestration
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod catalog;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod identifier;
pub mod installer;
pub mod logging;
pub mod packager;
pub mod platform;
pub mod resolver;
