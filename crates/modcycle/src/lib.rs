//! Modcycle - Module registry host
//!
//! This crate provides the host side of the module registry, including:
//! - The built-in module set and the catalog of loadable modules
//! - The `modcycle.toml` settings file
//! - Init scripts behind the `ScriptEngine` boundary (QuickJS by default)
//! - Publication of generations, keeping the old one when a reload fails

// Re-export core crates
pub use module_runtime;
pub use module_types;

// Modules compiled into the server
pub mod builtin;

// Loadable modules
pub mod catalog;

// Generation publication
pub mod host;

// Script engine boundary
pub mod script;

// Settings file
pub mod settings;
