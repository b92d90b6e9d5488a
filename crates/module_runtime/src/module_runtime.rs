//! Module Runtime - Generation construction for the module registry
//!
//! This crate numbers modules, orders them, assigns per-category slots and
//! stores their config blocks for one generation ("cycle") at a time. A new
//! generation is always built against the one still serving, so indices and
//! slots stay stable across reloads.

pub use module_types;

mod builder;
mod builtins;
mod contexts;
mod cycle;
mod descriptor;
mod index;
mod order;
mod slots;

#[cfg(test)]
mod scenarios;

pub use builder::*;
pub use builtins::*;
pub use contexts::*;
pub use cycle::*;
pub use descriptor::*;
pub use index::*;
pub use order::*;
pub use slots::*;
