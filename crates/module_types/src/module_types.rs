//! Module Types - Core data definitions shared by every module
//!
//! This crate contains the pure data structures the module registry is built
//! from: module categories, ABI compatibility tokens, type-erased config
//! blocks and the error surface of generation construction.

mod abi;
mod category;
mod config_block;
mod error;

pub use abi::*;
pub use category::*;
pub use config_block::*;
pub use error::*;
