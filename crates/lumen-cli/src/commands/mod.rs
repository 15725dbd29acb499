//! CLI command implementations.

pub mod check;
pub mod common;
pub mod new;
pub mod nodes;
pub mod render;
