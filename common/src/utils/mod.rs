//! Utility functions and helpers.

pub mod sql_inspector;

// Re-export commonly used types
pub use sql_inspector::SqlInspector;
