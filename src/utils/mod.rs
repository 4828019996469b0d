//! Utility functions and helpers.

pub mod http;
pub mod progress;
pub mod text;
pub mod url;
