//! Utility functions and helpers.

pub mod name;

pub use name::{validate_package_name, MAX_NAME_LENGTH};
