//! The `utils` module provides the error types and logging setup shared across
//! the `postbox` application.

pub mod error;
pub mod logging;
