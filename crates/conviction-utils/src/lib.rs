//! Shared utilities for conviction-rs
//!
//! Currently this is just tracing subscriber setup, shared by the CLI and
//! any future service binary.

pub mod logging;

pub use logging::{init_tracing, init_tracing_with};
