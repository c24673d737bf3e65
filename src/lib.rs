//! Multi-language cell execution bridge.
//!
//! A WebSocket server that runs code cells in a local Rhai sandbox or on a
//! remote execution service, persists cells as named projects, keeps a
//! masked secrets file, and re-executes cells whose source references
//! another cell's result.

pub mod cli;
pub mod config;
pub mod error;
pub mod execution;
pub mod external;
pub mod handlers;
pub mod project;
pub mod protocol;
pub mod reactive;
pub mod secrets;
pub mod server;
pub mod utils;
