//! Push an Appwrite project config to a live Appwrite project.
//!
//! The binary in `main.rs` only parses arguments; everything else lives here
//! so the push engine can be driven against a mock API in tests.

pub mod api;
pub mod commands;
pub mod config;
pub mod context;
pub mod models;
pub mod prompt;
pub mod push;
pub mod schema;
