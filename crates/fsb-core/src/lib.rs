//! Core domain + application logic for the feed subscription bot.
//!
//! This crate is intentionally framework-agnostic. Telegram and the persistence
//! layer live behind ports (traits) implemented in adapter crates or `store`.

pub mod broadcast;
pub mod config;
pub mod domain;
pub mod entities;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod ports;
pub mod registrar;
pub mod render;
pub mod security;
pub mod store;

/// Recording fakes, shared with the adapter crates' tests.
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use errors::{Error, Result};
