//! inbox-poller library crate.
//!
//! Keeps an authenticated Gmail session alive and runs a "check for new mail"
//! action on a fixed interval. The binary in `main.rs` only wires these
//! modules together.

pub mod action;
pub mod app;
pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod poll;

pub use error::{Error, Result};

#[cfg(test)]
pub(crate) mod test_utils;
