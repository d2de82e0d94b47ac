//! Transport clients for inbox-poller.
//!
//! - [`oauth`]: Google OAuth2 client secrets, token grants and the installed-app loopback flow
//! - [`gmail`]: Gmail REST API (`users.messages.list` / `users.messages.get`)
//! - [`webdriver`]: minimal W3C WebDriver client for driving a browser session
//!
//! Every client takes a caller-provided [`reqwest::Client`] so that timeouts,
//! proxies and TLS configuration stay in one place.

pub mod client;
pub mod gmail;
pub mod oauth;
pub mod webdriver;

pub use client::{DEFAULT_UA, create_client_builder, install_rustls_provider};

#[cfg(test)]
pub(crate) mod test_utils;
