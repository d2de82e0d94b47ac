use std::sync::OnceLock;
use std::time::Duration;

use reqwest::ClientBuilder;
use tracing::debug;

/// User agent sent by every transport request.
pub const DEFAULT_UA: &str = concat!("inbox-poller/", env!("CARGO_PKG_VERSION"));

/// Install the process-wide rustls crypto provider exactly once.
pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate installed one first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Create a client builder with the defaults shared by all transports.
///
/// A zero `timeout` leaves the request timeout unset.
pub fn create_client_builder(timeout: Duration) -> ClientBuilder {
    install_rustls_provider();

    let mut builder = reqwest::Client::builder()
        .user_agent(DEFAULT_UA)
        .connect_timeout(Duration::from_secs(10))
        .pool_idle_timeout(Duration::from_secs(90));

    if timeout > Duration::ZERO {
        builder = builder.timeout(timeout);
    }

    builder
}
