//! Shared helpers for transport tests.

use std::time::Duration;

use axum::Router;

use crate::client::create_client_builder;

/// Serve `app` on an ephemeral loopback port and return its base URL.
pub async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("test listener address");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });

    format!("http://{}", addr)
}

/// HTTP client with a short timeout for tests.
pub fn test_client() -> reqwest::Client {
    create_client_builder(Duration::from_secs(5))
        .build()
        .expect("build test client")
}
