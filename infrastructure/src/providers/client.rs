//! Shared outbound HTTP client.
//!
//! One client per process: connection pooling with generous per-host idle
//! capacity, keep-alive on, and a 5 second dial timeout. Individual calls set
//! their own deadline-derived timeouts on top.

use std::time::Duration;

pub fn shared_http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .pool_max_idle_per_host(64)
        .tcp_keepalive(Duration::from_secs(60))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builds() {
        assert!(shared_http_client().is_ok());
    }
}
