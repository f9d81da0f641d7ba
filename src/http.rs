use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = concat!("cantus/", env!("CARGO_PKG_VERSION"));

/// The shared HTTP client. Built once and reused by every remote provider.
pub fn build_client(user_agent: &str, timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}
