use std::time::Duration;

use tracing::warn;

use crate::config::HttpClientConfig;

/// Apply the optional proxy to an existing `reqwest::ClientBuilder`.
///
/// - `proxy_url = None` => reqwest defaults (system/env proxy)
/// - `proxy_url = Some("")` => disable all proxy
/// - `proxy_url = Some(url)` => explicit proxy; an invalid URL disables proxying
pub fn apply_proxy(
    builder: reqwest::ClientBuilder,
    proxy_url: Option<&str>,
) -> reqwest::ClientBuilder {
    match proxy_url {
        None => builder,
        Some("") => builder.no_proxy(),
        Some(url) => match reqwest::Proxy::all(url) {
            Ok(proxy) => builder.proxy(proxy),
            Err(error) => {
                warn!(proxy_url = %url, error = %error, "Invalid proxy URL; disabling proxy");
                builder.no_proxy()
            }
        },
    }
}

/// Build the shared HTTP client used by the backend, discovery and
/// notification adapters.
pub fn build_client(config: &HttpClientConfig) -> crate::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(concat!("media-acquire/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10));

    if config.request_timeout_secs > 0 {
        builder = builder.timeout(Duration::from_secs(config.request_timeout_secs));
    }

    builder = apply_proxy(builder, config.proxy_url.as_deref());

    builder
        .build()
        .map_err(|e| crate::Error::config(format!("failed to build HTTP client: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_client_with_invalid_proxy_still_builds() {
        let config = HttpClientConfig {
            request_timeout_secs: 5,
            proxy_url: Some("not a url".to_string()),
        };
        assert!(build_client(&config).is_ok());
    }

    #[test]
    fn test_build_client_defaults() {
        assert!(build_client(&HttpClientConfig::default()).is_ok());
    }
}
