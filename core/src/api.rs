//! Connection settings and the versioned endpoint table.
//!
//! # Design
//! `ClientConfig` is plain data with defaults matching a local server on port
//! 8080. The endpoint table is a static slice keyed by api version; the
//! client resolves it once at construction so an unknown version fails before
//! any request is issued.

use std::time::Duration;

use crate::error::DdError;

/// Default request timeout: 24 hours, long enough for blocking training calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(86_400);

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_API_VERSION: &str = "0.1";

/// Scheme used to reach the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl Protocol {
    /// Numeric selector used by older client configs: 0 is plain HTTP,
    /// anything else is HTTPS.
    pub fn from_selector(selector: u8) -> Self {
        if selector == 0 {
            Protocol::Http
        } else {
            Protocol::Https
        }
    }

    pub fn scheme(self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

/// Where the server lives and how long a single call may block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
    pub api_version: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            protocol: Protocol::Http,
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `scheme://host:port`, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol.scheme(), self.host, self.port)
    }
}

/// Path suffixes for each resource family of one api version.
#[derive(Debug, PartialEq, Eq)]
pub struct ApiUrls {
    pub version: &'static str,
    pub info: &'static str,
    pub services: &'static str,
    pub train: &'static str,
    pub predict: &'static str,
}

static API_URLS: &[ApiUrls] = &[ApiUrls {
    version: "0.1",
    info: "/info",
    services: "/services",
    train: "/train",
    predict: "/predict",
}];

impl ApiUrls {
    pub fn lookup(version: &str) -> Result<&'static ApiUrls, DdError> {
        API_URLS
            .iter()
            .find(|urls| urls.version == version)
            .ok_or_else(|| DdError::UnknownApiVersion(version.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_points_at_local_server() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url(), "http://localhost:8080");
        assert_eq!(config.api_version, "0.1");
        assert_eq!(config.timeout, Duration::from_secs(86_400));
    }

    #[test]
    fn https_changes_only_the_scheme() {
        let config = ClientConfig::default()
            .with_host("dd.example.org")
            .with_port(443)
            .with_protocol(Protocol::Https);
        assert_eq!(config.base_url(), "https://dd.example.org:443");
    }

    #[test]
    fn selector_zero_is_plain_http() {
        assert_eq!(Protocol::from_selector(0), Protocol::Http);
        assert_eq!(Protocol::from_selector(1), Protocol::Https);
    }

    #[test]
    fn lookup_known_version() {
        let urls = ApiUrls::lookup("0.1").unwrap();
        assert_eq!(urls.info, "/info");
        assert_eq!(urls.train, "/train");
        assert_eq!(urls.predict, "/predict");
        assert_eq!(urls.services, "/services");
    }

    #[test]
    fn lookup_unknown_version_fails() {
        let err = ApiUrls::lookup("2.0").unwrap_err();
        assert!(matches!(err, DdError::UnknownApiVersion(v) if v == "2.0"));
    }
}
