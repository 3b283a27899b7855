use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid host provided: {url} ({reason})")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Connection settings for one store endpoint
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Config {
    pub url: String,

    /// Client certificate. PEM bundle (certificate + key), or a PKCS#12
    /// archive when `cert_passphrase` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_path: Option<String>,

    /// Passphrase of a PKCS#12 `cert_path`. Only usable when the client is
    /// built with the `pkcs12` feature; otherwise client construction fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_passphrase: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Disable TLS peer and hostname verification
    #[serde(default)]
    pub insecure_skip_verify: bool,

    /// Per-request timeout in milliseconds; zero means no timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Config {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cert_path: None,
            cert_passphrase: None,
            username: None,
            password: None,
            insecure_skip_verify: false,
            timeout_ms: None,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn with_certificate(mut self, path: impl Into<String>, passphrase: Option<String>) -> Self {
        self.cert_path = non_empty(Some(path.into()));
        self.cert_passphrase = non_empty(passphrase);
        self
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = non_empty(Some(username.into()));
        self.password = non_empty(Some(password.into()));
        self
    }

    pub fn with_insecure_skip_verify(mut self, skip: bool) -> Self {
        self.insecure_skip_verify = skip;
        self
    }

    /// Sub-millisecond timeouts round up to one millisecond; `Duration::ZERO`
    /// disables the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.timeout_ms = Some(if millis == 0 && !timeout.is_zero() { 1 } else { millis });
        self
    }

    /// Validated endpoint with any trailing slash removed
    pub fn base_url(&self) -> Result<String, ConfigError> {
        self.endpoint()?;
        Ok(self.url.trim_end_matches('/').to_string())
    }

    /// Parsed endpoint that request paths are appended to
    pub fn endpoint(&self) -> Result<Url, ConfigError> {
        let parsed = Url::parse(&self.url).map_err(|e| ConfigError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;

        if !parsed.has_host() {
            return Err(ConfigError::InvalidUrl {
                url: self.url.clone(),
                reason: "missing host".to_string(),
            });
        }

        Ok(parsed)
    }

    /// Credentials, only when both halves are configured
    pub fn basic_auth(&self) -> Option<(&str, &str)> {
        match (non_empty_ref(&self.username), non_empty_ref(&self.password)) {
            (Some(user), Some(pass)) => Some((user, pass)),
            _ => None,
        }
    }

    pub fn certificate(&self) -> Option<(&str, Option<&str>)> {
        non_empty_ref(&self.cert_path).map(|path| (path, non_empty_ref(&self.cert_passphrase)))
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn non_empty_ref(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_base_url_strips_trailing_slash() {
        let config = Config::new("http://localhost:8098/");
        assert_eq!(config.base_url().unwrap(), "http://localhost:8098");

        let config = Config::new("https://riak.example.com//");
        assert_eq!(config.base_url().unwrap(), "https://riak.example.com");
    }

    #[test]
    fn test_invalid_url_rejected() {
        for url in ["", "localhost:8098", "not a url", "mailto:ops@example.com"] {
            let err = Config::new(url).base_url().unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidUrl { .. }),
                "expected invalid url for {:?}",
                url
            );
        }
    }

    #[test]
    fn test_basic_auth_requires_both() {
        let config = Config::new("http://localhost:8098");
        assert_eq!(config.basic_auth(), None);

        let mut config = Config::new("http://localhost:8098");
        config.username = Some("riak".to_string());
        assert_eq!(config.basic_auth(), None);

        let config = Config::new("http://localhost:8098").with_basic_auth("riak", "secret");
        assert_eq!(config.basic_auth(), Some(("riak", "secret")));
    }

    #[test]
    fn test_empty_certificate_ignored() {
        let config = Config::new("https://localhost:8098").with_certificate("", Some(String::new()));
        assert_eq!(config.certificate(), None);

        let config = Config::new("https://localhost:8098")
            .with_certificate("/etc/riak/client.pem", Some(String::new()));
        assert_eq!(config.certificate(), Some(("/etc/riak/client.pem", None)));
    }

    #[test]
    fn test_load_applies_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"url": "https://riak.internal:8098", "username": "riak", "password": "pw", "timeout_ms": 5000}}"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.url, "https://riak.internal:8098");
        assert!(!config.insecure_skip_verify);
        assert_eq!(config.cert_path, None);
        assert_eq!(config.timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.basic_auth(), Some(("riak", "pw")));
    }

    #[test]
    fn test_timeout_keeps_sub_second_precision() {
        let config = Config::new("http://localhost:8098").with_timeout(Duration::from_millis(500));
        assert_eq!(config.timeout_ms, Some(500));
        assert_eq!(config.timeout(), Some(Duration::from_millis(500)));

        let config = Config::new("http://localhost:8098").with_timeout(Duration::from_micros(10));
        assert_eq!(config.timeout(), Some(Duration::from_millis(1)));
    }

    #[test]
    fn test_zero_timeout_disables_it() {
        let config = Config::new("http://localhost:8098").with_timeout(Duration::ZERO);
        assert_eq!(config.timeout(), None);

        let mut config = Config::new("http://localhost:8098");
        config.timeout_ms = Some(0);
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/nonexistent/riaklite.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
