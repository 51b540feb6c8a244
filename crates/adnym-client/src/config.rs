//! Init options for the lifecycle manager.

use thiserror::Error;

use crate::envelope::IdentityEnvelope;
use crate::status::StatusCallback;

/// Default production endpoint.
pub const DEFAULT_BASE_URL: &str = "https://prod.uidapi.com";

/// Default delay before retrying a failed refresh.
pub const DEFAULT_REFRESH_RETRY_PERIOD_MS: u64 = 5_000;

/// Smallest accepted retry period.
pub const MIN_REFRESH_RETRY_PERIOD_MS: u64 = 1_000;

/// Default cookie path.
pub const DEFAULT_COOKIE_PATH: &str = "/";

/// Invalid init options.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A field carried an unusable value.
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue {
        /// The offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Options accepted by [`IdentityClient::init`](crate::IdentityClient::init).
#[derive(Clone)]
pub struct InitOptions {
    /// Host callback run once per observable transition.
    pub callback: StatusCallback,
    /// Bootstrap envelope; when absent the cookie is consulted.
    pub identity: Option<IdentityEnvelope>,
    /// Delay before retrying a failed refresh.
    pub refresh_retry_period_ms: u64,
    /// Base URL of the identity service.
    pub base_url: String,
    /// Optional Domain attribute for the identity cookie.
    pub cookie_domain: Option<String>,
    /// Path attribute for the identity cookie.
    pub cookie_path: String,
}

impl InitOptions {
    /// Options with defaults and the required callback.
    pub fn new(callback: StatusCallback) -> Self {
        Self {
            callback,
            identity: None,
            refresh_retry_period_ms: DEFAULT_REFRESH_RETRY_PERIOD_MS,
            base_url: DEFAULT_BASE_URL.to_string(),
            cookie_domain: None,
            cookie_path: DEFAULT_COOKIE_PATH.to_string(),
        }
    }

    /// Supply a bootstrap envelope.
    pub fn with_identity(mut self, identity: IdentityEnvelope) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Override the refresh retry period.
    pub fn with_refresh_retry_period_ms(mut self, period_ms: u64) -> Self {
        self.refresh_retry_period_ms = period_ms;
        self
    }

    /// Override the service base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the cookie Domain attribute.
    pub fn with_cookie_domain(mut self, domain: impl Into<String>) -> Self {
        self.cookie_domain = Some(domain.into());
        self
    }

    /// Override the cookie Path attribute.
    pub fn with_cookie_path(mut self, path: impl Into<String>) -> Self {
        self.cookie_path = path.into();
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_retry_period_ms < MIN_REFRESH_RETRY_PERIOD_MS {
            return Err(ConfigError::InvalidValue {
                field: "refresh_retry_period_ms",
                reason: format!("must be at least {} ms", MIN_REFRESH_RETRY_PERIOD_MS),
            });
        }
        if self.base_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "base_url",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for InitOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitOptions")
            .field("identity", &self.identity.is_some())
            .field("refresh_retry_period_ms", &self.refresh_retry_period_ms)
            .field("base_url", &self.base_url)
            .field("cookie_domain", &self.cookie_domain)
            .field("cookie_path", &self.cookie_path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn options() -> InitOptions {
        InitOptions::new(Arc::new(|_| {}))
    }

    #[test]
    fn test_defaults() {
        let opts = options();
        assert_eq!(opts.refresh_retry_period_ms, 5_000);
        assert_eq!(opts.base_url, DEFAULT_BASE_URL);
        assert_eq!(opts.cookie_path, "/");
        assert!(opts.cookie_domain.is_none());
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_retry_period_minimum() {
        let opts = options().with_refresh_retry_period_ms(999);
        assert!(matches!(
            opts.validate(),
            Err(ConfigError::InvalidValue {
                field: "refresh_retry_period_ms",
                ..
            })
        ));
        assert!(options()
            .with_refresh_retry_period_ms(1_000)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_empty_base_url_rejected() {
        let opts = options().with_base_url("");
        assert!(opts.validate().is_err());
    }
}
