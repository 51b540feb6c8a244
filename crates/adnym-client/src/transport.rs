//! HTTP transport contract.
//!
//! The transport itself is an external collaborator; the core only issues
//! fully formed requests and interprets raw responses. No timeout is
//! attached here - callers rely on the underlying transport's defaults.

use async_trait::async_trait;
use thiserror::Error;

/// A request the core hands to the transport.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    /// Absolute request URL.
    pub url: String,
    /// Raw text body.
    pub body: String,
    /// Header name/value pairs to attach.
    pub headers: Vec<(String, String)>,
}

/// A raw response as the transport saw it.
#[derive(Clone, Debug)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Errors the transport may surface.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),
}

/// POST transport contract used by the refresh path.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a POST and return the raw response.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` when no response was obtained; the core
    /// treats that as a refresh error outcome.
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_success_range() {
        assert!(HttpResponse { status: 200, body: vec![] }.is_success());
        assert!(HttpResponse { status: 299, body: vec![] }.is_success());
        assert!(!HttpResponse { status: 400, body: vec![] }.is_success());
        assert!(!HttpResponse { status: 199, body: vec![] }.is_success());
    }
}
