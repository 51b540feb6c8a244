//! Cookie mirror contract.
//!
//! The cookie jar is an external collaborator (in a browser host it wraps
//! `document.cookie`); the core only produces fully formed set-cookie
//! directives and consumes raw values. Read and write failures are
//! swallowed by the manager - the core continues in memory.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Name of the identity cookie.
pub const IDENTITY_COOKIE_NAME: &str = "__uid_2";

/// Errors a cookie jar may report on write.
#[derive(Error, Debug)]
pub enum CookieError {
    /// The jar could not apply the directive.
    #[error("cookie write failed: {0}")]
    Write(String),
}

/// A single atomic set-cookie directive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CookieDirective {
    /// Cookie name.
    pub name: String,
    /// Cookie value, already URL-encoded.
    pub value: String,
    /// Absolute expiry in milliseconds since the Unix epoch.
    pub expires_at_ms: u64,
    /// Optional Domain attribute.
    pub domain: Option<String>,
    /// Path attribute.
    pub path: String,
}

impl CookieDirective {
    /// Render the directive as a single `document.cookie` assignment string.
    ///
    /// `SameSite=Lax` is always applied.
    pub fn header_string(&self) -> String {
        let mut out = format!("{}={}", self.name, self.value);
        out.push_str(&format!("; Path={}", self.path));
        if let Some(domain) = &self.domain {
            out.push_str(&format!("; Domain={}", domain));
        }
        out.push_str("; SameSite=Lax");
        if let Some(expires) = DateTime::<Utc>::from_timestamp_millis(self.expires_at_ms as i64) {
            out.push_str(&format!(
                "; Expires={}",
                expires.format("%a, %d %b %Y %H:%M:%S GMT")
            ));
        }
        out
    }
}

/// The single mutable cookie slot the core mirrors identity into.
pub trait CookieJar: Send + Sync {
    /// Read the raw value of a cookie, if present.
    fn read(&self, name: &str) -> Option<String>;

    /// Apply a set-cookie directive atomically.
    ///
    /// # Errors
    ///
    /// Implementations may report failure; the core logs and continues.
    fn write(&self, directive: &CookieDirective) -> Result<(), CookieError>;

    /// Remove a cookie.
    fn clear(&self, name: &str, domain: Option<&str>, path: &str);
}

/// In-memory cookie jar for tests and non-browser hosts.
#[derive(Debug, Default)]
pub struct MemoryCookieJar {
    cookies: Mutex<HashMap<String, String>>,
}

impl MemoryCookieJar {
    /// Create an empty jar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a cookie (test setup).
    pub fn seed(&self, name: &str, value: &str) {
        self.cookies
            .lock()
            .expect("cookie jar lock poisoned")
            .insert(name.to_string(), value.to_string());
    }
}

impl CookieJar for MemoryCookieJar {
    fn read(&self, name: &str) -> Option<String> {
        self.cookies
            .lock()
            .expect("cookie jar lock poisoned")
            .get(name)
            .cloned()
    }

    fn write(&self, directive: &CookieDirective) -> Result<(), CookieError> {
        self.cookies
            .lock()
            .expect("cookie jar lock poisoned")
            .insert(directive.name.clone(), directive.value.clone());
        Ok(())
    }

    fn clear(&self, name: &str, _domain: Option<&str>, _path: &str) {
        self.cookies
            .lock()
            .expect("cookie jar lock poisoned")
            .remove(name);
    }
}
