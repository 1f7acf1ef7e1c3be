//! Secret handling utilities.
//!
//! Re-exports secrecy types and builds the bearer header value for the
//! delivery endpoint.

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

/// `Authorization` header value for a bearer token.
pub fn bearer(token: &SecretString) -> String {
    format!("Bearer {}", token.expose_secret())
}
