//! Error taxonomy for the client layer.
//!
//! Non-final config sources fail silently into `SourceOutcome::Unavailable`;
//! everything that reaches this enum is propagated to the caller untouched.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// No configuration source yielded a complete URL + anon key pair.
    /// Fatal; dependent features cannot start without credentials.
    #[error("supabase configuration unresolved; checked sources: {sources}")]
    ConfigurationUnresolved { sources: String },

    /// The underlying HTTP client could not be constructed. Fatal, not retried.
    #[error("http client unavailable: {0}")]
    SdkUnavailable(String),

    /// A delegated backend call answered with a non-success status.
    /// The response body is preserved verbatim.
    #[error("backend operation failed: {status} {message}")]
    Backend {
        status: reqwest::StatusCode,
        message: String,
    },

    /// Transport-level failure before a usable response arrived.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body did not decode into the expected shape.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// An operation that needs an authenticated session was called while
    /// signed out.
    #[error("not signed in")]
    NotSignedIn,
}
