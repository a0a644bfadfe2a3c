//! The error taxonomy shared by every HelixAgent crate.
//!
//! Every fallible internal operation returns a [`HelixError`] rather than
//! panicking or stringly-typed errors. The HTTP edge (`helix-server`) is the
//! only place this taxonomy is collapsed into a stable JSON error code plus
//! an opaque human message — internal callers must keep matching on variants.

use thiserror::Error;

/// Discriminated result type for the core orchestration path.
///
/// Mirrors the taxonomy table: network/5xx/429 are retryable, auth and
/// schema failures are not, and `Cancelled` always wins a race with any
/// other outcome.
#[derive(Debug, Error, Clone)]
pub enum HelixError {
    /// Rate-limited by our own limiter or by the provider's headers.
    #[error("throttled: {0}")]
    Throttled(String),

    /// Network failure or 5xx from the backend. Safe to retry within a
    /// fallback chain.
    #[error("transient backend failure: {0}")]
    TransientBackend(String),

    /// 401/403 from the backend. Never retried on the same adapter; the
    /// registry demotes the provider's health on this outcome.
    #[error("unauthorised: {0}")]
    Unauthorised(String),

    /// The decoded response body didn't match the expected shape.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// The caller's context was cancelled or timed out.
    #[error("cancelled")]
    Cancelled,

    /// Fewer than `min_providers` ensemble attempts succeeded and
    /// `fallback_to_best` was not set.
    #[error("insufficient quorum: got {got}, needed {needed}")]
    InsufficientQuorum { got: usize, needed: usize },

    /// A credential has expired and no refresh token is available.
    #[error("credential expired for {tool}")]
    CredentialExpired { tool: String },

    /// A refresh attempt was explicitly rejected by the token endpoint.
    #[error("refresh denied for {tool}: {reason}")]
    RefreshDenied { tool: String, reason: String },

    /// No credential record exists for the requested tool.
    #[error("no credential configured for {0}")]
    NoCredential(String),

    /// The shared L2 store is unreachable; callers should degrade to
    /// L1-only operation rather than fail the request.
    #[error("cache layer unavailable: {0}")]
    CacheUnavailable(String),

    /// Startup configuration was invalid. Fatal — callers should exit(1).
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Catch-all for I/O and serialization failures that don't fit the
    /// taxonomy above but still need to cross an internal boundary.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HelixError {
    /// Whether a fallback chain should try the next adapter after this
    /// outcome, per §4.B / §7's retry policy.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HelixError::Throttled(_) | HelixError::TransientBackend(_))
    }

    /// Stable machine-readable code for the HTTP boundary. Never changes
    /// across releases; the human message is free to vary.
    pub fn code(&self) -> &'static str {
        match self {
            HelixError::Throttled(_) => "throttled",
            HelixError::TransientBackend(_) => "transient_backend",
            HelixError::Unauthorised(_) => "unauthorised",
            HelixError::SchemaMismatch(_) => "schema_mismatch",
            HelixError::Cancelled => "cancelled",
            HelixError::InsufficientQuorum { .. } => "insufficient_quorum",
            HelixError::CredentialExpired { .. } => "credential_expired",
            HelixError::RefreshDenied { .. } => "refresh_denied",
            HelixError::NoCredential(_) => "no_credential",
            HelixError::CacheUnavailable(_) => "cache_unavailable",
            HelixError::ConfigInvalid(_) => "config_invalid",
            HelixError::Internal(_) => "internal",
        }
    }

    /// HTTP status the server boundary should map this to.
    pub fn http_status(&self) -> u16 {
        match self {
            HelixError::Throttled(_) => 429,
            HelixError::TransientBackend(_) => 502,
            HelixError::Unauthorised(_) => 401,
            HelixError::SchemaMismatch(_) => 422,
            HelixError::Cancelled => 499,
            HelixError::InsufficientQuorum { .. } => 503,
            HelixError::CredentialExpired { .. } | HelixError::RefreshDenied { .. } => 401,
            HelixError::NoCredential(_) => 401,
            HelixError::CacheUnavailable(_) => 200, // degrades silently, never surfaced
            HelixError::ConfigInvalid(_) => 500,
            HelixError::Internal(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, HelixError>;
