//! OAuth2 credential store for HelixAgent: reads CLI-tool credential
//! files, proactively refreshes tokens before expiry, and persists
//! updates atomically (§4.A).

mod atomic_write;
pub mod record;
pub mod source;
pub mod store;

pub use record::{CredentialRecord, CACHE_TTL, REFRESH_COOLDOWN, REFRESH_THRESHOLD};
pub use source::{ClaudeCodeSource, CredentialSource, QwenCodeSource};
pub use store::{CredentialStore, Token};
