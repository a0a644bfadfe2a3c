//! Uniform `ProviderAdapter` implementations for HelixAgent (§4.B).
//!
//! Each adapter owns its own `reqwest::Client` and translates the neutral
//! [`helix_core::ChatRequest`]/[`helix_core::AdapterResponse`] to and from
//! one backend's wire format. Retry/fallback sequencing and rate-limit
//! admission control live outside this crate, in `helix-ensemble` and
//! `helix-limiter` respectively.

pub mod anthropic_bearer;
pub mod auth;
pub mod echo;
pub mod openai_compatible;

pub use anthropic_bearer::AnthropicBearerAdapter;
pub use auth::CredentialSource;
pub use echo::EchoAdapter;
pub use openai_compatible::OpenAiCompatibleAdapter;
