//! Provider Registry and Startup Verifier for HelixAgent (§4.C, §4.D).

pub mod registry;
pub mod verifier;

pub use registry::Registry;
pub use verifier::{ProviderFacts, Verifier};
