//! OpenAI-compatible HTTP surface for HelixAgent (§6): axum router,
//! request/response translation, and admin endpoints. The composition
//! root (`helixagent`) builds an [`AppState`] and calls [`build_router`].

pub mod config;
pub mod error;
pub mod router;
pub mod routes;
pub mod state;
pub mod wire;

pub use config::ServerConfig;
pub use router::build_router;
pub use state::AppState;
