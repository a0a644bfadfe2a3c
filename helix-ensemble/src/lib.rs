//! The Ensemble Engine for HelixAgent (§4.G): fan-out, per-position
//! fallback chains, and majority/confidence-weighted/consensus
//! aggregation over parallel provider completions.

pub mod engine;
pub mod plan;
pub mod strategy;

pub use engine::EnsembleEngine;
pub use plan::{EnsembleConfig, EnsemblePlan, Position, Strategy};
pub use strategy::Candidate;
