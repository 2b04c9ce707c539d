// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod blend;
pub mod category;
pub mod config;
pub mod degrade;
pub mod engine;
pub mod explain;
pub mod matcher;
pub mod metrics;
pub mod neighbor;
pub mod normalize;
pub mod rules;
pub mod signals;
pub mod tiering;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::category::Category;
pub use crate::config::EngineConfig;
pub use crate::degrade::{DegradationController, Mode};
pub use crate::engine::{EvalOptions, RiskEngine};
pub use crate::explain::DecisionRecord;
pub use crate::tiering::Tier;
