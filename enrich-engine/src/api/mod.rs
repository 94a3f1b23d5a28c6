//! HTTP API handlers for enrich-engine
//!
//! Thin REST surface over the engine's in-process contracts.

pub mod analytics;
pub mod health;
pub mod resolve;

pub use analytics::analytics_routes;
pub use health::health_routes;
pub use resolve::resolve_routes;
