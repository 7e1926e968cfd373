//! Route safety scoring.
//!
//! Candidate routes from an external routing provider are scored against
//! safety landmarks (police, hospitals, lit streets, ...) and user incident
//! reports. Each route point collects the weight of every landmark within
//! the proximity radius and a fixed penalty for every nearby report; the
//! route's mean is recentred and clamped onto a 1.0–5.0 scale.
//!
//! The engine is pure: every call takes an explicit [`Snapshot`] of the
//! store, so the same inputs always give the same score.

pub mod api;
pub mod config;
pub mod coord;
pub mod error;
pub mod model;
pub mod ranking;
pub mod refresh;
pub mod safety;
pub mod store;

pub use api::{AppState, build_router};
pub use config::{Config, EngineConfig, PresentationPolicy};
pub use coord::{Coordinate, distance_km};
pub use error::{ConfigError, ScoringError};
pub use model::{
    IncidentCategory, IncidentReport, LandmarkCategory, NewReport, Route, RouteScore,
    SafetyLandmark, Score,
};
pub use ranking::{RankedRoute, Ranking, SafetyBucket};
pub use refresh::{ReportFeed, spawn_feed_refresh};
pub use safety::SafetyScorer;
pub use store::{MemoryStore, ReportSink, SafetyStore, Snapshot};
