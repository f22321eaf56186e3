//! Outbreak Propagation Engine
//!
//! Drives seeds outward through the geographic ladder, scores their
//! resonance and groups their most engaged audience into clusters.
//!
//! # Flow
//!
//! ```text
//!  Notification ──▶ EventDispatcher ──▶ PropagationEngine
//!                                          │  per-seed lock
//!                     ┌────────────────────┼────────────────────┐
//!                     ▼                    ▼                    ▼
//!              InfectionEngine     record_interaction   ClusterFormationEngine
//!                     │                    │                    │
//!              PropagationState       InteractionEvent       Cluster
//!                     └────────────────────┴────────────────────┘
//!                                      SeedStore
//! ```
//!
//! # Errors
//!
//! [`Error::is_expected`] separates ordinary outcomes (locked level, expired
//! seed, duplicate delivery) from engine failures. Only
//! [`Error::is_retryable`] errors are worth retrying, and the engine never
//! retries on its own.

pub mod clock;
pub mod cluster;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod infection;
pub mod locks;
pub mod seed;
pub mod state;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use cluster::{Cluster, ClusterFormationEngine, ClusterPolicy, SpectralDiversity};
pub use dispatch::{DispatchStats, EventDispatcher, Notification};
pub use engine::{EngineConfig, LevelSummary, PropagationEngine, DEFAULT_HANDLER_TIMEOUT};
pub use error::{Error, Result};
pub use infection::{GeoDescriber, InfectionEngine, InfectionEvent, InfectionRequest, Locality};
pub use locks::SeedLocks;
pub use seed::{NewSeed, Seed, SeedKind};
pub use state::{LevelPhase, LevelProgress, PropagationState, StateViolation};
pub use store::{MemoryStore, SeedStore, UserDirectory};

pub use outbreak_geo as geo;
pub use outbreak_resonance as resonance;
