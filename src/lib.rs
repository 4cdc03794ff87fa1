//! Sortify - Semantic File Routing Engine
//!
//! Sortify decides where a newly detected file belongs. It combines a
//! weighted ensemble of independent voters, an episodic memory of past
//! decisions, a time-windowed session context and an online folder
//! clustering index, and escalates to an external reasoning service only
//! when the ensemble is unsure.
//!
//! ## Architecture
//!
//! ```text
//!   ClassificationRequest
//!            │
//! ┌──────────▼──────────────────────────────────────────────────────┐
//! │                         SortingCore                              │
//! │  ┌───────────────────────────────────────────────────────────┐  │
//! │  │                     VotingEngine                           │  │
//! │  │  MemoryCheck ──hit──────────────────────────► Resolved     │  │
//! │  │      │ miss                                      ▲         │  │
//! │  │  ┌───▼───────────────────────────────────────┐   │         │  │
//! │  │  │ Voters (bounded worker pool)              │   │         │  │
//! │  │  │ content_type │ keyword │ atlas │ memory   ├───┤         │  │
//! │  │  │ session      │ frequency                  │   │         │  │
//! │  │  └───┬───────────────────────────────────────┘   │         │  │
//! │  │      │ low normalized confidence                 │         │  │
//! │  │  Reasoning (one call, timeout) ──────────────────┘         │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! │                                                                  │
//! │  ┌────────────┐   ┌────────────┐   ┌──────────────────────────┐ │
//! │  │   Atlas    │   │   Memory   │   │  SessionManager          │ │
//! │  │ per-folder │   │ ring + ANN │   │  windowed per-key shards │ │
//! │  │ centroids  │   │   index    │   │                          │ │
//! │  └─────▲──────┘   └─────▲──────┘   └────────────▲─────────────┘ │
//! │        └────────────────┴──── on_action_completed ┘              │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`vector`]: cosine similarity and incremental centroid math
//! - [`session`]: time-windowed session context
//! - [`memory`]: bounded episodic memory with pluggable recall indexes
//! - [`atlas`]: folder clustering and three-tier matching
//! - [`voting`]: voters, aggregation and the classification state machine
//! - [`external`]: embedding model and reasoning service boundaries
//! - [`core`]: the `classify` / `on_action_completed` facade
//! - [`bus`]: typed message channel in front of the core
//! - [`config`]: configuration management

pub mod atlas;
pub mod bus;
pub mod config;
pub mod core;
pub mod error;
pub mod external;
pub mod memory;
pub mod session;
pub mod types;
pub mod vector;
pub mod voting;

pub use crate::core::{Classification, Completion, SortingCore};
pub use config::SortifyConfig;
pub use error::{Error, Result};
pub use types::{ClassificationRequest, ClassificationResult, Source, Vote, UNKNOWN};
