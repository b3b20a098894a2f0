//! # dm-search
//!
//! Similarity search over data-product descriptions.
//!
//! dm-search keeps a vector index of short descriptions, hydrated on a
//! schedule from a registrar service and through its own HTTP API, and
//! answers "which data product is this about?" queries, optionally
//! enriched with the product's artifacts from the discovery service.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐  every N s   ┌──────────┐      ┌─────────────┐
//! │ Registrar │─────────────▶│  Loader  │─────▶│ SearchIndex │
//! └───────────┘              └──────────┘      │ embed+store │
//!                                              └──────┬──────┘
//!          ┌──────────────────────────────────────────┤
//!          ▼                                          ▼
//!   ┌─────────────┐   logging + metrics   ┌──────────────────────┐
//!   │  HTTP API   │◀──────────────────────│ Artifact lookup (opt)│
//!   │  (axum)     │      middleware       └──────────────────────┘
//!   └─────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | tracing subscriber setup |
//! | [`state`] | Shared key/value state, trace counter, metrics table |
//! | [`http_client`] | Outbound HTTP helper |
//! | [`embedding`] | Embedding providers and vector helpers |
//! | [`store`] | Vector store trait, in-memory and SQLite backends |
//! | [`db`] | SQLite connection and schema |
//! | [`models`] | API, registrar and artifact types |
//! | [`registrar`] | Registrar collaborator |
//! | [`artifacts`] | Artifact lookup collaborator |
//! | [`index`] | Search index over descriptions |
//! | [`middleware`] | Request logging and metrics middleware |
//! | [`loader`] | Periodic registrar loader |
//! | [`server`] | HTTP API |

pub mod artifacts;
pub mod config;
pub mod db;
pub mod embedding;
pub mod http_client;
pub mod index;
pub mod loader;
pub mod logging;
pub mod middleware;
pub mod models;
pub mod registrar;
pub mod server;
pub mod state;
pub mod store;
