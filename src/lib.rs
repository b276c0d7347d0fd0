// src/lib.rs
// Public library surface for the binary, integration tests and embedding apps.

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod projection;
pub mod registry;
pub mod request;
pub mod retry;
pub mod subscription;
pub mod transport;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, router, AppState};
pub use crate::client::{CryptoClient, TimePeriod};
pub use crate::config::ClientConfig;
pub use crate::error::FetchError;
pub use crate::orchestrator::{FetchOptions, Fetched, Origin};
pub use crate::projection::DomainObject;
pub use crate::request::Params;
