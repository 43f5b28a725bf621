//! Menu snapshot cache and refresh orchestration.
//!
//! Reads are served from an in-memory snapshot; staleness triggers a single
//! background crawl whose result replaces the snapshot in one swap.

pub mod crawl;
pub mod gate;
pub mod store;

pub use crawl::{crawl_window, CrawlOrchestrator, CrawlReport, CrawlSummary};
pub use gate::{GateState, RefreshDecision, StalenessGate};
pub use store::CacheStore;
