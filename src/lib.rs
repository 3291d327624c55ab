// ABOUTME: Library root for highwater - watermark-based incremental row extraction
// ABOUTME: Exposes query rewriting, watermark stores, the extraction cycle and adapters

pub mod config;
pub mod cycle;
pub mod daemon;
pub mod engine;
pub mod error;
pub mod query;
pub mod rest;
pub mod sanitize;
pub mod watermark;

pub use config::JobConfig;
pub use cycle::{CycleState, ExtractionCycle};
pub use daemon::{CycleStats, DaemonConfig, ExtractionDaemon};
pub use engine::{PointInTime, QueryEngine, QueryResult, Row};
pub use error::{BackendError, CycleError, EngineError, MaxValueError, StoreError};
pub use query::{Constraint, Plan, QueryRewriter, CONSTRAINT_ALIAS};
pub use rest::RestClient;
pub use sanitize::sanitize;
pub use watermark::{
    DocumentBackend, FsDocumentBackend, StateLocation, Watermark, WatermarkDocument, WatermarkStore,
};
