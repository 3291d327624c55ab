// ABOUTME: Watermark persistence for incremental extraction
// ABOUTME: Watermark state, the persisted document shape, stores and backends

pub mod fs;
pub mod state;
pub mod store;

pub use fs::FsDocumentBackend;
pub use state::{Permission, Watermark, WatermarkDocument};
pub use store::{
    DocumentBackend, DurableWatermarkStore, InMemoryWatermarkStore, StateLocation, WatermarkStore,
};
