// ABOUTME: WatermarkStore - retrieves and records the watermark between extraction cycles
// ABOUTME: In-process variant for single runs, durable variant backed by a document store

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::state::{Watermark, WatermarkDocument};
use crate::error::{BackendError, StoreError};

/// Durable document storage used by [`WatermarkStore::Durable`].
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Write `body` to `uri` in a single atomic operation, replacing any
    /// previous document.
    async fn write_document(
        &self,
        uri: &str,
        permissions: &str,
        collections: &[String],
        body: &Value,
    ) -> Result<(), BackendError>;

    /// Read the raw document at `uri`, or `None` if nothing is stored there.
    async fn read_document(&self, uri: &str) -> Result<Option<String>, BackendError>;
}

/// Where the durable watermark lives and how it is tagged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLocation {
    pub uri: String,
    /// `role,capability,...` descriptor passed through to the backend
    pub permissions: String,
    pub collections: Vec<String>,
}

impl StateLocation {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            permissions: String::new(),
            collections: Vec::new(),
        }
    }

    pub fn with_permissions(mut self, permissions: impl Into<String>) -> Self {
        self.permissions = permissions.into();
        self
    }

    pub fn with_collections(mut self, collections: Vec<String>) -> Self {
        self.collections = collections;
        self
    }
}

/// Watermark held in process memory. Lost when the process exits.
#[derive(Debug, Clone)]
pub struct InMemoryWatermarkStore {
    watermark: Watermark,
}

/// Watermark persisted as a document through a [`DocumentBackend`].
#[derive(Clone)]
pub struct DurableWatermarkStore {
    backend: Arc<dyn DocumentBackend>,
    location: StateLocation,
    watermark: Watermark,
}

/// Persists the watermark for one extraction job.
///
/// A store instance is owned by exactly one extraction cycle; nothing here
/// locks, so no other writer may target the same durable location.
pub enum WatermarkStore {
    InMemory(InMemoryWatermarkStore),
    Durable(DurableWatermarkStore),
}

impl WatermarkStore {
    pub fn in_memory(constraint_column: &str) -> Self {
        WatermarkStore::InMemory(InMemoryWatermarkStore {
            watermark: Watermark::new(constraint_column),
        })
    }

    pub fn durable(
        constraint_column: &str,
        backend: Arc<dyn DocumentBackend>,
        location: StateLocation,
    ) -> Self {
        WatermarkStore::Durable(DurableWatermarkStore {
            backend,
            location,
            watermark: Watermark::new(constraint_column),
        })
    }

    pub fn is_durable(&self) -> bool {
        matches!(self, WatermarkStore::Durable(_))
    }

    /// The watermark last read or written through this store.
    pub fn current(&self) -> &Watermark {
        match self {
            WatermarkStore::InMemory(store) => &store.watermark,
            WatermarkStore::Durable(store) => &store.watermark,
        }
    }

    /// Current watermark value, or `None` if none has been stored.
    ///
    /// For the durable variant a missing document means "no watermark yet";
    /// a document that exists but cannot be read as a watermark is an error.
    pub async fn retrieve(&mut self) -> Result<Option<String>, StoreError> {
        match self {
            WatermarkStore::InMemory(store) => Ok(store.watermark.value.clone()),
            WatermarkStore::Durable(store) => store.retrieve().await,
        }
    }

    /// Record a new watermark value and the row count that produced it.
    pub async fn store(&mut self, value: &str, row_count: u64) -> Result<(), StoreError> {
        match self {
            WatermarkStore::InMemory(store) => {
                store.watermark.update(value, row_count);
                Ok(())
            }
            WatermarkStore::Durable(store) => store.store(value, row_count).await,
        }
    }
}

impl DurableWatermarkStore {
    pub fn location(&self) -> &StateLocation {
        &self.location
    }

    async fn retrieve(&mut self) -> Result<Option<String>, StoreError> {
        let uri = &self.location.uri;
        let body = match self.backend.read_document(uri).await {
            Ok(Some(body)) => body,
            Ok(None) => {
                tracing::debug!("No watermark document at {}, starting from the beginning", uri);
                return Ok(None);
            }
            Err(source) => {
                return Err(StoreError::Backend {
                    uri: uri.clone(),
                    source,
                })
            }
        };

        let document: WatermarkDocument =
            serde_json::from_str(&body).map_err(|e| StoreError::Corrupt {
                uri: uri.clone(),
                reason: e.to_string(),
            })?;
        let watermark = document
            .into_watermark()
            .map_err(|reason| StoreError::Corrupt {
                uri: uri.clone(),
                reason,
            })?;

        if watermark.constraint_column != self.watermark.constraint_column {
            return Err(StoreError::ColumnMismatch {
                uri: uri.clone(),
                stored: watermark.constraint_column,
                configured: self.watermark.constraint_column.clone(),
            });
        }

        tracing::debug!(
            "Loaded watermark {:?} for column {} from {}",
            watermark.value,
            watermark.constraint_column,
            uri
        );
        self.watermark = watermark;
        Ok(self.watermark.value.clone())
    }

    async fn store(&mut self, value: &str, row_count: u64) -> Result<(), StoreError> {
        let mut next = self.watermark.clone();
        next.update(value, row_count);
        let body = match next.to_document() {
            Some(document) => serde_json::to_value(document)?,
            None => return Ok(()),
        };

        self.backend
            .write_document(
                &self.location.uri,
                &self.location.permissions,
                &self.location.collections,
                &body,
            )
            .await
            .map_err(|source| StoreError::Backend {
                uri: self.location.uri.clone(),
                source,
            })?;

        // Only advance the cached value once the write has landed.
        self.watermark = next;
        Ok(())
    }
}
