//! In-memory blob service.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use bytes::Bytes;
use twainlink::cloud::{BlobError, BlobStore};

/// Blob store keeping every upload in memory under `blob-<n>` ids.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Bytes>>,
}

impl MemoryBlobStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    fn blobs(&self) -> MutexGuard<'_, HashMap<String, Bytes>> {
        match self.blobs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Store `data` under a chosen `id`.
    pub fn insert(&self, id: impl Into<String>, data: impl Into<Bytes>) {
        self.blobs().insert(id.into(), data.into());
    }

    /// Contents stored under `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Bytes> { self.blobs().get(id).cloned() }

    /// Number of stored blobs.
    #[must_use]
    pub fn len(&self) -> usize { self.blobs().len() }

    /// Whether nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.blobs().is_empty() }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, data: Bytes) -> Result<String, BlobError> {
        let mut blobs = self.blobs();
        let id = format!("blob-{}", blobs.len().saturating_add(1));
        blobs.insert(id.clone(), data);
        Ok(id)
    }

    async fn download(&self, id: &str) -> Result<Bytes, BlobError> {
        self.get(id).ok_or_else(|| BlobError::NotFound(id.to_owned()))
    }
}
