//! In-process blob registry
//!
//! Binary media too large for a `data:` URL (finished videos) is parked here
//! and addressed through a `blob:` URL. Each entry is owned by exactly one
//! [`ObjectUrl`]; releasing it removes the entry, and releasing twice does
//! nothing.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

pub const BLOB_URL_PREFIX: &str = "blob:nova-studio/";

#[derive(Debug, Clone)]
pub struct Blob {
    pub bytes: Arc<[u8]>,
    pub mime_type: String,
}

#[derive(Clone, Default)]
pub struct BlobRegistry {
    entries: Arc<Mutex<HashMap<Uuid, Blob>>>,
}

impl BlobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<Uuid, Blob>> {
        // Entries are plain data, so a poisoned map is still consistent.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn create_object_url(&self, bytes: Vec<u8>, mime_type: impl Into<String>) -> ObjectUrl {
        let id = Uuid::new_v4();
        let blob = Blob {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
        };
        tracing::debug!(
            "Registered blob {} ({} bytes, {})",
            id,
            blob.bytes.len(),
            blob.mime_type
        );
        self.entries().insert(id, blob);

        ObjectUrl {
            id,
            url: format!("{}{}", BLOB_URL_PREFIX, id),
            registry: self.clone(),
            released: false,
        }
    }

    pub fn resolve(&self, url: &str) -> Option<Blob> {
        let id = parse_blob_url(url)?;
        self.entries().get(&id).cloned()
    }

    /// Remove the blob behind `url`. Returns false if it was already gone.
    pub fn revoke(&self, url: &str) -> bool {
        match parse_blob_url(url) {
            Some(id) => self.remove(id),
            None => false,
        }
    }

    fn remove(&self, id: Uuid) -> bool {
        let removed = self.entries().remove(&id).is_some();
        if removed {
            tracing::debug!("Released blob {}", id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl fmt::Debug for BlobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobRegistry")
            .field("entries", &self.len())
            .finish()
    }
}

fn parse_blob_url(url: &str) -> Option<Uuid> {
    url.strip_prefix(BLOB_URL_PREFIX)
        .and_then(|id| Uuid::parse_str(id).ok())
}

/// Owning handle to a registered blob. Dropping it releases the blob.
pub struct ObjectUrl {
    id: Uuid,
    url: String,
    registry: BlobRegistry,
    released: bool,
}

impl ObjectUrl {
    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn blob(&self) -> Option<Blob> {
        if self.released {
            return None;
        }
        self.registry.entries().get(&self.id).cloned()
    }

    /// Release the underlying blob. Only the first call has any effect.
    pub fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        self.registry.remove(self.id)
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Give up scoped ownership; the caller must revoke the returned URL
    /// through [`BlobRegistry::revoke`].
    pub fn detach(mut self) -> String {
        self.released = true;
        std::mem::take(&mut self.url)
    }
}

impl Drop for ObjectUrl {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectUrl")
            .field("url", &self.url)
            .field("released", &self.released)
            .finish()
    }
}

impl fmt::Display for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_resolve() {
        let registry = BlobRegistry::new();
        let url = registry.create_object_url(vec![1, 2, 3], "video/mp4");

        assert!(url.as_str().starts_with(BLOB_URL_PREFIX));
        let blob = registry.resolve(url.as_str()).unwrap();
        assert_eq!(&*blob.bytes, &[1, 2, 3]);
        assert_eq!(blob.mime_type, "video/mp4");
    }

    #[test]
    fn test_double_release_is_noop() {
        let registry = BlobRegistry::new();
        let mut url = registry.create_object_url(vec![0; 8], "video/mp4");

        assert!(url.release());
        assert!(!url.release());
        assert!(url.is_released());
        assert!(url.blob().is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_drop_releases() {
        let registry = BlobRegistry::new();
        {
            let _url = registry.create_object_url(vec![0; 8], "video/mp4");
            assert_eq!(registry.len(), 1);
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_detach_hands_over_manual_revoke() {
        let registry = BlobRegistry::new();
        let url = registry.create_object_url(vec![9], "video/mp4").detach();

        assert_eq!(registry.len(), 1);
        assert!(registry.revoke(&url));
        assert!(!registry.revoke(&url));
    }

    #[test]
    fn test_revoke_unknown_url() {
        let registry = BlobRegistry::new();
        assert!(!registry.revoke("blob:nova-studio/not-a-uuid"));
        assert!(!registry.revoke("https://example.com/video.mp4"));
    }

    #[test]
    fn test_independent_urls() {
        let registry = BlobRegistry::new();
        let mut first = registry.create_object_url(vec![1], "video/mp4");
        let second = registry.create_object_url(vec![2], "video/mp4");

        assert_ne!(first.as_str(), second.as_str());
        first.release();
        assert_eq!(&*second.blob().unwrap().bytes, &[2]);
    }
}
