use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Tracks live preview URIs.
///
/// Every image record holds one [`PreviewUrl`]. The URI stays registered
/// until the handle is dropped, which happens exactly once, when the record
/// is removed or the list is reset.
#[derive(Debug, Clone, Default)]
pub struct PreviewRegistry {
    live: Arc<Mutex<HashSet<String>>>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        // a panic while holding the lock cannot leave the set half-updated
        self.live.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self, key: &str) -> PreviewUrl {
        let uri = format!("blob:picpdf/{}", key);
        self.lock().insert(uri.clone());
        PreviewUrl {
            uri,
            registry: self.clone(),
        }
    }

    pub fn is_live(&self, uri: &str) -> bool {
        self.lock().contains(uri)
    }

    pub fn live_count(&self) -> usize {
        self.lock().len()
    }
}

/// Displayable reference to an ingested image, released on drop.
#[derive(Debug)]
pub struct PreviewUrl {
    uri: String,
    registry: PreviewRegistry,
}

impl PreviewUrl {
    pub fn as_str(&self) -> &str {
        &self.uri
    }
}

impl Drop for PreviewUrl {
    fn drop(&mut self) {
        let released = self.registry.lock().remove(&self.uri);
        debug_assert!(released, "preview {} released twice", self.uri);
        log::trace!("released preview {}", self.uri);
    }
}
