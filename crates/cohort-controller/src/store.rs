//! Seam to the durable store holding the published version and bundle.

use std::sync::{Arc, Mutex};

use crate::bundle::ClusterStateBundle;
use crate::{Error, Result};

/// Durable storage of the latest published state.
///
/// Implementations must make `(version, bundle)` durable before returning
/// from [`ClusterStateStore::store`]. The coordinator never retries.
pub trait ClusterStateStore: Send + Sync {
    /// Latest stored version, 0 when nothing was stored.
    fn latest_version(&self) -> Result<u32>;

    fn latest_bundle(&self) -> Result<Option<ClusterStateBundle>>;

    fn store(&self, version: u32, bundle: &ClusterStateBundle) -> Result<()>;
}

#[derive(Debug, Default)]
struct Stored {
    version: u32,
    bundle: Option<ClusterStateBundle>,
    fail_next_store: bool,
}

/// In-memory store for tests and single-process deployments.
///
/// Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<Mutex<Stored>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store already holding a version and bundle.
    pub fn seeded(version: u32, bundle: Option<ClusterStateBundle>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Stored {
                version,
                bundle,
                fail_next_store: false,
            })),
        }
    }

    /// Makes the next [`ClusterStateStore::store`] call fail.
    pub fn fail_next_store(&self) -> Result<()> {
        self.lock()?.fail_next_store = true;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Stored>> {
        self.inner
            .lock()
            .map_err(|_| Error::Store("memory store lock poisoned".to_string()))
    }
}

impl ClusterStateStore for MemoryStateStore {
    fn latest_version(&self) -> Result<u32> {
        Ok(self.lock()?.version)
    }

    fn latest_bundle(&self) -> Result<Option<ClusterStateBundle>> {
        Ok(self.lock()?.bundle.clone())
    }

    fn store(&self, version: u32, bundle: &ClusterStateBundle) -> Result<()> {
        let mut stored = self.lock()?;
        if stored.fail_next_store {
            stored.fail_next_store = false;
            return Err(Error::Store(format!("injected failure storing version {version}")));
        }
        stored.version = version;
        stored.bundle = Some(bundle.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_storage() {
        let store = MemoryStateStore::new();
        let other = store.clone();
        assert_eq!(store.latest_version().unwrap(), 0);
        assert!(store.latest_bundle().unwrap().is_none());

        other.store(4, &ClusterStateBundle::empty()).unwrap();
        assert_eq!(store.latest_version().unwrap(), 4);
        assert!(store.latest_bundle().unwrap().is_some());
    }

    #[test]
    fn injected_failure_is_one_shot() {
        let store = MemoryStateStore::seeded(2, None);
        store.fail_next_store().unwrap();
        assert!(matches!(
            store.store(3, &ClusterStateBundle::empty()),
            Err(Error::Store(_))
        ));
        assert_eq!(store.latest_version().unwrap(), 2);
        store.store(3, &ClusterStateBundle::empty()).unwrap();
        assert_eq!(store.latest_version().unwrap(), 3);
    }
}
