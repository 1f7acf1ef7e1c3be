//! Key-value persistence seam for the durable queue.
//!
//! The queue stores its whole record as one JSON document under a single
//! key, so a backend only needs whole-value get/set/delete. Each `set` must
//! replace the value atomically: readers see either the old or the new
//! document, never a mix.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;

use crate::error::{Error, Result};

/// Whole-value key-value storage.
pub trait KvStore: Send + Sync {
    /// Read the value under `key`. `None` if the key is absent.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Replace the value under `key`.
    fn set(&self, key: &str, value: String) -> impl Future<Output = Result<()>> + Send;

    /// Remove `key`. Removing an absent key is not an error.
    fn del(&self, key: &str) -> impl Future<Output = Result<()>> + Send;
}

impl<T: KvStore> KvStore for std::sync::Arc<T> {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: String) -> impl Future<Output = Result<()>> + Send {
        (**self).set(key, value)
    }

    fn del(&self, key: &str) -> impl Future<Output = Result<()>> + Send {
        (**self).del(key)
    }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// Process-local store. Contents are lost when the process exits.
///
/// Can be switched into an "unavailable" mode in which every operation
/// fails, or into a write-rejecting mode in which reads still succeed but
/// `set` and `del` fail (a full disk or exceeded quota).
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    unavailable: AtomicBool,
    reject_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make every subsequent `set` and `del` fail while reads keep working.
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Raw stored document under `key`, bypassing availability checks.
    pub async fn raw(&self, key: &str) -> Option<String> {
        self.entries.lock().await.get(key).cloned()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(Error::Unavailable("memory store switched off".to_string()))
        } else {
            Ok(())
        }
    }

    fn check_writable(&self) -> Result<()> {
        self.check_available()?;
        if self.reject_writes.load(Ordering::SeqCst) {
            Err(Error::Unavailable("memory store rejected the write".to_string()))
        } else {
            Ok(())
        }
    }
}

impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_available()?;
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.check_writable()?;
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.check_writable()?;
        self.entries.lock().await.remove(key);
        Ok(())
    }
}
