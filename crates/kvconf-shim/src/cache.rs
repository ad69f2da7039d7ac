use std::time::Duration;
use tokio::{sync::Mutex, time::Instant};

#[derive(Default)]
struct CacheEntry {
    data: Option<String>,
    stored_at: Option<Instant>,
}

/// Single-slot cache for the config document.
///
/// An entry is fresh while its age is below the cache duration; stale entries are
/// never refreshed in the background. The lock is only held for slot access, so a
/// read racing a write may observe either document.
pub struct ConfigCache {
    enabled: bool,
    duration: Duration,
    slot: Mutex<CacheEntry>,
}

impl ConfigCache {
    pub fn new(enabled: bool, duration: Duration) -> Self {
        Self {
            enabled,
            duration,
            slot: Mutex::new(CacheEntry::default()),
        }
    }

    /// The cached document and its age, if still fresh.
    pub async fn fresh(&self) -> Option<(String, Duration)> {
        if !self.enabled {
            return None;
        }
        let slot = self.slot.lock().await;
        let (Some(data), Some(stored_at)) = (&slot.data, slot.stored_at) else {
            return None;
        };
        let age = stored_at.elapsed();
        (age < self.duration).then(|| (data.clone(), age))
    }

    pub async fn store(&self, data: String) {
        if !self.enabled {
            return;
        }
        let mut slot = self.slot.lock().await;
        slot.data = Some(data);
        slot.stored_at = Some(Instant::now());
    }

    pub async fn invalidate(&self) {
        *self.slot.lock().await = CacheEntry::default();
    }
}
