use crate::errors::StoreError;
use crate::models::StoreData;
use async_trait::async_trait;
use std::{
    path::PathBuf,
    sync::atomic::{AtomicBool, Ordering},
};
use tokio::{fs, sync::Mutex};

/// Persisted key-value store holding the site list and settings.
///
/// There is no compare-and-swap: every update is a whole read-modify-write,
/// so callers that mutate time fields must be the only writer of them.
#[async_trait]
pub trait BudgetStore: Send + Sync {
    async fn load(&self) -> Result<StoreData, StoreError>;
    async fn save(&self, data: &StoreData) -> Result<(), StoreError>;
}

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl BudgetStore for JsonFileStore {
    async fn load(&self) -> Result<StoreData, StoreError> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(StoreData::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn save(&self, data: &StoreData) -> Result<(), StoreError> {
        let payload = serde_json::to_vec_pretty(data)?;
        // Readers must never observe a half-written file.
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, payload).await?;
        fs::rename(&staging, &self.path).await?;
        Ok(())
    }
}

/// In-process store. Can be disconnected to behave like a host that unloaded.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<StoreData>,
    gone: AtomicBool,
}

impl MemoryStore {
    pub fn new(data: StoreData) -> Self {
        Self {
            data: Mutex::new(data),
            gone: AtomicBool::new(false),
        }
    }

    pub fn disconnect(&self) {
        self.gone.store(true, Ordering::SeqCst);
    }

    pub fn reconnect(&self) {
        self.gone.store(false, Ordering::SeqCst);
    }

    pub async fn snapshot(&self) -> StoreData {
        self.data.lock().await.clone()
    }

    fn ensure_connected(&self) -> Result<(), StoreError> {
        if self.gone.load(Ordering::SeqCst) {
            return Err(StoreError::ContextGone);
        }
        Ok(())
    }
}

#[async_trait]
impl BudgetStore for MemoryStore {
    async fn load(&self) -> Result<StoreData, StoreError> {
        self.ensure_connected()?;
        Ok(self.data.lock().await.clone())
    }

    async fn save(&self, data: &StoreData) -> Result<(), StoreError> {
        self.ensure_connected()?;
        *self.data.lock().await = data.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrackedSite;

    fn unique_path(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let mut path = std::env::temp_dir();
        path.push(format!("site_budget_{tag}_{}_{}.json", std::process::id(), nanos));
        path
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty_store() {
        let store = JsonFileStore::new(unique_path("missing"));
        let data = store.load().await.unwrap();
        assert!(data.websites.is_empty());
        assert!(data.redirect_url.is_none());
    }

    #[tokio::test]
    async fn file_store_persists_sites() {
        let path = unique_path("persist");
        let store = JsonFileStore::new(&path);
        let mut data = StoreData::default();
        data.websites.push(TrackedSite::new("s1", "Video", "video.com", 30));
        store.save(&data).await.unwrap();

        let reread = store.load().await.unwrap();
        assert_eq!(reread, data);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn corrupt_file_is_reported_not_replaced() {
        let path = unique_path("corrupt");
        std::fs::write(&path, b"{ not json").unwrap();
        let store = JsonFileStore::new(&path);
        assert!(matches!(store.load().await, Err(StoreError::Malformed(_))));
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn disconnected_memory_store_reports_context_gone() {
        let store = MemoryStore::default();
        store.disconnect();
        assert!(matches!(store.load().await, Err(StoreError::ContextGone)));
        assert!(matches!(
            store.save(&StoreData::default()).await,
            Err(StoreError::ContextGone)
        ));
        store.reconnect();
        assert!(store.load().await.is_ok());
    }
}
