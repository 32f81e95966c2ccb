use crate::host::HostBridge;
use crate::service::TrackerHandle;
use crate::storage::BudgetStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub tracker: TrackerHandle,
    pub host: Arc<HostBridge>,
    pub store: Arc<dyn BudgetStore>,
}

impl AppState {
    pub fn new(tracker: TrackerHandle, host: Arc<HostBridge>, store: Arc<dyn BudgetStore>) -> Self {
        Self {
            tracker,
            host,
            store,
        }
    }
}
