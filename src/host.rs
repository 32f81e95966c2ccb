use crate::errors::DeliveryError;
use crate::models::{PageMessage, TabId, TabInfo};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Browser-side operations the tracker relies on.
#[async_trait]
pub trait Host: Send + Sync {
    /// Delivers a message to the page document loaded in `tab`.
    async fn send_to_tab(&self, tab: TabId, message: PageMessage) -> Result<(), DeliveryError>;

    /// Navigates `tab` directly, without involving its page.
    async fn navigate_tab(&self, tab: TabId, url: &str) -> Result<(), DeliveryError>;

    async fn get_tab(&self, tab: TabId) -> Result<TabInfo, DeliveryError>;

    /// Foreground tab of the foreground window, if any.
    async fn active_tab(&self) -> Result<Option<TabInfo>, DeliveryError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostCommand {
    Navigate { tab: TabId, url: String },
}

#[derive(Default)]
struct BridgeState {
    tabs: HashMap<TabId, TabInfo>,
    /// Present only while a page document is connected in that tab.
    outboxes: HashMap<TabId, Vec<PageMessage>>,
    commands: Vec<HostCommand>,
}

/// [`Host`] backed by a browser shim that pushes tab events over HTTP and
/// polls for page messages and navigation commands.
#[derive(Default)]
pub struct HostBridge {
    state: Mutex<BridgeState>,
}

impl HostBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn tab_activated(&self, tab: TabId, url: Option<String>) {
        let mut state = self.state.lock().await;
        for info in state.tabs.values_mut() {
            info.active = false;
        }
        let info = state.tabs.entry(tab).or_insert_with(|| TabInfo {
            id: tab,
            url: None,
            active: false,
        });
        info.active = true;
        if url.is_some() {
            info.url = url;
        }
    }

    pub async fn tab_updated(&self, tab: TabId, url: Option<String>) {
        let mut state = self.state.lock().await;
        let info = state.tabs.entry(tab).or_insert_with(|| TabInfo {
            id: tab,
            url: None,
            active: false,
        });
        if url.is_some() {
            info.url = url;
        }
    }

    pub async fn tab_removed(&self, tab: TabId) {
        let mut state = self.state.lock().await;
        state.tabs.remove(&tab);
        state.outboxes.remove(&tab);
    }

    pub async fn connect_page(&self, tab: TabId) {
        self.state.lock().await.outboxes.entry(tab).or_default();
    }

    pub async fn disconnect_page(&self, tab: TabId) {
        self.state.lock().await.outboxes.remove(&tab);
    }

    /// Drains queued messages for the page in `tab`. `None` when no page is connected.
    pub async fn take_page_messages(&self, tab: TabId) -> Option<Vec<PageMessage>> {
        let mut state = self.state.lock().await;
        state.outboxes.get_mut(&tab).map(std::mem::take)
    }

    pub async fn take_commands(&self) -> Vec<HostCommand> {
        std::mem::take(&mut self.state.lock().await.commands)
    }
}

#[async_trait]
impl Host for HostBridge {
    async fn send_to_tab(&self, tab: TabId, message: PageMessage) -> Result<(), DeliveryError> {
        let mut state = self.state.lock().await;
        let outbox = state
            .outboxes
            .get_mut(&tab)
            .ok_or(DeliveryError::PageUnreachable(tab))?;
        outbox.push(message);
        Ok(())
    }

    async fn navigate_tab(&self, tab: TabId, url: &str) -> Result<(), DeliveryError> {
        let mut state = self.state.lock().await;
        if !state.tabs.contains_key(&tab) {
            return Err(DeliveryError::NoSuchTab(tab));
        }
        // The page that was loaded is about to go away.
        state.outboxes.remove(&tab);
        state.commands.push(HostCommand::Navigate {
            tab,
            url: url.to_string(),
        });
        Ok(())
    }

    async fn get_tab(&self, tab: TabId) -> Result<TabInfo, DeliveryError> {
        let state = self.state.lock().await;
        state
            .tabs
            .get(&tab)
            .cloned()
            .ok_or(DeliveryError::NoSuchTab(tab))
    }

    async fn active_tab(&self) -> Result<Option<TabInfo>, DeliveryError> {
        let state = self.state.lock().await;
        Ok(state.tabs.values().find(|info| info.active).cloned())
    }
}
