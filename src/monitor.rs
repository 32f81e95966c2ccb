//! Per-document page monitor.

use crate::errors::{DeliveryError, StoreError};
use crate::matching::find_matching_site;
use crate::models::{PageMessage, SiteId, TabId, TrackerMessage};
use crate::service::TrackerHandle;
use crate::storage::BudgetStore;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

pub const REMINDER_TIMEOUT: Duration = Duration::from_secs(10);
pub const WARNING_THRESHOLD_SECS: i64 = 300;
pub const CRITICAL_THRESHOLD_SECS: i64 = 60;

/// Channel from a page back to the tracker.
#[async_trait]
pub trait TrackerLink: Send + Sync {
    async fn send(&self, message: TrackerMessage) -> Result<(), DeliveryError>;
}

/// [`TrackerLink`] into an in-process tracker service, tagged with the page's tab.
pub struct ChannelLink {
    tab: TabId,
    handle: TrackerHandle,
}

impl ChannelLink {
    pub fn new(tab: TabId, handle: TrackerHandle) -> Self {
        Self { tab, handle }
    }
}

#[async_trait]
impl TrackerLink for ChannelLink {
    async fn send(&self, message: TrackerMessage) -> Result<(), DeliveryError> {
        self.handle
            .message(Some(self.tab), message)
            .await
            .map_err(|_| DeliveryError::ContextGone)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CountdownBand {
    Normal,
    Warning,
    Critical,
}

impl CountdownBand {
    pub fn for_remaining(seconds: i64) -> Self {
        if seconds <= CRITICAL_THRESHOLD_SECS {
            CountdownBand::Critical
        } else if seconds <= WARNING_THRESHOLD_SECS {
            CountdownBand::Warning
        } else {
            CountdownBand::Normal
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountdownOverlay {
    pub text: String,
    pub band: CountdownBand,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderOverlay {
    pub message: String,
    pub site_name: String,
    pub deadline: Instant,
}

/// `HH:MM:SS`; hours are not capped at 24.
pub fn format_hms(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

pub struct PageMonitor {
    store: Arc<dyn BudgetStore>,
    link: Arc<dyn TrackerLink>,
    last_address: Option<String>,
    current_site: Option<SiteId>,
    countdown: Option<CountdownOverlay>,
    reminder: Option<ReminderOverlay>,
    disconnected: bool,
}

impl PageMonitor {
    pub fn new(store: Arc<dyn BudgetStore>, link: Arc<dyn TrackerLink>) -> Self {
        Self {
            store,
            link,
            last_address: None,
            current_site: None,
            countdown: None,
            reminder: None,
            disconnected: false,
        }
    }

    pub fn countdown(&self) -> Option<&CountdownOverlay> {
        self.countdown.as_ref()
    }

    pub fn reminder(&self) -> Option<&ReminderOverlay> {
        self.reminder.as_ref()
    }

    pub fn current_site(&self) -> Option<&SiteId> {
        self.current_site.as_ref()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    /// Initial page load.
    pub async fn load(&mut self, address: &str) {
        self.last_address = Some(address.to_string());
        self.check_current_url(address).await;
    }

    /// In-page address change, e.g. from a single-page app. Only a real change
    /// re-runs the check.
    pub async fn on_address_changed(&mut self, address: &str) {
        if self.last_address.as_deref() == Some(address) {
            return;
        }
        self.last_address = Some(address.to_string());
        self.check_current_url(address).await;
    }

    pub async fn check_current_url(&mut self, address: &str) {
        if self.disconnected {
            self.clear_overlays();
            return;
        }

        let data = match self.store.load().await {
            Ok(data) => data,
            Err(StoreError::ContextGone) => {
                warn!("tracker context gone, page monitor going quiet");
                self.disconnect();
                return;
            }
            Err(err) => {
                error!("failed to check address: {err}");
                return;
            }
        };

        let Some(site) = find_matching_site(&data.websites, address) else {
            debug!(address, "page is not a tracked site");
            self.current_site = None;
            self.clear_overlays();
            return;
        };

        self.current_site = Some(site.id.clone());
        let request = TrackerMessage::StartTracking {
            site_id: site.id.clone(),
            url: address.to_string(),
        };
        if let Err(err) = self.link.send(request).await {
            warn!("failed to request tracking: {err}");
            self.disconnect();
            return;
        }
        self.update_countdown(site.remaining_time);
    }

    /// Applies a message from the tracker. Returns the address to navigate to
    /// when the tracker asks for a redirect.
    pub fn handle_message(&mut self, message: PageMessage, now: Instant) -> Option<String> {
        if self.disconnected {
            return None;
        }
        match message {
            PageMessage::UpdateCountdown {
                site_id,
                remaining_time,
            } => {
                if self.current_site.as_ref() == Some(&site_id) {
                    self.update_countdown(remaining_time);
                }
                None
            }
            PageMessage::ShowReminder { message, site_name } => {
                self.reminder = Some(ReminderOverlay {
                    message,
                    site_name,
                    deadline: now + REMINDER_TIMEOUT,
                });
                None
            }
            PageMessage::Redirect { url } => Some(url),
        }
    }

    pub fn acknowledge_reminder(&mut self) {
        self.reminder = None;
    }

    /// "Back to work": the tracker performs the redirect.
    pub async fn return_to_task(&mut self) {
        self.reminder = None;
        if self.disconnected {
            return;
        }
        if let Err(err) = self.link.send(TrackerMessage::RedirectFromReminder).await {
            warn!("failed to request redirect: {err}");
            self.disconnect();
        }
    }

    /// Dismisses the reminder once its timeout has passed.
    pub fn expire_reminder(&mut self, now: Instant) {
        if self
            .reminder
            .as_ref()
            .is_some_and(|reminder| now >= reminder.deadline)
        {
            self.reminder = None;
        }
    }

    fn update_countdown(&mut self, remaining: i64) {
        self.countdown = Some(CountdownOverlay {
            text: format_hms(remaining),
            band: CountdownBand::for_remaining(remaining),
        });
    }

    fn clear_overlays(&mut self) {
        self.countdown = None;
        self.reminder = None;
    }

    fn disconnect(&mut self) {
        self.disconnected = true;
        self.clear_overlays();
    }
}
