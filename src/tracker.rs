//! Tab-to-site tracking and the global budget clock.

use crate::config::TickPolicy;
use crate::date::{date_key, local_now};
use crate::errors::{DeliveryError, StoreError};
use crate::host::Host;
use crate::matching::find_matching_site;
use crate::models::{PageMessage, SiteId, StoreData, TabId, TrackerMessage, TrackingRecord};
use crate::storage::BudgetStore;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockState {
    Stopped,
    Running,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerSnapshot {
    pub clock: ClockState,
    pub policy: TickPolicy,
    pub active_tab: Option<TabId>,
    pub records: BTreeMap<TabId, TrackingRecord>,
}

pub struct Tracker {
    store: Arc<dyn BudgetStore>,
    host: Arc<dyn Host>,
    policy: TickPolicy,
    records: BTreeMap<TabId, TrackingRecord>,
    /// Tabs that already got a reminder for the site they are currently on.
    seen: HashSet<TabId>,
    active_tab: Option<TabId>,
    clock: ClockState,
}

impl Tracker {
    pub fn new(store: Arc<dyn BudgetStore>, host: Arc<dyn Host>, policy: TickPolicy) -> Self {
        Self {
            store,
            host,
            policy,
            records: BTreeMap::new(),
            seen: HashSet::new(),
            active_tab: None,
            clock: ClockState::Stopped,
        }
    }

    pub fn clock(&self) -> ClockState {
        self.clock
    }

    pub fn active_tab(&self) -> Option<TabId> {
        self.active_tab
    }

    pub fn record(&self, tab: TabId) -> Option<&TrackingRecord> {
        self.records.get(&tab)
    }

    pub fn tracked_tabs(&self) -> usize {
        self.records.len()
    }

    pub fn reminder_seen(&self, tab: TabId) -> bool {
        self.seen.contains(&tab)
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            clock: self.clock,
            policy: self.policy,
            active_tab: self.active_tab,
            records: self.records.clone(),
        }
    }

    /// Install/startup hook. Defaults are only written on install.
    pub async fn startup(&mut self, installed: bool) {
        if installed {
            self.initialize_defaults().await;
        }
        self.initialize_active_tab().await;
        self.reset_daily_totals().await;
    }

    async fn initialize_defaults(&self) {
        let mut data = match self.store.load().await {
            Ok(data) => data,
            Err(err) => {
                warn!("skipping default settings: {err}");
                return;
            }
        };
        if !data.apply_defaults() {
            return;
        }
        match self.store.save(&data).await {
            Ok(()) => info!("initialized default settings"),
            Err(err) => warn!("failed to write default settings: {err}"),
        }
    }

    async fn initialize_active_tab(&mut self) {
        match self.host.active_tab().await {
            Ok(Some(tab)) => {
                info!(tab = tab.id, "initialized active tab");
                self.active_tab = Some(tab.id);
            }
            Ok(None) => debug!("host reports no active tab"),
            Err(err) => error!("failed to query active tab: {err}"),
        }
    }

    pub async fn reset_daily_totals(&self) {
        self.reset_daily_totals_at(local_now()).await;
    }

    /// Zeroes the daily counter of every site whose last reset is not today,
    /// tracked or not.
    pub async fn reset_daily_totals_at(&self, now: NaiveDateTime) {
        let key = date_key(now);
        let mut data = match self.store.load().await {
            Ok(data) => data,
            Err(err) => {
                warn!("skipping daily reset: {err}");
                return;
            }
        };

        let mut changed = false;
        for site in &mut data.websites {
            let previous = site.last_reset_date.clone();
            if site.reset_daily_if_stale(&key) {
                info!(
                    site = %site.name,
                    previous = previous.as_deref().unwrap_or("none"),
                    date = %key,
                    "reset daily total"
                );
                changed = true;
            }
        }

        if !changed {
            debug!(date = %key, "daily totals already current");
            return;
        }
        if let Err(err) = self.store.save(&data).await {
            warn!("failed to persist daily reset: {err}");
        }
    }

    pub async fn handle_message(&mut self, sender: Option<TabId>, message: TrackerMessage) {
        match message {
            TrackerMessage::StartTracking { site_id, url } => match sender {
                Some(tab) => self.request_start(site_id, tab, url).await,
                None => warn!(site = %site_id, "START_TRACKING without a sender tab"),
            },
            TrackerMessage::UpdateTimer {
                site_id,
                remaining_time,
            } => self.manual_adjust(site_id, remaining_time).await,
            TrackerMessage::RedirectFromReminder => match sender {
                Some(tab) => self.reminder_redirect(tab).await,
                None => warn!("REDIRECT_FROM_REMINDER without a sender tab"),
            },
        }
    }

    /// Starts charging `site_id` to `tab`, unless the site has no budget left,
    /// in which case the tab is redirected and no record is created.
    pub async fn request_start(&mut self, site_id: SiteId, tab: TabId, url: String) {
        if self.active_tab.is_none() {
            match self.host.get_tab(tab).await {
                Ok(info) if info.active => {
                    info!(tab, "adopting tab as active");
                    self.active_tab = Some(tab);
                }
                Ok(_) => {}
                Err(err) => warn!(tab, "failed to query tab: {err}"),
            }
        }

        match self.store.load().await {
            Ok(data) => {
                if let Some(site) = data.site(&site_id) {
                    if site.is_exhausted() {
                        info!(tab, site = %site.name, "budget exhausted, redirecting");
                        let target = data.redirect_target().to_string();
                        self.redirect(tab, &target).await;
                        return;
                    }
                }
            }
            Err(StoreError::ContextGone) => {
                warn!(tab, "store context gone, not tracking");
                return;
            }
            Err(err) => error!(tab, "failed to check remaining time: {err}"),
        }

        if let Some(previous) = self.records.get(&tab) {
            if previous.site_id != site_id {
                info!(tab, previous = %previous.site_id, next = %site_id, "tab switched sites");
                self.stop(tab);
            }
        }

        info!(tab, site = %site_id, "tracking started");
        self.records.insert(tab, TrackingRecord { site_id, url });
        self.ensure_clock();
    }

    fn ensure_clock(&mut self) {
        if self.clock == ClockState::Stopped {
            self.clock = ClockState::Running;
            info!("global clock started");
        }
    }

    pub fn stop(&mut self, tab: TabId) {
        if let Some(record) = self.records.remove(&tab) {
            info!(tab, site = %record.site_id, "tracking stopped");
        }
        if self.records.is_empty() && self.clock == ClockState::Running {
            self.clock = ClockState::Stopped;
            info!("global clock stopped");
        }
    }

    pub async fn tick(&mut self) {
        self.tick_at(local_now()).await;
    }

    pub async fn tick_at(&mut self, now: NaiveDateTime) {
        if self.clock == ClockState::Stopped {
            return;
        }
        match self.policy {
            TickPolicy::ActiveTab => {
                let Some(tab) = self.active_tab else {
                    debug!("no active tab, skipping tick");
                    return;
                };
                if !self.records.contains_key(&tab) {
                    debug!(tab, "active tab is not tracked");
                    return;
                }
                self.charge(tab, now).await;
            }
            TickPolicy::PerTab => {
                let tabs: Vec<TabId> = self.records.keys().copied().collect();
                for tab in tabs {
                    self.charge(tab, now).await;
                }
            }
        }
    }

    async fn charge(&mut self, tab: TabId, now: NaiveDateTime) {
        let Some(record) = self.records.get(&tab) else {
            return;
        };
        let site_id = record.site_id.clone();

        let mut data = match self.store.load().await {
            Ok(data) => data,
            Err(StoreError::ContextGone) => {
                warn!(tab, "store context gone, skipping tick");
                return;
            }
            Err(err) => {
                error!(tab, "failed to read store: {err}");
                self.stop(tab);
                return;
            }
        };
        let redirect_url = data.redirect_target().to_string();
        let key = date_key(now);

        let Some(site) = data.site_mut(&site_id) else {
            warn!(tab, site = %site_id, "tracked site no longer exists");
            self.stop(tab);
            return;
        };
        if site.is_exhausted() {
            info!(tab, site = %site.name, "budget already exhausted");
            self.redirect(tab, &redirect_url).await;
            return;
        }
        if site.reset_daily_if_stale(&key) {
            info!(site = %site.name, date = %key, "reset daily total");
        }
        site.charge_second();
        let remaining = site.remaining_time;

        if let Err(err) = self.store.save(&data).await {
            match err {
                StoreError::ContextGone => warn!(tab, "store context gone, charge dropped"),
                other => {
                    error!(tab, "failed to persist charge: {other}");
                    self.stop(tab);
                }
            }
            return;
        }

        let update = PageMessage::UpdateCountdown {
            site_id: site_id.clone(),
            remaining_time: remaining,
        };
        if let Err(err) = self.host.send_to_tab(tab, update).await {
            warn!(tab, "countdown undeliverable, stopping: {err}");
            self.stop(tab);
            return;
        }

        if remaining <= 0 {
            info!(tab, site = %site_id, "budget used up");
            self.redirect(tab, &redirect_url).await;
        }
    }

    /// Sends the page away: via the page first, then by navigating the tab
    /// directly. The tab stops being tracked whatever the outcome.
    pub async fn redirect(&mut self, tab: TabId, url: &str) {
        let message = PageMessage::Redirect {
            url: url.to_string(),
        };
        match self.host.send_to_tab(tab, message).await {
            Ok(()) => info!(tab, url, "redirect sent to page"),
            Err(err) => {
                warn!(tab, "redirect undeliverable ({err}), navigating directly");
                match self.host.navigate_tab(tab, url).await {
                    Ok(()) => info!(tab, url, "navigated tab directly"),
                    Err(err) => error!(tab, "every redirect path failed: {err}"),
                }
            }
        }
        self.stop(tab);
    }

    /// Sets a site's remaining budget from outside. Tabs tracking the site keep
    /// their record even at zero; the next tick enforces the redirect.
    pub async fn manual_adjust(&mut self, site_id: SiteId, remaining_time: i64) {
        let remaining = remaining_time.max(0);
        let mut data = match self.store.load().await {
            Ok(data) => data,
            Err(err) => {
                warn!(site = %site_id, "skipping manual adjust: {err}");
                return;
            }
        };
        let Some(site) = data.site_mut(&site_id) else {
            warn!(site = %site_id, "manual adjust for unknown site");
            return;
        };
        site.remaining_time = remaining;
        if let Err(err) = self.store.save(&data).await {
            warn!(site = %site_id, "failed to persist manual adjust: {err}");
            return;
        }
        info!(site = %site_id, remaining, "remaining time adjusted");

        let tabs: Vec<TabId> = self
            .records
            .iter()
            .filter(|(_, record)| record.site_id == site_id)
            .map(|(tab, _)| *tab)
            .collect();
        for tab in tabs {
            let update = PageMessage::UpdateCountdown {
                site_id: site_id.clone(),
                remaining_time: remaining,
            };
            if let Err(err) = self.host.send_to_tab(tab, update).await {
                warn!(tab, "failed to refresh countdown: {err}");
            }
        }
    }

    /// Re-evaluates `tab` after it finished loading or became active.
    pub async fn on_navigation_match(&mut self, tab: TabId, url: &str) {
        let data = match self.store.load().await {
            Ok(data) => data,
            Err(err) => {
                warn!(tab, "skipping url check: {err}");
                return;
            }
        };

        let Some(site) = find_matching_site(&data.websites, url) else {
            debug!(tab, url, "no tracked site matches");
            self.seen.remove(&tab);
            if self.records.contains_key(&tab) {
                self.stop(tab);
            }
            return;
        };

        if !self.seen.contains(&tab) {
            let reminder = PageMessage::ShowReminder {
                message: data.reminder_text().to_string(),
                site_name: site.name.clone(),
            };
            match self.host.send_to_tab(tab, reminder).await {
                Ok(()) => info!(tab, site = %site.name, "reminder sent"),
                Err(err) => warn!(tab, "reminder undeliverable: {err}"),
            }
        }
        self.seen.insert(tab);

        let already_tracking = self
            .records
            .get(&tab)
            .is_some_and(|record| record.site_id == site.id);
        if !already_tracking {
            self.request_start(site.id.clone(), tab, url.to_string()).await;
        }
    }

    pub async fn on_tab_activated(&mut self, tab: TabId, url: Option<String>) {
        self.active_tab = Some(tab);

        let url = match url {
            Some(url) => url,
            None => match self.host.get_tab(tab).await {
                Ok(info) => match info.url {
                    Some(url) => url,
                    None => return,
                },
                Err(DeliveryError::NoSuchTab(_)) => {
                    info!(tab, "activated tab already closed");
                    return;
                }
                Err(err) => {
                    error!(tab, "failed to inspect activated tab: {err}");
                    return;
                }
            },
        };
        self.on_navigation_match(tab, &url).await;
    }

    pub async fn on_tab_updated(&mut self, tab: TabId, complete: bool, url: Option<String>) {
        if let (true, Some(url)) = (complete, url) {
            self.on_navigation_match(tab, &url).await;
        }
    }

    pub fn on_tab_closed(&mut self, tab: TabId) {
        self.stop(tab);
        self.seen.remove(&tab);
    }

    /// The user chose to go back to work from the reminder.
    pub async fn reminder_redirect(&mut self, tab: TabId) {
        let data: StoreData = match self.store.load().await {
            Ok(data) => data,
            Err(err) => {
                warn!(tab, "skipping reminder redirect: {err}");
                return;
            }
        };
        let target = data.redirect_target().to_string();
        self.stop(tab);
        match self.host.navigate_tab(tab, &target).await {
            Ok(()) => info!(tab, url = %target, "left site from reminder"),
            Err(err) => error!(tab, "reminder redirect failed: {err}"),
        }
    }
}
