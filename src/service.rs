use crate::models::{TabId, TrackerMessage};
use crate::tracker::{ClockState, Tracker, TrackerSnapshot};
use std::time::Duration;
use thiserror::Error;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info};

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Everything that can reach the tracker from outside.
#[derive(Debug)]
pub enum TrackerEvent {
    Startup { installed: bool },
    Message { sender: Option<TabId>, message: TrackerMessage },
    TabActivated { tab: TabId, url: Option<String> },
    TabUpdated { tab: TabId, complete: bool, url: Option<String> },
    TabRemoved { tab: TabId },
    Snapshot(oneshot::Sender<TrackerSnapshot>),
}

#[derive(Debug, Error)]
#[error("tracker service has shut down")]
pub struct ServiceClosed;

/// Cloneable entry point to a running tracker service.
#[derive(Clone)]
pub struct TrackerHandle {
    events: mpsc::Sender<TrackerEvent>,
}

impl TrackerHandle {
    pub async fn send(&self, event: TrackerEvent) -> Result<(), ServiceClosed> {
        self.events.send(event).await.map_err(|_| ServiceClosed)
    }

    pub async fn message(
        &self,
        sender: Option<TabId>,
        message: TrackerMessage,
    ) -> Result<(), ServiceClosed> {
        self.send(TrackerEvent::Message { sender, message }).await
    }

    pub async fn snapshot(&self) -> Result<TrackerSnapshot, ServiceClosed> {
        let (reply, response) = oneshot::channel();
        self.send(TrackerEvent::Snapshot(reply)).await?;
        response.await.map_err(|_| ServiceClosed)
    }
}

/// Moves `tracker` onto its own task. The task ends once every handle is dropped.
pub fn spawn(tracker: Tracker) -> (TrackerHandle, JoinHandle<()>) {
    let (events, receiver) = mpsc::channel(256);
    let task = tokio::spawn(run(tracker, receiver));
    (TrackerHandle { events }, task)
}

async fn run(mut tracker: Tracker, mut events: mpsc::Receiver<TrackerEvent>) {
    let mut clock = time::interval(TICK_INTERVAL);
    clock.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let running = tracker.clock() == ClockState::Running;
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                dispatch(&mut tracker, event).await;
                if !running && tracker.clock() == ClockState::Running {
                    // First charge lands one full period after tracking starts.
                    clock.reset();
                }
            }
            _ = clock.tick(), if running => {
                tracker.tick().await;
            }
        }
    }

    info!("tracker service stopped");
}

async fn dispatch(tracker: &mut Tracker, event: TrackerEvent) {
    debug!(?event, "tracker event");
    match event {
        TrackerEvent::Startup { installed } => tracker.startup(installed).await,
        TrackerEvent::Message { sender, message } => tracker.handle_message(sender, message).await,
        TrackerEvent::TabActivated { tab, url } => tracker.on_tab_activated(tab, url).await,
        TrackerEvent::TabUpdated { tab, complete, url } => {
            tracker.on_tab_updated(tab, complete, url).await
        }
        TrackerEvent::TabRemoved { tab } => tracker.on_tab_closed(tab),
        TrackerEvent::Snapshot(reply) => {
            let _ = reply.send(tracker.snapshot());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TickPolicy;
    use crate::host::HostBridge;
    use crate::models::{PageMessage, SiteId, StoreData, TrackedSite};
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    async fn start(remaining: i64) -> (TrackerHandle, Arc<MemoryStore>, Arc<HostBridge>) {
        let store = Arc::new(MemoryStore::new(StoreData {
            websites: vec![TrackedSite::new("s1", "Example", "example.com", remaining)],
            ..StoreData::default()
        }));
        let host = Arc::new(HostBridge::new());
        host.connect_page(1).await;
        let tracker = Tracker::new(store.clone(), host.clone(), TickPolicy::ActiveTab);
        let (handle, _task) = spawn(tracker);
        (handle, store, host)
    }

    #[tokio::test(start_paused = true)]
    async fn clock_charges_once_per_second_until_redirect() {
        let (handle, store, host) = start(3).await;
        handle
            .send(TrackerEvent::TabActivated {
                tab: 1,
                url: Some("https://example.com".into()),
            })
            .await
            .unwrap();

        time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(store.snapshot().await.websites[0].remaining_time, 2);

        time::sleep(Duration::from_secs(3)).await;
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.clock, ClockState::Stopped);
        assert!(snapshot.records.is_empty());
        assert_eq!(store.snapshot().await.websites[0].remaining_time, 0);

        let messages = host.take_page_messages(1).await.unwrap();
        let countdowns: Vec<i64> = messages
            .iter()
            .filter_map(|message| match message {
                PageMessage::UpdateCountdown { remaining_time, .. } => Some(*remaining_time),
                _ => None,
            })
            .collect();
        assert_eq!(countdowns, [2, 1, 0]);
        assert!(matches!(messages.last(), Some(PageMessage::Redirect { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_tracker_does_not_charge() {
        let (handle, store, _host) = start(10).await;
        handle
            .message(
                None,
                TrackerMessage::UpdateTimer {
                    site_id: SiteId::from("s1"),
                    remaining_time: 8,
                },
            )
            .await
            .unwrap();

        time::sleep(Duration::from_secs(5)).await;
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.clock, ClockState::Stopped);
        assert_eq!(store.snapshot().await.websites[0].remaining_time, 8);
    }

    #[tokio::test]
    async fn handle_reports_closed_service() {
        let (handle, task) = {
            let store = Arc::new(MemoryStore::default());
            let host = Arc::new(HostBridge::new());
            spawn(Tracker::new(store, host, TickPolicy::ActiveTab))
        };
        task.abort();
        let _ = task.await;
        assert!(handle.snapshot().await.is_err());
    }
}
