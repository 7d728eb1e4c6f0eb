use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{info, warn};
use ulid::Ulid;

use crate::model::{Booking, Event};

const CHANNEL_CAPACITY: usize = 256;

/// Per-resource broadcast of committed events, for calendar refresh.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to events for a resource. Creates the channel if needed.
    pub fn subscribe(&self, resource_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(resource_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// No-op if nobody is listening.
    pub fn send(&self, resource_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&resource_id) {
            let _ = sender.send(event.clone());
        }
    }
}

/// Outbound customer/staff notification (email, SMS, ...).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn booking_changed(&self, booking: &Booking) -> io::Result<()>;
}

/// JSON body handed to outbound channels.
pub fn notification_payload(booking: &Booking) -> io::Result<String> {
    serde_json::to_string(booking).map_err(io::Error::other)
}

/// Default sender: writes the notification to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn booking_changed(&self, booking: &Booking) -> io::Result<()> {
        let payload = notification_payload(booking)?;
        info!(
            booking = %booking.id,
            status = %booking.status,
            payload = %payload,
            "booking notification"
        );
        Ok(())
    }
}

/// Fire-and-forget delivery. Failures are logged and counted, never returned.
pub fn dispatch(notifier: Arc<dyn Notifier>, booking: Booking) {
    tokio::spawn(async move {
        if let Err(e) = notifier.booking_changed(&booking).await {
            warn!("notification for booking {} ({}) failed: {e}", booking.id, booking.status);
            metrics::counter!(crate::observability::NOTIFY_FAILURES_TOTAL).increment(1);
        }
    });
}
