use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub of ledger changes, one channel per calendar date.
/// Lets a client that shows a day's grid refresh when that day changes.
#[derive(Default)]
pub struct NotifyHub {
    channels: DashMap<NaiveDate, broadcast::Sender<Event>>,
}

impl NotifyHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to changes on `date`. Creates the channel if needed.
    pub fn subscribe(&self, date: NaiveDate) -> broadcast::Receiver<Event> {
        self.channels
            .entry(date)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish an event to its date's subscribers. No-op for dateless events
    /// or when nobody is listening.
    pub fn send(&self, event: &Event) {
        let Some(date) = event.date() else { return };
        if let Some(sender) = self.channels.get(&date) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop channels with no live receivers.
    pub fn prune(&self) {
        self.channels.retain(|_, sender| sender.receiver_count() > 0);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[tokio::test]
    async fn subscriber_receives_events_for_its_date() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe(date(10));

        hub.send(&Event::ClosedDayRemoved { date: date(11) });
        let event = Event::ClosedDayRemoved { date: date(10) };
        hub.send(&event);

        assert_eq!(rx.recv().await.unwrap(), event);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        hub.send(&Event::ClosedDayRemoved { date: date(10) });
        assert_eq!(hub.channel_count(), 0);
    }

    #[test]
    fn prune_drops_abandoned_channels() {
        let hub = NotifyHub::new();
        let rx = hub.subscribe(date(10));
        let _keep = hub.subscribe(date(11));
        drop(rx);
        hub.prune();
        assert_eq!(hub.channel_count(), 1);
    }
}
