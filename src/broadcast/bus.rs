use super::events::SongEvent;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::debug;

/// In-process fan-out of song metadata changes.
///
/// Cloning shares the channel. Publishing never blocks; a subscriber that falls more than
/// `capacity` events behind loses the oldest ones and is told how many it missed.
#[derive(Clone)]
pub struct MetadataBroadcast {
    tx: broadcast::Sender<SongEvent>,
    capacity: usize,
}

impl MetadataBroadcast {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Delivers the event to current subscribers and returns how many received it.
    /// Having no subscribers is not an error.
    pub fn publish(&self, event: SongEvent) -> usize {
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                debug!("No subscribers for event on song {}", event.song_id());
                0
            }
        }
    }

    pub fn subscribe(&self) -> MetadataSubscription {
        MetadataSubscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Poll {
    Event(SongEvent),
    Empty,
    /// Events were dropped; the holder should reload from the store.
    Lagged(u64),
    Closed,
}

/// Receiving end held by an open view. Dropping it unsubscribes.
pub struct MetadataSubscription {
    rx: broadcast::Receiver<SongEvent>,
}

impl MetadataSubscription {
    pub fn poll(&mut self) -> Poll {
        match self.rx.try_recv() {
            Ok(event) => Poll::Event(event),
            Err(TryRecvError::Empty) => Poll::Empty,
            Err(TryRecvError::Lagged(missed)) => Poll::Lagged(missed),
            Err(TryRecvError::Closed) => Poll::Closed,
        }
    }

    /// Waits for the next event. Returns `Poll::Lagged` or `Poll::Closed` instead of an event
    /// when the channel reports either.
    pub async fn next(&mut self) -> Poll {
        match self.rx.recv().await {
            Ok(event) => Poll::Event(event),
            Err(broadcast::error::RecvError::Lagged(missed)) => Poll::Lagged(missed),
            Err(broadcast::error::RecvError::Closed) => Poll::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SongFields;

    fn bpm_event(song_id: &str, bpm: i32) -> SongEvent {
        SongEvent::fields_changed(
            song_id,
            SongFields {
                bpm: Some(bpm),
                ..Default::default()
            },
        )
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = MetadataBroadcast::new(8);
        assert_eq!(bus.publish(bpm_event("s1", 100)), 0);
    }

    #[test]
    fn every_subscriber_sees_the_event() {
        let bus = MetadataBroadcast::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.publish(bpm_event("s1", 100)), 2);
        assert!(matches!(first.poll(), Poll::Event(e) if e.song_id() == "s1"));
        assert!(matches!(second.poll(), Poll::Event(e) if e.song_id() == "s1"));
        assert_eq!(first.poll(), Poll::Empty);
    }

    #[test]
    fn dropped_subscription_unsubscribes() {
        let bus = MetadataBroadcast::new(8);
        let subscription = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(subscription);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn slow_subscriber_is_told_it_lagged() {
        let bus = MetadataBroadcast::new(2);
        let mut subscription = bus.subscribe();
        for bpm in 100..105 {
            bus.publish(bpm_event("s1", bpm));
        }
        assert_eq!(subscription.poll(), Poll::Lagged(3));
        assert!(matches!(subscription.poll(), Poll::Event(_)));
    }

    #[tokio::test]
    async fn next_waits_for_publish() {
        let bus = MetadataBroadcast::new(4);
        let mut subscription = bus.subscribe();
        let publisher = bus.clone();
        tokio::spawn(async move {
            publisher.publish(SongEvent::deleted("s9"));
        });
        match subscription.next().await {
            Poll::Event(event) => assert_eq!(event.song_id(), "s9"),
            other => panic!("unexpected poll result {:?}", other),
        }
    }
}
