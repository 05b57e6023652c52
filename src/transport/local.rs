//! # In-Process Broker
//!
//! A broker living inside the process. Queues deliver each frame to one
//! subscriber (round robin) and hold frames while nobody listens; topics
//! fan out to the current subscribers and drop frames nobody hears.
//! Per-destination FIFO order is preserved.
//!
//! Faults can be injected for testing: the next N connects, publishes or
//! subscribes fail, or every open session is dropped at once.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use super::broker::{Broker, BrokerSession, Frame, Subscription};
use super::errors::{TransportError, TransportResult};
use crate::channels::{is_topic, Channel};

#[derive(Debug)]
struct Subscriber {
    id: u64,
    session: u64,
    sender: mpsc::UnboundedSender<Frame>,
}

#[derive(Debug, Default)]
struct Destination {
    subscribers: Vec<Subscriber>,
    backlog: VecDeque<Frame>,
    next: usize,
}

impl Destination {
    fn deliver_queue(&mut self, mut frame: Frame) {
        while !self.subscribers.is_empty() {
            let index = self.next % self.subscribers.len();
            match self.subscribers[index].sender.send(frame) {
                Ok(()) => {
                    self.next = index + 1;
                    return;
                }
                Err(mpsc::error::SendError(returned)) => {
                    self.subscribers.remove(index);
                    frame = returned;
                }
            }
        }
        self.backlog.push_back(frame);
    }

    fn deliver_topic(&mut self, frame: &Frame) {
        self.subscribers
            .retain(|subscriber| subscriber.sender.send(frame.clone()).is_ok());
    }
}

/// Injected failure counters
#[derive(Debug, Default)]
struct FaultPlan {
    connect_failures: AtomicUsize,
    publish_failures: AtomicUsize,
    subscribe_failures: AtomicUsize,
}

/// Consume one injected failure, if any is pending.
fn take_fault(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[derive(Debug, Default)]
struct BrokerState {
    destinations: Mutex<HashMap<String, Destination>>,
    generation: AtomicU64,
    next_id: AtomicU64,
    published: AtomicU64,
    faults: FaultPlan,
}

impl BrokerState {
    fn destinations(&self) -> TransportResult<MutexGuard<'_, HashMap<String, Destination>>> {
        self.destinations
            .lock()
            .map_err(|_| TransportError::Internal("Lock poisoned".into()))
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Broker shared by every connection in the process
#[derive(Debug, Clone, Default)]
pub struct LocalBroker {
    state: Arc<BrokerState>,
}

impl LocalBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` connect attempts.
    pub fn fail_next_connects(&self, count: usize) {
        self.state
            .faults
            .connect_failures
            .store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` publish attempts.
    pub fn fail_next_publishes(&self, count: usize) {
        self.state
            .faults
            .publish_failures
            .store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` subscribe attempts.
    pub fn fail_next_subscribes(&self, count: usize) {
        self.state
            .faults
            .subscribe_failures
            .store(count, Ordering::SeqCst);
    }

    /// Invalidate every open session, as a broker restart would.
    pub fn drop_connections(&self) {
        self.state.generation.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut destinations) = self.state.destinations() {
            for destination in destinations.values_mut() {
                destination.subscribers.clear();
            }
        }
    }

    /// Number of frames accepted so far.
    pub fn published_count(&self) -> u64 {
        self.state.published.load(Ordering::SeqCst)
    }

    /// Frames waiting on a queue with no subscriber.
    pub fn backlog_len(&self, destination: &str) -> usize {
        self.state
            .destinations()
            .map(|d| d.get(destination).map(|d| d.backlog.len()).unwrap_or(0))
            .unwrap_or(0)
    }

    /// Current subscribers of a destination.
    pub fn subscriber_count(&self, destination: &str) -> usize {
        self.state
            .destinations()
            .map(|d| d.get(destination).map(|d| d.subscribers.len()).unwrap_or(0))
            .unwrap_or(0)
    }
}

impl Broker for LocalBroker {
    fn connect(&self) -> TransportResult<Arc<dyn BrokerSession>> {
        if take_fault(&self.state.faults.connect_failures) {
            return Err(TransportError::Unreachable("injected connect failure".into()));
        }
        Ok(Arc::new(LocalSession {
            id: self.state.next_id(),
            generation: self.state.generation.load(Ordering::SeqCst),
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Session on a [`LocalBroker`]
#[derive(Debug)]
pub struct LocalSession {
    id: u64,
    generation: u64,
    state: Arc<BrokerState>,
    closed: AtomicBool,
}

impl LocalSession {
    fn check_open(&self) -> TransportResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(TransportError::ConnectionLost)
        }
    }
}

impl BrokerSession for LocalSession {
    fn publish(&self, frame: Frame) -> TransportResult<()> {
        self.check_open()?;
        if take_fault(&self.state.faults.publish_failures) {
            return Err(TransportError::Rejected("injected publish failure".into()));
        }

        let mut destinations = self.state.destinations()?;
        let destination = destinations.entry(frame.destination.clone()).or_default();
        if is_topic(&frame.destination) {
            destination.deliver_topic(&frame);
        } else {
            destination.deliver_queue(frame);
        }
        self.state.published.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn subscribe(&self, channel: &Channel) -> TransportResult<Subscription> {
        self.check_open()?;
        if take_fault(&self.state.faults.subscribe_failures) {
            return Err(TransportError::Rejected("injected subscribe failure".into()));
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.state.next_id();

        let mut destinations = self.state.destinations()?;
        let destination = destinations.entry(channel.name().to_string()).or_default();
        if !channel.is_topic() {
            while let Some(frame) = destination.backlog.pop_front() {
                let _ = sender.send(frame);
            }
        }
        destination.subscribers.push(Subscriber {
            id,
            session: self.id,
            sender,
        });

        Ok(Subscription { id, receiver })
    }

    fn unsubscribe(&self, subscription_id: u64) -> TransportResult<()> {
        let mut destinations = self.state.destinations()?;
        for destination in destinations.values_mut() {
            destination
                .subscribers
                .retain(|subscriber| subscriber.id != subscription_id);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
            && self.state.generation.load(Ordering::SeqCst) == self.generation
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Ok(mut destinations) = self.state.destinations() {
            for destination in destinations.values_mut() {
                destination
                    .subscribers
                    .retain(|subscriber| subscriber.session != self.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{ChannelRegistry, Replica};

    fn registry() -> ChannelRegistry {
        ChannelRegistry::new(
            "TEST",
            "P1",
            vec![Replica::bitarchive("ONE", "one"), Replica::checksum("CS", "cs")],
        )
        .unwrap()
    }

    fn frame(id: &str, destination: &Channel) -> Frame {
        Frame {
            message_id: id.to_string(),
            destination: destination.name().to_string(),
            payload: id.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_queue_holds_frames_until_subscribed() {
        let broker = LocalBroker::new();
        let session = broker.connect().unwrap();
        let queue = registry().the_cr("CS").unwrap();

        session.publish(frame("m1", &queue)).unwrap();
        session.publish(frame("m2", &queue)).unwrap();
        assert_eq!(broker.backlog_len(queue.name()), 2);

        let mut subscription = session.subscribe(&queue).unwrap();
        assert_eq!(subscription.receiver.try_recv().unwrap().message_id, "m1");
        assert_eq!(subscription.receiver.try_recv().unwrap().message_id, "m2");
        assert_eq!(broker.backlog_len(queue.name()), 0);
    }

    #[test]
    fn test_queue_delivers_to_exactly_one_subscriber() {
        let broker = LocalBroker::new();
        let session = broker.connect().unwrap();
        let queue = registry().any_ba("ONE").unwrap();

        let mut a = session.subscribe(&queue).unwrap();
        let mut b = session.subscribe(&queue).unwrap();
        session.publish(frame("m1", &queue)).unwrap();
        session.publish(frame("m2", &queue)).unwrap();

        let received_a = a.receiver.try_recv().is_ok() as usize;
        let received_b = b.receiver.try_recv().is_ok() as usize;
        let second_a = a.receiver.try_recv().is_ok() as usize;
        let second_b = b.receiver.try_recv().is_ok() as usize;
        assert_eq!(received_a + received_b + second_a + second_b, 2);
        assert_eq!(received_a + second_a, 1);
    }

    #[test]
    fn test_topic_fans_out() {
        let broker = LocalBroker::new();
        let session = broker.connect().unwrap();
        let topic = registry().all_ba("ONE").unwrap();

        session.publish(frame("lost", &topic)).unwrap();
        let mut a = session.subscribe(&topic).unwrap();
        let mut b = session.subscribe(&topic).unwrap();
        session.publish(frame("m1", &topic)).unwrap();

        assert_eq!(a.receiver.try_recv().unwrap().message_id, "m1");
        assert_eq!(b.receiver.try_recv().unwrap().message_id, "m1");
        assert!(a.receiver.try_recv().is_err());
    }

    #[test]
    fn test_injected_faults_are_consumed() {
        let broker = LocalBroker::new();
        broker.fail_next_connects(1);
        assert!(broker.connect().is_err());
        let session = broker.connect().unwrap();

        let queue = registry().the_cr("CS").unwrap();
        broker.fail_next_publishes(2);
        assert!(session.publish(frame("a", &queue)).is_err());
        assert!(session.publish(frame("a", &queue)).is_err());
        assert!(session.publish(frame("a", &queue)).is_ok());
        assert_eq!(broker.published_count(), 1);
    }

    #[test]
    fn test_drop_connections_invalidates_sessions() {
        let broker = LocalBroker::new();
        let session = broker.connect().unwrap();
        let queue = registry().the_cr("CS").unwrap();
        let _subscription = session.subscribe(&queue).unwrap();

        broker.drop_connections();
        assert!(!session.is_open());
        assert_eq!(
            session.publish(frame("a", &queue)).unwrap_err(),
            TransportError::ConnectionLost
        );
        assert_eq!(broker.subscriber_count(queue.name()), 0);

        let fresh = broker.connect().unwrap();
        assert!(fresh.is_open());
    }
}
