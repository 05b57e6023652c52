//! # Connection Manager
//!
//! Owns the broker session of one process. Every broker operation goes
//! through the retry policy; a lost session is re-established once, by
//! whichever operation noticed first, while everyone else waits at the
//! reconnect gate.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::errors::{ConnectionError, ConnectionResult};
use super::gate::ReconnectGate;
use super::listener::{ListenerEntry, ListenerId, ListenerKey, MessageListener, ReplyRouter};
use super::retry::RetryPolicy;
use crate::channels::{Channel, ChannelRegistry};
use crate::observability::{log_event_with_fields, trace_event, Event, MetricsRegistry};
use crate::protocol::{self, Message, MessageId, ProtocolError, Reply};
use crate::transport::{Broker, BrokerSession, Frame, FrameReceiver, Subscription};

type Resubscribed = (Arc<dyn BrokerSession>, Vec<(ListenerKey, Subscription)>);

fn same_session(a: &Arc<dyn BrokerSession>, b: &Arc<dyn BrokerSession>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

pub struct ConnectionManager {
    me: Weak<ConnectionManager>,
    broker: Arc<dyn Broker>,
    registry: ChannelRegistry,
    policy: RetryPolicy,
    metrics: Arc<MetricsRegistry>,
    session: RwLock<Option<Arc<dyn BrokerSession>>>,
    gate: ReconnectGate,
    reconnect_lock: tokio::sync::Mutex<()>,
    reconnects_done: AtomicU64,
    listeners: Mutex<HashMap<ListenerKey, ListenerEntry>>,
    replies: ReplyRouter,
    next_listener: AtomicU64,
    closed: AtomicBool,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("environment", &self.registry.environment())
            .field("instance", &self.registry.instance_id())
            .field("listeners", &self.listener_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ConnectionManager {
    /// Connect to the broker and start listening on the process reply
    /// channel.
    pub async fn connect(
        broker: Arc<dyn Broker>,
        registry: ChannelRegistry,
        policy: RetryPolicy,
        metrics: Arc<MetricsRegistry>,
    ) -> ConnectionResult<Arc<Self>> {
        let manager = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            broker,
            registry,
            policy,
            metrics,
            session: RwLock::new(None),
            gate: ReconnectGate::new(),
            reconnect_lock: tokio::sync::Mutex::new(()),
            reconnects_done: AtomicU64::new(0),
            listeners: Mutex::new(HashMap::new()),
            replies: ReplyRouter::default(),
            next_listener: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });

        manager.init_connection().await?;
        let reply_channel = manager.registry.reply_channel();
        let router = Arc::new(manager.replies.clone());
        manager.set_listener(&reply_channel, router).await?;

        Ok(manager)
    }

    /// Establish the broker session, retrying with backoff.
    pub async fn init_connection(&self) -> ConnectionResult<()> {
        let broker = &self.broker;
        let session = self
            .policy
            .run("connect", &self.metrics, move || async move {
                broker.connect().map_err(ConnectionError::from)
            })
            .await
            .inspect_err(|error| {
                let reason = error.to_string();
                log_event_with_fields(Event::ConnectionFailed, &[("error", reason.as_str())]);
            })?;

        if let Some(previous) = self.install(session)? {
            previous.close();
        }
        log_event_with_fields(
            Event::ConnectionEstablished,
            &[
                ("environment", self.registry.environment()),
                ("instance", self.registry.instance_id()),
            ],
        );
        Ok(())
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Where replies to this process's requests arrive
    pub fn reply_channel(&self) -> Channel {
        self.registry.reply_channel()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn is_reconnecting(&self) -> bool {
        self.gate.is_closed()
    }

    /// Registered listeners, the internal reply listener included
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().map(|l| l.len()).unwrap_or(0)
    }

    /// Requests waiting for a reply
    pub fn pending_requests(&self) -> usize {
        self.replies.waiting()
    }

    /// Send to the message's destination. The id is assigned by the first
    /// successful send; nothing is assigned if every attempt fails.
    pub async fn send(&self, message: &mut Message) -> ConnectionResult<MessageId> {
        let to = message.to().clone();
        self.transmit(message, &to, "send").await
    }

    /// Send to an explicit channel, reusing the message's id.
    pub async fn resend(&self, message: &mut Message, to: &Channel) -> ConnectionResult<MessageId> {
        self.transmit(message, to, "resend").await
    }

    /// Answer a received (or previously sent) message on its reply-to
    /// channel.
    pub async fn reply(&self, request: &Message, reply: Reply) -> ConnectionResult<MessageId> {
        if !request.is_sent() {
            return Err(ConnectionError::PermissionDenied(format!(
                "cannot reply to {} message that was never sent",
                request.kind()
            )));
        }
        if request.as_request().is_some() && request.kind() != reply.kind() {
            return Err(ProtocolError::MismatchedReply {
                request: request.kind().as_str(),
                reply: reply.kind().as_str(),
            }
            .into());
        }

        let mut answer = request.answer(reply);
        let to = answer.to().clone();
        let id = self.transmit(&mut answer, &to, "reply").await?;

        self.metrics.increment_replies_sent();
        trace_event(
            Event::MessageReplied,
            &[
                ("destination", to.name()),
                ("kind", answer.kind().as_str()),
                ("message_id", id.as_str()),
            ],
        );
        Ok(id)
    }

    /// Send and wait for the correlated reply. A timeout is a failure of
    /// this exchange only; nothing is resent.
    pub async fn request(
        &self,
        message: &mut Message,
        timeout: Duration,
    ) -> ConnectionResult<Reply> {
        let id = message.outgoing_id();
        let (sender, receiver) = oneshot::channel();
        if !self.replies.expect(id.clone(), sender) {
            return Err(ConnectionError::Internal("Lock poisoned".into()));
        }

        let to = message.to().clone();
        if let Err(error) = self.transmit_with_id(message, &to, "send", id.clone()).await {
            self.replies.forget(&id);
            return Err(error);
        }

        let reply = match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(ConnectionError::Closed),
            Err(_) => {
                self.replies.forget(&id);
                let timeout_ms = timeout.as_millis() as u64;
                let waited = timeout_ms.to_string();
                log_event_with_fields(
                    Event::RequestTimeout,
                    &[
                        ("kind", message.kind().as_str()),
                        ("message_id", id.as_str()),
                        ("timeout_ms", waited.as_str()),
                    ],
                );
                return Err(ConnectionError::Timeout {
                    message_id: id.to_string(),
                    timeout_ms,
                });
            }
        };

        if reply.kind() != message.kind() {
            return Err(ProtocolError::MismatchedReply {
                request: message.kind().as_str(),
                reply: reply.kind().as_str(),
            }
            .into());
        }
        Ok(reply)
    }

    /// Register a listener. Several listeners may share a channel; each
    /// is identified by the returned id.
    pub async fn set_listener(
        &self,
        channel: &Channel,
        listener: Arc<dyn MessageListener>,
    ) -> ConnectionResult<ListenerId> {
        self.ready().await?;
        let subscription = self
            .policy
            .run("set_listener", &self.metrics, move || {
                self.try_subscribe(channel)
            })
            .await?;

        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst) + 1);
        let task = self.spawn_delivery(Arc::clone(&listener), subscription.receiver);
        self.listeners()?.insert(
            (channel.name().to_string(), id),
            ListenerEntry {
                channel: channel.clone(),
                listener,
                subscription_id: subscription.id,
                task,
            },
        );

        let listener_id = id.to_string();
        log_event_with_fields(
            Event::ListenerAdded,
            &[("channel", channel.name()), ("listener", listener_id.as_str())],
        );
        Ok(id)
    }

    pub async fn remove_listener(&self, channel: &Channel, id: ListenerId) -> ConnectionResult<()> {
        self.ready().await?;
        let entry = self
            .listeners()?
            .remove(&(channel.name().to_string(), id))
            .ok_or_else(|| ConnectionError::UnknownListener {
                channel: channel.name().to_string(),
                listener: id.0,
            })?;
        entry.task.abort();

        let subscription_id = entry.subscription_id;
        self.policy
            .run("remove_listener", &self.metrics, move || async move {
                self.session()?
                    .unsubscribe(subscription_id)
                    .map_err(ConnectionError::from)
            })
            .await?;

        let listener_id = id.to_string();
        log_event_with_fields(
            Event::ListenerRemoved,
            &[("channel", channel.name()), ("listener", listener_id.as_str())],
        );
        Ok(())
    }

    /// Re-establish the session and re-register every listener.
    ///
    /// Single flight: callers arriving while a reconnect runs wait for it
    /// and share its outcome. Failure closes the connection.
    pub async fn reconnect(&self) -> ConnectionResult<()> {
        let seen = self.reconnects_done.load(Ordering::SeqCst);
        let _guard = self.reconnect_lock.lock().await;
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }
        if self.reconnects_done.load(Ordering::SeqCst) != seen {
            // Someone else reconnected while we waited for the lock.
            return Ok(());
        }

        self.gate.close();
        self.metrics.increment_reconnects();
        log_event_with_fields(
            Event::ReconnectStart,
            &[("instance", self.registry.instance_id())],
        );

        let outcome = self.reestablish().await;
        match &outcome {
            Ok(()) => log_event_with_fields(
                Event::ReconnectComplete,
                &[("instance", self.registry.instance_id())],
            ),
            Err(error) => {
                let reason = error.to_string();
                log_event_with_fields(Event::ReconnectFailed, &[("error", reason.as_str())]);
                self.shutdown();
            }
        }
        self.reconnects_done.fetch_add(1, Ordering::SeqCst);
        self.gate.open();
        outcome
    }

    /// Drop every listener and fail every pending request. The session
    /// stays open.
    pub async fn cleanup(&self) {
        self.gate.wait().await;
        self.drop_listeners();
        self.replies.clear();
    }

    /// Cleanup and close the session. Further operations fail with
    /// [`ConnectionError::Closed`].
    pub async fn close(&self) {
        self.gate.wait().await;
        self.shutdown();
    }

    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.drop_listeners();
        self.replies.clear();
        if let Ok(mut session) = self.session.write() {
            if let Some(session) = session.take() {
                session.close();
            }
        }
        log_event_with_fields(
            Event::ConnectionClosed,
            &[("instance", self.registry.instance_id())],
        );
    }

    fn drop_listeners(&self) {
        let entries: Vec<ListenerEntry> = match self.listeners.lock() {
            Ok(mut listeners) => listeners.drain().map(|(_, entry)| entry).collect(),
            Err(_) => return,
        };
        let session = self.session().ok();
        for entry in entries {
            entry.task.abort();
            if let Some(session) = &session {
                let _ = session.unsubscribe(entry.subscription_id);
            }
        }
    }

    async fn ready(&self) -> ConnectionResult<()> {
        self.gate.wait().await;
        if self.is_closed() {
            Err(ConnectionError::Closed)
        } else {
            Ok(())
        }
    }

    fn session(&self) -> ConnectionResult<Arc<dyn BrokerSession>> {
        self.session
            .read()
            .map_err(|_| ConnectionError::Internal("Lock poisoned".into()))?
            .clone()
            .ok_or(ConnectionError::Closed)
    }

    fn install(
        &self,
        session: Arc<dyn BrokerSession>,
    ) -> ConnectionResult<Option<Arc<dyn BrokerSession>>> {
        let mut current = self
            .session
            .write()
            .map_err(|_| ConnectionError::Internal("Lock poisoned".into()))?;
        Ok(current.replace(session))
    }

    fn listeners(&self) -> ConnectionResult<MutexGuard<'_, HashMap<ListenerKey, ListenerEntry>>> {
        self.listeners
            .lock()
            .map_err(|_| ConnectionError::Internal("Lock poisoned".into()))
    }

    async fn transmit(
        &self,
        message: &mut Message,
        to: &Channel,
        operation: &str,
    ) -> ConnectionResult<MessageId> {
        let id = message.outgoing_id();
        self.transmit_with_id(message, to, operation, id).await
    }

    /// Put `message` on the wire as `id`. The message keeps the id only
    /// once the broker accepted it.
    async fn transmit_with_id(
        &self,
        message: &mut Message,
        to: &Channel,
        operation: &str,
        id: MessageId,
    ) -> ConnectionResult<MessageId> {
        let frame = protocol::encode(message, &id, to)?;
        self.publish(operation, &frame).await?;

        message.mark_sent(id.clone());
        self.metrics.increment_messages_sent();
        trace_event(
            Event::MessageSent,
            &[
                ("destination", to.name()),
                ("kind", message.kind().as_str()),
                ("message_id", id.as_str()),
            ],
        );
        Ok(id)
    }

    async fn publish(&self, operation: &str, frame: &Frame) -> ConnectionResult<()> {
        self.policy
            .run(operation, &self.metrics, move || self.try_publish(frame))
            .await
    }

    async fn try_publish(&self, frame: &Frame) -> ConnectionResult<()> {
        self.ready().await?;
        let session = self.session()?;
        match session.publish(frame.clone()) {
            Ok(()) => Ok(()),
            Err(error) => {
                if error.requires_reconnect() {
                    self.recover(&session).await?;
                }
                Err(ConnectionError::Transport(error))
            }
        }
    }

    async fn try_subscribe(&self, channel: &Channel) -> ConnectionResult<Subscription> {
        self.ready().await?;
        let session = self.session()?;
        match session.subscribe(channel) {
            Ok(subscription) => Ok(subscription),
            Err(error) => {
                if error.requires_reconnect() {
                    self.recover(&session).await?;
                }
                Err(ConnectionError::Transport(error))
            }
        }
    }

    /// Reconnect unless someone already replaced the failed session.
    async fn recover(&self, failed: &Arc<dyn BrokerSession>) -> ConnectionResult<()> {
        let current = self.session()?;
        if !same_session(&current, failed) && current.is_open() {
            return Ok(());
        }
        self.reconnect().await
    }

    async fn reestablish(&self) -> ConnectionResult<()> {
        let channels: Vec<(ListenerKey, Channel)> = self
            .listeners()?
            .iter()
            .map(|(key, entry)| (key.clone(), entry.channel.clone()))
            .collect();

        let channels = &channels;
        let (session, subscriptions) = self
            .policy
            .run("reconnect", &self.metrics, move || {
                std::future::ready(self.try_resubscribe(channels))
            })
            .await?;

        if let Some(previous) = self.install(session)? {
            previous.close();
        }

        let mut listeners = self.listeners()?;
        for (key, subscription) in subscriptions {
            match listeners.get_mut(&key) {
                Some(entry) => {
                    entry.task.abort();
                    entry.task =
                        self.spawn_delivery(Arc::clone(&entry.listener), subscription.receiver);
                    entry.subscription_id = subscription.id;
                }
                None => {
                    if let Ok(session) = self.session() {
                        let _ = session.unsubscribe(subscription.id);
                    }
                }
            }
        }
        Ok(())
    }

    /// One reconnect attempt: a fresh session with every listener
    /// subscribed, or nothing.
    fn try_resubscribe(
        &self,
        channels: &[(ListenerKey, Channel)],
    ) -> ConnectionResult<Resubscribed> {
        let session = self.broker.connect()?;
        let mut subscriptions = Vec::with_capacity(channels.len());
        for (key, channel) in channels {
            match session.subscribe(channel) {
                Ok(subscription) => subscriptions.push((key.clone(), subscription)),
                Err(error) => {
                    session.close();
                    return Err(error.into());
                }
            }
        }
        Ok((session, subscriptions))
    }

    fn spawn_delivery(
        &self,
        listener: Arc<dyn MessageListener>,
        mut receiver: FrameReceiver,
    ) -> JoinHandle<()> {
        let manager = self.me.clone();
        tokio::spawn(async move {
            while let Some(frame) = receiver.recv().await {
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let listener = Arc::clone(&listener);
                tokio::spawn(async move { manager.deliver(frame, listener).await });
            }
        })
    }

    async fn deliver(&self, frame: Frame, listener: Arc<dyn MessageListener>) {
        let message = match protocol::decode(&frame) {
            Ok(message) => message,
            Err(error) => {
                let reason = error.to_string();
                log_event_with_fields(
                    Event::MessageUndecodable,
                    &[
                        ("destination", frame.destination.as_str()),
                        ("error", reason.as_str()),
                        ("message_id", frame.message_id.as_str()),
                    ],
                );
                self.forward_to_error_channel(frame).await;
                return;
            }
        };
        trace_event(
            Event::MessageReceived,
            &[
                ("destination", frame.destination.as_str()),
                ("kind", message.kind().as_str()),
                ("message_id", frame.message_id.as_str()),
            ],
        );

        let handled = tokio::task::spawn_blocking(move || {
            let reply = listener.on_message(&message);
            (message, reply)
        })
        .await;

        let failure = match handled {
            Ok((message, Some(reply))) => {
                self.reply(&message, reply).await.err().map(|e| e.to_string())
            }
            Ok((_, None)) => None,
            Err(error) => Some(error.to_string()),
        };
        if let Some(reason) = failure {
            log_event_with_fields(
                Event::ListenerFailed,
                &[
                    ("destination", frame.destination.as_str()),
                    ("error", reason.as_str()),
                    ("message_id", frame.message_id.as_str()),
                ],
            );
        }
    }

    async fn forward_to_error_channel(&self, mut frame: Frame) {
        frame.destination = self.registry.error().name().to_string();
        if let Err(error) = self.publish("forward", &frame).await {
            let reason = error.to_string();
            log_event_with_fields(
                Event::ListenerFailed,
                &[("error", reason.as_str()), ("message_id", frame.message_id.as_str())],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::Replica;
    use crate::protocol::{GetChecksumReply, GetChecksumRequest, Request, ReplyStatus};
    use crate::transport::LocalBroker;

    fn quick_policy(max_attempts: usize) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(4), 2.0)
    }

    fn registry(instance: &str) -> ChannelRegistry {
        ChannelRegistry::new(
            "TEST",
            instance,
            vec![Replica::bitarchive("ONE", "one"), Replica::checksum("CS", "cs")],
        )
        .unwrap()
    }

    async fn manager(
        broker: &LocalBroker,
        instance: &str,
        attempts: usize,
    ) -> Arc<ConnectionManager> {
        ConnectionManager::connect(
            Arc::new(broker.clone()),
            registry(instance),
            quick_policy(attempts),
            Arc::new(MetricsRegistry::new()),
        )
        .await
        .unwrap()
    }

    fn checksum_request(manager: &ConnectionManager) -> Message {
        Message::request(
            manager.registry().the_cr("CS").unwrap(),
            manager.reply_channel(),
            Request::GetChecksum(GetChecksumRequest {
                filename: "a.arc".into(),
                replica_id: "CS".into(),
            }),
        )
    }

    fn answering_listener() -> Arc<dyn MessageListener> {
        Arc::new(|message: &Message| {
            let Some(Request::GetChecksum(request)) = message.as_request() else {
                return None;
            };
            Some(Reply::GetChecksum(GetChecksumReply {
                status: ReplyStatus::ok(),
                filename: request.filename.clone(),
                checksum: Some("abc".into()),
            }))
        })
    }

    #[tokio::test]
    async fn test_send_survives_failures_below_bound() {
        let broker = LocalBroker::new();
        let manager = manager(&broker, "P1", 4).await;
        let mut message = checksum_request(&manager);

        broker.fail_next_publishes(3);
        let id = manager.send(&mut message).await.unwrap();
        assert_eq!(message.id(), Some(&id));
        assert!(message.is_sent());
        assert_eq!(broker.backlog_len("TEST_CS_THE_CR"), 1);
        assert_eq!(manager.metrics().snapshot().send_retries, 3);
    }

    #[tokio::test]
    async fn test_send_exhaustion_is_fatal_and_assigns_no_id() {
        let broker = LocalBroker::new();
        let manager = manager(&broker, "P1", 4).await;
        let mut message = checksum_request(&manager);

        broker.fail_next_publishes(4);
        let error = manager.send(&mut message).await.unwrap_err();
        assert!(error.is_fatal());
        assert!(matches!(error, ConnectionError::Exhausted { attempts: 4, .. }));
        assert!(message.id().is_none());
        assert!(!message.is_sent());
        assert_eq!(broker.backlog_len("TEST_CS_THE_CR"), 0);
    }

    #[tokio::test]
    async fn test_init_connection_exhaustion() {
        let broker = LocalBroker::new();
        broker.fail_next_connects(2);
        let result = ConnectionManager::connect(
            Arc::new(broker.clone()),
            registry("P1"),
            quick_policy(2),
            Arc::new(MetricsRegistry::new()),
        )
        .await;
        assert!(matches!(result, Err(ConnectionError::Exhausted { .. })));
    }

    #[tokio::test]
    async fn test_resend_reuses_id() {
        let broker = LocalBroker::new();
        let manager = manager(&broker, "P1", 2).await;
        let mut message = checksum_request(&manager);

        let first = manager.send(&mut message).await.unwrap();
        let other = manager.registry().the_bamon("ONE").unwrap();
        let second = manager.resend(&mut message, &other).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(broker.backlog_len(other.name()), 1);
    }

    #[tokio::test]
    async fn test_reply_requires_sent_message() {
        let broker = LocalBroker::new();
        let manager = manager(&broker, "P1", 2).await;
        let message = checksum_request(&manager);
        let reply = message.as_request().unwrap().failure("no");

        let error = manager.reply(&message, reply).await.unwrap_err();
        assert!(matches!(error, ConnectionError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_request_reply_round_trip() {
        let broker = LocalBroker::new();
        let server = manager(&broker, "SERVER", 2).await;
        let client = manager(&broker, "CLIENT", 2).await;

        let channel = server.registry().the_cr("CS").unwrap();
        server.set_listener(&channel, answering_listener()).await.unwrap();

        let mut message = checksum_request(&client);
        let reply = client
            .request(&mut message, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(reply.is_ok());
        assert_eq!(client.pending_requests(), 0);
        assert_eq!(client.metrics().snapshot().messages_sent, 1);
    }

    #[tokio::test]
    async fn test_request_waits_on_the_id_it_sends() {
        let broker = LocalBroker::new();
        let server = manager(&broker, "SERVER", 2).await;
        let client = manager(&broker, "CLIENT", 2).await;

        let seen: Arc<Mutex<Vec<MessageId>>> = Arc::default();
        let recorded = Arc::clone(&seen);
        let answer = answering_listener();
        let recording = Arc::new(move |message: &Message| {
            if let Some(id) = message.id() {
                recorded.lock().unwrap().push(id.clone());
            }
            answer.on_message(message)
        });
        let channel = server.registry().the_cr("CS").unwrap();
        server.set_listener(&channel, recording).await.unwrap();

        let mut message = checksum_request(&client);
        assert!(message.id().is_none());
        client
            .request(&mut message, Duration::from_secs(5))
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(message.id(), Some(&seen[0]));
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let broker = LocalBroker::new();
        let client = manager(&broker, "CLIENT", 2).await;

        let mut message = checksum_request(&client);
        let error = client
            .request(&mut message, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(error, ConnectionError::Timeout { .. }));
        assert!(message.is_sent());
        assert_eq!(client.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_listeners_are_independent() {
        let broker = LocalBroker::new();
        let manager = manager(&broker, "P1", 2).await;
        let channel = manager.registry().all_ba("ONE").unwrap();

        let first = manager.set_listener(&channel, answering_listener()).await.unwrap();
        let second = manager.set_listener(&channel, answering_listener()).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(broker.subscriber_count(channel.name()), 2);

        manager.remove_listener(&channel, first).await.unwrap();
        assert_eq!(broker.subscriber_count(channel.name()), 1);
        assert!(matches!(
            manager.remove_listener(&channel, first).await,
            Err(ConnectionError::UnknownListener { .. })
        ));
    }

    #[tokio::test]
    async fn test_reconnect_restores_listeners() {
        let broker = LocalBroker::new();
        let server = manager(&broker, "SERVER", 3).await;
        let client = manager(&broker, "CLIENT", 3).await;
        let channel = server.registry().the_cr("CS").unwrap();
        server.set_listener(&channel, answering_listener()).await.unwrap();

        broker.drop_connections();
        server.reconnect().await.unwrap();
        assert_eq!(broker.subscriber_count(channel.name()), 1);

        // The client notices the loss on its next send and reconnects.
        let mut message = checksum_request(&client);
        let reply = client
            .request(&mut message, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(reply.is_ok());
        assert_eq!(client.metrics().snapshot().reconnects, 1);
    }

    #[tokio::test]
    async fn test_concurrent_reconnects_run_once() {
        let broker = LocalBroker::new();
        let manager = manager(&broker, "P1", 3).await;

        broker.drop_connections();
        // The first attempt fails, so the second caller arrives mid-reconnect.
        broker.fail_next_connects(1);
        let (first, second) = tokio::join!(manager.reconnect(), manager.reconnect());
        first.unwrap();
        second.unwrap();
        assert_eq!(manager.metrics().snapshot().reconnects, 1);
        assert!(!manager.is_reconnecting());
    }

    #[tokio::test]
    async fn test_failed_reconnect_closes() {
        let broker = LocalBroker::new();
        let manager = manager(&broker, "P1", 2).await;

        broker.drop_connections();
        broker.fail_next_connects(2);
        assert!(manager.reconnect().await.unwrap_err().is_fatal());
        assert!(manager.is_closed());

        let mut message = checksum_request(&manager);
        assert_eq!(
            manager.send(&mut message).await.unwrap_err(),
            ConnectionError::Closed
        );
    }

    #[tokio::test]
    async fn test_undecodable_frames_go_to_error_channel() {
        let broker = LocalBroker::new();
        let manager = manager(&broker, "P1", 2).await;
        let channel = manager.registry().the_cr("CS").unwrap();
        manager.set_listener(&channel, answering_listener()).await.unwrap();

        let raw = broker.connect().unwrap();
        raw.publish(Frame {
            message_id: "ID:garbage".into(),
            destination: channel.name().to_string(),
            payload: b"{not json".to_vec(),
        })
        .unwrap();

        let error_channel = manager.registry().error();
        for _ in 0..100 {
            if broker.backlog_len(error_channel.name()) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(broker.backlog_len(error_channel.name()), 1);
    }

    #[tokio::test]
    async fn test_close_fails_pending_and_future_operations() {
        let broker = LocalBroker::new();
        let manager = manager(&broker, "P1", 2).await;
        assert_eq!(manager.listener_count(), 1);

        manager.close().await;
        assert!(manager.is_closed());
        assert_eq!(manager.listener_count(), 0);
        let channel = manager.registry().the_cr("CS").unwrap();
        assert_eq!(
            manager
                .set_listener(&channel, answering_listener())
                .await
                .unwrap_err(),
            ConnectionError::Closed
        );
    }
}
