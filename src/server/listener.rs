//! # Server Listener
//!
//! Adapts a replica server to the connection manager: requests are
//! dispatched to the server's handler operation and the reply goes back
//! to the requester.

use std::sync::Arc;

use super::ReplicaServer;
use crate::connection::MessageListener;
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::protocol::{dispatch, Message, Reply};

pub(crate) struct ServerListener {
    server: Arc<dyn ReplicaServer>,
    metrics: Arc<MetricsRegistry>,
}

impl ServerListener {
    pub fn new(server: Arc<dyn ReplicaServer>, metrics: Arc<MetricsRegistry>) -> Self {
        Self { server, metrics }
    }

    fn record_rejection(&self, reply: &Reply) {
        if reply.is_ok() {
            return;
        }
        self.metrics.increment_rejected_requests();
        log_event_with_fields(
            Event::RequestRejected,
            &[
                ("error", reply.error().unwrap_or_default()),
                ("kind", reply.kind().as_str()),
                ("replica", self.server.replica().id.as_str()),
            ],
        );
    }
}

impl MessageListener for ServerListener {
    fn on_message(&self, message: &Message) -> Option<Reply> {
        let request = message.as_request()?;
        let replica = &self.server.replica().id;

        let reply = match request.replica_id() {
            Some(addressed) if addressed != replica => request.failure(format!(
                "{} addressed to replica {} reached replica {}",
                request.kind(),
                addressed,
                replica
            )),
            _ => dispatch(self.server.as_ref(), request),
        };
        self.record_rejection(&reply);
        Some(reply)
    }
}
