//! # Listeners
//!
//! Callbacks registered on a channel. A listener may answer a request by
//! returning a reply; the connection manager sends it to the request's
//! reply-to channel.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::channels::Channel;
use crate::observability::{trace_event, Event};
use crate::protocol::{Message, MessageId, Reply};

/// Receives decoded messages. Runs on a blocking thread.
pub trait MessageListener: Send + Sync {
    fn on_message(&self, message: &Message) -> Option<Reply>;
}

impl<F> MessageListener for F
where
    F: Fn(&Message) -> Option<Reply> + Send + Sync,
{
    fn on_message(&self, message: &Message) -> Option<Reply> {
        self(message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Listeners are keyed by channel name and listener id
pub(crate) type ListenerKey = (String, ListenerId);

pub(crate) struct ListenerEntry {
    pub channel: Channel,
    pub listener: Arc<dyn MessageListener>,
    pub subscription_id: u64,
    pub task: JoinHandle<()>,
}

type PendingMap = HashMap<MessageId, oneshot::Sender<Reply>>;

/// Routes replies on the process reply channel to waiting requesters.
#[derive(Debug, Default, Clone)]
pub(crate) struct ReplyRouter {
    pending: Arc<Mutex<PendingMap>>,
}

impl ReplyRouter {
    /// Returns false if the pending map is unusable.
    pub fn expect(&self, id: MessageId, sender: oneshot::Sender<Reply>) -> bool {
        match self.pending.lock() {
            Ok(mut pending) => {
                pending.insert(id, sender);
                true
            }
            Err(_) => false,
        }
    }

    pub fn forget(&self, id: &MessageId) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(id);
        }
    }

    /// Drop every waiting requester; they observe a closed connection.
    pub fn clear(&self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.clear();
        }
    }

    pub fn waiting(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }
}

impl MessageListener for ReplyRouter {
    fn on_message(&self, message: &Message) -> Option<Reply> {
        let (Some(correlation_id), Some(reply)) = (message.correlation_id(), message.as_reply())
        else {
            return None;
        };
        let sender = self
            .pending
            .lock()
            .ok()
            .and_then(|mut pending| pending.remove(correlation_id));
        match sender {
            Some(sender) => {
                let _ = sender.send(reply.clone());
            }
            None => trace_event(
                Event::MessageReceived,
                &[("correlation_id", correlation_id.as_str()), ("late", "true")],
            ),
        }
        None
    }
}
