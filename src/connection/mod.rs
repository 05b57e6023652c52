//! # Connection Manager
//!
//! A live, self-healing broker connection: send, resend, reply,
//! request/reply with timeout and listener registration, all retried
//! under one policy. A lost session is re-established once while other
//! operations wait.

mod errors;
mod gate;
mod listener;
mod manager;
mod retry;

pub use errors::{ConnectionError, ConnectionResult};
pub use gate::ReconnectGate;
pub use listener::{ListenerId, MessageListener};
pub use manager::ConnectionManager;
pub use retry::RetryPolicy;
