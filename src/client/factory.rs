//! # Replica Client Factory
//!
//! Owns the clients of one process: at most one per destination.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::errors::{ClientError, ClientResult};
use super::replica_client::ReplicaClient;
use crate::connection::ConnectionManager;

#[derive(Debug)]
pub struct ReplicaClientFactory {
    connection: Arc<ConnectionManager>,
    timeout: Duration,
    clients: Mutex<HashMap<String, Arc<ReplicaClient>>>,
}

impl ReplicaClientFactory {
    pub fn new(connection: Arc<ConnectionManager>, timeout: Duration) -> Self {
        Self {
            connection,
            timeout,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    /// The client for a replica, created on first use.
    pub fn client(&self, replica_id: &str) -> ClientResult<Arc<ReplicaClient>> {
        let registry = self.connection.registry();
        let replica = registry.replica(replica_id)?.clone();
        let destination = registry.request_channel(replica_id)?;

        let mut clients = self
            .clients
            .lock()
            .map_err(|_| ClientError::Internal("Lock poisoned".into()))?;
        if let Some(client) = clients.get(destination.name()) {
            return Ok(Arc::clone(client));
        }

        let client = Arc::new(ReplicaClient::new(
            replica,
            Arc::clone(&self.connection),
            self.timeout,
        )?);
        clients.insert(destination.name().to_string(), Arc::clone(&client));
        Ok(client)
    }

    /// Live clients
    pub fn len(&self) -> usize {
        self.clients.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
