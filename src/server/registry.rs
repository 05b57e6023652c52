//! # Server Registry
//!
//! At most one live server per replica id in a process. Restarting a
//! server stops its listener, reloads its state from disk and listens
//! again.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::errors::{ServerError, ServerResult};
use super::listener::ServerListener;
use super::ReplicaServer;
use crate::channels::Channel;
use crate::connection::{ConnectionManager, ListenerId};
use crate::observability::{log_event_with_fields, Event};

struct RunningServer {
    server: Arc<dyn ReplicaServer>,
    channels: Vec<(Channel, ListenerId)>,
}

pub struct ServerRegistry {
    connection: Arc<ConnectionManager>,
    running: Mutex<HashMap<String, RunningServer>>,
}

impl std::fmt::Debug for ServerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerRegistry")
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

impl ServerRegistry {
    pub fn new(connection: Arc<ConnectionManager>) -> Self {
        Self {
            connection,
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Start listening for `server`'s replica.
    pub async fn start(&self, server: Arc<dyn ReplicaServer>) -> ServerResult<()> {
        let replica_id = server.replica().id.clone();
        let mut running = self.running.lock().await;
        if running.contains_key(&replica_id) {
            return Err(ServerError::AlreadyRunning(replica_id));
        }

        let channels = self.listen(&server).await?;
        running.insert(replica_id, RunningServer { server, channels });
        Ok(())
    }

    /// Stop listening and forget the server.
    pub async fn stop(&self, replica_id: &str) -> ServerResult<Arc<dyn ReplicaServer>> {
        let mut running = self.running.lock().await;
        let mut entry = running
            .remove(replica_id)
            .ok_or_else(|| ServerError::NotRunning(replica_id.to_string()))?;
        self.unlisten(&mut entry).await?;
        Ok(entry.server)
    }

    /// Stop listening, discard memory, reload from disk, listen again.
    ///
    /// The server stays registered throughout. If the reload fails it
    /// listens again on the state it had and the error is returned.
    pub async fn restart(&self, replica_id: &str) -> ServerResult<()> {
        let mut running = self.running.lock().await;
        let entry = running
            .get_mut(replica_id)
            .ok_or_else(|| ServerError::NotRunning(replica_id.to_string()))?;
        self.unlisten(entry).await?;

        let server = Arc::clone(&entry.server);
        let reloaded = server.reload();
        if let Err(error) = &reloaded {
            let reason = error.to_string();
            log_event_with_fields(
                Event::ServerReloadFailed,
                &[("error", reason.as_str()), ("replica", replica_id)],
            );
        }
        entry.channels = self.listen(&server).await?;
        reloaded
    }

    pub async fn is_running(&self, replica_id: &str) -> bool {
        self.running.lock().await.contains_key(replica_id)
    }

    pub async fn get(&self, replica_id: &str) -> Option<Arc<dyn ReplicaServer>> {
        self.running
            .lock()
            .await
            .get(replica_id)
            .map(|entry| Arc::clone(&entry.server))
    }

    /// Stop every server.
    pub async fn stop_all(&self) -> ServerResult<()> {
        let mut running = self.running.lock().await;
        for (_, mut entry) in running.drain() {
            self.unlisten(&mut entry).await?;
        }
        Ok(())
    }

    async fn listen(
        &self,
        server: &Arc<dyn ReplicaServer>,
    ) -> ServerResult<Vec<(Channel, ListenerId)>> {
        let replica_id = server.replica().id.as_str();
        let mut channels = Vec::new();
        for channel in server.channels(self.connection.registry())? {
            let listener = Arc::new(ServerListener::new(
                Arc::clone(server),
                Arc::clone(self.connection.metrics()),
            ));
            match self.connection.set_listener(&channel, listener).await {
                Ok(id) => channels.push((channel, id)),
                Err(error) => {
                    // Roll back the listeners registered so far.
                    for (channel, id) in &channels {
                        let _ = self.connection.remove_listener(channel, *id).await;
                    }
                    return Err(error.into());
                }
            }
        }

        let names: Vec<&str> = channels.iter().map(|(c, _)| c.name()).collect();
        let names = names.join(",");
        log_event_with_fields(
            Event::ServerStarted,
            &[
                ("channels", names.as_str()),
                ("replica", replica_id),
                ("server", server.description()),
            ],
        );
        Ok(channels)
    }

    /// Remove the server's listeners. Listeners already removed are
    /// forgotten even if a later one fails.
    async fn unlisten(&self, entry: &mut RunningServer) -> ServerResult<()> {
        while let Some((channel, id)) = entry.channels.pop() {
            self.connection.remove_listener(&channel, id).await?;
        }
        log_event_with_fields(
            Event::ServerStopped,
            &[("replica", entry.server.replica().id.as_str())],
        );
        Ok(())
    }
}
