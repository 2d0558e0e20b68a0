//! Connection registry
//!
//! The registry is the only owner of the set of connected clients. Every
//! mutation of that set, and every fan-out over it, happens inside the single
//! control loop in [`Registry::run`], so the set is never shared or locked.
//! Other tasks talk to the loop through a cloneable [`RegistryHandle`].

use std::collections::HashMap;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::message::Message;
use crate::error::Result;

/// Opaque, never reused identity of one connection
pub type ClientId = Uuid;

/// The registry's view of a client: its id and the sending half of its
/// outbound queue. Dropping the sender closes the queue.
#[derive(Debug)]
pub struct ClientHandle {
    id: ClientId,
    outbound: mpsc::Sender<Message>,
}

impl ClientHandle {
    /// Create a client with a fresh id and a bounded outbound queue.
    /// The receiver is owned by the connection's writer.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Message>) {
        let (outbound, rx) = mpsc::channel(capacity);
        let handle = Self {
            id: Uuid::new_v4(),
            outbound,
        };
        (handle, rx)
    }

    pub fn id(&self) -> ClientId {
        self.id
    }
}

/// Registry control loop state
pub struct Registry {
    register_rx: mpsc::Receiver<ClientHandle>,
    unregister_rx: mpsc::Receiver<ClientId>,
    broadcast_rx: mpsc::Receiver<Message>,
    clients: HashMap<ClientId, mpsc::Sender<Message>>,
    connected_tx: watch::Sender<usize>,
}

/// Cloneable front door to a running [`Registry`]
#[derive(Clone)]
pub struct RegistryHandle {
    register_tx: mpsc::Sender<ClientHandle>,
    unregister_tx: mpsc::Sender<ClientId>,
    broadcast_tx: mpsc::Sender<Message>,
    connected_rx: watch::Receiver<usize>,
}

impl Registry {
    /// Create a registry and the handle used to reach it.
    /// `intake_capacity` bounds each of the three intake channels.
    pub fn new(intake_capacity: usize) -> (Self, RegistryHandle) {
        let (register_tx, register_rx) = mpsc::channel(intake_capacity);
        let (unregister_tx, unregister_rx) = mpsc::channel(intake_capacity);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(intake_capacity);
        let (connected_tx, connected_rx) = watch::channel(0);

        let registry = Self {
            register_rx,
            unregister_rx,
            broadcast_rx,
            clients: HashMap::new(),
            connected_tx,
        };
        let handle = RegistryHandle {
            register_tx,
            unregister_tx,
            broadcast_tx,
            connected_rx,
        };

        (registry, handle)
    }

    /// Run the control loop until shutdown is signalled.
    ///
    /// Membership changes are polled before broadcasts, so a register or
    /// unregister submitted ahead of a broadcast is applied first.
    #[instrument(skip(self, shutdown))]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Registry started");

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Registry shutting down");
                        break;
                    }
                }
                Some(client) = self.register_rx.recv() => self.register(client),
                Some(id) = self.unregister_rx.recv() => self.unregister(id),
                Some(message) = self.broadcast_rx.recv() => self.broadcast(message),
            }
        }

        // Dropping every sender closes every outbound queue
        let remaining = self.clients.len();
        self.clients.clear();
        self.publish_count();

        info!("Registry stopped, closed {} outbound queues", remaining);
    }

    fn register(&mut self, client: ClientHandle) {
        debug!(client = %client.id, "Client registered");
        self.clients.insert(client.id, client.outbound);
        self.publish_count();
    }

    fn unregister(&mut self, id: ClientId) {
        if self.clients.remove(&id).is_some() {
            debug!(client = %id, "Client unregistered");
            self.publish_count();
        }
    }

    /// Push `message` onto every tracked queue without waiting.
    /// A full queue means a slow consumer: it is evicted, not waited on.
    fn broadcast(&mut self, message: Message) {
        let before = self.clients.len();

        self.clients.retain(|id, outbound| match outbound.try_send(message.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(client = %id, "Outbound queue full, evicting client");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(client = %id, "Outbound queue already closed, dropping client");
                false
            }
        });

        if self.clients.len() != before {
            self.publish_count();
        }
    }

    fn publish_count(&self) {
        self.connected_tx.send_replace(self.clients.len());
    }
}

impl RegistryHandle {
    /// Start tracking a client. It receives every broadcast processed after
    /// this registration.
    pub async fn register(&self, client: ClientHandle) -> Result<()> {
        self.register_tx.send(client).await?;
        Ok(())
    }

    /// Stop tracking a client and close its outbound queue.
    /// Unknown or already evicted ids are ignored.
    pub async fn unregister(&self, id: ClientId) -> Result<()> {
        self.unregister_tx.send(id).await?;
        Ok(())
    }

    /// Submit a message for delivery to every client tracked when the
    /// registry processes it.
    pub async fn broadcast(&self, message: Message) -> Result<()> {
        self.broadcast_tx.send(message).await?;
        Ok(())
    }

    /// Number of clients currently tracked
    pub fn connected(&self) -> usize {
        *self.connected_rx.borrow()
    }

    /// Watch the number of tracked clients
    pub fn subscribe_connected(&self) -> watch::Receiver<usize> {
        self.connected_rx.clone()
    }
}
