use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use drift_types::events::ClientEvent;

/// Why a delivery did not happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// The client is gone (deregistered, or its receiver was dropped).
    Closed,
    /// The client's queue is full (non-blocking configuration only).
    Full,
}

struct ClientChannel {
    tx: mpsc::Sender<ClientEvent>,
    /// Cancelled on deregistration so a sender blocked on a full queue is
    /// released immediately instead of waiting on a vanished peer.
    gone: CancellationToken,
}

/// Per-client event delivery. One bounded mpsc channel per connected client;
/// the receiving half lives with the client's connection handler (or the
/// test), which makes delivery order directly inspectable.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    capacity: usize,
    blocking: bool,
    channels: RwLock<HashMap<Uuid, ClientChannel>>,
}

impl Dispatcher {
    pub fn new(capacity: usize, blocking: bool) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                capacity,
                blocking,
                channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Create the delivery channel for a new client.
    pub async fn register(&self, client_id: Uuid) -> mpsc::Receiver<ClientEvent> {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let channel = ClientChannel {
            tx,
            gone: CancellationToken::new(),
        };
        self.inner.channels.write().await.insert(client_id, channel);
        rx
    }

    /// Remove a client's channel and release anyone blocked sending into it.
    pub async fn remove(&self, client_id: Uuid) {
        if let Some(channel) = self.inner.channels.write().await.remove(&client_id) {
            channel.gone.cancel();
        }
    }

    /// Deliver one event to one client, preserving per-sender FIFO order.
    /// Blocking mode waits for queue capacity; non-blocking fails fast.
    /// Only relay sends come through here — backpressure belongs to the
    /// sender, never to the engine's own bookkeeping.
    pub async fn deliver(
        &self,
        client_id: Uuid,
        event: ClientEvent,
    ) -> Result<(), DeliveryError> {
        if !self.inner.blocking {
            return self.try_deliver(client_id, event).await;
        }

        // Clone the sender so no lock is held across the await below.
        let (tx, gone) = {
            let channels = self.inner.channels.read().await;
            match channels.get(&client_id) {
                Some(c) => (c.tx.clone(), c.gone.clone()),
                None => return Err(DeliveryError::Closed),
            }
        };

        tokio::select! {
            res = tx.send(event) => res.map_err(|_| DeliveryError::Closed),
            _ = gone.cancelled() => Err(DeliveryError::Closed),
        }
    }

    /// Deliver without ever waiting for capacity, regardless of the
    /// blocking configuration. Lifecycle events (Matched, PartnerLeft,
    /// SessionEnded) use this so a client that stopped draining its queue
    /// cannot stall matchmaking or another member's skip/report/disconnect.
    pub async fn try_deliver(
        &self,
        client_id: Uuid,
        event: ClientEvent,
    ) -> Result<(), DeliveryError> {
        let tx = {
            let channels = self.inner.channels.read().await;
            match channels.get(&client_id) {
                Some(c) => c.tx.clone(),
                None => return Err(DeliveryError::Closed),
            }
        };

        tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deliver_to_unknown_client_is_closed() {
        let dispatcher = Dispatcher::new(4, true);
        let err = dispatcher
            .deliver(Uuid::new_v4(), ClientEvent::SessionEnded { session_id: Uuid::new_v4() })
            .await
            .unwrap_err();
        assert_eq!(err, DeliveryError::Closed);
    }

    #[tokio::test]
    async fn nonblocking_overflow() {
        let dispatcher = Dispatcher::new(1, false);
        let id = Uuid::new_v4();
        let _rx = dispatcher.register(id).await;

        let ev = ClientEvent::SessionEnded { session_id: Uuid::new_v4() };
        dispatcher.deliver(id, ev.clone()).await.unwrap();
        let err = dispatcher.deliver(id, ev).await.unwrap_err();
        assert_eq!(err, DeliveryError::Full);
    }

    #[tokio::test]
    async fn remove_releases_blocked_sender() {
        let dispatcher = Dispatcher::new(1, true);
        let id = Uuid::new_v4();
        // Receiver kept alive but never drained: the second send must block
        // until remove() cancels it.
        let _rx = dispatcher.register(id).await;

        let ev = ClientEvent::SessionEnded { session_id: Uuid::new_v4() };
        dispatcher.deliver(id, ev.clone()).await.unwrap();

        let d2 = dispatcher.clone();
        let ev2 = ev.clone();
        let blocked = tokio::spawn(async move { d2.deliver(id, ev2).await });

        tokio::task::yield_now().await;
        dispatcher.remove(id).await;

        let res = blocked.await.unwrap();
        assert_eq!(res.unwrap_err(), DeliveryError::Closed);
    }
}
