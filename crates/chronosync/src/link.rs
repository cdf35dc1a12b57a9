//! Network links.
//!
//! A [`Link`] connects a node to a broadcast medium. Requests are broadcast
//! to every other node; responses go back to the node the request came from.
//! The sender's [`ChannelId`] is the channel a reply must be sent on.

use async_trait::async_trait;

use chronosync_core::{ChannelId, Request, Response, TransportError};

/// A packet on the wire.
#[derive(Debug, Clone)]
pub enum Packet {
    Request(Request),
    Response(Response),
}

/// Link abstraction used by the hosted node.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Link: Send + Sync {
    /// This end's address. Peers reply to it.
    fn local_id(&self) -> ChannelId;

    /// Send a packet to one peer.
    async fn send(&self, to: ChannelId, packet: Packet) -> Result<(), TransportError>;

    /// Send a packet to every other peer.
    async fn broadcast(&self, packet: Packet) -> Result<(), TransportError>;

    /// Receive the next packet and its sender. `None` once the link is closed.
    async fn recv(&self) -> Option<(ChannelId, Packet)>;
}

/// An in-memory broadcast network for tests and demos.
///
/// Uses channels to simulate packet delivery between nodes in one process.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use tokio::sync::{mpsc, Mutex, RwLock};

    #[derive(Debug)]
    struct Envelope {
        from: ChannelId,
        packet: Packet,
    }

    /// Shared state of the memory network.
    pub struct MemoryNetwork {
        /// Inbox of every connected link.
        senders: RwLock<HashMap<ChannelId, mpsc::Sender<Envelope>>>,
        next_id: AtomicU64,
    }

    impl MemoryNetwork {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Connect a new link with a fresh address.
        pub async fn connect(self: &Arc<Self>) -> MemoryLink {
            let id = ChannelId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
            let (tx, rx) = mpsc::channel(1000);
            self.senders.write().await.insert(id, tx);

            MemoryLink {
                id,
                network: Arc::clone(self),
                receiver: Mutex::new(rx),
            }
        }

        /// Remove a link. Packets sent to it afterwards fail.
        pub async fn disconnect(&self, id: ChannelId) {
            self.senders.write().await.remove(&id);
        }

        pub async fn link_count(&self) -> usize {
            self.senders.read().await.len()
        }
    }

    impl Default for MemoryNetwork {
        fn default() -> Self {
            Self {
                senders: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }
        }
    }

    /// One end of the memory network.
    pub struct MemoryLink {
        id: ChannelId,
        network: Arc<MemoryNetwork>,
        receiver: Mutex<mpsc::Receiver<Envelope>>,
    }

    #[async_trait]
    impl Link for MemoryLink {
        fn local_id(&self) -> ChannelId {
            self.id
        }

        async fn send(&self, to: ChannelId, packet: Packet) -> Result<(), TransportError> {
            let senders = self.network.senders.read().await;
            let sender = senders.get(&to).ok_or(TransportError::ChannelClosed(to.0))?;
            sender
                .send(Envelope {
                    from: self.id,
                    packet,
                })
                .await
                .map_err(|_| TransportError::ChannelClosed(to.0))
        }

        async fn broadcast(&self, packet: Packet) -> Result<(), TransportError> {
            let senders = self.network.senders.read().await;
            for (peer, sender) in senders.iter() {
                if *peer != self.id {
                    // Peers that went away simply miss the packet.
                    let _ = sender
                        .send(Envelope {
                            from: self.id,
                            packet: packet.clone(),
                        })
                        .await;
                }
            }
            Ok(())
        }

        async fn recv(&self) -> Option<(ChannelId, Packet)> {
            let mut rx = self.receiver.lock().await;
            rx.recv().await.map(|e| (e.from, e.packet))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryNetwork;
    use super::*;

    fn request(uri: &str) -> Packet {
        Packet::Request(Request::new(uri.parse().unwrap()))
    }

    #[tokio::test]
    async fn test_memory_link_send_recv() {
        let network = MemoryNetwork::new();
        let a = network.connect().await;
        let b = network.connect().await;

        let response = Response::new("/x/1".parse().unwrap(), &b"hi"[..]);
        a.send(b.local_id(), Packet::Response(response.clone()))
            .await
            .unwrap();

        let (from, packet) = b.recv().await.unwrap();
        assert_eq!(from, a.local_id());
        match packet {
            Packet::Response(received) => assert_eq!(received, response),
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_memory_link_broadcast_skips_sender() {
        let network = MemoryNetwork::new();
        let a = network.connect().await;
        let b = network.connect().await;
        let c = network.connect().await;

        a.broadcast(request("/sync/00")).await.unwrap();

        assert_eq!(b.recv().await.unwrap().0, a.local_id());
        assert_eq!(c.recv().await.unwrap().0, a.local_id());
        assert_eq!(network.link_count().await, 3);
    }

    #[tokio::test]
    async fn test_send_to_disconnected_peer_fails() {
        let network = MemoryNetwork::new();
        let a = network.connect().await;
        let b = network.connect().await;
        network.disconnect(b.local_id()).await;

        let err = a.send(b.local_id(), request("/x")).await.unwrap_err();
        assert_eq!(err, TransportError::ChannelClosed(b.local_id().0));
    }
}
