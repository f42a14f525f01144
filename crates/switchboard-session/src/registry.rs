//! Peer session registry: routes peer-to-peer traffic between
//! conversations and the peer manager.
//!
//! Direct transfers (files, display pictures) are negotiated over P2P
//! messages tunnelled through a conversation. Two directions exist:
//!
//! ```text
//!              deliver() ──▶ PeerInput channel ──▶ peer manager
//! conversation
//!              ◀── PeerRoute ◀── forward(cid) ◀── peer manager
//! ```
//!
//! A conversation registers a route under its id once it has peers, and
//! unregisters when it loses them. The peer manager only ever sees
//! [`PeerInput`]s and only ever calls [`PeerRegistry::forward`].

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use switchboard_protocol::{ChatMessage, ConversationId};
use tokio::sync::mpsc;

/// Payload the peer manager wants sent into a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerPayload {
    /// Destination account inside the conversation.
    pub account: String,
    /// Raw P2P body.
    pub payload: Vec<u8>,
}

/// Sender half a conversation registers to receive [`PeerPayload`]s.
pub type PeerRoute = mpsc::UnboundedSender<PeerPayload>;

/// Notifications for the peer manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerInput {
    /// `cid` can now carry peer traffic.
    Registered(ConversationId),
    /// `cid` can no longer carry peer traffic.
    Unregistered(ConversationId),
    /// Inbound P2P data from `account` in conversation `cid`.
    Input {
        cid: ConversationId,
        account: String,
        message: ChatMessage,
    },
}

/// Concurrency-safe map from conversation id to route.
///
/// Cloning is cheap and every clone shares the same map. Lookups take a
/// read lock, so a `register` that has returned is always visible to a
/// later `forward` from any thread.
#[derive(Debug, Clone)]
pub struct PeerRegistry {
    routes: Arc<RwLock<HashMap<ConversationId, PeerRoute>>>,
    input: mpsc::UnboundedSender<PeerInput>,
}

impl PeerRegistry {
    /// Creates an empty registry and the receiver the peer manager reads.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PeerInput>) {
        let (input, rx) = mpsc::unbounded_channel();
        let registry = Self {
            routes: Arc::new(RwLock::new(HashMap::new())),
            input,
        };
        (registry, rx)
    }

    /// Registers (or replaces) the route for `cid`.
    pub fn register(&self, cid: ConversationId, route: PeerRoute) {
        let replaced = self
            .routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(cid, route)
            .is_some();
        tracing::debug!(%cid, replaced, "peer route registered");
        self.notify(PeerInput::Registered(cid));
    }

    /// Removes the route for `cid`. Returns `false` if none was registered.
    pub fn unregister(&self, cid: ConversationId) -> bool {
        let removed = self
            .routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&cid)
            .is_some();
        if removed {
            tracing::debug!(%cid, "peer route unregistered");
            self.notify(PeerInput::Unregistered(cid));
        }
        removed
    }

    /// Returns `true` if `cid` has a route.
    pub fn is_registered(&self, cid: ConversationId) -> bool {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&cid)
    }

    /// Number of registered conversations.
    pub fn len(&self) -> usize {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sends `payload` for `account` into conversation `cid`.
    ///
    /// Returns `false` (and drops the payload) if `cid` is unknown or its
    /// conversation has gone away.
    pub fn forward(
        &self,
        cid: ConversationId,
        account: impl Into<String>,
        payload: Vec<u8>,
    ) -> bool {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        let Some(route) = routes.get(&cid) else {
            tracing::debug!(%cid, "no peer route, payload dropped");
            return false;
        };
        route
            .send(PeerPayload {
                account: account.into(),
                payload,
            })
            .is_ok()
    }

    /// Hands inbound P2P data from conversation `cid` to the peer manager.
    pub fn deliver(&self, cid: ConversationId, account: impl Into<String>, message: ChatMessage) {
        self.notify(PeerInput::Input {
            cid,
            account: account.into(),
            message,
        });
    }

    fn notify(&self, input: PeerInput) {
        if self.input.send(input).is_err() {
            tracing::debug!("peer manager gone, notification dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_reaches_registered_route() {
        let (registry, mut input) = PeerRegistry::new();
        let (route, mut payloads) = mpsc::unbounded_channel();

        registry.register(ConversationId(1), route);
        assert_eq!(input.try_recv().unwrap(), PeerInput::Registered(ConversationId(1)));

        assert!(registry.forward(ConversationId(1), "bob@example.com", vec![1, 2]));
        assert_eq!(
            payloads.try_recv().unwrap(),
            PeerPayload {
                account: "bob@example.com".into(),
                payload: vec![1, 2],
            }
        );
    }

    #[test]
    fn test_forward_to_unknown_cid_returns_false() {
        let (registry, _input) = PeerRegistry::new();
        assert!(!registry.forward(ConversationId(99), "bob@example.com", vec![]));
    }

    #[test]
    fn test_forward_only_reaches_its_own_conversation() {
        let (registry, _input) = PeerRegistry::new();
        let (route_a, mut rx_a) = mpsc::unbounded_channel();
        let (route_b, mut rx_b) = mpsc::unbounded_channel();
        registry.register(ConversationId(1), route_a);
        registry.register(ConversationId(2), route_b);

        registry.forward(ConversationId(2), "bob@example.com", vec![7]);

        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap().payload, vec![7]);
    }

    #[test]
    fn test_forward_preserves_order_per_cid() {
        let (registry, _input) = PeerRegistry::new();
        let (route, mut rx) = mpsc::unbounded_channel();
        registry.register(ConversationId(1), route);

        for i in 0..5u8 {
            registry.forward(ConversationId(1), "bob@example.com", vec![i]);
        }
        let order: Vec<u8> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|p| p.payload[0])
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_unregister_stops_forwarding() {
        let (registry, mut input) = PeerRegistry::new();
        let (route, _rx) = mpsc::unbounded_channel();
        registry.register(ConversationId(1), route);

        assert!(registry.unregister(ConversationId(1)));
        assert!(!registry.unregister(ConversationId(1)));
        assert!(!registry.forward(ConversationId(1), "bob@example.com", vec![]));
        assert!(registry.is_empty());

        assert_eq!(input.try_recv().unwrap(), PeerInput::Registered(ConversationId(1)));
        assert_eq!(input.try_recv().unwrap(), PeerInput::Unregistered(ConversationId(1)));
        assert!(input.try_recv().is_err());
    }

    #[test]
    fn test_forward_to_dropped_conversation_returns_false() {
        let (registry, _input) = PeerRegistry::new();
        let (route, rx) = mpsc::unbounded_channel();
        registry.register(ConversationId(1), route);
        drop(rx);
        assert!(!registry.forward(ConversationId(1), "bob@example.com", vec![]));
    }

    #[test]
    fn test_deliver_reaches_peer_manager() {
        let (registry, mut input) = PeerRegistry::new();
        let message = ChatMessage::p2p("bob@example.com", "me@example.com", vec![9]);

        registry.deliver(ConversationId(3), "bob@example.com", message.clone());

        assert_eq!(
            input.try_recv().unwrap(),
            PeerInput::Input {
                cid: ConversationId(3),
                account: "bob@example.com".into(),
                message,
            }
        );
    }

    #[test]
    fn test_registration_visible_across_threads() {
        let (registry, _input) = PeerRegistry::new();
        let (route, mut rx) = mpsc::unbounded_channel();

        let writer = registry.clone();
        std::thread::spawn(move || writer.register(ConversationId(5), route))
            .join()
            .unwrap();

        assert!(registry.is_registered(ConversationId(5)));
        assert!(registry.forward(ConversationId(5), "bob@example.com", vec![1]));
        assert!(rx.try_recv().is_ok());
    }
}
