//! Inbound message envelopes and their dispatch into the element registry.
use crate::address::{Address, UnicastAddress};
use crate::element::ElementRegistry;
use crate::mesh::{AppKeyIndex, ElementIndex};
use crate::models::Outbound;
use slog::{debug, warn, Logger};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Which key decoded an inbound message: the node's device key or one of the
/// bound application keys.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, serde::Serialize, serde::Deserialize)]
pub enum KeyHandle {
    Device,
    App(AppKeyIndex),
}

/// One inbound addressed message as delivered by the transport collaborator.
/// The element index is carried alongside the envelope by the transport, not
/// parsed out of the payload.
#[derive(Clone, Eq, PartialEq, Debug, serde::Serialize, serde::Deserialize)]
pub struct Envelope {
    pub element_index: ElementIndex,
    pub source: UnicastAddress,
    pub key: KeyHandle,
    pub destination: Address,
    pub payload: Vec<u8>,
}

/// Dispatches envelopes to the owning element. A message for an unknown
/// element is a routing miss: logged and dropped, never fatal.
pub struct MessageRouter {
    registry: Arc<Mutex<ElementRegistry>>,
    log: Logger,
}
impl MessageRouter {
    #[must_use]
    pub fn new(registry: Arc<Mutex<ElementRegistry>>, log: Logger) -> MessageRouter {
        MessageRouter { registry, log }
    }
    /// Routes one envelope, returning whatever replies the element's models
    /// produced.
    pub async fn route(&self, envelope: Envelope) -> Vec<Outbound> {
        let mut registry = self.registry.lock().await;
        match registry.element_mut(envelope.element_index) {
            Some(element) => {
                debug!(self.log, "message received";
                    "element" => %envelope.element_index,
                    "source" => %u16::from(envelope.source),
                    "destination" => %envelope.destination,
                );
                element.route_message(
                    envelope.source,
                    envelope.key,
                    &envelope.destination,
                    &envelope.payload,
                )
            }
            None => {
                warn!(self.log, "message for unknown element dropped";
                    "element" => %envelope.element_index);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;
    use slog::o;

    fn log() -> Logger {
        Logger::root(slog::Discard, o!())
    }

    #[tokio::test]
    async fn test_unknown_element_is_a_miss_not_a_panic() {
        let mut registry = ElementRegistry::new();
        registry.add_element(Element::new(ElementIndex(0))).unwrap();
        let router = MessageRouter::new(Arc::new(Mutex::new(registry)), log());
        let outbound = router
            .route(Envelope {
                element_index: ElementIndex(7),
                source: UnicastAddress::new(0x0042),
                key: KeyHandle::App(AppKeyIndex(0)),
                destination: Address::Unassigned,
                payload: vec![0x00],
            })
            .await;
        assert!(outbound.is_empty());
    }

    #[test]
    fn test_envelope_roundtrip() {
        let envelope = Envelope {
            element_index: ElementIndex(1),
            source: UnicastAddress::new(0x0100),
            key: KeyHandle::Device,
            destination: Address::Group(crate::address::GroupAddress::all_nodes()),
            payload: vec![0x82, 0x01],
        };
        let json = serde_json::to_string(&envelope).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, envelope);
    }
}
