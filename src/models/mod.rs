//! Model capability trait, per-model configuration and the concrete model
//! variants hosted by this reference node.
pub mod onoff;
pub mod vendor;

use crate::access::ModelIdentifier;
use crate::address::{Address, GroupAddress, UnicastAddress};
use crate::mesh::AppKeyIndex;
use crate::router::KeyHandle;
use crate::uuid::DeviceUuid;
use core::time::Duration;
use std::path::PathBuf;

/// A group address or label a model listens to beyond its unicast address.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, serde::Serialize, serde::Deserialize)]
pub enum Subscription {
    Group(GroupAddress),
    Label(DeviceUuid),
}

/// Per-model configuration pushed by the management service after attach.
#[derive(Clone, Eq, PartialEq, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct ModelConfig {
    pub bindings: Vec<AppKeyIndex>,
    /// Publication period in milliseconds. `0` disables publication.
    pub publication_period_ms: u32,
    pub subscriptions: Vec<Subscription>,
}

/// A configuration-update event. Fields are replaced wholesale: every field
/// present here overwrites the stored field, absent fields are untouched.
/// The field names follow the management service's configuration map keys.
#[derive(Clone, Eq, PartialEq, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct ModelConfigUpdate {
    #[serde(rename = "Bindings", default, skip_serializing_if = "Option::is_none")]
    pub bindings: Option<Vec<AppKeyIndex>>,
    #[serde(
        rename = "PublicationPeriod",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub publication_period_ms: Option<u32>,
    #[serde(
        rename = "Subscriptions",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub subscriptions: Option<Vec<Subscription>>,
}

/// A message a model wants sent in response to inbound traffic. Models never
/// talk to the management service directly; replies are collected by the
/// element and handed to the node's sender.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Outbound {
    pub destination: Address,
    pub app_index: AppKeyIndex,
    pub payload: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("no scan report available at {path:?}")]
    NoScanData { path: PathBuf },
    #[error("scan report unreadable: {0}")]
    ScanIo(#[from] std::io::Error),
    #[error("scan report encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Polymorphic model capability. Concrete variants override the methods they
/// care about; the defaults store configuration and publish nothing.
pub trait Model: Send {
    fn identifier(&self) -> ModelIdentifier;
    fn config(&self) -> &ModelConfig;
    fn config_mut(&mut self) -> &mut ModelConfig;

    /// Handles one inbound message. Every model on an element sees every
    /// message addressed to that element; each model decides independently
    /// whether to act. Returns any replies to send.
    fn process_message(
        &mut self,
        _source: UnicastAddress,
        _destination: &Address,
        _key: KeyHandle,
        _payload: &[u8],
    ) -> Vec<Outbound> {
        Vec::new()
    }

    /// Replaces stored configuration with every field present in `update`.
    fn apply_config(&mut self, update: &ModelConfigUpdate) -> Result<(), ModelError> {
        if let Some(bindings) = &update.bindings {
            self.config_mut().bindings = bindings.clone();
        }
        if let Some(subscriptions) = &update.subscriptions {
            self.config_mut().subscriptions = subscriptions.clone();
        }
        if let Some(period) = update.publication_period_ms {
            self.set_publication_period(period)?;
        }
        Ok(())
    }

    /// Stores a new publication period. Variants may reject a period or
    /// prepare publication state here.
    fn set_publication_period(&mut self, period_ms: u32) -> Result<(), ModelError> {
        self.config_mut().publication_period_ms = period_ms;
        Ok(())
    }

    /// The period the publication timer should run at, or `None` when this
    /// model should not publish.
    fn publication_period(&self) -> Option<Duration> {
        match self.config().publication_period_ms {
            0 => None,
            ms => Some(Duration::from_millis(u64::from(ms))),
        }
    }

    /// Produces the next publication payload. `Ok(None)` means nothing to
    /// publish this tick.
    fn publish_payload(&mut self) -> Result<Option<Vec<u8>>, ModelError> {
        Ok(None)
    }
}
