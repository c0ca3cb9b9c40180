//! Abstract interfaces to the external network-management service.
//!
//! Outbound requests (`Join`, `Attach`, `Remove`, `Publish`, `Send`) are
//! plain async calls; the service's callbacks onto the registered node
//! object arrive as [`NodeEvent`]s on a channel consumed by the main loop.
use crate::address::Address;
use crate::mesh::{AppKeyIndex, CompanyId, ElementIndex, ModelId, Token};
use crate::models::ModelConfigUpdate;
use crate::router::Envelope;
use crate::uuid::DeviceUuid;
use crate::access::ModelIdentifier;
use core::fmt::{self, Display, Formatter};
use futures_util::future::BoxFuture;

/// Object path identifying an application, node or service endpoint on the
/// management bus.
#[derive(Clone, Eq, PartialEq, Hash, Debug, serde::Serialize, serde::Deserialize)]
pub struct ObjectPath(pub String);
impl ObjectPath {
    #[must_use]
    pub fn new(path: impl Into<String>) -> ObjectPath {
        ObjectPath(path.into())
    }
}
impl Display for ObjectPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Asynchronous failure reported by the management service. Never fatal to
/// the node; the lifecycle falls back to the documented prior state.
#[derive(Clone, Eq, PartialEq, Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("management service refused: {0}")]
    Refused(String),
    #[error("management service unreachable")]
    Disconnected,
}

/// Per-model configuration delivered for one element after attach.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ModelConfigEntry {
    pub model_id: ModelId,
    pub config: ModelConfigUpdate,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ElementConfigEntry {
    pub element_index: ElementIndex,
    pub models: Vec<ModelConfigEntry>,
}

/// Successful attach reply: the node object path plus the stored element
/// configuration to fan out.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct AttachReply {
    pub node_path: ObjectPath,
    pub configuration: Vec<ElementConfigEntry>,
}

/// Options attached to a publication. The vendor option mirrors the
/// company qualifier of vendor-model publications.
#[derive(Copy, Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct PublishOptions {
    #[serde(rename = "Vendor", default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<CompanyId>,
}

#[derive(Copy, Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct SendOptions {
    #[serde(rename = "ForceSegmented")]
    pub force_segmented: bool,
}
impl Default for SendOptions {
    fn default() -> SendOptions {
        SendOptions {
            force_segmented: true,
        }
    }
}

/// The management daemon's network interface, as seen by this node. All
/// calls are asynchronous; no call is ever retried automatically.
pub trait ManagementService: Send + Sync {
    /// Requests provisioning of this application as a new node. Completion
    /// arrives later as [`NodeEvent::JoinComplete`] or
    /// [`NodeEvent::JoinFailed`].
    fn join(
        &self,
        app_path: &ObjectPath,
        uuid: DeviceUuid,
    ) -> BoxFuture<'static, Result<(), ServiceError>>;
    /// Attaches an already-provisioned node for this process lifetime.
    fn attach(
        &self,
        app_path: &ObjectPath,
        token: Token,
    ) -> BoxFuture<'static, Result<AttachReply, ServiceError>>;
    /// Permanently forgets the node; the token is invalid afterwards.
    fn remove(&self, token: Token) -> BoxFuture<'static, Result<(), ServiceError>>;
}
impl<S: ManagementService + ?Sized> ManagementService for std::sync::Arc<S> {
    fn join(
        &self,
        app_path: &ObjectPath,
        uuid: DeviceUuid,
    ) -> BoxFuture<'static, Result<(), ServiceError>> {
        S::join(self, app_path, uuid)
    }
    fn attach(
        &self,
        app_path: &ObjectPath,
        token: Token,
    ) -> BoxFuture<'static, Result<AttachReply, ServiceError>> {
        S::attach(self, app_path, token)
    }
    fn remove(&self, token: Token) -> BoxFuture<'static, Result<(), ServiceError>> {
        S::remove(self, token)
    }
}

/// Outbound operations against the attached node object.
pub trait NodeSender: Send + Sync {
    fn publish(
        &self,
        element: ElementIndex,
        model: ModelIdentifier,
        options: PublishOptions,
        payload: Vec<u8>,
    ) -> BoxFuture<'static, Result<(), ServiceError>>;
    fn send(
        &self,
        element: ElementIndex,
        destination: Address,
        app_index: AppKeyIndex,
        options: SendOptions,
        payload: Vec<u8>,
    ) -> BoxFuture<'static, Result<(), ServiceError>>;
}

/// Callbacks the management service delivers to the registered node object,
/// redelivered to the main loop over a channel.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NodeEvent {
    MessageReceived(Envelope),
    UpdateModelConfig {
        element_index: ElementIndex,
        model_id: ModelId,
        config: ModelConfigUpdate,
    },
    JoinComplete {
        token: Token,
    },
    JoinFailed {
        reason: String,
    },
    /// The service endpoint named by `path` disappeared from the bus.
    ServiceRemoved {
        path: ObjectPath,
    },
}
