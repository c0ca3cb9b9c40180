//! Node lifecycle: the registration state machine tying the element registry,
//! the management service and the publication timers together.
use crate::access::ModelIdentifier;
use crate::element::{Composition, ElementRegistry, PublicationUpdate};
use crate::interface::{
    AttachReply, ManagementService, NodeEvent, NodeSender, ObjectPath, PublishOptions, SendOptions,
    ServiceError,
};
use crate::mesh::{ElementIndex, ModelId, Token, TokenParseError};
use crate::publication::{PublicationScheduler, PublishError};
use crate::router::MessageRouter;
use crate::uuid::DeviceUuid;
use core::fmt::{self, Display, Formatter};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use slog::{debug, error, info, o, warn, Logger};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Registration states of the node.
///
/// | State        | Meaning                                              |
/// | ------------ | ---------------------------------------------------- |
/// | Unregistered | No relationship with the management service          |
/// | Joining      | Provisioning requested, completion pending           |
/// | Joined       | Token held, node not attached this process lifetime  |
/// | Attached     | Attach requested or granted, configuration pending   |
/// | Configured   | Attached with stored configuration applied           |
/// | Removed      | Node permanently forgotten; token invalid            |
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum NodeState {
    Unregistered,
    Joining,
    Joined,
    Attached,
    Configured,
    Removed,
}
impl Display for NodeState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeState::Unregistered => "unregistered",
            NodeState::Joining => "joining",
            NodeState::Joined => "joined",
            NodeState::Attached => "attached",
            NodeState::Configured => "configured",
            NodeState::Removed => "removed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("operation `{operation}` invalid in state `{state}`")]
    InvalidState {
        operation: &'static str,
        state: NodeState,
    },
    #[error("no token held; join first or supply one")]
    NoToken,
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// What the main loop should do after an event was handled.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum EventOutcome {
    Continue,
    /// The management service endpoint is gone; all timers are already
    /// cancelled and the process should exit.
    Shutdown,
}

/// Owns the node's registration state, its token and every publication
/// timer. All mutation funnels through this type so completion handlers can
/// be guarded against stale results.
pub struct NodeLifecycle<S: ManagementService> {
    service: S,
    sender: Arc<dyn NodeSender>,
    registry: Arc<Mutex<ElementRegistry>>,
    router: MessageRouter,
    schedulers: HashMap<(ElementIndex, ModelId), PublicationScheduler>,
    state: NodeState,
    token: Option<Token>,
    device_uuid: Option<DeviceUuid>,
    app_path: ObjectPath,
    service_path: ObjectPath,
    node_path: Option<ObjectPath>,
    log: Logger,
}
impl<S: ManagementService> NodeLifecycle<S> {
    pub fn new(
        service: S,
        sender: Arc<dyn NodeSender>,
        registry: Arc<Mutex<ElementRegistry>>,
        app_path: ObjectPath,
        service_path: ObjectPath,
        log: Logger,
    ) -> NodeLifecycle<S> {
        let router = MessageRouter::new(registry.clone(), log.new(o!("mod" => "router")));
        NodeLifecycle {
            service,
            sender,
            registry,
            router,
            schedulers: HashMap::new(),
            state: NodeState::Unregistered,
            token: None,
            device_uuid: None,
            app_path,
            service_path,
            node_path: None,
            log,
        }
    }

    #[must_use]
    pub fn state(&self) -> NodeState {
        self.state
    }
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        self.token
    }
    #[must_use]
    pub fn have_token(&self) -> bool {
        self.token.is_some()
    }
    #[must_use]
    pub fn node_path(&self) -> Option<&ObjectPath> {
        self.node_path.as_ref()
    }

    /// Validates and adopts an externally supplied token (command line or
    /// token store). Replaces any token already held.
    pub fn set_token(&mut self, text: &str) -> Result<Token, TokenParseError> {
        let token = text.parse()?;
        self.adopt_token(token);
        Ok(token)
    }
    pub fn adopt_token(&mut self, token: Token) {
        info!(self.log, "token adopted"; "token" => %token);
        self.token = Some(token);
        if self.state == NodeState::Unregistered || self.state == NodeState::Removed {
            self.state = NodeState::Joined;
        }
    }

    #[must_use]
    pub async fn composition(&self) -> Composition {
        self.registry.lock().await.describe_for_registration()
    }

    /// Requests provisioning under a freshly generated device UUID.
    /// Completion arrives later as a join event.
    pub async fn join(&mut self) -> Result<DeviceUuid, LifecycleError> {
        match self.state {
            NodeState::Unregistered | NodeState::Removed => {}
            state => {
                return Err(LifecycleError::InvalidState {
                    operation: "join",
                    state,
                })
            }
        }
        let uuid = DeviceUuid::random();
        info!(self.log, "joining"; "uuid" => %uuid);
        self.service.join(&self.app_path, uuid).await?;
        self.device_uuid = Some(uuid);
        self.state = NodeState::Joining;
        Ok(uuid)
    }

    /// Join completion. Ignored unless a join is actually pending.
    pub fn join_complete(&mut self, token: Token) {
        if self.state != NodeState::Joining {
            warn!(self.log, "stale join completion ignored"; "state" => %self.state);
            return;
        }
        info!(self.log, "join complete"; "token" => %token);
        self.token = Some(token);
        self.state = NodeState::Joined;
    }

    pub fn join_failed(&mut self, reason: &str) {
        if self.state != NodeState::Joining {
            warn!(self.log, "stale join failure ignored"; "state" => %self.state);
            return;
        }
        warn!(self.log, "join failed"; "reason" => reason);
        self.device_uuid = None;
        self.state = NodeState::Unregistered;
    }

    /// Attaches the node under the held token and applies the stored
    /// configuration the service replies with.
    pub async fn attach(&mut self) -> Result<(), LifecycleError> {
        let token = self.token.ok_or(LifecycleError::NoToken)?;
        match self.state {
            NodeState::Joined => {}
            state => {
                return Err(LifecycleError::InvalidState {
                    operation: "attach",
                    state,
                })
            }
        }
        self.state = NodeState::Attached;
        match self.service.attach(&self.app_path, token).await {
            Ok(reply) => {
                self.attach_succeeded(reply).await;
                Ok(())
            }
            Err(err) => {
                self.attach_failed(&err);
                Err(err.into())
            }
        }
    }

    /// Attach completion. A success arriving after the node was removed (or
    /// otherwise left the attach path) is stale and ignored.
    pub async fn attach_succeeded(&mut self, reply: AttachReply) {
        match self.state {
            NodeState::Attached | NodeState::Configured => {}
            state => {
                warn!(self.log, "stale attach completion ignored"; "state" => %state);
                return;
            }
        }
        info!(self.log, "attached"; "node_path" => %reply.node_path);
        self.node_path = Some(reply.node_path);
        let updates = self
            .registry
            .lock()
            .await
            .apply_configuration(&reply.configuration, &self.log);
        for update in updates {
            self.apply_publication_update(update);
        }
        self.state = NodeState::Configured;
    }

    /// Attach failure or later detach report. The token is kept; the node is
    /// merely considered detached.
    pub fn attach_failed(&mut self, err: &ServiceError) {
        match self.state {
            NodeState::Attached | NodeState::Configured => {}
            state => {
                warn!(self.log, "stale attach failure ignored"; "state" => %state);
                return;
            }
        }
        warn!(self.log, "attach failed"; "error" => %err);
        self.node_path = None;
        self.state = NodeState::Joined;
    }

    /// Permanently removes the node from the network. The token is dropped
    /// and every publication timer cancelled.
    pub async fn remove(&mut self) -> Result<(), LifecycleError> {
        let token = self.token.ok_or(LifecycleError::NoToken)?;
        self.service.remove(token).await?;
        self.remove_confirmed();
        Ok(())
    }
    pub fn remove_confirmed(&mut self) {
        info!(self.log, "node removed");
        self.cancel_all_timers();
        self.token = None;
        self.node_path = None;
        self.state = NodeState::Removed;
    }

    /// Handles one service event from the main loop.
    pub async fn handle_event(&mut self, event: NodeEvent) -> EventOutcome {
        match event {
            NodeEvent::MessageReceived(envelope) => {
                let element = envelope.element_index;
                for reply in self.router.route(envelope).await {
                    if let Err(err) = self
                        .sender
                        .send(
                            element,
                            reply.destination,
                            reply.app_index,
                            SendOptions::default(),
                            reply.payload,
                        )
                        .await
                    {
                        warn!(self.log, "reply not sent"; "error" => %err);
                    }
                }
                EventOutcome::Continue
            }
            NodeEvent::UpdateModelConfig {
                element_index,
                model_id,
                config,
            } => {
                let update = self.registry.lock().await.update_model_config(
                    element_index,
                    model_id,
                    &config,
                    &self.log,
                );
                if let Some(update) = update {
                    self.apply_publication_update(update);
                }
                EventOutcome::Continue
            }
            NodeEvent::JoinComplete { token } => {
                self.join_complete(token);
                EventOutcome::Continue
            }
            NodeEvent::JoinFailed { reason } => {
                self.join_failed(&reason);
                EventOutcome::Continue
            }
            NodeEvent::ServiceRemoved { path } => {
                if path == self.service_path {
                    error!(self.log, "management service lost, shutting down");
                    self.shutdown();
                    EventOutcome::Shutdown
                } else {
                    debug!(self.log, "unrelated endpoint removed"; "path" => %path);
                    EventOutcome::Continue
                }
            }
        }
    }

    /// Arms, re-arms or disarms one model's publication timer.
    pub fn apply_publication_update(&mut self, update: PublicationUpdate) {
        let slot = (update.element, update.model.model_id());
        match update.period {
            Some(period) => {
                info!(self.log, "publication armed";
                    "element" => %update.element, "model" => %update.model,
                    "period_ms" => period.as_millis() as u64);
                let timer_log = self.log.new(o!("mod" => "publication"));
                let scheduler = self
                    .schedulers
                    .entry(slot)
                    .or_insert_with(|| PublicationScheduler::new(timer_log));
                // A period change replaces the armed timer.
                scheduler.cancel();
                scheduler.start(
                    period,
                    publish_callback(
                        self.registry.clone(),
                        self.sender.clone(),
                        update.element,
                        update.model,
                    ),
                );
            }
            None => {
                if let Some(mut scheduler) = self.schedulers.remove(&slot) {
                    info!(self.log, "publication disarmed";
                        "element" => %update.element, "model" => %update.model);
                    scheduler.cancel();
                }
            }
        }
    }

    #[must_use]
    pub fn publication_armed(&self, element: ElementIndex, model_id: ModelId) -> bool {
        self.schedulers
            .get(&(element, model_id))
            .map_or(false, PublicationScheduler::is_armed)
    }

    fn cancel_all_timers(&mut self) {
        for scheduler in self.schedulers.values_mut() {
            scheduler.cancel();
        }
        self.schedulers.clear();
    }

    /// Orderly shutdown: cancel every timer. Token and registry stay
    /// untouched so the caller can still persist the token.
    pub fn shutdown(&mut self) {
        self.cancel_all_timers();
    }
}

/// Builds the tick callback for one model's publication timer: produce the
/// model's payload under the registry lock, then publish it.
fn publish_callback(
    registry: Arc<Mutex<ElementRegistry>>,
    sender: Arc<dyn NodeSender>,
    element: ElementIndex,
    model: ModelIdentifier,
) -> impl FnMut() -> BoxFuture<'static, Result<(), PublishError>> + Send + 'static {
    move || {
        let registry = registry.clone();
        let sender = sender.clone();
        async move {
            let payload = {
                let mut registry = registry.lock().await;
                let element_ref = registry
                    .element_mut(element)
                    .ok_or(PublishError::UnknownElement(element))?;
                let model_ref = element_ref
                    .model_mut(model.model_id())
                    .ok_or_else(|| PublishError::UnknownModel(model.model_id()))?;
                model_ref.publish_payload()?
            };
            if let Some(payload) = payload {
                let options = PublishOptions {
                    vendor: model.company_id(),
                };
                sender.publish(element, model, options, payload).await?;
            }
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::element::Element;
    use crate::interface::{ElementConfigEntry, ModelConfigEntry};
    use crate::mesh::AppKeyIndex;
    use crate::models::onoff::{OnOffClient, OnOffServer, GENERIC_ONOFF_STATUS};
    use crate::models::{Model, ModelConfig, ModelConfigUpdate};
    use crate::router::{Envelope, KeyHandle};
    use core::time::Duration;
    use std::sync::Mutex as StdMutex;

    fn log() -> Logger {
        Logger::root(slog::Discard, o!())
    }

    struct TestModel {
        config: ModelConfig,
    }
    impl Model for TestModel {
        fn identifier(&self) -> ModelIdentifier {
            ModelIdentifier::new_sig(ModelId(0x0001))
        }
        fn config(&self) -> &ModelConfig {
            &self.config
        }
        fn config_mut(&mut self) -> &mut ModelConfig {
            &mut self.config
        }
        fn publish_payload(&mut self) -> Result<Option<Vec<u8>>, crate::models::ModelError> {
            Ok(Some(vec![0xAA]))
        }
    }

    struct MockService {
        configuration: Vec<ElementConfigEntry>,
    }
    impl MockService {
        fn new() -> MockService {
            MockService {
                configuration: Vec::new(),
            }
        }
        fn with_configuration(configuration: Vec<ElementConfigEntry>) -> MockService {
            MockService { configuration }
        }
    }
    impl ManagementService for MockService {
        fn join(
            &self,
            _app_path: &ObjectPath,
            _uuid: DeviceUuid,
        ) -> BoxFuture<'static, Result<(), ServiceError>> {
            futures_util::future::ready(Ok(())).boxed()
        }
        fn attach(
            &self,
            _app_path: &ObjectPath,
            _token: Token,
        ) -> BoxFuture<'static, Result<AttachReply, ServiceError>> {
            futures_util::future::ready(Ok(AttachReply {
                node_path: ObjectPath::new("/org/mesh/node0"),
                configuration: self.configuration.clone(),
            }))
            .boxed()
        }
        fn remove(&self, _token: Token) -> BoxFuture<'static, Result<(), ServiceError>> {
            futures_util::future::ready(Ok(())).boxed()
        }
    }

    #[derive(Default)]
    struct MockSender {
        published: StdMutex<Vec<(ElementIndex, ModelIdentifier, Vec<u8>)>>,
        sent: StdMutex<Vec<(ElementIndex, Address, AppKeyIndex, Vec<u8>)>>,
    }
    impl NodeSender for MockSender {
        fn publish(
            &self,
            element: ElementIndex,
            model: ModelIdentifier,
            _options: PublishOptions,
            payload: Vec<u8>,
        ) -> BoxFuture<'static, Result<(), ServiceError>> {
            self.published.lock().unwrap().push((element, model, payload));
            futures_util::future::ready(Ok(())).boxed()
        }
        fn send(
            &self,
            element: ElementIndex,
            destination: Address,
            app_index: AppKeyIndex,
            _options: SendOptions,
            payload: Vec<u8>,
        ) -> BoxFuture<'static, Result<(), ServiceError>> {
            self.sent
                .lock()
                .unwrap()
                .push((element, destination, app_index, payload));
            futures_util::future::ready(Ok(())).boxed()
        }
    }

    fn registry_with_test_model() -> Arc<Mutex<ElementRegistry>> {
        let mut element = Element::new(ElementIndex(0));
        element.add_model(Box::new(TestModel {
            config: ModelConfig::default(),
        }));
        let mut registry = ElementRegistry::new();
        registry.add_element(element).unwrap();
        Arc::new(Mutex::new(registry))
    }

    fn lifecycle(
        service: MockService,
        registry: Arc<Mutex<ElementRegistry>>,
    ) -> (NodeLifecycle<MockService>, Arc<MockSender>) {
        let sender = Arc::new(MockSender::default());
        let lifecycle = NodeLifecycle::new(
            service,
            sender.clone(),
            registry,
            ObjectPath::new("/org/mesh/app"),
            ObjectPath::new(":1.42"),
            log(),
        );
        (lifecycle, sender)
    }

    #[tokio::test]
    async fn test_join_completion_yields_joined_with_token() {
        let (mut node, _) = lifecycle(MockService::new(), registry_with_test_model());
        node.join().await.unwrap();
        assert_eq!(node.state(), NodeState::Joining);
        let outcome = node
            .handle_event(NodeEvent::JoinComplete {
                token: Token::new(0x1122_3344_5566_7788),
            })
            .await;
        assert_eq!(outcome, EventOutcome::Continue);
        assert_eq!(node.state(), NodeState::Joined);
        assert_eq!(node.token().unwrap().to_string(), "1122334455667788");
    }

    #[tokio::test]
    async fn test_bad_token_is_rejected_locally() {
        let (mut node, _) = lifecycle(MockService::new(), registry_with_test_model());
        assert!(node.set_token("112233445566778").is_err());
        assert!(node.set_token("112233445566778g").is_err());
        assert!(!node.have_token());
        assert_eq!(node.state(), NodeState::Unregistered);
    }

    #[tokio::test]
    async fn test_join_refused_in_joined_state() {
        let (mut node, _) = lifecycle(MockService::new(), registry_with_test_model());
        node.set_token("1122334455667788").unwrap();
        assert!(matches!(
            node.join().await,
            Err(LifecycleError::InvalidState {
                operation: "join",
                ..
            })
        ));
    }

    fn one_model_configuration(period_ms: u32) -> Vec<ElementConfigEntry> {
        vec![ElementConfigEntry {
            element_index: ElementIndex(0),
            models: vec![ModelConfigEntry {
                model_id: ModelId(0x0001),
                config: ModelConfigUpdate {
                    bindings: Some(vec![AppKeyIndex(0)]),
                    publication_period_ms: Some(period_ms),
                    subscriptions: Some(Vec::new()),
                },
            }],
        }]
    }

    #[tokio::test]
    async fn test_attach_applies_config_and_arms_publication() {
        let registry = registry_with_test_model();
        let (mut node, sender) = lifecycle(
            MockService::with_configuration(one_model_configuration(20)),
            registry.clone(),
        );
        node.set_token("1122334455667788").unwrap();
        node.attach().await.unwrap();
        assert_eq!(node.state(), NodeState::Configured);
        assert!(node.publication_armed(ElementIndex(0), ModelId(0x0001)));
        {
            let registry = registry.lock().await;
            let model = registry
                .element(ElementIndex(0))
                .unwrap()
                .model(ModelId(0x0001))
                .unwrap();
            assert_eq!(model.config().bindings, vec![AppKeyIndex(0)]);
        }
        tokio::time::sleep(Duration::from_millis(70)).await;
        let published = sender.published.lock().unwrap();
        assert!(!published.is_empty());
        assert_eq!(published[0].2, vec![0xAA]);
    }

    #[tokio::test]
    async fn test_remove_drops_token_and_cancels_timers() {
        let (mut node, _) = lifecycle(
            MockService::with_configuration(one_model_configuration(20)),
            registry_with_test_model(),
        );
        node.set_token("1122334455667788").unwrap();
        node.attach().await.unwrap();
        assert!(node.publication_armed(ElementIndex(0), ModelId(0x0001)));
        node.remove().await.unwrap();
        assert_eq!(node.state(), NodeState::Removed);
        assert!(!node.have_token());
        assert!(!node.publication_armed(ElementIndex(0), ModelId(0x0001)));
        // Removing again has no token to remove with.
        assert!(matches!(node.remove().await, Err(LifecycleError::NoToken)));
    }

    #[tokio::test]
    async fn test_stale_attach_success_after_remove_is_ignored() {
        let (mut node, _) = lifecycle(MockService::new(), registry_with_test_model());
        node.set_token("1122334455667788").unwrap();
        node.remove().await.unwrap();
        node.attach_succeeded(AttachReply {
            node_path: ObjectPath::new("/org/mesh/node0"),
            configuration: one_model_configuration(20),
        })
        .await;
        assert_eq!(node.state(), NodeState::Removed);
        assert!(node.node_path().is_none());
        assert!(!node.publication_armed(ElementIndex(0), ModelId(0x0001)));
    }

    #[tokio::test]
    async fn test_received_message_replies_through_sender() {
        let mut element = Element::new(ElementIndex(0));
        element.add_model(Box::new(OnOffServer::new(log())));
        let mut registry = ElementRegistry::new();
        registry.add_element(element).unwrap();
        let (mut node, sender) =
            lifecycle(MockService::new(), Arc::new(Mutex::new(registry)));
        let outcome = node
            .handle_event(NodeEvent::MessageReceived(Envelope {
                element_index: ElementIndex(0),
                source: crate::address::UnicastAddress::new(0x0042),
                key: KeyHandle::App(AppKeyIndex(0)),
                destination: Address::Unassigned,
                payload: OnOffClient::get_message(),
            }))
            .await;
        assert_eq!(outcome, EventOutcome::Continue);
        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (element, destination, app_index, payload) = &sent[0];
        assert_eq!(*element, ElementIndex(0));
        assert_eq!(
            *destination,
            Address::Unicast(crate::address::UnicastAddress::new(0x0042))
        );
        assert_eq!(*app_index, AppKeyIndex(0));
        assert_eq!(&payload[..2], &GENERIC_ONOFF_STATUS.0.to_be_bytes());
    }

    #[tokio::test]
    async fn test_config_update_disarms_with_zero_period() {
        let (mut node, _) = lifecycle(
            MockService::with_configuration(one_model_configuration(20)),
            registry_with_test_model(),
        );
        node.set_token("1122334455667788").unwrap();
        node.attach().await.unwrap();
        assert!(node.publication_armed(ElementIndex(0), ModelId(0x0001)));
        node.handle_event(NodeEvent::UpdateModelConfig {
            element_index: ElementIndex(0),
            model_id: ModelId(0x0001),
            config: ModelConfigUpdate {
                publication_period_ms: Some(0),
                ..ModelConfigUpdate::default()
            },
        })
        .await;
        assert!(!node.publication_armed(ElementIndex(0), ModelId(0x0001)));
    }

    #[tokio::test]
    async fn test_service_loss_shuts_down() {
        let (mut node, _) = lifecycle(
            MockService::with_configuration(one_model_configuration(20)),
            registry_with_test_model(),
        );
        node.set_token("1122334455667788").unwrap();
        node.attach().await.unwrap();
        let unrelated = node
            .handle_event(NodeEvent::ServiceRemoved {
                path: ObjectPath::new(":1.99"),
            })
            .await;
        assert_eq!(unrelated, EventOutcome::Continue);
        assert!(node.publication_armed(ElementIndex(0), ModelId(0x0001)));
        let outcome = node
            .handle_event(NodeEvent::ServiceRemoved {
                path: ObjectPath::new(":1.42"),
            })
            .await;
        assert_eq!(outcome, EventOutcome::Shutdown);
        assert!(!node.publication_armed(ElementIndex(0), ModelId(0x0001)));
        // Token survives shutdown so it can be persisted on exit.
        assert!(node.have_token());
    }
}
