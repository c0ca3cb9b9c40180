//! JSON-lines TCP transport to the mesh management daemon.
//!
//! Requests carry a numeric `id` and complete through the matching response
//! line; lines without an `id` are unsolicited service events. Losing the
//! connection is losing the service endpoint: every pending request fails
//! and a `ServiceRemoved` event is queued for the main loop.
use mesh_node::element::Composition;
use mesh_node::interface::{
    AttachReply, ManagementService, NodeEvent, NodeSender, ObjectPath, PublishOptions, SendOptions,
    ServiceError,
};
use mesh_node::address::Address;
use mesh_node::mesh::{AppKeyIndex, ElementIndex, Token};
use mesh_node::access::ModelIdentifier;
use mesh_node::uuid::DeviceUuid;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use slog::{debug, warn, Logger};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<serde_json::Value, ServiceError>>>>>;

/// Client side of the daemon connection. Implements both service traits so
/// the lifecycle can drive it directly.
pub struct DaemonClient {
    service_path: ObjectPath,
    composition: Composition,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    pending: Pending,
    next_id: AtomicU64,
}
impl DaemonClient {
    /// Connects and spawns the reader task feeding `events`.
    pub async fn connect(
        addr: &str,
        composition: Composition,
        events: mpsc::UnboundedSender<NodeEvent>,
        log: Logger,
    ) -> std::io::Result<Arc<DaemonClient>> {
        let stream = TcpStream::connect(addr).await?;
        let (read, write) = stream.into_split();
        let service_path = ObjectPath::new(addr);
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        tokio::spawn(reader_loop(
            read,
            pending.clone(),
            events,
            service_path.clone(),
            log,
        ));
        Ok(Arc::new(DaemonClient {
            service_path,
            composition,
            writer: Arc::new(Mutex::new(write)),
            pending,
            next_id: AtomicU64::new(0),
        }))
    }
    #[must_use]
    pub fn service_path(&self) -> &ObjectPath {
        &self.service_path
    }

    fn call(
        &self,
        method: &'static str,
        params: serde_json::Value,
    ) -> BoxFuture<'static, Result<serde_json::Value, ServiceError>> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let line = serde_json::json!({ "id": id, "method": method, "params": params }).to_string();
        let writer = self.writer.clone();
        let pending = self.pending.clone();
        async move {
            let (tx, rx) = oneshot::channel();
            pending.lock().await.insert(id, tx);
            {
                let mut writer = writer.lock().await;
                let written = writer.write_all(line.as_bytes()).await;
                let newline = writer.write_all(b"\n").await;
                if written.is_err() || newline.is_err() {
                    pending.lock().await.remove(&id);
                    return Err(ServiceError::Disconnected);
                }
            }
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(ServiceError::Disconnected),
            }
        }
        .boxed()
    }
}

async fn reader_loop(
    read: OwnedReadHalf,
    pending: Pending,
    events: mpsc::UnboundedSender<NodeEvent>,
    service_path: ObjectPath,
    log: Logger,
) {
    let mut lines = BufReader::new(read).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => break,
        };
        let value: serde_json::Value = match serde_json::from_str(&line) {
            Ok(value) => value,
            Err(err) => {
                warn!(log, "unparseable daemon line dropped"; "error" => %err);
                continue;
            }
        };
        if let Some(id) = value.get("id").and_then(serde_json::Value::as_u64) {
            let result = match value.get("error").and_then(serde_json::Value::as_str) {
                Some(message) => Err(ServiceError::Refused(message.to_owned())),
                None => Ok(value.get("result").cloned().unwrap_or(serde_json::Value::Null)),
            };
            match pending.lock().await.remove(&id) {
                Some(tx) => {
                    let _ = tx.send(result);
                }
                None => warn!(log, "response for unknown request dropped"; "id" => id),
            }
        } else {
            match serde_json::from_value::<NodeEvent>(value) {
                Ok(event) => {
                    if events.send(event).is_err() {
                        break;
                    }
                }
                Err(err) => warn!(log, "unrecognized daemon event dropped"; "error" => %err),
            }
        }
    }
    debug!(log, "daemon connection closed");
    for (_, tx) in pending.lock().await.drain() {
        let _ = tx.send(Err(ServiceError::Disconnected));
    }
    let _ = events.send(NodeEvent::ServiceRemoved { path: service_path });
}

impl ManagementService for DaemonClient {
    fn join(
        &self,
        app_path: &ObjectPath,
        uuid: DeviceUuid,
    ) -> BoxFuture<'static, Result<(), ServiceError>> {
        self.call(
            "join",
            serde_json::json!({
                "app_path": app_path,
                "uuid": uuid,
                "composition": self.composition,
            }),
        )
        .map(|result| result.map(|_| ()))
        .boxed()
    }
    fn attach(
        &self,
        app_path: &ObjectPath,
        token: Token,
    ) -> BoxFuture<'static, Result<AttachReply, ServiceError>> {
        self.call(
            "attach",
            serde_json::json!({
                "app_path": app_path,
                "token": token,
                "composition": self.composition,
            }),
        )
        .map(|result| {
            result.and_then(|value| {
                serde_json::from_value(value)
                    .map_err(|err| ServiceError::Refused(format!("malformed attach reply: {}", err)))
            })
        })
        .boxed()
    }
    fn remove(&self, token: Token) -> BoxFuture<'static, Result<(), ServiceError>> {
        self.call("remove", serde_json::json!({ "token": token }))
            .map(|result| result.map(|_| ()))
            .boxed()
    }
}

impl NodeSender for DaemonClient {
    fn publish(
        &self,
        element: ElementIndex,
        model: ModelIdentifier,
        options: PublishOptions,
        payload: Vec<u8>,
    ) -> BoxFuture<'static, Result<(), ServiceError>> {
        self.call(
            "publish",
            serde_json::json!({
                "element_index": element,
                "model": model,
                "options": options,
                "payload": payload,
            }),
        )
        .map(|result| result.map(|_| ()))
        .boxed()
    }
    fn send(
        &self,
        element: ElementIndex,
        destination: Address,
        app_index: AppKeyIndex,
        options: SendOptions,
        payload: Vec<u8>,
    ) -> BoxFuture<'static, Result<(), ServiceError>> {
        self.call(
            "send",
            serde_json::json!({
                "element_index": element,
                "destination": destination,
                "app_index": app_index,
                "options": options,
                "payload": payload,
            }),
        )
        .map(|result| result.map(|_| ()))
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_node::mesh::APP_COMPANY_ID;
    use slog::o;
    use tokio::net::TcpListener;

    fn log() -> Logger {
        Logger::root(slog::Discard, o!())
    }
    fn composition() -> Composition {
        Composition {
            company_id: APP_COMPANY_ID,
            product_id: 0x0001,
            version_id: 0x0001,
            elements: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_request_response_and_events() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            let request = lines.next_line().await.unwrap().unwrap();
            let request: serde_json::Value = serde_json::from_str(&request).unwrap();
            assert_eq!(request["method"], "remove");
            assert_eq!(request["params"]["token"], "1122334455667788");
            let id = request["id"].as_u64().unwrap();
            let response = format!("{{\"id\":{},\"result\":null}}\n", id);
            write.write_all(response.as_bytes()).await.unwrap();
            write
                .write_all(b"{\"event\":\"join_failed\",\"reason\":\"busy\"}\n")
                .await
                .unwrap();
            // Dropping both halves closes the connection.
        });
        let client = DaemonClient::connect(&addr, composition(), events_tx, log())
            .await
            .unwrap();
        assert_eq!(client.service_path(), &ObjectPath::new(addr));
        client
            .remove(Token::new(0x1122_3344_5566_7788))
            .await
            .unwrap();
        match events_rx.recv().await.unwrap() {
            NodeEvent::JoinFailed { reason } => assert_eq!(reason, "busy"),
            other => panic!("wrong event: {:?}", other),
        }
        // Connection loss surfaces as the service endpoint disappearing.
        match events_rx.recv().await.unwrap() {
            NodeEvent::ServiceRemoved { path } => assert_eq!(&path, client.service_path()),
            other => panic!("wrong event: {:?}", other),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_error_response_is_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            let request = lines.next_line().await.unwrap().unwrap();
            let request: serde_json::Value = serde_json::from_str(&request).unwrap();
            let id = request["id"].as_u64().unwrap();
            let response = format!("{{\"id\":{},\"error\":\"no such token\"}}\n", id);
            write.write_all(response.as_bytes()).await.unwrap();
        });
        let client = DaemonClient::connect(&addr, composition(), events_tx, log())
            .await
            .unwrap();
        let err = client
            .remove(Token::new(0x1122_3344_5566_7788))
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::Refused("no such token".to_owned()));
    }
}
