//! Document server that handles JSON-RPC communication over TCP
//!
//! This module implements the hosted side of the remote record store:
//! 1. Accepts client connections and reads one JSON-RPC request per line
//! 2. Applies record operations to the backing store
//! 3. Pushes collection snapshots to every subscribed connection

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::rpc::protocol::*;
use crate::storage::{RecordStore, StorageError};

/// A failed request, as reported back to the client
struct RpcFailure {
    code: i32,
    message: String,
}

impl RpcFailure {
    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: error_codes::INVALID_PARAMS,
            message: message.into(),
        }
    }
}

impl From<StorageError> for RpcFailure {
    fn from(error: StorageError) -> Self {
        Self {
            code: storage_error_to_json_rpc_code(&error),
            message: error.to_string(),
        }
    }
}

/// Serves a record store to remote sessions
pub struct DocumentServer {
    store: Arc<dyn RecordStore>,
}

impl DocumentServer {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Accept connections until `shutdown` flips to true
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), StorageError> {
        let local = listener
            .local_addr()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        info!("Document server listening on {}", local);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let store = Arc::clone(&self.store);
                        tokio::spawn(async move {
                            ClientConnection::new(store, peer).serve(stream).await;
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Document server shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

/// State of one client connection
struct ClientConnection {
    store: Arc<dyn RecordStore>,
    peer: SocketAddr,
    outbound: Option<mpsc::UnboundedSender<String>>,
    subscriptions: HashMap<u64, JoinHandle<()>>,
}

impl ClientConnection {
    fn new(store: Arc<dyn RecordStore>, peer: SocketAddr) -> Self {
        Self {
            store,
            peer,
            outbound: None,
            subscriptions: HashMap::new(),
        }
    }

    async fn serve(mut self, stream: TcpStream) {
        info!("Client connected: {}", self.peer);

        let (read_half, mut write_half) = stream.into_split();
        let (outbound, mut pending) = mpsc::unbounded_channel::<String>();
        self.outbound = Some(outbound.clone());

        tokio::spawn(async move {
            while let Some(line) = pending.recv().await {
                if write_half.write_all(line.as_bytes()).await.is_err()
                    || write_half.write_all(b"\n").await.is_err()
                    || write_half.flush().await.is_err()
                {
                    break;
                }
            }
        });

        let mut reader = BufReader::new(read_half);
        let mut line = String::new();

        loop {
            line.clear();

            match reader.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    if let Some(response) = self.process_line(&line).await {
                        if let Some(encoded) = encode(&response) {
                            debug!("Sending response to {}: {}", self.peer, encoded);
                            if outbound.send(encoded).is_err() {
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("Failed to read from {}: {}", self.peer, e);
                    break;
                }
            }
        }

        for (_, task) in self.subscriptions.drain() {
            task.abort();
        }
        // The writer task ends once the last sender is gone
        self.outbound = None;
        drop(outbound);

        info!("Client disconnected: {}", self.peer);
    }

    /// Process a single line of JSON-RPC input
    async fn process_line(&mut self, line: &str) -> Option<JsonRpcResponse> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        debug!("Processing request: {}", line);

        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse JSON-RPC request: {}", e);
                return Some(JsonRpcResponse::error(
                    json!(null),
                    error_codes::PARSE_ERROR,
                    format!("Invalid JSON: {}", e),
                    None,
                ));
            }
        };

        let id = request.id.clone();
        let result = self.handle_request(request).await;

        // Notifications get no reply
        let id = id?;
        Some(match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(failure) => JsonRpcResponse::error(id, failure.code, failure.message, None),
        })
    }

    /// Handle a JSON-RPC request
    async fn handle_request(&mut self, request: JsonRpcRequest) -> Result<Value, RpcFailure> {
        match request.method.as_str() {
            methods::INITIALIZE => Ok(to_value(InitializeResult {
                protocol_version: PROTOCOL_VERSION.to_string(),
                server_info: ServerInfo {
                    name: "HabitFlow document server".to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                },
            })),
            methods::SUBSCRIBE => self.handle_subscribe(parse(request.params)?).await,
            methods::UNSUBSCRIBE => {
                let params: UnsubscribeParams = parse(request.params)?;
                if let Some(task) = self.subscriptions.remove(&params.subscription) {
                    task.abort();
                }
                Ok(json!(null))
            }
            methods::GET => {
                let params: RecordParams = parse(request.params)?;
                let record = self
                    .store
                    .get(&params.owner, params.collection, &params.id)
                    .await?;
                Ok(record.unwrap_or(Value::Null))
            }
            methods::PUT => {
                let params: WriteParams = parse(request.params)?;
                self.store
                    .put(&params.owner, params.collection, &params.id, params.record)
                    .await?;
                Ok(json!(null))
            }
            methods::REMOVE => {
                let params: RecordParams = parse(request.params)?;
                self.store
                    .remove(&params.owner, params.collection, &params.id)
                    .await?;
                Ok(json!(null))
            }
            methods::TOGGLE => {
                let params: WriteParams = parse(request.params)?;
                let outcome = self
                    .store
                    .toggle(&params.owner, params.collection, &params.id, params.record)
                    .await?;
                Ok(to_value(ToggleResult { outcome }))
            }
            _ => Err(RpcFailure {
                code: error_codes::METHOD_NOT_FOUND,
                message: format!("Method '{}' not found", request.method),
            }),
        }
    }

    /// Forward every snapshot of the collection to this client
    async fn handle_subscribe(&mut self, params: SubscribeParams) -> Result<Value, RpcFailure> {
        let outbound = self
            .outbound
            .clone()
            .ok_or_else(|| RpcFailure::from(StorageError::Connection("connection closing".to_string())))?;

        let mut subscription = self.store.subscribe(&params.owner, params.collection).await?;
        let subscription_id = params.subscription;

        let task = tokio::spawn(async move {
            while let Some(item) = subscription.next().await {
                let notification = match item {
                    Ok(records) => JsonRpcRequest::notification(
                        methods::SNAPSHOT,
                        to_value(SnapshotNotification {
                            subscription: subscription_id,
                            records,
                        }),
                    ),
                    Err(e) => JsonRpcRequest::notification(
                        methods::SUBSCRIPTION_ERROR,
                        to_value(SubscriptionErrorNotification {
                            subscription: subscription_id,
                            message: e.to_string(),
                        }),
                    ),
                };

                let Some(encoded) = encode(&notification) else {
                    continue;
                };
                if outbound.send(encoded).is_err() {
                    break;
                }
            }
        });

        if let Some(previous) = self.subscriptions.insert(subscription_id, task) {
            previous.abort();
        }

        debug!(
            "{} subscribed to {} of {} as #{}",
            self.peer, params.collection, params.owner, subscription_id
        );
        Ok(json!({ "subscription": subscription_id }))
    }
}

fn parse<T: DeserializeOwned>(params: Option<Value>) -> Result<T, RpcFailure> {
    let params = params.ok_or_else(|| RpcFailure::invalid_params("Missing parameters"))?;
    serde_json::from_value(params)
        .map_err(|e| RpcFailure::invalid_params(format!("Invalid parameters: {}", e)))
}

fn to_value<T: Serialize>(value: T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn encode<T: Serialize>(message: &T) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(encoded) => Some(encoded),
        Err(e) => {
            error!("Failed to encode message: {}", e);
            None
        }
    }
}
