//! Remote record store client
//!
//! Talks to a [`DocumentServer`](crate::rpc::DocumentServer) over one TCP
//! connection. Requests are matched to responses by id; snapshot
//! notifications are routed to subscriptions by a client-chosen id that is
//! registered before the subscribe request goes out, so the first snapshot
//! can never arrive for an unknown subscription.
//!
//! There is no reconnect logic. When the connection drops, pending calls
//! fail and every subscription receives one error.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::domain::OwnerId;
use crate::rpc::protocol::{
    methods, InitializeResult, JsonRpcRequest, JsonRpcResponse, RecordParams,
    SnapshotNotification, SubscribeParams, SubscriptionErrorNotification, ToggleResult,
    UnsubscribeParams, WriteParams, PROTOCOL_VERSION,
};
use crate::storage::{
    with_id, Collection, RecordStore, SnapshotResult, StorageError, StoreKind, Subscription,
    Toggled,
};

type Reply = oneshot::Sender<Result<Value, StorageError>>;

/// Routing tables shared between callers and the reader task
#[derive(Default)]
struct Routes {
    pending: HashMap<u64, Reply>,
    subscriptions: HashMap<u64, mpsc::UnboundedSender<SnapshotResult>>,
    closed: bool,
}

/// Record store backed by a remote document server
pub struct RemoteStore {
    addr: String,
    outbound: mpsc::UnboundedSender<String>,
    routes: Arc<Mutex<Routes>>,
    next_id: AtomicU64,
}

impl RemoteStore {
    /// Connect and perform the protocol handshake
    pub async fn connect(addr: &str) -> Result<Self, StorageError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to connect to {}: {}", addr, e)))?;
        let (read_half, write_half) = stream.into_split();

        let (outbound, lines) = mpsc::unbounded_channel::<String>();
        let routes = Arc::new(Mutex::new(Routes::default()));

        tokio::spawn(write_loop(write_half, lines));
        tokio::spawn(read_loop(read_half, Arc::clone(&routes), outbound.downgrade()));

        let store = Self {
            addr: addr.to_string(),
            outbound,
            routes,
            next_id: AtomicU64::new(1),
        };

        let handshake: InitializeResult =
            serde_json::from_value(store.call(methods::INITIALIZE, json!({})).await?)?;
        if handshake.protocol_version != PROTOCOL_VERSION {
            return Err(StorageError::Connection(format!(
                "{} speaks protocol {}, expected {}",
                addr, handshake.protocol_version, PROTOCOL_VERSION
            )));
        }

        info!(
            "Connected to {} {} at {}",
            handshake.server_info.name, handshake.server_info.version, addr
        );
        Ok(store)
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn routes(&self) -> MutexGuard<'_, Routes> {
        lock(&self.routes)
    }

    /// Send one request and wait for its response
    async fn call(&self, method: &str, params: Value) -> Result<Value, StorageError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply, response) = oneshot::channel();

        {
            let mut routes = self.routes();
            if routes.closed {
                return Err(StorageError::Connection(format!(
                    "connection to {} is closed",
                    self.addr
                )));
            }
            routes.pending.insert(id, reply);
        }

        let line = serde_json::to_string(&JsonRpcRequest::call(id, method, params))?;
        if self.outbound.send(line).is_err() {
            self.routes().pending.remove(&id);
            return Err(StorageError::Connection("connection writer stopped".to_string()));
        }

        response
            .await
            .map_err(|_| StorageError::Connection("connection closed before reply".to_string()))?
    }
}

#[async_trait]
impl RecordStore for RemoteStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Remote
    }

    async fn subscribe(
        &self,
        owner: &OwnerId,
        collection: Collection,
    ) -> Result<Subscription, StorageError> {
        let subscription_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, subscription) = Subscription::channel();
        self.routes().subscriptions.insert(subscription_id, sender);

        let params = serde_json::to_value(SubscribeParams {
            owner: owner.clone(),
            collection,
            subscription: subscription_id,
        })?;

        match self.call(methods::SUBSCRIBE, params).await {
            Ok(_) => {
                debug!("Subscribed to {} of {} as #{}", collection, owner, subscription_id);
                Ok(subscription)
            }
            Err(e) => {
                self.routes().subscriptions.remove(&subscription_id);
                Err(e)
            }
        }
    }

    async fn get(
        &self,
        owner: &OwnerId,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Value>, StorageError> {
        let params = serde_json::to_value(RecordParams {
            owner: owner.clone(),
            collection,
            id: id.to_string(),
        })?;

        match self.call(methods::GET, params).await? {
            Value::Null => Ok(None),
            record => Ok(Some(record)),
        }
    }

    async fn put(
        &self,
        owner: &OwnerId,
        collection: Collection,
        id: &str,
        record: Value,
    ) -> Result<(), StorageError> {
        let params = serde_json::to_value(WriteParams {
            owner: owner.clone(),
            collection,
            id: id.to_string(),
            record: with_id(id, record)?,
        })?;

        self.call(methods::PUT, params).await?;
        Ok(())
    }

    async fn remove(
        &self,
        owner: &OwnerId,
        collection: Collection,
        id: &str,
    ) -> Result<(), StorageError> {
        let params = serde_json::to_value(RecordParams {
            owner: owner.clone(),
            collection,
            id: id.to_string(),
        })?;

        self.call(methods::REMOVE, params).await?;
        Ok(())
    }

    async fn toggle(
        &self,
        owner: &OwnerId,
        collection: Collection,
        id: &str,
        record: Value,
    ) -> Result<Toggled, StorageError> {
        let params = serde_json::to_value(WriteParams {
            owner: owner.clone(),
            collection,
            id: id.to_string(),
            record: with_id(id, record)?,
        })?;

        let result: ToggleResult = serde_json::from_value(self.call(methods::TOGGLE, params).await?)?;
        Ok(result.outcome)
    }
}

fn lock(routes: &Mutex<Routes>) -> MutexGuard<'_, Routes> {
    routes.lock().unwrap_or_else(|e| e.into_inner())
}

async fn write_loop(mut write_half: OwnedWriteHalf, mut lines: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = lines.recv().await {
        if let Err(e) = write_half.write_all(format!("{}\n", line).as_bytes()).await {
            warn!("Failed to write to document server: {}", e);
            break;
        }
    }
    let _ = write_half.shutdown().await;
}

async fn read_loop(
    read_half: OwnedReadHalf,
    routes: Arc<Mutex<Routes>>,
    outbound: mpsc::WeakUnboundedSender<String>,
) {
    let mut lines = BufReader::new(read_half).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => dispatch(&line, &routes, &outbound),
            Ok(None) => {
                info!("Document server closed the connection");
                break;
            }
            Err(e) => {
                warn!("Failed to read from document server: {}", e);
                break;
            }
        }
    }

    let mut routes = lock(&routes);
    routes.closed = true;
    for (_, reply) in routes.pending.drain() {
        let _ = reply.send(Err(StorageError::Connection(
            "connection to document server lost".to_string(),
        )));
    }
    for (_, sender) in routes.subscriptions.drain() {
        let _ = sender.send(Err(StorageError::Subscription(
            "connection to document server lost".to_string(),
        )));
    }
}

/// Route one incoming line to a pending call or a subscription
fn dispatch(line: &str, routes: &Mutex<Routes>, outbound: &mpsc::WeakUnboundedSender<String>) {
    let message: Value = match serde_json::from_str(line) {
        Ok(message) => message,
        Err(e) => {
            warn!("Ignoring malformed message from document server: {}", e);
            return;
        }
    };

    if message.get("method").is_none() {
        let response: JsonRpcResponse = match serde_json::from_value(message) {
            Ok(response) => response,
            Err(e) => {
                warn!("Ignoring malformed response: {}", e);
                return;
            }
        };
        let Some(id) = response.id.as_u64() else {
            warn!("Response without a usable id: {}", response.id);
            return;
        };
        if let Some(reply) = lock(routes).pending.remove(&id) {
            let _ = reply.send(response.into_result());
        }
        return;
    }

    let notification: JsonRpcRequest = match serde_json::from_value(message) {
        Ok(notification) => notification,
        Err(e) => {
            warn!("Ignoring malformed notification: {}", e);
            return;
        }
    };
    let params = notification.params.unwrap_or(Value::Null);

    match notification.method.as_str() {
        methods::SNAPSHOT => {
            let Ok(snapshot) = serde_json::from_value::<SnapshotNotification>(params) else {
                warn!("Ignoring malformed snapshot notification");
                return;
            };
            let delivered = {
                let mut routes = lock(routes);
                match routes.subscriptions.get(&snapshot.subscription) {
                    Some(sender) if sender.send(Ok(snapshot.records)).is_ok() => true,
                    Some(_) => {
                        routes.subscriptions.remove(&snapshot.subscription);
                        false
                    }
                    // Already cancelled; tell the server again
                    None => false,
                }
            };
            if !delivered {
                unsubscribe(outbound, snapshot.subscription);
            }
        }
        methods::SUBSCRIPTION_ERROR => {
            let Ok(failure) = serde_json::from_value::<SubscriptionErrorNotification>(params) else {
                warn!("Ignoring malformed subscription error");
                return;
            };
            if let Some(sender) = lock(routes).subscriptions.remove(&failure.subscription) {
                let _ = sender.send(Err(StorageError::Subscription(failure.message)));
            }
        }
        other => debug!("Ignoring unknown notification {}", other),
    }
}

fn unsubscribe(outbound: &mpsc::WeakUnboundedSender<String>, subscription: u64) {
    let Some(outbound) = outbound.upgrade() else {
        return;
    };
    let request = JsonRpcRequest::notification(
        methods::UNSUBSCRIBE,
        json!(UnsubscribeParams { subscription }),
    );
    if let Ok(line) = serde_json::to_string(&request) {
        let _ = outbound.send(line);
    }
}
