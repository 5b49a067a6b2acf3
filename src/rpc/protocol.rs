//! Document service message structures and JSON-RPC handling
//!
//! Requests and responses are JSON-RPC 2.0 objects, one per line. Besides
//! responses, the server pushes `records/snapshot` and `records/error`
//! notifications for live subscriptions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::OwnerId;
use crate::storage::{Collection, StorageError};

/// Protocol revision spoken by this crate
pub const PROTOCOL_VERSION: &str = "habitflow-records/1";

/// Method names
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const SUBSCRIBE: &str = "records/subscribe";
    pub const UNSUBSCRIBE: &str = "records/unsubscribe";
    pub const GET: &str = "records/get";
    pub const PUT: &str = "records/put";
    pub const REMOVE: &str = "records/remove";
    pub const TOGGLE: &str = "records/toggle";

    /// Server-to-client notifications
    pub const SNAPSHOT: &str = "records/snapshot";
    pub const SUBSCRIPTION_ERROR: &str = "records/error";
}

/// JSON-RPC 2.0 request message
///
/// A request without an `id` is a notification and gets no response.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Unique identifier for this request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn call(id: u64, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(Value::from(id)),
            method: method.to_string(),
            params: Some(params),
        }
    }

    pub fn notification(method: &str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: method.to_string(),
            params: Some(params),
        }
    }
}

/// JSON-RPC 2.0 response message
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Request ID that we're responding to
    pub id: Value,
    /// Successful result (if no error occurred)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error information (if something went wrong)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC error information
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code (standard JSON-RPC codes)
    pub code: i32,
    /// Human-readable error message
    pub message: String,
    /// Additional error details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Handshake response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Protocol revision the server speaks
    pub protocol_version: String,
    /// Information about the server
    pub server_info: ServerInfo,
}

/// Information about the document server
#[derive(Debug, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// Parameters addressing a whole collection
#[derive(Debug, Serialize, Deserialize)]
pub struct SubscribeParams {
    pub owner: OwnerId,
    pub collection: Collection,
    /// Chosen by the client so snapshots can never outrun the response
    pub subscription: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnsubscribeParams {
    pub subscription: u64,
}

/// Parameters addressing one record
#[derive(Debug, Serialize, Deserialize)]
pub struct RecordParams {
    pub owner: OwnerId,
    pub collection: Collection,
    pub id: String,
}

/// Parameters carrying a record body
#[derive(Debug, Serialize, Deserialize)]
pub struct WriteParams {
    pub owner: OwnerId,
    pub collection: Collection,
    pub id: String,
    pub record: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToggleResult {
    pub outcome: crate::storage::Toggled,
}

/// Pushed after every change to a subscribed collection
#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotNotification {
    pub subscription: u64,
    pub records: Vec<Value>,
}

/// Pushed when a subscription can no longer be served
#[derive(Debug, Serialize, Deserialize)]
pub struct SubscriptionErrorNotification {
    pub subscription: u64,
    pub message: String,
}

// JSON-RPC error codes (standard codes)
pub mod error_codes {
    /// Parse error - Invalid JSON was received by the server
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid Request - The JSON sent is not a valid Request object
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found - The requested method doesn't exist
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid parameters - Method exists but parameters are wrong
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error - Internal JSON-RPC error
    pub const INTERNAL_ERROR: i32 = -32603;

    // Application-specific error codes (-32000 to -32099)
    /// Invalid record - The record body was rejected
    pub const INVALID_RECORD: i32 = -32003;
    /// Storage error - Database or storage operation failed
    pub const STORAGE_ERROR: i32 = -32004;
}

impl JsonRpcResponse {
    /// Create a successful response
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Value, code: i32, message: String, data: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError { code, message, data }),
        }
    }

    /// Turn the response back into the caller's result
    pub fn into_result(self) -> Result<Value, StorageError> {
        match self.error {
            Some(error) => Err(StorageError::Remote {
                code: error.code,
                message: error.message,
            }),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Map storage errors to JSON-RPC error codes
pub fn storage_error_to_json_rpc_code(error: &StorageError) -> i32 {
    match error {
        StorageError::InvalidRecord(_) => error_codes::INVALID_RECORD,
        StorageError::UnknownCollection(_) => error_codes::INVALID_PARAMS,
        StorageError::Serialization(_) => error_codes::INTERNAL_ERROR,
        StorageError::Remote { code, .. } => *code,
        StorageError::Query(_)
        | StorageError::Connection(_)
        | StorageError::Subscription(_)
        | StorageError::Migration(_) => error_codes::STORAGE_ERROR,
    }
}
