//! HTTP JSON-RPC transport for wallet/node providers.

use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::protocol::{RpcErrorObject, RpcRequest, RpcResponse};
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{message} (code {code})")]
    Rpc { code: i64, message: String },
    #[error("provider returned neither result nor error for {method}")]
    MissingResult { method: String },
    #[error("invalid {method} result: {source}")]
    Decode {
        method: String,
        source: serde_json::Error,
    },
}

impl TransportError {
    pub fn rpc_code(&self) -> Option<i64> {
        match self {
            Self::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<RpcErrorObject> for TransportError {
    fn from(value: RpcErrorObject) -> Self {
        Self::Rpc {
            code: value.code,
            message: value.message,
        }
    }
}

pub struct JsonRpcTransport {
    http: Client,
    endpoint: Url,
    next_id: AtomicU64,
}

impl JsonRpcTransport {
    pub fn new(endpoint: Url) -> Self {
        Self {
            http: Client::new(),
            endpoint,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Sends one request. A `null` result decodes into `Option::None` for
    /// callers that ask for an `Option<T>`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(id, method, "json-rpc request");
        let response: RpcResponse = self
            .http
            .post(self.endpoint.clone())
            .json(&RpcRequest::new(id, method, params))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(error.into());
        }
        // `"result": null` and an absent result both arrive as `None`.
        let missing = response.result.is_none();
        let result = response.result.unwrap_or(Value::Null);
        serde_json::from_value(result).map_err(|source| {
            if missing {
                TransportError::MissingResult {
                    method: method.to_string(),
                }
            } else {
                TransportError::Decode {
                    method: method.to_string(),
                    source,
                }
            }
        })
    }
}
