//! RPC request routing.
//!
//! Requests carry the handler name in the AMQP `type` property and a JSON
//! body. A handler returns the JSON reply body or an error message.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::config::AppConfig;

/// Reply status for a handled request.
pub const STATUS_SUCCESS: &str = "success";
/// Reply status when no handler is registered under the requested name.
pub const STATUS_BAD_HANDLER: &str = "unregistered handler";
/// Reply status when the handler failed.
pub const STATUS_INTERNAL_ERROR: &str = "internal server error";

type Handler = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;

/// Result of dispatching one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: &'static str,
    pub body: Vec<u8>,
}

/// Named RPC handlers.
#[derive(Clone, Default)]
pub struct RpcRouter {
    handlers: HashMap<String, Handler>,
}

impl RpcRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Router with the built-in `getVersion` handler.
    pub fn with_defaults(app: &AppConfig) -> Self {
        let name = app.name.clone();
        let version = app.version.clone();
        Self::new().route("getVersion", move |_| {
            Ok(serde_json::json!({ "name": name, "version": version }))
        })
    }

    /// Register `handler` under `name`, replacing any previous one.
    pub fn route<F>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.handlers.insert(name.to_string(), Arc::new(handler));
        self
    }

    pub fn handles(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Run the handler for `name` on a raw request body.
    pub fn dispatch(&self, name: &str, body: &[u8]) -> Reply {
        let Some(handler) = self.handlers.get(name) else {
            return Reply {
                status: STATUS_BAD_HANDLER,
                body: Vec::new(),
            };
        };

        let request = if body.is_empty() {
            Value::Null
        } else {
            match serde_json::from_slice(body) {
                Ok(value) => value,
                Err(e) => return error_reply(e.to_string()),
            }
        };

        match handler(request).and_then(|v| serde_json::to_vec(&v).map_err(|e| e.to_string())) {
            Ok(body) => Reply {
                status: STATUS_SUCCESS,
                body,
            },
            Err(message) => error_reply(message),
        }
    }
}

fn error_reply(message: String) -> Reply {
    Reply {
        status: STATUS_INTERNAL_ERROR,
        body: serde_json::to_vec(&serde_json::json!({ "error": message })).unwrap_or_default(),
    }
}
