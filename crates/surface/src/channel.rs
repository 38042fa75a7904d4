//! Real-time call channel the surface attaches to.
//!
//! The channel carries remote calls in both directions: the agent invokes the
//! methods a session registers, and the session issues calls addressed to the
//! agent's identity. Delivery is at-most-once; ordering and reconnection are
//! the channel's own business.

use std::{sync::Arc, time::Duration};

use {async_trait::async_trait, futures::future::BoxFuture, serde_json::Value, tracing::debug};

use crate::error::Result;

/// Handler for an inbound method. Receives the raw params (object or text)
/// and resolves to the serialized response body.
pub type RpcHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, String> + Send + Sync>;

/// An outbound call toward a named participant.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundCall {
    pub destination: String,
    pub method: String,
    pub payload: String,
    pub timeout: Duration,
}

#[async_trait]
pub trait RpcChannel: Send + Sync {
    /// Register `handler` under `method`. Fails if the method is taken.
    fn register_method(&self, method: &str, handler: RpcHandler) -> Result<()>;

    /// Drop the handler for `method`. Unknown methods are ignored.
    fn unregister_method(&self, method: &str);

    /// Call `method` on the destination and wait for its text acknowledgement.
    async fn perform_rpc(&self, call: OutboundCall) -> Result<String>;

    /// Publish a one-way data packet.
    async fn publish_data(&self, payload: Value) -> Result<()>;
}

/// A registered method, released when dropped.
#[must_use = "dropping a registration unregisters the method"]
pub struct Registration {
    channel: Arc<dyn RpcChannel>,
    method: String,
}

impl Registration {
    pub fn acquire(
        channel: Arc<dyn RpcChannel>,
        method: &str,
        handler: RpcHandler,
    ) -> Result<Self> {
        channel.register_method(method, handler)?;
        debug!(method, "registered method");
        Ok(Self {
            channel,
            method: method.to_string(),
        })
    }

    pub fn method(&self) -> &str {
        &self.method
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.channel.unregister_method(&self.method);
        debug!(method = %self.method, "unregistered method");
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("method", &self.method)
            .finish()
    }
}
