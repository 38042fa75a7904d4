//! In-process [`RpcChannel`] for tests and embedders that drive the surface
//! directly.

use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard},
};

use {
    async_trait::async_trait,
    companion_protocol::ErrorShape,
    serde_json::Value,
    tokio::sync::watch,
    tracing::debug,
};

use crate::{
    channel::{OutboundCall, RpcChannel, RpcHandler},
    error::{Error, Result, TransportError},
};

/// How the simulated agent answers outbound calls.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundBehavior {
    /// Reply with this acknowledgement text.
    Ack(String),
    /// Fail as if the destination had left.
    NotConnected,
    /// Hold the call for its full timeout, then fail.
    Timeout,
    /// Fail as if the channel dropped mid-call.
    Closed,
    /// Reply with a remote error.
    Remote(ErrorShape),
}

#[derive(Default)]
struct Inner {
    handlers: HashMap<String, RpcHandler>,
    participants: HashSet<String>,
    behavior: Option<OutboundBehavior>,
    calls: Vec<OutboundCall>,
    published: Vec<Value>,
}

pub struct MemoryChannel {
    inner: Mutex<Inner>,
    call_count: watch::Sender<usize>,
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryChannel {
    pub fn new() -> Self {
        let (call_count, _) = watch::channel(0);
        Self {
            inner: Mutex::new(Inner::default()),
            call_count,
        }
    }

    /// A channel where `identity` is connected and acknowledges every call.
    pub fn with_participant(identity: &str) -> Self {
        let channel = Self::new();
        channel.connect_participant(identity);
        channel
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn connect_participant(&self, identity: &str) {
        self.lock().participants.insert(identity.to_string());
    }

    pub fn disconnect_participant(&self, identity: &str) {
        self.lock().participants.remove(identity);
    }

    /// Override how outbound calls are answered. Without an override,
    /// connected participants acknowledge with `"success"` and anyone else is
    /// reported as not connected.
    pub fn set_outbound(&self, behavior: OutboundBehavior) {
        self.lock().behavior = Some(behavior);
    }

    pub fn is_registered(&self, method: &str) -> bool {
        self.lock().handlers.contains_key(method)
    }

    pub fn registered_methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.lock().handlers.keys().cloned().collect();
        methods.sort();
        methods
    }

    /// Invoke a registered method as the agent would. `None` when nothing is
    /// registered under `method`.
    pub async fn invoke(&self, method: &str, params: Value) -> Option<String> {
        let handler = self.lock().handlers.get(method).cloned()?;
        Some(handler(params).await)
    }

    /// Outbound calls issued so far, in order.
    pub fn calls(&self) -> Vec<OutboundCall> {
        self.lock().calls.clone()
    }

    /// Data packets published so far, in order.
    pub fn published(&self) -> Vec<Value> {
        self.lock().published.clone()
    }

    /// Wait until at least `count` outbound calls have been issued.
    pub async fn wait_for_calls(&self, count: usize) {
        let mut rx = self.call_count.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|issued| *issued >= count).await;
    }
}

#[async_trait]
impl RpcChannel for MemoryChannel {
    fn register_method(&self, method: &str, handler: RpcHandler) -> Result<()> {
        let mut inner = self.lock();
        if inner.handlers.contains_key(method) {
            return Err(Error::AlreadyRegistered {
                method: method.to_string(),
            });
        }
        inner.handlers.insert(method.to_string(), handler);
        Ok(())
    }

    fn unregister_method(&self, method: &str) {
        self.lock().handlers.remove(method);
    }

    async fn perform_rpc(&self, call: OutboundCall) -> Result<String> {
        let behavior = {
            let mut inner = self.lock();
            inner.calls.push(call.clone());
            inner.behavior.clone().unwrap_or_else(|| {
                if inner.participants.contains(&call.destination) {
                    OutboundBehavior::Ack("success".into())
                } else {
                    OutboundBehavior::NotConnected
                }
            })
        };
        self.call_count.send_modify(|issued| *issued += 1);
        debug!(method = %call.method, destination = %call.destination, ?behavior, "memory rpc");

        match behavior {
            OutboundBehavior::Ack(text) => Ok(text),
            OutboundBehavior::NotConnected => {
                Err(TransportError::NotConnected(call.destination).into())
            },
            OutboundBehavior::Timeout => {
                tokio::time::sleep(call.timeout).await;
                Err(TransportError::Timeout(call.timeout).into())
            },
            OutboundBehavior::Closed => Err(TransportError::Closed.into()),
            OutboundBehavior::Remote(shape) => Err(TransportError::Remote(shape).into()),
        }
    }

    async fn publish_data(&self, payload: Value) -> Result<()> {
        self.lock().published.push(payload);
        Ok(())
    }
}
