//! Best-effort notifications toward the agent.
//!
//! Every send runs on its own spawned task whose only consumer is the log.
//! Callers get the [`JoinHandle`] back but are not expected to await it: local
//! state has already changed by the time a notification is issued, and no
//! outcome (ack, timeout, absent agent) feeds back into it. Nothing is retried.

use std::{sync::Arc, time::Duration};

use {
    companion_protocol::{
        DataMessage, EntityId, OrderType, SelectAction, SelectCardParams, SelectOrderParams,
        encode, methods,
    },
    tokio::task::JoinHandle,
    tracing::{debug, info, warn},
};

use crate::{
    channel::{OutboundCall, RpcChannel},
    config::SurfaceConfig,
    error::Result,
};

/// A user pick to report to the agent.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionEvent {
    Card { id: EntityId, title: String },
    Order { id: EntityId, order_type: OrderType },
}

impl SelectionEvent {
    pub fn method(&self) -> &'static str {
        match self {
            Self::Card { .. } => methods::SELECT_CARD,
            Self::Order { .. } => methods::SELECT_ORDER,
        }
    }

    /// Wire params of the outbound call.
    pub fn encode(&self) -> serde_json::Result<String> {
        match self {
            Self::Card { id, title } => encode(&SelectCardParams {
                card_id: id.clone(),
                title: title.clone(),
                action: SelectAction::Select,
            }),
            Self::Order { id, order_type } => encode(&SelectOrderParams {
                order_id: id.clone(),
                order_type: *order_type,
                action: SelectAction::Select,
            }),
        }
    }
}

#[derive(Clone)]
pub struct Notifier {
    channel: Arc<dyn RpcChannel>,
    agent_identity: String,
    timeout: Duration,
}

impl Notifier {
    pub fn new(channel: Arc<dyn RpcChannel>, config: &SurfaceConfig) -> Self {
        Self {
            channel,
            agent_identity: config.agent_identity.clone(),
            timeout: config.call_timeout(),
        }
    }

    pub fn agent_identity(&self) -> &str {
        &self.agent_identity
    }

    /// Report a selection to the agent without waiting for it.
    pub fn notify_selection(&self, event: SelectionEvent) -> JoinHandle<()> {
        let channel = Arc::clone(&self.channel);
        let destination = self.agent_identity.clone();
        let timeout = self.timeout;
        tokio::spawn(async move {
            let method = event.method();
            match send_selection(channel.as_ref(), &destination, timeout, &event).await {
                Ok(ack) => {
                    info!(method, %destination, %ack, "agent acknowledged selection");
                },
                Err(e) => {
                    warn!(method, %destination, error = %e, "selection notification failed");
                },
            }
        })
    }

    /// Publish `{"message": text}` for the agent to voice as a system
    /// utterance. Failures are logged only.
    pub fn publish_message(&self, text: impl Into<String>) -> JoinHandle<()> {
        let channel = Arc::clone(&self.channel);
        let packet = DataMessage {
            message: text.into(),
        };
        tokio::spawn(async move {
            let payload = match serde_json::to_value(&packet) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(error = %e, "failed to encode data message");
                    return;
                },
            };
            match channel.publish_data(payload).await {
                Ok(()) => debug!(len = packet.message.len(), "published data message"),
                Err(e) => warn!(error = %e, "failed to publish data message"),
            }
        })
    }
}

async fn send_selection(
    channel: &dyn RpcChannel,
    destination: &str,
    timeout: Duration,
    event: &SelectionEvent,
) -> Result<String> {
    let call = OutboundCall {
        destination: destination.to_string(),
        method: event.method().to_string(),
        payload: event.encode()?,
        timeout,
    };
    channel.perform_rpc(call).await
}
