//! WebSocket [`RpcChannel`] speaking the `req`/`res`/`event` frame protocol
//! to a relay that routes calls between participants.
//!
//! A writer task owns the sink; a reader task owns the stream. Inbound
//! requests are dispatched one at a time in arrival order, so each call's
//! state mutation completes before the next call is looked at. Outbound calls
//! are correlated by frame id through a pending map.

use std::{
    collections::HashMap,
    sync::{
        Arc, RwLock as StdRwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use {
    async_trait::async_trait,
    companion_protocol::{
        ChannelFrame, ErrorShape, EventFrame, PROTOCOL_VERSION, RequestFrame, ResponseFrame,
        encoded_len, error_codes, events,
    },
    futures::{SinkExt, StreamExt},
    serde_json::{Value, json},
    tokio::{
        sync::{Mutex, mpsc, oneshot, watch},
        task::JoinHandle,
    },
    tokio_tungstenite::tungstenite::Message,
    tracing::{debug, info, warn},
};

use crate::{
    channel::{OutboundCall, RpcChannel, RpcHandler},
    error::{Error, Result, TransportError},
};

struct Shared {
    identity: String,
    max_payload_bytes: usize,
    handlers: StdRwLock<HashMap<String, RpcHandler>>,
    pending: Mutex<HashMap<String, oneshot::Sender<ResponseFrame>>>,
    seq: AtomicU64,
    closed: watch::Sender<bool>,
}

impl Shared {
    fn handler(&self, method: &str) -> Option<RpcHandler> {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(method)
            .cloned()
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

pub struct WsChannel {
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<Message>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl WsChannel {
    /// Connect to the relay at `url` and announce ourselves as `identity`.
    pub async fn connect(url: &str, identity: &str, max_payload_bytes: usize) -> Result<Self> {
        let (ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(TransportError::from)?;
        info!(url, identity, "connected to relay");
        let (mut sink, mut stream) = ws.split();

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let (closed, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            identity: identity.to_string(),
            max_payload_bytes,
            handlers: StdRwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            seq: AtomicU64::new(0),
            closed,
        });

        let writer = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if let Err(e) = sink.send(msg).await {
                    warn!(error = %e, "relay write failed");
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        let reader = {
            let shared = Arc::clone(&shared);
            let outbound = outbound.clone();
            tokio::spawn(async move {
                while let Some(next) = stream.next().await {
                    match next {
                        Ok(Message::Text(text)) => {
                            handle_text(&shared, &outbound, text.as_str()).await;
                        },
                        Ok(Message::Close(frame)) => {
                            debug!(?frame, "relay closed the connection");
                            break;
                        },
                        Ok(_) => {},
                        Err(e) => {
                            warn!(error = %e, "relay read failed");
                            break;
                        },
                    }
                }
                shutdown(&shared).await;
            })
        };

        let channel = Self {
            shared,
            outbound,
            reader,
            writer,
        };
        channel.send_frame(&ChannelFrame::Event(EventFrame::new(
            events::PRESENCE,
            json!({"identity": identity, "protocol": PROTOCOL_VERSION}),
            channel.shared.next_seq(),
        )))?;
        Ok(channel)
    }

    pub fn identity(&self) -> &str {
        &self.shared.identity
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Resolves once the relay connection is gone.
    pub async fn closed(&self) {
        let mut rx = self.shared.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Send a close frame and stop reading.
    pub async fn close(&self) {
        let _ = self.outbound.send(Message::Close(None));
        self.reader.abort();
        shutdown(&self.shared).await;
    }

    fn send_frame(&self, frame: &ChannelFrame) -> Result<()> {
        if self.shared.is_closed() {
            return Err(TransportError::Closed.into());
        }
        let text = serde_json::to_string(frame)?;
        self.outbound
            .send(Message::Text(text.into()))
            .map_err(|_| TransportError::Closed)?;
        Ok(())
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// Mark the channel closed and fail every call still waiting for a response.
async fn shutdown(shared: &Shared) {
    shared.closed.send_replace(true);
    let dropped = {
        let mut pending = shared.pending.lock().await;
        let count = pending.len();
        pending.clear();
        count
    };
    if dropped > 0 {
        warn!(dropped, "relay connection closed with calls in flight");
    }
}

async fn handle_text(shared: &Shared, outbound: &mpsc::UnboundedSender<Message>, text: &str) {
    let frame = match serde_json::from_str::<ChannelFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "ignoring malformed frame");
            return;
        },
    };

    match frame {
        ChannelFrame::Request(req) => {
            let response = answer_request(shared, req).await;
            match serde_json::to_string(&ChannelFrame::Response(response)) {
                Ok(text) => {
                    let _ = outbound.send(Message::Text(text.into()));
                },
                Err(e) => warn!(error = %e, "failed to encode response frame"),
            }
        },
        ChannelFrame::Response(res) => {
            let waiter = shared.pending.lock().await.remove(&res.id);
            match waiter {
                Some(tx) => {
                    let _ = tx.send(res);
                },
                None => debug!(id = %res.id, "discarding late or unknown response"),
            }
        },
        ChannelFrame::Event(event) => {
            debug!(event = %event.event, seq = ?event.seq, "relay event");
        },
    }
}

async fn answer_request(shared: &Shared, req: RequestFrame) -> ResponseFrame {
    let Some(handler) = shared.handler(&req.method) else {
        warn!(method = %req.method, "no handler for inbound call");
        return ResponseFrame::err(
            req.id,
            ErrorShape::new(
                error_codes::UNKNOWN_METHOD,
                format!("unknown method: {}", req.method),
            ),
        );
    };

    let params = req.params.unwrap_or(Value::Null);
    let size = encoded_len(&params);
    if size > shared.max_payload_bytes {
        warn!(method = %req.method, size, "inbound payload too large");
        return ResponseFrame::err(
            req.id,
            ErrorShape::new(
                error_codes::PAYLOAD_TOO_LARGE,
                format!(
                    "payload too large: {size} > {} bytes",
                    shared.max_payload_bytes
                ),
            ),
        );
    }

    debug!(method = %req.method, id = %req.id, "dispatching inbound call");
    let body = handler(params).await;
    ResponseFrame::ok(req.id, Value::String(body))
}

#[async_trait]
impl RpcChannel for WsChannel {
    fn register_method(&self, method: &str, handler: RpcHandler) -> Result<()> {
        let mut handlers = self
            .shared
            .handlers
            .write()
            .unwrap_or_else(|e| e.into_inner());
        if handlers.contains_key(method) {
            return Err(Error::AlreadyRegistered {
                method: method.to_string(),
            });
        }
        handlers.insert(method.to_string(), handler);
        Ok(())
    }

    fn unregister_method(&self, method: &str) {
        self.shared
            .handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(method);
    }

    async fn perform_rpc(&self, call: OutboundCall) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().await.insert(id.clone(), tx);

        let frame = ChannelFrame::Request(
            RequestFrame::new(&id, &call.method, Value::String(call.payload))
                .with_destination(&call.destination),
        );
        if let Err(e) = self.send_frame(&frame) {
            self.shared.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(call.timeout, rx).await {
            Ok(Ok(res)) if res.ok => Ok(match res.payload {
                Some(Value::String(ack)) => ack,
                Some(other) => other.to_string(),
                None => String::new(),
            }),
            Ok(Ok(res)) => {
                let shape = res.error.unwrap_or_else(|| {
                    ErrorShape::new(error_codes::INTERNAL, "call failed without detail")
                });
                if shape.code == error_codes::UNAVAILABLE {
                    Err(TransportError::NotConnected(call.destination).into())
                } else {
                    Err(TransportError::Remote(shape).into())
                }
            },
            Ok(Err(_)) => Err(TransportError::Closed.into()),
            Err(_) => {
                self.shared.pending.lock().await.remove(&id);
                Err(TransportError::Timeout(call.timeout).into())
            },
        }
    }

    async fn publish_data(&self, payload: Value) -> Result<()> {
        self.send_frame(&ChannelFrame::Event(EventFrame::new(
            events::DATA,
            payload,
            self.shared.next_seq(),
        )))
    }
}
