//! Client-side companion surface for a voice agent.
//!
//! The agent pushes cards and order lists through four remote calls
//! (`client.displayCards`, `client.controlCardModal`, `client.displayOrders`,
//! `client.controlOrderModal`). A [`Session`] validates those calls, keeps the
//! visible section and modal selection in a [`SurfaceState`], and reports the
//! user's own picks back to the agent without waiting on the answer.
//!
//! Rendering is external: subscribe to [`SurfaceState`] snapshots and paint.

pub mod catalog;
pub mod channel;
pub mod config;
pub mod entity;
pub mod error;
pub mod memory;
pub mod notifier;
pub mod router;
pub mod session;
pub mod state;
pub mod ws;

pub use {
    channel::{OutboundCall, Registration, RpcChannel, RpcHandler},
    config::{Language, SurfaceConfig},
    error::{Error, Result, TransportError},
    memory::{MemoryChannel, OutboundBehavior},
    router::InboundRouter,
    session::Session,
    state::{ContentKind, SurfaceSnapshot, SurfaceState},
    ws::WsChannel,
};
