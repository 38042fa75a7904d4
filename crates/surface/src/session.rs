//! A surface attached to one channel, plus the user-facing selection APIs.

use std::sync::Arc;

use {
    companion_protocol::{EntityId, EntitySummary, OrderType, methods},
    futures::FutureExt,
    serde_json::Value,
    tokio::sync::watch,
    tracing::info,
};

use crate::{
    channel::{Registration, RpcChannel, RpcHandler},
    config::SurfaceConfig,
    error::Result,
    notifier::{Notifier, SelectionEvent},
    router::InboundRouter,
    state::{ModalScope, SelectionTarget, SurfaceSnapshot, SurfaceState},
};

/// One client surface attached to a real-time channel.
///
/// Attaching registers the four inbound methods; they stay registered for as
/// long as the session lives and are released when it is detached or
/// dropped, so reattaching to the same channel never doubles a handler.
pub struct Session {
    state: Arc<SurfaceState>,
    config: Arc<SurfaceConfig>,
    notifier: Notifier,
    registrations: Vec<Registration>,
}

impl Session {
    pub fn attach(channel: Arc<dyn RpcChannel>, config: SurfaceConfig) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let state = Arc::new(SurfaceState::new());
        let router = InboundRouter::new(Arc::clone(&state), Arc::clone(&config));

        // A failed registration drops the ones already acquired.
        let mut registrations = Vec::with_capacity(methods::INBOUND.len());
        for &method in methods::INBOUND {
            let router = router.clone();
            let handler: RpcHandler = Arc::new(move |params: Value| {
                let router = router.clone();
                async move { router.handle(method, params).await }.boxed()
            });
            registrations.push(Registration::acquire(
                Arc::clone(&channel),
                method,
                handler,
            )?);
        }

        let notifier = Notifier::new(channel, &config);
        info!(
            agent = notifier.agent_identity(),
            methods = registrations.len(),
            "surface session attached"
        );
        Ok(Self {
            state,
            config,
            notifier,
            registrations,
        })
    }

    pub fn state(&self) -> &Arc<SurfaceState> {
        &self.state
    }

    pub fn config(&self) -> &SurfaceConfig {
        &self.config
    }

    pub fn subscribe(&self) -> watch::Receiver<SurfaceSnapshot> {
        self.state.subscribe()
    }

    /// The user clicked a card: open its modal right away, then tell the agent
    /// in the background. Only a card that is not displayed fails; delivery
    /// problems are logged and never reach the caller.
    pub async fn select_card(&self, id: impl Into<EntityId>) -> Result<EntitySummary> {
        let id = id.into();
        let opened = self
            .state
            .open(SelectionTarget::Card, &id, self.config.title_language)
            .await?;
        self.notifier.notify_selection(SelectionEvent::Card {
            id: opened.id.clone(),
            title: opened.title.clone(),
        });
        Ok(opened)
    }

    /// The user clicked an order item. Same contract as [`Self::select_card`].
    pub async fn select_order(
        &self,
        order_type: OrderType,
        id: impl Into<EntityId>,
    ) -> Result<EntitySummary> {
        let id = id.into();
        let opened = self
            .state
            .open(
                SelectionTarget::Order(order_type),
                &id,
                self.config.title_language,
            )
            .await?;
        self.notifier.notify_selection(SelectionEvent::Order {
            id: opened.id.clone(),
            order_type,
        });
        Ok(opened)
    }

    /// The user closed the modal. The agent is not told.
    pub async fn dismiss_modal(&self) {
        self.state.close(ModalScope::Any).await;
    }

    /// Ask the agent to voice `text` as a system utterance.
    pub fn send_system_message(&self, text: impl Into<String>) {
        self.notifier.publish_message(text);
    }

    /// Release every registration and clear the surface.
    pub async fn detach(mut self) {
        let released = self.registrations.len();
        self.registrations.clear();
        self.state.reset().await;
        info!(released, "surface session detached");
    }
}
