//! Per-session surface state: the visible content section and the modal
//! selection.
//!
//! Both stores sit behind one lock so every router call mutates them
//! atomically. Each change is published as a [`SurfaceSnapshot`] on a watch
//! channel for the renderer.

use {
    companion_protocol::{EntityId, EntitySummary, OrderType},
    serde::{Serialize, ser::SerializeStruct},
    tokio::sync::{RwLock, watch},
    tracing::{debug, info},
};

use crate::{
    catalog,
    config::Language,
    entity::{self, CardDeck, OrderBook},
    error::{Error, Result},
};

// ── Content ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    None,
    Cards,
    Orders,
}

/// What the agent asked to display. Only one kind is active at a time.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Content {
    #[default]
    None,
    Cards(CardDeck),
    Orders(OrderBook),
}

impl Content {
    pub fn kind(&self) -> ContentKind {
        match self {
            Self::None => ContentKind::None,
            Self::Cards(_) => ContentKind::Cards,
            Self::Orders(_) => ContentKind::Orders,
        }
    }
}

/// The visible section. Hidden implies kind `none` and an empty payload
/// because both are derived from the same [`Content`] value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentSection {
    content: Content,
}

impl ContentSection {
    pub fn visible(&self) -> bool {
        !matches!(self.content, Content::None)
    }

    pub fn kind(&self) -> ContentKind {
        self.content.kind()
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn cards(&self) -> Option<&CardDeck> {
        match &self.content {
            Content::Cards(deck) => Some(deck),
            _ => None,
        }
    }

    pub fn orders(&self) -> Option<&OrderBook> {
        match &self.content {
            Content::Orders(book) => Some(book),
            _ => None,
        }
    }
}

impl Serialize for ContentSection {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        let mut section = serializer.serialize_struct("ContentSection", 3)?;
        section.serialize_field("visible", &self.visible())?;
        section.serialize_field("kind", &self.kind())?;
        match &self.content {
            Content::None => section.serialize_field("payload", &[] as &[()])?,
            Content::Cards(deck) => section.serialize_field("payload", deck)?,
            Content::Orders(book) => section.serialize_field("payload", book)?,
        }
        section.end()
    }
}

// ── Selection ────────────────────────────────────────────────────────────────

/// What a selection points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "orderType", rename_all = "lowercase")]
pub enum SelectionTarget {
    Card,
    Order(OrderType),
}

impl SelectionTarget {
    /// Noun used in "no ... with id" messages.
    pub fn label(&self) -> String {
        match self {
            Self::Card => "card".into(),
            Self::Order(order_type) => format!("{order_type} order"),
        }
    }
}

/// Which modal a close request is allowed to dismiss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalScope {
    Cards,
    Orders,
    Any,
}

impl ModalScope {
    fn covers(&self, target: SelectionTarget) -> bool {
        matches!(
            (self, target),
            (Self::Any, _)
                | (Self::Cards, SelectionTarget::Card)
                | (Self::Orders, SelectionTarget::Order(_))
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub target: SelectionTarget,
    pub id: EntityId,
}

/// At most one selected entity, always a member of the visible section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModalSelection {
    selected: Option<Selection>,
}

impl ModalSelection {
    pub fn selected(&self) -> Option<&Selection> {
        self.selected.as_ref()
    }

    pub fn selected_id(&self) -> Option<&EntityId> {
        self.selected.as_ref().map(|s| &s.id)
    }

    pub fn is_open(&self) -> bool {
        self.selected.is_some()
    }
}

// ── Snapshot ─────────────────────────────────────────────────────────────────

/// Everything a renderer needs to paint the surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SurfaceSnapshot {
    pub section: ContentSection,
    pub selection: ModalSelection,
}

// ── State ────────────────────────────────────────────────────────────────────

pub struct SurfaceState {
    inner: RwLock<SurfaceSnapshot>,
    snapshots: watch::Sender<SurfaceSnapshot>,
}

impl Default for SurfaceState {
    fn default() -> Self {
        Self::new()
    }
}

impl SurfaceState {
    pub fn new() -> Self {
        let (snapshots, _) = watch::channel(SurfaceSnapshot::default());
        Self {
            inner: RwLock::new(SurfaceSnapshot::default()),
            snapshots,
        }
    }

    /// Receive a snapshot after every change.
    pub fn subscribe(&self) -> watch::Receiver<SurfaceSnapshot> {
        self.snapshots.subscribe()
    }

    pub async fn snapshot(&self) -> SurfaceSnapshot {
        self.inner.read().await.clone()
    }

    /// Replace the visible content wholesale and dismiss any open modal.
    pub async fn show(&self, content: Content) {
        let mut inner = self.inner.write().await;
        info!(kind = ?content.kind(), "showing content");
        inner.section.content = content;
        inner.selection.selected = None;
        self.publish(&inner);
    }

    /// Hide everything. Hiding an already hidden surface is a no-op.
    pub async fn hide(&self) {
        let mut inner = self.inner.write().await;
        if inner.section.visible() {
            info!(kind = ?inner.section.kind(), "hiding content");
        }
        inner.section.content = Content::None;
        inner.selection.selected = None;
        self.publish(&inner);
    }

    /// Select `id` if the visible section holds it as `target`. On failure
    /// the state is left untouched.
    pub async fn open(
        &self,
        target: SelectionTarget,
        id: &EntityId,
        lang: Language,
    ) -> Result<EntitySummary> {
        let mut inner = self.inner.write().await;
        let summary = catalog::lookup(inner.section.content(), target, id)
            .map(|found| entity::summarize(found, lang))
            .ok_or_else(|| Error::no_such_entity(target.label(), id))?;
        info!(selection = ?target, id = %summary.id, "modal opened");
        inner.selection.selected = Some(Selection {
            target,
            id: summary.id.clone(),
        });
        self.publish(&inner);
        Ok(summary)
    }

    /// Close the modal if its selection falls within `scope`. Returns whether
    /// anything was closed; closing with nothing open is still a success.
    pub async fn close(&self, scope: ModalScope) -> bool {
        let mut inner = self.inner.write().await;
        let closes = inner
            .selection
            .selected
            .as_ref()
            .is_some_and(|s| scope.covers(s.target));
        if closes {
            inner.selection.selected = None;
            debug!(?scope, "modal closed");
            self.publish(&inner);
        }
        closes
    }

    /// Clear both stores, as on session teardown.
    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        *inner = SurfaceSnapshot::default();
        self.publish(&inner);
    }

    fn publish(&self, current: &SurfaceSnapshot) {
        self.snapshots.send_if_modified(|last| {
            if last == current {
                false
            } else {
                *last = current.clone();
                true
            }
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {
        super::*,
        crate::entity::{Card, CardKind, DonationOrder},
        serde_json::json,
    };

    fn deck() -> Content {
        let cards = vec![
            Card::from_value(CardKind::Project, json!({"id": "c1", "name": "One"})).unwrap(),
            Card::from_value(CardKind::Project, json!({"id": 2, "name": "Two"})).unwrap(),
        ];
        Content::Cards(CardDeck {
            entity_type: CardKind::Project,
            cards,
        })
    }

    fn book() -> Content {
        let donation: DonationOrder = serde_json::from_value(json!({"id": "d1"})).unwrap();
        Content::Orders(OrderBook {
            donations: vec![donation],
            sponsorships: vec![],
        })
    }

    #[tokio::test]
    async fn starts_hidden() {
        let state = SurfaceState::new();
        let snap = state.snapshot().await;
        assert!(!snap.section.visible());
        assert_eq!(snap.section.kind(), ContentKind::None);
        assert!(!snap.selection.is_open());
    }

    #[tokio::test]
    async fn open_then_show_clears_selection() {
        let state = SurfaceState::new();
        state.show(deck()).await;
        state
            .open(SelectionTarget::Card, &"c1".into(), Language::En)
            .await
            .unwrap();
        assert!(state.snapshot().await.selection.is_open());

        state.show(book()).await;
        let snap = state.snapshot().await;
        assert_eq!(snap.section.kind(), ContentKind::Orders);
        assert!(snap.selection.selected_id().is_none());
    }

    #[tokio::test]
    async fn open_missing_leaves_state_unchanged() {
        let state = SurfaceState::new();
        state.show(deck()).await;
        state
            .open(SelectionTarget::Card, &"c1".into(), Language::En)
            .await
            .unwrap();
        let before = state.snapshot().await;

        let err = state
            .open(SelectionTarget::Card, &"missing".into(), Language::En)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "no card with id missing");
        assert_eq!(state.snapshot().await, before);
    }

    #[tokio::test]
    async fn open_numeric_id_by_string() {
        let state = SurfaceState::new();
        state.show(deck()).await;
        let summary = state
            .open(SelectionTarget::Card, &"2".into(), Language::En)
            .await
            .unwrap();
        assert_eq!(summary.title, "Two");
        // The stored id keeps the payload's own representation.
        let snap = state.snapshot().await;
        assert_eq!(
            serde_json::to_value(snap.selection.selected_id().unwrap()).unwrap(),
            json!(2)
        );
    }

    #[tokio::test]
    async fn close_is_scoped_and_idempotent() {
        let state = SurfaceState::new();
        state.show(book()).await;
        state
            .open(
                SelectionTarget::Order(OrderType::Donation),
                &"d1".into(),
                Language::En,
            )
            .await
            .unwrap();

        assert!(!state.close(ModalScope::Cards).await);
        assert!(state.snapshot().await.selection.is_open());
        assert!(state.close(ModalScope::Orders).await);
        assert!(!state.close(ModalScope::Orders).await);
        assert!(!state.snapshot().await.selection.is_open());
    }

    #[tokio::test]
    async fn hide_is_idempotent() {
        let state = SurfaceState::new();
        state.hide().await;
        state.show(deck()).await;
        state.hide().await;
        state.hide().await;
        assert_eq!(state.snapshot().await, SurfaceSnapshot::default());
    }

    #[tokio::test]
    async fn watchers_see_changes_only() {
        let state = SurfaceState::new();
        let mut rx = state.subscribe();
        state.hide().await;
        assert!(!rx.has_changed().unwrap());
        state.show(deck()).await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().section.kind(), ContentKind::Cards);
    }

    #[test]
    fn hidden_section_serializes_empty() {
        let value = serde_json::to_value(ContentSection::default()).unwrap();
        assert_eq!(
            value,
            json!({"visible": false, "kind": "none", "payload": []})
        );
    }
}
