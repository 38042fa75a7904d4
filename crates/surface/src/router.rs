//! Inbound call router for the four `client.*` methods.
//!
//! Each call is decoded and validated in full before the state lock is taken,
//! so a rejected call never leaves a partial mutation behind. Failures are
//! returned as `{status: "error", message}` bodies; nothing here surfaces as a
//! transport fault.

use std::sync::Arc;

use {
    companion_protocol::{
        CallResponse, EntityId, EntitySummary, OrderType, SuccessBody, decode, encode, encoded_len,
        methods,
    },
    serde::de::DeserializeOwned,
    serde_json::{Map, Value},
    tracing::{debug, error, warn},
};

use crate::{
    config::{Language, SurfaceConfig},
    entity::{self, Card, CardDeck, CardKind, EntityRef, OrderBook},
    error::{Error, Result},
    state::{Content, ModalScope, SelectionTarget, SurfaceState},
};

/// Served when a response body cannot be serialized.
const ENCODE_FAILURE_BODY: &str =
    r#"{"status":"error","message":"internal error: failed to encode response"}"#;

type Params = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DisplayAction {
    Show,
    Hide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModalAction {
    Open,
    Close,
}

fn parse_action<T: Copy>(params: &Params, allowed: &[(&str, T)]) -> Result<T> {
    let raw = match params.get("action") {
        None | Some(Value::Null) => return Err(Error::MissingField { field: "action" }),
        Some(raw) => raw,
    };
    raw.as_str()
        .and_then(|action| {
            allowed
                .iter()
                .find(|(name, _)| *name == action)
                .map(|(_, value)| *value)
        })
        .ok_or_else(|| Error::InvalidAction {
            action: match raw {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        })
}

fn display_action(params: &Params) -> Result<DisplayAction> {
    parse_action(params, &[
        ("show", DisplayAction::Show),
        ("hide", DisplayAction::Hide),
    ])
}

fn modal_action(params: &Params) -> Result<ModalAction> {
    parse_action(params, &[
        ("open", ModalAction::Open),
        ("close", ModalAction::Close),
    ])
}

/// A string or numeric id. Blank strings count as missing.
fn required_id(params: &Params, field: &'static str) -> Result<EntityId> {
    let raw = match params.get(field) {
        None | Some(Value::Null) => return Err(Error::MissingField { field }),
        Some(raw) => raw,
    };
    let id = EntityId::from_value(raw)
        .ok_or_else(|| Error::invalid_field(field, "must be a string or number"))?;
    if id.is_blank() {
        return Err(Error::MissingField { field });
    }
    Ok(id)
}

fn required_str<'a>(params: &'a Params, field: &'static str) -> Result<&'a str> {
    match params.get(field) {
        None | Some(Value::Null) => Err(Error::MissingField { field }),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(Error::invalid_field(field, "must be a string")),
    }
}

/// List field. `None` when absent or null.
fn optional_list<'a>(params: &'a Params, field: &str) -> Result<Option<&'a Vec<Value>>> {
    match params.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items)),
        Some(_) => Err(Error::invalid_field(field, "must be a list")),
    }
}

fn parse_items<T: DeserializeOwned>(field: &str, items: Option<&Vec<Value>>) -> Result<Vec<T>> {
    items
        .into_iter()
        .flatten()
        .enumerate()
        .map(|(i, item)| {
            serde_json::from_value(item.clone())
                .map_err(|e| Error::invalid_field(format!("{field}[{i}]"), e.to_string()))
        })
        .collect()
}

#[derive(Clone)]
pub struct InboundRouter {
    state: Arc<SurfaceState>,
    config: Arc<SurfaceConfig>,
}

impl InboundRouter {
    pub fn new(state: Arc<SurfaceState>, config: Arc<SurfaceConfig>) -> Self {
        Self { state, config }
    }

    pub fn state(&self) -> &Arc<SurfaceState> {
        &self.state
    }

    /// Route `method` and serialize the response body.
    pub async fn handle(&self, method: &str, raw: Value) -> String {
        let response = self.dispatch(method, raw).await;
        encode(&response).unwrap_or_else(|e| {
            error!(method, error = %e, "failed to encode response");
            ENCODE_FAILURE_BODY.to_string()
        })
    }

    pub async fn dispatch(&self, method: &str, raw: Value) -> CallResponse {
        match method {
            methods::DISPLAY_CARDS => self.display_cards(raw).await,
            methods::CONTROL_CARD_MODAL => self.control_card_modal(raw).await,
            methods::DISPLAY_ORDERS => self.display_orders(raw).await,
            methods::CONTROL_ORDER_MODAL => self.control_order_modal(raw).await,
            other => {
                warn!(method = other, "unknown inbound method");
                CallResponse::error(format!("unknown method: {other}"))
            },
        }
    }

    pub async fn display_cards(&self, raw: Value) -> CallResponse {
        let result = self.try_display_cards(raw).await;
        respond(methods::DISPLAY_CARDS, result)
    }

    pub async fn control_card_modal(&self, raw: Value) -> CallResponse {
        let result = self.try_control_card_modal(raw).await;
        respond(methods::CONTROL_CARD_MODAL, result)
    }

    pub async fn display_orders(&self, raw: Value) -> CallResponse {
        let result = self.try_display_orders(raw).await;
        respond(methods::DISPLAY_ORDERS, result)
    }

    pub async fn control_order_modal(&self, raw: Value) -> CallResponse {
        let result = self.try_control_order_modal(raw).await;
        respond(methods::CONTROL_ORDER_MODAL, result)
    }

    // ── Handlers ─────────────────────────────────────────────────────────────

    async fn try_display_cards(&self, raw: Value) -> Result<SuccessBody> {
        let params = self.decode(raw)?;
        if display_action(&params)? == DisplayAction::Hide {
            self.state.hide().await;
            return Ok(SuccessBody::Done {});
        }

        let items = optional_list(&params, "cards")?.ok_or(Error::MissingField { field: "cards" })?;
        let entity_type = required_str(&params, "entityType")?;
        let kind = CardKind::parse(entity_type).ok_or_else(|| {
            Error::invalid_field("entityType", format!("unknown entity type '{entity_type}'"))
        })?;

        let lang = self.config.title_language;
        let mut cards = Vec::with_capacity(items.len());
        let mut summaries = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let card = Card::from_value(kind, item.clone())
                .map_err(|e| Error::invalid_field(format!("cards[{i}]"), e.to_string()))?;
            summaries.push(titled(EntityRef::Card(&card), lang, || format!("cards[{i}]"))?);
            cards.push(card);
        }

        self.state
            .show(Content::Cards(CardDeck {
                entity_type: kind,
                cards,
            }))
            .await;
        Ok(SuccessBody::Cards { cards: summaries })
    }

    async fn try_control_card_modal(&self, raw: Value) -> Result<SuccessBody> {
        let params = self.decode(raw)?;
        match modal_action(&params)? {
            ModalAction::Close => {
                self.state.close(ModalScope::Cards).await;
                Ok(SuccessBody::Done {})
            },
            ModalAction::Open => {
                let card_id = required_id(&params, "cardId")?;
                let opened = self
                    .state
                    .open(SelectionTarget::Card, &card_id, self.config.title_language)
                    .await?;
                Ok(SuccessBody::CardOpened {
                    message: format!("card {card_id}, {} is open", opened.title),
                    card_id,
                })
            },
        }
    }

    async fn try_display_orders(&self, raw: Value) -> Result<SuccessBody> {
        let params = self.decode(raw)?;
        if display_action(&params)? == DisplayAction::Hide {
            self.state.hide().await;
            return Ok(SuccessBody::Done {});
        }

        let book = OrderBook {
            donations: parse_items("donations", optional_list(&params, "donations")?)?,
            sponsorships: parse_items("sponsorships", optional_list(&params, "sponsorships")?)?,
        };

        let lang = self.config.title_language;
        let donations = book
            .donations
            .iter()
            .enumerate()
            .map(|(i, order)| titled(EntityRef::Donation(order), lang, || format!("donations[{i}]")))
            .collect::<Result<Vec<_>>>()?;
        let sponsorships = book
            .sponsorships
            .iter()
            .enumerate()
            .map(|(i, order)| {
                titled(EntityRef::Sponsorship(order), lang, || {
                    format!("sponsorships[{i}]")
                })
            })
            .collect::<Result<Vec<_>>>()?;

        self.state.show(Content::Orders(book)).await;
        Ok(SuccessBody::Orders {
            donations,
            sponsorships,
        })
    }

    async fn try_control_order_modal(&self, raw: Value) -> Result<SuccessBody> {
        let params = self.decode(raw)?;
        match modal_action(&params)? {
            ModalAction::Close => {
                self.state.close(ModalScope::Orders).await;
                Ok(SuccessBody::Done {})
            },
            ModalAction::Open => {
                let order_id = required_id(&params, "orderId")?;
                let raw_type = required_str(&params, "orderType")?;
                let order_type = OrderType::parse(raw_type).ok_or_else(|| {
                    Error::invalid_field(
                        "orderType",
                        format!("expected donation or sponsorship, got '{raw_type}'"),
                    )
                })?;
                let opened = self
                    .state
                    .open(
                        SelectionTarget::Order(order_type),
                        &order_id,
                        self.config.title_language,
                    )
                    .await?;
                Ok(SuccessBody::OrderOpened {
                    message: format!("{order_type} order {order_id}, {} is open", opened.title),
                    order_id,
                    order_type,
                })
            },
        }
    }

    /// Size-check and decode a raw payload into an object.
    fn decode(&self, raw: Value) -> Result<Params> {
        let size = encoded_len(&raw);
        let max = self.config.max_payload_bytes;
        if size > max {
            return Err(Error::PayloadTooLarge { size, max });
        }
        Ok(decode(raw)?)
    }
}

/// Summary of a freshly received entity, which must carry a title.
fn titled(
    entity: EntityRef<'_>,
    lang: Language,
    field: impl FnOnce() -> String,
) -> Result<EntitySummary> {
    if entity::title_of(entity, lang).is_none() {
        return Err(Error::invalid_field(field(), "has no title"));
    }
    Ok(entity::summarize(entity, lang))
}

fn respond(method: &str, result: Result<SuccessBody>) -> CallResponse {
    match result {
        Ok(body) => {
            debug!(method, "inbound call succeeded");
            CallResponse::Success(body)
        },
        Err(e) => {
            if e.is_caller_error() {
                warn!(method, code = e.code(), error = %e, "inbound call rejected");
            } else {
                error!(method, code = e.code(), error = %e, "inbound call failed");
            }
            CallResponse::error(e.to_string())
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {
        super::*,
        crate::state::ContentKind,
        rstest::rstest,
        serde_json::json,
    };

    fn router() -> InboundRouter {
        InboundRouter::new(
            Arc::new(SurfaceState::new()),
            Arc::new(SurfaceConfig::default()),
        )
    }

    fn error_message(response: CallResponse) -> String {
        match response {
            CallResponse::Error { message } => message,
            other => panic!("expected error, got {other:?}"),
        }
    }

    async fn show_project(router: &InboundRouter) {
        let response = router
            .display_cards(json!({
                "action": "show",
                "entityType": "project",
                "cards": [
                    {"id": "c1", "name": {"ar": "م", "en": "Project One"}},
                    {"id": 2, "name": {"en": "Project Two"}},
                ],
            }))
            .await;
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn show_cards_returns_titles() {
        let router = router();
        let response = router
            .display_cards(json!({
                "action": "show",
                "entityType": "faq",
                "cards": [{"id": "f1", "question": {"en": "Why?"}, "answer": "Because."}],
            }))
            .await;
        assert_eq!(
            serde_json::to_value(response).unwrap(),
            json!({"status": "success", "cards": [{"id": "f1", "title": "Why?"}]})
        );
    }

    #[tokio::test]
    async fn text_payload_is_accepted() {
        let router = router();
        let text = r#"{"action":"show","entityType":"charity","cards":[{"id":"x","name":"X"}]}"#;
        assert!(router.display_cards(json!(text)).await.is_success());
        let snap = router.state().snapshot().await;
        assert_eq!(snap.section.kind(), ContentKind::Cards);
    }

    #[rstest]
    #[case::missing_action(json!({"cards": []}), "missing required field: action")]
    #[case::bad_action(json!({"action": "toggle"}), "invalid action: toggle")]
    #[case::numeric_action(json!({"action": 3}), "invalid action: 3")]
    #[case::missing_cards(json!({"action": "show", "entityType": "project"}), "missing required field: cards")]
    #[case::non_list_cards(json!({"action": "show", "entityType": "project", "cards": "c1"}), "invalid cards: must be a list")]
    #[case::missing_type(json!({"action": "show", "cards": []}), "missing required field: entityType")]
    #[case::unknown_type(json!({"action": "show", "entityType": "zakat", "cards": []}), "invalid entityType: unknown entity type 'zakat'")]
    #[case::not_json(json!("{oops"), "invalid payload: malformed JSON")]
    #[tokio::test]
    async fn invalid_display_cards_leaves_state(#[case] params: Value, #[case] expected: &str) {
        let router = router();
        show_project(&router).await;
        let before = router.state().snapshot().await;

        let message = error_message(router.display_cards(params).await);
        assert!(message.starts_with(expected), "{message}");
        assert_eq!(router.state().snapshot().await, before);
    }

    #[tokio::test]
    async fn card_without_title_is_rejected() {
        let router = router();
        let message = error_message(
            router
                .display_cards(json!({
                    "action": "show",
                    "entityType": "project",
                    "cards": [{"id": "c1", "name": {"en": " "}}],
                }))
                .await,
        );
        assert_eq!(message, "invalid cards[0]: has no title");
        assert!(!router.state().snapshot().await.section.visible());
    }

    #[tokio::test]
    async fn open_echoes_requested_id() {
        let router = router();
        show_project(&router).await;
        let response = router
            .control_card_modal(json!({"action": "open", "cardId": "2"}))
            .await;
        assert_eq!(
            serde_json::to_value(response).unwrap(),
            json!({"status": "success", "cardId": "2", "message": "card 2, Project Two is open"})
        );
    }

    #[tokio::test]
    async fn open_requires_card_id() {
        let router = router();
        show_project(&router).await;
        for params in [json!({"action": "open"}), json!({"action": "open", "cardId": ""})] {
            let message = error_message(router.control_card_modal(params).await);
            assert_eq!(message, "missing required field: cardId");
        }
    }

    #[tokio::test]
    async fn close_without_open_modal_succeeds() {
        let router = router();
        let response = router.control_card_modal(json!({"action": "close"})).await;
        assert_eq!(response, CallResponse::done());
    }

    #[tokio::test]
    async fn orders_default_missing_lists_to_empty() {
        let router = router();
        let response = router
            .display_orders(json!({"action": "show", "donations": [{"id": "d1", "amount": 10}]}))
            .await;
        assert_eq!(
            serde_json::to_value(response).unwrap(),
            json!({
                "status": "success",
                "donations": [{"id": "d1", "title": "General donation"}],
                "sponsorships": [],
            })
        );
    }

    #[tokio::test]
    async fn non_list_orders_are_rejected() {
        let router = router();
        let message = error_message(
            router
                .display_orders(json!({"action": "show", "donations": [], "sponsorships": {}}))
                .await,
        );
        assert_eq!(message, "invalid sponsorships: must be a list");
    }

    #[tokio::test]
    async fn order_modal_opens_by_type() {
        let router = router();
        router
            .display_orders(json!({
                "action": "show",
                "donations": [{"id": "o1", "name": "Water well"}],
                "sponsorships": [{"id": "o1", "name": {"ar": "طالب", "en": "Student"}}],
            }))
            .await;

        let response = router
            .control_order_modal(json!({"action": "open", "orderId": "o1", "orderType": "sponsorship"}))
            .await;
        assert_eq!(
            serde_json::to_value(response).unwrap(),
            json!({
                "status": "success",
                "orderId": "o1",
                "orderType": "sponsorship",
                "message": "sponsorship order o1, Student is open",
            })
        );
        let snap = router.state().snapshot().await;
        let selected = snap.selection.selected().unwrap();
        assert_eq!(selected.target, SelectionTarget::Order(OrderType::Sponsorship));
    }

    #[rstest]
    #[case::missing_type(json!({"action": "open", "orderId": "o1"}), "missing required field: orderType")]
    #[case::bad_type(json!({"action": "open", "orderId": "o1", "orderType": "gift"}), "invalid orderType: expected donation or sponsorship, got 'gift'")]
    #[case::missing_id(json!({"action": "open", "orderType": "donation"}), "missing required field: orderId")]
    #[case::unknown_id(json!({"action": "open", "orderId": "zz", "orderType": "donation"}), "no donation order with id zz")]
    #[case::wrong_list(json!({"action": "open", "orderId": "d1", "orderType": "sponsorship"}), "no sponsorship order with id d1")]
    #[tokio::test]
    async fn invalid_order_modal_calls(#[case] params: Value, #[case] expected: &str) {
        let router = router();
        router
            .display_orders(json!({"action": "show", "donations": [{"id": "d1"}]}))
            .await;
        let message = error_message(router.control_order_modal(params).await);
        assert_eq!(message, expected);
        assert!(!router.state().snapshot().await.selection.is_open());
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected() {
        let router = InboundRouter::new(
            Arc::new(SurfaceState::new()),
            Arc::new(SurfaceConfig {
                max_payload_bytes: 16,
                ..SurfaceConfig::default()
            }),
        );
        let message = error_message(
            router
                .display_cards(json!({"action": "show", "entityType": "project", "cards": []}))
                .await,
        );
        assert!(message.starts_with("payload too large"), "{message}");
    }

    #[tokio::test]
    async fn arabic_titles_when_configured() {
        let router = InboundRouter::new(
            Arc::new(SurfaceState::new()),
            Arc::new(SurfaceConfig {
                title_language: Language::Ar,
                ..SurfaceConfig::default()
            }),
        );
        show_project(&router).await;
        let response = router
            .control_card_modal(json!({"action": "open", "cardId": "c1"}))
            .await;
        match response {
            CallResponse::Success(SuccessBody::CardOpened { message, .. }) => {
                assert_eq!(message, "card c1, م is open");
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn handle_serializes_unknown_method_error() {
        let router = router();
        let text = router.handle("client.nope", json!({})).await;
        assert_eq!(
            serde_json::from_str::<Value>(&text).unwrap(),
            json!({"status": "error", "message": "unknown method: client.nope"})
        );
    }
}
