//! Entity snapshots pushed by the agent.
//!
//! Cards and order items are immutable: the surface only decides which of
//! them is displayed or selected. Fields the surface does not interpret are
//! kept verbatim in `extra` so a stored payload serializes back to exactly
//! what the agent sent.

use std::fmt;

use {
    companion_protocol::{EntityId, EntitySummary, OrderType},
    serde::{Deserialize, Deserializer, Serialize},
    serde_json::{Map, Value},
};

use crate::config::Language;

/// Title shown for donation items that carry no name of their own.
pub const GENERAL_DONATION_LABEL: &str = "General donation";

// ── Text ─────────────────────────────────────────────────────────────────────

/// Bilingual text as sent by the agent: either a plain string or an
/// `{ar, en}` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocalizedText {
    Plain(String),
    Pair(TextPair),
}

/// Optional members are `None` when absent and `Some(None)` when sent as an
/// explicit `null`, so either form serializes back as it arrived.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextPair {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub ar: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub en: Option<Option<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LocalizedText {
    /// Text in `lang`, falling back to the other language when blank.
    pub fn get(&self, lang: Language) -> Option<&str> {
        match self {
            Self::Plain(text) => non_blank(Some(text)),
            Self::Pair(pair) => {
                let (preferred, fallback) = match lang {
                    Language::En => (&pair.en, &pair.ar),
                    Language::Ar => (&pair.ar, &pair.en),
                };
                non_blank(preferred.as_ref().and_then(Option::as_ref))
                    .or_else(|| non_blank(fallback.as_ref().and_then(Option::as_ref)))
            },
        }
    }
}

/// The text as sent, unless it is empty or whitespace only.
fn non_blank(text: Option<&String>) -> Option<&str> {
    text.map(String::as_str).filter(|s| !s.trim().is_empty())
}

/// Marks a member as present even when its value is `null`. Absent members
/// fall back to `#[serde(default)]`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// ── Cards ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardKind {
    Sponsorship,
    Project,
    Faq,
    Charity,
    Atonement,
}

impl CardKind {
    pub const ALL: [Self; 5] = [
        Self::Sponsorship,
        Self::Project,
        Self::Faq,
        Self::Charity,
        Self::Atonement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sponsorship => "sponsorship",
            Self::Project => "project",
            Self::Faq => "faq",
            Self::Charity => "charity",
            Self::Atonement => "atonement",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl fmt::Display for CardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Card titled by its `name` (every kind except FAQ).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedCard {
    pub id: EntityId,
    pub name: LocalizedText,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<LocalizedText>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// FAQ entry, titled by its `question`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqCard {
    pub id: EntityId,
    pub question: LocalizedText,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub answer: Option<Option<LocalizedText>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A displayed card. The variant is chosen by the call's `entityType`,
/// which is not repeated inside the card object itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Card {
    Sponsorship(NamedCard),
    Project(NamedCard),
    Faq(FaqCard),
    Charity(NamedCard),
    Atonement(NamedCard),
}

impl Card {
    pub fn from_value(kind: CardKind, value: Value) -> serde_json::Result<Self> {
        Ok(match kind {
            CardKind::Sponsorship => Self::Sponsorship(serde_json::from_value(value)?),
            CardKind::Project => Self::Project(serde_json::from_value(value)?),
            CardKind::Faq => Self::Faq(serde_json::from_value(value)?),
            CardKind::Charity => Self::Charity(serde_json::from_value(value)?),
            CardKind::Atonement => Self::Atonement(serde_json::from_value(value)?),
        })
    }

    pub fn kind(&self) -> CardKind {
        match self {
            Self::Sponsorship(_) => CardKind::Sponsorship,
            Self::Project(_) => CardKind::Project,
            Self::Faq(_) => CardKind::Faq,
            Self::Charity(_) => CardKind::Charity,
            Self::Atonement(_) => CardKind::Atonement,
        }
    }

    pub fn id(&self) -> &EntityId {
        match self {
            Self::Faq(card) => &card.id,
            Self::Sponsorship(card)
            | Self::Project(card)
            | Self::Charity(card)
            | Self::Atonement(card) => &card.id,
        }
    }
}

/// Cards of one kind, shown together.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardDeck {
    pub entity_type: CardKind,
    pub cards: Vec<Card>,
}

// ── Orders ───────────────────────────────────────────────────────────────────

/// Donation line. Items without a name are general donations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonationOrder {
    pub id: EntityId,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub name: Option<Option<LocalizedText>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SponsorshipOrder {
    pub id: EntityId,
    pub name: LocalizedText,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrderBook {
    pub donations: Vec<DonationOrder>,
    pub sponsorships: Vec<SponsorshipOrder>,
}

// ── Titles ───────────────────────────────────────────────────────────────────

/// Borrowed view over anything that can be displayed and titled.
#[derive(Debug, Clone, Copy)]
pub enum EntityRef<'a> {
    Card(&'a Card),
    Donation(&'a DonationOrder),
    Sponsorship(&'a SponsorshipOrder),
}

impl<'a> EntityRef<'a> {
    pub fn id(&self) -> &'a EntityId {
        match self {
            Self::Card(card) => card.id(),
            Self::Donation(order) => &order.id,
            Self::Sponsorship(order) => &order.id,
        }
    }

    /// Order type for order entries, `None` for cards.
    pub fn order_type(&self) -> Option<OrderType> {
        match self {
            Self::Card(_) => None,
            Self::Donation(_) => Some(OrderType::Donation),
            Self::Sponsorship(_) => Some(OrderType::Sponsorship),
        }
    }
}

/// The single place titles are derived. Returns `None` only when an entity
/// that requires text has none in either language.
pub fn title_of(entity: EntityRef<'_>, lang: Language) -> Option<String> {
    let text = match entity {
        EntityRef::Card(Card::Faq(card)) => card.question.get(lang),
        EntityRef::Card(
            Card::Sponsorship(card)
            | Card::Project(card)
            | Card::Charity(card)
            | Card::Atonement(card),
        ) => card.name.get(lang),
        EntityRef::Donation(order) => {
            return Some(
                order
                    .name
                    .as_ref()
                    .and_then(Option::as_ref)
                    .and_then(|name| name.get(lang))
                    .unwrap_or(GENERAL_DONATION_LABEL)
                    .to_string(),
            );
        },
        EntityRef::Sponsorship(order) => order.name.get(lang),
    };
    text.map(String::from)
}

/// `{id, title}` summary for a response body.
pub fn summarize(entity: EntityRef<'_>, lang: Language) -> EntitySummary {
    EntitySummary {
        id: entity.id().clone(),
        title: title_of(entity, lang).unwrap_or_default(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, serde_json::json};

    fn project(value: Value) -> Card {
        Card::from_value(CardKind::Project, value).unwrap()
    }

    #[test]
    fn named_card_title_prefers_language() {
        let card = project(json!({"id": "c1", "name": {"ar": "مشروع", "en": "Project One"}}));
        assert_eq!(
            title_of(EntityRef::Card(&card), Language::En).as_deref(),
            Some("Project One")
        );
        assert_eq!(
            title_of(EntityRef::Card(&card), Language::Ar).as_deref(),
            Some("مشروع")
        );
    }

    #[test]
    fn blank_language_falls_back() {
        let card = project(json!({"id": "c1", "name": {"ar": "مشروع", "en": "  "}}));
        assert_eq!(
            title_of(EntityRef::Card(&card), Language::En).as_deref(),
            Some("مشروع")
        );
    }

    #[test]
    fn faq_is_titled_by_question() {
        let card = Card::from_value(
            CardKind::Faq,
            json!({"id": 3, "question": {"en": "How do I give?"}, "answer": "Online."}),
        )
        .unwrap();
        assert_eq!(card.kind(), CardKind::Faq);
        assert_eq!(
            title_of(EntityRef::Card(&card), Language::En).as_deref(),
            Some("How do I give?")
        );
    }

    #[test]
    fn faq_without_question_is_rejected() {
        assert!(Card::from_value(CardKind::Faq, json!({"id": 3, "name": "x"})).is_err());
    }

    #[test]
    fn unnamed_donation_uses_general_label() {
        let order: DonationOrder = serde_json::from_value(json!({"id": "d1", "amount": 50})).unwrap();
        assert_eq!(
            title_of(EntityRef::Donation(&order), Language::En).as_deref(),
            Some(GENERAL_DONATION_LABEL)
        );
    }

    #[test]
    fn card_serializes_back_unchanged() {
        let raw = json!({
            "id": 12,
            "name": {"ar": "كفالة", "en": "Orphan sponsorship", "note": "x"},
            "description": "Monthly",
            "payment": {"currency": "SAR", "amounts": [100, 250]},
            "raised": 1200.5,
        });
        let card = Card::from_value(CardKind::Sponsorship, raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&card).unwrap(), raw);
    }

    #[test]
    fn explicit_nulls_serialize_back() {
        let raw = json!({
            "id": "c1",
            "name": {"ar": null, "en": "One"},
            "description": null,
        });
        let card = project(raw.clone());
        assert_eq!(serde_json::to_value(&card).unwrap(), raw);
        assert_eq!(
            title_of(EntityRef::Card(&card), Language::Ar).as_deref(),
            Some("One")
        );

        let raw = json!({"id": "d1", "name": null, "amount": 5});
        let order: DonationOrder = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&order).unwrap(), raw);
        assert_eq!(
            title_of(EntityRef::Donation(&order), Language::En).as_deref(),
            Some(GENERAL_DONATION_LABEL)
        );
    }

    #[test]
    fn titles_keep_surrounding_whitespace() {
        let card = project(json!({"id": "c1", "name": " Project One "}));
        assert_eq!(
            title_of(EntityRef::Card(&card), Language::En).as_deref(),
            Some(" Project One ")
        );
    }

    #[test]
    fn card_kind_parse_matches_wire_names() {
        for kind in CardKind::ALL {
            assert_eq!(CardKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(CardKind::parse("Project"), None);
    }

    #[test]
    fn summary_keeps_numeric_id() {
        let order: SponsorshipOrder =
            serde_json::from_value(json!({"id": 9, "name": "Student"})).unwrap();
        let summary = summarize(EntityRef::Sponsorship(&order), Language::En);
        assert_eq!(
            serde_json::to_value(summary).unwrap(),
            json!({"id": 9, "title": "Student"})
        );
    }
}
