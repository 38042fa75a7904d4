//! Id lookup over the currently displayed content.
//!
//! Payloads hold tens of items, so lookup is a linear scan. Ids are always
//! compared through their canonical string form: an agent that sends `7` in
//! one call and `"7"` in the next is talking about the same entity.

use companion_protocol::{EntityId, OrderType};

use crate::{
    entity::EntityRef,
    state::{Content, SelectionTarget},
};

pub fn same_id(a: &EntityId, b: &EntityId) -> bool {
    a.canonical() == b.canonical()
}

/// Find `id` among the entities `target` can select in `content`.
pub fn lookup<'a>(
    content: &'a Content,
    target: SelectionTarget,
    id: &EntityId,
) -> Option<EntityRef<'a>> {
    match (content, target) {
        (Content::Cards(deck), SelectionTarget::Card) => deck
            .cards
            .iter()
            .find(|card| same_id(card.id(), id))
            .map(EntityRef::Card),
        (Content::Orders(book), SelectionTarget::Order(OrderType::Donation)) => book
            .donations
            .iter()
            .find(|order| same_id(&order.id, id))
            .map(EntityRef::Donation),
        (Content::Orders(book), SelectionTarget::Order(OrderType::Sponsorship)) => book
            .sponsorships
            .iter()
            .find(|order| same_id(&order.id, id))
            .map(EntityRef::Sponsorship),
        _ => None,
    }
}

/// Whether `id` is currently selectable as `target`.
pub fn contains(content: &Content, target: SelectionTarget, id: &EntityId) -> bool {
    lookup(content, target, id).is_some()
}
