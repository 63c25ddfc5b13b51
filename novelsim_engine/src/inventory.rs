//! inventory.rs -- inventory stacks, item instances and equipment.
//!
//! Stackable items merge into existing slots up to their `max_stack`. Non-stackable
//! items are tracked one unit per slot, each with its own [`ItemInstance`] record in
//! `GameState::item_instances`.

use log::{info, warn};
use novelsim_data::{
    CharacterStats, EquipSlot, GameState, Id, InventorySlot, Item, ItemEffect, ItemInstance, ItemRarity, Story,
};
use thiserror::Error;

use crate::idgen;

const DEFAULT_MAX_STACK: i32 = 99;

/// Source of item templates and pre-rolled item instances.
pub trait ItemCatalog {
    fn item(&self, id: &str) -> Option<&Item>;
    fn instance(&self, uid: &str) -> Option<&ItemInstance>;
}

impl ItemCatalog for Story {
    fn item(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.id == id)
    }

    fn instance(&self, uid: &str) -> Option<&ItemInstance> {
        self.item_instances.get(uid)
    }
}

impl ItemCatalog for Vec<Item> {
    fn item(&self, id: &str) -> Option<&Item> {
        self.iter().find(|i| i.id == id)
    }

    fn instance(&self, _uid: &str) -> Option<&ItemInstance> {
        None
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    #[error("you are not carrying '{0}'")]
    NotHeld(String),
    #[error("'{0}' cannot be used")]
    NotUsable(String),
    #[error("'{0}' cannot be equipped")]
    NotEquipment(String),
    #[error("nothing is equipped in the {0} slot")]
    SlotEmpty(&'static str),
}

/// Total units held whose template id or instance uid equals `id`.
pub fn item_count(state: &GameState, id: &str) -> i32 {
    state
        .inventory
        .iter()
        .filter(|slot| slot_matches(slot, id))
        .map(|slot| slot.quantity.max(0))
        .sum()
}

pub fn has_item(state: &GameState, id: &str) -> bool {
    item_count(state, id) > 0
}

fn slot_matches(slot: &InventorySlot, id: &str) -> bool {
    slot.item_id == id || slot.instance_id.as_deref() == Some(id)
}

/// Add `quantity` units of an item, returning how many units were actually added.
///
/// `id` may be a template id or the uid of a pre-rolled instance from the catalog; an
/// instance is unique, so at most one unit of it is ever added. Unknown ids are treated
/// as plain stackable items.
pub fn add_item(state: &mut GameState, catalog: &dyn ItemCatalog, id: &str, quantity: i32) -> i32 {
    if quantity <= 0 {
        return 0;
    }

    if let Some(instance) = catalog.instance(id) {
        if state.item_instances.contains_key(id) {
            warn!("item instance '{id}' is already owned; not adding it again");
            return 0;
        }
        state.item_instances.insert(id.to_string(), instance.clone());
        state.inventory.push(InventorySlot {
            item_id: instance.template_id.clone(),
            quantity: 1,
            instance_id: Some(id.to_string()),
        });
        return 1;
    }

    match catalog.item(id) {
        Some(template) if !template.stackable => {
            for _ in 0..quantity {
                let uid = next_instance_uid(state, id);
                state.item_instances.insert(
                    uid.clone(),
                    ItemInstance {
                        uid: uid.clone(),
                        template_id: id.to_string(),
                        name: template.name.clone(),
                        level: 1,
                        rarity: ItemRarity::Common,
                        ..ItemInstance::default()
                    },
                );
                state.inventory.push(InventorySlot {
                    item_id: id.to_string(),
                    quantity: 1,
                    instance_id: Some(uid),
                });
            }
            quantity
        },
        Some(template) => {
            add_stackable(state, id, quantity, template.max_stack);
            quantity
        },
        None => {
            warn!("adding unknown item '{id}' as a plain stackable item");
            add_stackable(state, id, quantity, DEFAULT_MAX_STACK);
            quantity
        },
    }
}

fn add_stackable(state: &mut GameState, id: &str, quantity: i32, max_stack: i32) {
    let max_stack = if max_stack > 0 { max_stack } else { DEFAULT_MAX_STACK };
    let mut remaining = quantity;
    for slot in state
        .inventory
        .iter_mut()
        .filter(|s| s.item_id == id && s.instance_id.is_none())
    {
        if remaining == 0 {
            break;
        }
        let room = (max_stack - slot.quantity).max(0);
        let moved = room.min(remaining);
        slot.quantity += moved;
        remaining -= moved;
    }
    while remaining > 0 {
        let moved = remaining.min(max_stack);
        state.inventory.push(InventorySlot {
            item_id: id.to_string(),
            quantity: moved,
            instance_id: None,
        });
        remaining -= moved;
    }
}

/// First free deterministic uid for a new instance of `template_id`.
fn next_instance_uid(state: &GameState, template_id: &str) -> String {
    let mut n = 0;
    loop {
        let uid = idgen::instance_uid(template_id, n);
        if !state.item_instances.contains_key(&uid) && !state.equipment.iter().any(|(_, id)| *id == uid) {
            return uid;
        }
        n += 1;
    }
}

/// Remove up to `quantity` units matching a template id or instance uid.
/// Returns the number of units removed. Emptied slots disappear.
pub fn remove_item(state: &mut GameState, id: &str, quantity: i32) -> i32 {
    let mut remaining = quantity.max(0);
    let mut dropped_instances = Vec::new();
    for slot in state.inventory.iter_mut().filter(|s| slot_matches(s, id)) {
        if remaining == 0 {
            break;
        }
        let taken = slot.quantity.min(remaining);
        slot.quantity -= taken;
        remaining -= taken;
        if slot.quantity <= 0
            && let Some(uid) = &slot.instance_id
        {
            dropped_instances.push(uid.clone());
        }
    }
    state.inventory.retain(|slot| slot.quantity > 0);
    for uid in dropped_instances {
        state.item_instances.remove(&uid);
    }
    quantity.max(0) - remaining
}

/// Template behind a held inventory id, looking through instances when needed.
pub fn held_template<'a>(state: &GameState, catalog: &'a dyn ItemCatalog, id: &str) -> Option<&'a Item> {
    let template_id = state
        .inventory
        .iter()
        .find(|s| slot_matches(s, id))
        .map_or(id, |slot| slot.item_id.as_str());
    catalog.item(template_id)
}

/// Consume one unit of a healing or buff item. Returns the effect that was applied.
///
/// # Errors
/// Fails if the item isn't held or has no usable effect; the state is left unchanged.
pub fn use_item(state: &mut GameState, catalog: &dyn ItemCatalog, id: &str) -> Result<ItemEffect, InventoryError> {
    if !has_item(state, id) {
        return Err(InventoryError::NotHeld(id.to_string()));
    }
    let effect = held_template(state, catalog, id)
        .and_then(|item| item.effect.clone())
        .ok_or_else(|| InventoryError::NotUsable(id.to_string()))?;
    match &effect {
        ItemEffect::Heal { hp, mp } => {
            state.player_stats.adjust_hp(*hp);
            state.player_stats.adjust_mp(*mp);
        },
        ItemEffect::Buff { attribute, value, .. } => {
            let current = state.player_stats.get(attribute);
            state.player_stats.set(attribute, current.saturating_add(*value));
        },
        ItemEffect::EquipmentBonus { .. } => return Err(InventoryError::NotUsable(id.to_string())),
    }
    remove_item(state, id, 1);
    info!("used item '{id}'");
    Ok(effect)
}

/// Move one unit of an equipment item from the inventory into its slot.
///
/// Returns the id previously held in that slot, which goes back into the inventory.
///
/// # Errors
/// Fails if the item isn't held or isn't equipment.
pub fn equip_item(
    state: &mut GameState,
    catalog: &dyn ItemCatalog,
    id: &str,
) -> Result<Option<Id>, InventoryError> {
    let Some(pos) = state.inventory.iter().position(|s| slot_matches(s, id)) else {
        return Err(InventoryError::NotHeld(id.to_string()));
    };
    let slot = catalog
        .item(&state.inventory[pos].item_id)
        .and_then(Item::equip_slot)
        .ok_or_else(|| InventoryError::NotEquipment(id.to_string()))?;

    let held = &mut state.inventory[pos];
    let equipped_id = held.instance_id.clone().unwrap_or_else(|| held.item_id.clone());
    held.quantity -= 1;
    state.inventory.retain(|s| s.quantity > 0);

    let previous = state.equipment.replace(slot, Some(equipped_id.clone()));
    if let Some(prev) = &previous {
        return_to_inventory(state, catalog, prev);
    }
    info!("equipped '{equipped_id}' in {} slot", slot.label());
    Ok(previous)
}

/// Take whatever is in `slot` back into the inventory, returning its id.
///
/// # Errors
/// Fails if the slot is empty.
pub fn unequip_item(state: &mut GameState, catalog: &dyn ItemCatalog, slot: EquipSlot) -> Result<Id, InventoryError> {
    let id = state
        .equipment
        .replace(slot, None)
        .ok_or(InventoryError::SlotEmpty(slot.label()))?;
    return_to_inventory(state, catalog, &id);
    info!("unequipped '{id}' from {} slot", slot.label());
    Ok(id)
}

fn return_to_inventory(state: &mut GameState, catalog: &dyn ItemCatalog, id: &str) {
    if let Some(instance) = state.item_instances.get(id) {
        let template_id = instance.template_id.clone();
        state.inventory.push(InventorySlot {
            item_id: template_id,
            quantity: 1,
            instance_id: Some(id.to_string()),
        });
    } else {
        let max_stack = catalog.item(id).map_or(DEFAULT_MAX_STACK, |i| i.max_stack);
        add_stackable(state, id, 1, max_stack);
    }
}

/// Bonuses granted by one equipped id: template bonus plus the instance's rolled bonus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EquipmentBonus {
    pub attack: i32,
    pub defense: i32,
    pub hp: i32,
    pub mp: i32,
    pub speed: i32,
}

fn bonus_for(state: &GameState, catalog: &dyn ItemCatalog, id: &str) -> EquipmentBonus {
    let instance = state.item_instances.get(id).or_else(|| catalog.instance(id));
    let template_id = instance.map_or(id, |inst| inst.template_id.as_str());
    let mut bonus = EquipmentBonus::default();
    if let Some(Item {
        effect:
            Some(ItemEffect::EquipmentBonus {
                attack_bonus,
                defense_bonus,
                hp_bonus,
                mp_bonus,
                speed_bonus,
                ..
            }),
        ..
    }) = catalog.item(template_id)
    {
        bonus.attack += attack_bonus;
        bonus.defense += defense_bonus;
        bonus.hp += hp_bonus;
        bonus.mp += mp_bonus;
        bonus.speed += speed_bonus;
    }
    if let Some(inst) = instance {
        bonus.attack += inst.bonus_attack;
        bonus.defense += inst.bonus_defense;
        bonus.hp += inst.bonus_hp;
        bonus.mp += inst.bonus_mp;
        bonus.speed += inst.bonus_speed;
    }
    bonus
}

/// Player stats with every equipped item's bonuses applied.
pub fn stats_with_equipment(state: &GameState, catalog: &dyn ItemCatalog) -> CharacterStats {
    let mut stats = state.player_stats.clone();
    for (_, id) in state.equipment.iter() {
        let bonus = bonus_for(state, catalog, id);
        stats.set_attack(stats.attack().saturating_add(bonus.attack));
        stats.set_defense(stats.defense().saturating_add(bonus.defense));
        stats.set_speed(stats.speed().saturating_add(bonus.speed));
        stats.set_max_hp(stats.max_hp().saturating_add(bonus.hp));
        stats.set_current_hp(stats.current_hp().saturating_add(bonus.hp));
        stats.set_max_mp(stats.max_mp().saturating_add(bonus.mp));
        stats.set_current_mp(stats.current_mp().saturating_add(bonus.mp));
    }
    stats
}

/// Display name for an inventory entry: the instance's rolled name, else the template's.
pub fn display_name(state: &GameState, catalog: &dyn ItemCatalog, slot: &InventorySlot) -> String {
    slot.instance_id
        .as_deref()
        .and_then(|uid| state.item_instances.get(uid))
        .map(|inst| inst.name.clone())
        .filter(|name| !name.is_empty())
        .or_else(|| catalog.item(&slot.item_id).map(|i| i.name.clone()))
        .unwrap_or_else(|| slot.item_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use novelsim_data::ItemType;

    fn catalog() -> Vec<Item> {
        vec![
            Item {
                id: "potion".into(),
                name: "Potion".into(),
                item_type: ItemType::Consumable,
                effect: Some(ItemEffect::Heal { hp: 30, mp: 0 }),
                max_stack: 5,
                ..Item::default()
            },
            Item {
                id: "sword".into(),
                name: "Sword".into(),
                item_type: ItemType::Equipment,
                stackable: false,
                effect: Some(ItemEffect::EquipmentBonus {
                    slot: EquipSlot::Weapon,
                    attack_bonus: 5,
                    defense_bonus: 0,
                    hp_bonus: 0,
                    mp_bonus: 0,
                    speed_bonus: 1,
                }),
                ..Item::default()
            },
            Item {
                id: "key".into(),
                name: "Key".into(),
                item_type: ItemType::KeyItem,
                ..Item::default()
            },
        ]
    }

    fn assert_slot_invariant(state: &GameState) {
        for slot in &state.inventory {
            assert!(slot.quantity > 0);
            if slot.instance_id.is_some() {
                assert_eq!(slot.quantity, 1);
            }
        }
    }

    #[test]
    fn stackables_merge_and_overflow() {
        let items = catalog();
        let mut state = GameState::default();
        assert_eq!(add_item(&mut state, &items, "potion", 3), 3);
        assert_eq!(add_item(&mut state, &items, "potion", 4), 4);
        assert_eq!(state.inventory.len(), 2);
        assert_eq!(state.inventory[0].quantity, 5);
        assert_eq!(state.inventory[1].quantity, 2);
        assert_eq!(item_count(&state, "potion"), 7);
        assert_slot_invariant(&state);
    }

    #[test]
    fn non_stackables_get_instances() {
        let items = catalog();
        let mut state = GameState::default();
        add_item(&mut state, &items, "sword", 2);
        assert_eq!(state.inventory.len(), 2);
        assert_eq!(state.item_instances.len(), 2);
        let uids: Vec<_> = state.inventory.iter().filter_map(|s| s.instance_id.clone()).collect();
        assert_ne!(uids[0], uids[1]);
        assert_slot_invariant(&state);
    }

    #[test]
    fn instance_ids_are_deterministic() {
        let items = catalog();
        let mut a = GameState::default();
        let mut b = GameState::default();
        add_item(&mut a, &items, "sword", 1);
        add_item(&mut b, &items, "sword", 1);
        assert_eq!(a.inventory, b.inventory);
    }

    #[test]
    fn remove_across_slots() {
        let items = catalog();
        let mut state = GameState::default();
        add_item(&mut state, &items, "potion", 7);
        assert_eq!(remove_item(&mut state, "potion", 6), 6);
        assert_eq!(item_count(&state, "potion"), 1);
        assert_eq!(state.inventory.len(), 1);
        assert_eq!(remove_item(&mut state, "potion", 4), 1);
        assert!(state.inventory.is_empty());
    }

    #[test]
    fn remove_by_instance_drops_record() {
        let items = catalog();
        let mut state = GameState::default();
        add_item(&mut state, &items, "sword", 2);
        let uid = state.inventory[1].instance_id.clone().unwrap();
        assert_eq!(remove_item(&mut state, &uid, 1), 1);
        assert_eq!(item_count(&state, "sword"), 1);
        assert!(!state.item_instances.contains_key(&uid));
    }

    #[test]
    fn unknown_items_stack() {
        let items = catalog();
        let mut state = GameState::default();
        add_item(&mut state, &items, "key_gold", 1);
        assert!(has_item(&state, "key_gold"));
    }

    #[test]
    fn use_heals_and_consumes() {
        let items = catalog();
        let mut state = GameState::default();
        state.player_stats.set_current_hp(50);
        add_item(&mut state, &items, "potion", 1);
        let effect = use_item(&mut state, &items, "potion").unwrap();
        assert!(matches!(effect, ItemEffect::Heal { hp: 30, .. }));
        assert_eq!(state.player_stats.current_hp(), 80);
        assert!(!has_item(&state, "potion"));
        assert_eq!(
            use_item(&mut state, &items, "potion"),
            Err(InventoryError::NotHeld("potion".into()))
        );
    }

    #[test]
    fn key_items_are_not_usable() {
        let items = catalog();
        let mut state = GameState::default();
        add_item(&mut state, &items, "key", 1);
        assert!(matches!(
            use_item(&mut state, &items, "key"),
            Err(InventoryError::NotUsable(_))
        ));
        assert!(has_item(&state, "key"));
    }

    #[test]
    fn equip_swap_and_unequip() {
        let items = catalog();
        let mut state = GameState::default();
        add_item(&mut state, &items, "sword", 2);
        let first = state.inventory[0].instance_id.clone().unwrap();
        let second = state.inventory[1].instance_id.clone().unwrap();

        assert_eq!(equip_item(&mut state, &items, &first).unwrap(), None);
        assert_eq!(state.inventory.len(), 1);
        assert!(state.item_instances.contains_key(&first));

        let boosted = stats_with_equipment(&state, &items);
        assert_eq!(boosted.attack(), 15);
        assert_eq!(boosted.speed(), 11);

        assert_eq!(equip_item(&mut state, &items, &second).unwrap(), Some(first.clone()));
        assert!(has_item(&state, &first));
        assert_slot_invariant(&state);

        assert_eq!(unequip_item(&mut state, &items, EquipSlot::Weapon).unwrap(), second);
        assert_eq!(item_count(&state, "sword"), 2);
        assert_eq!(
            unequip_item(&mut state, &items, EquipSlot::Weapon),
            Err(InventoryError::SlotEmpty("weapon"))
        );
    }

    #[test]
    fn consumables_cannot_be_equipped() {
        let items = catalog();
        let mut state = GameState::default();
        add_item(&mut state, &items, "potion", 1);
        assert!(matches!(
            equip_item(&mut state, &items, "potion"),
            Err(InventoryError::NotEquipment(_))
        ));
        assert!(has_item(&state, "potion"));
    }

    #[test]
    fn rolled_instance_bonus_stacks_with_template() {
        let items = catalog();
        let mut story = Story {
            items: items.clone(),
            ..Story::default()
        };
        story.item_instances.insert(
            "loot-1".into(),
            ItemInstance {
                uid: "loot-1".into(),
                template_id: "sword".into(),
                name: "Keen Sword".into(),
                level: 3,
                rarity: ItemRarity::Rare,
                bonus_attack: 15,
                ..ItemInstance::default()
            },
        );
        let mut state = GameState::default();
        assert_eq!(add_item(&mut state, &story, "loot-1", 1), 1);
        assert_eq!(add_item(&mut state, &story, "loot-1", 1), 0);
        assert_eq!(display_name(&state, &story, &state.inventory[0]), "Keen Sword");
        equip_item(&mut state, &story, "loot-1").unwrap();
        assert_eq!(stats_with_equipment(&state, &story).attack(), 30);
    }
}
