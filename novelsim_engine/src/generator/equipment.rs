//! Equipment templates and rolled loot.

use novelsim_data::{EquipSlot, Item, ItemEffect, ItemInstance, ItemRarity, ItemType};
use rand::{Rng, RngCore};

use crate::names::NameProvider;

/// Cumulative rarity table in percent. Mythic is never rolled here.
const RARITY_TABLE: [(u32, ItemRarity); 5] = [
    (60, ItemRarity::Common),
    (85, ItemRarity::Uncommon),
    (95, ItemRarity::Rare),
    (99, ItemRarity::Epic),
    (100, ItemRarity::Legendary),
];

pub fn roll_rarity(rng: &mut dyn RngCore) -> ItemRarity {
    let roll = rng.random_range(0..100);
    RARITY_TABLE
        .iter()
        .find(|(ceiling, _)| roll < *ceiling)
        .map_or(ItemRarity::Common, |(_, rarity)| *rarity)
}

/// Template id for the generated base item of a slot.
pub fn template_id(slot: EquipSlot) -> String {
    format!("gear_{}", slot.label())
}

/// One non-stackable base item per equipment slot.
pub fn base_templates(names: &NameProvider, rng: &mut dyn RngCore) -> Vec<Item> {
    EquipSlot::ALL
        .into_iter()
        .map(|slot| {
            let (attack, defense, speed) = match slot {
                EquipSlot::Weapon => (3, 0, 0),
                EquipSlot::Armor => (0, 3, 0),
                EquipSlot::Accessory => (1, 1, 0),
                EquipSlot::Head => (0, 2, 0),
                EquipSlot::Boots => (0, 1, 2),
            };
            Item {
                id: template_id(slot),
                name: names.equipment_name(slot, rng),
                description: format!("A piece of {} gear.", slot.label()),
                item_type: ItemType::Equipment,
                effect: Some(ItemEffect::EquipmentBonus {
                    slot,
                    attack_bonus: attack,
                    defense_bonus: defense,
                    hp_bonus: 0,
                    mp_bonus: 0,
                    speed_bonus: speed,
                }),
                price: 20 * (attack + defense + speed),
                stackable: false,
                max_stack: 1,
                ..Item::default()
            }
        })
        .collect()
}

/// Roll a concrete piece of loot from `template` at item `level`.
///
/// The bonus is `trunc(level * 2 * rarity multiplier)`; weapons and accessories get it as
/// attack, armour pieces as defense. Boots also gain speed.
pub fn roll_instance(template: &Item, uid: String, level: i32, rng: &mut dyn RngCore) -> ItemInstance {
    let rarity = roll_rarity(rng);
    let bonus = (f64::from(level.max(1)) * 2.0 * rarity.multiplier()) as i32;
    let slot = template.equip_slot();
    let (bonus_attack, bonus_defense) = match slot {
        Some(EquipSlot::Weapon | EquipSlot::Accessory) => (bonus, 0),
        Some(EquipSlot::Armor | EquipSlot::Head | EquipSlot::Boots) | None => (0, bonus),
    };
    let bonus_speed = if slot == Some(EquipSlot::Boots) { bonus / 2 } else { 0 };
    let name = match rarity {
        ItemRarity::Common => template.name.clone(),
        _ => format!("{} {}", capitalize(rarity.label()), template.name),
    };
    ItemInstance {
        uid,
        template_id: template.id.clone(),
        name,
        level: level.max(1),
        rarity,
        bonus_attack,
        bonus_defense,
        bonus_hp: 0,
        bonus_mp: 0,
        bonus_speed,
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
