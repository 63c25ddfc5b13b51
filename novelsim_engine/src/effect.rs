//! effect.rs -- atomic game-state mutations.
//!
//! Effects never fail: a mutation that can't be carried out (non-numeric arithmetic,
//! division by zero, overflow) is skipped and logged.

use log::{debug, info, warn};
use novelsim_data::{CURRENT_LOCATION_VAR, Effect, GameState, VariableOperation};

use crate::inventory::{self, ItemCatalog};

/// Apply an effect to a copy of `state` and return the copy.
pub fn apply_effect(state: &GameState, effect: &Effect, catalog: &dyn ItemCatalog) -> GameState {
    let mut next = state.clone();
    apply_effect_in_place(&mut next, effect, catalog);
    next
}

/// Apply an effect directly to `state`.
pub fn apply_effect_in_place(state: &mut GameState, effect: &Effect, catalog: &dyn ItemCatalog) {
    match effect {
        Effect::ModifyVariable {
            variable_name,
            operation,
            value,
        } => apply_variable_operation(state, variable_name, *operation, value),
        Effect::GiveItem { item_id, quantity } => {
            let added = inventory::add_item(state, catalog, item_id, *quantity);
            info!("gave {added} x '{item_id}'");
        },
        Effect::RemoveItem { item_id, quantity } => {
            let removed = inventory::remove_item(state, item_id, *quantity);
            info!("removed {removed} x '{item_id}'");
        },
        Effect::ModifyAttribute { attribute, value } => modify_attribute(state, attribute, *value),
        Effect::PlaySound { sound_id } => {
            debug!("sound cue '{sound_id}'");
        },
        Effect::AddClue { clue_id } => {
            if state.collected_clues.insert(clue_id.clone()) {
                info!("collected clue '{clue_id}'");
            }
        },
        Effect::ModifyReputation { faction_id, delta } => {
            let rep = state.faction_reputations.entry(faction_id.clone()).or_insert(0);
            *rep = rep.saturating_add(*delta);
        },
        Effect::ModifyRelationship { character_id, delta } => {
            let rel = state.character_relationships.entry(character_id.clone()).or_insert(0);
            *rel = rel.saturating_add(*delta);
        },
        Effect::MoveToLocation { location_id } => {
            state
                .variables
                .insert(CURRENT_LOCATION_VAR.to_string(), location_id.clone());
            info!("moved to location '{location_id}'");
        },
        Effect::TriggerEvent { event_id } => {
            if state.triggered_events.insert(event_id.clone()) {
                info!("triggered event '{event_id}'");
            }
        },
        Effect::SetFlag { flag } => {
            state.flags.insert(flag.clone());
        },
        Effect::ClearFlag { flag } => {
            state.flags.remove(flag);
        },
    }
}

/// Run a variable operation. Names containing `:` address entity-scoped variables.
///
/// `Set` stores the value verbatim. Arithmetic needs both the current value (missing counts
/// as 0) and the operand to be integers; otherwise nothing changes.
pub fn apply_variable_operation(state: &mut GameState, name: &str, operation: VariableOperation, value: &str) {
    let store = if name.contains(':') {
        &mut state.entity_variables
    } else {
        &mut state.variables
    };

    if operation == VariableOperation::Set {
        store.insert(name.to_string(), value.to_string());
        return;
    }

    let current = store.get(name).map_or("0", String::as_str).trim();
    let (Ok(lhs), Ok(rhs)) = (current.parse::<i64>(), value.trim().parse::<i64>()) else {
        warn!("skipping {operation:?} on non-numeric variable '{name}' ('{current}', '{value}')");
        return;
    };
    let result = match operation {
        VariableOperation::Add => lhs.checked_add(rhs),
        VariableOperation::Subtract => lhs.checked_sub(rhs),
        VariableOperation::Multiply => lhs.checked_mul(rhs),
        VariableOperation::Divide => lhs.checked_div(rhs),
        VariableOperation::Set => Some(rhs),
    };
    match result {
        Some(result) => {
            store.insert(name.to_string(), result.to_string());
        },
        None => warn!("skipping {operation:?} on '{name}': division by zero or overflow"),
    }
}

/// Add `value` to a player attribute, `gold`, or a custom stat key.
fn modify_attribute(state: &mut GameState, attribute: &str, value: i32) {
    let stats = &mut state.player_stats;
    match attribute {
        "gold" => state.gold = state.gold.saturating_add(value).max(0),
        "hp" | "currentHp" | "current_hp" => stats.adjust_hp(value),
        "mp" | "currentMp" | "current_mp" => stats.adjust_mp(value),
        "maxHp" | "max_hp" => {
            stats.set_max_hp(stats.max_hp().saturating_add(value).max(1));
            stats.adjust_hp(0);
        },
        "maxMp" | "max_mp" => {
            stats.set_max_mp(stats.max_mp().saturating_add(value).max(0));
            stats.adjust_mp(0);
        },
        "exp" => {
            let levels = stats.add_exp(value);
            if levels > 0 {
                info!("player gained {levels} level(s), now level {}", stats.level());
            }
        },
        "level" => stats.set_level(stats.level().saturating_add(value).max(1)),
        "attack" | "defense" | "speed" | "luck" => {
            let updated = stats.get(attribute).saturating_add(value).max(0);
            stats.set(attribute, updated);
        },
        custom => {
            let updated = stats.get(custom).saturating_add(value);
            stats.set(custom, updated);
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use novelsim_data::Item;

    fn catalog() -> Vec<Item> {
        Vec::new()
    }

    fn modify(name: &str, operation: VariableOperation, value: &str) -> Effect {
        Effect::ModifyVariable {
            variable_name: name.into(),
            operation,
            value: value.into(),
        }
    }

    #[test]
    fn apply_is_pure() {
        let state = GameState::default();
        let next = apply_effect(&state, &modify("x", VariableOperation::Set, "5"), &catalog());
        assert!(state.variables.is_empty());
        assert_eq!(next.variables.get("x").map(String::as_str), Some("5"));
    }

    #[test]
    fn arithmetic_on_variables() {
        let items = catalog();
        let mut state = GameState::default();
        for (op, value, expected) in [
            (VariableOperation::Add, "10", "10"),
            (VariableOperation::Subtract, "3", "7"),
            (VariableOperation::Multiply, "4", "28"),
            (VariableOperation::Divide, "5", "5"),
        ] {
            apply_effect_in_place(&mut state, &modify("score", op, value), &items);
            assert_eq!(state.variables["score"], expected);
        }
    }

    #[test]
    fn non_numeric_and_divide_by_zero_are_no_ops() {
        let items = catalog();
        let mut state = GameState::default();
        state.variables.insert("name".into(), "mira".into());
        state.variables.insert("n".into(), "8".into());
        apply_effect_in_place(&mut state, &modify("name", VariableOperation::Add, "1"), &items);
        apply_effect_in_place(&mut state, &modify("n", VariableOperation::Add, "lots"), &items);
        apply_effect_in_place(&mut state, &modify("n", VariableOperation::Divide, "0"), &items);
        assert_eq!(state.variables["name"], "mira");
        assert_eq!(state.variables["n"], "8");
    }

    #[test]
    fn scoped_names_go_to_entity_variables() {
        let items = catalog();
        let mut state = GameState::default();
        apply_effect_in_place(&mut state, &modify("character:mira:trust", VariableOperation::Add, "2"), &items);
        assert_eq!(state.entity_variables["character:mira:trust"], "2");
        assert!(state.variables.is_empty());
    }

    #[test]
    fn reputation_is_unbounded() {
        let items = catalog();
        let mut state = GameState::default();
        for _ in 0..3 {
            apply_effect_in_place(
                &mut state,
                &Effect::ModifyReputation {
                    faction_id: "guild".into(),
                    delta: 400,
                },
                &items,
            );
        }
        apply_effect_in_place(
            &mut state,
            &Effect::ModifyRelationship {
                character_id: "mira".into(),
                delta: -250,
            },
            &items,
        );
        assert_eq!(state.faction_reputations["guild"], 1200);
        assert_eq!(state.character_relationships["mira"], -250);
    }

    #[test]
    fn clues_and_events_are_idempotent() {
        let items = catalog();
        let mut state = GameState::default();
        let clue = Effect::AddClue { clue_id: "c1".into() };
        let event = Effect::TriggerEvent { event_id: "e1".into() };
        for _ in 0..2 {
            apply_effect_in_place(&mut state, &clue, &items);
            apply_effect_in_place(&mut state, &event, &items);
        }
        assert_eq!(state.collected_clues.len(), 1);
        assert_eq!(state.triggered_events.len(), 1);
    }

    #[test]
    fn move_only_updates_bookkeeping() {
        let items = catalog();
        let mut state = GameState {
            current_node_id: "here".into(),
            ..GameState::default()
        };
        apply_effect_in_place(
            &mut state,
            &Effect::MoveToLocation {
                location_id: "loc_3".into(),
            },
            &items,
        );
        assert_eq!(state.current_location(), Some("loc_3"));
        assert_eq!(state.current_node_id, "here");
    }

    #[test]
    fn attributes_clamp_and_level() {
        let items = catalog();
        let mut state = GameState::default();
        let attr = |attribute: &str, value: i32| Effect::ModifyAttribute {
            attribute: attribute.into(),
            value,
        };
        apply_effect_in_place(&mut state, &attr("hp", -500), &items);
        assert_eq!(state.player_stats.current_hp(), 0);
        apply_effect_in_place(&mut state, &attr("defense", -50), &items);
        assert_eq!(state.player_stats.defense(), 0);
        apply_effect_in_place(&mut state, &attr("gold", 25), &items);
        apply_effect_in_place(&mut state, &attr("gold", -100), &items);
        assert_eq!(state.gold, 0);
        apply_effect_in_place(&mut state, &attr("exp", 100), &items);
        assert_eq!(state.player_stats.level(), 2);
        assert_eq!(state.player_stats.current_hp(), state.player_stats.max_hp());
        apply_effect_in_place(&mut state, &attr("charisma", 3), &items);
        assert_eq!(state.player_stats.get("charisma"), 3);
    }

    #[test]
    fn flags_set_and_clear() {
        let items = catalog();
        let mut state = GameState::default();
        apply_effect_in_place(&mut state, &Effect::SetFlag { flag: "met_mira".into() }, &items);
        assert!(state.has_flag("met_mira"));
        apply_effect_in_place(&mut state, &Effect::ClearFlag { flag: "met_mira".into() }, &items);
        assert!(!state.has_flag("met_mira"));
    }

    #[test]
    fn give_and_remove_items() {
        let items = catalog();
        let mut state = GameState::default();
        apply_effect_in_place(
            &mut state,
            &Effect::GiveItem {
                item_id: "herb".into(),
                quantity: 3,
            },
            &items,
        );
        apply_effect_in_place(
            &mut state,
            &Effect::RemoveItem {
                item_id: "herb".into(),
                quantity: 5,
            },
            &items,
        );
        assert!(state.inventory.is_empty());
    }
}
