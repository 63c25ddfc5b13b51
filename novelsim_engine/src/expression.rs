//! expression.rs -- condition strings used by condition nodes and choice guards.
//!
//! Three forms are understood:
//! - `<name> <op> <value>` with op one of `>`, `>=`, `==`, `!=`, `<`, `<=`
//! - `has_item:<id>` (template id or instance uid)
//! - `flag:<name>`
//!
//! Anything else evaluates to `false`. Evaluation never fails.

use std::fmt;
use std::sync::LazyLock;

use log::{debug, warn};
use novelsim_data::GameState;
use regex::Regex;

use crate::inventory;

static COMPARISON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([^\s<>=!]+)\s*(>=|<=|==|!=|>|<)\s*([^\s<>=!].*)$").expect("comparison pattern is a valid regex")
});

/// Comparison operator of a `<name> <op> <value>` expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Gt,
    Ge,
    Eq,
    Ne,
    Lt,
    Le,
}
impl CompareOp {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            ">" => Some(CompareOp::Gt),
            ">=" => Some(CompareOp::Ge),
            "==" => Some(CompareOp::Eq),
            "!=" => Some(CompareOp::Ne),
            "<" => Some(CompareOp::Lt),
            "<=" => Some(CompareOp::Le),
            _ => None,
        }
    }

    fn compare<T: PartialOrd>(self, lhs: &T, rhs: &T) -> bool {
        match self {
            CompareOp::Gt => lhs > rhs,
            CompareOp::Ge => lhs >= rhs,
            CompareOp::Eq => lhs == rhs,
            CompareOp::Ne => lhs != rhs,
            CompareOp::Lt => lhs < rhs,
            CompareOp::Le => lhs <= rhs,
        }
    }
}
impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        };
        f.write_str(token)
    }
}

/// A parsed condition expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    Compare { name: String, op: CompareOp, value: String },
    HasItem(String),
    Flag(String),
}

impl Expression {
    /// Parse an expression, returning `None` when it is malformed.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if let Some(id) = input.strip_prefix("has_item:") {
            let id = id.trim();
            return (!id.is_empty()).then(|| Expression::HasItem(id.to_string()));
        }
        if let Some(flag) = input.strip_prefix("flag:") {
            let flag = flag.trim();
            return (!flag.is_empty()).then(|| Expression::Flag(flag.to_string()));
        }
        let caps = COMPARISON.captures(input)?;
        let op = CompareOp::from_token(&caps[2])?;
        Some(Expression::Compare {
            name: caps[1].to_string(),
            op,
            value: unquote(caps[3].trim()).to_string(),
        })
    }

    pub fn evaluate(&self, state: &GameState) -> bool {
        match self {
            Expression::HasItem(id) => inventory::item_count(state, id) >= 1,
            Expression::Flag(flag) => state.has_flag(flag),
            Expression::Compare { name, op, value } => {
                let lhs = resolve(state, name);
                match (lhs.parse::<i64>(), value.parse::<i64>()) {
                    (Ok(l), Ok(r)) => op.compare(&l, &r),
                    _ => match op {
                        CompareOp::Eq | CompareOp::Ne => op.compare(&lhs.as_str(), &value.as_str()),
                        _ => {
                            debug!("ordering comparison on non-numeric values: '{lhs}' {op} '{value}'");
                            false
                        },
                    },
                }
            },
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Compare { name, op, value } => write!(f, "{name} {op} {value}"),
            Expression::HasItem(id) => write!(f, "has_item:{id}"),
            Expression::Flag(flag) => write!(f, "flag:{flag}"),
        }
    }
}

/// Evaluate a condition string against the game state. Malformed input yields `false`.
///
/// ```
/// use novelsim_data::GameState;
/// use novelsim_engine::expression::evaluate;
///
/// let state = GameState { gold: 10, ..GameState::default() };
/// assert!(evaluate("gold >= 10", &state));
/// assert!(!evaluate("???", &state));
/// ```
pub fn evaluate(expression: &str, state: &GameState) -> bool {
    match Expression::parse(expression) {
        Some(parsed) => parsed.evaluate(state),
        None => {
            warn!("malformed condition expression '{expression}' evaluated as false");
            false
        },
    }
}

/// True if the expression parses into one of the supported forms.
pub fn is_well_formed(expression: &str) -> bool {
    Expression::parse(expression).is_some()
}

/// Look up the left-hand side of a comparison.
///
/// Order: entity variables, global variables, `gold` and player stats, inventory quantity.
fn resolve(state: &GameState, name: &str) -> String {
    if let Some(value) = state.entity_variables.get(name) {
        return value.clone();
    }
    if let Some(value) = state.variables.get(name) {
        return value.clone();
    }
    if name == "gold" {
        return state.gold.to_string();
    }
    if let Some(value) = player_stat(state, name) {
        return value.to_string();
    }
    inventory::item_count(state, name).to_string()
}

fn player_stat(state: &GameState, name: &str) -> Option<i32> {
    let stats = &state.player_stats;
    let key = name.strip_prefix("player_").unwrap_or(name);
    let value = match key {
        "level" => stats.level(),
        "exp" => stats.exp(),
        "exp_to_next_level" | "expToNextLevel" => stats.exp_to_next_level(),
        "hp" | "current_hp" | "currentHp" => stats.current_hp(),
        "max_hp" | "maxHp" => stats.max_hp(),
        "mp" | "current_mp" | "currentMp" => stats.current_mp(),
        "max_mp" | "maxMp" => stats.max_mp(),
        "attack" => stats.attack(),
        "defense" => stats.defense(),
        "speed" => stats.speed(),
        "luck" => stats.luck(),
        _ => return None,
    };
    Some(value)
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value.strip_prefix(quote).and_then(|v| v.strip_suffix(quote)) {
            return inner;
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use novelsim_data::InventorySlot;

    fn state_with_gold(gold: i32) -> GameState {
        GameState {
            gold,
            ..GameState::default()
        }
    }

    #[test]
    fn gold_threshold() {
        assert!(evaluate("gold >= 10", &state_with_gold(10)));
        assert!(!evaluate("gold >= 10", &state_with_gold(9)));
        assert!(evaluate("gold<10", &state_with_gold(9)));
    }

    #[test]
    fn has_item_needs_a_unit() {
        let mut state = GameState::default();
        assert!(!evaluate("has_item:key_gold", &state));
        state.inventory.push(InventorySlot {
            item_id: "key_gold".into(),
            quantity: 1,
            instance_id: None,
        });
        assert!(evaluate("has_item:key_gold", &state));
    }

    #[test]
    fn has_item_matches_instance_uid() {
        let mut state = GameState::default();
        state.inventory.push(InventorySlot {
            item_id: "sword".into(),
            quantity: 1,
            instance_id: Some("uid-1".into()),
        });
        assert!(evaluate("has_item:uid-1", &state));
        assert!(evaluate("has_item:sword", &state));
    }

    #[test]
    fn flags() {
        let mut state = GameState::default();
        assert!(!evaluate("flag:boss_defeated", &state));
        state.flags.insert("boss_defeated".into());
        assert!(evaluate("flag:boss_defeated", &state));
    }

    #[test]
    fn malformed_is_false() {
        let state = GameState::default();
        for bad in ["???", "", "gold >=", "has_item:", "flag:  ", ">= 3", "gold => 3"] {
            assert!(!evaluate(bad, &state), "{bad:?} should be false");
            assert!(!is_well_formed(bad), "{bad:?} should not parse");
        }
    }

    #[test]
    fn resolution_prefers_entity_then_global() {
        let mut state = GameState::default();
        state.variables.insert("mood".into(), "3".into());
        assert!(evaluate("mood == 3", &state));
        state.entity_variables.insert("mood".into(), "7".into());
        assert!(evaluate("mood == 7", &state));
    }

    #[test]
    fn variables_shadow_pseudo_variables() {
        let mut state = state_with_gold(50);
        assert!(evaluate("gold > 40", &state));
        state.variables.insert("gold".into(), "1".into());
        assert!(evaluate("gold == 1", &state));
    }

    #[test]
    fn player_stats_are_visible() {
        let mut state = GameState::default();
        state.player_stats.set_level(6);
        assert!(evaluate("player_level > 5", &state));
        assert!(evaluate("level >= 6", &state));
        assert!(evaluate("attack == 10", &state));
    }

    #[test]
    fn unknown_names_compare_as_zero() {
        let state = GameState::default();
        assert!(evaluate("nothing == 0", &state));
        assert!(!evaluate("nothing > 0", &state));
    }

    #[test]
    fn string_comparison_only_supports_equality() {
        let mut state = GameState::default();
        state.variables.insert("weather".into(), "rain".into());
        assert!(evaluate("weather == rain", &state));
        assert!(evaluate("weather == \"rain\"", &state));
        assert!(evaluate("weather != Rain", &state));
        assert!(!evaluate("weather > rain", &state));
    }

    #[test]
    fn entity_scoped_names() {
        let mut state = GameState::default();
        state.entity_variables.insert("character:mira:trust".into(), "4".into());
        assert!(evaluate("character:mira:trust >= 4", &state));
    }

    #[test]
    fn parse_round_trips_through_display() {
        let parsed = Expression::parse("  gold>=100 ").unwrap();
        assert_eq!(parsed.to_string(), "gold >= 100");
        assert_eq!(Expression::parse(&parsed.to_string()), Some(parsed));
    }
}
