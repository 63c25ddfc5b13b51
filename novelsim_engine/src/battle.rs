//! Battle Module
//!
//! Turn-based combat between the player and a single enemy. The enemy handed to
//! [`BattleSystem::start`] is used as-is; any level scaling happens before the battle begins.
//!
//! Turns alternate strictly. Whoever is faster moves first; ties go to the player.
//! Formulas:
//! - damage: `max(1, attack - defense)`, varied by ±10%, never below 1
//! - critical hit: chance `clamp(0.05 + 0.01 * luck, 0.05, 0.50)`, damage ×1.5
//! - defend: doubles the player's defense against the next enemy attack only
//! - flee: chance `clamp(0.5 + 0.05 * (player speed - enemy speed), 0.10, 0.95)`

use log::{info, warn};
use novelsim_data::{CharacterStats, Enemy, Id, ItemEffect, ItemGrant, Skill, SkillEffect};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use variantly::Variantly;

const CRIT_MULTIPLIER: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Variantly)]
pub enum BattlePhase {
    PlayerTurn,
    EnemyTurn,
    Victory,
    Defeat,
    Fled,
}
impl BattlePhase {
    pub fn is_over(self) -> bool {
        matches!(self, BattlePhase::Victory | BattlePhase::Defeat | BattlePhase::Fled)
    }
}

/// What the player does on their turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BattleAction {
    Attack,
    Skill(Id),
    UseItem(Id),
    Defend,
    Flee,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogKind {
    Info,
    Damage,
    Heal,
    Buff,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleLog {
    pub message: String,
    pub kind: LogKind,
}

/// A status effect currently on the enemy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveStatus {
    pub status: String,
    pub remaining: u32,
}
impl ActiveStatus {
    fn skips_turn(&self) -> bool {
        matches!(self.status.as_str(), "stun" | "sleep" | "freeze")
    }

    fn deals_damage(&self) -> bool {
        matches!(self.status.as_str(), "poison" | "burn" | "bleed")
    }
}

/// Full state of one battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleState {
    pub player_stats: CharacterStats,
    /// The (already scaled) enemy; `enemy.stats` tracks its current HP.
    pub enemy: Enemy,
    pub turn: u32,
    pub phase: BattlePhase,
    pub logs: Vec<BattleLog>,
    pub is_defending: bool,
    pub enemy_statuses: Vec<ActiveStatus>,
}
impl BattleState {
    pub fn enemy_current_hp(&self) -> i32 {
        self.enemy.stats.current_hp()
    }

    fn log(&mut self, kind: LogKind, message: impl Into<String>) {
        self.logs.push(BattleLog {
            message: message.into(),
            kind,
        });
    }
}

/// Spoils of a won battle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleRewards {
    pub exp: i32,
    pub gold: i32,
    pub items: Vec<ItemGrant>,
}

/// Result of one call to [`BattleSystem::execute_action`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionResult {
    /// False when the action was rejected (unknown skill, not enough MP, ...) and the
    /// player still has the turn.
    pub consumed_turn: bool,
    /// Consumable the player used this turn; the caller removes it from the inventory.
    pub used_item: Option<Id>,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BattleError {
    #[error("the battle is already over")]
    Finished,
    #[error("it is not the player's turn")]
    NotPlayerTurn,
    #[error("it is not the enemy's turn")]
    NotEnemyTurn,
}

/// Player-side resources a battle can draw on.
pub trait BattleKit {
    /// Skill definition, if the player has learned it.
    fn learned_skill(&self, id: &str) -> Option<&Skill>;
    /// Effect of a consumable the player is currently holding.
    fn consumable(&self, id: &str) -> Option<ItemEffect>;
}

/// Drives battles. Owns the random source used for variance, criticals, fleeing and drops.
pub struct BattleSystem {
    rng: StdRng,
}

impl BattleSystem {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { rng }
    }

    /// Begin a battle. The faster side gets the first turn; ties favour the player.
    pub fn start(&mut self, player_stats: CharacterStats, enemy: Enemy) -> BattleState {
        let enemy_first = enemy.stats.speed() > player_stats.speed();
        let mut state = BattleState {
            player_stats,
            enemy,
            turn: 1,
            phase: if enemy_first {
                BattlePhase::EnemyTurn
            } else {
                BattlePhase::PlayerTurn
            },
            logs: Vec::new(),
            is_defending: false,
            enemy_statuses: Vec::new(),
        };
        let name = state.enemy.name.clone();
        state.log(LogKind::Info, format!("{name} appears!"));
        if enemy_first {
            state.log(LogKind::Info, format!("{name} is faster and strikes first."));
        }
        info!("battle started against '{}'", state.enemy.id);
        state
    }

    /// Resolve a full exchange: a pending enemy turn, the player's action, then the enemy's reply.
    ///
    /// # Errors
    /// Returns [`BattleError::Finished`] if the battle is already over.
    pub fn execute_action(
        &mut self,
        state: &mut BattleState,
        action: &BattleAction,
        kit: &dyn BattleKit,
    ) -> Result<ActionResult, BattleError> {
        if state.phase.is_over() {
            return Err(BattleError::Finished);
        }
        if state.phase.is_enemy_turn() {
            self.enemy_turn(state)?;
            if state.phase.is_over() {
                return Ok(ActionResult::default());
            }
        }
        let result = self.player_action(state, action, kit)?;
        if state.phase.is_enemy_turn() {
            self.enemy_turn(state)?;
        }
        Ok(result)
    }

    /// Resolve only the player's action.
    ///
    /// # Errors
    /// Fails if it is not the player's turn.
    pub fn player_action(
        &mut self,
        state: &mut BattleState,
        action: &BattleAction,
        kit: &dyn BattleKit,
    ) -> Result<ActionResult, BattleError> {
        if state.phase.is_over() {
            return Err(BattleError::Finished);
        }
        if !state.phase.is_player_turn() {
            return Err(BattleError::NotPlayerTurn);
        }

        let mut result = ActionResult {
            consumed_turn: true,
            used_item: None,
        };
        match action {
            BattleAction::Attack => {
                let attack = state.player_stats.attack();
                self.player_strike(state, attack, "You attack");
            },
            BattleAction::Skill(id) => {
                result.consumed_turn = self.cast_skill(state, id, kit);
            },
            BattleAction::UseItem(id) => match kit.consumable(id) {
                Some(ItemEffect::Heal { hp, mp }) => {
                    let before = state.player_stats.current_hp();
                    state.player_stats.adjust_hp(hp);
                    state.player_stats.adjust_mp(mp);
                    let healed = state.player_stats.current_hp() - before;
                    state.log(LogKind::Heal, format!("You use {id} and recover {healed} HP."));
                    result.used_item = Some(id.clone());
                },
                Some(ItemEffect::Buff { attribute, value, .. }) => {
                    let current = state.player_stats.get(&attribute);
                    state.player_stats.set(&attribute, current.saturating_add(value));
                    state.log(LogKind::Buff, format!("You use {id}: {attribute} +{value}."));
                    result.used_item = Some(id.clone());
                },
                Some(ItemEffect::EquipmentBonus { .. }) | None => {
                    state.log(LogKind::Info, format!("You can't use {id} right now."));
                    result.consumed_turn = false;
                },
            },
            BattleAction::Defend => {
                state.is_defending = true;
                state.log(LogKind::Buff, "You brace yourself.");
            },
            BattleAction::Flee => {
                let chance = flee_chance(&state.player_stats, &state.enemy.stats);
                if self.rng.random_bool(chance) {
                    state.log(LogKind::Info, "You got away safely.");
                    state.phase = BattlePhase::Fled;
                    info!("player fled from '{}'", state.enemy.id);
                    return Ok(result);
                }
                state.log(LogKind::Info, "You couldn't get away!");
            },
        }

        if !state.enemy.stats.is_alive() {
            self.finish_victory(state);
        } else if result.consumed_turn {
            state.phase = BattlePhase::EnemyTurn;
        }
        Ok(result)
    }

    /// Resolve the enemy's turn: status effects tick, then the enemy attacks unless disabled.
    ///
    /// # Errors
    /// Fails if it is not the enemy's turn.
    pub fn enemy_turn(&mut self, state: &mut BattleState) -> Result<(), BattleError> {
        if state.phase.is_over() {
            return Err(BattleError::Finished);
        }
        if !state.phase.is_enemy_turn() {
            return Err(BattleError::NotEnemyTurn);
        }

        let name = state.enemy.name.clone();
        let mut skip = false;
        let tick_damage = (state.enemy.stats.max_hp() / 20).max(1);
        let mut ticked = Vec::new();
        for status in &mut state.enemy_statuses {
            if status.deals_damage() {
                ticked.push(status.status.clone());
            }
            skip |= status.skips_turn();
            status.remaining = status.remaining.saturating_sub(1);
        }
        state.enemy_statuses.retain(|s| s.remaining > 0);
        for status in ticked {
            state.enemy.stats.adjust_hp(-tick_damage);
            state.log(LogKind::Damage, format!("{name} takes {tick_damage} {status} damage."));
        }
        if !state.enemy.stats.is_alive() {
            self.finish_victory(state);
            return Ok(());
        }

        if skip {
            state.log(LogKind::Info, format!("{name} cannot move!"));
        } else {
            let mut defense = state.player_stats.defense();
            if state.is_defending {
                defense = defense.saturating_mul(2);
            }
            let (damage, crit) = self.roll_damage(state.enemy.stats.attack(), defense, state.enemy.stats.luck());
            state.player_stats.adjust_hp(-damage);
            if crit {
                state.log(LogKind::Critical, format!("Critical! {name} hits you for {damage}."));
            } else {
                state.log(LogKind::Damage, format!("{name} hits you for {damage}."));
            }
        }
        state.is_defending = false;

        if state.player_stats.is_alive() {
            state.phase = BattlePhase::PlayerTurn;
            state.turn += 1;
        } else {
            state.phase = BattlePhase::Defeat;
            state.log(LogKind::Info, "You have been defeated...");
            info!("player defeated by '{}'", state.enemy.id);
        }
        Ok(())
    }

    /// Roll rewards for a won battle: fixed exp and gold plus independent rolls per drop entry.
    pub fn rewards(&mut self, state: &BattleState) -> Option<BattleRewards> {
        if !state.phase.is_victory() {
            return None;
        }
        let mut items = Vec::new();
        for drop in &state.enemy.drops {
            if !self.rng.random_bool(f64::from(drop.chance).clamp(0.0, 1.0)) {
                continue;
            }
            let low = drop.min_quantity.max(1);
            let high = drop.max_quantity.max(low);
            items.push(ItemGrant {
                item_id: drop.item_id.clone(),
                quantity: self.rng.random_range(low..=high),
            });
        }
        Some(BattleRewards {
            exp: state.enemy.exp_reward.max(0),
            gold: state.enemy.gold_reward.max(0),
            items,
        })
    }

    fn player_strike(&mut self, state: &mut BattleState, attack: i32, verb: &str) {
        let (damage, crit) = self.roll_damage(attack, state.enemy.stats.defense(), state.player_stats.luck());
        state.enemy.stats.adjust_hp(-damage);
        let name = state.enemy.name.clone();
        if crit {
            state.log(LogKind::Critical, format!("Critical! {verb} {name} for {damage}."));
        } else {
            state.log(LogKind::Damage, format!("{verb} {name} for {damage}."));
        }
    }

    /// Returns whether the turn was used.
    fn cast_skill(&mut self, state: &mut BattleState, id: &str, kit: &dyn BattleKit) -> bool {
        let Some(skill) = kit.learned_skill(id) else {
            warn!("player tried unknown or unlearned skill '{id}'");
            state.log(LogKind::Info, format!("You don't know how to use {id}."));
            return false;
        };
        if state.player_stats.current_mp() < skill.mp_cost {
            state.log(LogKind::Info, format!("Not enough MP for {}.", skill.name));
            return false;
        }
        state.player_stats.adjust_mp(-skill.mp_cost);

        match &skill.effect {
            Some(SkillEffect::Damage { multiplier, element }) => {
                let attack = (f64::from(state.player_stats.attack()) * f64::from(*multiplier)) as i32;
                let verb = match element {
                    Some(element) => format!("Your {} ({element}) strikes", skill.name),
                    None => format!("Your {} strikes", skill.name),
                };
                self.player_strike(state, attack, &verb);
            },
            Some(SkillEffect::Heal { amount, is_percentage }) => {
                let amount = if *is_percentage {
                    state.player_stats.max_hp().saturating_mul(*amount) / 100
                } else {
                    *amount
                };
                state.player_stats.adjust_hp(amount);
                state.log(LogKind::Heal, format!("{} restores {amount} HP.", skill.name));
            },
            Some(SkillEffect::StatusEffect {
                status,
                duration,
                chance,
            }) => {
                let name = state.enemy.name.clone();
                if self.rng.random_bool(f64::from(*chance).clamp(0.0, 1.0)) {
                    state.enemy_statuses.retain(|s| &s.status != status);
                    state.enemy_statuses.push(ActiveStatus {
                        status: status.clone(),
                        remaining: (*duration).max(1),
                    });
                    state.log(LogKind::Buff, format!("{name} is afflicted with {status}."));
                } else {
                    state.log(LogKind::Info, format!("{name} resists {}.", skill.name));
                }
            },
            None => {
                let attack = state.player_stats.attack();
                let verb = format!("Your {} strikes", skill.name);
                self.player_strike(state, attack, &verb);
            },
        }
        true
    }

    fn finish_victory(&mut self, state: &mut BattleState) {
        state.phase = BattlePhase::Victory;
        let name = state.enemy.name.clone();
        state.log(LogKind::Info, format!("{name} is defeated!"));
        info!("player defeated '{}'", state.enemy.id);
    }

    /// Damage dealt and whether it was a critical hit. Never below 1.
    fn roll_damage(&mut self, attack: i32, defense: i32, luck: i32) -> (i32, bool) {
        let base = f64::from(attack.saturating_sub(defense).max(1));
        let varied = base * self.rng.random_range(0.9..=1.1);
        let crit = self.rng.random_bool(crit_chance(luck));
        let damage = if crit { varied * CRIT_MULTIPLIER } else { varied };
        ((damage.round() as i32).max(1), crit)
    }
}

/// Chance of a critical hit for the given luck.
pub fn crit_chance(luck: i32) -> f64 {
    (0.05 + 0.01 * f64::from(luck)).clamp(0.05, 0.50)
}

/// Chance of escaping for the given combatants.
pub fn flee_chance(player: &CharacterStats, enemy: &CharacterStats) -> f64 {
    (0.5 + 0.05 * f64::from(player.speed().saturating_sub(enemy.speed()))).clamp(0.10, 0.95)
}
