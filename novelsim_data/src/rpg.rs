use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::story::Id;

/// Well-known stat keys and the value each takes when absent from the map.
pub const STAT_DEFAULTS: [(&str, i32); 11] = [
    ("maxHp", 100),
    ("currentHp", 100),
    ("maxMp", 50),
    ("currentMp", 50),
    ("attack", 10),
    ("defense", 5),
    ("speed", 10),
    ("luck", 5),
    ("level", 1),
    ("exp", 0),
    ("expToNextLevel", 100),
];

/// Open, map-backed attribute set for players, enemies and characters.
///
/// The eleven keys in [`STAT_DEFAULTS`] have typed accessors; any other key is kept
/// as-is and reachable through [`CharacterStats::get`] / [`CharacterStats::set`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacterStats {
    values: BTreeMap<String, i32>,
}

impl Default for CharacterStats {
    fn default() -> Self {
        Self {
            values: STAT_DEFAULTS.iter().map(|(k, v)| ((*k).to_string(), *v)).collect(),
        }
    }
}

macro_rules! stat_accessors {
    ($($getter:ident, $setter:ident => $key:literal;)*) => {
        $(
            pub fn $getter(&self) -> i32 {
                self.get($key)
            }

            pub fn $setter(&mut self, value: i32) {
                self.set($key, value);
            }
        )*
    };
}

impl CharacterStats {
    /// A stat map with no entries; every well-known accessor reports its default.
    pub fn empty() -> Self {
        Self { values: BTreeMap::new() }
    }

    /// Raw lookup. Well-known keys fall back to their default, custom keys to 0.
    pub fn get(&self, key: &str) -> i32 {
        self.values.get(key).copied().unwrap_or_else(|| default_for_key(key))
    }

    pub fn set(&mut self, key: &str, value: i32) {
        self.values.insert(key.to_string(), value);
    }

    /// True if the key is explicitly stored or is one of the well-known keys.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key) || STAT_DEFAULTS.iter().any(|(k, _)| *k == key)
    }

    /// Iterate the explicitly stored entries.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i32)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    stat_accessors! {
        max_hp, set_max_hp => "maxHp";
        current_hp, set_current_hp => "currentHp";
        max_mp, set_max_mp => "maxMp";
        current_mp, set_current_mp => "currentMp";
        attack, set_attack => "attack";
        defense, set_defense => "defense";
        speed, set_speed => "speed";
        luck, set_luck => "luck";
        level, set_level => "level";
        exp, set_exp => "exp";
        exp_to_next_level, set_exp_to_next_level => "expToNextLevel";
    }

    pub fn is_alive(&self) -> bool {
        self.current_hp() > 0
    }

    pub fn hp_percent(&self) -> f32 {
        self.current_hp() as f32 / self.max_hp().max(1) as f32
    }

    pub fn mp_percent(&self) -> f32 {
        self.current_mp() as f32 / self.max_mp().max(1) as f32
    }

    /// Change current HP by `delta`, clamped to `0..=maxHp`.
    pub fn adjust_hp(&mut self, delta: i32) {
        let hp = self.current_hp().saturating_add(delta).clamp(0, self.max_hp().max(0));
        self.set_current_hp(hp);
    }

    /// Change current MP by `delta`, clamped to `0..=maxMp`.
    pub fn adjust_mp(&mut self, delta: i32) {
        let mp = self.current_mp().saturating_add(delta).clamp(0, self.max_mp().max(0));
        self.set_current_mp(mp);
    }

    /// Add experience and apply every level-up it pays for. Returns the number of levels gained.
    ///
    /// Each level-up subtracts the current threshold, raises the threshold by 20% and grows
    /// the combat stats; HP and MP are refilled to their new maximums.
    ///
    /// ```
    /// use novelsim_data::CharacterStats;
    ///
    /// let mut stats = CharacterStats::default();
    /// assert_eq!(stats.add_exp(100), 1);
    /// assert_eq!(stats.level(), 2);
    /// assert_eq!(stats.exp(), 0);
    /// assert_eq!(stats.exp_to_next_level(), 120);
    /// assert_eq!(stats.current_hp(), stats.max_hp());
    /// ```
    pub fn add_exp(&mut self, amount: i32) -> u32 {
        let mut exp = self.exp().saturating_add(amount.max(0));
        let mut gained = 0;
        loop {
            let threshold = self.exp_to_next_level().max(1);
            if exp < threshold {
                break;
            }
            exp -= threshold;
            gained += 1;
            self.set_level(self.level().saturating_add(1));
            self.set_exp_to_next_level(scale(threshold, 1.2, 0.0).max(threshold.saturating_add(1)));
            self.set_max_hp(scale(self.max_hp(), 1.1, 5.0));
            self.set_current_hp(self.max_hp());
            self.set_max_mp(scale(self.max_mp(), 1.05, 2.0));
            self.set_current_mp(self.max_mp());
            self.set_attack(scale(self.attack(), 1.1, 2.0));
            self.set_defense(scale(self.defense(), 1.1, 1.0));
            self.set_speed(scale(self.speed(), 1.05, 1.0));
            self.set_luck(scale(self.luck(), 1.05, 1.0));
        }
        self.set_exp(exp);
        gained
    }
}

fn default_for_key(key: &str) -> i32 {
    STAT_DEFAULTS
        .iter()
        .find(|(k, _)| *k == key)
        .map_or(0, |(_, v)| *v)
}

// float-to-int `as` saturates, so overflow cannot wrap
fn scale(value: i32, factor: f64, bonus: f64) -> i32 {
    (f64::from(value) * factor + bonus) as i32
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemType {
    #[default]
    Consumable,
    Equipment,
    KeyItem,
    Material,
}

/// The five fixed equipment slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EquipSlot {
    Weapon,
    Armor,
    Accessory,
    Head,
    Boots,
}
impl EquipSlot {
    pub const ALL: [EquipSlot; 5] = [
        EquipSlot::Weapon,
        EquipSlot::Armor,
        EquipSlot::Accessory,
        EquipSlot::Head,
        EquipSlot::Boots,
    ];

    pub fn label(self) -> &'static str {
        match self {
            EquipSlot::Weapon => "weapon",
            EquipSlot::Armor => "armor",
            EquipSlot::Accessory => "accessory",
            EquipSlot::Head => "head",
            EquipSlot::Boots => "boots",
        }
    }

    /// Parse a slot from its label, case-insensitively.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.label().eq_ignore_ascii_case(label.trim()))
    }
}

/// What an item does when used or equipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ItemEffect {
    Heal {
        #[serde(default)]
        hp: i32,
        #[serde(default)]
        mp: i32,
    },
    Buff {
        #[serde(default)]
        attribute: String,
        #[serde(default)]
        value: i32,
        #[serde(default = "default_buff_duration")]
        duration: u32,
    },
    EquipmentBonus {
        slot: EquipSlot,
        #[serde(default)]
        attack_bonus: i32,
        #[serde(default)]
        defense_bonus: i32,
        #[serde(default)]
        hp_bonus: i32,
        #[serde(default)]
        mp_bonus: i32,
        #[serde(default)]
        speed_bonus: i32,
    },
}

fn default_buff_duration() -> u32 {
    3
}

/// Item template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    #[serde(default)]
    pub id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub item_type: ItemType,
    #[serde(default)]
    pub effect: Option<ItemEffect>,
    #[serde(default)]
    pub price: i32,
    #[serde(default = "default_true")]
    pub stackable: bool,
    #[serde(default = "default_max_stack")]
    pub max_stack: i32,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}
impl Default for Item {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            description: String::new(),
            item_type: ItemType::default(),
            effect: None,
            price: 0,
            stackable: true,
            max_stack: default_max_stack(),
            variables: BTreeMap::new(),
        }
    }
}
impl Item {
    /// The equipment slot this item fits, if it is equipment.
    pub fn equip_slot(&self) -> Option<EquipSlot> {
        match &self.effect {
            Some(ItemEffect::EquipmentBonus { slot, .. }) => Some(*slot),
            _ => None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_stack() -> i32 {
    99
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemRarity {
    #[default]
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
    Mythic,
}
impl ItemRarity {
    /// Stat multiplier applied to rolled equipment bonuses.
    pub fn multiplier(self) -> f64 {
        match self {
            ItemRarity::Common => 1.0,
            ItemRarity::Uncommon => 1.5,
            ItemRarity::Rare => 2.5,
            ItemRarity::Epic => 4.0,
            ItemRarity::Legendary => 6.0,
            ItemRarity::Mythic => 10.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ItemRarity::Common => "common",
            ItemRarity::Uncommon => "uncommon",
            ItemRarity::Rare => "rare",
            ItemRarity::Epic => "epic",
            ItemRarity::Legendary => "legendary",
            ItemRarity::Mythic => "mythic",
        }
    }
}

/// A concrete, individually tracked copy of a non-stackable item with rolled bonuses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemInstance {
    #[serde(default)]
    pub uid: Id,
    #[serde(default)]
    pub template_id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_level")]
    pub level: i32,
    #[serde(default)]
    pub rarity: ItemRarity,
    #[serde(default)]
    pub bonus_attack: i32,
    #[serde(default)]
    pub bonus_defense: i32,
    #[serde(default)]
    pub bonus_hp: i32,
    #[serde(default)]
    pub bonus_mp: i32,
    #[serde(default)]
    pub bonus_speed: i32,
}

fn default_level() -> i32 {
    1
}

/// Independent drop roll attached to an enemy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnemyDrop {
    #[serde(default)]
    pub item_id: Id,
    /// Probability in `0.0..=1.0`.
    #[serde(default)]
    pub chance: f32,
    #[serde(default = "default_quantity")]
    pub min_quantity: i32,
    #[serde(default = "default_quantity")]
    pub max_quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enemy {
    #[serde(default)]
    pub id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub stats: CharacterStats,
    #[serde(default)]
    pub skills: Vec<Id>,
    #[serde(default)]
    pub drops: Vec<EnemyDrop>,
    #[serde(default = "default_exp_reward")]
    pub exp_reward: i32,
    #[serde(default = "default_gold_reward")]
    pub gold_reward: i32,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}
impl Enemy {
    /// Ranking used to order enemies from weakest to strongest.
    pub fn strength_score(&self) -> i64 {
        i64::from(self.stats.max_hp()) + i64::from(self.stats.attack()) * 4 + i64::from(self.stats.defense()) * 2
    }
}

fn default_exp_reward() -> i32 {
    10
}

fn default_gold_reward() -> i32 {
    5
}

/// What a skill does when cast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SkillEffect {
    Damage {
        #[serde(default = "default_multiplier")]
        multiplier: f32,
        #[serde(default)]
        element: Option<String>,
    },
    Heal {
        #[serde(default)]
        amount: i32,
        #[serde(default)]
        is_percentage: bool,
    },
    StatusEffect {
        #[serde(default)]
        status: String,
        #[serde(default = "default_status_duration")]
        duration: u32,
        #[serde(default = "default_chance")]
        chance: f32,
    },
}

fn default_multiplier() -> f32 {
    1.0
}

fn default_status_duration() -> u32 {
    2
}

fn default_chance() -> f32 {
    1.0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    #[serde(default)]
    pub id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub mp_cost: i32,
    #[serde(default)]
    pub effect: Option<SkillEffect>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_keys_report_defaults() {
        let stats = CharacterStats::empty();
        assert_eq!(stats.max_hp(), 100);
        assert_eq!(stats.current_mp(), 50);
        assert_eq!(stats.level(), 1);
        assert_eq!(stats.exp_to_next_level(), 100);
        assert_eq!(stats.get("charisma"), 0);
    }

    #[test]
    fn custom_keys_survive_serde() {
        let mut stats = CharacterStats::empty();
        stats.set("charisma", 7);
        stats.set_attack(12);
        let json = serde_json::to_string(&stats).unwrap();
        let back: CharacterStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get("charisma"), 7);
        assert_eq!(back.attack(), 12);
        assert_eq!(back.defense(), 5);
    }

    #[test]
    fn percentages_clamp_denominator() {
        let mut stats = CharacterStats::empty();
        stats.set_max_hp(0);
        stats.set_current_hp(3);
        assert!((stats.hp_percent() - 3.0).abs() < f32::EPSILON);
        stats.set_current_hp(0);
        assert!(!stats.is_alive());
    }

    #[test]
    fn one_level_up_grows_stats() {
        let mut stats = CharacterStats::default();
        stats.set_current_hp(20);
        assert_eq!(stats.add_exp(150), 1);
        assert_eq!(stats.level(), 2);
        assert_eq!(stats.exp(), 50);
        assert_eq!(stats.exp_to_next_level(), 120);
        assert_eq!(stats.max_hp(), 115);
        assert_eq!(stats.current_hp(), 115);
        assert_eq!(stats.max_mp(), 54);
        assert_eq!(stats.current_mp(), 54);
        assert_eq!(stats.attack(), 13);
        assert_eq!(stats.defense(), 6);
        assert_eq!(stats.speed(), 11);
        assert_eq!(stats.luck(), 6);
    }

    #[test]
    fn large_grant_levels_several_times() {
        let mut stats = CharacterStats::default();
        // 100 + 120 + 144 = 364
        assert_eq!(stats.add_exp(364), 3);
        assert_eq!(stats.level(), 4);
        assert_eq!(stats.exp(), 0);
        assert_eq!(stats.exp_to_next_level(), 172);
    }

    #[test]
    fn leveling_is_monotonic() {
        let mut stats = CharacterStats::default();
        let mut last = stats.level();
        for grant in [0, 5, 99, 1, 250, -40, 1000, 3] {
            stats.add_exp(grant);
            assert!(stats.level() >= last);
            last = stats.level();
        }
    }

    #[test]
    fn degenerate_threshold_still_terminates() {
        let mut stats = CharacterStats::default();
        stats.set_exp_to_next_level(0);
        let gained = stats.add_exp(10);
        assert!(gained >= 1);
        assert!(stats.exp() < stats.exp_to_next_level());
    }

    #[test]
    fn adjust_clamps_to_range() {
        let mut stats = CharacterStats::default();
        stats.adjust_hp(-500);
        assert_eq!(stats.current_hp(), 0);
        stats.adjust_hp(1000);
        assert_eq!(stats.current_hp(), 100);
        stats.adjust_mp(-10);
        assert_eq!(stats.current_mp(), 40);
    }

    #[test]
    fn rarity_multipliers() {
        assert!((ItemRarity::Common.multiplier() - 1.0).abs() < f64::EPSILON);
        assert!((ItemRarity::Legendary.multiplier() - 6.0).abs() < f64::EPSILON);
        assert!((ItemRarity::Mythic.multiplier() - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn slot_labels_round_trip() {
        for slot in EquipSlot::ALL {
            assert_eq!(EquipSlot::from_label(slot.label()), Some(slot));
        }
        assert_eq!(EquipSlot::from_label(" Weapon "), Some(EquipSlot::Weapon));
        assert_eq!(EquipSlot::from_label("cape"), None);
    }
}
