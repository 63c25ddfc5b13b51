//! Generator configuration and loader.
//!
//! Every field has a default, so a config file only needs the settings it changes.
//! [`load_generator_config`] never fails: an unreadable or invalid file logs a warning and
//! yields [`GeneratorConfig::default`].

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use super::GeneratorError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoryTheme {
    #[default]
    Fantasy,
    SciFi,
    Mystery,
    Romance,
    Horror,
}
impl StoryTheme {
    pub fn label(self) -> &'static str {
        match self {
            StoryTheme::Fantasy => "fantasy adventure",
            StoryTheme::SciFi => "space science fiction",
            StoryTheme::Mystery => "mystery",
            StoryTheme::Romance => "romance",
            StoryTheme::Horror => "horror",
        }
    }
}

/// Which name templates generated people draw from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NamingStyle {
    Chinese,
    Western,
    #[default]
    Mixed,
}

/// Kinds of world entity a rule can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Character,
    Item,
    Enemy,
    Skill,
    Location,
    Faction,
    Clue,
    Event,
    Variable,
}

/// Inclusive integer range. A reversed range is read with its ends swapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatRange {
    pub min: i32,
    pub max: i32,
}
impl StatRange {
    pub const fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    pub fn roll(self, rng: &mut dyn RngCore) -> i32 {
        let (low, high) = if self.min <= self.max {
            (self.min, self.max)
        } else {
            (self.max, self.min)
        };
        rng.random_range(low..=high)
    }
}

/// A custom attribute stored in each generated entity's variable bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomAttribute {
    pub name: String,
    pub min: i32,
    pub max: i32,
}
impl CustomAttribute {
    pub fn range(&self) -> StatRange {
        StatRange::new(self.min, self.max)
    }
}

/// How many entities of one kind to generate, and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRule {
    pub kind: EntityKind,
    #[serde(default)]
    pub count: usize,
    /// Name template to use instead of the kind's usual one.
    #[serde(default)]
    pub template_id: Option<String>,
    /// Overrides for rolled stats (`maxHp`, `attack`, ...), before difficulty scaling.
    #[serde(default)]
    pub stat_ranges: BTreeMap<String, StatRange>,
    #[serde(default)]
    pub custom_attributes: Vec<CustomAttribute>,
}
impl EntityRule {
    pub fn new(kind: EntityKind, count: usize) -> Self {
        Self {
            kind,
            count,
            template_id: None,
            stat_ranges: BTreeMap::new(),
            custom_attributes: Vec::new(),
        }
    }
}

/// Settings for one generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeneratorConfig {
    /// Story title; empty means one is made up from the theme.
    pub title: String,
    pub min_nodes: usize,
    pub max_nodes: usize,
    /// Number of choice nodes.
    pub min_choices: usize,
    pub max_choices: usize,
    /// Options per choice node.
    pub min_options: usize,
    pub max_options: usize,
    pub battle_probability: f64,
    pub condition_probability: f64,
    pub item_probability: f64,
    pub variable_probability: f64,
    pub random_node_probability: f64,
    pub min_endings: usize,
    pub max_endings: usize,
    /// When false the story has no endings and loops forever.
    pub generate_ending: bool,
    pub theme: StoryTheme,
    pub naming_style: NamingStyle,
    /// Share of links that jump somewhere other than the next node, 0.0-1.0.
    pub chaos: f64,
    /// Scales enemy and character stats and rewards, 0.0-1.0.
    pub difficulty: f64,
    pub seed: Option<u64>,
    pub rules: Vec<EntityRule>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            title: String::new(),
            min_nodes: 5,
            max_nodes: 15,
            min_choices: 1,
            max_choices: 3,
            min_options: 2,
            max_options: 4,
            battle_probability: 0.2,
            condition_probability: 0.15,
            item_probability: 0.1,
            variable_probability: 0.1,
            random_node_probability: 0.05,
            min_endings: 1,
            max_endings: 3,
            generate_ending: true,
            theme: StoryTheme::Fantasy,
            naming_style: NamingStyle::Mixed,
            chaos: 0.1,
            difficulty: 0.5,
            seed: None,
            rules: default_rules(),
        }
    }
}

impl GeneratorConfig {
    /// Check ranges and probabilities.
    ///
    /// # Errors
    /// Returns [`GeneratorError::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> Result<(), GeneratorError> {
        let ranges = [
            ("nodes", self.min_nodes, self.max_nodes),
            ("choices", self.min_choices, self.max_choices),
            ("options", self.min_options, self.max_options),
            ("endings", self.min_endings, self.max_endings),
        ];
        for (name, min, max) in ranges {
            if min > max {
                return Err(GeneratorError::InvalidConfig(format!(
                    "min {name} ({min}) is greater than max {name} ({max})"
                )));
            }
        }
        if self.min_options == 0 {
            return Err(GeneratorError::InvalidConfig("choices need at least one option".into()));
        }
        let unit = [
            ("battleProbability", self.battle_probability),
            ("conditionProbability", self.condition_probability),
            ("itemProbability", self.item_probability),
            ("variableProbability", self.variable_probability),
            ("randomNodeProbability", self.random_node_probability),
            ("chaos", self.chaos),
            ("difficulty", self.difficulty),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(GeneratorError::InvalidConfig(format!(
                    "{name} must be between 0 and 1, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Total entities requested for a kind across all rules.
    pub fn count_of(&self, kind: EntityKind) -> usize {
        self.rules.iter().filter(|r| r.kind == kind).map(|r| r.count).sum()
    }

    /// Multiplier applied to rolled stats and rewards: 0.5 at difficulty 0, 1.5 at 1.
    pub fn difficulty_factor(&self) -> f64 {
        0.5 + self.difficulty.clamp(0.0, 1.0)
    }
}

fn default_rules() -> Vec<EntityRule> {
    vec![
        EntityRule::new(EntityKind::Character, 3),
        EntityRule::new(EntityKind::Item, 2),
        EntityRule::new(EntityKind::Enemy, 3),
        EntityRule::new(EntityKind::Skill, 2),
        EntityRule::new(EntityKind::Location, 5),
        EntityRule::new(EntityKind::Faction, 2),
        EntityRule::new(EntityKind::Clue, 2),
        EntityRule::new(EntityKind::Event, 1),
        EntityRule::new(EntityKind::Variable, 2),
    ]
}

/// Loads the generator configuration from a TOML file, falling back to defaults on error.
pub fn load_generator_config(toml_path: &Path) -> GeneratorConfig {
    match try_load_generator_config(toml_path) {
        Ok(config) => {
            info!("generator config loaded from '{}'", toml_path.display());
            config
        },
        Err(e) => {
            warn!(
                "Could not load generator config from '{}': {e:#}. Using defaults.",
                toml_path.display()
            );
            GeneratorConfig::default()
        },
    }
}

/// # Errors
/// Returns an error if the file cannot be read or parsed.
fn try_load_generator_config(toml_path: &Path) -> Result<GeneratorConfig> {
    let raw = fs::read_to_string(toml_path)
        .with_context(|| format!("reading generator config from '{}'", toml_path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing generator config from '{}'", toml_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn partial_files_keep_defaults() {
        let config: GeneratorConfig = toml::from_str("maxNodes = 40\ntheme = \"HORROR\"\nseed = 9").unwrap();
        assert_eq!(config.max_nodes, 40);
        assert_eq!(config.min_nodes, 5);
        assert_eq!(config.theme, StoryTheme::Horror);
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.rules, default_rules());
    }

    #[test]
    fn rules_parse_with_ranges_and_attributes() {
        let raw = r#"
            [[rules]]
            kind = "ENEMY"
            count = 4

            [rules.statRanges.attack]
            min = 20
            max = 30

            [[rules.customAttributes]]
            name = "ferocity"
            min = 1
            max = 9
        "#;
        let config: GeneratorConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.count_of(EntityKind::Enemy), 4);
        assert_eq!(config.count_of(EntityKind::Location), 0);
        let rule = &config.rules[0];
        assert_eq!(rule.stat_ranges["attack"], StatRange::new(20, 30));
        assert_eq!(rule.custom_attributes[0].range(), StatRange::new(1, 9));
    }

    #[test]
    fn validation_rejects_bad_ranges() {
        let config = GeneratorConfig {
            min_nodes: 9,
            max_nodes: 3,
            ..GeneratorConfig::default()
        };
        assert!(matches!(config.validate(), Err(GeneratorError::InvalidConfig(_))));

        let config = GeneratorConfig {
            chaos: 1.5,
            ..GeneratorConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(GeneratorConfig::default().validate().is_ok());
    }

    #[test]
    fn reversed_ranges_still_roll() {
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..50 {
            let v = StatRange::new(10, 5).roll(&mut rng);
            assert!((5..=10).contains(&v));
        }
    }

    #[test]
    fn missing_file_uses_defaults() {
        let config = load_generator_config(Path::new("/definitely/not/here.toml"));
        assert_eq!(config, GeneratorConfig::default());
    }
}
