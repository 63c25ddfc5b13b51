//! Name Provider
//!
//! Names for generated people, places, gear and groups come from templates such as
//! `"{surname}{given}"`. Each placeholder names a part, and each part draws a random entry
//! from a word list. Templates and word lists are loaded from `names.toml`; if that file
//! is missing or broken the copy compiled into the binary is used instead.
//!
//! Generation never fails. An unknown template or an empty list produces a visible
//! placeholder string and a warning in the log.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use log::{info, warn};
use novelsim_data::{EquipSlot, Gender};
use rand::seq::IndexedRandom;
use rand::{Rng, RngCore};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// Bundled template file, used when no external file can be read.
const BUILTIN_NAMES: &str = include_str!("../data/names.toml");

/// Weight of a template's own pattern when it also has variants.
const PRIMARY_PATTERN_WEIGHT: u32 = 100;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\w+)\}").expect("placeholder pattern is a valid regex"));

/// One placeholder's source: which word list it draws from, and whether it may be left out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplatePart {
    pub list: String,
    #[serde(default)]
    pub optional: bool,
    /// Chance an optional part is filled in.
    #[serde(default = "default_probability")]
    pub probability: f64,
}

fn default_probability() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateVariant {
    pub pattern: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// Part overrides for this variant; anything not listed comes from the template.
    #[serde(default)]
    pub parts: BTreeMap<String, TemplatePart>,
}

fn default_weight() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameTemplate {
    pub id: String,
    pub pattern: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parts: BTreeMap<String, TemplatePart>,
    #[serde(default)]
    pub variants: Vec<TemplateVariant>,
}

/// The contents of a names file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NameTemplates {
    #[serde(default)]
    pub templates: Vec<NameTemplate>,
    #[serde(default)]
    pub lists: BTreeMap<String, Vec<String>>,
}
impl NameTemplates {
    /// Templates compiled into the binary.
    pub fn builtin() -> Self {
        match toml::from_str(BUILTIN_NAMES) {
            Ok(templates) => templates,
            Err(e) => {
                warn!("bundled name templates failed to parse: {e}");
                Self::default()
            },
        }
    }

    pub fn template(&self, id: &str) -> Option<&NameTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }
}

/// Loads name templates from a TOML file, falling back to the bundled copy on error.
///
/// This function never fails.
pub fn load_name_templates(toml_path: &Path) -> NameTemplates {
    match try_load_name_templates(toml_path) {
        Ok(templates) => {
            info!(
                "{} name templates and {} word lists loaded from '{}'",
                templates.templates.len(),
                templates.lists.len(),
                toml_path.display()
            );
            templates
        },
        Err(e) => {
            warn!(
                "Could not load name templates from '{}': {e:#}. Using bundled templates.",
                toml_path.display()
            );
            NameTemplates::builtin()
        },
    }
}

/// # Errors
/// Returns an error if the file cannot be read or parsed.
fn try_load_name_templates(toml_path: &Path) -> Result<NameTemplates> {
    let raw = fs::read_to_string(toml_path)
        .with_context(|| format!("reading name templates from '{}'", toml_path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing name templates from '{}'", toml_path.display()))
}

/// Fills name templates with random words.
///
/// The provider holds no random state of its own; callers pass their generator so a seeded
/// run stays reproducible.
#[derive(Debug, Clone, Default)]
pub struct NameProvider {
    templates: NameTemplates,
}

impl NameProvider {
    pub fn new(templates: NameTemplates) -> Self {
        Self { templates }
    }

    pub fn builtin() -> Self {
        Self::new(NameTemplates::builtin())
    }

    pub fn templates(&self) -> &NameTemplates {
        &self.templates
    }

    /// Produce a name from the template with the given id.
    pub fn generate(&self, template_id: &str, rng: &mut dyn RngCore) -> String {
        let Some(template) = self.templates.template(template_id) else {
            warn!("unknown name template '{template_id}'");
            return placeholder(template_id);
        };
        let (pattern, overrides) = pick_variant(template, rng);
        let filled = PLACEHOLDER.replace_all(pattern, |caps: &Captures| {
            let key = &caps[1];
            let part = overrides.and_then(|o| o.get(key)).or_else(|| template.parts.get(key));
            match part {
                Some(part) => self.fill_part(part, rng),
                None => {
                    warn!("template '{template_id}' has no part named '{key}'");
                    placeholder(key)
                },
            }
        });
        let name = filled.trim().to_string();
        if name.is_empty() { placeholder(template_id) } else { name }
    }

    fn fill_part(&self, part: &TemplatePart, rng: &mut dyn RngCore) -> String {
        if part.optional && !rng.random_bool(part.probability.clamp(0.0, 1.0)) {
            return String::new();
        }
        match self.templates.lists.get(&part.list) {
            Some(words) if !words.is_empty() => words[rng.random_range(0..words.len())].clone(),
            _ => {
                warn!("word list '{}' is missing or empty", part.list);
                placeholder(&part.list)
            },
        }
    }

    pub fn chinese_name(&self, gender: Gender, rng: &mut dyn RngCore) -> String {
        let template = match gender {
            Gender::Male => "chinese_name_male",
            Gender::Female => "chinese_name_female",
            Gender::Unspecified => {
                if rng.random_bool(0.5) {
                    "chinese_name_male"
                } else {
                    "chinese_name_female"
                }
            },
        };
        self.generate(template, rng)
    }

    pub fn western_name(&self, gender: Gender, rng: &mut dyn RngCore) -> String {
        let template = match gender {
            Gender::Male => "western_name_male",
            Gender::Female => "western_name_female",
            Gender::Unspecified => {
                if rng.random_bool(0.5) {
                    "western_name_male"
                } else {
                    "western_name_female"
                }
            },
        };
        self.generate(template, rng)
    }

    pub fn place_name(&self, rng: &mut dyn RngCore) -> String {
        self.generate("place_name", rng)
    }

    /// Name for a piece of gear worn in `slot`.
    pub fn equipment_name(&self, slot: EquipSlot, rng: &mut dyn RngCore) -> String {
        self.generate(&format!("equipment_{}", slot.label()), rng)
    }

    pub fn enemy_name(&self, rng: &mut dyn RngCore) -> String {
        self.generate("enemy_generic", rng)
    }

    pub fn faction_name(&self, rng: &mut dyn RngCore) -> String {
        self.generate("faction_name", rng)
    }

    pub fn skill_name(&self, rng: &mut dyn RngCore) -> String {
        self.generate("skill_name", rng)
    }

    /// Name for a generated item of the given kind (`consumable`, `key`, `material`).
    pub fn item_name(&self, kind: &str, rng: &mut dyn RngCore) -> String {
        self.generate(&format!("item_{kind}"), rng)
    }
}

/// Choose between a template's own pattern and its weighted variants.
fn pick_variant<'a>(
    template: &'a NameTemplate,
    rng: &mut dyn RngCore,
) -> (&'a str, Option<&'a BTreeMap<String, TemplatePart>>) {
    if template.variants.is_empty() {
        return (&template.pattern, None);
    }
    let mut candidates = vec![(template.pattern.as_str(), None, PRIMARY_PATTERN_WEIGHT)];
    candidates.extend(
        template
            .variants
            .iter()
            .map(|v| (v.pattern.as_str(), Some(&v.parts), v.weight)),
    );
    candidates
        .choose_weighted(rng, |(_, _, weight)| *weight)
        .map_or((template.pattern.as_str(), None), |(pattern, parts, _)| (*pattern, *parts))
}

fn placeholder(key: &str) -> String {
    format!("<{key}>")
}
