//! Terminal driver.
//!
//! A read-eval-print loop over one [`StoryEngine`] session: it renders the node the
//! engine settled on, reads a command, forwards it to the engine and renders the result.
//! Engine errors are shown as short messages and never end the session, apart from a
//! structural cycle, after which only saves, loads and quitting still work.

pub mod command;
mod input;

use std::time::Instant;

use anyhow::{Context, Result};
use colored::Colorize;
use log::info;
use novelsim_data::{EquipSlot, ItemEffect, NodeContent, StoryNode};
use textwrap::fill;

use crate::battle::{BattleAction, BattlePhase, BattleState};
use crate::engine::{BattleTurn, EngineError, StoryEngine};
use crate::inventory;
use crate::save_files::{SaveDir, SaveFileStatus, format_modified};
use crate::store::SaveRepository;
use crate::style::{StoryStyle, indented_block, log_line, normal_block};
use command::{Command, parse_command};
use input::{InputEvent, InputManager};

/// How many history entries `history` shows.
const HISTORY_SHOWN: usize = 10;

/// Control flow signal used by handlers to exit the loop.
pub enum ReplControl {
    Continue,
    Quit,
}

/// Run the loop until the player quits or input ends.
///
/// # Errors
/// Only unrecoverable input failures end the loop with an error.
pub fn run_repl(engine: &mut StoryEngine, saves: &mut SaveDir) -> Result<()> {
    let mut input = InputManager::new();
    let mut clock = Instant::now();
    if let Some(node) = engine.current_node().cloned() {
        render_node(engine, &node);
    }

    loop {
        let prompt = prompt_for(engine);
        let line = match input.read_line(&prompt).context("reading player input")? {
            InputEvent::Line(line) => line,
            InputEvent::Eof => "quit".to_string(),
            InputEvent::Interrupted => {
                println!("{}", "Command canceled.".info_style());
                continue;
            },
        };

        let elapsed = clock.elapsed();
        clock = Instant::now();
        engine.update_play_time(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));

        let command = parse_command(&line);
        info!("player command: {command:?}");
        match dispatch(engine, saves, command) {
            Ok(ReplControl::Quit) => break,
            Ok(ReplControl::Continue) => {},
            Err(err) => println!("{}", err.to_string().error_style()),
        }
    }
    println!("{}", "Farewell.".narration_style());
    Ok(())
}

fn dispatch(engine: &mut StoryEngine, saves: &mut SaveDir, command: Command) -> Result<ReplControl, EngineError> {
    match command {
        Command::Proceed => continue_handler(engine)?,
        Command::Choose(n) => choose_handler(engine, n)?,
        Command::Attack => battle_handler(engine, BattleAction::Attack)?,
        Command::Defend => battle_handler(engine, BattleAction::Defend)?,
        Command::Flee => battle_handler(engine, BattleAction::Flee)?,
        Command::Skill(id) => battle_handler(engine, BattleAction::Skill(id))?,
        Command::UseItem(id) if engine.battle().is_some() => battle_handler(engine, BattleAction::UseItem(id))?,
        Command::UseItem(id) => use_item_handler(engine, &id)?,
        Command::Equip(id) => equip_handler(engine, &id)?,
        Command::Unequip(slot) => unequip_handler(engine, slot)?,
        Command::Look => look_handler(engine)?,
        Command::Act(n) => act_handler(engine, n)?,
        Command::Inventory => inventory_handler(engine),
        Command::Stats => stats_handler(engine),
        Command::Skills => skills_handler(engine),
        Command::History => history_handler(engine),
        Command::Save(slot) => save_handler(engine, saves, slot)?,
        Command::Load(slot) => load_handler(engine, saves, slot)?,
        Command::ListSaves => list_saves_handler(saves)?,
        Command::Help => help_handler(),
        Command::Quit => return Ok(ReplControl::Quit),
        Command::Unknown(text) => {
            println!("{} (type {} for commands)", format!("Didn't understand \"{text}\".").error_style(), "help".bold());
        },
    }
    Ok(ReplControl::Continue)
}

fn continue_handler(engine: &mut StoryEngine) -> Result<(), EngineError> {
    if engine.battle().is_some() {
        println!("{}", "You are in a fight: attack, defend, flee, skill <id> or item <id>.".info_style());
        return Ok(());
    }
    match engine.current_node().map(|n| &n.content) {
        Some(NodeContent::Choice { .. }) => {
            println!("{}", "Choose an option by its number.".info_style());
        },
        Some(NodeContent::Ending { .. }) => {
            println!("{}", "The story is over. Load a save or quit.".info_style());
        },
        _ => {
            let node = engine.continue_dialogue()?;
            render_node(engine, &node);
        },
    }
    Ok(())
}

fn choose_handler(engine: &mut StoryEngine, n: usize) -> Result<(), EngineError> {
    let option = match engine.current_node().map(|node| &node.content) {
        Some(NodeContent::Choice { options, .. }) => options.get(n - 1).cloned(),
        _ => {
            println!("{}", "There is nothing to choose right now.".info_style());
            return Ok(());
        },
    };
    let Some(option) = option else {
        println!("{}", format!("There is no option {n}.").error_style());
        return Ok(());
    };
    let node = engine.process_choice(&option)?;
    render_node(engine, &node);
    Ok(())
}

fn battle_handler(engine: &mut StoryEngine, action: BattleAction) -> Result<(), EngineError> {
    let seen = engine.battle().map_or(0, |b| b.logs.len());
    let turn = engine.execute_battle_action(&action)?;
    for entry in turn.battle.logs.iter().skip(seen) {
        println!("  {}", log_line(entry.kind, &entry.message));
    }
    if !turn.action.consumed_turn {
        println!("{}", "(that didn't use up your turn)".info_style());
    }
    render_battle_end(engine, &turn);
    Ok(())
}

fn render_battle_end(engine: &StoryEngine, turn: &BattleTurn) {
    let Some(outcome) = &turn.outcome else {
        battle_status(&turn.battle);
        return;
    };
    let verdict = match outcome.phase {
        BattlePhase::Victory => "Victory!".ending_style(),
        BattlePhase::Defeat => "You were defeated...".damage_style(),
        BattlePhase::Fled => "You got away.".info_style(),
        BattlePhase::PlayerTurn | BattlePhase::EnemyTurn => "The fight goes on.".info_style(),
    };
    println!("\n{verdict}");
    if let Some(rewards) = &outcome.rewards {
        println!("  {} exp, {} gold", rewards.exp.to_string().stat_style(), rewards.gold.to_string().item_style());
        for grant in &rewards.items {
            println!("  {} x{}", item_name(engine, &grant.item_id).item_style(), grant.quantity);
        }
    }
    if outcome.levels_gained > 0 {
        let level = engine.game_state().player_stats.level();
        println!("{}", format!("Level up! You are now level {level}.").ending_style());
    }
    render_node(engine, &outcome.node);
}

fn use_item_handler(engine: &mut StoryEngine, id: &str) -> Result<(), EngineError> {
    let effect = engine.use_item(id)?;
    let name = item_name(engine, id);
    match effect {
        ItemEffect::Heal { hp, mp } => println!("You use {}: +{hp} HP, +{mp} MP.", name.item_style()),
        ItemEffect::Buff {
            attribute, value, ..
        } => println!("You use {}: {attribute} {value:+}.", name.item_style()),
        ItemEffect::EquipmentBonus { .. } => println!("You use {}.", name.item_style()),
    }
    Ok(())
}

fn equip_handler(engine: &mut StoryEngine, id: &str) -> Result<(), EngineError> {
    let previous = engine.equip_item(id)?;
    println!("You equip {}.", item_name(engine, id).item_style());
    if let Some(previous) = previous {
        println!("{} goes back into your pack.", item_name(engine, &previous).item_style());
    }
    Ok(())
}

fn unequip_handler(engine: &mut StoryEngine, slot: EquipSlot) -> Result<(), EngineError> {
    let removed = engine.unequip_item(slot)?;
    println!("You take off {}.", item_name(engine, &removed).item_style());
    Ok(())
}

fn inventory_handler(engine: &StoryEngine) {
    let Some(story) = engine.story() else {
        return;
    };
    let state = engine.game_state();
    println!("{}", "inventory".section_style());
    if state.inventory.is_empty() {
        println!("  {}", "(empty)".info_style());
    }
    for slot in &state.inventory {
        let name = inventory::display_name(state, story, slot);
        let id = slot.instance_id.as_deref().unwrap_or(&slot.item_id);
        println!("  {} x{} {}", name.item_style(), slot.quantity, format!("({id})").info_style());
    }
    println!("{}", "equipment".section_style());
    for slot in EquipSlot::ALL {
        let worn = state
            .equipment
            .get(slot)
            .map_or_else(|| "-".to_string(), |id| item_name(engine, id));
        println!("  {:<10} {}", slot.label(), worn.item_style());
    }
    println!("  gold: {}", state.gold.to_string().item_style());
}

fn stats_handler(engine: &StoryEngine) {
    let Some(story) = engine.story() else {
        return;
    };
    let state = engine.game_state();
    let stats = inventory::stats_with_equipment(state, story);
    println!("{}", "stats".section_style());
    println!(
        "  Level {}  EXP {}/{}",
        stats.level().to_string().stat_style(),
        stats.exp(),
        stats.exp_to_next_level()
    );
    println!("  HP {}/{}  MP {}/{}", stats.current_hp(), stats.max_hp(), stats.current_mp(), stats.max_mp());
    println!(
        "  ATK {}  DEF {}  SPD {}  LUCK {}",
        stats.attack(),
        stats.defense(),
        stats.speed(),
        stats.luck()
    );
    for (faction, value) in &state.faction_reputations {
        println!("  reputation with {faction}: {value}");
    }
}

fn skills_handler(engine: &StoryEngine) {
    let state = engine.game_state();
    if state.learned_skills.is_empty() {
        println!("{}", "You haven't learned any skills.".info_style());
        return;
    }
    for id in &state.learned_skills {
        match engine.story().and_then(|s| s.skill(id)) {
            Some(skill) => println!("  {} ({id}) {} MP", skill.name.item_style(), skill.mp_cost),
            None => println!("  {id}"),
        }
    }
}

fn history_handler(engine: &StoryEngine) {
    let history = &engine.game_state().history;
    for entry in history.iter().skip(history.len().saturating_sub(HISTORY_SHOWN)) {
        println!("  {} {}", format!("[{:?}]", entry.kind).info_style(), entry.text);
    }
}

fn save_handler(engine: &StoryEngine, saves: &mut SaveDir, slot: u32) -> Result<(), EngineError> {
    let save = engine.create_save(slot)?;
    saves.save_slot(&save)?;
    println!("Saved to slot {slot} ({}).", save.formatted_play_time());
    Ok(())
}

fn load_handler(engine: &mut StoryEngine, saves: &SaveDir, slot: u32) -> Result<(), EngineError> {
    let save = saves.load_slot(slot)?;
    let story = engine.story().cloned().ok_or(EngineError::NoStoryLoaded)?;
    let node = engine.load_from_save(story, save)?;
    println!("{}", format!("Loaded slot {slot}.").info_style());
    render_node(engine, &node);
    Ok(())
}

fn list_saves_handler(saves: &SaveDir) -> Result<(), EngineError> {
    let entries = saves.entries()?;
    if entries.is_empty() {
        println!("{}", "No saves yet.".info_style());
    }
    for entry in entries {
        let when = entry.modified.map(format_modified).unwrap_or_default();
        match (&entry.status, &entry.save) {
            (SaveFileStatus::Ready, Some(save)) => println!(
                "  slot {}: {} [{}] {} {}",
                entry.slot,
                save.story_title,
                save.formatted_play_time(),
                save.current_node_preview.as_deref().unwrap_or(""),
                when.info_style()
            ),
            (SaveFileStatus::Corrupted { message }, _) => {
                println!("  slot {}: {}", entry.slot, format!("unreadable ({message})").error_style());
            },
            (SaveFileStatus::Ready, None) => println!("  slot {}: ?", entry.slot),
        }
    }
    Ok(())
}

fn look_handler(engine: &mut StoryEngine) -> Result<(), EngineError> {
    let menu = engine.interaction_menu()?;
    let NodeContent::Choice { prompt, options } = &menu.content else {
        render_node(engine, &menu);
        return Ok(());
    };
    println!("{}", fill(prompt, normal_block()).prompt_style());
    for (i, option) in options.iter().enumerate() {
        println!("  {}", format!("do {}. {}", i + 1, option.text).option_style());
    }
    Ok(())
}

fn act_handler(engine: &mut StoryEngine, n: usize) -> Result<(), EngineError> {
    let option_id = match engine.last_interaction_menu().map(|menu| &menu.content) {
        Some(NodeContent::Choice { options, .. }) => options.get(n - 1).map(|o| o.id.clone()),
        _ => None,
    };
    let Some(option_id) = option_id else {
        println!("{}", "Type look to see what you can do here.".info_style());
        return Ok(());
    };
    let node = engine.choose_interaction(&option_id)?;
    render_node(engine, &node);
    Ok(())
}

fn help_handler() {
    let lines = [
        ("<enter> / continue", "move on from dialogue"),
        ("<number>", "take a choice option"),
        ("attack / defend / flee", "battle actions"),
        ("skill <id> / item <id>", "use a skill or item in battle"),
        ("use <id>", "use a consumable"),
        ("equip <id> / unequip <slot>", "manage equipment"),
        ("look / do <n>", "see what you can do here, then do it"),
        ("inventory / stats / skills", "look at your character"),
        ("history", "recent events"),
        ("save <n> / load <n> / saves", "save slots"),
        ("quit", "leave the game"),
    ];
    println!("{}", "commands".section_style());
    for (usage, what) in lines {
        println!("  {:<30} {}", usage.option_style(), what);
    }
}

/// Print a settled node.
pub fn render_node(engine: &StoryEngine, node: &StoryNode) {
    if let Some(story) = engine.story()
        && let Some(location) = story.node_locations.get(&node.id).and_then(|id| story.location(id))
    {
        println!("\n{}", location.name.section_style());
    }
    match &node.content {
        NodeContent::Dialogue { speaker, text, .. } => {
            if let Some(speaker) = speaker.as_deref().filter(|s| !s.is_empty()) {
                println!("{}", speaker.speaker_style());
                println!("{}", fill(text, indented_block()).narration_style());
            } else {
                println!("{}", fill(text, normal_block()).narration_style());
            }
        },
        NodeContent::Choice { prompt, options } => {
            println!("{}", fill(prompt, normal_block()).prompt_style());
            let available = engine.available_options();
            for (i, option) in options.iter().enumerate() {
                let label = format!("{}. {}", i + 1, option.text);
                if available.iter().any(|o| o.id == option.id) {
                    println!("  {}", label.option_style());
                } else {
                    println!("  {}", label.locked_option_style());
                }
            }
        },
        NodeContent::Battle { .. } => {
            if let Some(battle) = engine.battle() {
                println!("{} blocks your way!", battle.enemy.name.enemy_style());
                battle_status(battle);
            }
        },
        NodeContent::Ending {
            title,
            description,
            ending_type,
            rewards,
        } => {
            println!("\n{}", format!("~ {title} ~").title_style());
            println!("{}", fill(description, normal_block()).narration_style());
            println!("{}", format!("({ending_type:?} ending)").ending_style());
            if !rewards.is_empty() {
                println!("  {} exp, {} gold", rewards.exp, rewards.gold);
                for grant in &rewards.items {
                    println!("  {} x{}", item_name(engine, &grant.item_id).item_style(), grant.quantity);
                }
            }
        },
        NodeContent::Condition { .. }
        | NodeContent::ItemAction { .. }
        | NodeContent::VariableAction { .. }
        | NodeContent::Random { .. } => {
            println!("{}", node.content.summary().info_style());
        },
    }
}

fn battle_status(battle: &BattleState) {
    let enemy = &battle.enemy.stats;
    let player = &battle.player_stats;
    println!(
        "  {} HP {}/{}   {} HP {}/{} MP {}/{}",
        battle.enemy.name.enemy_style(),
        enemy.current_hp(),
        enemy.max_hp(),
        "You".bold(),
        player.current_hp(),
        player.max_hp(),
        player.current_mp(),
        player.max_mp()
    );
}

fn prompt_for(engine: &StoryEngine) -> String {
    let stats = &engine.game_state().player_stats;
    let text = match engine.battle() {
        Some(battle) => format!(
            "\n[HP {}/{} | MP {}/{} | turn {}] fight> ",
            battle.player_stats.current_hp(),
            battle.player_stats.max_hp(),
            battle.player_stats.current_mp(),
            battle.player_stats.max_mp(),
            battle.turn
        ),
        None => format!(
            "\n[Lv {} | HP {}/{} | Gold {}]> ",
            stats.level(),
            stats.current_hp(),
            stats.max_hp(),
            engine.game_state().gold
        ),
    };
    text.prompt_style().to_string()
}

/// Display name of a template id or instance uid, falling back to the id itself.
fn item_name(engine: &StoryEngine, id: &str) -> String {
    let state = engine.game_state();
    if let Some(instance) = state.item_instances.get(id) {
        return instance.name.clone();
    }
    engine
        .story()
        .and_then(|story| story.item(id).map(|i| i.name.clone()).or_else(|| story.instance(id).map(|i| i.name.clone())))
        .unwrap_or_else(|| id.to_string())
}
