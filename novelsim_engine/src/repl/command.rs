//! Player commands understood by the terminal driver.

use novelsim_data::EquipSlot;
use variantly::Variantly;

#[derive(Debug, Clone, PartialEq, Eq, Variantly)]
pub enum Command {
    /// Move past the current dialogue (an empty line does the same).
    Proceed,
    /// Take the numbered choice option (1-based).
    Choose(usize),
    Attack,
    Defend,
    Flee,
    Skill(String),
    /// Use a consumable, in or out of battle.
    UseItem(String),
    Equip(String),
    Unequip(EquipSlot),
    /// Show what can be done at the current location.
    Look,
    /// Take the numbered option of the last `look` menu.
    Act(usize),
    Inventory,
    Stats,
    Skills,
    History,
    Save(u32),
    Load(u32),
    ListSaves,
    Help,
    Quit,
    Unknown(String),
}

/// Parse one input line. Matching is case-insensitive; ids keep the case they were typed in.
pub fn parse_command(input: &str) -> Command {
    let words: Vec<&str> = input.split_whitespace().collect();
    let lowered: Vec<String> = words.iter().map(|w| w.to_lowercase()).collect();
    let lowered: Vec<&str> = lowered.iter().map(String::as_str).collect();

    if let [only] = lowered.as_slice()
        && let Ok(n) = only.parse::<usize>()
    {
        return if n > 0 {
            Command::Choose(n)
        } else {
            Command::Unknown(input.trim().to_string())
        };
    }

    match (lowered.as_slice(), words.as_slice()) {
        ([] | ["c" | "continue" | "next"], _) => Command::Proceed,
        (["a" | "attack"], _) => Command::Attack,
        (["d" | "defend"], _) => Command::Defend,
        (["f" | "flee" | "run"], _) => Command::Flee,
        (["skill" | "cast", _], [_, id]) => Command::Skill((*id).to_string()),
        (["item" | "use", _], [_, id]) => Command::UseItem((*id).to_string()),
        (["equip" | "wear" | "wield", _], [_, id]) => Command::Equip((*id).to_string()),
        (["unequip" | "remove", slot], _) => EquipSlot::from_label(slot)
            .map_or_else(|| Command::Unknown(input.trim().to_string()), Command::Unequip),
        (["l" | "look"], _) => Command::Look,
        (["do" | "act", n], _) => n
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .map_or_else(|| Command::Unknown(input.trim().to_string()), Command::Act),
        (["i" | "inv" | "inventory"], _) => Command::Inventory,
        (["stats" | "status"], _) => Command::Stats,
        (["skills"], _) => Command::Skills,
        (["history" | "log"], _) => Command::History,
        (["save", slot], _) => slot
            .parse()
            .map_or_else(|_| Command::Unknown(input.trim().to_string()), Command::Save),
        (["load", slot], _) => slot
            .parse()
            .map_or_else(|_| Command::Unknown(input.trim().to_string()), Command::Load),
        (["saves"], _) => Command::ListSaves,
        (["help" | "?"], _) => Command::Help,
        (["q" | "quit" | "exit"], _) => Command::Quit,
        _ => Command::Unknown(input.trim().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_line_continues() {
        assert_eq!(parse_command(""), Command::Proceed);
        assert_eq!(parse_command("  \n"), Command::Proceed);
        assert!(parse_command("Continue").is_proceed());
    }

    #[test]
    fn numbers_pick_choices() {
        assert_eq!(parse_command("2"), Command::Choose(2));
        assert!(parse_command("0").is_unknown());
    }

    #[test]
    fn ids_keep_their_case() {
        assert_eq!(parse_command("USE Potion_HP"), Command::UseItem("Potion_HP".into()));
        assert_eq!(parse_command("skill skill_1"), Command::Skill("skill_1".into()));
    }

    #[test]
    fn slots_and_save_numbers_are_checked() {
        assert_eq!(parse_command("unequip boots"), Command::Unequip(EquipSlot::Boots));
        assert!(parse_command("unequip hat").is_unknown());
        assert_eq!(parse_command("save 3"), Command::Save(3));
        assert!(parse_command("load three").is_unknown());
    }

    #[test]
    fn look_then_act() {
        assert_eq!(parse_command("look"), Command::Look);
        assert_eq!(parse_command("do 2"), Command::Act(2));
        assert!(parse_command("act 0").is_unknown());
        assert!(parse_command("do talk").is_unknown());
    }
}
