//! Theme text tables: narration and dialogue lines, choice prompts, option labels and endings.

use novelsim_data::EndingType;

use super::config::StoryTheme;

pub struct ThemeText {
    /// `(speaker, line)`; an empty speaker is narration.
    pub lines: &'static [(&'static str, &'static str)],
    pub prompts: &'static [&'static str],
    pub options: &'static [&'static str],
    pub endings: &'static [(&'static str, &'static str, EndingType)],
    pub opening: &'static str,
}

const FANTASY: ThemeText = ThemeText {
    lines: &[
        ("", "You stand before an ancient castle. Mysterious runes cover its great stone gate."),
        ("Old Sage", "Young one, have you come seeking the legendary Dragon Pearl?"),
        ("", "On a distant peak, a great dragon circles slowly."),
        ("Elf Princess", "This forest is our home. Outsiders, leave."),
        ("", "Among the ruins you find a spellbook that glows faintly."),
        ("Dark Mage", "Foolish adventurer, you should never have come here!"),
        ("", "Strange sounds echo from deep within the cave."),
        ("Blacksmith", "This blade is my life's finest work. Use it well."),
    ],
    prompts: &[
        "What will you do?",
        "Facing the situation before you, you choose:",
        "Fate's road forks here. Which way will you go?",
    ],
    options: &[
        "Press on bravely",
        "Explore carefully",
        "Seek help",
        "Cast a spell",
        "Fight to the end",
        "Fall back for now",
        "Talk to them",
        "Sneak around",
    ],
    endings: &[
        ("The Hero Returns", "You fulfilled your quest and became a legend.", EndingType::Good),
        ("Darkness Falls", "The forces of evil triumph and the world sinks into darkness.", EndingType::Bad),
        ("The Hidden Truth", "You uncover the final secret of the world.", EndingType::Secret),
        ("A Quiet Life", "You turn from adventure and choose a peaceful life.", EndingType::Normal),
    ],
    opening: "Your journey begins at the edge of the known world.",
};

const SCI_FI: ThemeText = ThemeText {
    lines: &[
        ("", "The ship drifts through the void as alarms echo down the corridor."),
        ("AI Assistant", "Unknown life signs detected. Caution is advised."),
        ("", "The stargate powers up slowly, blue light flooding the control room."),
        ("Captain", "All hands to battle stations!"),
        ("", "Through the viewport, a giant planet looms closer."),
        ("Alien", "Earthling. At last we meet."),
        ("", "The machines in the lab hum quietly."),
        ("Scientist", "This discovery will change humanity's future."),
    ],
    prompts: &["What is the next move?", "The system requests a command:", "You need to decide:"],
    options: &[
        "Send a signal",
        "Raise the shields",
        "Run a scan",
        "Open a channel",
        "Prepare to jump",
        "Launch a probe",
        "Call for backup",
        "Go in alone",
    ],
    endings: &[
        ("A New Era", "Humanity steps into the interstellar age.", EndingType::Good),
        ("Extinction", "Civilisation is wiped out in an instant.", EndingType::Bad),
        ("Parallel Worlds", "You learn this is not the only reality.", EndingType::Secret),
        ("The Way Home", "At long last, you return to Earth.", EndingType::Normal),
    ],
    opening: "The cryo pod hisses open. The ship is silent.",
};

const MYSTERY: ThemeText = ThemeText {
    lines: &[
        ("", "The clock strikes midnight and the old mansion's lights flicker."),
        ("Detective", "Every clue points to the locked room."),
        ("", "In a drawer you find a mysterious letter."),
        ("Butler", "The master is receiving no guests tonight."),
        ("", "The portrait on the wall seems to be watching you."),
        ("Stranger", "Some truths are better left unknown."),
        ("", "Footsteps sound from the cellar."),
        ("Officer", "Please cooperate with the investigation."),
    ],
    prompts: &["Where do the clues lead?", "You choose to investigate:", "What should you do next?"],
    options: &[
        "Keep investigating",
        "Question a suspect",
        "Gather evidence",
        "Call the police",
        "Go there alone",
        "Wait for the right moment",
        "Slip in disguised",
        "Confront them directly",
    ],
    endings: &[
        ("Case Closed", "The mystery is finally solved.", EndingType::Good),
        ("Buried Forever", "The truth is buried for good.", EndingType::Bad),
        ("An Unexpected Culprit", "The killer was someone no one suspected.", EndingType::Secret),
        ("Left Unsolved", "The case is shelved for now.", EndingType::Normal),
    ],
    opening: "A letter with no return address arrives on a rainy evening.",
};

const ROMANCE: ThemeText = ThemeText {
    lines: &[
        ("", "It is cherry blossom season when you meet her in the cafe."),
        ("Her", "Is this seat taken?"),
        ("", "Meetings in the rain always feel romantic."),
        ("Him", "There's something I've always wanted to tell you..."),
        ("", "At the beach at sunset, the sea breeze blows gently."),
        ("Her", "Thank you for always being by my side."),
        ("", "At the meeting place, you are the only one there."),
        ("Him", "Sorry I kept you waiting."),
    ],
    prompts: &["What does your heart say?", "How should you respond?", "You decide to:"],
    options: &[
        "Confess your feelings",
        "Watch over them quietly",
        "Ask them out",
        "Give a gift",
        "Write a letter",
        "Arrange a chance meeting",
        "Ask a friend for help",
        "Wait for them",
    ],
    endings: &[
        ("Happily Ever After", "You live happily together.", EndingType::Good),
        ("Missed Chances", "The connection simply fades away.", EndingType::Bad),
        ("Reunion", "Years later, you meet again.", EndingType::Secret),
        ("Good Friends", "You didn't end up together, but you became close friends.", EndingType::Normal),
    ],
    opening: "A new semester, a new city, and a chance encounter.",
};

const HORROR: ThemeText = ThemeText {
    lines: &[
        ("", "Eerie sounds come from the room at the end of the hallway."),
        ("???", "H-help... me..."),
        ("", "You feel someone staring at your back."),
        ("", "The mirror shows a figure that is not you."),
        ("Child", "Mister, do you want to play with us?"),
        ("", "Your phone buzzes with a message from an unknown number."),
        ("", "The trail of blood leads down to the basement."),
        ("Eerie Voice", "Don't look back..."),
    ],
    prompts: &["Run or explore?", "What do you do?", "Frozen with fear, you choose:"],
    options: &[
        "Get out of here",
        "Hide",
        "Keep exploring",
        "Call for help",
        "Look for a weapon",
        "Turn on the light",
        "Stay silent",
        "Face your fear",
    ],
    endings: &[
        ("Escape", "You make it out of the nightmare alive.", EndingType::Good),
        ("Eternal Captivity", "You can never leave this place.", EndingType::Bad),
        ("True Terror", "So that was the source of the horror...", EndingType::Secret),
        ("Only a Dream", "You wake up. It was only a nightmare.", EndingType::Normal),
    ],
    opening: "The car breaks down on a road that isn't on any map.",
};

pub fn theme_text(theme: StoryTheme) -> &'static ThemeText {
    match theme {
        StoryTheme::Fantasy => &FANTASY,
        StoryTheme::SciFi => &SCI_FI,
        StoryTheme::Mystery => &MYSTERY,
        StoryTheme::Romance => &ROMANCE,
        StoryTheme::Horror => &HORROR,
    }
}

/// Condition expressions generated condition nodes choose from.
pub const CONDITION_POOL: &[&str] = &["player_level > 5", "has_item:key_gold", "flag:boss_defeated", "gold >= 100"];

/// Story variables generated variable nodes modify.
pub const STORY_VARIABLES: &[&str] = &["score", "reputation", "courage"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_theme_has_text_in_each_table() {
        for theme in [
            StoryTheme::Fantasy,
            StoryTheme::SciFi,
            StoryTheme::Mystery,
            StoryTheme::Romance,
            StoryTheme::Horror,
        ] {
            let text = theme_text(theme);
            assert!(!text.lines.is_empty());
            assert!(!text.prompts.is_empty());
            assert!(text.options.len() >= 4);
            assert_eq!(text.endings.len(), 4);
        }
    }
}
