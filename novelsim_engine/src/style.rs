//! Styling helpers for terminal output.
//!
//! The [`StoryStyle`] trait applies ANSI styling via the `colored` crate. It is
//! implemented for `&str` and `String` so literals and formatted text can be styled
//! directly. [`normal_block`] and [`indented_block`] give `textwrap` options sized to the
//! current terminal.

use colored::{ColoredString, Colorize};
use textwrap::{Options, termwidth};

use crate::battle::LogKind;

/// Widest line the driver prints, even on very wide terminals.
const MAX_WIDTH: usize = 100;

/// Convenience trait for applying color and style to text output.
pub trait StoryStyle {
    fn title_style(&self) -> ColoredString;
    fn speaker_style(&self) -> ColoredString;
    fn narration_style(&self) -> ColoredString;
    fn prompt_style(&self) -> ColoredString;
    fn option_style(&self) -> ColoredString;
    fn locked_option_style(&self) -> ColoredString;
    fn ending_style(&self) -> ColoredString;
    fn item_style(&self) -> ColoredString;
    fn enemy_style(&self) -> ColoredString;
    fn stat_style(&self) -> ColoredString;
    fn damage_style(&self) -> ColoredString;
    fn heal_style(&self) -> ColoredString;
    fn buff_style(&self) -> ColoredString;
    fn critical_style(&self) -> ColoredString;
    fn info_style(&self) -> ColoredString;
    fn error_style(&self) -> ColoredString;
    fn section_style(&self) -> ColoredString;
}

impl StoryStyle for &str {
    fn section_style(&self) -> ColoredString {
        let bracketed = format!("[{self}]");
        bracketed.truecolor(75, 80, 75)
    }
    fn title_style(&self) -> ColoredString {
        self.bold().truecolor(223, 77, 10).underline()
    }
    fn speaker_style(&self) -> ColoredString {
        self.bold().truecolor(13, 130, 60)
    }
    fn narration_style(&self) -> ColoredString {
        self.italic().truecolor(102, 208, 250)
    }
    fn prompt_style(&self) -> ColoredString {
        self.truecolor(220, 40, 220)
    }
    fn option_style(&self) -> ColoredString {
        self.truecolor(220, 180, 40)
    }
    fn locked_option_style(&self) -> ColoredString {
        self.dimmed().strikethrough()
    }
    fn ending_style(&self) -> ColoredString {
        self.bold().truecolor(230, 230, 30)
    }
    fn item_style(&self) -> ColoredString {
        self.truecolor(220, 180, 40)
    }
    fn enemy_style(&self) -> ColoredString {
        self.bold().truecolor(200, 50, 50)
    }
    fn stat_style(&self) -> ColoredString {
        self.truecolor(110, 220, 110)
    }
    fn damage_style(&self) -> ColoredString {
        self.truecolor(230, 80, 80)
    }
    fn heal_style(&self) -> ColoredString {
        self.truecolor(110, 220, 110)
    }
    fn buff_style(&self) -> ColoredString {
        self.italic().truecolor(75, 180, 255)
    }
    fn critical_style(&self) -> ColoredString {
        self.bold().truecolor(255, 140, 0)
    }
    fn info_style(&self) -> ColoredString {
        self.dimmed()
    }
    fn error_style(&self) -> ColoredString {
        self.truecolor(230, 30, 30)
    }
}

impl StoryStyle for String {
    fn section_style(&self) -> ColoredString {
        self.as_str().section_style()
    }
    fn title_style(&self) -> ColoredString {
        self.as_str().title_style()
    }
    fn speaker_style(&self) -> ColoredString {
        self.as_str().speaker_style()
    }
    fn narration_style(&self) -> ColoredString {
        self.as_str().narration_style()
    }
    fn prompt_style(&self) -> ColoredString {
        self.as_str().prompt_style()
    }
    fn option_style(&self) -> ColoredString {
        self.as_str().option_style()
    }
    fn locked_option_style(&self) -> ColoredString {
        self.as_str().locked_option_style()
    }
    fn ending_style(&self) -> ColoredString {
        self.as_str().ending_style()
    }
    fn item_style(&self) -> ColoredString {
        self.as_str().item_style()
    }
    fn enemy_style(&self) -> ColoredString {
        self.as_str().enemy_style()
    }
    fn stat_style(&self) -> ColoredString {
        self.as_str().stat_style()
    }
    fn damage_style(&self) -> ColoredString {
        self.as_str().damage_style()
    }
    fn heal_style(&self) -> ColoredString {
        self.as_str().heal_style()
    }
    fn buff_style(&self) -> ColoredString {
        self.as_str().buff_style()
    }
    fn critical_style(&self) -> ColoredString {
        self.as_str().critical_style()
    }
    fn info_style(&self) -> ColoredString {
        self.as_str().info_style()
    }
    fn error_style(&self) -> ColoredString {
        self.as_str().error_style()
    }
}

/// Style a battle log line by its kind.
pub fn log_line(kind: LogKind, message: &str) -> ColoredString {
    match kind {
        LogKind::Info => message.info_style(),
        LogKind::Damage => message.damage_style(),
        LogKind::Heal => message.heal_style(),
        LogKind::Buff => message.buff_style(),
        LogKind::Critical => message.critical_style(),
    }
}

/// Current wrap width: the terminal width, capped.
pub fn wrap_width() -> usize {
    termwidth().min(MAX_WIDTH)
}

/// Wrap options for body text.
pub fn normal_block() -> Options<'static> {
    Options::new(wrap_width())
}

/// Wrap options for text nested under a heading or list entry.
pub fn indented_block() -> Options<'static> {
    Options::new(wrap_width()).initial_indent("    ").subsequent_indent("    ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapping_respects_the_cap() {
        assert!(wrap_width() <= MAX_WIDTH);
        let text = "word ".repeat(80);
        let filled = textwrap::fill(&text, indented_block());
        assert!(filled.lines().all(|line| line.starts_with("    ")));
        assert!(filled.lines().all(|line| line.len() <= MAX_WIDTH));
    }

    #[test]
    fn log_lines_keep_their_text() {
        colored::control::set_override(false);
        assert_eq!(log_line(LogKind::Critical, "Critical hit!").to_string(), "Critical hit!");
        assert_eq!("save".section_style().to_string(), "[save]");
    }
}
