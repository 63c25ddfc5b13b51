//! Line input for the terminal driver.
//!
//! Uses `rustyline` (history plus command-word completion) on an interactive terminal and
//! plain buffered stdin otherwise, e.g. when a script is piped in.

use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};

use crate::save_files::SAVE_DIR;

/// Outcome of reading a line.
pub enum InputEvent {
    Line(String),
    Eof,
    Interrupted,
}

/// Words offered by tab completion.
const COMMAND_WORDS: &[&str] = &[
    "attack", "continue", "defend", "do", "equip", "flee", "help", "history", "inventory", "item", "load", "look",
    "quit", "save", "saves", "skill", "skills", "stats", "unequip",
];

type ReplEditor = rustyline::Editor<CommandHelper, DefaultHistory>;

#[derive(Default)]
struct CommandHelper;

impl Helper for CommandHelper {}

impl Completer for CommandHelper {
    type Candidate = Pair;

    fn complete(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> rustyline::Result<(usize, Vec<Self::Candidate>)> {
        let (start, prefix) = current_prefix(line, pos);
        // only the first word is a command
        if prefix.is_empty() || line[..start].contains(|c: char| !c.is_whitespace()) {
            return Ok((start, Vec::new()));
        }
        Ok((start, completions(&prefix.to_lowercase())))
    }
}

impl Hinter for CommandHelper {
    type Hint = String;
}

impl Highlighter for CommandHelper {}

impl Validator for CommandHelper {}

fn current_prefix(line: &str, pos: usize) -> (usize, String) {
    let slice = &line[..pos];
    let word_start = slice.rfind(char::is_whitespace).map_or(0, |i| i + 1);
    (word_start, slice[word_start..].to_string())
}

fn completions(lower: &str) -> Vec<Pair> {
    COMMAND_WORDS
        .iter()
        .filter(|word| word.starts_with(lower))
        .map(|word| Pair {
            display: (*word).to_string(),
            replacement: (*word).to_string(),
        })
        .collect()
}

/// Reads player input, preferring `rustyline` and falling back to plain stdin.
pub struct InputManager {
    backend: Backend,
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InputManager {
    pub fn new() -> Self {
        let backend = if io::stdin().is_terminal() {
            match RustylineInput::new() {
                Ok(editor) => {
                    info!("using rustyline-backed input");
                    Backend::Rustyline(editor)
                },
                Err(err) => {
                    warn!("failed to initialize rustyline ({err}), falling back to basic stdin");
                    Backend::plain()
                },
            }
        } else {
            info!("stdin is not a TTY; using basic input mode");
            Backend::plain()
        };
        Self { backend }
    }

    /// Read a line. If the interactive backend fails, switch to plain stdin and retry once.
    ///
    /// # Errors
    /// Returns the I/O error from the plain backend.
    pub fn read_line(&mut self, prompt: &str) -> io::Result<InputEvent> {
        match self.backend.read_line(prompt) {
            Ok(event) => Ok(event),
            Err(err) if self.backend.is_rustyline() => {
                warn!("rustyline input failed: {err} -- switching to basic stdin");
                self.backend = Backend::plain();
                self.backend.read_line(prompt)
            },
            Err(err) => Err(err),
        }
    }
}

enum Backend {
    Rustyline(Box<RustylineInput>),
    Plain(StdinInput),
}

impl Backend {
    fn plain() -> Self {
        Backend::Plain(StdinInput::default())
    }

    fn is_rustyline(&self) -> bool {
        matches!(self, Backend::Rustyline(_))
    }

    fn read_line(&mut self, prompt: &str) -> io::Result<InputEvent> {
        match self {
            Backend::Rustyline(editor) => editor.read_line(prompt),
            Backend::Plain(stdin) => stdin.read_line(prompt),
        }
    }
}

struct RustylineInput {
    editor: ReplEditor,
    history_path: PathBuf,
}

impl RustylineInput {
    fn new() -> io::Result<Box<Self>> {
        let mut editor = ReplEditor::new().map_err(map_io_err)?;
        editor.set_helper(Some(CommandHelper));
        let history_path = history_file_path(Path::new(SAVE_DIR));

        if let Some(dir) = history_path.parent()
            && let Err(err) = fs::create_dir_all(dir)
        {
            warn!("failed to create history directory {}: {err}", dir.display());
        }
        if let Err(err) = editor.load_history(&history_path) {
            match err {
                ReadlineError::Io(ref io_err) if io_err.kind() == io::ErrorKind::NotFound => {
                    info!("no prior history at {}, starting fresh", history_path.display());
                },
                other => warn!("failed to load history from {}: {other}", history_path.display()),
            }
        }
        Ok(Box::new(Self { editor, history_path }))
    }

    fn read_line(&mut self, prompt: &str) -> io::Result<InputEvent> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    if let Err(err) = self.editor.add_history_entry(line.as_str()) {
                        warn!("failed to append to history: {err}");
                    }
                    if let Err(err) = self.editor.save_history(&self.history_path) {
                        warn!("failed to persist history to {}: {err}", self.history_path.display());
                    }
                }
                Ok(InputEvent::Line(line))
            },
            Err(err) => convert_readline_error(err),
        }
    }
}

#[derive(Default)]
struct StdinInput {
    buffer: String,
}

impl StdinInput {
    fn read_line(&mut self, prompt: &str) -> io::Result<InputEvent> {
        print!("{prompt}");
        io::stdout().flush()?;

        self.buffer.clear();
        if io::stdin().read_line(&mut self.buffer)? == 0 {
            return Ok(InputEvent::Eof);
        }
        let line = self.buffer.trim_end_matches(['\n', '\r']);
        Ok(InputEvent::Line(line.to_string()))
    }
}

fn convert_readline_error(err: ReadlineError) -> io::Result<InputEvent> {
    match err {
        ReadlineError::Interrupted => Ok(InputEvent::Interrupted),
        ReadlineError::Eof => Ok(InputEvent::Eof),
        other => Err(map_io_err(other)),
    }
}

fn map_io_err(err: ReadlineError) -> io::Error {
    match err {
        ReadlineError::Io(io_err) => io_err,
        other => io::Error::other(other),
    }
}

fn history_file_path(base: &Path) -> PathBuf {
    base.join("history.txt")
}
