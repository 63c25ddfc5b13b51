#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
//! NovelSim engine: story interpreter, battles, procedural generation and a terminal driver.

pub const NOVELSIM_VERSION: &str = env!("CARGO_PKG_VERSION");

// Core modules
pub mod battle;
pub mod data_paths;
pub mod effect;
pub mod engine;
pub mod expression;
pub mod generator;
pub mod idgen;
pub mod inventory;
pub mod names;
pub mod repl;
pub mod save_files;
pub mod simulation;
pub mod store;
pub mod style;

// Re-exports for convenience
pub use battle::{BattleAction, BattlePhase, BattleState, BattleSystem};
pub use engine::{EngineError, StoryEngine};
pub use generator::config::{GeneratorConfig, load_generator_config};
pub use generator::{GeneratorError, generate_story};
pub use names::{NameProvider, load_name_templates};
pub use repl::run_repl;
pub use save_files::SaveDir;
pub use simulation::SimAction;
pub use store::{MemoryStore, StoreError, export_story_json, load_story_file};
