//! Shared data model for NovelSim stories: the node graph, RPG entities, world entities
//! and run-time game state.

pub mod interaction;
pub mod rpg;
pub mod state;
pub mod story;
pub mod validate;
pub mod world;

pub use interaction::*;
pub use rpg::*;
pub use state::*;
pub use story::*;
pub use validate::{ValidationError, validate_story};
pub use world::*;
