#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
//! ** NovelSim **
//! Play a story file, or a freshly generated one, in the terminal.
//!
//! ```text
//! novelsim                    play a generated story
//! novelsim story.json         play a story file (JSON or RON)
//! novelsim --export out.json  generate a story and write it out
//! ```

use std::env;
use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, bail};
use colored::Colorize;
use log::info;
use novelsim_data::Story;
use novelsim_engine::data_paths::data_path;
use novelsim_engine::style::StoryStyle;
use novelsim_engine::{
    MemoryStore, NOVELSIM_VERSION, NameProvider, SaveDir, StoryEngine, export_story_json, generate_story,
    load_generator_config, load_name_templates, load_story_file, run_repl,
};

fn main() -> Result<()> {
    env_logger::init();
    let args: Vec<String> = env::args().skip(1).collect();

    let story = match args.as_slice() {
        [] => generated_story()?,
        [flag, path] if flag == "--export" => {
            let story = generated_story()?;
            let json = export_story_json(&story).context("while serializing the generated story")?;
            fs::write(path, json).with_context(|| format!("writing story to '{path}'"))?;
            println!("Wrote \"{}\" ({} nodes) to {path}", story.title, story.nodes.len());
            return Ok(());
        },
        [path] if !path.starts_with('-') => {
            load_story_file(Path::new(path)).with_context(|| format!("while loading story from '{path}'"))?
        },
        _ => bail!("usage: novelsim [STORY_FILE | --export OUT_FILE]"),
    };
    info!("story \"{}\" ready with {} nodes", story.title, story.nodes.len());

    let mut saves = SaveDir::for_story(&story.id);
    let mut engine = StoryEngine::new(Box::new(MemoryStore::new().with_story(story.clone())), None);
    print_banner(&story)?;
    engine.start_story(story).context("while starting the story")?;

    run_repl(&mut engine, &mut saves)
}

fn generated_story() -> Result<Story> {
    let config = load_generator_config(&data_path("generator.toml"));
    let names = NameProvider::new(load_name_templates(&data_path("names.toml")));
    info!("Start: generating a {} story...", config.theme.label());
    generate_story(&config, &names).context("while generating a story")
}

fn print_banner(story: &Story) -> Result<()> {
    // clear the screen
    print!("\x1B[2J\x1B[H");
    std::io::stdout().flush()?;

    println!("{:^84}", story.title.to_uppercase().title_style());
    println!("{:^84}", format!("by {} - NovelSim {NOVELSIM_VERSION}", story.author).dimmed());
    if !story.description.is_empty() {
        println!("\n{}", story.description.narration_style());
    }
    println!("\nType {} at any prompt for the list of commands.\n", "help".bold());
    Ok(())
}
