use novelsim_data::{NodeContent, validate_story};
use novelsim_engine::generator::config::{EntityKind, EntityRule, GeneratorConfig, StoryTheme};
use novelsim_engine::generator::graph::{is_connected, minimum_spanning_tree};
use novelsim_engine::generator::layout::{CANVAS_HEIGHT, CANVAS_WIDTH};
use novelsim_engine::generator::{SEED_VARIABLE, verify_story};
use novelsim_engine::{NameProvider, export_story_json, generate_story};

fn with_locations(count: usize, seed: u64) -> GeneratorConfig {
    let mut config = GeneratorConfig {
        seed: Some(seed),
        ..GeneratorConfig::default()
    };
    config.rules.retain(|rule| rule.kind != EntityKind::Location);
    config.rules.push(EntityRule::new(EntityKind::Location, count));
    config
}

#[test]
fn locations_are_always_connected() {
    let names = NameProvider::builtin();
    for count in [1, 2, 5, 20, 50] {
        for seed in 0..4 {
            let story = generate_story(&with_locations(count, seed), &names).unwrap();
            assert_eq!(story.locations.len(), count);
            assert!(is_connected(&story.locations), "{count} locations, seed {seed}");
            assert_eq!(minimum_spanning_tree(&story.locations).len(), count.saturating_sub(1));
            for location in &story.locations {
                assert!((0.0..=CANVAS_WIDTH).contains(&location.x), "{location:?}");
                assert!((0.0..=CANVAS_HEIGHT).contains(&location.y), "{location:?}");
            }
        }
    }
}

#[test]
fn a_seed_reproduces_the_same_bytes() {
    let names = NameProvider::builtin();
    for seed in [0, 1, 42, u64::MAX] {
        let config = GeneratorConfig {
            seed: Some(seed),
            chaos: 0.6,
            ..GeneratorConfig::default()
        };
        let first = export_story_json(&generate_story(&config, &names).unwrap()).unwrap();
        let second = export_story_json(&generate_story(&config, &names).unwrap()).unwrap();
        assert_eq!(first, second, "seed {seed}");
    }
}

#[test]
fn every_reference_resolves() {
    let names = NameProvider::builtin();
    let themes = [
        StoryTheme::Fantasy,
        StoryTheme::SciFi,
        StoryTheme::Mystery,
        StoryTheme::Romance,
        StoryTheme::Horror,
    ];
    for (i, theme) in themes.into_iter().enumerate() {
        for chaos in [0.0, 0.5, 1.0] {
            let config = GeneratorConfig {
                seed: Some(i as u64 * 31 + 7),
                theme,
                chaos,
                min_nodes: 10,
                max_nodes: 40,
                ..GeneratorConfig::default()
            };
            let story = generate_story(&config, &names).unwrap();
            let problems = validate_story(&story);
            assert!(problems.is_empty(), "{theme:?}/{chaos}: {problems:?}");
            assert!(verify_story(&story).is_ok());
            for location_id in story.node_locations.values() {
                assert!(story.location(location_id).is_some());
            }
            assert_eq!(story.node_locations.len(), story.nodes.len());
            assert!(story.variables.contains_key(SEED_VARIABLE));
        }
    }
}

#[test]
fn infinite_stories_never_end() {
    let names = NameProvider::builtin();
    for seed in 0..8 {
        let config = GeneratorConfig {
            seed: Some(seed),
            generate_ending: false,
            ..GeneratorConfig::default()
        };
        let story = generate_story(&config, &names).unwrap();
        assert!(
            story
                .nodes
                .values()
                .all(|node| !matches!(node.content, NodeContent::Ending { .. }))
        );
        assert!(story.nodes.values().all(|node| !node.content.next_node_ids().is_empty()));
    }
}
