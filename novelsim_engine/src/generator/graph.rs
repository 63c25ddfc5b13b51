//! Location connectivity.
//!
//! Locations are first joined by a minimum spanning tree over their centres (Prim's
//! algorithm on the complete graph), which makes every location reachable. Then
//! `floor(0.3 * n)` shortcut edges are added, each from a random location to its nearest
//! neighbour it isn't already linked to.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use log::debug;
use novelsim_data::Location;
use rand::{Rng, RngCore};

/// Shortcut edges added per location after the spanning tree.
pub const EXTRA_EDGE_RATIO: f64 = 0.3;

/// Replace every location's connections with a connected road network.
pub fn connect_locations(locations: &mut [Location], rng: &mut dyn RngCore) {
    let n = locations.len();
    for location in locations.iter_mut() {
        location.connections.clear();
    }
    if n < 2 {
        return;
    }

    for (a, b) in minimum_spanning_tree(locations) {
        link(locations, a, b);
    }

    let extra = (n as f64 * EXTRA_EDGE_RATIO).floor() as usize;
    let mut added = 0;
    for _ in 0..extra {
        let from = rng.random_range(0..n);
        if let Some(to) = nearest_unlinked(locations, from) {
            link(locations, from, to);
            added += 1;
        }
    }
    debug!("connected {n} locations with {} tree edges and {added} shortcuts", n - 1);
}

/// Edges of a minimum spanning tree by squared centre distance, as index pairs.
pub fn minimum_spanning_tree(locations: &[Location]) -> Vec<(usize, usize)> {
    let n = locations.len();
    if n < 2 {
        return Vec::new();
    }
    let mut in_tree = vec![false; n];
    // cheapest known link from the tree to each outside vertex
    let mut best: Vec<(f32, usize)> = vec![(f32::INFINITY, 0); n];
    let mut edges = Vec::with_capacity(n - 1);

    in_tree[0] = true;
    for v in 1..n {
        best[v] = (squared_distance(&locations[0], &locations[v]), 0);
    }
    for _ in 1..n {
        let Some(next) = (0..n)
            .filter(|&v| !in_tree[v])
            .min_by(|&a, &b| best[a].0.total_cmp(&best[b].0).then(a.cmp(&b)))
        else {
            break;
        };
        in_tree[next] = true;
        edges.push((best[next].1, next));
        for v in 0..n {
            if !in_tree[v] {
                let d = squared_distance(&locations[next], &locations[v]);
                if d < best[v].0 {
                    best[v] = (d, next);
                }
            }
        }
    }
    edges
}

fn squared_distance(a: &Location, b: &Location) -> f32 {
    a.distance_sq_to(b.x, b.y)
}

fn nearest_unlinked(locations: &[Location], from: usize) -> Option<usize> {
    let origin = &locations[from];
    locations
        .iter()
        .enumerate()
        .filter(|(i, loc)| *i != from && !origin.connections.contains(&loc.id))
        .min_by(|(ia, a), (ib, b)| {
            squared_distance(origin, a)
                .total_cmp(&squared_distance(origin, b))
                .then(ia.cmp(ib))
        })
        .map(|(i, _)| i)
}

fn link(locations: &mut [Location], a: usize, b: usize) {
    let (id_a, id_b) = (locations[a].id.clone(), locations[b].id.clone());
    if !locations[a].connections.contains(&id_b) {
        locations[a].connections.push(id_b);
    }
    if !locations[b].connections.contains(&id_a) {
        locations[b].connections.push(id_a);
    }
}

/// True if every location can reach every other through connections.
pub fn is_connected(locations: &[Location]) -> bool {
    let Some(first) = locations.first() else {
        return true;
    };
    let index: BTreeMap<&str, &Location> = locations.iter().map(|l| (l.id.as_str(), l)).collect();
    let mut seen = BTreeSet::from([first.id.as_str()]);
    let mut queue = VecDeque::from([first]);
    while let Some(location) = queue.pop_front() {
        for next in &location.connections {
            if let Some(neighbour) = index.get(next.as_str())
                && seen.insert(next.as_str())
            {
                queue.push_back(*neighbour);
            }
        }
    }
    seen.len() == index.len()
}

/// The location whose centre is closest to `(x, y)`. Ties go to the earlier location.
pub fn nearest_location(locations: &[Location], x: f32, y: f32) -> Option<&Location> {
    locations
        .iter()
        .min_by(|a, b| a.distance_sq_to(x, y).total_cmp(&b.distance_sq_to(x, y)))
}
