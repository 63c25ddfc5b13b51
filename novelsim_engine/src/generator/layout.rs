//! Location placement on the world canvas.
//!
//! The canvas is split into a grid whose shape follows the canvas aspect ratio. Every
//! location gets its own cell (cells are handed out in shuffled order), sits near the
//! centre of that cell and never spills out of it.

use novelsim_data::Location;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};

pub const CANVAS_WIDTH: f32 = 1000.0;
pub const CANVAS_HEIGHT: f32 = 1750.0;
pub const MIN_RADIUS: f32 = 80.0;
pub const MAX_RADIUS: f32 = 160.0;
/// Share of each cell dimension kept clear around a location.
const CELL_PADDING: f32 = 0.1;

/// Grid used to place `count` locations: `(rows, cols)` with `rows * cols >= count`.
pub fn grid_dims(count: usize) -> (usize, usize) {
    if count == 0 {
        return (0, 0);
    }
    let aspect = f64::from(CANVAS_HEIGHT / CANVAS_WIDTH);
    let rows = ((count as f64 * aspect).sqrt().ceil() as usize).max(1);
    let cols = count.div_ceil(rows);
    (rows, cols)
}

/// Assign positions and radii to every location.
pub fn place_locations(locations: &mut [Location], rng: &mut dyn RngCore) {
    let (rows, cols) = grid_dims(locations.len());
    if rows == 0 {
        return;
    }
    let cell_w = CANVAS_WIDTH / cols as f32;
    let cell_h = CANVAS_HEIGHT / rows as f32;

    let mut cells: Vec<usize> = (0..rows * cols).collect();
    cells.shuffle(rng);

    for (location, cell) in locations.iter_mut().zip(cells) {
        let (row, col) = (cell / cols, cell % cols);
        let center_x = (col as f32 + 0.5) * cell_w;
        let center_y = (row as f32 + 0.5) * cell_h;

        let cap = (cell_w.min(cell_h) / 2.0).min(MAX_RADIUS);
        let radius = if cap > MIN_RADIUS {
            rng.random_range(MIN_RADIUS..=cap)
        } else {
            cap
        };

        let span_x = (cell_w / 2.0 - radius - cell_w * CELL_PADDING).max(0.0);
        let span_y = (cell_h / 2.0 - radius - cell_h * CELL_PADDING).max(0.0);
        location.x = center_x + jitter(span_x, rng);
        location.y = center_y + jitter(span_y, rng);
        location.radius = radius;
    }
}

fn jitter(span: f32, rng: &mut dyn RngCore) -> f32 {
    if span > 0.0 { rng.random_range(-span..=span) } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn locations(n: usize) -> Vec<Location> {
        (0..n)
            .map(|i| Location {
                id: format!("loc_{i}"),
                ..Location::default()
            })
            .collect()
    }

    #[test]
    fn grid_has_room_for_everyone() {
        for n in [1, 2, 3, 5, 7, 20, 50, 101] {
            let (rows, cols) = grid_dims(n);
            assert!(rows * cols >= n, "{n} locations in {rows}x{cols}");
            assert!(rows >= cols, "grid should be taller than wide for {n}");
        }
        assert_eq!(grid_dims(0), (0, 0));
    }

    #[test]
    fn locations_stay_on_canvas_and_apart() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut locs = locations(20);
        place_locations(&mut locs, &mut rng);
        for loc in &locs {
            assert!(loc.radius > 0.0 && loc.radius <= MAX_RADIUS);
            assert!(loc.x - loc.radius >= 0.0 && loc.x + loc.radius <= CANVAS_WIDTH);
            assert!(loc.y - loc.radius >= 0.0 && loc.y + loc.radius <= CANVAS_HEIGHT);
        }
        for (i, a) in locs.iter().enumerate() {
            for b in &locs[i + 1..] {
                let gap = a.distance_sq_to(b.x, b.y).sqrt();
                assert!(gap >= a.radius + b.radius - 0.01, "{} overlaps {}", a.id, b.id);
            }
        }
    }

    #[test]
    fn single_location_gets_a_full_radius_range() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut locs = locations(1);
        place_locations(&mut locs, &mut rng);
        assert!((MIN_RADIUS..=MAX_RADIUS).contains(&locs[0].radius));
    }
}
