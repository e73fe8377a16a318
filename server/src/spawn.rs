//! Rejection-sampling spawn placement.
//!
//! Candidates are drawn uniformly over the whole world and rejected when the
//! circle would cross a wall or touch an obstacle. After `max_attempts`
//! rejections the candidate with the most clearance is used instead, so a
//! crowded world degrades to a slightly overlapping spawn rather than an
//! endless loop.

use rand::Rng;
use shared::{circle_within_bounds, Vec2};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpawnError {
    /// The circle is larger than the world in at least one axis.
    DoesNotFit { radius: f32 },
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::DoesNotFit { radius } => {
                write!(f, "a circle of radius {} does not fit in the world", radius)
            }
        }
    }
}

impl std::error::Error for SpawnError {}

/// A circle that new spawns must keep clear of.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obstacle {
    pub center: Vec2,
    pub radius: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub center: Vec2,
    /// False when the attempt budget ran out and `center` is a best effort.
    pub exact: bool,
    pub attempts: usize,
}

/// Distance between the candidate's edge and the nearest obstacle's edge.
/// Negative values mean overlap.
fn clearance(center: Vec2, radius: f32, obstacles: &[Obstacle]) -> f32 {
    obstacles
        .iter()
        .map(|o| center.distance(o.center) - (radius + o.radius))
        .fold(f32::INFINITY, f32::min)
}

pub fn find_position<R: Rng + ?Sized>(
    rng: &mut R,
    width: f32,
    height: f32,
    radius: f32,
    obstacles: &[Obstacle],
    max_attempts: usize,
) -> Result<Placement, SpawnError> {
    if radius * 2.0 > width || radius * 2.0 > height {
        return Err(SpawnError::DoesNotFit { radius });
    }

    let mut best: Option<(Vec2, f32)> = None;

    for attempt in 1..=max_attempts.max(1) {
        let candidate = Vec2::new(rng.gen_range(0.0..=width), rng.gen_range(0.0..=height));
        if !circle_within_bounds(candidate, radius, width, height) {
            continue;
        }

        // Touching counts as overlap, so a clearance of exactly zero is rejected.
        let clear = clearance(candidate, radius, obstacles);
        if clear > 0.0 {
            return Ok(Placement {
                center: candidate,
                exact: true,
                attempts: attempt,
            });
        }

        if best.map_or(true, |(_, c)| clear > c) {
            best = Some((candidate, clear));
        }
    }

    // Every in-bounds sample collided; the least-overlapping one wins. If
    // no sample even landed inside the walls, fall back to the center.
    let center = best
        .map(|(c, _)| c)
        .unwrap_or_else(|| Vec2::new(width / 2.0, height / 2.0));
    Ok(Placement {
        center,
        exact: false,
        attempts: max_attempts.max(1),
    })
}
