//! Types, constants and geometry shared by the blob arena server and its clients.
//!
//! World coordinates are `f32` with the origin in the top-left corner. Every
//! entity is a circle described by its center and radius.

use serde::{Deserialize, Serialize};

pub mod protocol;

pub const WORLD_WIDTH: f32 = 1440.0;
pub const WORLD_HEIGHT: f32 = 900.0;
pub const INITIAL_RADIUS: f32 = 25.0;
pub const FOOD_RADIUS: f32 = 7.0;
pub const FOOD_COUNT: usize = 50;
pub const TICK_RATE: u32 = 60;

/// Per-tick speed of a blob at `INITIAL_RADIUS`.
pub const BASE_SPEED: f32 = 4.0;
/// Speed floor so that large blobs can still cross the map.
pub const MIN_SPEED: f32 = 1.0;

pub const MAX_NAME_CHARS: usize = 15;
pub const DEFAULT_NAME: &str = "blob";
pub const MAX_INTENT_BYTES: usize = 6;
pub const MAX_PLAYERS: usize = u8::MAX as usize;

pub const STATUS_PLAYING: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Color {
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Vec2) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub position: Vec2,
    pub radius: f32,
    pub name: String,
    pub color: Color,
}

impl Player {
    pub fn new(position: Vec2, name: String, color: Color) -> Self {
        Self {
            position,
            radius: INITIAL_RADIUS,
            name,
            color,
        }
    }

    /// Whether `food` lies entirely within this player's circle.
    pub fn can_eat(&self, food: &Food) -> bool {
        self.position.distance(food.position) + food.radius <= self.radius
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Food {
    pub position: Vec2,
    pub radius: f32,
    pub color: Color,
}

impl Food {
    pub fn new(position: Vec2, radius: f32, color: Color) -> Self {
        Self {
            position,
            radius,
            color,
        }
    }
}

/// Circles that touch are considered overlapping.
pub fn circles_overlap(a: Vec2, ra: f32, b: Vec2, rb: f32) -> bool {
    a.distance(b) <= ra + rb
}

pub fn circle_within_bounds(center: Vec2, radius: f32, width: f32, height: f32) -> bool {
    center.x - radius >= 0.0
        && center.x + radius <= width
        && center.y - radius >= 0.0
        && center.y + radius <= height
}

/// Radius of a circle whose area equals the sum of both areas.
pub fn combined_radius(r1: f32, r2: f32) -> f32 {
    (r1 * r1 + r2 * r2).sqrt()
}

/// Per-tick movement speed for a blob of the given radius.
pub fn speed_for_radius(radius: f32) -> f32 {
    if radius <= INITIAL_RADIUS {
        return BASE_SPEED;
    }
    (BASE_SPEED * (INITIAL_RADIUS / radius).sqrt()).clamp(MIN_SPEED, BASE_SPEED)
}

fn clamp_axis(value: f32, radius: f32, extent: f32) -> f32 {
    if radius * 2.0 >= extent {
        extent / 2.0
    } else {
        value.clamp(radius, extent - radius)
    }
}

/// Pulls a circle back inside `[0,width]x[0,height]`.
///
/// On an axis where the diameter is at least the extent no position is in
/// bounds, so the circle is centered on that axis and overhangs both walls.
pub fn clamp_circle(center: Vec2, radius: f32, width: f32, height: f32) -> Vec2 {
    Vec2 {
        x: clamp_axis(center.x, radius, width),
        y: clamp_axis(center.y, radius, height),
    }
}

pub fn normalize_vector(x: f32, y: f32) -> (f32, f32) {
    let magnitude = (x * x + y * y).sqrt();
    if magnitude > 0.0 {
        (x / magnitude, y / magnitude)
    } else {
        (0.0, 0.0)
    }
}

/// Movement keys held by a client during one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Intent {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
}

/// Result of parsing one intent line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedIntent {
    pub intent: Intent,
    /// Characters outside `{l, r, u, d}`, in the order they appeared.
    pub unrecognized: Vec<char>,
}

impl Intent {
    /// Parses a command line such as `"lu"`. Order and repetition are irrelevant.
    pub fn parse(line: &str) -> ParsedIntent {
        let mut parsed = ParsedIntent::default();
        for c in line.chars() {
            match c {
                'l' => parsed.intent.left = true,
                'r' => parsed.intent.right = true,
                'u' => parsed.intent.up = true,
                'd' => parsed.intent.down = true,
                other => parsed.unrecognized.push(other),
            }
        }
        parsed
    }

    pub fn is_idle(&self) -> bool {
        self.direction() == (0.0, 0.0)
    }

    /// Unit direction vector; opposing keys cancel out.
    pub fn direction(&self) -> (f32, f32) {
        let mut x = 0.0;
        let mut y = 0.0;
        if self.left {
            x -= 1.0;
        }
        if self.right {
            x += 1.0;
        }
        if self.up {
            y -= 1.0;
        }
        if self.down {
            y += 1.0;
        }
        normalize_vector(x, y)
    }

    /// Position delta for one tick at the speed of a blob with `radius`.
    pub fn delta(&self, radius: f32) -> (f32, f32) {
        let (x, y) = self.direction();
        let speed = speed_for_radius(radius);
        (x * speed, y * speed)
    }
}

/// Strips line terminators, truncates to `MAX_NAME_CHARS` and substitutes
/// `DEFAULT_NAME` for blank names.
pub fn sanitize_name(raw: &str) -> String {
    let trimmed = raw.trim_end_matches(&['\r', '\n'][..]);
    let name: String = trimmed.chars().take(MAX_NAME_CHARS).collect();
    if name.trim().is_empty() {
        DEFAULT_NAME.to_string()
    } else {
        name
    }
}
