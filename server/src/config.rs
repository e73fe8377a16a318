//! Runtime configuration for the arena server.

use shared::{FOOD_COUNT, FOOD_RADIUS, INITIAL_RADIUS, TICK_RATE, WORLD_HEIGHT, WORLD_WIDTH};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_ADDR: &str = "localhost:8080";

/// Rejection-sampling attempts before spawn placement falls back.
pub const MAX_SPAWN_ATTEMPTS: usize = 1000;

/// Player slots allocated up front; the collection grows past this on demand.
pub const INITIAL_SLOT_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    ZeroTickRate,
    ZeroFoodInterval,
    ZeroIdleTimeout,
    InvalidDimensions { width: f32, height: f32 },
    /// Food coordinates travel as `u16`, so neither axis may exceed it.
    WorldTooLarge { width: f32, height: f32 },
    TooMuchFood(usize),
    InvalidRadius(f32),
    RadiusDoesNotFit(f32),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroTickRate => write!(f, "tick rate must be at least 1"),
            ConfigError::ZeroFoodInterval => write!(f, "food interval must be non-zero"),
            ConfigError::ZeroIdleTimeout => write!(f, "idle timeout must be non-zero"),
            ConfigError::InvalidDimensions { width, height } => {
                write!(f, "world dimensions {}x{} must be positive", width, height)
            }
            ConfigError::WorldTooLarge { width, height } => write!(
                f,
                "world dimensions {}x{} exceed {} on the wire",
                width,
                height,
                u16::MAX
            ),
            ConfigError::TooMuchFood(n) => write!(f, "food count {} exceeds 255", n),
            ConfigError::InvalidRadius(r) => write!(f, "radius {} must be positive", r),
            ConfigError::RadiusDoesNotFit(r) => {
                write!(f, "radius {} does not fit inside the world", r)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq)]
pub struct WorldConfig {
    pub width: f32,
    pub height: f32,
    pub food_count: usize,
    pub food_radius: f32,
    pub initial_radius: f32,
    pub max_spawn_attempts: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: WORLD_WIDTH,
            height: WORLD_HEIGHT,
            food_count: FOOD_COUNT,
            food_radius: FOOD_RADIUS,
            initial_radius: INITIAL_RADIUS,
            max_spawn_attempts: MAX_SPAWN_ATTEMPTS,
        }
    }
}

impl WorldConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.width > 0.0 && self.height > 0.0) {
            return Err(ConfigError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        if self.width > u16::MAX as f32 || self.height > u16::MAX as f32 {
            return Err(ConfigError::WorldTooLarge {
                width: self.width,
                height: self.height,
            });
        }
        if self.food_count > u8::MAX as usize {
            return Err(ConfigError::TooMuchFood(self.food_count));
        }
        for radius in [self.food_radius, self.initial_radius] {
            if !(radius > 0.0) {
                return Err(ConfigError::InvalidRadius(radius));
            }
            if radius * 2.0 > self.width.min(self.height) {
                return Err(ConfigError::RadiusDoesNotFit(radius));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: String,
    pub tick_rate: u32,
    /// Pause between two passes of the food loop.
    pub food_interval: Duration,
    /// A client that sends nothing for this long is disconnected.
    pub idle_timeout: Duration,
    pub world: WorldConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            tick_rate: TICK_RATE,
            food_interval: Duration::from_millis(16),
            idle_timeout: Duration::from_secs(30),
            world: WorldConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::ZeroTickRate);
        }
        if self.food_interval.is_zero() {
            return Err(ConfigError::ZeroFoodInterval);
        }
        if self.idle_timeout.is_zero() {
            return Err(ConfigError::ZeroIdleTimeout);
        }
        self.world.validate()
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }
}
