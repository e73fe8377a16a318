//! Authoritative world state: player slots and food.
//!
//! The world is owned by a single [`World`] value shared between sessions and
//! the food loop as [`SharedWorld`]. Every read that feeds a frame and every
//! mutation goes through the one `RwLock`, so a [`Frame`] produced by
//! [`World::snapshot`] always describes a single instant.
//!
//! Players live in index-addressed slots. An empty slot is `None`; each slot
//! carries a generation that is bumped on removal so that a [`SlotId`] held by
//! a departed session can never touch the player that later reuses the slot.

use crate::config::{ConfigError, WorldConfig, INITIAL_SLOT_CAPACITY};
use crate::spawn::{find_position, Obstacle, SpawnError};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::protocol::Frame;
use shared::{
    clamp_circle, combined_radius, sanitize_name, Color, Food, Intent, Player, Vec2, MAX_PLAYERS,
    STATUS_PLAYING,
};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

pub type SharedWorld = Arc<RwLock<World>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId {
    pub index: usize,
    pub generation: u32,
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorldError {
    Full,
    StaleSlot(SlotId),
    Spawn(SpawnError),
}

impl fmt::Display for WorldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorldError::Full => write!(f, "world already holds {} players", MAX_PLAYERS),
            WorldError::StaleSlot(id) => write!(f, "slot {} is not occupied", id),
            WorldError::Spawn(e) => write!(f, "spawn failed: {}", e),
        }
    }
}

impl std::error::Error for WorldError {}

impl From<SpawnError> for WorldError {
    fn from(e: SpawnError) -> Self {
        WorldError::Spawn(e)
    }
}

#[derive(Debug, Clone, Default)]
struct Slot {
    generation: u32,
    player: Option<Player>,
}

/// One food item eaten during a [`World::consume_food`] pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Consumption {
    pub player: SlotId,
    pub food_index: usize,
    pub old_radius: f32,
    pub new_radius: f32,
}

pub struct World {
    config: WorldConfig,
    status: u8,
    slots: Vec<Slot>,
    food: Vec<Food>,
    player_count: usize,
    rng: StdRng,
}

impl World {
    pub fn new(config: WorldConfig) -> Result<Self, ConfigError> {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic world for tests and benchmarks.
    pub fn with_seed(config: WorldConfig, seed: u64) -> Result<Self, ConfigError> {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: WorldConfig, rng: StdRng) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut world = World {
            slots: vec![Slot::default(); INITIAL_SLOT_CAPACITY],
            food: Vec::with_capacity(config.food_count),
            status: STATUS_PLAYING,
            player_count: 0,
            config,
            rng,
        };
        for _ in 0..world.config.food_count {
            let food = world.spawn_food();
            world.food.push(food);
        }
        Ok(world)
    }

    pub fn into_shared(self) -> SharedWorld {
        Arc::new(RwLock::new(self))
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn status(&self) -> u8 {
        self.status
    }

    pub fn player_count(&self) -> usize {
        self.player_count
    }

    pub fn food_count(&self) -> usize {
        self.food.len()
    }

    pub fn food(&self) -> &[Food] {
        &self.food
    }

    pub fn slot_capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn player(&self, id: SlotId) -> Option<&Player> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.player.as_ref())
    }

    fn player_mut(&mut self, id: SlotId) -> Result<&mut Player, WorldError> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.player.as_mut())
            .ok_or(WorldError::StaleSlot(id))
    }

    /// Live players in slot order.
    pub fn players(&self) -> impl Iterator<Item = (SlotId, &Player)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.player.as_ref().map(|player| {
                (
                    SlotId {
                        index,
                        generation: slot.generation,
                    },
                    player,
                )
            })
        })
    }

    /// Places a new player clear of everyone else and stores it in the first
    /// free slot.
    pub fn add_player(&mut self, color: Color, name: &str) -> Result<SlotId, WorldError> {
        if self.player_count >= MAX_PLAYERS {
            return Err(WorldError::Full);
        }

        let radius = self.config.initial_radius;
        let obstacles: Vec<Obstacle> = self
            .players()
            .map(|(_, p)| Obstacle {
                center: p.position,
                radius: p.radius,
            })
            .collect();
        let placement = find_position(
            &mut self.rng,
            self.config.width,
            self.config.height,
            radius,
            &obstacles,
            self.config.max_spawn_attempts,
        )?;
        if !placement.exact {
            warn!(
                "No free spawn point after {} attempts, placing at ({:.1}, {:.1}) with overlap",
                placement.attempts, placement.center.x, placement.center.y
            );
        }

        let mut player = Player::new(placement.center, sanitize_name(name), color);
        player.radius = radius;

        let index = match self.slots.iter().position(|slot| slot.player.is_none()) {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                self.slots.len() - 1
            }
        };

        info!(
            "Added player '{}' in slot {} at ({:.1}, {:.1})",
            player.name, index, player.position.x, player.position.y
        );
        let slot = &mut self.slots[index];
        slot.player = Some(player);
        self.player_count += 1;

        Ok(SlotId {
            index,
            generation: slot.generation,
        })
    }

    /// Empties the slot and invalidates every outstanding id for it.
    pub fn remove_player(&mut self, id: SlotId) -> Result<Player, WorldError> {
        let slot = self
            .slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .ok_or(WorldError::StaleSlot(id))?;
        let player = slot.player.take().ok_or(WorldError::StaleSlot(id))?;
        slot.generation = slot.generation.wrapping_add(1);
        self.player_count -= 1;

        info!("Removed player '{}' from slot {}", player.name, id.index);
        Ok(player)
    }

    /// Applies a position delta, then clamps the circle into the world.
    pub fn move_player(&mut self, id: SlotId, dx: f32, dy: f32) -> Result<Vec2, WorldError> {
        let (width, height) = (self.config.width, self.config.height);
        let player = self.player_mut(id)?;
        let moved = Vec2::new(player.position.x + dx, player.position.y + dy);
        player.position = clamp_circle(moved, player.radius, width, height);
        Ok(player.position)
    }

    /// Moves the player one tick in the direction of `intent`, at the speed
    /// its current radius allows.
    pub fn apply_intent(&mut self, id: SlotId, intent: &Intent) -> Result<Vec2, WorldError> {
        let radius = self.player_mut(id)?.radius;
        let (dx, dy) = intent.delta(radius);
        self.move_player(id, dx, dy)
    }

    /// Area-additive growth: `new² = old² + eaten²`.
    pub fn grow_player(&mut self, id: SlotId, eaten_radius: f32) -> Result<f32, WorldError> {
        let (width, height) = (self.config.width, self.config.height);
        let player = self.player_mut(id)?;
        player.radius = combined_radius(player.radius, eaten_radius);
        player.position = clamp_circle(player.position, player.radius, width, height);
        Ok(player.radius)
    }

    /// One scan of every food item against every player. Eaten food is
    /// replaced in its slot and the eater grows; the first eater in slot
    /// order wins.
    pub fn consume_food(&mut self) -> Vec<Consumption> {
        let mut events = Vec::new();

        for food_index in 0..self.food.len() {
            let eater = self.players().find_map(|(id, player)| {
                player
                    .can_eat(&self.food[food_index])
                    .then_some((id, player.radius))
            });
            let Some((id, old_radius)) = eater else {
                continue;
            };

            let eaten_radius = self.food[food_index].radius;
            self.food[food_index] = self.spawn_food();

            if let Ok(new_radius) = self.grow_player(id, eaten_radius) {
                debug!(
                    "Slot {} ate food {}: radius {:.2} -> {:.2}",
                    id.index, food_index, old_radius, new_radius
                );
                events.push(Consumption {
                    player: id,
                    food_index,
                    old_radius,
                    new_radius,
                });
            }
        }

        events
    }

    /// Copies everything a frame needs. Callers hold the lock, so the player
    /// count and the player records always agree.
    pub fn snapshot(&self) -> Frame {
        Frame {
            status: self.status,
            food: self.food.clone(),
            players: self.players().map(|(_, p)| p.clone()).collect(),
        }
    }

    #[cfg(test)]
    pub(crate) fn set_food_position(&mut self, index: usize, position: Vec2) {
        self.food[index].position = position;
    }

    fn random_color(&mut self) -> Color {
        Color::new(self.rng.gen(), self.rng.gen(), self.rng.gen())
    }

    /// Food only needs to stay inside the walls; overlapping players is fine.
    fn spawn_food(&mut self) -> Food {
        let radius = self.config.food_radius;
        let center = match find_position(
            &mut self.rng,
            self.config.width,
            self.config.height,
            radius,
            &[],
            self.config.max_spawn_attempts,
        ) {
            Ok(placement) => placement.center,
            Err(e) => {
                warn!("Food placement failed ({}), using world center", e);
                Vec2::new(self.config.width / 2.0, self.config.height / 2.0)
            }
        };
        let color = self.random_color();
        Food::new(center, radius, color)
    }
}
