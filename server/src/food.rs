//! Background task that lets players eat food.
//!
//! Runs independently of any client's tick: every `interval` it takes the
//! world lock once, scans all food against all players and respawns whatever
//! was eaten.

use crate::world::SharedWorld;
use log::{debug, info};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

/// Runs until `shutdown` flips to `true` or its sender is dropped.
pub async fn run_food_loop(
    world: SharedWorld,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut passes: u64 = 0;

    info!("Food loop started ({:?} per pass)", period);

    loop {
        tokio::select! {
            _ = timer.tick() => {
                let eaten = {
                    let mut world = world.write().await;
                    world.consume_food()
                };
                passes += 1;

                if !eaten.is_empty() {
                    debug!("Pass {}: {} food eaten", passes, eaten.len());
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("Food loop stopped after {} passes", passes);
}
