use clap::Parser;
use log::{error, info};
use server::config::{ServerConfig, WorldConfig, DEFAULT_ADDR, MAX_SPAWN_ATTEMPTS};
use server::network::Server;
use shared::{FOOD_COUNT, FOOD_RADIUS, INITIAL_RADIUS, TICK_RATE, WORLD_HEIGHT, WORLD_WIDTH};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on (host:port)
    #[arg(short, long, default_value = DEFAULT_ADDR)]
    addr: String,

    /// Frames sent to each client per second
    #[arg(short, long, default_value_t = TICK_RATE)]
    tick_rate: u32,

    /// Number of food items kept in the world
    #[arg(short, long, default_value_t = FOOD_COUNT)]
    food_count: usize,

    /// World width
    #[arg(short = 'W', long, default_value_t = WORLD_WIDTH)]
    width: f32,

    /// World height (no short flag to avoid conflict with --help)
    #[arg(long, default_value_t = WORLD_HEIGHT)]
    height: f32,

    /// Seconds of client silence before the connection is dropped
    #[arg(short, long, default_value = "30")]
    idle_timeout: u64,

    /// Milliseconds between two food-consumption passes
    #[arg(long, default_value = "16")]
    food_interval_ms: u64,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            addr: self.addr,
            tick_rate: self.tick_rate,
            food_interval: Duration::from_millis(self.food_interval_ms),
            idle_timeout: Duration::from_secs(self.idle_timeout),
            world: WorldConfig {
                width: self.width,
                height: self.height,
                food_count: self.food_count,
                food_radius: FOOD_RADIUS,
                initial_radius: INITIAL_RADIUS,
                max_spawn_attempts: MAX_SPAWN_ATTEMPTS,
            },
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = Args::parse().into_config();
    info!(
        "Starting server on {} ({} Hz, {} food, {}x{} world)",
        config.addr, config.tick_rate, config.world.food_count, config.world.width, config.world.height
    );

    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start server: {}", e);
            eprintln!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run().await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
