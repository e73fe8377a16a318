//! Headless bot that joins the arena and wanders around, printing what it sees.

use clap::Parser;
use log::{info, warn};
use rand::Rng;
use shared::protocol::{encode_handshake, encode_intent, Frame, QUIT_COMMAND};
use shared::{Color, Intent};
use std::io::{BufReader, Write};
use std::net::TcpStream;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Name shown on the bot's blob
    #[arg(short, long, default_value = "bot")]
    name: String,

    /// Number of ticks to play before quitting
    #[arg(short, long, default_value = "600")]
    ticks: u32,

    /// Ticks to keep the same direction before picking a new one
    #[arg(short, long, default_value = "30")]
    wander: u32,
}

fn random_intent<R: Rng>(rng: &mut R) -> Intent {
    Intent {
        left: rng.gen_bool(0.5),
        right: rng.gen_bool(0.5),
        up: rng.gen_bool(0.5),
        down: rng.gen_bool(0.5),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let mut rng = rand::thread_rng();

    let stream = TcpStream::connect(&args.server)?;
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    stream.set_nodelay(true)?;
    info!("Connected to {}", args.server);

    let color = Color::new(rng.gen(), rng.gen(), rng.gen());
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);
    writer.write_all(&encode_handshake(color, &args.name))?;

    let mut intent = random_intent(&mut rng);
    for tick in 0..args.ticks {
        let frame = Frame::read_from(&mut reader)?;

        if tick % 60 == 0 {
            match frame.players.iter().find(|p| p.name == args.name) {
                Some(me) => println!(
                    "tick {:>5}: {} players, me at ({:.1}, {:.1}) radius {:.2}",
                    tick,
                    frame.players.len(),
                    me.position.x,
                    me.position.y,
                    me.radius
                ),
                None => warn!("tick {}: own blob missing from frame", tick),
            }
        }

        if tick % args.wander.max(1) == 0 {
            intent = random_intent(&mut rng);
        }
        writer.write_all(&encode_intent(&intent))?;
    }

    // The server answers the last intent with one more frame before it reads `q`.
    Frame::read_from(&mut reader)?;
    writer.write_all(format!("{}\n", QUIT_COMMAND).as_bytes())?;
    info!("Quit after {} ticks", args.ticks);

    Ok(())
}
