//! Binary snapshot frames sent from server to client once per tick.
//!
//! All integers and floats are little-endian. Layout of one frame:
//!
//! ```text
//! status        u8
//! food_count    u8
//! food_count x  { x: u16, y: u16, red: u8, green: u8, blue: u8, radius: f32 }
//! player_count  u8
//! player_count x{ x: f32, y: f32, red: u8, green: u8, blue: u8, radius: f32,
//!                 name_len: u8, name: [u8; name_len] (UTF-8) }
//! ```
//!
//! Player names carry a one-byte length prefix so that consecutive player
//! records can be split without scanning for a terminator.
//!
//! The inbound direction is plain text: three raw color bytes followed by a
//! newline-terminated name, then one newline-terminated intent line per tick
//! (see [`crate::Intent::parse`]).

use crate::{Color, Food, Player, Vec2};
use bincode::Options;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;

/// Encoded size of one food record.
pub const FOOD_RECORD_LEN: usize = 11;
/// Encoded size of one player record including the name length prefix but
/// not the name bytes themselves.
pub const PLAYER_RECORD_LEN: usize = 16;

/// Client line that requests a clean disconnect.
pub const QUIT_COMMAND: &str = "q";

#[derive(Debug)]
pub enum ProtocolError {
    TooManyFood(usize),
    TooManyPlayers(usize),
    NameTooLong(usize),
    InvalidName,
    Codec(bincode::Error),
    Io(std::io::Error),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::TooManyFood(n) => write!(f, "{} food items do not fit in a frame", n),
            ProtocolError::TooManyPlayers(n) => write!(f, "{} players do not fit in a frame", n),
            ProtocolError::NameTooLong(n) => write!(f, "player name of {} bytes is too long", n),
            ProtocolError::InvalidName => write!(f, "player name is not valid UTF-8"),
            ProtocolError::Codec(e) => write!(f, "codec error: {}", e),
            ProtocolError::Io(e) => write!(f, "io error: {}", e),
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProtocolError::Codec(e) => Some(e),
            ProtocolError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<bincode::Error> for ProtocolError {
    fn from(e: bincode::Error) -> Self {
        ProtocolError::Codec(e)
    }
}

impl From<std::io::Error> for ProtocolError {
    fn from(e: std::io::Error) -> Self {
        ProtocolError::Io(e)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FoodRecord {
    x: u16,
    y: u16,
    color: Color,
    radius: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct PlayerRecord {
    x: f32,
    y: f32,
    color: Color,
    radius: f32,
}

fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
}

/// Food positions travel as whole pixels.
fn to_wire_coord(value: f32) -> u16 {
    value.round().clamp(0.0, u16::MAX as f32) as u16
}

/// One point-in-time view of the world, as encoded on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub status: u8,
    pub food: Vec<Food>,
    pub players: Vec<Player>,
}

impl Frame {
    /// Serializes the frame. The player count written is always the number of
    /// player records that follow it.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let food_count =
            u8::try_from(self.food.len()).map_err(|_| ProtocolError::TooManyFood(self.food.len()))?;
        let player_count = u8::try_from(self.players.len())
            .map_err(|_| ProtocolError::TooManyPlayers(self.players.len()))?;

        let name_bytes: usize = self.players.iter().map(|p| p.name.len()).sum();
        let mut buf = Vec::with_capacity(
            3 + self.food.len() * FOOD_RECORD_LEN
                + self.players.len() * PLAYER_RECORD_LEN
                + name_bytes,
        );

        buf.push(self.status);
        buf.push(food_count);
        for food in &self.food {
            let record = FoodRecord {
                x: to_wire_coord(food.position.x),
                y: to_wire_coord(food.position.y),
                color: food.color,
                radius: food.radius,
            };
            wire_options().serialize_into(&mut buf, &record)?;
        }

        buf.push(player_count);
        for player in &self.players {
            let record = PlayerRecord {
                x: player.position.x,
                y: player.position.y,
                color: player.color,
                radius: player.radius,
            };
            wire_options().serialize_into(&mut buf, &record)?;

            let name = player.name.as_bytes();
            let name_len =
                u8::try_from(name.len()).map_err(|_| ProtocolError::NameTooLong(name.len()))?;
            buf.push(name_len);
            buf.extend_from_slice(name);
        }

        Ok(buf)
    }

    /// Reads exactly one frame from a byte stream.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Frame, ProtocolError> {
        let status = read_u8(reader)?;

        let food_count = read_u8(reader)?;
        let mut food = Vec::with_capacity(food_count as usize);
        for _ in 0..food_count {
            let record: FoodRecord = wire_options().deserialize_from(&mut *reader)?;
            food.push(Food::new(
                Vec2::new(record.x as f32, record.y as f32),
                record.radius,
                record.color,
            ));
        }

        let player_count = read_u8(reader)?;
        let mut players = Vec::with_capacity(player_count as usize);
        for _ in 0..player_count {
            let record: PlayerRecord = wire_options().deserialize_from(&mut *reader)?;
            let name_len = read_u8(reader)?;
            let mut name = vec![0u8; name_len as usize];
            reader.read_exact(&mut name)?;
            let name = String::from_utf8(name).map_err(|_| ProtocolError::InvalidName)?;
            players.push(Player {
                position: Vec2::new(record.x, record.y),
                radius: record.radius,
                name,
                color: record.color,
            });
        }

        Ok(Frame {
            status,
            food,
            players,
        })
    }
}

fn read_u8<R: Read>(reader: &mut R) -> Result<u8, ProtocolError> {
    let mut byte = [0u8; 1];
    reader.read_exact(&mut byte)?;
    Ok(byte[0])
}

/// Builds the onboarding handshake a client sends after connecting.
pub fn encode_handshake(color: Color, name: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + name.len());
    buf.extend_from_slice(&[color.red, color.green, color.blue]);
    buf.extend_from_slice(name.as_bytes());
    buf.push(b'\n');
    buf
}

/// Builds one intent line from the given keys.
pub fn encode_intent(intent: &crate::Intent) -> Vec<u8> {
    let mut buf = Vec::with_capacity(5);
    for (held, key) in [
        (intent.left, b'l'),
        (intent.right, b'r'),
        (intent.up, b'u'),
        (intent.down, b'd'),
    ] {
        if held {
            buf.push(key);
        }
    }
    buf.push(b'\n');
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Intent, FOOD_RADIUS, INITIAL_RADIUS, STATUS_PLAYING};
    use assert_approx_eq::assert_approx_eq;

    fn sample_frame() -> Frame {
        Frame {
            status: STATUS_PLAYING,
            food: vec![Food::new(
                Vec2::new(300.4, 200.6),
                FOOD_RADIUS,
                Color::new(10, 20, 30),
            )],
            players: vec![
                Player::new(Vec2::new(100.5, 50.25), "ann".into(), Color::new(1, 2, 3)),
                Player::new(Vec2::new(700.0, 400.0), "bo".into(), Color::new(4, 5, 6)),
            ],
        }
    }

    #[test]
    fn test_frame_layout() {
        let bytes = sample_frame().encode().unwrap();

        assert_eq!(bytes[0], STATUS_PLAYING);
        assert_eq!(bytes[1], 1);

        let food = &bytes[2..2 + FOOD_RECORD_LEN];
        assert_eq!(u16::from_le_bytes([food[0], food[1]]), 300);
        assert_eq!(u16::from_le_bytes([food[2], food[3]]), 201);
        assert_eq!(&food[4..7], &[10, 20, 30]);
        assert_eq!(f32::from_le_bytes([food[7], food[8], food[9], food[10]]), FOOD_RADIUS);

        let players = &bytes[2 + FOOD_RECORD_LEN..];
        assert_eq!(players[0], 2);
        let first = &players[1..];
        assert_eq!(f32::from_le_bytes([first[0], first[1], first[2], first[3]]), 100.5);
        assert_eq!(f32::from_le_bytes([first[4], first[5], first[6], first[7]]), 50.25);
        assert_eq!(&first[8..11], &[1, 2, 3]);
        assert_eq!(
            f32::from_le_bytes([first[11], first[12], first[13], first[14]]),
            INITIAL_RADIUS
        );
        assert_eq!(first[15], 3);
        assert_eq!(&first[16..19], b"ann");

        let second = &first[19..];
        assert_eq!(second[15], 2);
        assert_eq!(&second[16..], b"bo");
    }

    #[test]
    fn test_frame_length() {
        let bytes = sample_frame().encode().unwrap();
        let expected = 3 + FOOD_RECORD_LEN + 2 * PLAYER_RECORD_LEN + "ann".len() + "bo".len();
        assert_eq!(bytes.len(), expected);
    }

    #[test]
    fn test_empty_frame() {
        let frame = Frame {
            status: STATUS_PLAYING,
            food: vec![],
            players: vec![],
        };
        assert_eq!(frame.encode().unwrap(), vec![0, 0, 0]);
    }

    #[test]
    fn test_read_from_decodes_players_and_rounds_food() {
        let frame = sample_frame();
        let bytes = frame.encode().unwrap();
        let decoded = Frame::read_from(&mut bytes.as_slice()).unwrap();

        assert_eq!(decoded.players, frame.players);
        assert_eq!(decoded.food.len(), 1);
        assert_approx_eq!(decoded.food[0].position.x, 300.0, 1e-6);
        assert_approx_eq!(decoded.food[0].position.y, 201.0, 1e-6);
        assert_eq!(decoded.food[0].color, Color::new(10, 20, 30));
    }

    #[test]
    fn test_read_consecutive_frames() {
        let mut bytes = sample_frame().encode().unwrap();
        bytes.extend(sample_frame().encode().unwrap());
        let mut reader = bytes.as_slice();
        Frame::read_from(&mut reader).unwrap();
        Frame::read_from(&mut reader).unwrap();
        assert!(reader.is_empty());
    }

    #[test]
    fn test_truncated_frame_is_error() {
        let bytes = sample_frame().encode().unwrap();
        let mut reader = &bytes[..bytes.len() - 1];
        assert!(Frame::read_from(&mut reader).is_err());
    }

    #[test]
    fn test_too_many_players() {
        let player = Player::new(Vec2::new(0.0, 0.0), "x".into(), Color::new(0, 0, 0));
        let frame = Frame {
            status: STATUS_PLAYING,
            food: vec![],
            players: vec![player; 256],
        };
        assert!(matches!(frame.encode(), Err(ProtocolError::TooManyPlayers(256))));
    }

    #[test]
    fn test_name_too_long() {
        let player = Player::new(Vec2::new(0.0, 0.0), "x".repeat(300), Color::new(0, 0, 0));
        let frame = Frame {
            status: STATUS_PLAYING,
            food: vec![],
            players: vec![player],
        };
        assert!(matches!(frame.encode(), Err(ProtocolError::NameTooLong(300))));
    }

    #[test]
    fn test_encode_handshake() {
        assert_eq!(
            encode_handshake(Color::new(255, 0, 7), "zed"),
            vec![255, 0, 7, b'z', b'e', b'd', b'\n']
        );
    }

    #[test]
    fn test_encode_intent() {
        let intent = Intent::parse("dl").intent;
        assert_eq!(encode_intent(&intent), b"ld\n".to_vec());
        assert_eq!(encode_intent(&Intent::default()), b"\n".to_vec());
    }
}
