//! Per-connection session: onboarding, the fixed-rate tick loop and teardown.
//!
//! A session moves through `Onboarding -> Active -> Terminated`. Onboarding
//! reads three raw color bytes and a newline-terminated name and only then
//! allocates a world slot. Each active tick writes one frame, blocks for one
//! intent line, applies it and sleeps out the rest of the tick budget. Any
//! read or write failure, an idle timeout or a shutdown signal ends the
//! session, and a slot that was allocated is released exactly once.

use crate::config::ServerConfig;
use crate::world::{SharedWorld, SlotId, WorldError};
use log::{debug, error, info, warn};
use shared::protocol::QUIT_COMMAND;
use shared::{Color, Intent, MAX_INTENT_BYTES, MAX_NAME_CHARS};
use std::fmt;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::time::{sleep, timeout, Instant};

/// Longest name line accepted before the rest is discarded. Names are
/// truncated to `MAX_NAME_CHARS` characters afterwards anyway.
pub const MAX_NAME_LINE_BYTES: usize = MAX_NAME_CHARS * 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Onboarding,
    Active(SlotId),
    Terminated,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEnd {
    /// The peer closed the connection or a read/write failed.
    Disconnected,
    /// The peer sent the quit command.
    Quit,
    /// Nothing arrived within the idle timeout.
    TimedOut,
    Shutdown,
    /// The world refused the join.
    Rejected(WorldError),
    Failed(String),
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::Disconnected => write!(f, "disconnected"),
            SessionEnd::Quit => write!(f, "quit"),
            SessionEnd::TimedOut => write!(f, "timed out"),
            SessionEnd::Shutdown => write!(f, "server shutdown"),
            SessionEnd::Rejected(e) => write!(f, "join rejected: {}", e),
            SessionEnd::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

impl From<io::Error> for SessionEnd {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => SessionEnd::Disconnected,
            _ => SessionEnd::Failed(e.to_string()),
        }
    }
}

/// One newline-terminated line with the terminator removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub bytes: Vec<u8>,
    /// The line was longer than the limit; `bytes` holds only its prefix and
    /// the remainder has been discarded.
    pub overflowed: bool,
}

/// Reads one line of at most `limit` bytes. Longer lines are drained up to
/// their newline so the stream stays aligned on line boundaries.
pub async fn read_bounded_line<R>(reader: &mut R, limit: usize) -> io::Result<Line>
where
    R: AsyncBufRead + Unpin,
{
    let mut bytes = Vec::new();
    let read = (&mut *reader)
        .take(limit as u64 + 1)
        .read_until(b'\n', &mut bytes)
        .await?;

    if bytes.last() == Some(&b'\n') {
        bytes.pop();
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        return Ok(Line {
            bytes,
            overflowed: false,
        });
    }

    if read <= limit {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed mid-line",
        ));
    }

    loop {
        let (consumed, found) = {
            let buf = reader.fill_buf().await?;
            if buf.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed mid-line",
                ));
            }
            match buf.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (buf.len(), false),
            }
        };
        reader.consume(consumed);
        if found {
            break;
        }
    }

    bytes.truncate(limit);
    Ok(Line {
        bytes,
        overflowed: true,
    })
}

/// Resolves once shutdown is requested or the sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Runs one I/O step under the idle timeout, giving up early on shutdown.
async fn guarded<T, F>(
    step: F,
    idle_timeout: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<T, SessionEnd>
where
    F: Future<Output = io::Result<T>>,
{
    tokio::select! {
        result = timeout(idle_timeout, step) => match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(SessionEnd::TimedOut),
        },
        _ = wait_for_shutdown(shutdown) => Err(SessionEnd::Shutdown),
    }
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) -> io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}

pub struct Session<R, W> {
    peer: String,
    world: SharedWorld,
    reader: R,
    writer: W,
    tick: Duration,
    idle_timeout: Duration,
    shutdown: watch::Receiver<bool>,
    state: SessionState,
}

impl<R, W> Session<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        peer: String,
        world: SharedWorld,
        reader: R,
        writer: W,
        config: &ServerConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            peer,
            world,
            reader,
            writer,
            tick: config.tick_duration(),
            idle_timeout: config.idle_timeout,
            shutdown,
            state: SessionState::Onboarding,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drives the session to completion and reports why it ended.
    pub async fn run(mut self) -> SessionEnd {
        let end = match self.onboard().await {
            Ok(id) => {
                self.state = SessionState::Active(id);
                self.play(id).await
            }
            Err(end) => end,
        };
        self.terminate(&end).await;
        end
    }

    async fn onboard(&mut self) -> Result<SlotId, SessionEnd> {
        let mut rgb = [0u8; 3];
        guarded(
            self.reader.read_exact(&mut rgb),
            self.idle_timeout,
            &mut self.shutdown,
        )
        .await?;

        let line = guarded(
            read_bounded_line(&mut self.reader, MAX_NAME_LINE_BYTES),
            self.idle_timeout,
            &mut self.shutdown,
        )
        .await?;
        let name = String::from_utf8_lossy(&line.bytes).into_owned();

        let color = Color::new(rgb[0], rgb[1], rgb[2]);
        let (id, joined_as) = {
            let mut world = self.world.write().await;
            let id = world.add_player(color, &name).map_err(|e| {
                warn!("{}: join rejected: {}", self.peer, e);
                SessionEnd::Rejected(e)
            })?;
            // The world sanitizes the name; log what it actually stored.
            let stored = world.player(id).map(|p| p.name.clone()).unwrap_or_default();
            (id, stored)
        };

        info!("{} joined as '{}' in slot {}", self.peer, joined_as, id);
        Ok(id)
    }

    async fn play(&mut self, id: SlotId) -> SessionEnd {
        loop {
            let started = Instant::now();

            // Clone under the read lock, encode after releasing it.
            let frame = self.world.read().await.snapshot();
            let bytes = match frame.encode() {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!("{}: failed to encode frame: {}", self.peer, e);
                    return SessionEnd::Failed(e.to_string());
                }
            };
            if let Err(end) = guarded(
                write_frame(&mut self.writer, &bytes),
                self.idle_timeout,
                &mut self.shutdown,
            )
            .await
            {
                return end;
            }

            let line = match guarded(
                read_bounded_line(&mut self.reader, MAX_INTENT_BYTES),
                self.idle_timeout,
                &mut self.shutdown,
            )
            .await
            {
                Ok(line) => line,
                Err(end) => return end,
            };

            if line.overflowed {
                warn!(
                    "{}: ignoring intent longer than {} bytes",
                    self.peer, MAX_INTENT_BYTES
                );
            } else {
                let text = String::from_utf8_lossy(&line.bytes);
                if text == QUIT_COMMAND {
                    return SessionEnd::Quit;
                }

                let parsed = Intent::parse(&text);
                if !parsed.unrecognized.is_empty() {
                    warn!(
                        "{}: ignoring unrecognized intent characters {:?}",
                        self.peer, parsed.unrecognized
                    );
                }
                if !parsed.intent.is_idle() {
                    let moved = self.world.write().await.apply_intent(id, &parsed.intent);
                    if let Err(e) = moved {
                        error!("{}: lost its slot: {}", self.peer, e);
                        return SessionEnd::Failed(e.to_string());
                    }
                }
            }

            let elapsed = started.elapsed();
            let remaining = self.tick.saturating_sub(elapsed);
            if remaining.is_zero() {
                debug!("{}: tick overran by {:?}", self.peer, elapsed - self.tick);
                continue;
            }
            tokio::select! {
                _ = sleep(remaining) => {}
                _ = wait_for_shutdown(&mut self.shutdown) => return SessionEnd::Shutdown,
            }
        }
    }

    async fn terminate(&mut self, end: &SessionEnd) {
        if let SessionState::Active(id) = self.state {
            if let Err(e) = self.world.write().await.remove_player(id) {
                warn!("{}: slot {} already released: {}", self.peer, id, e);
            }
        }
        self.state = SessionState::Terminated;

        if let Err(e) = self.writer.shutdown().await {
            debug!("{}: shutdown after {} failed: {}", self.peer, end, e);
        }
        info!("{} left: {}", self.peer, end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use crate::world::World;
    use shared::protocol::{encode_handshake, Frame, FOOD_RECORD_LEN, PLAYER_RECORD_LEN};
    use std::sync::Arc;
    use tokio::io::{duplex, split, BufReader, DuplexStream, ReadHalf, WriteHalf};
    use tokio::task::JoinHandle;

    struct Harness {
        world: SharedWorld,
        client_rx: ReadHalf<DuplexStream>,
        client_tx: WriteHalf<DuplexStream>,
        shutdown: watch::Sender<bool>,
        handle: JoinHandle<SessionEnd>,
    }

    fn start_session(config: ServerConfig) -> Harness {
        let world = World::with_seed(config.world.clone(), 17)
            .unwrap()
            .into_shared();
        let (client, server) = duplex(64 * 1024);
        let (server_rx, server_tx) = split(server);
        let (client_rx, client_tx) = split(client);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let session = Session::new(
            "test-peer".to_string(),
            Arc::clone(&world),
            BufReader::new(server_rx),
            server_tx,
            &config,
            shutdown_rx,
        );
        assert_eq!(session.state(), SessionState::Onboarding);
        let handle = tokio::spawn(session.run());

        Harness {
            world,
            client_rx,
            client_tx,
            shutdown,
            handle,
        }
    }

    fn fast_config() -> ServerConfig {
        ServerConfig {
            tick_rate: 200,
            idle_timeout: Duration::from_secs(5),
            world: WorldConfig::default(),
            ..ServerConfig::default()
        }
    }

    /// Reads one frame off the stream by walking its length fields.
    async fn read_frame(reader: &mut ReadHalf<DuplexStream>) -> Frame {
        let mut bytes = vec![reader.read_u8().await.unwrap()];
        let food_count = reader.read_u8().await.unwrap();
        bytes.push(food_count);
        let mut food = vec![0u8; food_count as usize * FOOD_RECORD_LEN];
        reader.read_exact(&mut food).await.unwrap();
        bytes.extend(food);

        let player_count = reader.read_u8().await.unwrap();
        bytes.push(player_count);
        for _ in 0..player_count {
            let mut record = vec![0u8; PLAYER_RECORD_LEN];
            reader.read_exact(&mut record).await.unwrap();
            let mut name = vec![0u8; record[PLAYER_RECORD_LEN - 1] as usize];
            reader.read_exact(&mut name).await.unwrap();
            bytes.extend(record);
            bytes.extend(name);
        }

        Frame::read_from(&mut bytes.as_slice()).unwrap()
    }

    async fn join(h: &mut Harness, name: &str) -> Frame {
        h.client_tx
            .write_all(&encode_handshake(Color::new(10, 20, 30), name))
            .await
            .unwrap();
        read_frame(&mut h.client_rx).await
    }

    #[tokio::test]
    async fn test_onboarding_then_first_frame() {
        let mut h = start_session(fast_config());
        let frame = join(&mut h, "alice").await;

        assert_eq!(frame.food.len(), 50);
        assert_eq!(frame.players.len(), 1);
        assert_eq!(frame.players[0].name, "alice");
        assert_eq!(frame.players[0].color, Color::new(10, 20, 30));
        assert_eq!(h.world.read().await.player_count(), 1);
    }

    #[tokio::test]
    async fn test_blank_name_joins_as_default() {
        let mut h = start_session(fast_config());
        let frame = join(&mut h, "   ").await;

        assert_eq!(frame.players[0].name, shared::DEFAULT_NAME);
        let world = h.world.read().await;
        let (_, player) = world.players().next().unwrap();
        assert_eq!(player.name, shared::DEFAULT_NAME);
    }

    #[tokio::test]
    async fn test_teardown_survives_closed_peer() {
        let mut h = start_session(fast_config());
        join(&mut h, "gone").await;

        // The peer is already gone when teardown closes the writer.
        drop(h.client_rx);
        h.client_tx.shutdown().await.unwrap();

        let end = h.handle.await.unwrap();
        assert_eq!(end, SessionEnd::Disconnected);
        assert_eq!(h.world.read().await.player_count(), 0);
    }

    #[tokio::test]
    async fn test_intent_moves_player() {
        let mut h = start_session(fast_config());
        let first = join(&mut h, "mover").await;
        let start = first.players[0].position;

        h.client_tx.write_all(b"r\n").await.unwrap();
        let second = read_frame(&mut h.client_rx).await;
        let moved = second.players[0].position;

        let expected = (start.x + shared::BASE_SPEED).min(1440.0 - shared::INITIAL_RADIUS);
        assert!((moved.x - expected).abs() < 1e-3);
        assert_eq!(moved.y, start.y);
    }

    #[tokio::test]
    async fn test_oversized_and_unknown_intents_are_ignored() {
        let mut h = start_session(fast_config());
        let first = join(&mut h, "calm").await;

        h.client_tx.write_all(b"rrrrrrrrrrrrrrrr\n").await.unwrap();
        let second = read_frame(&mut h.client_rx).await;
        assert_eq!(second.players[0].position, first.players[0].position);

        h.client_tx.write_all(b"xyz\n").await.unwrap();
        let third = read_frame(&mut h.client_rx).await;
        assert_eq!(third.players[0].position, first.players[0].position);
        assert!(!h.handle.is_finished());
    }

    #[tokio::test]
    async fn test_disconnect_releases_slot() {
        let mut h = start_session(fast_config());
        join(&mut h, "leaver").await;
        assert_eq!(h.world.read().await.player_count(), 1);

        h.client_tx.shutdown().await.unwrap();
        let end = h.handle.await.unwrap();

        assert_eq!(end, SessionEnd::Disconnected);
        assert_eq!(h.world.read().await.player_count(), 0);
    }

    #[tokio::test]
    async fn test_quit_command_releases_slot() {
        let mut h = start_session(fast_config());
        join(&mut h, "polite").await;

        h.client_tx.write_all(b"q\n").await.unwrap();
        let end = h.handle.await.unwrap();

        assert_eq!(end, SessionEnd::Quit);
        assert_eq!(h.world.read().await.player_count(), 0);
    }

    #[tokio::test]
    async fn test_scripted_client_over_mock_stream() {
        let config = fast_config();
        let world = World::with_seed(config.world.clone(), 3)
            .unwrap()
            .into_shared();
        let reader = tokio_test::io::Builder::new()
            .read(&encode_handshake(Color::new(4, 5, 6), "mock"))
            .read(b"rd\n")
            .read(b"q\n")
            .build();
        let (_shutdown, shutdown_rx) = watch::channel(false);

        let session = Session::new(
            "mock-peer".to_string(),
            Arc::clone(&world),
            BufReader::new(reader),
            tokio::io::sink(),
            &config,
            shutdown_rx,
        );
        let end = session.run().await;

        assert_eq!(end, SessionEnd::Quit);
        assert_eq!(world.read().await.player_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_onboarding_allocates_nothing() {
        let mut h = start_session(fast_config());
        h.client_tx.write_all(&[1, 2]).await.unwrap();
        h.client_tx.shutdown().await.unwrap();

        let end = h.handle.await.unwrap();
        assert_eq!(end, SessionEnd::Disconnected);
        assert_eq!(h.world.read().await.player_count(), 0);
    }

    #[tokio::test]
    async fn test_idle_client_times_out() {
        let config = ServerConfig {
            idle_timeout: Duration::from_millis(50),
            ..fast_config()
        };
        let mut h = start_session(config);
        join(&mut h, "sleepy").await;

        let end = h.handle.await.unwrap();
        assert_eq!(end, SessionEnd::TimedOut);
        assert_eq!(h.world.read().await.player_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_ends_session() {
        let mut h = start_session(fast_config());
        join(&mut h, "bye").await;

        h.shutdown.send(true).unwrap();
        let end = h.handle.await.unwrap();
        assert_eq!(end, SessionEnd::Shutdown);
        assert_eq!(h.world.read().await.player_count(), 0);
    }

    #[tokio::test]
    async fn test_read_bounded_line() {
        let mut input: &[u8] = b"ok\r\ntoolongline\nnext\n";
        let line = read_bounded_line(&mut input, 6).await.unwrap();
        assert_eq!(line.bytes, b"ok".to_vec());
        assert!(!line.overflowed);

        let line = read_bounded_line(&mut input, 6).await.unwrap();
        assert_eq!(line.bytes, b"toolon".to_vec());
        assert!(line.overflowed);

        let line = read_bounded_line(&mut input, 6).await.unwrap();
        assert_eq!(line.bytes, b"next".to_vec());

        let err = read_bounded_line(&mut input, 6).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_read_bounded_line_exact_limit() {
        let mut input: &[u8] = b"lrudlr\n";
        let line = read_bounded_line(&mut input, 6).await.unwrap();
        assert_eq!(line.bytes, b"lrudlr".to_vec());
        assert!(!line.overflowed);
    }

    #[test]
    fn test_io_error_mapping() {
        let eof = io::Error::from(io::ErrorKind::UnexpectedEof);
        assert_eq!(SessionEnd::from(eof), SessionEnd::Disconnected);
        let other = io::Error::new(io::ErrorKind::Other, "boom");
        assert!(matches!(SessionEnd::from(other), SessionEnd::Failed(_)));
    }
}
