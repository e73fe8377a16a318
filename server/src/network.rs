//! TCP listener that hands every accepted connection to its own session task

use crate::config::ServerConfig;
use crate::food::run_food_loop;
use crate::session::{Session, SessionEnd};
use crate::world::{SharedWorld, World};
use log::{debug, error, info, warn};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

/// Owns the listener, the shared world and the shutdown signal
pub struct Server {
    listener: TcpListener,
    world: SharedWorld,
    config: ServerConfig,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Server {
    /// Validates the configuration, builds the world and binds the listener.
    /// Any failure here is fatal for the process.
    pub async fn bind(config: ServerConfig) -> Result<Self, BoxError> {
        config.validate()?;
        let world = World::new(config.world.clone())?.into_shared();

        let listener = TcpListener::bind(&config.addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Server {
            listener,
            world,
            config,
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn world(&self) -> SharedWorld {
        Arc::clone(&self.world)
    }

    /// Serves until Ctrl+C.
    pub async fn run(self) -> Result<(), BoxError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received Ctrl+C, shutting down gracefully...");
        })
        .await
    }

    /// Serves until `signal` completes, then stops the food loop and every
    /// session and waits for them to finish.
    pub async fn run_until<F>(self, signal: F) -> Result<(), BoxError>
    where
        F: Future<Output = ()>,
    {
        let food_handle = tokio::spawn(run_food_loop(
            Arc::clone(&self.world),
            self.config.food_interval,
            self.shutdown_rx.clone(),
        ));

        let mut sessions: JoinSet<SessionEnd> = JoinSet::new();
        tokio::pin!(signal);

        info!("Server started successfully");

        loop {
            tokio::select! {
                _ = &mut signal => break,

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.spawn_session(&mut sessions, stream, addr),
                    Err(e) => {
                        // One failed accept must not take down the running sessions.
                        error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },

                Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                    match finished {
                        Ok(end) => debug!("Session finished: {}", end),
                        Err(e) => error!("Session task failed: {}", e),
                    }
                }
            }
        }

        info!("Stopping {} sessions", sessions.len());
        // Cannot fail: `self.shutdown_rx` keeps a receiver alive.
        let _ = self.shutdown_tx.send(true);

        while let Some(finished) = sessions.join_next().await {
            if let Err(e) = finished {
                error!("Session task failed: {}", e);
            }
        }
        if let Err(e) = food_handle.await {
            error!("Food loop task failed: {}", e);
        }

        info!("Server stopped");
        Ok(())
    }

    fn spawn_session(
        &self,
        sessions: &mut JoinSet<SessionEnd>,
        stream: TcpStream,
        addr: SocketAddr,
    ) {
        info!("Accepted connection from {}", addr);
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
        }

        let (read_half, write_half) = stream.into_split();
        let session = Session::new(
            addr.to_string(),
            Arc::clone(&self.world),
            BufReader::new(read_half),
            write_half,
            &self.config,
            self.shutdown_rx.clone(),
        );
        sessions.spawn(session.run());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use shared::protocol::encode_handshake;
    use shared::Color;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;

    fn local_config() -> ServerConfig {
        ServerConfig {
            addr: "127.0.0.1:0".to_string(),
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_bind_reports_local_addr() {
        let server = Server::bind(local_config()).await.unwrap();
        let addr = server.local_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_config() {
        let config = ServerConfig {
            world: WorldConfig {
                width: -1.0,
                ..WorldConfig::default()
            },
            ..local_config()
        };
        assert!(Server::bind(config).await.is_err());
    }

    #[tokio::test]
    async fn test_bind_rejects_zero_durations() {
        let config = ServerConfig {
            food_interval: Duration::ZERO,
            ..local_config()
        };
        assert!(Server::bind(config).await.is_err());

        let config = ServerConfig {
            idle_timeout: Duration::ZERO,
            ..local_config()
        };
        assert!(Server::bind(config).await.is_err());
    }

    #[tokio::test]
    async fn test_bind_fails_on_used_port() {
        let first = Server::bind(local_config()).await.unwrap();
        let config = ServerConfig {
            addr: first.local_addr().unwrap().to_string(),
            ..ServerConfig::default()
        };
        assert!(Server::bind(config).await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_releases_connected_players() {
        let server = Server::bind(local_config()).await.unwrap();
        let addr = server.local_addr().unwrap();
        let world = server.world();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(server.run_until(async move {
            let _ = stop_rx.await;
        }));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(&encode_handshake(Color::new(1, 1, 1), "tcp"))
            .await
            .unwrap();
        // Status byte of the first frame proves the session is active.
        let _status = stream.read_u8().await.unwrap();
        assert_eq!(world.read().await.player_count(), 1);

        stop_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();

        assert_eq!(world.read().await.player_count(), 0);
    }
}
