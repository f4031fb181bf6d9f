//! UDP server loop.
//!
//! All simulation state lives in the main loop; spawned tasks only move
//! packets. The receiver task decodes datagrams into [`ServerMessage`]s, the
//! sender task drains [`GameMessage`]s onto the socket, and a timeout
//! checker sweeps silent sessions. The main loop `select!`s over inbound
//! messages and two timers: the update interval drives the simulation, the
//! broadcast interval ships state out.
//!
//! The `reliable` flag on outbound messages marks which packets a reliable
//! transport must not drop (static resyncs, game events). This transport is
//! plain UDP, so the flag is carried to the send boundary and best effort
//! applies either way.

use crate::client_manager::{SessionManager, SessionState};
use crate::config::GameConfig;
use crate::controller::Controller;
use log::{debug, error, info, warn};
use shared::{decode, encode, ClientOptions, ClientStatus, Packet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Consecutive failed send cycles before the sender task gives the socket
/// up for dead and tells the main loop to exit.
const MAX_SEND_FAILURES: u32 = 8;

/// Messages sent from network tasks to the main server loop.
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    /// A datagram that did not decode; the peer is not speaking our
    /// protocol and gets dropped.
    MalformedPacket {
        addr: SocketAddr,
    },
    SessionTimeout {
        addr: SocketAddr,
        player_id: u32,
    },
    /// The socket stopped accepting sends; the server cannot continue.
    TransportError {
        message: String,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Messages sent from the main loop to the sender task.
#[derive(Debug)]
pub enum GameMessage {
    Send {
        packet: Packet,
        addr: SocketAddr,
        reliable: bool,
    },
    Broadcast {
        packet: Packet,
        reliable: bool,
    },
}

/// Main server coordinating networking and the game simulation.
pub struct Server {
    socket: Arc<UdpSocket>,
    sessions: Arc<RwLock<SessionManager>>,
    controller: Controller,
    /// Server clock epoch; all wire times are milliseconds since this.
    clock: Instant,
    update_period: Duration,
    broadcast_period: Duration,
    timeout: Duration,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(addr: &str, config: GameConfig) -> Result<Self, BoxError> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        let update_period = Duration::from_secs_f64(1.0 / config.server.update_rate as f64);
        let broadcast_period = Duration::from_secs_f64(1.0 / config.server.broadcast_rate as f64);
        let timeout = Duration::from_secs(config.server.connection_timeout);
        let max_sessions = config.server.max_sessions;

        Ok(Server {
            socket,
            sessions: Arc::new(RwLock::new(SessionManager::new(max_sessions))),
            controller: Controller::new(config),
            clock: Instant::now(),
            update_period,
            broadcast_period,
            timeout,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    /// The actually bound address, useful when binding to port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.socket.local_addr()
    }

    fn server_time(&self) -> i64 {
        self.clock.elapsed().as_millis() as i64
    }

    /// Spawns the task that listens for incoming datagrams.
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        let message = match decode(&buffer[0..len]) {
                            Ok(packet) => ServerMessage::PacketReceived { packet, addr },
                            Err(_) => ServerMessage::MalformedPacket { addr },
                        };
                        if let Err(e) = server_tx.send(message) {
                            error!("Failed to send packet to main loop: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns the task that drains the outgoing packet queue. Isolated send
    /// failures are logged and tolerated; once the socket fails every send
    /// for [`MAX_SEND_FAILURES`] messages in a row, the task reports a
    /// transport error to the main loop and exits.
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let sessions = Arc::clone(&self.sessions);
        let server_tx = self.server_tx.clone();
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            let mut failures: u32 = 0;
            while let Some(message) = game_rx.recv().await {
                let mut failed = false;
                match message {
                    GameMessage::Send { packet, addr, .. } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                            failed = true;
                        }
                    }
                    GameMessage::Broadcast { packet, .. } => {
                        let addrs = {
                            let sessions_guard = sessions.read().await;
                            sessions_guard.addrs()
                        };
                        for addr in addrs {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to {}: {}", addr, e);
                                failed = true;
                            }
                        }
                    }
                }
                if failed {
                    failures += 1;
                    if failures >= MAX_SEND_FAILURES {
                        let _ = server_tx.send(ServerMessage::TransportError {
                            message: format!("{failures} consecutive send failures"),
                        });
                        break;
                    }
                } else {
                    failures = 0;
                }
            }
        });
    }

    /// Spawns the task that sweeps out silent sessions.
    async fn spawn_timeout_checker(&self) {
        let sessions = Arc::clone(&self.sessions);
        let server_tx = self.server_tx.clone();
        let timeout = self.timeout;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut sessions_guard = sessions.write().await;
                    sessions_guard.check_timeouts(timeout)
                };

                for session in timed_out {
                    let message = ServerMessage::SessionTimeout {
                        addr: session.addr,
                        player_id: session.player_id,
                    };
                    if let Err(e) = server_tx.send(message) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), BoxError> {
        let data = encode(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    async fn send_packet(&self, packet: &Packet, addr: SocketAddr, reliable: bool) {
        if let Err(e) = self.game_tx.send(GameMessage::Send {
            packet: packet.clone(),
            addr,
            reliable,
        }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    async fn broadcast_packet(&self, packet: &Packet, reliable: bool) {
        if let Err(e) = self.game_tx.send(GameMessage::Broadcast {
            packet: packet.clone(),
            reliable,
        }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Drops the peer's session and destroys its player. Called for
    /// malformed input and for packets a session's state does not allow.
    async fn protocol_violation(&mut self, addr: SocketAddr, what: &str) {
        warn!("Protocol violation from {}: {}", addr, what);
        let removed = {
            let mut sessions = self.sessions.write().await;
            sessions.remove(addr)
        };
        if let Some(session) = removed {
            self.controller.on_player_disconnected(session.player_id);
        }
    }

    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        if let Some(session) = self.sessions.write().await.get_mut(addr) {
            session.touch();
        }
        match packet {
            Packet::Login { login } => self.handle_login(login, addr).await,
            Packet::SyncTimeRequest { client_time } => {
                let known = self.sessions.read().await.get(addr).is_some();
                if !known {
                    warn!("Time sync request from unknown peer {}", addr);
                    return;
                }
                let response = Packet::SyncTimeResponse {
                    client_time,
                    server_time: self.server_time(),
                };
                self.send_packet(&response, addr, false).await;
            }
            Packet::ClientStatus(ClientStatus::Synchronized) => {
                let advanced = {
                    let mut sessions = self.sessions.write().await;
                    match sessions.get_mut(addr) {
                        Some(session) => {
                            session.state = SessionState::Synchronized;
                            true
                        }
                        None => false,
                    }
                };
                if !advanced {
                    warn!("Client status from unknown peer {}", addr);
                    return;
                }
                self.resync(addr).await;
            }
            Packet::KeyboardEvent(event) => {
                match self.synchronized_player(addr).await {
                    Some(player_id) => self.controller.on_keyboard_event(player_id, event),
                    None => self.protocol_violation(addr, "input before synchronization").await,
                }
            }
            Packet::MouseEvent(event) => match self.synchronized_player(addr).await {
                Some(player_id) => self.controller.on_mouse_event(player_id, event),
                None => self.protocol_violation(addr, "input before synchronization").await,
            },
            Packet::PlayerAction(action) => match self.synchronized_player(addr).await {
                Some(player_id) => self.controller.on_player_action(player_id, action),
                None => self.protocol_violation(addr, "input before synchronization").await,
            },
            Packet::Disconnect => {
                let removed = {
                    let mut sessions = self.sessions.write().await;
                    sessions.remove(addr)
                };
                if let Some(session) = removed {
                    self.controller.on_player_disconnected(session.player_id);
                }
            }
            // Server-to-client packets arriving here mean the peer is
            // confused or hostile.
            _ => self.protocol_violation(addr, "server-bound packet type").await,
        }
    }

    /// The session's player id, if the session exists and finished its
    /// clock synchronization.
    async fn synchronized_player(&self, addr: SocketAddr) -> Option<u32> {
        let sessions = self.sessions.read().await;
        sessions
            .get(addr)
            .filter(|s| s.state == SessionState::Synchronized)
            .map(|s| s.player_id)
    }

    async fn handle_login(&mut self, login: String, addr: SocketAddr) {
        let existing = self.sessions.read().await.get(addr).map(|s| s.player_id);
        if let Some(player_id) = existing {
            // The options reply is not acknowledged, so a client that never
            // saw it will resend its login. Answer again rather than treat
            // the retransmission as a violation.
            debug!("Repeated login from {}, resending options", addr);
            self.send_client_options(player_id, addr).await;
            return;
        }
        if !shared::is_valid_login(&login) {
            warn!("Rejected invalid login from {}", addr);
            return;
        }

        let player_id = self.controller.on_player_connected();
        let accepted = {
            let mut sessions = self.sessions.write().await;
            sessions.add_session(addr, player_id, login.clone())
        };
        if !accepted {
            warn!("Rejected login '{}' from {}: server full", login, addr);
            self.controller.on_player_disconnected(player_id);
            return;
        }

        self.send_client_options(player_id, addr).await;

        // The appearance snapshot itself goes out with the next broadcast
        // cycle, like any other new entity.
        let info = Packet::PlayerInfo {
            id: player_id,
            login,
        };
        self.broadcast_packet(&info, true).await;
    }

    async fn send_client_options(&self, player_id: u32, addr: SocketAddr) {
        let (x, y) = self
            .controller
            .world()
            .position_of(player_id)
            .map(|p| (p.x, p.y))
            .unwrap_or((0.0, 0.0));
        let params = self
            .controller
            .config()
            .player(&self.controller.config().default_player);
        let options = Packet::ClientOptions(ClientOptions {
            id: player_id,
            speed: params.speed,
            x,
            y,
            max_health: params.max_health,
            energy_capacity: params.energy_capacity,
        });
        self.send_packet(&options, addr, true).await;
    }

    /// Full resync for a freshly synchronized client: who is playing, and
    /// every static entity regardless of dirty flags.
    async fn resync(&mut self, addr: SocketAddr) {
        let infos = {
            let sessions = self.sessions.read().await;
            sessions.player_infos()
        };
        for (id, login) in infos {
            self.send_packet(&Packet::PlayerInfo { id, login }, addr, true)
                .await;
        }
        let time = self.server_time();
        let world = self.controller.world();
        let snapshots: Vec<_> = world
            .statics()
            .values()
            .map(|e| e.snapshot(world.physics(), time))
            .collect();
        debug!("Resyncing {} statics to {}", snapshots.len(), addr);
        for snapshot in snapshots {
            self.send_packet(&Packet::EntityUpdated(snapshot), addr, true)
                .await;
        }
    }

    /// One broadcast cycle: an `EntityAppeared` reliably for each entity new
    /// since the last cycle (they start dirty), every dynamic entity
    /// unreliably, dirty statics reliably, queued game events reliably.
    /// Dirty flags are cleared afterwards, so each appearance goes out
    /// exactly once. Clients that have not finished synchronizing receive
    /// these too and ignore them.
    async fn broadcast_state(&mut self) {
        let time = self.server_time();
        let mut updates: Vec<(Packet, bool)> = Vec::new();
        let mut dirty = Vec::new();
        {
            let world = self.controller.world();
            for (&id, entity) in world.dynamics() {
                let snapshot = entity.snapshot(world.physics(), time);
                if entity.is_updated() {
                    updates.push((Packet::EntityAppeared(snapshot.clone()), true));
                    dirty.push(id);
                }
                updates.push((Packet::EntityUpdated(snapshot), false));
            }
            for (&id, entity) in world.statics() {
                if entity.is_updated() {
                    let snapshot = entity.snapshot(world.physics(), time);
                    updates.push((Packet::EntityUpdated(snapshot), true));
                    dirty.push(id);
                }
            }
        }
        for id in dirty {
            if let Some(entity) = self.controller.world_mut().entity_mut(id) {
                entity.clear_updated();
            }
        }
        for event in self.controller.take_events() {
            updates.push((Packet::GameEvent(event), true));
        }

        let any_peers = !self.sessions.read().await.is_empty();
        if !any_peers {
            return;
        }
        for (packet, reliable) in updates {
            self.broadcast_packet(&packet, reliable).await;
        }
    }

    /// Main server loop.
    pub async fn run(&mut self) -> Result<(), BoxError> {
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let mut update_interval = interval(self.update_period);
        let mut broadcast_interval = interval(self.broadcast_period);
        // The simulation always advances by the configured slice; wall-clock
        // jitter moves the tick, never the step size.
        let dt = self.update_period.as_secs_f32();

        info!(
            "Server started (update every {:?}, broadcast every {:?})",
            self.update_period, self.broadcast_period
        );

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        }
                        Some(ServerMessage::MalformedPacket { addr }) => {
                            self.protocol_violation(addr, "malformed packet").await;
                        }
                        Some(ServerMessage::SessionTimeout { addr, player_id }) => {
                            info!("Session {} timed out", addr);
                            self.controller.on_player_disconnected(player_id);
                        }
                        Some(ServerMessage::TransportError { message }) => {
                            error!("Transport failure: {}", message);
                            return Err(message.into());
                        }
                        Some(ServerMessage::Shutdown) => {
                            info!("Server shutting down");
                            return Ok(());
                        }
                        None => {
                            return Err("network channel closed".into());
                        }
                    }
                },

                _ = update_interval.tick() => {
                    let time = self.server_time();
                    self.controller.update(time, dt);
                },

                _ = broadcast_interval.tick() => {
                    self.broadcast_state().await;
                },
            }
        }
    }
}
