//! Client session management.
//!
//! A [`Session`] exists per connected peer, created when its login packet is
//! accepted and keyed by socket address (the only identity UDP gives us).
//! Each session tracks its protocol state, the player entity it owns, and
//! when we last heard from it so silent peers can be swept out.

use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Protocol state of one session. Transitions are monotone: a session only
/// ever moves forward, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Logged in, exchanging clock-sync packets.
    Synchronizing,
    /// Clock agreed; receives broadcasts and may send input.
    Synchronized,
}

#[derive(Debug)]
pub struct Session {
    pub addr: SocketAddr,
    /// The player entity this session controls.
    pub player_id: u32,
    pub login: String,
    pub state: SessionState,
    /// Last time we received any packet from this peer.
    pub last_seen: Instant,
}

impl Session {
    pub fn new(addr: SocketAddr, player_id: u32, login: String) -> Self {
        Self {
            addr,
            player_id,
            login,
            state: SessionState::Synchronizing,
            last_seen: Instant::now(),
        }
    }

    /// Marks the session as just heard from.
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// All live sessions, keyed by peer address.
pub struct SessionManager {
    sessions: HashMap<SocketAddr, Session>,
    max_sessions: usize,
}

impl SessionManager {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            max_sessions,
        }
    }

    /// Registers a freshly logged-in peer. Returns `false` when the server
    /// is full or the peer already has a session.
    pub fn add_session(&mut self, addr: SocketAddr, player_id: u32, login: String) -> bool {
        if self.sessions.len() >= self.max_sessions || self.sessions.contains_key(&addr) {
            return false;
        }
        info!("Session opened for '{}' ({}) from {}", login, player_id, addr);
        self.sessions.insert(addr, Session::new(addr, player_id, login));
        true
    }

    pub fn get(&self, addr: SocketAddr) -> Option<&Session> {
        self.sessions.get(&addr)
    }

    pub fn get_mut(&mut self, addr: SocketAddr) -> Option<&mut Session> {
        self.sessions.get_mut(&addr)
    }

    pub fn remove(&mut self, addr: SocketAddr) -> Option<Session> {
        let session = self.sessions.remove(&addr);
        if let Some(session) = &session {
            info!(
                "Session closed for '{}' ({}) from {}",
                session.login, session.player_id, addr
            );
        }
        session
    }

    /// Removes and returns every session that has been silent longer than
    /// `timeout`.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<Session> {
        let timed_out: Vec<SocketAddr> = self
            .sessions
            .iter()
            .filter(|(_, session)| session.is_timed_out(timeout))
            .map(|(&addr, _)| addr)
            .collect();
        timed_out
            .into_iter()
            .filter_map(|addr| self.remove(addr))
            .collect()
    }

    /// Peer addresses for broadcasting, in no particular order.
    pub fn addrs(&self) -> Vec<SocketAddr> {
        self.sessions.keys().copied().collect()
    }

    /// (player id, login) of every session, for player-info resyncs.
    pub fn player_infos(&self) -> Vec<(u32, String)> {
        self.sessions
            .values()
            .map(|s| (s.player_id, s.login.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
