use serde::{Deserialize, Serialize};

/// Bumped on every incompatible wire change.
pub const PROTOCOL_VERSION: u32 = 1;

/// Longest login the server accepts, in bytes.
pub const MAX_LOGIN_LENGTH: usize = 31;

/// Width of the kind-specific payload in an [`EntitySnapshot`].
pub const SNAPSHOT_DATA_LEN: usize = 4;

/// Entity kinds as they appear on the wire.
///
/// The declaration order here is the canonical total order used when a pair
/// of entities has to be normalized (collision dispatch): Activator < Critter
/// < Door < Kit < Player < Projectile < Wall. `PartialOrd`/`Ord` derive from
/// it, so the order is defined in exactly one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Activator,
    Critter,
    Door,
    Kit,
    Player,
    Projectile,
    Wall,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Activator,
        EntityKind::Critter,
        EntityKind::Door,
        EntityKind::Kit,
        EntityKind::Player,
        EntityKind::Projectile,
        EntityKind::Wall,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectileKind {
    Rocket,
    Slime,
}

impl ProjectileKind {
    /// Wire code carried in the snapshot `data` payload.
    pub fn code(self) -> i32 {
        match self {
            ProjectileKind::Rocket => 0,
            ProjectileKind::Slime => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WallKind {
    Ordinary,
    Unbreakable,
    Morphed,
}

impl WallKind {
    /// Wire code carried in the snapshot `data` payload.
    pub fn code(self) -> i32 {
        match self {
            WallKind::Ordinary => 0,
            WallKind::Unbreakable => 1,
            WallKind::Morphed => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KitKind {
    Health,
    Energy,
    Composite,
}

impl KitKind {
    /// Wire code carried in the snapshot `data` payload.
    pub fn code(self) -> i32 {
        match self {
            KitKind::Health => 0,
            KitKind::Energy => 1,
            KitKind::Composite => 2,
        }
    }
}

/// One entity as seen by clients at a given server time.
///
/// `data` is kind-specific:
///   player:     [health, energy, score, 0]
///   projectile: [projectile kind, 0, 0, 0]
///   wall:       [wall kind, 0, 0, 0]
///   kit:        [kit kind, 0, 0, 0]
///   others:     zeroed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub time: i64,
    pub id: u32,
    pub kind: EntityKind,
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub data: [i32; SNAPSHOT_DATA_LEN],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEventKind {
    Explosion,
    EntityDisappeared,
}

/// A discrete occurrence broadcast reliably to every client.
///
/// `EntityDisappeared` carries the final snapshot of the removed entity;
/// explosions only have a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    pub kind: GameEventKind,
    pub x: f32,
    pub y: f32,
    pub entity: Option<EntitySnapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyState {
    Pressed,
    Released,
}

/// A key transition, stamped with the client's corrected clock. The server
/// ignores events that are not strictly newer than the last one applied to
/// the same key, so duplicated datagrams are harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyboardEvent {
    pub time: i64,
    pub key: Key,
    pub state: KeyState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseButton {
    None,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseEventKind {
    ButtonDown,
    ButtonUp,
    Move,
}

/// A mouse transition or movement in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MouseEvent {
    pub time: i64,
    pub kind: MouseEventKind,
    pub button: MouseButton,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerAction {
    Activate { target_id: u32 },
}

/// Parameters a client needs to know about its own player entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientOptions {
    pub id: u32,
    pub speed: f32,
    pub x: f32,
    pub y: f32,
    pub max_health: i32,
    pub energy_capacity: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientStatus {
    Synchronized,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    // client -> server
    Login { login: String },
    SyncTimeRequest { client_time: i64 },
    ClientStatus(ClientStatus),
    KeyboardEvent(KeyboardEvent),
    MouseEvent(MouseEvent),
    PlayerAction(PlayerAction),
    Disconnect,

    // server -> client
    ClientOptions(ClientOptions),
    SyncTimeResponse { client_time: i64, server_time: i64 },
    PlayerInfo { id: u32, login: String },
    EntityAppeared(EntitySnapshot),
    EntityUpdated(EntitySnapshot),
    GameEvent(GameEvent),
}

pub fn encode(packet: &Packet) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(packet)
}

pub fn decode(bytes: &[u8]) -> Result<Packet, bincode::Error> {
    bincode::deserialize(bytes)
}

pub fn is_valid_login(login: &str) -> bool {
    !login.is_empty() && login.len() <= MAX_LOGIN_LENGTH
}

/// Result of one clock-synchronization exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSync {
    /// Estimated one-way trip time.
    pub latency: i64,
    /// Add this to a local reading to get server time.
    pub correction: i64,
}

/// Computes latency and clock correction from a sync round trip.
///
/// `client_time` is the client's clock echoed back by the server,
/// `server_time` is the server's clock when it answered, and `receive_time`
/// is the client's clock when the answer arrived.
pub fn compute_time_sync(client_time: i64, server_time: i64, receive_time: i64) -> TimeSync {
    let latency = (receive_time - client_time) / 2;
    TimeSync {
        latency,
        correction: server_time + latency - receive_time,
    }
}
