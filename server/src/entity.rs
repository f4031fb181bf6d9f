//! The entity model.
//!
//! Entities are a tagged union: a common [`Entity`] shell (id, body, flags)
//! around one [`Kind`] payload per entity kind. Collision dispatch and
//! snapshots match on [`shared::EntityKind`], so adding a kind extends one
//! enum and the compiler points at every match that needs a new arm.
//!
//! Coordinates follow screen convention: the y axis points down, so "up"
//! movement is negative y.

use crate::physics::{Body, PhysicsWorld, Vec2};
use shared::{
    EntityKind, EntitySnapshot, Key, KeyState, KeyboardEvent, KitKind, ProjectileKind, WallKind,
};

/// Pressed/released state of the four movement keys, with the timestamp of
/// the last event applied per key. Events that are not strictly newer than
/// the last applied one for the same key are ignored, which makes duplicated
/// or re-sent input packets idempotent.
#[derive(Debug, Clone)]
pub struct KeyboardState {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    last_event_time: [i64; 4],
}

impl Default for KeyboardState {
    fn default() -> Self {
        KeyboardState {
            up: false,
            down: false,
            left: false,
            right: false,
            last_event_time: [i64::MIN; 4],
        }
    }
}

fn key_index(key: Key) -> usize {
    match key {
        Key::Up => 0,
        Key::Down => 1,
        Key::Left => 2,
        Key::Right => 3,
    }
}

impl KeyboardState {
    /// Applies one key transition. Returns `false` if the event was stale.
    pub fn apply(&mut self, event: &KeyboardEvent) -> bool {
        let index = key_index(event.key);
        if event.time <= self.last_event_time[index] {
            return false;
        }
        self.last_event_time[index] = event.time;
        let pressed = event.state == KeyState::Pressed;
        match event.key {
            Key::Up => self.up = pressed,
            Key::Down => self.down = pressed,
            Key::Left => self.left = pressed,
            Key::Right => self.right = pressed,
        }
        true
    }

    /// Unit-per-axis movement direction. Opposite keys cancel.
    pub fn direction(&self) -> Vec2 {
        let x = (self.right as i32 - self.left as i32) as f32;
        let y = (self.down as i32 - self.up as i32) as f32;
        Vec2::new(x, y)
    }
}

#[derive(Debug, Clone)]
pub struct PlayerState {
    pub speed: f32,
    pub health: f32,
    pub max_health: i32,
    pub health_regen: f32,
    pub energy: f32,
    pub energy_capacity: i32,
    pub energy_regen: f32,
    pub score: i32,
    /// Set when lethal damage lands; consumed by the respawn pass.
    pub killer: Option<u32>,
    pub keyboard: KeyboardState,
}

impl PlayerState {
    pub fn regenerate(&mut self, dt: f32) {
        self.health = (self.health + self.health_regen * dt).min(self.max_health as f32);
        self.energy = (self.energy + self.energy_regen * dt).min(self.energy_capacity as f32);
    }

    pub fn restore_health(&mut self, amount: i32) {
        self.health = (self.health + amount as f32).min(self.max_health as f32);
    }

    pub fn restore_energy(&mut self, amount: i32) {
        self.energy = (self.energy + amount as f32).min(self.energy_capacity as f32);
    }

    /// Deducts `amount` if the pool covers it. Firing with insufficient
    /// energy is a silent no-op at the call site.
    pub fn consume_energy(&mut self, amount: i32) -> bool {
        if self.energy >= amount as f32 {
            self.energy -= amount as f32;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone)]
pub struct CritterState {
    pub speed: f32,
    pub damage: i32,
    pub explosion_radius: f32,
    /// Current victim; re-evaluated when players appear or disappear.
    pub target: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
pub enum ProjectilePayload {
    Rocket {
        explosion_radius: f32,
        explosion_damage: i32,
    },
    Slime {
        morph_radius: i32,
    },
}

impl ProjectilePayload {
    pub fn wire_kind(&self) -> ProjectileKind {
        match self {
            ProjectilePayload::Rocket { .. } => ProjectileKind::Rocket,
            ProjectilePayload::Slime { .. } => ProjectileKind::Slime,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProjectileState {
    pub owner: u32,
    pub payload: ProjectilePayload,
}

#[derive(Debug, Clone)]
pub struct WallState {
    pub kind: WallKind,
}

#[derive(Debug, Clone)]
pub struct KitState {
    pub kind: KitKind,
    pub health_regeneration: i32,
    pub energy_regeneration: i32,
}

#[derive(Debug, Clone)]
pub struct ActivatorState {
    pub activation_distance: f32,
}

#[derive(Debug, Clone)]
pub struct DoorState {
    pub activation_distance: f32,
    pub open: bool,
}

#[derive(Debug, Clone)]
pub enum Kind {
    Player(PlayerState),
    Critter(CritterState),
    Projectile(ProjectileState),
    Wall(WallState),
    Kit(KitState),
    Activator(ActivatorState),
    Door(DoorState),
}

#[derive(Debug)]
pub struct Entity {
    id: u32,
    name: String,
    body: Body,
    destroyed: bool,
    updated: bool,
    kind: Kind,
}

impl Entity {
    pub fn new(id: u32, name: &str, body: Body, kind: Kind) -> Self {
        Entity {
            id,
            name: name.to_string(),
            body,
            destroyed: false,
            // Starts dirty so the first reliable broadcast covers it.
            updated: true,
            kind,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> Body {
        self.body
    }

    pub fn kind(&self) -> EntityKind {
        match self.kind {
            Kind::Player(_) => EntityKind::Player,
            Kind::Critter(_) => EntityKind::Critter,
            Kind::Projectile(_) => EntityKind::Projectile,
            Kind::Wall(_) => EntityKind::Wall,
            Kind::Kit(_) => EntityKind::Kit,
            Kind::Activator(_) => EntityKind::Activator,
            Kind::Door(_) => EntityKind::Door,
        }
    }

    /// Static entities live in the static map and are only broadcast when
    /// dirty; everything else is broadcast every cycle.
    pub fn is_static(&self) -> bool {
        matches!(
            self.kind,
            Kind::Wall(_) | Kind::Kit(_) | Kind::Activator(_) | Kind::Door(_)
        )
    }

    pub fn destroy(&mut self) {
        self.destroyed = true;
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn mark_updated(&mut self) {
        self.updated = true;
    }

    pub fn clear_updated(&mut self) {
        self.updated = false;
    }

    pub fn is_updated(&self) -> bool {
        self.updated
    }

    pub fn snapshot(&self, physics: &PhysicsWorld, time: i64) -> EntitySnapshot {
        let position = self.body.position(physics);
        let mut data = [0i32; shared::SNAPSHOT_DATA_LEN];
        match &self.kind {
            Kind::Player(player) => {
                data[0] = player.health.round() as i32;
                data[1] = player.energy.round() as i32;
                data[2] = player.score;
            }
            Kind::Projectile(projectile) => {
                data[0] = projectile.payload.wire_kind().code();
            }
            Kind::Wall(wall) => {
                data[0] = wall.kind.code();
            }
            Kind::Kit(kit) => {
                data[0] = kit.kind.code();
            }
            Kind::Critter(_) | Kind::Activator(_) | Kind::Door(_) => {}
        }
        EntitySnapshot {
            time,
            id: self.id,
            kind: self.kind(),
            x: position.x,
            y: position.y,
            angle: self.body.rotation(physics),
            data,
        }
    }

    /// Applies damage from entity `source`. What that means depends on the
    /// kind: players lose health and remember their killer on lethal hits,
    /// critters and projectiles die outright, ordinary and morphed walls
    /// break, everything else shrugs it off.
    pub fn damage(&mut self, amount: i32, source: u32) {
        match &mut self.kind {
            Kind::Player(player) => {
                player.health -= amount as f32;
                if player.health <= 0.0 {
                    player.killer = Some(source);
                }
            }
            Kind::Critter(_) | Kind::Projectile(_) => self.destroyed = true,
            Kind::Wall(wall) => {
                if wall.kind != WallKind::Unbreakable {
                    self.destroyed = true;
                }
            }
            Kind::Kit(_) | Kind::Activator(_) | Kind::Door(_) => {}
        }
    }

    pub fn player(&self) -> Option<&PlayerState> {
        match &self.kind {
            Kind::Player(state) => Some(state),
            _ => None,
        }
    }

    pub fn player_mut(&mut self) -> Option<&mut PlayerState> {
        match &mut self.kind {
            Kind::Player(state) => Some(state),
            _ => None,
        }
    }

    pub fn critter(&self) -> Option<&CritterState> {
        match &self.kind {
            Kind::Critter(state) => Some(state),
            _ => None,
        }
    }

    pub fn critter_mut(&mut self) -> Option<&mut CritterState> {
        match &mut self.kind {
            Kind::Critter(state) => Some(state),
            _ => None,
        }
    }

    pub fn projectile(&self) -> Option<&ProjectileState> {
        match &self.kind {
            Kind::Projectile(state) => Some(state),
            _ => None,
        }
    }

    pub fn kit(&self) -> Option<&KitState> {
        match &self.kind {
            Kind::Kit(state) => Some(state),
            _ => None,
        }
    }

    pub fn activator(&self) -> Option<&ActivatorState> {
        match &self.kind {
            Kind::Activator(state) => Some(state),
            _ => None,
        }
    }

    pub fn door(&self) -> Option<&DoorState> {
        match &self.kind {
            Kind::Door(state) => Some(state),
            _ => None,
        }
    }

    pub fn door_mut(&mut self) -> Option<&mut DoorState> {
        match &mut self.kind {
            Kind::Door(state) => Some(state),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BodyConfig, ShapeConfig};
    use assert_approx_eq::assert_approx_eq;

    fn player_state() -> PlayerState {
        PlayerState {
            speed: 120.0,
            health: 100.0,
            max_health: 100,
            health_regen: 2.0,
            energy: 50.0,
            energy_capacity: 100,
            energy_regen: 10.0,
            score: 0,
            killer: None,
            keyboard: KeyboardState::default(),
        }
    }

    fn make_entity(kind: Kind) -> (PhysicsWorld, Entity) {
        let mut physics = PhysicsWorld::new();
        let config = BodyConfig {
            shape: ShapeConfig::Circle { radius: 12.0 },
            dynamic: true,
        };
        let body = Body::create(&mut physics, &config, Vec2::new(8.0, -8.0), 1, EntityKind::Player, None);
        (physics, Entity::new(1, "test", body, kind))
    }

    #[test]
    fn test_keyboard_apply_and_direction() {
        let mut keyboard = KeyboardState::default();
        assert!(keyboard.apply(&KeyboardEvent {
            time: 10,
            key: Key::Left,
            state: KeyState::Pressed,
        }));
        assert!(keyboard.left);
        assert_eq!(keyboard.direction(), Vec2::new(-1.0, 0.0));

        assert!(keyboard.apply(&KeyboardEvent {
            time: 20,
            key: Key::Up,
            state: KeyState::Pressed,
        }));
        assert_eq!(keyboard.direction(), Vec2::new(-1.0, -1.0));
    }

    #[test]
    fn test_keyboard_stale_events_ignored() {
        let mut keyboard = KeyboardState::default();
        assert!(keyboard.apply(&KeyboardEvent {
            time: 100,
            key: Key::Right,
            state: KeyState::Pressed,
        }));
        // Same timestamp: duplicate datagram, must not flip the key back.
        assert!(!keyboard.apply(&KeyboardEvent {
            time: 100,
            key: Key::Right,
            state: KeyState::Released,
        }));
        assert!(keyboard.right);
        // Older timestamp: reordered datagram.
        assert!(!keyboard.apply(&KeyboardEvent {
            time: 50,
            key: Key::Right,
            state: KeyState::Released,
        }));
        assert!(keyboard.right);
        // Timestamps are tracked per key, so another key is unaffected.
        assert!(keyboard.apply(&KeyboardEvent {
            time: 60,
            key: Key::Left,
            state: KeyState::Pressed,
        }));
    }

    #[test]
    fn test_opposite_keys_cancel() {
        let mut keyboard = KeyboardState::default();
        keyboard.apply(&KeyboardEvent {
            time: 1,
            key: Key::Left,
            state: KeyState::Pressed,
        });
        keyboard.apply(&KeyboardEvent {
            time: 2,
            key: Key::Right,
            state: KeyState::Pressed,
        });
        assert_eq!(keyboard.direction(), Vec2::new(0.0, 0.0));
    }

    #[test]
    fn test_player_damage_records_killer() {
        let (_physics, mut entity) = make_entity(Kind::Player(player_state()));
        entity.damage(30, 9);
        assert_approx_eq!(entity.player().unwrap().health, 70.0);
        assert_eq!(entity.player().unwrap().killer, None);
        assert!(!entity.is_destroyed());

        entity.damage(80, 9);
        assert!(entity.player().unwrap().health <= 0.0);
        assert_eq!(entity.player().unwrap().killer, Some(9));
        // Players are respawned, not reaped.
        assert!(!entity.is_destroyed());
    }

    #[test]
    fn test_critter_and_projectile_die_on_any_damage() {
        let (_physics, mut critter) = make_entity(Kind::Critter(CritterState {
            speed: 60.0,
            damage: 30,
            explosion_radius: 24.0,
            target: None,
        }));
        critter.damage(1, 2);
        assert!(critter.is_destroyed());

        let (_physics, mut projectile) = make_entity(Kind::Projectile(ProjectileState {
            owner: 5,
            payload: ProjectilePayload::Rocket {
                explosion_radius: 40.0,
                explosion_damage: 40,
            },
        }));
        projectile.damage(1, 2);
        assert!(projectile.is_destroyed());
    }

    #[test]
    fn test_wall_damage_respects_unbreakable() {
        let (_physics, mut brick) = make_entity(Kind::Wall(WallState {
            kind: WallKind::Ordinary,
        }));
        brick.damage(1, 2);
        assert!(brick.is_destroyed());

        let (_physics, mut steel) = make_entity(Kind::Wall(WallState {
            kind: WallKind::Unbreakable,
        }));
        steel.damage(1000, 2);
        assert!(!steel.is_destroyed());
    }

    #[test]
    fn test_kit_ignores_damage() {
        let (_physics, mut kit) = make_entity(Kind::Kit(KitState {
            kind: KitKind::Health,
            health_regeneration: 50,
            energy_regeneration: 0,
        }));
        kit.damage(1000, 2);
        assert!(!kit.is_destroyed());
    }

    #[test]
    fn test_snapshot_payload_layout() {
        let mut state = player_state();
        state.score = 3;
        let (physics, entity) = make_entity(Kind::Player(state));
        let snapshot = entity.snapshot(&physics, 777);
        assert_eq!(snapshot.time, 777);
        assert_eq!(snapshot.id, 1);
        assert_eq!(snapshot.kind, EntityKind::Player);
        assert_approx_eq!(snapshot.x, 8.0, 1e-3);
        assert_approx_eq!(snapshot.y, -8.0, 1e-3);
        assert_eq!(snapshot.data, [100, 50, 3, 0]);

        let (physics, entity) = make_entity(Kind::Projectile(ProjectileState {
            owner: 5,
            payload: ProjectilePayload::Slime { morph_radius: 1 },
        }));
        let snapshot = entity.snapshot(&physics, 0);
        assert_eq!(snapshot.data[0], ProjectileKind::Slime.code());
    }

    #[test]
    fn test_regeneration_clamps_at_capacity() {
        let mut state = player_state();
        state.health = 99.5;
        state.energy = 99.5;
        state.regenerate(10.0);
        assert_approx_eq!(state.health, 100.0);
        assert_approx_eq!(state.energy, 100.0);
    }

    #[test]
    fn test_consume_energy() {
        let mut state = player_state();
        assert!(state.consume_energy(30));
        assert_approx_eq!(state.energy, 20.0);
        assert!(!state.consume_energy(30));
        assert_approx_eq!(state.energy, 20.0);
    }

    #[test]
    fn test_static_flag() {
        let (_physics, wall) = make_entity(Kind::Wall(WallState {
            kind: WallKind::Ordinary,
        }));
        assert!(wall.is_static());
        let (_physics, player) = make_entity(Kind::Player(player_state()));
        assert!(!player.is_static());
    }
}
