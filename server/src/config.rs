//! Game-data configuration.
//!
//! All entity parameters and the initial map content live in a [`GameConfig`]
//! built once at startup and passed by reference to whoever needs it. Lookups
//! are by name; asking for a name that was never registered is a programming
//! error and panics immediately.

use shared::{KitKind, WallKind};
use std::collections::HashMap;

/// Network-facing knobs, overridable from the command line.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub port: u16,
    /// Simulation ticks per second.
    pub update_rate: u32,
    /// State broadcasts per second.
    pub broadcast_rate: u32,
    /// Seconds of silence before a session is dropped.
    pub connection_timeout: u64,
    pub max_sessions: usize,
}

#[derive(Debug, Clone, Copy)]
pub enum ShapeConfig {
    Box { width: f32, height: f32 },
    Circle { radius: f32 },
}

#[derive(Debug, Clone, Copy)]
pub struct BodyConfig {
    pub shape: ShapeConfig,
    pub dynamic: bool,
}

#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub body: String,
    pub speed: f32,
    pub max_health: i32,
    /// Health points restored per second.
    pub health_regen: f32,
    pub energy_capacity: i32,
    /// Energy points restored per second.
    pub energy_regen: f32,
}

#[derive(Debug, Clone)]
pub struct CritterConfig {
    pub body: String,
    pub speed: f32,
    pub damage: i32,
    pub explosion_radius: f32,
}

#[derive(Debug, Clone)]
pub enum ProjectileBlueprint {
    Rocket { explosion_radius: f32, explosion_damage: i32 },
    Slime { morph_radius: i32 },
}

#[derive(Debug, Clone)]
pub struct ProjectileConfig {
    pub body: String,
    pub speed: f32,
    pub blueprint: ProjectileBlueprint,
}

#[derive(Debug, Clone)]
pub struct WallConfig {
    pub body: String,
    pub kind: WallKind,
}

#[derive(Debug, Clone)]
pub struct KitConfig {
    pub body: String,
    pub kind: KitKind,
    pub health_regeneration: i32,
    pub energy_regeneration: i32,
}

#[derive(Debug, Clone)]
pub struct ActivatorConfig {
    pub body: String,
    pub activation_distance: f32,
}

#[derive(Debug, Clone)]
pub struct DoorConfig {
    pub body: String,
    pub activation_distance: f32,
}

/// A weapon: which projectile it fires and what it costs to fire.
#[derive(Debug, Clone)]
pub struct GunConfig {
    pub projectile: String,
    pub energy_consumption: i32,
}

/// Initial world content. On-disk map formats are out of scope; maps are
/// plain data built in code.
#[derive(Debug, Clone)]
pub struct MapData {
    /// Grid step used when morphing walls into place.
    pub block_size: f32,
    /// Entities farther than this from the origin (per axis) are destroyed.
    pub bound: f32,
    pub spawn_points: Vec<(f32, f32)>,
    pub critter_spawn_points: Vec<(f32, f32)>,
    /// (x, y, wall config name)
    pub walls: Vec<(f32, f32, String)>,
    pub kits: Vec<(f32, f32, String)>,
    pub doors: Vec<(f32, f32, String)>,
    pub activators: Vec<(f32, f32, String)>,
}

#[derive(Debug, Clone)]
pub struct GameConfig {
    pub server: ServerOptions,
    pub map: MapData,
    /// Ticks between critter spawn attempts.
    pub critter_spawn_interval: u32,
    pub default_player: String,
    pub default_critter: String,
    pub primary_gun: String,
    pub secondary_gun: String,
    pub morphed_wall: String,
    bodies: HashMap<String, BodyConfig>,
    players: HashMap<String, PlayerConfig>,
    critters: HashMap<String, CritterConfig>,
    projectiles: HashMap<String, ProjectileConfig>,
    walls: HashMap<String, WallConfig>,
    kits: HashMap<String, KitConfig>,
    activators: HashMap<String, ActivatorConfig>,
    doors: HashMap<String, DoorConfig>,
    guns: HashMap<String, GunConfig>,
}

macro_rules! lookup {
    ($map:expr, $name:expr, $what:expr) => {
        $map.get($name)
            .unwrap_or_else(|| panic!("no {} config named '{}'", $what, $name))
    };
}

impl GameConfig {
    pub fn body(&self, name: &str) -> &BodyConfig {
        lookup!(self.bodies, name, "body")
    }

    pub fn player(&self, name: &str) -> &PlayerConfig {
        lookup!(self.players, name, "player")
    }

    pub fn critter(&self, name: &str) -> &CritterConfig {
        lookup!(self.critters, name, "critter")
    }

    pub fn projectile(&self, name: &str) -> &ProjectileConfig {
        lookup!(self.projectiles, name, "projectile")
    }

    pub fn wall(&self, name: &str) -> &WallConfig {
        lookup!(self.walls, name, "wall")
    }

    pub fn kit(&self, name: &str) -> &KitConfig {
        lookup!(self.kits, name, "kit")
    }

    pub fn activator(&self, name: &str) -> &ActivatorConfig {
        lookup!(self.activators, name, "activator")
    }

    pub fn door(&self, name: &str) -> &DoorConfig {
        lookup!(self.doors, name, "door")
    }

    pub fn gun(&self, name: &str) -> &GunConfig {
        lookup!(self.guns, name, "gun")
    }

    /// The stock game data used by the binary and by tests.
    pub fn standard() -> Self {
        let mut bodies = HashMap::new();
        bodies.insert(
            "man".to_string(),
            BodyConfig {
                shape: ShapeConfig::Circle { radius: 12.0 },
                dynamic: true,
            },
        );
        bodies.insert(
            "zombie".to_string(),
            BodyConfig {
                shape: ShapeConfig::Circle { radius: 10.0 },
                dynamic: true,
            },
        );
        bodies.insert(
            "shot".to_string(),
            BodyConfig {
                shape: ShapeConfig::Circle { radius: 4.0 },
                dynamic: true,
            },
        );
        bodies.insert(
            "block".to_string(),
            BodyConfig {
                shape: ShapeConfig::Box {
                    width: 16.0,
                    height: 16.0,
                },
                dynamic: false,
            },
        );
        bodies.insert(
            "pack".to_string(),
            BodyConfig {
                shape: ShapeConfig::Box {
                    width: 12.0,
                    height: 12.0,
                },
                dynamic: false,
            },
        );

        let mut players = HashMap::new();
        players.insert(
            "soldier".to_string(),
            PlayerConfig {
                body: "man".to_string(),
                speed: 120.0,
                max_health: 100,
                health_regen: 2.0,
                energy_capacity: 100,
                energy_regen: 10.0,
            },
        );

        let mut critters = HashMap::new();
        critters.insert(
            "zombie".to_string(),
            CritterConfig {
                body: "zombie".to_string(),
                speed: 60.0,
                damage: 30,
                explosion_radius: 24.0,
            },
        );

        let mut projectiles = HashMap::new();
        projectiles.insert(
            "rocket".to_string(),
            ProjectileConfig {
                body: "shot".to_string(),
                speed: 300.0,
                blueprint: ProjectileBlueprint::Rocket {
                    explosion_radius: 40.0,
                    explosion_damage: 40,
                },
            },
        );
        projectiles.insert(
            "slime".to_string(),
            ProjectileConfig {
                body: "shot".to_string(),
                speed: 200.0,
                blueprint: ProjectileBlueprint::Slime { morph_radius: 1 },
            },
        );

        let mut walls = HashMap::new();
        walls.insert(
            "brick".to_string(),
            WallConfig {
                body: "block".to_string(),
                kind: WallKind::Ordinary,
            },
        );
        walls.insert(
            "steel".to_string(),
            WallConfig {
                body: "block".to_string(),
                kind: WallKind::Unbreakable,
            },
        );
        walls.insert(
            "morphed".to_string(),
            WallConfig {
                body: "block".to_string(),
                kind: WallKind::Morphed,
            },
        );

        let mut kits = HashMap::new();
        kits.insert(
            "health_kit".to_string(),
            KitConfig {
                body: "pack".to_string(),
                kind: KitKind::Health,
                health_regeneration: 50,
                energy_regeneration: 0,
            },
        );
        kits.insert(
            "energy_kit".to_string(),
            KitConfig {
                body: "pack".to_string(),
                kind: KitKind::Energy,
                health_regeneration: 0,
                energy_regeneration: 50,
            },
        );
        kits.insert(
            "composite_kit".to_string(),
            KitConfig {
                body: "pack".to_string(),
                kind: KitKind::Composite,
                health_regeneration: 30,
                energy_regeneration: 30,
            },
        );

        let mut activators = HashMap::new();
        activators.insert(
            "button".to_string(),
            ActivatorConfig {
                body: "pack".to_string(),
                activation_distance: 40.0,
            },
        );

        let mut doors = HashMap::new();
        doors.insert(
            "door".to_string(),
            DoorConfig {
                body: "block".to_string(),
                activation_distance: 40.0,
            },
        );

        let mut guns = HashMap::new();
        guns.insert(
            "bazooka".to_string(),
            GunConfig {
                projectile: "rocket".to_string(),
                energy_consumption: 30,
            },
        );
        guns.insert(
            "morpher".to_string(),
            GunConfig {
                projectile: "slime".to_string(),
                energy_consumption: 20,
            },
        );

        let map = MapData {
            block_size: 16.0,
            bound: 512.0,
            spawn_points: vec![(-96.0, -96.0), (96.0, 96.0), (-96.0, 96.0), (96.0, -96.0)],
            critter_spawn_points: vec![(0.0, 160.0), (0.0, -160.0)],
            walls: vec![
                (-48.0, 0.0, "brick".to_string()),
                (-32.0, 0.0, "brick".to_string()),
                (32.0, 0.0, "brick".to_string()),
                (48.0, 0.0, "brick".to_string()),
                (0.0, 48.0, "steel".to_string()),
                (0.0, -48.0, "steel".to_string()),
            ],
            kits: vec![
                (-128.0, 0.0, "health_kit".to_string()),
                (128.0, 0.0, "energy_kit".to_string()),
                (0.0, 128.0, "composite_kit".to_string()),
            ],
            doors: vec![(64.0, 64.0, "door".to_string())],
            activators: vec![(80.0, 48.0, "button".to_string())],
        };

        GameConfig {
            server: ServerOptions {
                port: 4242,
                update_rate: 30,
                broadcast_rate: 20,
                connection_timeout: 10,
                max_sessions: 16,
            },
            map,
            critter_spawn_interval: 150,
            default_player: "soldier".to_string(),
            default_critter: "zombie".to_string(),
            primary_gun: "bazooka".to_string(),
            secondary_gun: "morpher".to_string(),
            morphed_wall: "morphed".to_string(),
            bodies,
            players,
            critters,
            projectiles,
            walls,
            kits,
            activators,
            doors,
            guns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_config_lookups() {
        let config = GameConfig::standard();
        assert_eq!(config.player("soldier").max_health, 100);
        assert_eq!(config.critter("zombie").damage, 30);
        assert_eq!(config.wall("steel").kind, WallKind::Unbreakable);
        assert_eq!(config.kit("health_kit").health_regeneration, 50);
        assert_eq!(config.gun("bazooka").projectile, "rocket");
        assert!(config.body("man").dynamic);
        assert!(!config.body("block").dynamic);
    }

    #[test]
    fn test_gun_projectiles_resolve() {
        let config = GameConfig::standard();
        for gun in ["bazooka", "morpher"] {
            let projectile = &config.gun(gun).projectile;
            config.body(&config.projectile(projectile).body);
        }
    }

    #[test]
    fn test_map_references_resolve() {
        let config = GameConfig::standard();
        for (_, _, name) in &config.map.walls {
            config.body(&config.wall(name).body);
        }
        for (_, _, name) in &config.map.kits {
            config.kit(name);
        }
        for (_, _, name) in &config.map.doors {
            config.door(name);
        }
        for (_, _, name) in &config.map.activators {
            config.activator(name);
        }
        config.wall(&config.morphed_wall);
    }

    #[test]
    #[should_panic(expected = "no player config named 'pilot'")]
    fn test_unknown_name_panics() {
        let config = GameConfig::standard();
        config.player("pilot");
    }
}
