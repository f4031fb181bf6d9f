//! The entity store.
//!
//! Static and dynamic entities live in separate maps keyed by id; an id is
//! in at most one of them. The store owns the [`PhysicsWorld`], so removing
//! an entity also tears its body down and the two can never drift apart.

use crate::config::{GameConfig, ProjectileBlueprint};
use crate::entity::{
    ActivatorState, CritterState, DoorState, Entity, Kind, KitState, PlayerState,
    ProjectilePayload, ProjectileState, WallState,
};
use crate::physics::{Body, PhysicsWorld, Vec2};
use shared::EntityKind;
use std::collections::HashMap;

pub struct World {
    physics: PhysicsWorld,
    statics: HashMap<u32, Entity>,
    dynamics: HashMap<u32, Entity>,
    spawn_points: Vec<Vec2>,
    critter_spawn_points: Vec<Vec2>,
    bound: f32,
    block_size: f32,
    next_id: u32,
}

impl World {
    /// Builds the world and populates the initial map content.
    pub fn new(config: &GameConfig) -> Self {
        let map = &config.map;
        let mut world = World {
            physics: PhysicsWorld::new(),
            statics: HashMap::new(),
            dynamics: HashMap::new(),
            spawn_points: map.spawn_points.iter().map(|&(x, y)| Vec2::new(x, y)).collect(),
            critter_spawn_points: map
                .critter_spawn_points
                .iter()
                .map(|&(x, y)| Vec2::new(x, y))
                .collect(),
            bound: map.bound,
            block_size: map.block_size,
            next_id: 1,
        };
        for (x, y, name) in &map.walls {
            world.create_wall(config, name, Vec2::new(*x, *y));
        }
        for (x, y, name) in &map.kits {
            world.create_kit(config, name, Vec2::new(*x, *y));
        }
        for (x, y, name) in &map.doors {
            world.create_door(config, name, Vec2::new(*x, *y));
        }
        for (x, y, name) in &map.activators {
            world.create_activator(config, name, Vec2::new(*x, *y));
        }
        world
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn insert(&mut self, entity: Entity) {
        let id = entity.id();
        assert!(
            !self.statics.contains_key(&id) && !self.dynamics.contains_key(&id),
            "duplicate entity id {id}"
        );
        if entity.is_static() {
            self.statics.insert(id, entity);
        } else {
            self.dynamics.insert(id, entity);
        }
    }

    pub fn physics(&self) -> &PhysicsWorld {
        &self.physics
    }

    pub fn step_physics(&mut self, dt: f32) -> Vec<(u32, u32)> {
        self.physics.step(dt)
    }

    pub fn entity(&self, id: u32) -> Option<&Entity> {
        self.dynamics.get(&id).or_else(|| self.statics.get(&id))
    }

    pub fn entity_mut(&mut self, id: u32) -> Option<&mut Entity> {
        let statics = &mut self.statics;
        match self.dynamics.get_mut(&id) {
            Some(entity) => Some(entity),
            None => statics.get_mut(&id),
        }
    }

    pub fn contains(&self, id: u32) -> bool {
        self.dynamics.contains_key(&id) || self.statics.contains_key(&id)
    }

    pub fn statics(&self) -> &HashMap<u32, Entity> {
        &self.statics
    }

    pub fn statics_mut(&mut self) -> &mut HashMap<u32, Entity> {
        &mut self.statics
    }

    pub fn dynamics(&self) -> &HashMap<u32, Entity> {
        &self.dynamics
    }

    pub fn dynamics_mut(&mut self) -> &mut HashMap<u32, Entity> {
        &mut self.dynamics
    }

    /// Removes an entity from its map and tears its body down.
    pub fn remove(&mut self, id: u32) -> bool {
        let entity = match self.dynamics.remove(&id) {
            Some(entity) => entity,
            None => match self.statics.remove(&id) {
                Some(entity) => entity,
                None => return false,
            },
        };
        entity.body().destroy(&mut self.physics);
        true
    }

    pub fn spawn_points(&self) -> &[Vec2] {
        &self.spawn_points
    }

    pub fn critter_spawn_points(&self) -> &[Vec2] {
        &self.critter_spawn_points
    }

    pub fn bound(&self) -> f32 {
        self.bound
    }

    pub fn block_size(&self) -> f32 {
        self.block_size
    }

    // Factories. Each looks its parameters up by name (unknown names panic
    // in the config layer), builds the body, and files the entity into the
    // right map.

    pub fn create_player(&mut self, config: &GameConfig, name: &str, position: Vec2) -> u32 {
        let params = config.player(name);
        let id = self.allocate_id();
        let body = Body::create(
            &mut self.physics,
            config.body(&params.body),
            position,
            id,
            EntityKind::Player,
            None,
        );
        let state = PlayerState {
            speed: params.speed,
            health: params.max_health as f32,
            max_health: params.max_health,
            health_regen: params.health_regen,
            energy: params.energy_capacity as f32,
            energy_capacity: params.energy_capacity,
            energy_regen: params.energy_regen,
            score: 0,
            killer: None,
            keyboard: Default::default(),
        };
        self.insert(Entity::new(id, name, body, Kind::Player(state)));
        id
    }

    pub fn create_critter(&mut self, config: &GameConfig, name: &str, position: Vec2) -> u32 {
        let params = config.critter(name);
        let id = self.allocate_id();
        let body = Body::create(
            &mut self.physics,
            config.body(&params.body),
            position,
            id,
            EntityKind::Critter,
            None,
        );
        let state = CritterState {
            speed: params.speed,
            damage: params.damage,
            explosion_radius: params.explosion_radius,
            target: None,
        };
        self.insert(Entity::new(id, name, body, Kind::Critter(state)));
        id
    }

    /// Spawns a projectile at `start` flying toward `target` at the
    /// configured speed, facing its direction of travel.
    pub fn create_projectile(
        &mut self,
        config: &GameConfig,
        name: &str,
        owner: u32,
        start: Vec2,
        target: Vec2,
    ) -> u32 {
        let params = config.projectile(name);
        let id = self.allocate_id();
        let body = Body::create(
            &mut self.physics,
            config.body(&params.body),
            start,
            id,
            EntityKind::Projectile,
            Some(owner),
        );
        let offset = target - start;
        let direction = if offset.norm() > f32::EPSILON {
            offset.normalize()
        } else {
            Vec2::new(1.0, 0.0)
        };
        body.set_velocity(&mut self.physics, direction * params.speed);
        body.set_rotation(&mut self.physics, direction.y.atan2(direction.x));

        let payload = match params.blueprint {
            ProjectileBlueprint::Rocket {
                explosion_radius,
                explosion_damage,
            } => ProjectilePayload::Rocket {
                explosion_radius,
                explosion_damage,
            },
            ProjectileBlueprint::Slime { morph_radius } => {
                ProjectilePayload::Slime { morph_radius }
            }
        };
        let state = ProjectileState { owner, payload };
        self.insert(Entity::new(id, name, body, Kind::Projectile(state)));
        id
    }

    pub fn create_wall(&mut self, config: &GameConfig, name: &str, position: Vec2) -> u32 {
        let params = config.wall(name);
        let id = self.allocate_id();
        let body = Body::create(
            &mut self.physics,
            config.body(&params.body),
            position,
            id,
            EntityKind::Wall,
            None,
        );
        let state = WallState { kind: params.kind };
        self.insert(Entity::new(id, name, body, Kind::Wall(state)));
        id
    }

    pub fn create_kit(&mut self, config: &GameConfig, name: &str, position: Vec2) -> u32 {
        let params = config.kit(name);
        let id = self.allocate_id();
        let body = Body::create(
            &mut self.physics,
            config.body(&params.body),
            position,
            id,
            EntityKind::Kit,
            None,
        );
        let state = KitState {
            kind: params.kind,
            health_regeneration: params.health_regeneration,
            energy_regeneration: params.energy_regeneration,
        };
        self.insert(Entity::new(id, name, body, Kind::Kit(state)));
        id
    }

    pub fn create_activator(&mut self, config: &GameConfig, name: &str, position: Vec2) -> u32 {
        let params = config.activator(name);
        let id = self.allocate_id();
        let body = Body::create(
            &mut self.physics,
            config.body(&params.body),
            position,
            id,
            EntityKind::Activator,
            None,
        );
        let state = ActivatorState {
            activation_distance: params.activation_distance,
        };
        self.insert(Entity::new(id, name, body, Kind::Activator(state)));
        id
    }

    pub fn create_door(&mut self, config: &GameConfig, name: &str, position: Vec2) -> u32 {
        let params = config.door(name);
        let id = self.allocate_id();
        let body = Body::create(
            &mut self.physics,
            config.body(&params.body),
            position,
            id,
            EntityKind::Door,
            None,
        );
        let state = DoorState {
            activation_distance: params.activation_distance,
            open: false,
        };
        self.insert(Entity::new(id, name, body, Kind::Door(state)));
        id
    }

    // Body accessors routed through the store so callers can address
    // entities by id without borrowing the physics world themselves.

    pub fn position_of(&self, id: u32) -> Option<Vec2> {
        self.entity(id).map(|e| e.body().position(&self.physics))
    }

    pub fn set_position_of(&mut self, id: u32, position: Vec2) {
        if let Some(body) = self.entity(id).map(|e| e.body()) {
            body.set_position(&mut self.physics, position);
        }
    }

    pub fn set_rotation_of(&mut self, id: u32, angle: f32) {
        if let Some(body) = self.entity(id).map(|e| e.body()) {
            body.set_rotation(&mut self.physics, angle);
        }
    }

    pub fn set_impulse_of(&mut self, id: u32, impulse: Vec2) {
        if let Some(body) = self.entity(id).map(|e| e.body()) {
            body.set_impulse(&mut self.physics, impulse);
        }
    }

    pub fn set_collision_enabled_of(&mut self, id: u32, enabled: bool) {
        if let Some(body) = self.entity(id).map(|e| e.body()) {
            body.set_collision_enabled(&mut self.physics, enabled);
        }
    }

    pub fn mass_of(&self, id: u32) -> Option<f32> {
        self.entity(id).map(|e| e.body().mass(&self.physics))
    }

    pub fn snapshot_of(&self, id: u32, time: i64) -> Option<shared::EntitySnapshot> {
        self.entity(id).map(|e| e.snapshot(&self.physics, time))
    }
}
