//! The per-tick game driver.
//!
//! `update` runs a fixed sequence every tick: spawn critters, apply entity
//! behavior, step physics and resolve the contacts it reports, destroy
//! entities that left the world bound, respawn dead players, reap destroyed
//! entities, then apply deferred slime morphs. Everything protocol-driven
//! (connects, input, actions) arrives between ticks through the `on_*`
//! callbacks.

use crate::collision::{self, Contact, Outcome};
use crate::config::GameConfig;
use crate::physics::Vec2;
use crate::world::World;
use log::{debug, info};
use rand::seq::SliceRandom;
use shared::{
    EntityKind, GameEvent, GameEventKind, KeyboardEvent, MouseButton, MouseEvent, MouseEventKind,
    PlayerAction,
};

pub struct Controller {
    config: GameConfig,
    world: World,
    events: Vec<GameEvent>,
    /// Slime detonations this tick; walls are morphed in after reaping.
    pending_morphs: Vec<(Vec2, i32)>,
    ticks_until_critter: u32,
}

impl Controller {
    pub fn new(config: GameConfig) -> Self {
        let world = World::new(&config);
        let ticks_until_critter = config.critter_spawn_interval;
        Controller {
            config,
            world,
            events: Vec::new(),
            pending_morphs: Vec::new(),
            ticks_until_critter,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Drains the queued game events for broadcasting.
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    /// Advances the simulation by one tick of `dt` seconds at server time
    /// `time` (milliseconds).
    pub fn update(&mut self, time: i64, dt: f32) {
        self.spawn_critters();
        self.update_entities(dt);
        let contacts = self.world.step_physics(dt);
        for (a, b) in contacts {
            self.on_collision(a, b);
        }
        self.destroy_outlying();
        self.respawn_dead_players();
        self.delete_destroyed(time);
        self.apply_pending_morphs();
    }

    // -- tick phases ------------------------------------------------------

    fn spawn_critters(&mut self) {
        if self.world.critter_spawn_points().is_empty() {
            return;
        }
        if self.ticks_until_critter > 0 {
            self.ticks_until_critter -= 1;
            return;
        }
        self.ticks_until_critter = self.config.critter_spawn_interval;
        let spawn = match self.world.critter_spawn_points().choose(&mut rand::thread_rng()) {
            Some(&spawn) => spawn,
            None => return,
        };
        let name = self.config.default_critter.clone();
        let id = self.world.create_critter(&self.config, &name, spawn);
        debug!("Spawned critter {} at ({}, {})", id, spawn.x, spawn.y);
        self.on_entity_appeared(id);
    }

    fn update_entities(&mut self, dt: f32) {
        // Gather movement before touching anything so behavior only sees
        // the state of the tick start.
        let mut impulses: Vec<(u32, Vec2)> = Vec::new();
        let mut rotations: Vec<(u32, f32)> = Vec::new();
        for (&id, entity) in self.world.dynamics() {
            if let Some(critter) = entity.critter() {
                let target_position = critter.target.and_then(|t| self.world.position_of(t));
                let position = self.world.position_of(id);
                if let (Some(target_position), Some(position)) = (target_position, position) {
                    let offset = target_position - position;
                    if offset.norm() > f32::EPSILON {
                        let direction = offset.normalize();
                        let mass = self.world.mass_of(id).unwrap_or(0.0);
                        impulses.push((id, direction * critter.speed * mass));
                        rotations.push((id, direction.y.atan2(direction.x)));
                    }
                }
            } else if let Some(player) = entity.player() {
                let direction = player.keyboard.direction();
                let mass = self.world.mass_of(id).unwrap_or(0.0);
                let velocity = if direction.norm() > f32::EPSILON {
                    direction.normalize() * player.speed
                } else {
                    Vec2::new(0.0, 0.0)
                };
                impulses.push((id, velocity * mass));
            }
        }
        for (id, impulse) in impulses {
            self.world.set_impulse_of(id, impulse);
        }
        for (id, angle) in rotations {
            self.world.set_rotation_of(id, angle);
        }
        for entity in self.world.dynamics_mut().values_mut() {
            if let Some(player) = entity.player_mut() {
                player.regenerate(dt);
            }
        }
    }

    /// Destroys everything that escaped the world bound. Players are
    /// exempt; they get pushed around but never reaped for it.
    fn destroy_outlying(&mut self) {
        let bound = self.world.bound();
        let mut outlying = Vec::new();
        for (&id, entity) in self.world.statics().iter().chain(self.world.dynamics()) {
            if entity.kind() == EntityKind::Player {
                continue;
            }
            if let Some(position) = self.world.position_of(id) {
                if position.x.abs() > bound || position.y.abs() > bound {
                    outlying.push(id);
                }
            }
        }
        for id in outlying {
            if let Some(entity) = self.world.entity_mut(id) {
                entity.destroy();
            }
        }
    }

    fn respawn_dead_players(&mut self) {
        let dead: Vec<u32> = self
            .world
            .dynamics()
            .iter()
            .filter(|(_, e)| e.player().map(|p| p.health <= 0.0).unwrap_or(false))
            .map(|(&id, _)| id)
            .collect();
        for id in dead {
            self.update_score(id);
            self.respawn_player(id);
        }
    }

    fn update_score(&mut self, victim: u32) {
        let killer = self
            .world
            .entity(victim)
            .and_then(|e| e.player())
            .and_then(|p| p.killer);
        let Some(killer) = killer else { return };
        if killer == victim {
            if let Some(player) = self.world.entity_mut(victim).and_then(|e| e.player_mut()) {
                player.score -= 1;
            }
        } else if let Some(player) = self.world.entity_mut(killer).and_then(|e| e.player_mut()) {
            // Only a still-living player earns the point; critters and
            // long-gone shooters score nothing.
            player.score += 1;
        }
    }

    fn respawn_player(&mut self, id: u32) {
        let spawn = self
            .world
            .spawn_points()
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or_else(|| Vec2::new(0.0, 0.0));
        self.world.set_position_of(id, spawn);
        if let Some(player) = self.world.entity_mut(id).and_then(|e| e.player_mut()) {
            player.health = player.max_health as f32;
            player.killer = None;
        }
        debug!("Respawned player {} at ({}, {})", id, spawn.x, spawn.y);
    }

    /// Reaps every destroyed entity: one `EntityDisappeared` event each,
    /// then removal (store and physics both).
    fn delete_destroyed(&mut self, time: i64) {
        let destroyed: Vec<u32> = self
            .world
            .statics()
            .iter()
            .chain(self.world.dynamics())
            .filter(|(_, e)| e.is_destroyed())
            .map(|(&id, _)| id)
            .collect();
        for id in destroyed {
            if let Some(snapshot) = self.world.snapshot_of(id, time) {
                self.events.push(GameEvent {
                    kind: GameEventKind::EntityDisappeared,
                    x: snapshot.x,
                    y: snapshot.y,
                    entity: Some(snapshot),
                });
            }
            self.world.remove(id);
            self.on_entity_disappeared(id);
        }
    }

    fn apply_pending_morphs(&mut self) {
        let morphs = std::mem::take(&mut self.pending_morphs);
        let block = self.world.block_size();
        for (center, radius) in morphs {
            let center_x = (center.x / block).round() as i32;
            let center_y = (center.y / block).round() as i32;
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    if dx * dx + dy * dy > radius * radius {
                        continue;
                    }
                    let position = Vec2::new(
                        (center_x + dx) as f32 * block,
                        (center_y + dy) as f32 * block,
                    );
                    if self.cell_occupied(position, block) {
                        continue;
                    }
                    let name = self.config.morphed_wall.clone();
                    self.world.create_wall(&self.config, &name, position);
                }
            }
        }
    }

    fn cell_occupied(&self, position: Vec2, block: f32) -> bool {
        self.world.statics().keys().any(|&id| {
            self.world
                .position_of(id)
                .map(|p| (p - position).norm() < block / 2.0)
                .unwrap_or(false)
        })
    }

    // -- collision resolution ---------------------------------------------

    pub fn on_collision(&mut self, a: u32, b: u32) {
        let contact = |world: &World, id: u32| -> Option<Contact> {
            let entity = world.entity(id)?;
            Some(match entity.projectile() {
                Some(projectile) => Contact::projectile(id, projectile.owner),
                None => Contact::new(id, entity.kind()),
            })
        };
        let (Some(first), Some(second)) = (contact(&self.world, a), contact(&self.world, b))
        else {
            return;
        };
        match collision::resolve(first, second) {
            Outcome::None => {}
            Outcome::KitPickup { kit, player } => self.pick_up_kit(kit, player),
            Outcome::CritterExplodes { critter } => self.explode_critter(critter),
            Outcome::ProjectileExplodes { projectile } => self.explode_projectile(projectile),
            Outcome::CritterAndProjectileExplode {
                critter,
                projectile,
            } => {
                self.explode_critter(critter);
                self.explode_projectile(projectile);
            }
            Outcome::BothProjectilesExplode { first, second } => {
                self.explode_projectile(first);
                self.explode_projectile(second);
            }
        }
    }

    fn pick_up_kit(&mut self, kit: u32, player: u32) {
        let grants = match self.world.entity(kit) {
            Some(entity) if !entity.is_destroyed() => entity
                .kit()
                .map(|k| (k.health_regeneration, k.energy_regeneration)),
            _ => None,
        };
        let Some((health, energy)) = grants else { return };
        if let Some(state) = self.world.entity_mut(player).and_then(|e| e.player_mut()) {
            state.restore_health(health);
            state.restore_energy(energy);
        }
        if let Some(entity) = self.world.entity_mut(kit) {
            entity.destroy();
        }
    }

    fn explode_projectile(&mut self, id: u32) {
        let state = match self.world.entity(id) {
            Some(entity) if !entity.is_destroyed() => match entity.projectile() {
                Some(projectile) => projectile.clone(),
                None => return,
            },
            _ => return,
        };
        let Some(position) = self.world.position_of(id) else {
            return;
        };
        if let Some(entity) = self.world.entity_mut(id) {
            entity.destroy();
        }
        match state.payload {
            crate::entity::ProjectilePayload::Rocket {
                explosion_radius,
                explosion_damage,
            } => {
                self.events.push(GameEvent {
                    kind: GameEventKind::Explosion,
                    x: position.x,
                    y: position.y,
                    entity: None,
                });
                self.apply_radial_damage(position, explosion_radius, explosion_damage, state.owner);
            }
            crate::entity::ProjectilePayload::Slime { morph_radius } => {
                self.pending_morphs.push((position, morph_radius));
            }
        }
    }

    fn explode_critter(&mut self, id: u32) {
        let params = match self.world.entity(id) {
            Some(entity) if !entity.is_destroyed() => entity
                .critter()
                .map(|c| (c.explosion_radius, c.damage)),
            _ => None,
        };
        let Some((radius, damage)) = params else { return };
        let Some(position) = self.world.position_of(id) else {
            return;
        };
        if let Some(entity) = self.world.entity_mut(id) {
            entity.destroy();
        }
        self.events.push(GameEvent {
            kind: GameEventKind::Explosion,
            x: position.x,
            y: position.y,
            entity: None,
        });
        self.apply_radial_damage(position, radius, damage, id);
    }

    /// Damages everything whose center lies within `radius` of `center`,
    /// the shooter included.
    fn apply_radial_damage(&mut self, center: Vec2, radius: f32, damage: i32, source: u32) {
        let hit: Vec<u32> = self
            .world
            .statics()
            .keys()
            .chain(self.world.dynamics().keys())
            .copied()
            .filter(|&id| {
                self.world
                    .position_of(id)
                    .map(|p| (p - center).norm() <= radius)
                    .unwrap_or(false)
            })
            .collect();
        for id in hit {
            if let Some(entity) = self.world.entity_mut(id) {
                entity.damage(damage, source);
            }
        }
    }

    // -- protocol callbacks -----------------------------------------------

    /// Creates a player entity at a random spawn point and returns its id.
    pub fn on_player_connected(&mut self) -> u32 {
        let spawn = self
            .world
            .spawn_points()
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or_else(|| Vec2::new(0.0, 0.0));
        let name = self.config.default_player.clone();
        let id = self.world.create_player(&self.config, &name, spawn);
        info!("Player {} entered at ({}, {})", id, spawn.x, spawn.y);
        self.on_entity_appeared(id);
        id
    }

    pub fn on_player_disconnected(&mut self, id: u32) {
        if let Some(entity) = self.world.entity_mut(id) {
            entity.destroy();
            info!("Player {} left", id);
        }
    }

    pub fn on_keyboard_event(&mut self, player_id: u32, event: KeyboardEvent) {
        if let Some(player) = self.world.entity_mut(player_id).and_then(|e| e.player_mut()) {
            player.keyboard.apply(&event);
        }
    }

    pub fn on_mouse_event(&mut self, player_id: u32, event: MouseEvent) {
        match event.kind {
            MouseEventKind::Move => {
                if let Some(position) = self.world.position_of(player_id) {
                    let offset = Vec2::new(event.x, event.y) - position;
                    if offset.norm() > f32::EPSILON {
                        self.world
                            .set_rotation_of(player_id, offset.y.atan2(offset.x));
                    }
                }
            }
            MouseEventKind::ButtonDown => {
                let gun = match event.button {
                    MouseButton::Left => self.config.primary_gun.clone(),
                    MouseButton::Right => self.config.secondary_gun.clone(),
                    MouseButton::None => return,
                };
                self.fire(player_id, &gun, Vec2::new(event.x, event.y));
            }
            MouseEventKind::ButtonUp => {}
        }
    }

    fn fire(&mut self, player_id: u32, gun: &str, target: Vec2) {
        let gun = self.config.gun(gun).clone();
        let Some(position) = self.world.position_of(player_id) else {
            return;
        };
        let paid = self
            .world
            .entity_mut(player_id)
            .and_then(|e| e.player_mut())
            .map(|p| p.consume_energy(gun.energy_consumption))
            .unwrap_or(false);
        if !paid {
            return;
        }
        self.world
            .create_projectile(&self.config, &gun.projectile, player_id, position, target);
    }

    /// Activation: the target must be an activator or a door within its
    /// activation distance of the player. Anything else is a silent no-op.
    pub fn on_player_action(&mut self, player_id: u32, action: PlayerAction) {
        let PlayerAction::Activate { target_id } = action;
        let Some(player_position) = self.world.position_of(player_id) else {
            return;
        };
        let Some(target_position) = self.world.position_of(target_id) else {
            return;
        };
        let reach = match self.world.entity(target_id) {
            Some(entity) => match (entity.activator(), entity.door()) {
                (Some(activator), _) => activator.activation_distance,
                (_, Some(door)) => door.activation_distance,
                _ => return,
            },
            None => return,
        };
        if (target_position - player_position).norm() > reach {
            return;
        }
        let mut toggled = None;
        if let Some(entity) = self.world.entity_mut(target_id) {
            if let Some(door) = entity.door_mut() {
                door.open = !door.open;
                toggled = Some(door.open);
                entity.mark_updated();
            } else {
                debug!("Player {} pressed activator {}", player_id, target_id);
            }
        }
        if let Some(open) = toggled {
            self.world.set_collision_enabled_of(target_id, !open);
            debug!(
                "Player {} {} door {}",
                player_id,
                if open { "opened" } else { "closed" },
                target_id
            );
        }
    }

    // -- targeting --------------------------------------------------------

    fn nearest_player(&self, from: Vec2) -> Option<u32> {
        let mut best: Option<(u32, f32)> = None;
        for (&id, entity) in self.world.dynamics() {
            if entity.player().is_none() {
                continue;
            }
            let Some(position) = self.world.position_of(id) else {
                continue;
            };
            let distance = (position - from).norm();
            if best.map(|(_, d)| distance < d).unwrap_or(true) {
                best = Some((id, distance));
            }
        }
        best.map(|(id, _)| id)
    }

    fn on_entity_appeared(&mut self, id: u32) {
        let Some(kind) = self.world.entity(id).map(|e| e.kind()) else {
            return;
        };
        match kind {
            EntityKind::Player => {
                let Some(player_position) = self.world.position_of(id) else {
                    return;
                };
                // The newcomer steals every critter it is now closest to.
                let mut retarget = Vec::new();
                for (&critter_id, entity) in self.world.dynamics() {
                    let Some(critter) = entity.critter() else { continue };
                    let Some(position) = self.world.position_of(critter_id) else {
                        continue;
                    };
                    let closer = match critter.target.and_then(|t| self.world.position_of(t)) {
                        Some(current) => {
                            (player_position - position).norm() < (current - position).norm()
                        }
                        None => true,
                    };
                    if closer {
                        retarget.push(critter_id);
                    }
                }
                for critter_id in retarget {
                    if let Some(critter) =
                        self.world.entity_mut(critter_id).and_then(|e| e.critter_mut())
                    {
                        critter.target = Some(id);
                    }
                }
            }
            EntityKind::Critter => {
                let target = self
                    .world
                    .position_of(id)
                    .and_then(|position| self.nearest_player(position));
                if let Some(critter) = self.world.entity_mut(id).and_then(|e| e.critter_mut()) {
                    critter.target = target;
                }
            }
            _ => {}
        }
    }

    fn on_entity_disappeared(&mut self, id: u32) {
        // Critters that were chasing the departed pick the nearest player
        // still standing.
        let orphaned: Vec<u32> = self
            .world
            .dynamics()
            .iter()
            .filter(|(_, e)| e.critter().map(|c| c.target == Some(id)).unwrap_or(false))
            .map(|(&critter_id, _)| critter_id)
            .collect();
        for critter_id in orphaned {
            let target = self
                .world
                .position_of(critter_id)
                .and_then(|position| self.nearest_player(position));
            if let Some(critter) = self.world.entity_mut(critter_id).and_then(|e| e.critter_mut()) {
                critter.target = target;
            }
        }
    }
}
