//! rapier2d glue.
//!
//! The simulation works in world units (pixels); rapier works in meters.
//! [`PHYSICS_SCALE`] world units make one meter, and the conversion happens
//! only inside [`Body`] accessors, so the rest of the server never sees
//! meters.
//!
//! Collider `user_data` packs the owning entity id (and, for projectiles,
//! the shooter's id) so that contact events and the solver hook can be
//! resolved back to entities without a side table.

use crate::config::{BodyConfig, ShapeConfig};
use rapier2d::math::Rotation;
use rapier2d::prelude::*;
use shared::EntityKind;

/// World units per physics meter.
pub const PHYSICS_SCALE: f32 = 16.0;

pub type Vec2 = rapier2d::na::Vector2<f32>;

const GROUP_ACTIVATOR: Group = Group::GROUP_1;
const GROUP_CRITTER: Group = Group::GROUP_2;
const GROUP_DOOR: Group = Group::GROUP_3;
const GROUP_KIT: Group = Group::GROUP_4;
const GROUP_PLAYER: Group = Group::GROUP_5;
const GROUP_PROJECTILE: Group = Group::GROUP_6;
const GROUP_WALL: Group = Group::GROUP_7;

fn membership(kind: EntityKind) -> Group {
    match kind {
        EntityKind::Activator => GROUP_ACTIVATOR,
        EntityKind::Critter => GROUP_CRITTER,
        EntityKind::Door => GROUP_DOOR,
        EntityKind::Kit => GROUP_KIT,
        EntityKind::Player => GROUP_PLAYER,
        EntityKind::Projectile => GROUP_PROJECTILE,
        EntityKind::Wall => GROUP_WALL,
    }
}

/// Kind-level physical filtering: critters and projectiles pass straight
/// over kits. Players still touch kits so pickups register.
fn interaction_groups(kind: EntityKind) -> InteractionGroups {
    let filter = match kind {
        EntityKind::Kit => Group::ALL & !(GROUP_CRITTER | GROUP_PROJECTILE),
        EntityKind::Critter | EntityKind::Projectile => Group::ALL & !GROUP_KIT,
        _ => Group::ALL,
    };
    InteractionGroups::new(membership(kind), filter)
}

fn pack_user_data(entity_id: u32, owner: Option<u32>) -> u128 {
    let owner_bits = match owner {
        Some(id) => id as u128 + 1,
        None => 0,
    };
    (owner_bits << 32) | entity_id as u128
}

fn entity_of(user_data: u128) -> u32 {
    (user_data & 0xffff_ffff) as u32
}

fn owner_of(user_data: u128) -> Option<u32> {
    match user_data >> 32 {
        0 => None,
        bits => Some((bits - 1) as u32),
    }
}

/// Suppresses solver contacts between a projectile and the entity that fired
/// it, so shots leave the shooter's body without detonating on it.
struct OwnerFilter;

impl PhysicsHooks for OwnerFilter {
    fn filter_contact_pair(&self, context: &PairFilterContext) -> Option<SolverFlags> {
        let a = context.colliders[context.collider1].user_data;
        let b = context.colliders[context.collider2].user_data;
        if owner_of(a) == Some(entity_of(b)) || owner_of(b) == Some(entity_of(a)) {
            return None;
        }
        Some(SolverFlags::COMPUTE_IMPULSES)
    }
}

/// Owns all rapier state for one game world.
pub struct PhysicsWorld {
    pipeline: PhysicsPipeline,
    gravity: Vector<Real>,
    integration_params: IntegrationParameters,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    hooks: OwnerFilter,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsWorld {
    pub fn new() -> Self {
        Self {
            pipeline: PhysicsPipeline::new(),
            // Top-down world, no gravity.
            gravity: vector![0.0, 0.0],
            integration_params: IntegrationParameters::default(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            hooks: OwnerFilter,
        }
    }

    /// Advances the simulation by one fixed slice and returns the entity id
    /// pairs whose contact began during it, sorted by (min, max) id so the
    /// dispatch order does not depend on rapier's internal channel order.
    pub fn step(&mut self, dt: f32) -> Vec<(u32, u32)> {
        self.integration_params.dt = dt;

        let (collision_send, collision_recv) =
            rapier2d::crossbeam::channel::unbounded::<CollisionEvent>();
        let (force_send, _force_recv) =
            rapier2d::crossbeam::channel::unbounded::<ContactForceEvent>();
        let event_handler = ChannelEventCollector::new(collision_send, force_send);

        self.pipeline.step(
            &self.gravity,
            &self.integration_params,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            None,
            &self.hooks,
            &event_handler,
        );

        let mut contacts = Vec::new();
        while let Ok(event) = collision_recv.try_recv() {
            if let CollisionEvent::Started(h1, h2, _flags) = event {
                let a = self.collider_set.get(h1).map(|c| entity_of(c.user_data));
                let b = self.collider_set.get(h2).map(|c| entity_of(c.user_data));
                if let (Some(a), Some(b)) = (a, b) {
                    contacts.push((a, b));
                }
            }
        }
        contacts.sort_by_key(|&(a, b)| (a.min(b), a.max(b)));
        contacts
    }
}

/// The rigid body (and its single collider) of one entity. Colliders are
/// attached to the body, so removing the body tears both down.
#[derive(Debug, Clone, Copy)]
pub struct Body {
    body_handle: RigidBodyHandle,
}

impl Body {
    pub fn create(
        physics: &mut PhysicsWorld,
        config: &BodyConfig,
        position: Vec2,
        entity_id: u32,
        kind: EntityKind,
        owner: Option<u32>,
    ) -> Body {
        let translation = position / PHYSICS_SCALE;
        let builder = if config.dynamic {
            RigidBodyBuilder::dynamic().lock_rotations()
        } else {
            RigidBodyBuilder::fixed()
        };
        let rigid_body = builder
            .translation(vector![translation.x, translation.y])
            .build();
        let body_handle = physics.rigid_body_set.insert(rigid_body);

        let shape = match config.shape {
            ShapeConfig::Box { width, height } => {
                ColliderBuilder::cuboid(width / 2.0 / PHYSICS_SCALE, height / 2.0 / PHYSICS_SCALE)
            }
            ShapeConfig::Circle { radius } => ColliderBuilder::ball(radius / PHYSICS_SCALE),
        };
        let collider = shape
            .density(1.0)
            .friction(0.0)
            .restitution(0.0)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .active_hooks(ActiveHooks::FILTER_CONTACT_PAIRS)
            .collision_groups(interaction_groups(kind))
            .user_data(pack_user_data(entity_id, owner))
            .build();
        physics.collider_set.insert_with_parent(
            collider,
            body_handle,
            &mut physics.rigid_body_set,
        );

        Body { body_handle }
    }

    pub fn destroy(self, physics: &mut PhysicsWorld) {
        physics.rigid_body_set.remove(
            self.body_handle,
            &mut physics.island_manager,
            &mut physics.collider_set,
            &mut physics.impulse_joint_set,
            &mut physics.multibody_joint_set,
            true,
        );
    }

    fn rigid_body<'a>(&self, physics: &'a PhysicsWorld) -> &'a RigidBody {
        &physics.rigid_body_set[self.body_handle]
    }

    fn rigid_body_mut<'a>(&self, physics: &'a mut PhysicsWorld) -> &'a mut RigidBody {
        &mut physics.rigid_body_set[self.body_handle]
    }

    pub fn position(&self, physics: &PhysicsWorld) -> Vec2 {
        self.rigid_body(physics).translation() * PHYSICS_SCALE
    }

    pub fn set_position(&self, physics: &mut PhysicsWorld, position: Vec2) {
        self.rigid_body_mut(physics)
            .set_translation(position / PHYSICS_SCALE, true);
    }

    pub fn rotation(&self, physics: &PhysicsWorld) -> f32 {
        self.rigid_body(physics).rotation().angle()
    }

    pub fn set_rotation(&self, physics: &mut PhysicsWorld, angle: f32) {
        self.rigid_body_mut(physics)
            .set_rotation(Rotation::new(angle), true);
    }

    pub fn velocity(&self, physics: &PhysicsWorld) -> Vec2 {
        self.rigid_body(physics).linvel() * PHYSICS_SCALE
    }

    pub fn set_velocity(&self, physics: &mut PhysicsWorld, velocity: Vec2) {
        self.rigid_body_mut(physics)
            .set_linvel(velocity / PHYSICS_SCALE, true);
    }

    pub fn mass(&self, physics: &PhysicsWorld) -> f32 {
        self.rigid_body(physics).mass()
    }

    pub fn apply_impulse(&self, physics: &mut PhysicsWorld, impulse: Vec2) {
        self.rigid_body_mut(physics)
            .apply_impulse(impulse / PHYSICS_SCALE, true);
    }

    /// Enables or disables the body's colliders without removing them.
    /// Open doors stop colliding but keep reporting their position.
    pub fn set_collision_enabled(&self, physics: &mut PhysicsWorld, enabled: bool) {
        let handles: Vec<ColliderHandle> = self.rigid_body(physics).colliders().to_vec();
        for handle in handles {
            if let Some(collider) = physics.collider_set.get_mut(handle) {
                collider.set_enabled(enabled);
            }
        }
    }

    /// Replaces the body's momentum outright: velocity becomes
    /// `impulse / mass`. Used for directly controlled movement (players,
    /// seeking critters) where residual momentum is unwanted.
    pub fn set_impulse(&self, physics: &mut PhysicsWorld, impulse: Vec2) {
        let mass = self.mass(physics);
        if mass > 0.0 {
            self.set_velocity(physics, impulse / mass);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn dynamic_circle() -> BodyConfig {
        BodyConfig {
            shape: ShapeConfig::Circle { radius: 12.0 },
            dynamic: true,
        }
    }

    #[test]
    fn test_user_data_packing() {
        assert_eq!(entity_of(pack_user_data(42, None)), 42);
        assert_eq!(owner_of(pack_user_data(42, None)), None);
        assert_eq!(entity_of(pack_user_data(42, Some(7))), 42);
        assert_eq!(owner_of(pack_user_data(42, Some(7))), Some(7));
        // Owner id 0 is distinguishable from "no owner".
        assert_eq!(owner_of(pack_user_data(1, Some(0))), Some(0));
        assert_eq!(
            owner_of(pack_user_data(u32::MAX, Some(u32::MAX))),
            Some(u32::MAX)
        );
    }

    #[test]
    fn test_position_scale_roundtrip() {
        let mut physics = PhysicsWorld::new();
        let body = Body::create(
            &mut physics,
            &dynamic_circle(),
            Vec2::new(48.0, -96.0),
            1,
            EntityKind::Player,
            None,
        );
        let position = body.position(&physics);
        assert_approx_eq!(position.x, 48.0, 1e-3);
        assert_approx_eq!(position.y, -96.0, 1e-3);

        body.set_position(&mut physics, Vec2::new(-16.0, 32.0));
        let position = body.position(&physics);
        assert_approx_eq!(position.x, -16.0, 1e-3);
        assert_approx_eq!(position.y, 32.0, 1e-3);
    }

    #[test]
    fn test_velocity_moves_body() {
        let mut physics = PhysicsWorld::new();
        let body = Body::create(
            &mut physics,
            &dynamic_circle(),
            Vec2::new(0.0, 0.0),
            1,
            EntityKind::Player,
            None,
        );
        body.set_velocity(&mut physics, Vec2::new(100.0, 0.0));
        for _ in 0..10 {
            physics.step(0.1);
        }
        let position = body.position(&physics);
        assert_approx_eq!(position.x, 100.0, 1.0);
        assert_approx_eq!(position.y, 0.0, 1.0);
    }

    #[test]
    fn test_set_impulse_sets_velocity() {
        let mut physics = PhysicsWorld::new();
        let body = Body::create(
            &mut physics,
            &dynamic_circle(),
            Vec2::new(0.0, 0.0),
            1,
            EntityKind::Critter,
            None,
        );
        let mass = body.mass(&physics);
        assert!(mass > 0.0);
        body.set_impulse(&mut physics, Vec2::new(mass * 60.0, 0.0));
        let velocity = body.velocity(&physics);
        assert_approx_eq!(velocity.x, 60.0, 1e-2);
    }

    #[test]
    fn test_step_reports_contact_pairs() {
        let mut physics = PhysicsWorld::new();
        let a = Body::create(
            &mut physics,
            &dynamic_circle(),
            Vec2::new(-40.0, 0.0),
            1,
            EntityKind::Player,
            None,
        );
        let _b = Body::create(
            &mut physics,
            &dynamic_circle(),
            Vec2::new(40.0, 0.0),
            2,
            EntityKind::Critter,
            None,
        );
        a.set_velocity(&mut physics, Vec2::new(200.0, 0.0));

        let mut seen = Vec::new();
        for _ in 0..60 {
            seen.extend(physics.step(1.0 / 60.0));
        }
        assert!(seen.contains(&(1, 2)), "contact never reported: {seen:?}");
    }

    #[test]
    fn test_rotation_accessors() {
        let mut physics = PhysicsWorld::new();
        let body = Body::create(
            &mut physics,
            &dynamic_circle(),
            Vec2::new(0.0, 0.0),
            1,
            EntityKind::Player,
            None,
        );
        body.set_rotation(&mut physics, 1.25);
        assert_approx_eq!(body.rotation(&physics), 1.25, 1e-4);
    }
}
