//! Gameplay collision resolution.
//!
//! Contact pairs come out of the physics step unordered. [`canonicalize`]
//! normalizes every pair into the canonical kind order (the declaration
//! order of [`EntityKind`]), and [`resolve`] maps the normalized pair to a
//! gameplay [`Outcome`]. Both are pure so every cell of the 7x7 matrix can
//! be checked directly; the controller executes the outcome against the
//! world.

use shared::EntityKind;

/// One side of a contact, with just enough context to resolve it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contact {
    pub id: u32,
    pub kind: EntityKind,
    /// For projectiles, the entity that fired them.
    pub projectile_owner: Option<u32>,
}

impl Contact {
    pub fn new(id: u32, kind: EntityKind) -> Self {
        Contact {
            id,
            kind,
            projectile_owner: None,
        }
    }

    pub fn projectile(id: u32, owner: u32) -> Self {
        Contact {
            id,
            kind: EntityKind::Projectile,
            projectile_owner: Some(owner),
        }
    }
}

/// What a contact means for the game, independent of reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    None,
    KitPickup { kit: u32, player: u32 },
    CritterExplodes { critter: u32 },
    ProjectileExplodes { projectile: u32 },
    CritterAndProjectileExplode { critter: u32, projectile: u32 },
    BothProjectilesExplode { first: u32, second: u32 },
}

/// Orders a pair canonically: by kind first, by id for equal kinds.
pub fn canonicalize(a: Contact, b: Contact) -> (Contact, Contact) {
    if (a.kind, a.id) <= (b.kind, b.id) {
        (a, b)
    } else {
        (b, a)
    }
}

pub fn resolve(a: Contact, b: Contact) -> Outcome {
    use EntityKind::*;
    let (first, second) = canonicalize(a, b);
    match (first.kind, second.kind) {
        (Kit, Player) => Outcome::KitPickup {
            kit: first.id,
            player: second.id,
        },
        (Critter, Player) | (Critter, Wall) => Outcome::CritterExplodes { critter: first.id },
        (Critter, Projectile) => Outcome::CritterAndProjectileExplode {
            critter: first.id,
            projectile: second.id,
        },
        (Projectile, Wall) => Outcome::ProjectileExplodes {
            projectile: first.id,
        },
        (Projectile, Projectile) => Outcome::BothProjectilesExplode {
            first: first.id,
            second: second.id,
        },
        // A projectile never detonates on its own shooter.
        (Player, Projectile) => {
            if second.projectile_owner == Some(first.id) {
                Outcome::None
            } else {
                Outcome::ProjectileExplodes {
                    projectile: second.id,
                }
            }
        }
        _ => Outcome::None,
    }
}
