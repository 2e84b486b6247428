use cgmath::Vector2;
use hecs::Entity;
use rapier2d::prelude::*;
use toybox::api::entity_user_data;

use crate::shape::CompoundShape;

/// Restitution that makes bouncy objects return more energy than they receive
pub const BOUNCY_RESTITUTION: f32 = 1.2;

/// Main collider of a scene object from its synthesized compound shape
pub fn collider_from_compound(compound: &CompoundShape, restitution: f32) -> Collider {
    ColliderBuilder::new(compound.shape.clone())
        .restitution(restitution)
        .restitution_combine_rule(CoefficientCombineRule::Max)
        .friction(0.4)
        .active_collision_types(ActiveCollisionTypes::default())
        .active_events(ActiveEvents::CONTACT_EVENTS)
        .build()
}

/// Massless box sensor at `center` (body local, world units)
pub fn collider_sensor_box(center: Vector2<f32>, half_extents: Vector2<f32>) -> Collider {
    ColliderBuilder::cuboid(half_extents.x.max(1e-3), half_extents.y.max(1e-3))
        .translation(vector![center.x, center.y])
        .sensor(true)
        .density(0.0)
        .active_events(ActiveEvents::INTERSECTION_EVENTS)
        .build()
}

pub fn collider_marble(radius: f32, restitution: f32, density: f32) -> Collider {
    ColliderBuilder::ball(radius)
        .restitution(restitution)
        .density(density)
        .friction(0.2)
        .active_events(ActiveEvents::CONTACT_EVENTS | ActiveEvents::INTERSECTION_EVENTS)
        .build()
}

fn insert_with_colliders(
    rigid_body: RigidBody,
    bodies: &mut RigidBodySet,
    collider_set: &mut ColliderSet,
    colliders: Vec<Collider>,
) -> RigidBodyHandle {
    let rigid_body_handle = bodies.insert(rigid_body);
    for collider in colliders {
        collider_set.insert_with_parent(collider, rigid_body_handle, bodies);
    }
    rigid_body_handle
}

#[derive(Debug)]
pub struct DynamicRigidbody;

impl DynamicRigidbody {
    pub fn spawn(
        id: Entity,
        bodies: &mut RigidBodySet,
        collider_set: &mut ColliderSet,
        position: Vector2<f32>,
        lin_vel: Vector2<f32>,
        rotation: f32,
        colliders: Vec<Collider>,
    ) -> RigidBodyHandle {
        let rigid_body = RigidBodyBuilder::new_dynamic()
            .translation(vector![position.x, position.y])
            .rotation(rotation)
            .linvel(vector![lin_vel.x, lin_vel.y])
            .user_data(entity_user_data(id))
            .build();
        insert_with_colliders(rigid_body, bodies, collider_set, colliders)
    }
}

/// Fast small bodies, continuous collision detection keeps them from tunneling through thin sprites
#[derive(Debug)]
pub struct MarbleRigidbody;

impl MarbleRigidbody {
    pub fn spawn(
        id: Entity,
        bodies: &mut RigidBodySet,
        collider_set: &mut ColliderSet,
        position: Vector2<f32>,
        collider: Collider,
    ) -> RigidBodyHandle {
        let rigid_body = RigidBodyBuilder::new_dynamic()
            .translation(vector![position.x, position.y])
            .ccd_enabled(true)
            .user_data(entity_user_data(id))
            .build();
        insert_with_colliders(rigid_body, bodies, collider_set, vec![collider])
    }
}

#[derive(Debug)]
pub struct StaticRigidbody;

impl StaticRigidbody {
    pub fn spawn(
        id: Entity,
        bodies: &mut RigidBodySet,
        collider_set: &mut ColliderSet,
        position: Vector2<f32>,
        rotation: f32,
        colliders: Vec<Collider>,
    ) -> RigidBodyHandle {
        let rigid_body = RigidBodyBuilder::new_static()
            .translation(vector![position.x, position.y])
            .rotation(rotation)
            .user_data(entity_user_data(id))
            .build();
        insert_with_colliders(rigid_body, bodies, collider_set, colliders)
    }
}

/// Body position in world units
#[derive(Debug, Copy, Clone)]
pub struct Position(pub Vector2<f32>);

#[derive(Debug, Copy, Clone)]
pub struct Angle(pub f32);

/// Utility function to read the transform of a body after physics
pub(crate) fn update_after_physics(rb: &RigidBody, pos: &mut Vector2<f32>, angle: &mut f32) {
    if rb.is_sleeping() {
        return;
    }
    let phys_pos = rb.position();
    *pos = Vector2::new(phys_pos.translation.x, phys_pos.translation.y);
    *angle = phys_pos.rotation.angle();
}
