use hecs::{Entity, World};
use rapier2d::prelude::*;

use crate::{physics::PhysicsWorld, time::FrameClock};

/// Context through which apps access the ecs world, physics and time
pub struct EngineApi {
    pub ecs_world: World,
    pub physics_world: PhysicsWorld,
    pub time: FrameClock,
}

impl EngineApi {
    pub fn new(gravity: Vector<f32>) -> EngineApi {
        EngineApi {
            ecs_world: World::new(),
            physics_world: PhysicsWorld::new(gravity),
            time: FrameClock::default(),
        }
    }

    pub fn set_gravity(&mut self, gravity: Vector<f32>) {
        self.physics_world.physics.gravity = gravity;
    }
}

/// Rapier `user_data` value pointing back at an ecs entity
pub fn entity_user_data(entity: Entity) -> u128 {
    u64::from(entity.to_bits()) as u128
}

pub fn entity_from_user_data(user_data: u128) -> Option<Entity> {
    Entity::from_bits(user_data as u64)
}

pub fn remove_physics_entity(
    ecs_world: &mut World,
    physics_world: &mut PhysicsWorld,
    entity: Entity,
) {
    let rb = ecs_world.get::<RigidBodyHandle>(entity).ok().map(|rb| *rb);
    if let Some(rb) = rb {
        physics_world.remove_physics(rb);
    }
    if ecs_world.despawn(entity).is_err() {
        warn!("Tried to despawn missing entity {}", entity.id());
    }
}

pub fn physics_entity_at_pos(
    physics_world: &PhysicsWorld,
    world_pos: cgmath::Vector2<f32>,
) -> Option<(&RigidBody, Entity)> {
    physics_world
        .rigid_body_at_pos(world_pos)
        .and_then(|rb| entity_from_user_data(rb.user_data).map(|e| (rb, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_user_data_round_trip() {
        let mut world = World::new();
        let entity = world.spawn((1u32,));
        assert_eq!(entity_from_user_data(entity_user_data(entity)), Some(entity));
        assert_eq!(entity_from_user_data(0), None);
    }

    #[test]
    fn test_remove_physics_entity() {
        let mut api = EngineApi::new(vector![0.0, 9.81]);
        let entity = api.ecs_world.reserve_entity();
        let rb = api.physics_world.physics.bodies.insert(
            RigidBodyBuilder::new_dynamic()
                .user_data(entity_user_data(entity))
                .build(),
        );
        api.ecs_world.insert(entity, (rb,)).unwrap();
        let EngineApi {
            ecs_world,
            physics_world,
            ..
        } = &mut api;
        remove_physics_entity(ecs_world, physics_world, entity);
        assert!(!api.ecs_world.contains(entity));
        assert!(api.physics_world.physics.bodies.get(rb).is_none());
    }
}
