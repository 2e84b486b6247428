use cgmath::Vector2;
use rapier2d::prelude::*;

pub struct Physics {
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    pub joints: JointSet,
    pub physics_pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: BroadPhase,
    pub narrow_phase: NarrowPhase,
    pub ccd_solver: CCDSolver,
    pub gravity: Vector<f32>,
    pub query_pipeline: QueryPipeline,
    pub integration_parameters: IntegrationParameters,
}

impl Default for Physics {
    fn default() -> Self {
        Physics::new(Vector::y() * 9.81)
    }
}

impl Physics {
    /// World with the given gravity. Screen space convention, so +y points down.
    pub fn new(gravity: Vector<f32>) -> Physics {
        Physics {
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            joints: JointSet::new(),
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: BroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            ccd_solver: CCDSolver::new(),
            gravity,
            query_pipeline: QueryPipeline::new(),
            integration_parameters: IntegrationParameters::default(),
        }
    }
}

/// A pair of colliders that started touching during the last step.
/// `sensor` is set when the pair was reported by a sensor intersection.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CollisionStart {
    pub collider1: ColliderHandle,
    pub collider2: ColliderHandle,
    pub sensor: bool,
}

pub struct PhysicsWorld {
    pub physics: Physics,
    event_handler: ChannelEventCollector,
    contact_recv: crossbeam::channel::Receiver<ContactEvent>,
    intersection_recv: crossbeam::channel::Receiver<IntersectionEvent>,
}

impl PhysicsWorld {
    pub fn new(gravity: Vector<f32>) -> PhysicsWorld {
        let (contact_send, contact_recv) = crossbeam::channel::unbounded();
        let (intersection_send, intersection_recv) = crossbeam::channel::unbounded();
        let event_handler = ChannelEventCollector::new(intersection_send, contact_send);
        PhysicsWorld {
            physics: Physics::new(gravity),
            event_handler,
            contact_recv,
            intersection_recv,
        }
    }

    /// Advances the simulation by one integration step and hands every collision that started
    /// during it to `collision_start_handler`. Stopped contacts and separations are dropped.
    pub fn step(&mut self, mut collision_start_handler: impl FnMut(CollisionStart)) {
        let Physics {
            gravity,
            integration_parameters,
            island_manager,
            broad_phase,
            narrow_phase,
            bodies,
            colliders,
            joints,
            ccd_solver,
            physics_pipeline,
            query_pipeline,
            ..
        } = &mut self.physics;
        physics_pipeline.step(
            gravity,
            integration_parameters,
            island_manager,
            broad_phase,
            narrow_phase,
            bodies,
            colliders,
            joints,
            ccd_solver,
            &(),
            &self.event_handler,
        );

        query_pipeline.update(island_manager, bodies, colliders);

        while let std::result::Result::Ok(intersection_event) = self.intersection_recv.try_recv() {
            if intersection_event.intersecting {
                collision_start_handler(CollisionStart {
                    collider1: intersection_event.collider1,
                    collider2: intersection_event.collider2,
                    sensor: true,
                });
            }
        }
        while let std::result::Result::Ok(contact_event) = self.contact_recv.try_recv() {
            if let ContactEvent::Started(collider1, collider2) = contact_event {
                collision_start_handler(CollisionStart {
                    collider1,
                    collider2,
                    sensor: false,
                });
            }
        }
    }

    /// Physics step length in seconds
    pub fn dt(&self) -> f32 {
        self.physics.integration_parameters.dt
    }

    pub fn remove_physics(&mut self, rb: RigidBodyHandle) {
        let Physics {
            bodies,
            island_manager,
            colliders,
            joints,
            ..
        } = &mut self.physics;
        bodies.remove(rb, island_manager, colliders, joints);
    }

    /// Handle of the rigid body whose colliders contain `world_pos`
    pub fn rigid_body_handle_at_pos(&self, world_pos: Vector2<f32>) -> Option<RigidBodyHandle> {
        let Physics {
            colliders,
            query_pipeline,
            ..
        } = &self.physics;
        let ray = Ray::new(point![world_pos.x, world_pos.y], vector![0.0, 1.0]);
        let max_toi = 0.0;
        let solid = true;
        let groups = InteractionGroups::all();
        let filter = None;

        query_pipeline
            .cast_ray(colliders, &ray, max_toi, solid, groups, filter)
            .and_then(|(handle, _toi)| colliders.get(handle))
            .and_then(|collider| collider.parent())
    }

    pub fn rigid_body_at_pos(&self, world_pos: Vector2<f32>) -> Option<&RigidBody> {
        self.rigid_body_handle_at_pos(world_pos)
            .and_then(|handle| self.physics.bodies.get(handle))
    }

    /// Parent body of a collider, if it still exists
    pub fn collider_parent(&self, collider: ColliderHandle) -> Option<RigidBodyHandle> {
        self.physics
            .colliders
            .get(collider)
            .and_then(|c| c.parent())
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        PhysicsWorld::new(Vector::y() * 9.81)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_reports_ball_entering_once() {
        let mut world = PhysicsWorld::new(Vector::y() * 9.81);
        let Physics {
            bodies,
            colliders,
            ..
        } = &mut world.physics;
        let sensor_body = bodies.insert(
            RigidBodyBuilder::new_static()
                .translation(vector![0.0, 2.0])
                .build(),
        );
        let sensor = colliders.insert_with_parent(
            ColliderBuilder::cuboid(2.0, 0.25)
                .sensor(true)
                .active_events(ActiveEvents::INTERSECTION_EVENTS)
                .build(),
            sensor_body,
            bodies,
        );
        let ball_body = bodies.insert(
            RigidBodyBuilder::new_dynamic()
                .translation(vector![0.0, 0.0])
                .build(),
        );
        let ball = colliders.insert_with_parent(
            ColliderBuilder::ball(0.1)
                .active_events(ActiveEvents::INTERSECTION_EVENTS)
                .build(),
            ball_body,
            bodies,
        );
        let mut starts = vec![];
        for _ in 0..120 {
            world.step(|start| starts.push(start));
        }
        let sensor_starts = starts
            .iter()
            .filter(|s| {
                s.sensor
                    && ((s.collider1, s.collider2) == (sensor, ball)
                        || (s.collider1, s.collider2) == (ball, sensor))
            })
            .count();
        assert_eq!(sensor_starts, 1);
    }
}
