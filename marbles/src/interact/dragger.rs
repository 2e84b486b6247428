use cgmath::Vector2;
use hecs::Entity;
use rapier2d::prelude::*;
use toybox::api::{physics_entity_at_pos, EngineApi};

use crate::{
    object::{Angle, Marble, Position, SceneObject},
    utils::rotate_radians,
};

/// Spring constant and damping pulling dynamic objects toward the pointer
const DRAG_SPRING_K: f32 = 30.0;
const DRAG_DAMPING_B: f32 = 1.5;

/// Moves scene objects with a pointer given in pixels
pub struct Dragger {
    pixels_per_meter: f32,
    /// (object id that is dragged, grab point relative to the body in body local world units)
    dragged_object: Option<(Entity, Vector2<f32>)>,
}

impl Dragger {
    pub fn new(pixels_per_meter: f32) -> Dragger {
        Dragger {
            pixels_per_meter,
            dragged_object: None,
        }
    }

    pub fn dragged(&self) -> Option<Entity> {
        self.dragged_object.map(|(id, _)| id)
    }

    /// Grab point in world units for a body at `obj_pos` rotated by `obj_angle`
    pub fn drag_point(&self, obj_pos: Vector2<f32>, obj_angle: f32) -> Option<Vector2<f32>> {
        self.dragged_object
            .map(|(_, local)| rotate_radians(local, obj_angle) + obj_pos)
    }

    /// Starts dragging the scene object under `pointer`. Marbles cannot be grabbed.
    pub fn grab(&mut self, api: &EngineApi, pointer: Vector2<f32>) -> Option<Entity> {
        let world_pos = pointer / self.pixels_per_meter;
        self.dragged_object =
            physics_entity_at_pos(&api.physics_world, world_pos).and_then(|(rb, id)| {
                if api.ecs_world.get::<Marble>(id).is_ok()
                    || api.ecs_world.get::<SceneObject>(id).is_err()
                {
                    return None;
                }
                let translation = rb.position().translation;
                let diff = world_pos - Vector2::new(translation.x, translation.y);
                Some((id, rotate_radians(diff, -rb.rotation().angle())))
            });
        if let Some((id, _)) = self.dragged_object {
            debug!("Grabbed {:?}", id);
        }
        self.dragged()
    }

    /// Static objects follow the pointer exactly, dynamic ones are pulled by a damped spring
    pub fn drag_to(&mut self, api: &mut EngineApi, pointer: Vector2<f32>) {
        let (obj_id, local) = match self.dragged_object {
            Some(dragged) => dragged,
            None => return,
        };
        let target = pointer / self.pixels_per_meter;
        let EngineApi {
            ecs_world,
            physics_world,
            ..
        } = api;
        let is_static = match ecs_world.get::<SceneObject>(obj_id) {
            std::result::Result::Ok(object) => object.is_static,
            Err(_) => {
                self.dragged_object = None;
                return;
            }
        };
        let rb = match ecs_world.get::<RigidBodyHandle>(obj_id) {
            std::result::Result::Ok(rb) => *rb,
            Err(_) => return,
        };
        let rigid_body = match physics_world.physics.bodies.get_mut(rb) {
            Some(rigid_body) => rigid_body,
            None => return,
        };
        let angle = rigid_body.rotation().angle();
        if is_static {
            let new_pos = target - rotate_radians(local, angle);
            rigid_body.set_position(Isometry::new(vector![new_pos.x, new_pos.y], angle), true);
            if let std::result::Result::Ok(mut pos) = ecs_world.get_mut::<Position>(obj_id) {
                pos.0 = new_pos;
            }
        } else {
            let translation = rigid_body.position().translation;
            let current_pos = Vector2::new(translation.x, translation.y);
            let drag_pos = rotate_radians(local, angle) + current_pos;
            let offset_to_pointer = target - drag_pos;
            let prev_lin_vel = rigid_body.linvel().xy();
            let drag_force = vector![
                DRAG_SPRING_K * offset_to_pointer.x - DRAG_DAMPING_B * prev_lin_vel.x,
                DRAG_SPRING_K * offset_to_pointer.y - DRAG_DAMPING_B * prev_lin_vel.y
            ];
            rigid_body.reset_forces(false);
            rigid_body.add_force_at_point(drag_force, point![drag_pos.x, drag_pos.y], true);
            // Damp angular velocity
            let angvel = rigid_body.angvel();
            rigid_body.set_angvel(angvel * 0.95, false);
        }
    }

    /// Rotates the dragged object about its body origin
    pub fn rotate_by(&mut self, api: &mut EngineApi, radians: f32) {
        let obj_id = match self.dragged_object {
            Some((id, _)) => id,
            None => return,
        };
        let EngineApi {
            ecs_world,
            physics_world,
            ..
        } = api;
        let rb = match ecs_world.get::<RigidBodyHandle>(obj_id) {
            std::result::Result::Ok(rb) => *rb,
            Err(_) => return,
        };
        if let Some(rigid_body) = physics_world.physics.bodies.get_mut(rb) {
            let angle = rigid_body.rotation().angle() + radians;
            let translation = rigid_body.position().translation.vector;
            rigid_body.set_position(Isometry::new(translation, angle), true);
            if let std::result::Result::Ok(mut obj_angle) = ecs_world.get_mut::<Angle>(obj_id) {
                obj_angle.0 = angle;
            }
        }
    }

    pub fn release(&mut self, api: &mut EngineApi) {
        if let Some((id, _)) = self.dragged_object.take() {
            if let std::result::Result::Ok(rb) = api.ecs_world.get::<RigidBodyHandle>(id) {
                if let Some(rigid_body) = api.physics_world.physics.bodies.get_mut(*rb) {
                    rigid_body.reset_forces(true);
                }
            }
            debug!("Released {:?}", id);
        }
    }
}
