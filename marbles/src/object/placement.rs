use std::sync::Arc;

use anyhow::*;
use cgmath::Vector2;
use hecs::Entity;
use rapier2d::prelude::*;
use toybox::{
    api::{remove_physics_entity, EngineApi},
    physics::Physics,
};

use crate::{
    object::{
        collider_from_compound, collider_sensor_box, update_after_physics, Angle, BodyIndex,
        DebugCells, DynamicRigidbody, ObjectKind, ObjectRoles, Position, SceneObject,
        SpriteVisual, StaticRigidbody, BOUNCY_RESTITUTION,
    },
    settings::DebugConfig,
    shape::{synthesize_shape, AlphaCanvas, ShapeStrategy, SynthesisParams, SynthesizedShape},
};

const DEFAULT_RESTITUTION: f32 = 0.3;
/// Height of a cup's top sensor relative to the sprite height
const CUP_SENSOR_BAND: f32 = 0.2;
const CUP_SENSOR_MIN_BAND_PX: f32 = 4.0;

/// Where and how to instantiate one sprite
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementRequest {
    pub name: String,
    pub kind: ObjectKind,
    pub roles: ObjectRoles,
    pub is_static: bool,
    /// Body position in pixels
    pub position: Vector2<f32>,
    pub rotation: f32,
    pub scale: f32,
}

/// Shared inputs of every synthesis call in a scene
#[derive(Debug, Copy, Clone)]
pub struct SynthesisContext<'a> {
    pub params: &'a SynthesisParams,
    pub debug: &'a DebugConfig,
    pub pixels_per_meter: f32,
}

fn strategy_for(kind: ObjectKind) -> ShapeStrategy {
    match kind {
        ObjectKind::Image => ShapeStrategy::Grid,
        ObjectKind::Text => ShapeStrategy::Contour,
    }
}

fn display_size(canvas: &AlphaCanvas, scale: f32) -> Vector2<f32> {
    Vector2::new(
        canvas.width() as f32 * scale,
        canvas.height() as f32 * scale,
    )
}

/// Main collider plus the role sensors, all relative to the body origin
fn object_colliders(
    synthesized: &SynthesizedShape,
    roles: ObjectRoles,
    display_size: Vector2<f32>,
    pixels_per_meter: f32,
) -> Vec<Collider> {
    let restitution = if roles.contains(ObjectRoles::BOUNCY) {
        BOUNCY_RESTITUTION
    } else {
        DEFAULT_RESTITUTION
    };
    let mut colliders = vec![collider_from_compound(&synthesized.compound, restitution)];
    let sprite_center = -synthesized.compound.render_offset();
    if roles.contains(ObjectRoles::CUP) {
        let band = (display_size.y * CUP_SENSOR_BAND).max(CUP_SENSOR_MIN_BAND_PX);
        let center = sprite_center + Vector2::new(0.0, (band - display_size.y) * 0.5);
        let half_extents = Vector2::new(display_size.x * 0.4, band * 0.5);
        colliders.push(collider_sensor_box(
            center / pixels_per_meter,
            half_extents / pixels_per_meter,
        ));
    }
    if roles.contains(ObjectRoles::WASTEBASKET) {
        colliders.push(collider_sensor_box(
            sprite_center / pixels_per_meter,
            display_size * (0.45 / pixels_per_meter),
        ));
    }
    colliders
}

fn spawn_body(
    id: Entity,
    physics: &mut Physics,
    is_static: bool,
    position: Vector2<f32>,
    rotation: f32,
    lin_vel: Vector2<f32>,
    colliders: Vec<Collider>,
) -> RigidBodyHandle {
    if is_static {
        StaticRigidbody::spawn(
            id,
            &mut physics.bodies,
            &mut physics.colliders,
            position,
            rotation,
            colliders,
        )
    } else {
        DynamicRigidbody::spawn(
            id,
            &mut physics.bodies,
            &mut physics.colliders,
            position,
            lin_vel,
            rotation,
            colliders,
        )
    }
}

fn sprite_visual(canvas: Arc<AlphaCanvas>, size: Vector2<f32>, shape: &SynthesizedShape) -> SpriteVisual {
    SpriteVisual {
        canvas,
        display_size: size,
        render_offset: shape.compound.render_offset(),
        synthesized: shape.compound.synthesized,
    }
}

fn debug_cells(
    canvas: &AlphaCanvas,
    size: Vector2<f32>,
    shape: &SynthesizedShape,
    cell_size: u32,
) -> Option<DebugCells> {
    shape.cells.as_ref().map(|cells| DebugCells {
        cells: cells.clone(),
        cell_size,
        scale: Vector2::new(
            size.x / canvas.width() as f32,
            size.y / canvas.height() as f32,
        ),
    })
}

/// Synthesizes a body for `canvas` and places it at the requested pixel position and angle.
/// Synthesis failures produce a bounding box body, so only ecs bookkeeping can fail here.
pub fn create_and_position(
    api: &mut EngineApi,
    body_index: &mut BodyIndex,
    canvas: Arc<AlphaCanvas>,
    request: &PlacementRequest,
    ctx: SynthesisContext,
) -> Result<Entity> {
    let size = display_size(&canvas, request.scale);
    let shape = synthesize_shape(
        &canvas,
        strategy_for(request.kind),
        ctx.params,
        ctx.debug,
        size,
        ctx.pixels_per_meter,
    );
    let id = api.ecs_world.reserve_entity();
    let position = request.position / ctx.pixels_per_meter;
    let colliders = object_colliders(&shape, request.roles, size, ctx.pixels_per_meter);
    let rb = spawn_body(
        id,
        &mut api.physics_world.physics,
        request.is_static,
        position,
        request.rotation,
        Vector2::new(0.0, 0.0),
        colliders,
    );
    body_index.insert(rb, id);
    let cells = debug_cells(&canvas, size, &shape, ctx.params.cell_size);
    api.ecs_world
        .insert(id, (
            SceneObject {
                name: request.name.clone(),
                kind: request.kind,
                roles: request.roles,
                is_static: request.is_static,
                scale: request.scale,
            },
            rb,
            sprite_visual(canvas, size, &shape),
            Position(position),
            Angle(request.rotation),
        ))
        .map_err(|e| anyhow!("Failed to insert scene object {}: {}", request.name, e))?;
    if let Some(cells) = cells {
        api.ecs_world
            .insert_one(id, cells)
            .map_err(|e| anyhow!("Failed to insert debug cells: {}", e))?;
    }
    debug!(
        "Placed {} ({}, {} parts, {} mode{}) at ({:.1}, {:.1})",
        request.name,
        request.kind,
        shape.compound.part_count,
        shape.decision,
        if shape.compound.synthesized { "" } else { ", bounding box" },
        request.position.x,
        request.position.y
    );
    Ok(id)
}

/// Discards the object's body and synthesizes a new one from `canvas`, keeping the current body
/// position, angle and velocity.
pub fn rebuild(
    api: &mut EngineApi,
    body_index: &mut BodyIndex,
    entity: Entity,
    canvas: Arc<AlphaCanvas>,
    ctx: SynthesisContext,
) -> Result<()> {
    let object: SceneObject = (*api
        .ecs_world
        .get::<SceneObject>(entity)
        .map_err(|e| anyhow!("Cannot rebuild {:?}: {}", entity, e))?)
    .clone();
    let old_rb = *api
        .ecs_world
        .get::<RigidBodyHandle>(entity)
        .map_err(|e| anyhow!("Cannot rebuild {}: {}", object.name, e))?;
    let (position, rotation, lin_vel) = {
        let rb = api
            .physics_world
            .physics
            .bodies
            .get(old_rb)
            .with_context(|| format!("Body of {} is missing", object.name))?;
        let iso = rb.position();
        (
            Vector2::new(iso.translation.x, iso.translation.y),
            iso.rotation.angle(),
            Vector2::new(rb.linvel().x, rb.linvel().y),
        )
    };
    api.physics_world.remove_physics(old_rb);
    body_index.remove(old_rb);

    let size = display_size(&canvas, object.scale);
    let shape = synthesize_shape(
        &canvas,
        strategy_for(object.kind),
        ctx.params,
        ctx.debug,
        size,
        ctx.pixels_per_meter,
    );
    let colliders = object_colliders(&shape, object.roles, size, ctx.pixels_per_meter);
    let rb = spawn_body(
        entity,
        &mut api.physics_world.physics,
        object.is_static,
        position,
        rotation,
        lin_vel,
        colliders,
    );
    body_index.insert(rb, entity);
    let cells = debug_cells(&canvas, size, &shape, ctx.params.cell_size);
    api.ecs_world
        .insert(entity, (
            rb,
            sprite_visual(canvas, size, &shape),
            Position(position),
            Angle(rotation),
        ))
        .map_err(|e| anyhow!("Failed to update {}: {}", object.name, e))?;
    match cells {
        Some(cells) => {
            api.ecs_world
                .insert_one(entity, cells)
                .map_err(|e| anyhow!("Failed to update debug cells: {}", e))?;
        }
        None => {
            let _ = api.ecs_world.remove_one::<DebugCells>(entity);
        }
    }
    debug!(
        "Rebuilt {} with {} parts ({} mode)",
        object.name, shape.compound.part_count, shape.decision
    );
    Ok(())
}

/// Removes an object or marble together with its body
pub fn destroy(api: &mut EngineApi, body_index: &mut BodyIndex, entity: Entity) {
    if let std::result::Result::Ok(rb) = api.ecs_world.get::<RigidBodyHandle>(entity) {
        body_index.remove(*rb);
    }
    remove_physics_entity(&mut api.ecs_world, &mut api.physics_world, entity);
}

/// Copies body transforms into `Position` and `Angle`
pub fn update_transforms(api: &mut EngineApi) {
    let bodies = &api.physics_world.physics.bodies;
    for (_id, (rb, pos, angle)) in api
        .ecs_world
        .query_mut::<(&RigidBodyHandle, &mut Position, &mut Angle)>()
    {
        if let Some(body) = bodies.get(*rb) {
            update_after_physics(body, &mut pos.0, &mut angle.0);
        }
    }
}
