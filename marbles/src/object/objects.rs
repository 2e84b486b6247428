use std::{collections::HashMap, sync::Arc};

use bitflags::bitflags;
use cgmath::Vector2;
use hecs::Entity;
use rapier2d::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::shape::{AlphaCanvas, CollisionCell};

/// How a sprite's collision geometry is derived
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// Cut-out image, grid cell body
    Image,
    /// Rendered text label, traced polygon body
    Text,
}

impl Default for ObjectKind {
    fn default() -> Self {
        ObjectKind::Image
    }
}

bitflags! {
    /// Special gameplay roles of a scene object
    pub struct ObjectRoles: u32 {
        const CUP = 0b0000_0001;
        const WASTEBASKET = 0b0000_0010;
        const BOUNCY = 0b0000_0100;
    }
}

impl ObjectRoles {
    pub fn from_flags(cup: bool, wastebasket: bool, bouncy: bool) -> ObjectRoles {
        let mut roles = ObjectRoles::empty();
        roles.set(ObjectRoles::CUP, cup);
        roles.set(ObjectRoles::WASTEBASKET, wastebasket);
        roles.set(ObjectRoles::BOUNCY, bouncy);
        roles
    }
}

/// A draggable or static sprite owning exactly one rigid body
#[derive(Debug, Clone)]
pub struct SceneObject {
    /// Sprite asset name
    pub name: String,
    pub kind: ObjectKind,
    pub roles: ObjectRoles,
    pub is_static: bool,
    pub scale: f32,
}

/// What the renderer needs to draw an object's sprite
#[derive(Debug, Clone)]
pub struct SpriteVisual {
    pub canvas: Arc<AlphaCanvas>,
    /// Drawn size in pixels
    pub display_size: Vector2<f32>,
    /// Sprite center to body origin, display pixels
    pub render_offset: Vector2<f32>,
    /// False when the body is the bounding box fallback
    pub synthesized: bool,
}

/// Grid cells of the last synthesis, kept for the collision overlay
#[derive(Debug, Clone)]
pub struct DebugCells {
    pub cells: Vec<CollisionCell>,
    pub cell_size: u32,
    /// Raster to display pixels
    pub scale: Vector2<f32>,
}

/// Marks marble entities
#[derive(Debug, Copy, Clone)]
pub struct Marble {
    pub spawned_at_ms: f64,
}

/// Non-owning association from rigid bodies to the entities that own them.
/// Collision dispatch resolves bodies through this index only.
#[derive(Debug, Default)]
pub struct BodyIndex {
    entities: HashMap<RigidBodyHandle, Entity>,
}

impl BodyIndex {
    pub fn new() -> BodyIndex {
        BodyIndex::default()
    }

    pub fn insert(&mut self, body: RigidBodyHandle, entity: Entity) {
        if let Some(previous) = self.entities.insert(body, entity) {
            if previous != entity {
                warn!("Body {:?} moved from {:?} to {:?}", body, previous, entity);
            }
        }
    }

    pub fn remove(&mut self, body: RigidBodyHandle) -> Option<Entity> {
        self.entities.remove(&body)
    }

    pub fn entity(&self, body: RigidBodyHandle) -> Option<Entity> {
        self.entities.get(&body).copied()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn clear(&mut self) {
        self.entities.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use hecs::World;

    use super::*;

    #[test]
    fn test_roles_from_flags() {
        let roles = ObjectRoles::from_flags(true, false, true);
        assert!(roles.contains(ObjectRoles::CUP));
        assert!(!roles.contains(ObjectRoles::WASTEBASKET));
        assert!(roles.contains(ObjectRoles::BOUNCY));
        assert!(ObjectRoles::from_flags(false, false, false).is_empty());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ObjectKind::from_str("text").unwrap(), ObjectKind::Text);
        assert_eq!(ObjectKind::Image.to_string(), "image");
    }

    #[test]
    fn test_body_index_follows_rebuilds() {
        let mut world = World::new();
        let entity = world.spawn((0u8,));
        let mut bodies = RigidBodySet::new();
        let first = bodies.insert(RigidBodyBuilder::new_static().build());
        let second = bodies.insert(RigidBodyBuilder::new_static().build());
        let mut index = BodyIndex::new();
        index.insert(first, entity);
        assert_eq!(index.entity(first), Some(entity));
        assert_eq!(index.remove(first), Some(entity));
        index.insert(second, entity);
        assert_eq!(index.entity(first), None);
        assert_eq!(index.entity(second), Some(entity));
        assert_eq!(index.len(), 1);
    }
}
