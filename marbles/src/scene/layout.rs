use std::{fs, path::Path};

use anyhow::*;
use cgmath::Vector2;
use serde::{Deserialize, Serialize};
use toybox::api::EngineApi;

use crate::object::{Angle, ObjectKind, ObjectRoles, PlacementRequest, Position, SceneObject};

fn default_scale() -> f32 {
    1.0
}

fn default_true() -> bool {
    true
}

/// One placed sprite. Position is in pixels, rotation in radians.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutObject {
    pub name: String,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub rotation: f32,
    #[serde(default = "default_scale")]
    pub scale: f32,
    #[serde(default = "default_true")]
    pub is_static: bool,
    #[serde(default)]
    pub cup: bool,
    #[serde(default)]
    pub wastebasket: bool,
    #[serde(default)]
    pub bouncy: bool,
}

impl LayoutObject {
    pub fn new(name: &str, x: f32, y: f32) -> LayoutObject {
        LayoutObject {
            name: name.to_string(),
            x,
            y,
            rotation: 0.0,
            scale: default_scale(),
            is_static: true,
            cup: false,
            wastebasket: false,
            bouncy: false,
        }
    }

    pub fn roles(&self) -> ObjectRoles {
        ObjectRoles::from_flags(self.cup, self.wastebasket, self.bouncy)
    }

    pub fn to_request(&self, kind: ObjectKind) -> PlacementRequest {
        PlacementRequest {
            name: self.name.clone(),
            kind,
            roles: self.roles(),
            is_static: self.is_static,
            position: Vector2::new(self.x, self.y),
            rotation: self.rotation,
            scale: self.scale,
        }
    }
}

/// Flat list of placed objects, persisted as json
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Layout {
    pub objects: Vec<LayoutObject>,
}

impl Layout {
    /// `None` when there is no layout file
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Layout>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        let data =
            fs::read_to_string(path).with_context(|| format!("Failed to read layout {:?}", path))?;
        let layout: Layout =
            serde_json::from_str(&data).with_context(|| format!("Malformed layout {:?}", path))?;
        info!("Loaded layout with {} objects from {:?}", layout.objects.len(), path);
        Ok(Some(layout))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write layout {:?}", path))?;
        info!("Saved layout with {} objects to {:?}", self.objects.len(), path);
        Ok(())
    }

    pub fn default_layout() -> Layout {
        let mut plank = LayoutObject::new("plank", 560.0, 260.0);
        plank.rotation = 0.25;
        let mut label = LayoutObject::new("label", 760.0, 420.0);
        label.bouncy = true;
        let mut bin = LayoutObject::new("bin", 320.0, 620.0);
        bin.wastebasket = true;
        let mut cup = LayoutObject::new("cup", 940.0, 620.0);
        cup.cup = true;
        Layout {
            objects: vec![plank, label, bin, cup],
        }
    }

    /// Current placement of every scene object, in spawn order
    pub fn from_scene(api: &EngineApi, pixels_per_meter: f32) -> Layout {
        let mut objects = api
            .ecs_world
            .query::<(&SceneObject, &Position, &Angle)>()
            .iter()
            .map(|(id, (object, pos, angle))| {
                let pos = pos.0 * pixels_per_meter;
                (id.id(), LayoutObject {
                    name: object.name.clone(),
                    x: pos.x,
                    y: pos.y,
                    rotation: angle.0,
                    scale: object.scale,
                    is_static: object.is_static,
                    cup: object.roles.contains(ObjectRoles::CUP),
                    wastebasket: object.roles.contains(ObjectRoles::WASTEBASKET),
                    bouncy: object.roles.contains(ObjectRoles::BOUNCY),
                })
            })
            .collect::<Vec<(u32, LayoutObject)>>();
        objects.sort_by_key(|(id, _)| *id);
        Layout {
            objects: objects.into_iter().map(|(_, o)| o).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rapier2d::prelude::vector;

    use super::*;

    #[test]
    fn test_flags_default_when_absent() {
        let layout: Layout =
            serde_json::from_str(r#"{ "objects": [{ "name": "cup", "x": 10.0, "y": 20.0, "cup": true }] }"#)
                .unwrap();
        let cup = &layout.objects[0];
        assert_eq!(cup.scale, 1.0);
        assert!(cup.is_static);
        assert!(!cup.bouncy);
        assert_eq!(cup.roles(), ObjectRoles::CUP);
        let request = cup.to_request(ObjectKind::Image);
        assert_eq!(request.position, Vector2::new(10.0, 20.0));
    }

    #[test]
    fn test_save_and_load_file() {
        let path = std::env::temp_dir().join(format!("marbles_layout_{}.json", std::process::id()));
        let layout = Layout::default_layout();
        layout.save(&path).unwrap();
        assert_eq!(Layout::load(&path).unwrap(), Some(layout));
        fs::write(&path, "[").unwrap();
        assert!(Layout::load(&path).is_err());
        fs::remove_file(&path).unwrap();
        assert_eq!(Layout::load(&path).unwrap(), None);
    }

    #[test]
    fn test_from_scene_converts_to_pixels() {
        let mut api = EngineApi::new(vector![0.0, 9.81]);
        api.ecs_world.spawn((
            SceneObject {
                name: "plank".to_string(),
                kind: ObjectKind::Image,
                roles: ObjectRoles::BOUNCY,
                is_static: false,
                scale: 0.5,
            },
            Position(Vector2::new(2.0, 3.0)),
            Angle(0.1),
        ));
        let layout = Layout::from_scene(&api, 50.0);
        assert_eq!(layout.objects.len(), 1);
        let plank = &layout.objects[0];
        assert_eq!((plank.x, plank.y), (100.0, 150.0));
        assert!(plank.bouncy && !plank.is_static);
        assert_eq!(plank.scale, 0.5);
    }
}
