use std::{
    collections::{BTreeMap, BTreeSet},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use anyhow::*;
use cgmath::Vector2;
use hecs::Entity;
use toybox::{
    api::EngineApi,
    assets::{AssetEvent, AssetLoader, AssetState},
    physics::CollisionStart,
};

use crate::{
    config::SceneConfig,
    interact::Dragger,
    object::{
        create_and_position, destroy, rebuild, update_transforms, BodyIndex, Marble, ObjectRoles,
        PlacementRequest, Position, SceneObject, SynthesisContext,
    },
    scene::{GamePhase, Layout, MarbleSpawner, ScoreBoard},
    settings::DebugConfig,
    shape::{AlphaCanvas, RasterImage, SpriteCache},
};

/// What a collision start meant for the game
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MarbleEvent {
    EnteredCup(Entity),
    EnteredWastebasket(Entity),
}

fn decode_raster(bytes: &[u8]) -> Result<RasterImage> {
    RasterImage::from_file_bytes(bytes)
}

fn synthesis_context<'a>(config: &'a SceneConfig, debug: &'a DebugConfig) -> SynthesisContext<'a> {
    SynthesisContext {
        params: &config.synthesis,
        debug,
        pixels_per_meter: config.pixels_per_meter,
    }
}

/// A running scene: sprites, their bodies, marbles and score
pub struct Scene {
    pub config: SceneConfig,
    asset_root: PathBuf,
    images: AssetLoader<RasterImage>,
    sprites: SpriteCache,
    /// Placements waiting for their sprite to finish loading
    awaiting: BTreeMap<String, Vec<PlacementRequest>>,
    pub body_index: BodyIndex,
    pub score: ScoreBoard,
    spawner: MarbleSpawner,
    dragger: Dragger,
    /// Last pointer position in pixels while a button is held
    pointer: Option<Vector2<f32>>,
}

impl Scene {
    pub fn new(config: SceneConfig, asset_root: impl Into<PathBuf>) -> Scene {
        let spawner = MarbleSpawner::new(
            config.marbles,
            config.spawn_point,
            config.scoring.final_burst,
        );
        let dragger = Dragger::new(config.pixels_per_meter);
        Scene {
            config,
            asset_root: asset_root.into(),
            images: AssetLoader::new(decode_raster),
            sprites: SpriteCache::new(),
            awaiting: BTreeMap::new(),
            body_index: BodyIndex::new(),
            score: ScoreBoard::new(),
            spawner,
            dragger,
            pointer: None,
        }
    }

    /// Starts loading every sprite of the scene
    pub fn request_assets(&mut self) {
        for sprite in self.config.sprites.iter() {
            self.images
                .request(&sprite.name, self.asset_root.join(&sprite.path));
        }
    }

    /// Registers a sprite raster produced in code instead of loaded from disk
    pub fn insert_raster(&mut self, name: &str, raster: RasterImage) {
        self.images.insert(name, raster);
    }

    pub fn pending_placements(&self) -> usize {
        self.awaiting.values().map(|v| v.len()).sum()
    }

    fn canvas_for(&mut self, name: &str, raster: &RasterImage) -> Option<Arc<AlphaCanvas>> {
        let key_background = self.config.sprite(name)?.key_background;
        Some(self.sprites.canvas_for(
            name,
            raster,
            self.config.synthesis.key_tolerance,
            key_background,
        ))
    }

    fn instantiate(
        &mut self,
        api: &mut EngineApi,
        request: &PlacementRequest,
        raster: &RasterImage,
        debug: &DebugConfig,
    ) -> Result<Option<Entity>> {
        let canvas = match self.canvas_for(&request.name, raster) {
            Some(canvas) => canvas,
            None => {
                error!("No sprite named {} in scene {}", request.name, self.config.name);
                return Ok(None);
            }
        };
        create_and_position(
            api,
            &mut self.body_index,
            canvas,
            request,
            synthesis_context(&self.config, debug),
        )
        .map(Some)
    }

    /// Instantiates the placement now if its sprite is loaded, otherwise once the sprite arrives.
    /// Placements of sprites that failed to load are dropped.
    pub fn place(
        &mut self,
        api: &mut EngineApi,
        request: PlacementRequest,
        debug: &DebugConfig,
    ) -> Result<Option<Entity>> {
        let sprite_path = match self.config.sprite(&request.name) {
            Some(sprite) => self.asset_root.join(&sprite.path),
            None => {
                error!("Layout references unknown sprite {}", request.name);
                return Ok(None);
            }
        };
        if !self.images.is_requested(&request.name) {
            self.images.request(&request.name, sprite_path);
        }
        match self.images.state(&request.name) {
            Some(AssetState::Ready(raster)) => {
                let raster = raster.clone();
                self.instantiate(api, &request, &raster, debug)
            }
            Some(AssetState::Failed) => {
                error!("Sprite {} failed to load, not placing it", request.name);
                Ok(None)
            }
            _ => {
                self.awaiting
                    .entry(request.name.clone())
                    .or_insert_with(Vec::new)
                    .push(request);
                Ok(None)
            }
        }
    }

    pub fn place_layout(
        &mut self,
        api: &mut EngineApi,
        layout: &Layout,
        debug: &DebugConfig,
    ) -> Result<()> {
        for object in layout.objects.iter() {
            let kind = match self.config.sprite(&object.name) {
                Some(sprite) => sprite.kind,
                None => {
                    error!("Layout references unknown sprite {}", object.name);
                    continue;
                }
            };
            self.place(api, object.to_request(kind), debug)?;
        }
        info!(
            "Placed layout of {} objects, {} waiting for sprites",
            layout.objects.len(),
            self.pending_placements()
        );
        Ok(())
    }

    /// Instantiates every placement waiting on a finished load. Returns the number created.
    pub fn handle_asset_events(
        &mut self,
        api: &mut EngineApi,
        events: Vec<AssetEvent<RasterImage>>,
        debug: &DebugConfig,
    ) -> Result<usize> {
        let mut created = 0;
        for event in events {
            match event {
                AssetEvent::Loaded(name, raster) => {
                    for request in self.awaiting.remove(&name).unwrap_or_default() {
                        if self.instantiate(api, &request, &raster, debug)?.is_some() {
                            created += 1;
                        }
                    }
                }
                AssetEvent::Failed(name) => {
                    if let Some(dropped) = self.awaiting.remove(&name) {
                        error!("Dropping {} placements of {}", dropped.len(), name);
                    }
                }
            }
        }
        Ok(created)
    }

    /// Non blocking, called every frame
    pub fn poll_assets(&mut self, api: &mut EngineApi, debug: &DebugConfig) -> Result<usize> {
        let events = self.images.poll();
        self.handle_asset_events(api, events, debug)
    }

    /// Blocks until all requested sprites are loaded or `timeout` passes
    pub fn wait_for_assets(
        &mut self,
        api: &mut EngineApi,
        timeout: Duration,
        debug: &DebugConfig,
    ) -> Result<usize> {
        let events = self.images.wait_all(timeout);
        self.handle_asset_events(api, events, debug)
    }

    /// Rekeys every sprite and resynthesizes every scene object body in place.
    /// An object that fails to rebuild is logged and skipped. Returns how many were rebuilt.
    pub fn rebuild_all(&mut self, api: &mut EngineApi, debug: &DebugConfig) -> usize {
        self.sprites.invalidate_all();
        let objects = api
            .ecs_world
            .query::<&SceneObject>()
            .iter()
            .map(|(id, object)| (id, object.name.clone()))
            .collect::<Vec<(Entity, String)>>();
        let mut rebuilt = 0;
        for (id, name) in objects {
            let raster = match self.images.get(&name) {
                Some(raster) => raster,
                None => continue,
            };
            let canvas = match self.canvas_for(&name, &raster) {
                Some(canvas) => canvas,
                None => continue,
            };
            let ctx = synthesis_context(&self.config, debug);
            match rebuild(api, &mut self.body_index, id, canvas, ctx) {
                std::result::Result::Ok(()) => rebuilt += 1,
                Err(e) => warn!("Skipped rebuilding {} ({:?}): {:#}", name, id, e),
            }
        }
        info!("Rebuilt {} bodies", rebuilt);
        rebuilt
    }

    /// Resolves a collision start to a marble entering a cup or wastebasket sensor
    pub fn classify_collision(&self, api: &EngineApi, start: &CollisionStart) -> Option<MarbleEvent> {
        if !start.sensor {
            return None;
        }
        let entity_of = |collider| {
            api.physics_world
                .collider_parent(collider)
                .and_then(|rb| self.body_index.entity(rb))
        };
        let first = entity_of(start.collider1)?;
        let second = entity_of(start.collider2)?;
        let is_marble = |id: Entity| api.ecs_world.get::<Marble>(id).is_ok();
        let (marble, other) = if is_marble(first) {
            (first, second)
        } else if is_marble(second) {
            (second, first)
        } else {
            return None;
        };
        let roles = api.ecs_world.get::<SceneObject>(other).ok()?.roles;
        if roles.contains(ObjectRoles::CUP) {
            Some(MarbleEvent::EnteredCup(marble))
        } else if roles.contains(ObjectRoles::WASTEBASKET) {
            Some(MarbleEvent::EnteredWastebasket(marble))
        } else {
            None
        }
    }

    fn apply_marble_event(&mut self, api: &mut EngineApi, event: MarbleEvent) {
        match event {
            MarbleEvent::EnteredCup(marble) => {
                if self.score.on_cup_entry() {
                    destroy(api, &mut self.body_index, marble);
                }
            }
            MarbleEvent::EnteredWastebasket(marble) => {
                self.score.on_wasted();
                destroy(api, &mut self.body_index, marble);
            }
        }
    }

    fn remove_lost_marbles(&mut self, api: &mut EngineApi) {
        let ppm = self.config.pixels_per_meter;
        let area = self.config.play_area;
        let lost = api
            .ecs_world
            .query::<(&Marble, &Position)>()
            .iter()
            .filter(|(_, (_, pos))| !area.contains(pos.0 * ppm))
            .map(|(id, _)| id)
            .collect::<Vec<Entity>>();
        for id in lost {
            self.score.on_lost();
            destroy(api, &mut self.body_index, id);
        }
    }

    pub fn alive_marbles(&self, api: &EngineApi) -> usize {
        api.ecs_world.query::<&Marble>().iter().count()
    }

    /// One fixed step: physics, collision dispatch, marble bookkeeping and spawning
    pub fn step(&mut self, api: &mut EngineApi) -> Result<()> {
        if let Some(pointer) = self.pointer {
            self.dragger.drag_to(api, pointer);
        }
        let mut starts = vec![];
        api.physics_world.step(|start| starts.push(start));
        let mut handled = BTreeSet::new();
        for start in starts.iter() {
            if let Some(event) = self.classify_collision(api, start) {
                let marble = match event {
                    MarbleEvent::EnteredCup(id) | MarbleEvent::EnteredWastebasket(id) => id,
                };
                // A marble may touch several sensors in one step, only the first counts
                if !handled.insert(marble.id()) || !api.ecs_world.contains(marble) {
                    continue;
                }
                self.apply_marble_event(api, event);
            }
        }
        update_transforms(api);
        self.remove_lost_marbles(api);

        let dt = api.physics_world.dt();
        let alive = self.alive_marbles(api);
        if self.spawner.due(dt, self.score.phase, alive) {
            self.spawner
                .spawn(api, &mut self.body_index, self.config.pixels_per_meter)?;
            self.score.on_spawn();
        }
        Ok(())
    }

    /// Final burst released and every marble gone
    pub fn is_finished(&self, api: &EngineApi) -> bool {
        self.score.phase == GamePhase::Final
            && self.spawner.burst_remaining() == Some(0)
            && self.alive_marbles(api) == 0
    }

    pub fn layout(&self, api: &EngineApi) -> Layout {
        Layout::from_scene(api, self.config.pixels_per_meter)
    }

    /// Pointer pressed at `pointer` pixels, grabs the scene object under it if any
    pub fn press_pointer(&mut self, api: &EngineApi, pointer: Vector2<f32>) -> Option<Entity> {
        self.pointer = Some(pointer);
        self.dragger.grab(api, pointer)
    }

    /// The held object is pulled towards the latest pointer position on every step
    pub fn move_pointer(&mut self, pointer: Vector2<f32>) {
        if self.pointer.is_some() {
            self.pointer = Some(pointer);
        }
    }

    pub fn rotate_held(&mut self, api: &mut EngineApi, radians: f32) {
        self.dragger.rotate_by(api, radians);
    }

    pub fn release_pointer(&mut self, api: &mut EngineApi) {
        self.pointer = None;
        self.dragger.release(api);
    }

    pub fn held(&self) -> Option<Entity> {
        self.dragger.dragged()
    }
}

#[cfg(test)]
mod tests {
    use rapier2d::prelude::{vector, Point, RigidBodyHandle};

    use super::*;
    use crate::{
        config::{MarbleParams, ScoringRules, SpriteAsset},
        object::{ObjectKind, SpriteVisual},
        scene::LayoutObject,
        shape::SolidityMode,
    };

    /// 40x30 cup: 4 px walls and a 6 px floor, open at the top
    fn cup_raster() -> RasterImage {
        let (w, h) = (40u32, 30u32);
        let mut data = vec![0u8; (w * h * 4) as usize];
        for y in 0..h {
            for x in 0..w {
                if x < 4 || x >= 36 || y >= 24 {
                    let i = ((y * w + x) * 4) as usize;
                    data[i..i + 4].copy_from_slice(&[120, 60, 20, 255]);
                }
            }
        }
        RasterImage::new(w, h, data).unwrap()
    }

    fn cup_scene() -> (Scene, EngineApi) {
        let config = SceneConfig {
            spawn_point: Vector2::new(100.0, 100.0),
            marbles: MarbleParams {
                spawn_interval_secs: 0.1,
                jitter: 0.0,
                ..MarbleParams::default()
            },
            scoring: ScoringRules {
                final_burst: 3,
            },
            sprites: vec![SpriteAsset::new("cup", "sprites/cup.png", ObjectKind::Image, false)],
            ..SceneConfig::default()
        };
        let mut api = EngineApi::new(vector![0.0, config.gravity]);
        api.physics_world.physics.integration_parameters.dt = 1.0 / 60.0;
        let mut scene = Scene::new(config, "/nonexistent");
        scene.insert_raster("cup", cup_raster());
        let mut cup = LayoutObject::new("cup", 100.0, 200.0);
        cup.cup = true;
        scene
            .place_layout(&mut api, &Layout {
                objects: vec![cup],
            }, &DebugConfig::default())
            .unwrap();
        (scene, api)
    }

    #[test]
    fn test_first_cup_entry_switches_to_final_once() {
        let (mut scene, mut api) = cup_scene();
        assert_eq!(scene.score.phase, GamePhase::Single);
        let mut entered_final_at = None;
        for frame in 0..400 {
            scene.step(&mut api).unwrap();
            if entered_final_at.is_none() && scene.score.phase == GamePhase::Final {
                entered_final_at = Some(frame);
                // The scoring marble is gone, only the first burst marble exists
                assert_eq!(scene.alive_marbles(&api), 1);
                assert_eq!(scene.score.marbles_spawned, 2);
            }
        }
        assert!(entered_final_at.is_some());
        assert_eq!(scene.score.phase, GamePhase::Final);
        assert_eq!(scene.score.score, 1);
        assert_eq!(scene.score.marbles_spawned, 4);
        assert_eq!(scene.score.marbles_wasted, 0);
        // Burst marbles reaching the cup do not score or disappear
        assert_eq!(
            scene.alive_marbles(&api) as u32 + scene.score.marbles_lost,
            3
        );
    }

    #[test]
    fn test_placement_waits_for_asset() {
        let config = SceneConfig {
            sprites: vec![SpriteAsset::new("cup", "missing.png", ObjectKind::Image, false)],
            ..SceneConfig::default()
        };
        let mut api = EngineApi::new(vector![0.0, 9.81]);
        let mut scene = Scene::new(config, "/nonexistent");
        let debug = DebugConfig::default();
        let request = LayoutObject::new("cup", 10.0, 10.0).to_request(ObjectKind::Image);
        // Pending until the loader reports back
        scene.awaiting.insert("cup".to_string(), vec![request.clone(), request]);
        let raster = Arc::new(cup_raster());
        let created = scene
            .handle_asset_events(&mut api, vec![AssetEvent::Loaded("cup".to_string(), raster)], &debug)
            .unwrap();
        assert_eq!(created, 2);
        assert_eq!(scene.pending_placements(), 0);
        assert_eq!(scene.body_index.len(), 2);
    }

    #[test]
    fn test_failed_asset_drops_placements() {
        let config = SceneConfig {
            sprites: vec![SpriteAsset::new("cup", "missing.png", ObjectKind::Image, false)],
            ..SceneConfig::default()
        };
        let mut api = EngineApi::new(vector![0.0, 9.81]);
        let mut scene = Scene::new(config, "/nonexistent");
        let debug = DebugConfig::default();
        let request = LayoutObject::new("cup", 10.0, 10.0).to_request(ObjectKind::Image);
        assert_eq!(scene.place(&mut api, request, &debug).unwrap(), None);
        assert_eq!(scene.pending_placements(), 1);
        scene
            .wait_for_assets(&mut api, Duration::from_secs(5), &debug)
            .unwrap();
        assert_eq!(scene.pending_placements(), 0);
        assert!(scene.body_index.is_empty());
        let unknown = LayoutObject::new("ghost", 0.0, 0.0).to_request(ObjectKind::Image);
        assert_eq!(scene.place(&mut api, unknown, &debug).unwrap(), None);
    }

    #[test]
    fn test_rebuild_all_in_rgb_mode_keeps_transform() {
        let (mut scene, mut api) = cup_scene();
        let (id, before) = {
            let (id, rb) = api
                .ecs_world
                .query::<(&SceneObject, &RigidBodyHandle)>()
                .iter()
                .map(|(id, (_, rb))| (id, *rb))
                .next()
                .unwrap();
            (id, *api.physics_world.physics.bodies[rb].position())
        };
        let debug = DebugConfig {
            solidity_mode: SolidityMode::Rgb,
            ..DebugConfig::default()
        };
        assert_eq!(scene.rebuild_all(&mut api, &debug), 1);
        let rb = *api.ecs_world.get::<RigidBodyHandle>(id).unwrap();
        assert_eq!(*api.physics_world.physics.bodies[rb].position(), before);
        assert_eq!(scene.body_index.entity(rb), Some(id));
        // Transparent pixels are never solid, so the cup keeps a synthesized body
        assert!(api.ecs_world.get::<SpriteVisual>(id).unwrap().synthesized);
    }

    #[test]
    fn test_rebuild_all_skips_broken_objects() {
        let (mut scene, mut api) = cup_scene();
        let request = LayoutObject::new("cup", 300.0, 200.0).to_request(ObjectKind::Image);
        let second = scene
            .place(&mut api, request, &DebugConfig::default())
            .unwrap()
            .unwrap();
        let first = api
            .ecs_world
            .query::<&SceneObject>()
            .iter()
            .map(|(id, _)| id)
            .find(|id| *id != second)
            .unwrap();
        // First object lost its body handle, it cannot be rebuilt
        api.ecs_world.remove_one::<RigidBodyHandle>(first).unwrap();
        let old_rb = *api.ecs_world.get::<RigidBodyHandle>(second).unwrap();
        assert_eq!(scene.rebuild_all(&mut api, &DebugConfig::default()), 1);
        let new_rb = *api.ecs_world.get::<RigidBodyHandle>(second).unwrap();
        assert_ne!(new_rb, old_rb);
        assert_eq!(scene.body_index.entity(new_rb), Some(second));
    }

    #[test]
    fn test_pointer_drags_placed_object() {
        let (mut scene, mut api) = cup_scene();
        scene.step(&mut api).unwrap();
        let cup = api
            .ecs_world
            .query::<&SceneObject>()
            .iter()
            .map(|(id, _)| id)
            .next()
            .unwrap();
        let rb = *api.ecs_world.get::<RigidBodyHandle>(cup).unwrap();
        // Center of one of the cup's wall boxes, in pixels
        let grab_at = {
            let collider = api
                .physics_world
                .physics
                .colliders
                .iter()
                .map(|(_, c)| c)
                .find(|c| c.parent() == Some(rb) && !c.is_sensor())
                .unwrap();
            let (part, _) = &collider.shape().as_compound().unwrap().shapes()[0];
            let world = collider.position() * Point::from(part.translation.vector);
            Vector2::new(world.x, world.y) * scene.config.pixels_per_meter
        };
        let before = api.ecs_world.get::<Position>(cup).unwrap().0;
        assert_eq!(scene.press_pointer(&api, grab_at), Some(cup));
        scene.move_pointer(grab_at + Vector2::new(50.0, 0.0));
        scene.step(&mut api).unwrap();
        let after = api.ecs_world.get::<Position>(cup).unwrap().0;
        assert!((after.x - before.x - 1.0).abs() < 1e-4, "moved to {:?}", after);
        assert!((after.y - before.y).abs() < 1e-4);

        scene.release_pointer(&mut api);
        assert_eq!(scene.held(), None);
        scene.move_pointer(grab_at);
        scene.step(&mut api).unwrap();
        assert_eq!(api.ecs_world.get::<Position>(cup).unwrap().0, after);
    }
}
