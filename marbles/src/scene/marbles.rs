use anyhow::*;
use cgmath::Vector2;
use hecs::Entity;
use rand::Rng;
use toybox::api::EngineApi;

use crate::{
    config::MarbleParams,
    object::{collider_marble, Angle, BodyIndex, Marble, MarbleRigidbody, Position},
    scene::GamePhase,
};

/// Decides when marbles drop and creates their bodies
#[derive(Debug, Clone)]
pub struct MarbleSpawner {
    params: MarbleParams,
    /// Pixels
    spawn_point: Vector2<f32>,
    final_burst: u32,
    since_last_secs: f32,
    /// Set once the final phase starts
    burst_remaining: Option<u32>,
}

impl MarbleSpawner {
    pub fn new(params: MarbleParams, spawn_point: Vector2<f32>, final_burst: u32) -> MarbleSpawner {
        MarbleSpawner {
            params,
            spawn_point,
            final_burst,
            since_last_secs: 0.0,
            burst_remaining: None,
        }
    }

    /// Advances the spawn timer and tells whether a marble should drop now.
    /// In the single phase a marble only drops when none is alive.
    pub fn due(&mut self, dt: f32, phase: GamePhase, alive: usize) -> bool {
        self.since_last_secs += dt;
        let interval = self.params.spawn_interval_secs;
        match phase {
            GamePhase::Single => {
                if alive == 0 && self.since_last_secs >= interval {
                    self.since_last_secs = 0.0;
                    return true;
                }
                false
            }
            GamePhase::Final => {
                let remaining = match self.burst_remaining {
                    Some(remaining) => remaining,
                    None => {
                        debug!("Releasing final burst of {} marbles", self.final_burst);
                        self.since_last_secs = interval;
                        self.final_burst
                    }
                };
                if remaining > 0 && self.since_last_secs >= interval {
                    self.since_last_secs = 0.0;
                    self.burst_remaining = Some(remaining - 1);
                    return true;
                }
                self.burst_remaining = Some(remaining);
                false
            }
        }
    }

    pub fn burst_remaining(&self) -> Option<u32> {
        self.burst_remaining
    }

    pub fn reset(&mut self) {
        self.since_last_secs = 0.0;
        self.burst_remaining = None;
    }

    /// Drops one marble at the spawn point with a small random horizontal offset
    pub fn spawn(
        &self,
        api: &mut EngineApi,
        body_index: &mut BodyIndex,
        pixels_per_meter: f32,
    ) -> Result<Entity> {
        let jitter = if self.params.jitter > 0.0 {
            rand::thread_rng().gen_range(-self.params.jitter..=self.params.jitter)
        } else {
            0.0
        };
        let position = (self.spawn_point + Vector2::new(jitter, 0.0)) / pixels_per_meter;
        let id = api.ecs_world.reserve_entity();
        let rb = MarbleRigidbody::spawn(
            id,
            &mut api.physics_world.physics.bodies,
            &mut api.physics_world.physics.colliders,
            position,
            collider_marble(
                self.params.radius / pixels_per_meter,
                self.params.restitution,
                self.params.density,
            ),
        );
        body_index.insert(rb, id);
        api.ecs_world
            .insert(id, (
                Marble {
                    spawned_at_ms: api.time.elapsed_ms(),
                },
                rb,
                Position(position),
                Angle(0.0),
            ))
            .map_err(|e| anyhow!("Failed to insert marble: {}", e))?;
        Ok(id)
    }
}
