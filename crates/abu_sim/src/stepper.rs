//! The simulation stepper: one frame callback at a time.
//!
//! The host calls [`Stepper::on_frame`] from its per-frame primitive
//! (`RedrawRequested` under winit). Each call:
//!
//!   1. re-arms the next frame through the [`FrameScheduler`], first and
//!      unconditionally
//!   2. steps the physics world, if one is attached, and clears its forces
//!   3. asks the [`TickClock`] whether an interval has elapsed
//!   4. if so: polls input, applies one batch per controlled entity, runs a
//!      render pass
//!
//! Anything that goes wrong in 2 to 4, including a panic, is reported to the
//! [`FaultObserver`] and the loop carries on with the next frame. An entity
//! whose batch fails to apply does not hold back the other entities or the
//! render pass of that tick. Stopping the
//! loop means calling [`Stepper::dispose`], which cancels the pending frame.

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};

use abu_core::command::DirectionKind;
use abu_core::config::{ConfigError, LoopConfig};
use abu_core::input::{InputState, KeyBindings};
use abu_core::time::TickClock;
use abu_core::vector::Vector2;
use glam::Vec2;
use thiserror::Error;

use crate::entity::{Entity, EntityId};
use crate::physics::{BodyId, PhysicsError, PhysicsWorld};
use crate::reconciler::{self, ApplyOutcome};
use crate::render::{RenderError, Renderer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRequest(pub u64);

/// The host's "call me again next frame" primitive.
pub trait FrameScheduler {
    fn request_frame(&mut self) -> FrameRequest;
    fn cancel_frame(&mut self, request: FrameRequest);
}

/// A failure inside one frame callback. The loop keeps running after any of
/// these.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TickFault {
    #[error("physics step failed: {0}")]
    Physics(#[source] PhysicsError),
    #[error("applying input to entity {entity} failed: {source}")]
    Apply {
        entity: EntityId,
        #[source]
        source: PhysicsError,
    },
    #[error("render pass failed: {0}")]
    Render(#[source] RenderError),
    #[error("frame callback panicked: {0}")]
    Panic(String),
}

pub trait FaultObserver {
    fn on_fault(&mut self, fault: &TickFault);
}

/// Default observer: log and move on.
pub struct LogFaults;

impl FaultObserver for LogFaults {
    fn on_fault(&mut self, fault: &TickFault) {
        log::error!("Tick fault: {fault}");
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepperError {
    #[error("entity {0} does not exist")]
    UnknownEntity(EntityId),
    #[error("no physics world is attached")]
    NoPhysicsWorld,
    #[error("a physics world with {0} bound bodies is already attached")]
    PhysicsInUse(usize),
    #[error("stepper has been disposed")]
    Disposed,
    #[error(transparent)]
    Physics(#[from] PhysicsError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Not enough time has passed for a tick; nothing was rendered.
    Waiting,
    Ticked,
    Faulted,
    /// The stepper was disposed; no frame was requested.
    Stopped,
}

/// Spawn parameters for [`Stepper::spawn`].
#[derive(Debug, Clone)]
pub struct EntitySpawn {
    pub name: String,
    pub sheet: String,
    pub position: Option<Vector2>,
    pub speed: Option<Vector2>,
    /// Body size used when the renderer cannot size the sprite.
    pub footprint: Option<Vector2>,
    pub controlled: bool,
}

impl EntitySpawn {
    pub fn new(name: &str, sheet: &str) -> Self {
        Self {
            name: name.to_string(),
            sheet: sheet.to_string(),
            position: None,
            speed: None,
            footprint: None,
            controlled: false,
        }
    }

    pub fn at(mut self, position: Vector2) -> Self {
        self.position = Some(position);
        self
    }

    pub fn speed(mut self, speed: Vector2) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn footprint(mut self, footprint: Vector2) -> Self {
        self.footprint = Some(footprint);
        self
    }

    pub fn controlled(mut self) -> Self {
        self.controlled = true;
        self
    }
}

pub struct Stepper {
    config: LoopConfig,
    clock: TickClock,
    input: InputState,
    bindings: KeyBindings,
    entities: BTreeMap<EntityId, Entity>,
    controlled: BTreeSet<EntityId>,
    body_owners: BTreeMap<BodyId, EntityId>,
    physics: Option<Box<dyn PhysicsWorld>>,
    renderer: Box<dyn Renderer>,
    observer: Box<dyn FaultObserver>,
    pending_frame: Option<FrameRequest>,
    last_render_ms: Option<f64>,
    next_entity: u32,
    fault_count: u64,
    disposed: bool,
}

impl Stepper {
    /// Validate `config` and attach `renderer` to its render target. Either
    /// failing is fatal.
    pub fn new(config: LoopConfig, mut renderer: Box<dyn Renderer>) -> Result<Self, ConfigError> {
        config.validate()?;
        let clock = TickClock::new(config.tick_rate)?;
        renderer
            .attach(&config.render_target, config.width, config.height)
            .map_err(|err| {
                log::error!("Renderer attach failed: {err}");
                ConfigError::MissingRenderTarget(config.render_target.clone())
            })?;

        let bindings = KeyBindings::default_keymap();
        let mut input = InputState::new();
        bindings.attach(&mut input);

        log::info!(
            "Stepper ready on '{}' at {} ticks/s ({:.3}ms interval)",
            config.render_target,
            config.tick_rate,
            clock.interval_ms()
        );

        Ok(Self {
            config,
            clock,
            input,
            bindings,
            entities: BTreeMap::new(),
            controlled: BTreeSet::new(),
            body_owners: BTreeMap::new(),
            physics: None,
            renderer,
            observer: Box::new(LogFaults),
            pending_frame: None,
            last_render_ms: None,
            next_entity: 1,
            fault_count: 0,
            disposed: false,
        })
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn clock(&self) -> &TickClock {
        &self.clock
    }

    /// Key state fed by the host's key events.
    pub fn input_mut(&mut self) -> &mut InputState {
        &mut self.input
    }

    pub fn input(&self) -> &InputState {
        &self.input
    }

    /// Replace the key map. Keys shared by the old and new maps stay
    /// registered throughout.
    pub fn set_bindings(&mut self, bindings: KeyBindings) {
        bindings.attach(&mut self.input);
        self.bindings.detach(&mut self.input);
        self.bindings = bindings;
    }

    pub fn bindings(&self) -> &KeyBindings {
        &self.bindings
    }

    pub fn set_observer(&mut self, observer: Box<dyn FaultObserver>) {
        self.observer = observer;
    }

    pub fn fault_count(&self) -> u64 {
        self.fault_count
    }

    pub fn pending_frame(&self) -> Option<FrameRequest> {
        self.pending_frame
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Attach the physics world. Refused while bodies from a previous world
    /// are still bound.
    pub fn attach_physics(&mut self, world: Box<dyn PhysicsWorld>) -> Result<(), StepperError> {
        if !self.body_owners.is_empty() {
            return Err(StepperError::PhysicsInUse(self.body_owners.len()));
        }
        self.physics = Some(world);
        Ok(())
    }

    pub fn physics(&self) -> Option<&dyn PhysicsWorld> {
        self.physics.as_deref()
    }

    pub fn spawn(&mut self, spawn: EntitySpawn) -> Result<EntityId, StepperError> {
        if self.disposed {
            return Err(StepperError::Disposed);
        }
        let sprite = self.renderer.create_sprite(&spawn.sheet)?;

        let id = EntityId(self.next_entity);
        self.next_entity += 1;

        let mut entity = Entity::new(id, &spawn.name, &spawn.sheet);
        if let Some(position) = spawn.position {
            entity = entity.spawned_at(position);
        }
        if let Some(speed) = spawn.speed {
            entity = entity.with_speed(speed);
        }
        if let Some(footprint) = spawn.footprint {
            entity = entity.with_footprint(footprint);
        }
        entity.sprite = Some(sprite);

        log::info!(
            "Spawned entity {} '{}' ({}) at {:?}",
            id,
            spawn.name,
            spawn.sheet,
            spawn.position
        );
        self.entities.insert(id, entity);
        if spawn.controlled {
            self.controlled.insert(id);
        }
        Ok(id)
    }

    pub fn set_controlled(&mut self, id: EntityId, controlled: bool) -> Result<(), StepperError> {
        if !self.entities.contains_key(&id) {
            return Err(StepperError::UnknownEntity(id));
        }
        if controlled {
            self.controlled.insert(id);
        } else {
            self.controlled.remove(&id);
        }
        Ok(())
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn entity_for_body(&self, body: BodyId) -> Option<EntityId> {
        self.body_owners.get(&body).copied()
    }

    /// Give `id` a physics body sized to its sprite (or its footprint when the
    /// renderer has no size for it). Position authority moves to the body.
    pub fn attach_body(&mut self, id: EntityId) -> Result<BodyId, StepperError> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(StepperError::UnknownEntity(id))?;
        let physics = self
            .physics
            .as_deref_mut()
            .ok_or(StepperError::NoPhysicsWorld)?;

        let size = entity
            .sprite
            .and_then(|sprite| self.renderer.sprite_size(sprite))
            .map(Vector2::from)
            .unwrap_or(entity.footprint);
        let body = entity.bind_body(physics, size);
        self.body_owners.insert(body, id);
        Ok(body)
    }

    pub fn entity_position(&self, id: EntityId) -> Option<Vector2> {
        self.entities.get(&id)?.pos(self.physics.as_deref())
    }

    /// Write a position through the entity's current authority.
    pub fn set_entity_position(&mut self, id: EntityId, position: Vector2) -> Result<(), StepperError> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(StepperError::UnknownEntity(id))?;
        entity.set_pos(position, self.physics.as_deref_mut())?;
        Ok(())
    }

    /// Remove an entity, its body and its sprite.
    pub fn remove_entity(&mut self, id: EntityId) -> bool {
        let Some(entity) = self.entities.remove(&id) else {
            return false;
        };
        self.controlled.remove(&id);
        if let Some(body) = entity.body() {
            self.body_owners.remove(&body);
            if let Some(physics) = self.physics.as_deref_mut() {
                physics.remove_body(body);
            }
        }
        if let Some(sprite) = entity.sprite {
            self.renderer.destroy_sprite(sprite);
        }
        log::info!("Removed entity {} '{}'", id, entity.name);
        true
    }

    /// One frame callback. `now_ms` is wall-clock milliseconds since the Unix
    /// epoch; batches are stamped from it.
    pub fn on_frame(&mut self, now_ms: f64, scheduler: &mut dyn FrameScheduler) -> FrameOutcome {
        if self.disposed {
            return FrameOutcome::Stopped;
        }
        self.pending_frame = Some(scheduler.request_frame());

        let mut faults = Vec::new();
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.run_frame(now_ms, &mut faults)));
        let outcome = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(fault)) => {
                faults.push(fault);
                FrameOutcome::Faulted
            }
            Err(payload) => {
                faults.push(TickFault::Panic(panic_message(payload.as_ref())));
                FrameOutcome::Faulted
            }
        };

        for fault in &faults {
            self.fault_count += 1;
            self.observer.on_fault(fault);
        }
        outcome
    }

    /// Per-entity apply faults are pushed onto `faults` and the tick carries
    /// on; a physics step or render failure ends the frame.
    fn run_frame(
        &mut self,
        now_ms: f64,
        faults: &mut Vec<TickFault>,
    ) -> Result<FrameOutcome, TickFault> {
        if let Some(physics) = self.physics.as_deref_mut() {
            physics
                .step(self.config.physics.fixed_dt, self.config.physics.sub_steps)
                .map_err(TickFault::Physics)?;
            physics.clear_forces();
        }

        if !self.clock.poll(now_ms) {
            return Ok(FrameOutcome::Waiting);
        }

        self.update(now_ms.max(0.0) as u64, faults);
        let rendered = self.render(now_ms);
        self.input.end_frame();
        rendered?;

        if faults.is_empty() {
            Ok(FrameOutcome::Ticked)
        } else {
            Ok(FrameOutcome::Faulted)
        }
    }

    fn update(&mut self, now_unix_ms: u64, faults: &mut Vec<TickFault>) {
        for &id in &self.controlled {
            let Some(entity) = self.entities.get_mut(&id) else {
                continue;
            };
            let commands = reconciler::poll(&self.input, &self.bindings, entity.direction);
            let batch = reconciler::build_batch(entity, commands, now_unix_ms);
            match reconciler::apply(entity, &batch, self.physics.as_deref_mut()) {
                Ok(ApplyOutcome::Applied) => {}
                Ok(ApplyOutcome::Stale) => {
                    log::warn!("Entity {} rejected its own batch {}", id, batch.seq);
                }
                Err(source) => faults.push(TickFault::Apply { entity: id, source }),
            }
        }
    }

    fn render(&mut self, now_ms: f64) -> Result<(), TickFault> {
        let renderer = self.renderer.as_mut();
        let physics = self.physics.as_deref();

        for (&body, &id) in &self.body_owners {
            let Some(entity) = self.entities.get(&id) else {
                log::warn!("Body {:?} maps to missing entity {}", body, id);
                continue;
            };
            let Some(pos) = physics.and_then(|world| world.body_position(body)) else {
                log::warn!("Entity {} has no readable body {:?}", id, body);
                continue;
            };
            draw_entity(renderer, entity, pos);
        }
        for entity in self.entities.values().filter(|e| e.body().is_none()) {
            if let Some(pos) = entity.pos(None) {
                draw_entity(renderer, entity, pos);
            }
        }

        let dt_us = self
            .last_render_ms
            .map(|last| ((now_ms - last).max(0.0) * 1000.0) as u64)
            .unwrap_or(0);
        self.last_render_ms = Some(now_ms);
        renderer.present(dt_us).map_err(TickFault::Render)
    }

    /// Stop the loop: cancel the pending frame, remove every body and sprite
    /// and release the key bindings. Later `on_frame` calls do nothing.
    pub fn dispose(&mut self, scheduler: &mut dyn FrameScheduler) {
        if self.disposed {
            return;
        }
        if let Some(request) = self.pending_frame.take() {
            scheduler.cancel_frame(request);
        }
        let ids: Vec<EntityId> = self.entities.keys().copied().collect();
        for id in ids {
            self.remove_entity(id);
        }
        self.bindings.detach(&mut self.input);
        self.disposed = true;
        log::info!(
            "Stepper disposed after {} ticks ({} faults)",
            self.clock.tick_count,
            self.fault_count
        );
    }
}

/// Switch the clip for the entity's action and facing, centre the sprite on
/// `pos`. A missing left-facing clip falls back to the right-facing one,
/// mirrored.
fn draw_entity(renderer: &mut dyn Renderer, entity: &Entity, pos: Vector2) {
    let Some(sprite) = entity.sprite else {
        return;
    };

    let mut key = entity.clip_key();
    let mut flip_x = false;
    if entity.direction == DirectionKind::Left && !renderer.has_clip(sprite, &key) {
        let mirrored = entity.clip_key_facing(DirectionKind::Right);
        if renderer.has_clip(sprite, &mirrored) {
            key = mirrored;
            flip_x = true;
        }
    }
    renderer.switch_clip(sprite, &key);

    let size = renderer.sprite_size(sprite).unwrap_or(Vec2::ZERO);
    let top_left = Vec2::from(pos) - 0.5 * size;
    renderer.set_transform(sprite, top_left, flip_x);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
