//! Physics collaborator.
//!
//! The stepper only talks to physics through [`PhysicsWorld`]: create a box
//! body, move it, read it back, advance the world, remove the body. Bodies are
//! named by [`BodyId`]; the body-to-entity map lives in the stepper, never in
//! the physics engine's user data.
//!
//! [`RapierWorld`] is the production implementation on top of `rapier2d`.

use std::collections::HashMap;

use abu_core::config::PhysicsConfig;
use abu_core::vector::Vector2;
use rapier2d::prelude::*;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(pub u64);

/// A dynamic box body centred on `position`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyDesc {
    pub position: Vector2,
    pub half_width: f32,
    pub half_height: f32,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhysicsError {
    #[error("body {0:?} does not exist")]
    UnknownBody(BodyId),
    #[error("body {0:?} is bound but no physics world is attached")]
    Detached(BodyId),
    #[error("body {0:?} left the finite range after stepping")]
    NonFinite(BodyId),
    #[error("invalid step: dt={dt} sub_steps={sub_steps}")]
    InvalidStep { dt: f32, sub_steps: u32 },
}

pub trait PhysicsWorld {
    fn create_body(&mut self, desc: BodyDesc) -> BodyId;

    /// Returns `false` if the body was already gone.
    fn remove_body(&mut self, body: BodyId) -> bool;

    fn body_position(&self, body: BodyId) -> Option<Vector2>;

    fn set_body_position(&mut self, body: BodyId, position: Vector2) -> Result<(), PhysicsError>;

    /// Advance by `dt` seconds split into `sub_steps` equal steps.
    fn step(&mut self, dt: f32, sub_steps: u32) -> Result<(), PhysicsError>;

    fn clear_forces(&mut self);

    fn body_count(&self) -> usize;
}

pub struct RapierWorld {
    gravity: Vector<Real>,
    allow_sleep: bool,
    physics_pipeline: PhysicsPipeline,
    integration_parameters: IntegrationParameters,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    handles: HashMap<BodyId, RigidBodyHandle>,
    next_body: u64,
}

impl RapierWorld {
    pub fn new(config: &PhysicsConfig) -> Self {
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = config.fixed_dt;

        Self {
            gravity: vector![config.gravity_x, config.gravity_y],
            allow_sleep: config.allow_sleep,
            physics_pipeline: PhysicsPipeline::new(),
            integration_parameters,
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            handles: HashMap::new(),
            next_body: 1,
        }
    }

    fn rigid_body(&self, body: BodyId) -> Option<&RigidBody> {
        let handle = self.handles.get(&body)?;
        self.rigid_body_set.get(*handle)
    }
}

impl PhysicsWorld for RapierWorld {
    fn create_body(&mut self, desc: BodyDesc) -> BodyId {
        let rigid_body = RigidBodyBuilder::dynamic()
            .translation(vector![desc.position.x, desc.position.y])
            .can_sleep(self.allow_sleep)
            .build();
        let handle = self.rigid_body_set.insert(rigid_body);

        let collider = ColliderBuilder::cuboid(desc.half_width, desc.half_height).build();
        self.collider_set
            .insert_with_parent(collider, handle, &mut self.rigid_body_set);

        let id = BodyId(self.next_body);
        self.next_body += 1;
        self.handles.insert(id, handle);
        log::debug!("Created body {:?} at {}", id, desc.position);
        id
    }

    fn remove_body(&mut self, body: BodyId) -> bool {
        let Some(handle) = self.handles.remove(&body) else {
            return false;
        };
        self.rigid_body_set
            .remove(
                handle,
                &mut self.island_manager,
                &mut self.collider_set,
                &mut self.impulse_joint_set,
                &mut self.multibody_joint_set,
                true,
            )
            .is_some()
    }

    fn body_position(&self, body: BodyId) -> Option<Vector2> {
        let translation = self.rigid_body(body)?.translation();
        Some(Vector2::new(translation.x, translation.y))
    }

    fn set_body_position(&mut self, body: BodyId, position: Vector2) -> Result<(), PhysicsError> {
        let handle = self
            .handles
            .get(&body)
            .ok_or(PhysicsError::UnknownBody(body))?;
        let rigid_body = self
            .rigid_body_set
            .get_mut(*handle)
            .ok_or(PhysicsError::UnknownBody(body))?;
        rigid_body.set_translation(vector![position.x, position.y], true);
        Ok(())
    }

    fn step(&mut self, dt: f32, sub_steps: u32) -> Result<(), PhysicsError> {
        if !dt.is_finite() || dt <= 0.0 || sub_steps == 0 {
            return Err(PhysicsError::InvalidStep { dt, sub_steps });
        }
        self.integration_parameters.dt = dt / sub_steps as f32;

        for _ in 0..sub_steps {
            self.physics_pipeline.step(
                &self.gravity,
                &self.integration_parameters,
                &mut self.island_manager,
                &mut self.broad_phase,
                &mut self.narrow_phase,
                &mut self.rigid_body_set,
                &mut self.collider_set,
                &mut self.impulse_joint_set,
                &mut self.multibody_joint_set,
                &mut self.ccd_solver,
                Some(&mut self.query_pipeline),
                &(),
                &(),
            );
        }

        for (&id, &handle) in &self.handles {
            if let Some(rigid_body) = self.rigid_body_set.get(handle) {
                let t = rigid_body.translation();
                if !t.x.is_finite() || !t.y.is_finite() {
                    return Err(PhysicsError::NonFinite(id));
                }
            }
        }
        Ok(())
    }

    fn clear_forces(&mut self) {
        for (_, rigid_body) in self.rigid_body_set.iter_mut() {
            rigid_body.reset_forces(false);
            rigid_body.reset_torques(false);
        }
    }

    fn body_count(&self) -> usize {
        self.handles.len()
    }
}
