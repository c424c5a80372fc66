//! Turns held keys into sequenced command batches and applies them.
//!
//! Each tick: [`poll`] reads the bindings against the live key state,
//! [`build_batch`] stamps the result with the entity's next sequence number,
//! and [`apply`] moves the entity. `apply` only accepts a batch whose `seq` is
//! above the entity's `last_input_seq` watermark and raises the watermark
//! afterwards, so a replayed or reordered batch is dropped silently.

use std::time::{SystemTime, UNIX_EPOCH};

use abu_core::command::{Command, DirectionKind, InputBatch};
use abu_core::input::{InputState, KeyBindings};
use abu_core::vector::Vector2;

use crate::entity::Entity;
use crate::physics::{PhysicsError, PhysicsWorld};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// `seq` was at or below the watermark; nothing changed.
    Stale,
}

/// One command per held binding, in binding order. `Empty` directions become
/// `facing`. With nothing held the result is a single idle command.
pub fn poll(input: &InputState, bindings: &KeyBindings, facing: DirectionKind) -> Vec<Command> {
    let commands: Vec<Command> = bindings
        .iter()
        .filter(|binding| input.is_held(binding.key))
        .map(|binding| Command::new(binding.action, binding.direction.resolve(facing)))
        .collect();

    if commands.is_empty() {
        return vec![Command::idle(facing)];
    }
    commands
}

pub fn build_batch(entity: &mut Entity, commands: Vec<Command>, now_unix_ms: u64) -> InputBatch {
    entity.input_seq += 1;
    InputBatch {
        seq: entity.input_seq,
        time: now_unix_ms / 1000,
        commands,
    }
}

/// Sum of the per-axis steps the batch asks for.
pub fn movement_delta(speed: Vector2, commands: &[Command]) -> Vector2 {
    let mut delta = Vector2::ZERO;
    for command in commands.iter().filter(|c| c.action.moves()) {
        match command.direction {
            DirectionKind::Down => delta.y += speed.y,
            DirectionKind::Up => delta.y -= speed.y,
            DirectionKind::Left => delta.x -= speed.x,
            DirectionKind::Right => delta.x += speed.x,
            DirectionKind::Empty => {}
        }
    }
    delta
}

pub fn apply(
    entity: &mut Entity,
    batch: &InputBatch,
    mut physics: Option<&mut (dyn PhysicsWorld + 'static)>,
) -> Result<ApplyOutcome, PhysicsError> {
    if batch.seq <= entity.last_input_seq {
        log::debug!(
            "Dropping stale batch {} for entity {} (watermark {})",
            batch.seq,
            entity.id,
            entity.last_input_seq
        );
        return Ok(ApplyOutcome::Stale);
    }

    let delta = movement_delta(entity.speed, &batch.commands);
    let current = entity.pos(physics.as_deref());
    let next = match current {
        Some(pos) => pos.add(delta),
        None => Vector2::ZERO.add(delta),
    };

    entity.set_pos(next, physics.as_deref_mut())?;

    if let Some(last) = batch.commands.last() {
        entity.action = last.action;
    }
    entity.prev_pos = current.map(|pos| pos.copy());
    entity.update_facing(next);
    entity.last_input_seq = batch.seq;

    log::trace!(
        "Entity {} applied batch {}: {:?} -> {} ({} {})",
        entity.id,
        batch.seq,
        current,
        next,
        entity.action,
        entity.direction
    );
    Ok(ApplyOutcome::Applied)
}

/// Wall-clock milliseconds since the Unix epoch, or 0 if the clock is set
/// before it.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
