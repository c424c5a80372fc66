//! Simulated actors and their position authority.
//!
//! An entity starts out owning its position locally. Binding a physics body
//! hands authority to the body for good: from then on every position write is
//! forwarded to the body and every read comes back from it, and the local
//! copy is dropped so nothing can read a stale value.

use abu_core::command::{ActionKind, DirectionKind};
use abu_core::vector::Vector2;

use crate::physics::{BodyDesc, BodyId, PhysicsError, PhysicsWorld};
use crate::render::SpriteHandle;

pub const DEFAULT_SPEED: Vector2 = Vector2::new(5.0, 5.0);
pub const DEFAULT_FOOTPRINT: Vector2 = Vector2::new(32.0, 32.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u32);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where an entity's position lives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionAuthority {
    /// Local fields. `None` until the first position is written.
    Local(Option<Vector2>),
    Body(BodyId),
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    /// Sprite sheet prefix for clip keys, e.g. `Abu` in `AbuWalkRight`.
    pub sheet: String,
    authority: PositionAuthority,
    /// Position before the last applied batch; only used to derive facing.
    pub prev_pos: Option<Vector2>,
    pub direction: DirectionKind,
    pub action: ActionKind,
    pub speed: Vector2,
    /// Size of the physics box, used when no sprite size is known.
    pub footprint: Vector2,
    /// Last sequence number handed out to a batch.
    pub input_seq: u64,
    /// Last sequence number actually applied.
    pub last_input_seq: u64,
    pub sprite: Option<SpriteHandle>,
}

impl Entity {
    pub fn new(id: EntityId, name: &str, sheet: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            sheet: sheet.to_string(),
            authority: PositionAuthority::Local(None),
            prev_pos: None,
            direction: DirectionKind::Right,
            action: ActionKind::Idle,
            speed: DEFAULT_SPEED,
            footprint: DEFAULT_FOOTPRINT,
            input_seq: 0,
            last_input_seq: 0,
            sprite: None,
        }
    }

    pub fn spawned_at(mut self, position: Vector2) -> Self {
        self.authority = PositionAuthority::Local(Some(position));
        self.prev_pos = Some(position);
        self
    }

    pub fn with_speed(mut self, speed: Vector2) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_footprint(mut self, footprint: Vector2) -> Self {
        self.footprint = footprint;
        self
    }

    pub fn authority(&self) -> PositionAuthority {
        self.authority
    }

    pub fn body(&self) -> Option<BodyId> {
        match self.authority {
            PositionAuthority::Body(body) => Some(body),
            PositionAuthority::Local(_) => None,
        }
    }

    /// Current position from whichever store is authoritative.
    pub fn pos(&self, physics: Option<&dyn PhysicsWorld>) -> Option<Vector2> {
        match self.authority {
            PositionAuthority::Local(pos) => pos,
            PositionAuthority::Body(body) => {
                let Some(world) = physics else {
                    log::warn!(
                        "Entity {} reads body {:?} with no physics world attached",
                        self.id,
                        body
                    );
                    return None;
                };
                world.body_position(body)
            }
        }
    }

    pub fn set_pos(
        &mut self,
        position: Vector2,
        physics: Option<&mut (dyn PhysicsWorld + 'static)>,
    ) -> Result<(), PhysicsError> {
        match self.authority {
            PositionAuthority::Local(_) => {
                self.authority = PositionAuthority::Local(Some(position));
                Ok(())
            }
            PositionAuthority::Body(body) => physics
                .ok_or(PhysicsError::Detached(body))?
                .set_body_position(body, position),
        }
    }

    /// Hand position authority to a new box body created at the current
    /// position (the origin if none was ever set). Binding twice returns the
    /// existing body.
    pub(crate) fn bind_body(&mut self, physics: &mut dyn PhysicsWorld, size: Vector2) -> BodyId {
        let position = match self.authority {
            PositionAuthority::Body(body) => return body,
            PositionAuthority::Local(pos) => pos.unwrap_or(Vector2::ZERO),
        };
        let body = physics.create_body(BodyDesc {
            position,
            half_width: size.x * 0.5,
            half_height: size.y * 0.5,
        });
        self.authority = PositionAuthority::Body(body);
        log::info!("Entity {} ({}) bound to body {:?}", self.id, self.name, body);
        body
    }

    /// Facing follows horizontal movement since `prev_pos` and is left alone
    /// when there was none.
    pub fn update_facing(&mut self, pos: Vector2) {
        let Some(prev) = self.prev_pos else {
            return;
        };
        if prev.x < pos.x {
            self.direction = DirectionKind::Right;
        } else if prev.x > pos.x {
            self.direction = DirectionKind::Left;
        }
    }

    /// Animation clip for the current action and facing, e.g. `AbuWalkLeft`.
    pub fn clip_key(&self) -> String {
        self.clip_key_facing(self.direction)
    }

    pub fn clip_key_facing(&self, direction: DirectionKind) -> String {
        format!("{}{}{}", self.sheet, self.action, direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::RapierWorld;
    use abu_core::config::PhysicsConfig;

    fn entity() -> Entity {
        Entity::new(EntityId(1), "abu", "Abu")
    }

    #[test]
    fn new_entity_has_no_position() {
        let e = entity();
        assert_eq!(e.pos(None), None);
        assert_eq!(e.authority(), PositionAuthority::Local(None));
        assert_eq!(e.direction, DirectionKind::Right);
        assert_eq!(e.speed, DEFAULT_SPEED);
    }

    #[test]
    fn facing_follows_horizontal_delta() {
        let mut e = entity().spawned_at(Vector2::ZERO);

        e.update_facing(Vector2::new(5.0, 0.0));
        assert_eq!(e.direction, DirectionKind::Right);

        e.update_facing(Vector2::new(-5.0, 0.0));
        assert_eq!(e.direction, DirectionKind::Left);

        e.update_facing(Vector2::new(0.0, 0.0));
        assert_eq!(e.direction, DirectionKind::Left);

        e.update_facing(Vector2::new(0.0, 9.0));
        assert_eq!(e.direction, DirectionKind::Left);
    }

    #[test]
    fn local_position_round_trips() {
        let mut e = entity();
        e.set_pos(Vector2::new(3.0, 4.0), None).expect("local write");
        assert_eq!(e.pos(None), Some(Vector2::new(3.0, 4.0)));
    }

    #[test]
    fn bound_body_becomes_position_authority() {
        let mut world = RapierWorld::new(&PhysicsConfig::default());
        let mut e = entity().spawned_at(Vector2::new(10.0, 10.0));

        let body = e.bind_body(&mut world, DEFAULT_FOOTPRINT);
        assert_eq!(e.body(), Some(body));
        assert_eq!(e.pos(Some(&world)), Some(Vector2::new(10.0, 10.0)));

        e.set_pos(Vector2::new(20.0, 20.0), Some(&mut world))
            .expect("body write");
        assert_eq!(world.body_position(body), Some(Vector2::new(20.0, 20.0)));
        assert_eq!(e.pos(Some(&world)), Some(Vector2::new(20.0, 20.0)));

        // Binding again is a no-op.
        assert_eq!(e.bind_body(&mut world, DEFAULT_FOOTPRINT), body);
        assert_eq!(world.body_count(), 1);
    }

    #[test]
    fn bound_entity_without_world_cannot_write() {
        let mut world = RapierWorld::new(&PhysicsConfig::default());
        let mut e = entity();
        let body = e.bind_body(&mut world, DEFAULT_FOOTPRINT);
        assert_eq!(
            e.set_pos(Vector2::ZERO, None),
            Err(PhysicsError::Detached(body))
        );
        assert_eq!(e.pos(None), None);
    }

    #[test]
    fn clip_key_combines_sheet_action_and_facing() {
        let mut e = entity();
        e.action = ActionKind::Attack;
        e.direction = DirectionKind::Left;
        assert_eq!(e.clip_key(), "AbuAttackLeft");
        assert_eq!(e.clip_key_facing(DirectionKind::Right), "AbuAttackRight");
    }
}
