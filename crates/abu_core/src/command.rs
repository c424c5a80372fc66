//! Typed input commands and the sequence-numbered batches they travel in.

use serde::Deserialize;

/// Semantic action carried by a command. `Idle` is the fallback when no key
/// is held.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum ActionKind {
    #[default]
    Idle,
    Walk,
    Attack,
    Shoot,
    Swing,
}

impl ActionKind {
    pub const ALL: &'static [ActionKind] = &[
        ActionKind::Idle,
        ActionKind::Walk,
        ActionKind::Attack,
        ActionKind::Shoot,
        ActionKind::Swing,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Walk => "Walk",
            Self::Attack => "Attack",
            Self::Shoot => "Shoot",
            Self::Swing => "Swing",
        }
    }

    /// Only walking moves an entity; the other actions just change its
    /// animation.
    pub fn moves(self) -> bool {
        matches!(self, Self::Walk)
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Direction carried by a command. `Empty` stands for "whatever the entity is
/// facing right now" and is resolved when commands are polled.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum DirectionKind {
    #[default]
    Empty,
    Left,
    Right,
    Up,
    Down,
}

impl DirectionKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Empty => "",
            Self::Left => "Left",
            Self::Right => "Right",
            Self::Up => "Up",
            Self::Down => "Down",
        }
    }

    /// Replace `Empty` with `facing`; any concrete direction is returned as is.
    pub fn resolve(self, facing: DirectionKind) -> DirectionKind {
        match self {
            Self::Empty => facing,
            other => other,
        }
    }
}

impl std::fmt::Display for DirectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Command {
    pub action: ActionKind,
    pub direction: DirectionKind,
}

impl Command {
    pub const fn new(action: ActionKind, direction: DirectionKind) -> Self {
        Self { action, direction }
    }

    pub const fn idle(facing: DirectionKind) -> Self {
        Self::new(ActionKind::Idle, facing)
    }
}

/// One poll's worth of commands, stamped with the controlling entity's next
/// sequence number and the wall-clock second it was built in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputBatch {
    pub seq: u64,
    pub time: u64,
    pub commands: Vec<Command>,
}
