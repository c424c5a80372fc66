//! Keyboard state and action bindings.
//!
//! - **Registration:** only keys that have been `register`ed are tracked. Key
//!   events for anything else are ignored, and `unregister` drops a key's state
//!   so a torn-down binding can never report as held.
//!
//! - **Level-triggered (held):** `is_held(key)` is true every frame the key is
//!   physically down. This is what command polling reads.
//!
//! - **Edge-triggered (just_pressed / just_released):** true only until
//!   `end_frame()`, which the host calls after a tick has consumed them.

use std::collections::{HashMap, HashSet};

use crate::command::{ActionKind, DirectionKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    W,
    A,
    S,
    D,
    Space,
    Left,
    Right,
    Up,
    Down,
    Escape,
}

impl Key {
    /// Legacy DOM key code, kept so bindings can be authored by number.
    pub fn code(self) -> u32 {
        match self {
            Self::W => 87,
            Self::A => 65,
            Self::S => 83,
            Self::D => 68,
            Self::Space => 32,
            Self::Left => 37,
            Self::Up => 38,
            Self::Right => 39,
            Self::Down => 40,
            Self::Escape => 27,
        }
    }

    pub fn from_code(code: u32) -> Option<Key> {
        const ALL: [Key; 10] = [
            Key::W,
            Key::A,
            Key::S,
            Key::D,
            Key::Space,
            Key::Left,
            Key::Right,
            Key::Up,
            Key::Down,
            Key::Escape,
        ];
        ALL.into_iter().find(|key| key.code() == code)
    }
}

/// Live pressed/released flags for the registered keys.
///
/// Registration is reference counted: two bindings sharing a key each
/// register it, and the key stops being tracked once both have unregistered.
#[derive(Debug, Default)]
pub struct InputState {
    registered: HashMap<Key, u32>,
    held: HashSet<Key>,
    just_pressed: HashSet<Key>,
    just_released: HashSet<Key>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: Key) {
        *self.registered.entry(key).or_insert(0) += 1;
    }

    pub fn unregister(&mut self, key: Key) {
        let Some(count) = self.registered.get_mut(&key) else {
            return;
        };
        *count -= 1;
        if *count == 0 {
            self.registered.remove(&key);
            self.held.remove(&key);
            self.just_pressed.remove(&key);
            self.just_released.remove(&key);
        }
    }

    pub fn is_registered(&self, key: Key) -> bool {
        self.registered.contains_key(&key)
    }

    pub fn registered_count(&self) -> usize {
        self.registered.len()
    }

    pub fn key_down(&mut self, key: Key) {
        if !self.is_registered(key) {
            log::trace!("Ignoring key down for unregistered key {:?}", key);
            return;
        }
        if self.held.insert(key) {
            self.just_pressed.insert(key);
        }
    }

    pub fn key_up(&mut self, key: Key) {
        if self.held.remove(&key) {
            self.just_released.insert(key);
        }
    }

    pub fn is_held(&self, key: Key) -> bool {
        self.held.contains(&key)
    }

    pub fn is_just_pressed(&self, key: Key) -> bool {
        self.just_pressed.contains(&key)
    }

    pub fn is_just_released(&self, key: Key) -> bool {
        self.just_released.contains(&key)
    }

    pub fn any_held(&self) -> bool {
        !self.held.is_empty()
    }

    /// Drop every held key, e.g. when the window loses focus and release
    /// events will never arrive.
    pub fn release_all(&mut self) {
        for key in self.held.drain() {
            self.just_released.insert(key);
        }
    }

    pub fn end_frame(&mut self) {
        self.just_pressed.clear();
        self.just_released.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyBinding {
    pub action: ActionKind,
    pub direction: DirectionKind,
    pub key: Key,
}

/// Flat, ordered list of `(action, direction, key)` bindings. Polling walks it
/// front to back, so the order here is the order commands come out in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyBindings {
    bindings: Vec<KeyBinding>,
}

impl KeyBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// WASD walks, Space attacks in whatever direction the entity faces.
    pub fn default_keymap() -> Self {
        let mut bindings = Self::new();
        bindings
            .bind(ActionKind::Walk, DirectionKind::Up, Key::W)
            .bind(ActionKind::Walk, DirectionKind::Left, Key::A)
            .bind(ActionKind::Walk, DirectionKind::Down, Key::S)
            .bind(ActionKind::Walk, DirectionKind::Right, Key::D)
            .bind(ActionKind::Attack, DirectionKind::Empty, Key::Space);
        bindings
    }

    pub fn bind(&mut self, action: ActionKind, direction: DirectionKind, key: Key) -> &mut Self {
        self.bindings.push(KeyBinding {
            action,
            direction,
            key,
        });
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyBinding> {
        self.bindings.iter()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Register every bound key with `input`.
    pub fn attach(&self, input: &mut InputState) {
        for binding in &self.bindings {
            input.register(binding.key);
        }
    }

    /// Undo `attach`.
    pub fn detach(&self, input: &mut InputState) {
        for binding in &self.bindings {
            input.unregister(binding.key);
        }
    }
}
