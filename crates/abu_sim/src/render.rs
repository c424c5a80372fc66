//! Rendering collaborator.
//!
//! The stepper draws through [`Renderer`]: one sprite handle per entity, a clip
//! key switched every render pass, a top-left screen position and a horizontal
//! flip. [`SheetRenderer`] is the in-process implementation: it keeps sprite
//! sheets and per-sprite clip players, and advances the active clips on
//! `present`. A GPU backend plugs in behind the same trait.

use std::collections::{BTreeMap, HashMap};

use abu_core::animation::{ClipPlayer, SpriteSheet};
use glam::Vec2;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpriteHandle(pub u32);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("render target '{0}' was not found")]
    MissingTarget(String),
    #[error("sprite sheet '{0}' is not loaded")]
    UnknownSheet(String),
    #[error("renderer is not attached to a target")]
    Detached,
}

pub trait Renderer {
    /// Bind to the render target named `target`.
    fn attach(&mut self, target: &str, width: u32, height: u32) -> Result<(), RenderError>;

    fn create_sprite(&mut self, sheet: &str) -> Result<SpriteHandle, RenderError>;

    fn destroy_sprite(&mut self, sprite: SpriteHandle);

    fn has_clip(&self, sprite: SpriteHandle, key: &str) -> bool;

    /// Make `key` the sprite's active clip. Returns `false` and leaves the
    /// current clip untouched when the key is unknown.
    fn switch_clip(&mut self, sprite: SpriteHandle, key: &str) -> bool;

    fn set_transform(&mut self, sprite: SpriteHandle, top_left: Vec2, flip_x: bool);

    fn sprite_size(&self, sprite: SpriteHandle) -> Option<Vec2>;

    /// Finish the frame; `dt_us` is the time since the previous present.
    fn present(&mut self, dt_us: u64) -> Result<(), RenderError>;
}

/// Draw state of one sprite as of the last `present`.
#[derive(Debug, Clone)]
pub struct SpriteInstance {
    pub sheet_id: String,
    pub player: ClipPlayer,
    pub top_left: Vec2,
    pub flip_x: bool,
    pub frame: Option<String>,
}

pub struct SheetRenderer {
    targets: Vec<String>,
    attached: Option<(String, u32, u32)>,
    sheets: HashMap<String, SpriteSheet>,
    sprites: BTreeMap<SpriteHandle, SpriteInstance>,
    next_sprite: u32,
    clip_speed: f64,
    pub frames_presented: u64,
}

impl SheetRenderer {
    /// `targets` lists the surfaces this renderer can attach to.
    pub fn new(targets: &[&str]) -> Self {
        Self {
            targets: targets.iter().map(|t| t.to_string()).collect(),
            attached: None,
            sheets: HashMap::new(),
            sprites: BTreeMap::new(),
            next_sprite: 1,
            clip_speed: 1.0,
            frames_presented: 0,
        }
    }

    pub fn with_clip_speed(mut self, speed: f64) -> Self {
        self.clip_speed = speed;
        self
    }

    pub fn add_sheet(&mut self, sheet: SpriteSheet) {
        log::info!(
            "Loaded sprite sheet '{}' ({} clips)",
            sheet.sheet_id,
            sheet.clips.len()
        );
        self.sheets.insert(sheet.sheet_id.clone(), sheet);
    }

    pub fn sprite(&self, sprite: SpriteHandle) -> Option<&SpriteInstance> {
        self.sprites.get(&sprite)
    }

    pub fn sprite_count(&self) -> usize {
        self.sprites.len()
    }

    pub fn attached_target(&self) -> Option<&str> {
        self.attached.as_ref().map(|(name, _, _)| name.as_str())
    }
}

impl Renderer for SheetRenderer {
    fn attach(&mut self, target: &str, width: u32, height: u32) -> Result<(), RenderError> {
        if !self.targets.iter().any(|t| t == target) {
            return Err(RenderError::MissingTarget(target.to_string()));
        }
        log::info!("Renderer attached to '{}' ({}x{})", target, width, height);
        self.attached = Some((target.to_string(), width, height));
        Ok(())
    }

    fn create_sprite(&mut self, sheet: &str) -> Result<SpriteHandle, RenderError> {
        if !self.sheets.contains_key(sheet) {
            return Err(RenderError::UnknownSheet(sheet.to_string()));
        }
        let handle = SpriteHandle(self.next_sprite);
        self.next_sprite += 1;
        self.sprites.insert(
            handle,
            SpriteInstance {
                sheet_id: sheet.to_string(),
                player: ClipPlayer::new(self.clip_speed),
                top_left: Vec2::ZERO,
                flip_x: false,
                frame: None,
            },
        );
        Ok(handle)
    }

    fn destroy_sprite(&mut self, sprite: SpriteHandle) {
        self.sprites.remove(&sprite);
    }

    fn has_clip(&self, sprite: SpriteHandle, key: &str) -> bool {
        self.sprites
            .get(&sprite)
            .and_then(|instance| self.sheets.get(&instance.sheet_id))
            .is_some_and(|sheet| sheet.clip(key).is_some())
    }

    fn switch_clip(&mut self, sprite: SpriteHandle, key: &str) -> bool {
        let Some(instance) = self.sprites.get_mut(&sprite) else {
            log::warn!("switch_clip on unknown sprite {:?}", sprite);
            return false;
        };
        let Some(sheet) = self.sheets.get(&instance.sheet_id) else {
            return false;
        };
        instance.player.switch(sheet, key)
    }

    fn set_transform(&mut self, sprite: SpriteHandle, top_left: Vec2, flip_x: bool) {
        if let Some(instance) = self.sprites.get_mut(&sprite) {
            instance.top_left = top_left;
            instance.flip_x = flip_x;
        }
    }

    fn sprite_size(&self, sprite: SpriteHandle) -> Option<Vec2> {
        let instance = self.sprites.get(&sprite)?;
        let sheet = self.sheets.get(&instance.sheet_id)?;
        Some(Vec2::new(sheet.frame_width as f32, sheet.frame_height as f32))
    }

    fn present(&mut self, dt_us: u64) -> Result<(), RenderError> {
        if self.attached.is_none() {
            return Err(RenderError::Detached);
        }
        for (handle, instance) in self.sprites.iter_mut() {
            let Some(sheet) = self.sheets.get(&instance.sheet_id) else {
                continue;
            };
            instance.frame = instance.player.tick(dt_us, sheet).map(str::to_string);
            log::trace!(
                "sprite {:?} frame {:?} at {} flip={}",
                handle,
                instance.frame,
                instance.top_left,
                instance.flip_x
            );
        }
        self.frames_presented += 1;
        Ok(())
    }
}
