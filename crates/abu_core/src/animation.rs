//! Sprite sheets, animation clips and the per-sprite clip player.
//!
//! A sprite sheet groups the clips of one character under keys such as
//! `AbuWalkRight`. Clip timing uses integer microseconds (`u64`) so advancing
//! under the fixed tick is deterministic.
//!
//! The JSON format stores `duration_ms` for human readability; on load this
//! is converted to `duration_us` for internal use.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct AnimationFrame {
    pub sprite_id: String,
    pub duration_us: u64,
}

#[derive(Debug, Clone)]
pub struct AnimationClip {
    pub frames: Vec<AnimationFrame>,
    pub looping: bool,
}

impl AnimationClip {
    pub fn total_duration_us(&self) -> u64 {
        self.frames.iter().map(|f| f.duration_us).sum()
    }
}

/// All clips of one character, plus the frame footprint used for centering.
#[derive(Debug, Clone)]
pub struct SpriteSheet {
    pub sheet_id: String,
    pub frame_width: u32,
    pub frame_height: u32,
    pub clips: HashMap<String, AnimationClip>,
}

impl SpriteSheet {
    pub fn clip(&self, key: &str) -> Option<&AnimationClip> {
        self.clips.get(key)
    }
}

/// Runtime state for one active clip.
#[derive(Debug, Clone)]
pub struct AnimationState {
    pub clip_name: String,
    pub frame_index: usize,
    pub elapsed_us: u64,
    pub finished: bool,
}

impl AnimationState {
    pub fn new(clip_name: &str) -> Self {
        Self {
            clip_name: clip_name.to_string(),
            frame_index: 0,
            elapsed_us: 0,
            finished: false,
        }
    }

    /// Advance by `dt_us` microseconds and return the current frame's
    /// `sprite_id`.
    pub fn tick<'a>(&mut self, dt_us: u64, clip: &'a AnimationClip) -> &'a str {
        if clip.frames.is_empty() || self.finished {
            return if let Some(frame) = clip.frames.get(self.frame_index) {
                &frame.sprite_id
            } else if let Some(frame) = clip.frames.last() {
                &frame.sprite_id
            } else {
                ""
            };
        }

        self.elapsed_us += dt_us;

        loop {
            let current_frame = &clip.frames[self.frame_index];
            if self.elapsed_us < current_frame.duration_us {
                break;
            }

            self.elapsed_us -= current_frame.duration_us;
            self.frame_index += 1;

            if self.frame_index >= clip.frames.len() {
                if clip.looping {
                    self.frame_index = 0;
                } else {
                    self.frame_index = clip.frames.len() - 1;
                    self.elapsed_us = 0;
                    self.finished = true;
                    break;
                }
            }
        }

        &clip.frames[self.frame_index].sprite_id
    }
}

/// Plays one clip at a time out of a sheet.
///
/// Switching to a key the sheet does not have leaves the current clip playing
/// (and logs it); switching to the clip that is already active does not
/// restart it.
#[derive(Debug, Clone)]
pub struct ClipPlayer {
    pub speed: f64,
    state: Option<AnimationState>,
}

impl ClipPlayer {
    pub fn new(speed: f64) -> Self {
        Self { speed, state: None }
    }

    pub fn current_clip(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.clip_name.as_str())
    }

    pub fn state(&self) -> Option<&AnimationState> {
        self.state.as_ref()
    }

    /// Returns `false` when `key` is not in `sheet`.
    pub fn switch(&mut self, sheet: &SpriteSheet, key: &str) -> bool {
        if sheet.clip(key).is_none() {
            log::warn!(
                "Sheet '{}' has no clip '{}'; keeping {:?}",
                sheet.sheet_id,
                key,
                self.current_clip()
            );
            return false;
        }
        if self.current_clip() != Some(key) {
            self.state = Some(AnimationState::new(key));
        }
        true
    }

    /// Advance the active clip and return its current `sprite_id`.
    pub fn tick<'a>(&mut self, dt_us: u64, sheet: &'a SpriteSheet) -> Option<&'a str> {
        let state = self.state.as_mut()?;
        let clip = sheet.clip(&state.clip_name)?;
        let scaled = (dt_us as f64 * self.speed.max(0.0)).round() as u64;
        Some(state.tick(scaled, clip))
    }
}

// --- JSON deserialization types (private) ---

#[derive(Debug, Deserialize)]
struct SpriteSheetJson {
    version: String,
    sheet_id: String,
    frame_width: u32,
    frame_height: u32,
    clips: HashMap<String, AnimationClipJson>,
}

#[derive(Debug, Deserialize)]
struct AnimationClipJson {
    frames: Vec<AnimationFrameJson>,
    #[serde(default = "default_looping")]
    looping: bool,
}

#[derive(Debug, Deserialize)]
struct AnimationFrameJson {
    sprite_id: String,
    duration_ms: u64,
}

pub fn load_sprite_sheet(path: &Path) -> Result<SpriteSheet, String> {
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read sprite sheet {}: {e}", path.display()))?;
    parse_sprite_sheet(&raw)
        .map_err(|e| format!("Failed to load sprite sheet {}: {e}", path.display()))
}

pub fn parse_sprite_sheet(raw: &str) -> Result<SpriteSheet, String> {
    let json: SpriteSheetJson =
        serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {e}"))?;
    validate_sheet_json(&json)?;

    let clips = json
        .clips
        .into_iter()
        .map(|(name, clip_json)| {
            let frames = clip_json
                .frames
                .into_iter()
                .map(|f| AnimationFrame {
                    sprite_id: f.sprite_id,
                    duration_us: f.duration_ms * 1000,
                })
                .collect();
            (
                name,
                AnimationClip {
                    frames,
                    looping: clip_json.looping,
                },
            )
        })
        .collect();

    Ok(SpriteSheet {
        sheet_id: json.sheet_id,
        frame_width: json.frame_width,
        frame_height: json.frame_height,
        clips,
    })
}

fn validate_sheet_json(json: &SpriteSheetJson) -> Result<(), String> {
    if json.version != "0.1" {
        return Err(format!(
            "Sprite sheet validation failed: unsupported version '{}'",
            json.version
        ));
    }
    if json.sheet_id.is_empty() {
        return Err("Sprite sheet validation failed: sheet_id is empty".to_string());
    }
    if json.frame_width == 0 || json.frame_height == 0 {
        return Err("Sprite sheet validation failed: frame size must be > 0".to_string());
    }
    for (name, clip) in &json.clips {
        if clip.frames.is_empty() {
            return Err(format!(
                "Sprite sheet validation failed: clip '{}' has no frames",
                name
            ));
        }
        for (i, frame) in clip.frames.iter().enumerate() {
            if frame.sprite_id.is_empty() {
                return Err(format!(
                    "Sprite sheet validation failed: clip '{}' frame {} has empty sprite_id",
                    name, i
                ));
            }
            if frame.duration_ms == 0 {
                return Err(format!(
                    "Sprite sheet validation failed: clip '{}' frame {} has zero duration",
                    name, i
                ));
            }
        }
    }
    Ok(())
}

const fn default_looping() -> bool {
    true
}
