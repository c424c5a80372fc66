//! Loop configuration, supplied once at construction.
//!
//! Everything here is checked by [`LoopConfig::validate`] before any timing
//! math runs; a bad tick rate would otherwise turn `1000 / tick_rate` into
//! infinity or NaN.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("tick rate must be a positive, finite number of ticks per second (got {0})")]
    InvalidTickRate(f64),
    #[error("render target id is empty")]
    EmptyRenderTarget,
    #[error("render target '{0}' was not found")]
    MissingRenderTarget(String),
    #[error("render target size must be non-zero (got {width}x{height})")]
    ZeroSize { width: u32, height: u32 },
    #[error("physics sub-step count must be at least 1")]
    ZeroSubSteps,
    #[error("physics fixed_dt must be a positive, finite number of seconds (got {0})")]
    InvalidFixedDt(f32),
    #[error("animation speed must be a finite, non-negative factor (got {0})")]
    InvalidAnimationSpeed(f64),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PhysicsConfig {
    #[serde(default)]
    pub gravity_x: f32,
    #[serde(default)]
    pub gravity_y: f32,
    #[serde(default = "default_allow_sleep")]
    pub allow_sleep: bool,
    /// Seconds advanced per physics step.
    #[serde(default = "default_fixed_dt")]
    pub fixed_dt: f32,
    #[serde(default = "default_sub_steps")]
    pub sub_steps: u32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity_x: 0.0,
            gravity_y: 0.0,
            allow_sleep: default_allow_sleep(),
            fixed_dt: default_fixed_dt(),
            sub_steps: default_sub_steps(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoopConfig {
    /// Id of the surface the renderer attaches to.
    #[serde(default = "default_render_target")]
    pub render_target: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Logical updates per second.
    #[serde(default = "default_tick_rate")]
    pub tick_rate: f64,
    /// Playback rate of sprite clips; 1.0 plays frames at their authored
    /// durations.
    #[serde(default = "default_animation_speed")]
    pub animation_speed: f64,
    #[serde(default)]
    pub physics: PhysicsConfig,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            render_target: default_render_target(),
            width: default_width(),
            height: default_height(),
            tick_rate: default_tick_rate(),
            animation_speed: default_animation_speed(),
            physics: PhysicsConfig::default(),
        }
    }
}

impl LoopConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.render_target.trim().is_empty() {
            return Err(ConfigError::EmptyRenderTarget);
        }
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::ZeroSize {
                width: self.width,
                height: self.height,
            });
        }
        validate_tick_rate(self.tick_rate)?;
        if self.physics.sub_steps == 0 {
            return Err(ConfigError::ZeroSubSteps);
        }
        if !self.animation_speed.is_finite() || self.animation_speed < 0.0 {
            return Err(ConfigError::InvalidAnimationSpeed(self.animation_speed));
        }
        if !self.physics.fixed_dt.is_finite() || self.physics.fixed_dt <= 0.0 {
            return Err(ConfigError::InvalidFixedDt(self.physics.fixed_dt));
        }
        Ok(())
    }

    /// Milliseconds between logical updates.
    pub fn interval_ms(&self) -> Result<f64, ConfigError> {
        validate_tick_rate(self.tick_rate)?;
        Ok(1000.0 / self.tick_rate)
    }
}

pub fn validate_tick_rate(tick_rate: f64) -> Result<(), ConfigError> {
    if !tick_rate.is_finite() || tick_rate <= 0.0 {
        return Err(ConfigError::InvalidTickRate(tick_rate));
    }
    Ok(())
}

pub fn load_config_from_path(path: &Path) -> Result<LoopConfig, String> {
    let raw =
        fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    let config: LoopConfig = serde_json::from_str(&raw)
        .map_err(|e| format!("Failed to parse config JSON {}: {e}", path.display()))?;
    config
        .validate()
        .map_err(|e| format!("Config validation failed for {}: {e}", path.display()))?;
    Ok(config)
}

fn default_render_target() -> String {
    "main-lp".to_string()
}

const fn default_width() -> u32 {
    760
}

const fn default_height() -> u32 {
    540
}

const fn default_tick_rate() -> f64 {
    60.0
}

const fn default_animation_speed() -> f64 {
    0.2
}

const fn default_allow_sleep() -> bool {
    true
}

const fn default_fixed_dt() -> f32 {
    1.0 / 60.0
}

const fn default_sub_steps() -> u32 {
    1
}
