//! Integer-pixel 2D vector math.
//!
//! Every arithmetic result is rounded to the nearest whole number (ties away
//! from zero), so positions accumulated over many ticks never pick up
//! sub-pixel noise.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

impl Vector2 {
    pub const ZERO: Vector2 = Vector2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Independent copy of `self`.
    pub fn copy(&self) -> Self {
        Self {
            x: self.x,
            y: self.y,
        }
    }

    pub fn add(self, other: Vector2) -> Self {
        Self {
            x: (self.x + other.x).round(),
            y: (self.y + other.y).round(),
        }
    }

    /// Linear interpolation toward `other`. `t` is clamped to `[0, 1]`; a NaN
    /// `t` is treated as 0.
    pub fn lerp(self, other: Vector2, t: f32) -> Self {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        Self {
            x: (self.x + t * (other.x - self.x)).round(),
            y: (self.y + t * (other.y - self.y)).round(),
        }
    }

    pub fn is_integral(self) -> bool {
        self.x.fract() == 0.0 && self.y.fract() == 0.0
    }
}

impl std::ops::Add for Vector2 {
    type Output = Vector2;

    fn add(self, rhs: Vector2) -> Vector2 {
        Vector2::add(self, rhs)
    }
}

impl From<Vector2> for glam::Vec2 {
    fn from(v: Vector2) -> Self {
        glam::Vec2::new(v.x, v.y)
    }
}

impl From<glam::Vec2> for Vector2 {
    fn from(v: glam::Vec2) -> Self {
        Vector2::new(v.x, v.y)
    }
}

impl std::fmt::Display for Vector2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}
