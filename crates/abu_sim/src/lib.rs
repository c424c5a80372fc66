pub mod entity;
pub mod physics;
pub mod reconciler;
pub mod render;
pub mod scene;
pub mod stepper;
