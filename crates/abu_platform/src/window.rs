use std::sync::Arc;
use winit::error::OsError;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window, WindowAttributes};

use abu_core::config::LoopConfig;

pub struct WindowSpec {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl WindowSpec {
    /// Window sized to the loop's render target.
    pub fn for_loop(title: &str, config: &LoopConfig) -> Self {
        Self {
            title: format!("{} [{}]", title, config.render_target),
            width: config.width,
            height: config.height,
        }
    }
}

impl Default for WindowSpec {
    fn default() -> Self {
        Self::for_loop("Abu", &LoopConfig::default())
    }
}

pub fn create_window(event_loop: &ActiveEventLoop, spec: &WindowSpec) -> Result<Arc<Window>, OsError> {
    let attrs = WindowAttributes::default()
        .with_title(&spec.title)
        .with_resizable(false)
        .with_inner_size(winit::dpi::LogicalSize::new(spec.width, spec.height));

    let window = event_loop.create_window(attrs)?;
    log::info!("Window created: {}x{} '{}'", spec.width, spec.height, spec.title);
    Ok(Arc::new(window))
}
