//! Abu -- window host and application entry point.
//!
//! Architecture: winit drives the event loop via `ApplicationHandler`. Every
//! `RedrawRequested` is one frame callback into the [`Stepper`]:
//!
//!   1. the stepper re-arms the loop through [`RedrawScheduler`] (another redraw)
//!   2. physics advances one fixed step
//!   3. once per tick interval, held keys become a command batch per controlled
//!      entity and the render pass runs
//!
//! Keyboard events only update key state; nothing is simulated outside the
//! frame callback. Escape or closing the window disposes the stepper, which
//! cancels the pending redraw before the loop exits.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use abu_core::config::{load_config_from_path, LoopConfig};
use abu_core::input::Key;
use abu_platform::keys::map_key;
use abu_platform::window::{create_window, WindowSpec};
use abu_sim::physics::RapierWorld;
use abu_sim::reconciler::unix_millis;
use abu_sim::render::SheetRenderer;
use abu_sim::scene::{load_scene_from_path, load_scene_sheets, spawn_scene};
use abu_sim::stepper::{FrameOutcome, FrameRequest, FrameScheduler, Stepper};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::{Window, WindowId};

const DEFAULT_SCENE: &str = "assets/scenes/courtyard.json";
const DIAGNOSTIC_TICKS: u64 = 600;

#[derive(Debug, Clone, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    scene: PathBuf,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args, String> {
    let mut parsed = Args {
        config: None,
        scene: PathBuf::from(DEFAULT_SCENE),
    };
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().ok_or("--config needs a path")?;
                parsed.config = Some(PathBuf::from(path));
            }
            "--scene" => {
                let path = args.next().ok_or("--scene needs a path")?;
                parsed.scene = PathBuf::from(path);
            }
            other => return Err(format!("Unknown argument '{other}'")),
        }
    }
    Ok(parsed)
}

/// Frame scheduling on top of winit redraw requests.
struct RedrawScheduler {
    window: Arc<Window>,
    next: u64,
    pending: Option<FrameRequest>,
}

impl RedrawScheduler {
    fn new(window: Arc<Window>) -> Self {
        Self {
            window,
            next: 0,
            pending: None,
        }
    }

    /// Whether a redraw belongs to a frame the stepper still wants.
    fn take_pending(&mut self) -> bool {
        self.pending.take().is_some()
    }
}

impl FrameScheduler for RedrawScheduler {
    fn request_frame(&mut self) -> FrameRequest {
        self.next += 1;
        let request = FrameRequest(self.next);
        self.pending = Some(request);
        self.window.request_redraw();
        request
    }

    fn cancel_frame(&mut self, request: FrameRequest) {
        // winit cannot retract a redraw request; a cancelled one is skipped
        // when it arrives.
        if self.pending == Some(request) {
            self.pending = None;
        }
    }
}

struct GameState {
    stepper: Stepper,
    scheduler: RedrawScheduler,
}

impl GameState {
    fn new(window: Arc<Window>, config: LoopConfig, scene_path: &Path) -> Result<Self, String> {
        let scene = load_scene_from_path(scene_path)?;
        let sheets = load_scene_sheets(scene_path, &scene)?;

        let mut renderer = SheetRenderer::new(&[config.render_target.as_str()])
            .with_clip_speed(config.animation_speed);
        for sheet in sheets {
            renderer.add_sheet(sheet);
        }

        let physics = RapierWorld::new(&config.physics);
        let mut stepper = Stepper::new(config, Box::new(renderer))
            .map_err(|e| format!("Failed to start stepper: {e}"))?;
        stepper
            .attach_physics(Box::new(physics))
            .map_err(|e| format!("Failed to attach physics: {e}"))?;
        spawn_scene(&mut stepper, &scene)
            .map_err(|e| format!("Failed to spawn scene '{}': {e}", scene.scene_id))?;

        let mut scheduler = RedrawScheduler::new(window);
        scheduler.request_frame();
        Ok(Self { stepper, scheduler })
    }

    fn shutdown(&mut self) {
        self.stepper.dispose(&mut self.scheduler);
    }
}

struct App {
    config: LoopConfig,
    scene_path: PathBuf,
    state: Option<GameState>,
}

impl App {
    fn new(config: LoopConfig, scene_path: PathBuf) -> Self {
        Self {
            config,
            scene_path,
            state: None,
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        let window = match create_window(event_loop, &WindowSpec::for_loop("Abu", &self.config)) {
            Ok(window) => window,
            Err(e) => {
                log::error!("Failed to create window: {e}");
                event_loop.exit();
                return;
            }
        };
        match GameState::new(window, self.config.clone(), &self.scene_path) {
            Ok(state) => self.state = Some(state),
            Err(e) => {
                log::error!("{e}");
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let state = match self.state.as_mut() {
            Some(s) => s,
            None => return,
        };

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, exiting.");
                state.shutdown();
                event_loop.exit();
            }

            WindowEvent::Focused(false) => {
                state.stepper.input_mut().release_all();
            }

            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(key_code) = event.physical_key else {
                    return;
                };
                let Some(key) = map_key(key_code) else {
                    return;
                };
                match event.state {
                    ElementState::Pressed if key == Key::Escape => {
                        log::info!("Escape pressed, exiting.");
                        state.shutdown();
                        event_loop.exit();
                    }
                    ElementState::Pressed => state.stepper.input_mut().key_down(key),
                    ElementState::Released => state.stepper.input_mut().key_up(key),
                }
            }

            WindowEvent::RedrawRequested => {
                if !state.scheduler.take_pending() {
                    return;
                }
                let outcome = state
                    .stepper
                    .on_frame(unix_millis() as f64, &mut state.scheduler);
                let clock = state.stepper.clock();
                if outcome == FrameOutcome::Ticked && clock.tick_count % DIAGNOSTIC_TICKS == 0 {
                    log::debug!(
                        "tick {} | {:.1} frames/s | {} faults",
                        clock.tick_count,
                        clock.smoothed_frame_rate,
                        state.stepper.fault_count()
                    );
                }
            }

            _ => {}
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            log::error!("{e}");
            eprintln!("usage: abu_game [--config <loop.json>] [--scene <scene.json>]");
            std::process::exit(2);
        }
    };
    let config = match &args.config {
        Some(path) => match load_config_from_path(path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("{e}");
                std::process::exit(1);
            }
        },
        None => LoopConfig::default(),
    };

    log::info!("Abu starting with scene {}", args.scene.display());

    let event_loop = EventLoop::new().expect("Failed to create event loop");
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(config, args.scene);
    event_loop.run_app(&mut app).expect("Event loop error");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_arguments_uses_default_scene() {
        let parsed = parse_args(args(&[])).expect("empty args are valid");
        assert_eq!(parsed.config, None);
        assert_eq!(parsed.scene, PathBuf::from(DEFAULT_SCENE));
    }

    #[test]
    fn config_and_scene_paths_are_read() {
        let parsed = parse_args(args(&["--scene", "a.json", "--config", "loop.json"]))
            .expect("valid args");
        assert_eq!(parsed.scene, PathBuf::from("a.json"));
        assert_eq!(parsed.config, Some(PathBuf::from("loop.json")));
    }

    #[test]
    fn missing_value_and_unknown_flag_are_errors() {
        assert!(parse_args(args(&["--scene"])).is_err());
        let err = parse_args(args(&["--fast"])).expect_err("unknown flag");
        assert!(err.contains("--fast"));
    }
}
