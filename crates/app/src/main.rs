//! lantern demo viewer.
//!
//! Opens a window, loads the procedural cube scene and orbits a camera
//! around it while the child cube circles its parent.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use glam::Vec3;
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowId;

use lantern_core::{FrameTimer, RendererConfig, WindowConfig};
use lantern_platform::Window;
use lantern_renderer::{FrameStatus, Renderer, SceneId};
use lantern_resources::{ProceduralImporter, SceneImporter};
use lantern_scene::{Camera, NodeId, Transform};

const ORBIT_RADIUS: f32 = 5.0;
const ORBIT_SPEED: f32 = 0.4;
const SATELLITE_SPEED: f32 = 1.2;

struct App {
    config: RendererConfig,
    window_config: WindowConfig,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    scene: Option<SceneId>,
    timer: FrameTimer,
}

impl App {
    fn new(config: RendererConfig) -> Self {
        Self {
            config,
            window_config: WindowConfig::default(),
            window: None,
            renderer: None,
            scene: None,
            timer: FrameTimer::new(Duration::from_secs(1)),
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Arc::new(Window::new(event_loop, &self.window_config)?);
        let mut renderer = Renderer::new(&self.config, window.clone())?;

        let graph = ProceduralImporter.import()?;
        let scene = renderer.add_scene(graph)?;
        renderer.set_active_scene(scene)?;

        info!("Running on {}", renderer.adapter_name());
        self.scene = Some(scene);
        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn animate(&mut self, elapsed: f32) {
        let (Some(renderer), Some(id)) = (self.renderer.as_mut(), self.scene) else {
            return;
        };
        let Some(model) = renderer
            .scene_mut(id)
            .and_then(|scene| scene.model_mut("textured_cube"))
        else {
            return;
        };

        let tree = model.tree_mut();
        let satellite = (0..tree.len())
            .map(NodeId)
            .find(|&id| tree.get(id).is_some_and(|node| node.name == "satellite"));
        if let Some(satellite) = satellite {
            let angle = elapsed * SATELLITE_SPEED;
            let mut transform = Transform::from_translation(Vec3::new(
                1.5 * angle.cos(),
                0.5,
                1.5 * angle.sin(),
            ))
            .with_scale(Vec3::splat(0.4));
            transform.rotate_y(-angle);
            if let Err(e) = tree.set_local_transform(satellite, transform.to_matrix()) {
                warn!("Failed to animate satellite: {}", e);
            }
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let (_, timing) = self.timer.tick();
        let elapsed = self.timer.elapsed_secs();
        self.animate(elapsed);

        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        let camera = Camera::orbit(Vec3::ZERO, ORBIT_RADIUS, elapsed * ORBIT_SPEED, 0.35);

        match renderer.draw(&camera) {
            Ok(FrameStatus::Presented | FrameStatus::Rebuilt | FrameStatus::Deferred) => {}
            Err(e) => {
                if e.is_unrecoverable() {
                    error!("Device lost: {}", e);
                } else {
                    error!("Frame failed: {}", e);
                }
                event_loop.exit();
                return;
            }
        }

        if let Some(timing) = timing {
            let stats = renderer.stats();
            info!(
                "{:.1} fps ({:.2} ms), {} presented, {} rebuild(s), {} deferred",
                timing.fps(),
                timing.frame_time_ms(),
                stats.presented,
                stats.rebuilds,
                stats.deferred
            );
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            error!("Failed to start: {:#}", e);
            event_loop.exit();
        } else {
            info!("Initialization complete, entering main loop");
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // Renderer first: the surface must go before the window.
        self.renderer = None;
        self.window = None;
    }
}

fn main() -> Result<()> {
    lantern_core::init_logging();
    info!("Starting lantern");

    let config = RendererConfig::default();
    config.validate()?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}
