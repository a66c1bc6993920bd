mod demo;
mod presenter;
mod settings;
mod shader_library;
mod ui;
mod viewer;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use presenter::Presenter;
use settings::ViewerSettings;
use shader_library::ShaderLibrary;
use viewer::Viewer;

/// Application state
struct App {
    viewer: Viewer,
    window: Option<Arc<Window>>,
    presenter: Option<Presenter>,

    // Input state
    left_mouse_pressed: bool,
    middle_mouse_pressed: bool,
    last_mouse_pos: Option<(f64, f64)>,
    keys_pressed: HashSet<KeyCode>,
    last_frame_time: Instant,

    // FPS counter
    fps: f32,
    frame_count: u32,
    fps_timer: f32,
}

impl App {
    fn new(viewer: Viewer) -> Self {
        Self {
            viewer,
            window: None,
            presenter: None,
            left_mouse_pressed: false,
            middle_mouse_pressed: false,
            last_mouse_pos: None,
            keys_pressed: HashSet::new(),
            last_frame_time: Instant::now(),
            fps: 0.0,
            frame_count: 0,
            fps_timer: 0.0,
        }
    }

    fn init_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let settings = &self.viewer.settings;
        let window_attrs = Window::default_attributes()
            .with_title("STAO Viewer")
            .with_inner_size(winit::dpi::PhysicalSize::new(settings.window_width, settings.window_height));
        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let shaders = ShaderLibrary::new(settings.shader_paths.clone());
        let presenter = pollster::block_on(Presenter::new(window.clone(), &shaders))?;

        let size = window.inner_size();
        self.viewer.set_window_size(size.width, size.height);
        self.window = Some(window);
        self.presenter = Some(presenter);
        Ok(())
    }

    fn update_fps(&mut self, delta_time: f32) {
        self.frame_count += 1;
        self.fps_timer += delta_time;
        if self.fps_timer >= 0.5 {
            self.fps = self.frame_count as f32 / self.fps_timer;
            self.frame_count = 0;
            self.fps_timer = 0.0;
        }
    }

    fn move_with_keys(&mut self, delta_time: f32) {
        let mut right = 0.0;
        let mut up = 0.0;
        let mut forward = 0.0;
        if self.keys_pressed.contains(&KeyCode::KeyW) {
            forward += 1.0;
        }
        if self.keys_pressed.contains(&KeyCode::KeyS) {
            forward -= 1.0;
        }
        if self.keys_pressed.contains(&KeyCode::KeyA) {
            right -= 1.0;
        }
        if self.keys_pressed.contains(&KeyCode::KeyD) {
            right += 1.0;
        }
        if self.keys_pressed.contains(&KeyCode::KeyE) {
            up += 1.0;
        }
        if self.keys_pressed.contains(&KeyCode::KeyQ) {
            up -= 1.0;
        }
        if right != 0.0 || up != 0.0 || forward != 0.0 {
            self.viewer.camera.pan(right, up, forward, delta_time);
            self.viewer.camera_changed();
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        let delta_time = (now - self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.update_fps(delta_time);
        self.move_with_keys(delta_time);

        let (Some(presenter), Some(window)) = (&mut self.presenter, &self.window) else {
            return;
        };

        if self.viewer.wants_redraw() {
            match self.viewer.render() {
                Ok(_) => match self.viewer.frame_rgba() {
                    Ok(((width, height), rgba)) => presenter.upload(width, height, &rgba),
                    Err(e) => log::error!("Failed to read frame: {:#}", e),
                },
                Err(e) => log::error!("Compositor error: {:#}", e),
            }
        }

        let info = self.viewer.frame_info(self.fps);
        let panel = &mut self.viewer.panel;
        let result = presenter.render(window, |ctx| ui::draw_panel(ctx, panel, &info));
        self.viewer.apply_panel();

        if let Err(e) = result {
            if let Some(surface_err) = e.downcast_ref::<wgpu::SurfaceError>() {
                match surface_err {
                    wgpu::SurfaceError::Lost => {
                        let size = presenter.size();
                        presenter.resize(size);
                    }
                    wgpu::SurfaceError::OutOfMemory => {
                        log::error!("Out of memory!");
                        event_loop.exit();
                    }
                    _ => log::error!("Surface error: {:?}", surface_err),
                }
            } else {
                log::error!("Render error: {:?}", e);
            }
        }

        if self.viewer.wants_redraw() {
            window.request_redraw();
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            match self.init_window(event_loop) {
                Ok(()) => log::info!("Window and presenter initialized"),
                Err(e) => {
                    log::error!("Failed to initialize window: {:#}", e);
                    event_loop.exit();
                }
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        // Let egui handle the event first
        if let (Some(presenter), Some(window)) = (&mut self.presenter, &self.window) {
            if presenter.handle_egui_event(window, &event) {
                window.request_redraw();
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested");
                self.viewer.shutdown();
                event_loop.exit();
            }
            WindowEvent::Resized(physical_size) => {
                if let Some(presenter) = &mut self.presenter {
                    presenter.resize((physical_size.width, physical_size.height));
                }
                self.viewer.set_window_size(physical_size.width, physical_size.height);
                log::info!("Resized to {}x{}", physical_size.width, physical_size.height);
            }
            WindowEvent::MouseInput { button, state, .. } => match button {
                MouseButton::Left => {
                    self.left_mouse_pressed = state == ElementState::Pressed;
                    if !self.left_mouse_pressed {
                        self.last_mouse_pos = None;
                    }
                }
                MouseButton::Middle => {
                    self.middle_mouse_pressed = state == ElementState::Pressed;
                    if !self.middle_mouse_pressed {
                        self.last_mouse_pos = None;
                    }
                }
                _ => {}
            },
            WindowEvent::CursorMoved { position, .. } => {
                if self.left_mouse_pressed || self.middle_mouse_pressed {
                    if let Some(last_pos) = self.last_mouse_pos {
                        let delta_x = (position.x - last_pos.0) as f32;
                        let delta_y = (position.y - last_pos.1) as f32;
                        let camera = &mut self.viewer.camera;
                        if self.left_mouse_pressed {
                            let sensitivity = 0.005;
                            camera.orbit(-delta_x * sensitivity, -delta_y * sensitivity);
                        } else {
                            let sensitivity = 0.1;
                            let distance_scale = camera.distance * 0.01;
                            camera.pan(
                                -delta_x * sensitivity * distance_scale,
                                delta_y * sensitivity * distance_scale,
                                0.0,
                                0.01,
                            );
                        }
                        self.viewer.camera_changed();
                    }
                    self.last_mouse_pos = Some((position.x, position.y));
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let scroll_amount = match delta {
                    winit::event::MouseScrollDelta::LineDelta(_, y) => y * 100.0,
                    winit::event::MouseScrollDelta::PixelDelta(pos) => pos.y as f32,
                };
                self.viewer.camera.dolly(-scroll_amount);
                self.viewer.camera_changed();
            }
            WindowEvent::KeyboardInput {
                event: KeyEvent {
                    physical_key: PhysicalKey::Code(keycode),
                    state,
                    ..
                },
                ..
            } => match state {
                ElementState::Pressed => {
                    self.keys_pressed.insert(keycode);
                    match keycode {
                        KeyCode::KeyF => self.viewer.frame_scene(),
                        KeyCode::Tab => self.viewer.panel.show = !self.viewer.panel.show,
                        KeyCode::KeyP => self.viewer.panel.screenshot_requested = true,
                        _ => {}
                    }
                }
                ElementState::Released => {
                    self.keys_pressed.remove(&keycode);
                }
            },
            WindowEvent::RedrawRequested => {
                self.redraw(event_loop);
                return;
            }
            _ => {}
        }

        if self.viewer.wants_redraw() {
            if let Some(window) = &self.window {
                window.request_redraw();
            }
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        // Keep redrawing while keys move the camera
        if !self.keys_pressed.is_empty() {
            if let Some(window) = &self.window {
                window.request_redraw();
            }
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("Starting STAO Viewer");

    let settings = ViewerSettings::from_args(std::env::args())?;
    let viewer = Viewer::new(settings)?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(viewer);
    event_loop.run_app(&mut app)?;
    Ok(())
}
