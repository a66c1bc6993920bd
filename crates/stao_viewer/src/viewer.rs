//! Window-independent viewer state: scene, camera, compositor and the
//! software device it renders into.

use std::path::PathBuf;

use anyhow::Result;
use stao_core::{Light, Scene};
use stao_math::{Camera, Vec3};
use stao_renderer::{create_engine, Compositor, FrameReport, GraphicsContext};

use crate::demo::{build_demo_scene, load_obj, DemoObject};
use crate::settings::ViewerSettings;
use crate::ui::{FrameInfo, PanelState};

pub struct Viewer {
    pub settings: ViewerSettings,
    pub scene: Scene,
    pub camera: Camera,
    pub light: Light,
    pub panel: PanelState,
    compositor: Compositor,
    gpu: GraphicsContext,
    last_report: FrameReport,
    dirty: bool,
}

impl Viewer {
    pub fn new(settings: ViewerSettings) -> Result<Self> {
        settings.validate()?;

        let (scene, objects) = match &settings.obj_path {
            Some(path) => {
                let mut scene = Scene::new(path.display().to_string());
                let handle = scene.insert(load_obj(path)?);
                let objects = vec![DemoObject {
                    handle,
                    params: Default::default(),
                }];
                (scene, objects)
            }
            None => build_demo_scene(),
        };

        let mut camera = Camera::new(
            Vec3::new(0.0, 2.0, 6.0),
            Vec3::ZERO,
            settings.window_width,
            settings.window_height,
        );
        camera.device_pixel_ratio = settings.render_scale;
        camera.frame_bounds(&scene.world_bounds());
        let light = Light::new(camera.position);

        let mut compositor = Compositor::new(settings.compositor.clone());
        let mut registrations = Vec::with_capacity(objects.len());
        for object in objects {
            let Some(renderable) = scene.get(object.handle) else {
                continue;
            };
            let mut engine = create_engine(renderable.kind());
            engine.set_params(object.params)?;
            let id = compositor.register(object.handle, engine);
            registrations.push((id, object.handle));
        }

        let (width, height) = camera.framebuffer_size();
        let gpu = GraphicsContext::new(width, height)?;
        let panel = PanelState::new(&compositor, &scene, &registrations);

        log::info!(
            "Viewer ready: {} objects, rendering at {}x{}",
            registrations.len(),
            width,
            height
        );

        Ok(Self {
            settings,
            scene,
            camera,
            light,
            panel,
            compositor,
            gpu,
            last_report: FrameReport::default(),
            dirty: true,
        })
    }

    /// Window size in physical pixels.
    pub fn set_window_size(&mut self, width: u32, height: u32) {
        self.camera.set_window_size(width, height);
        self.dirty = true;
    }

    /// Call after moving the camera from outside.
    pub fn camera_changed(&mut self) {
        self.dirty = true;
    }

    pub fn frame_scene(&mut self) {
        self.camera.frame_bounds(&self.scene.world_bounds());
        self.dirty = true;
        log::info!("Framed scene at {:?}, distance {:.2}", self.camera.target, self.camera.distance);
    }

    /// True while the view is changing or the average is still refining.
    pub fn wants_redraw(&self) -> bool {
        self.dirty
            || self.last_report.moved
            || (self.compositor.settings().refinement && self.last_report.samples < self.settings.max_samples)
    }

    /// Render one frame. The light follows the camera.
    pub fn render(&mut self) -> Result<FrameReport> {
        let (width, height) = self.camera.framebuffer_size();
        if self.gpu.surface()?.size() != (width, height) {
            self.gpu.resize_surface(width, height)?;
        }
        self.light.position = self.camera.position;

        let report = self
            .compositor
            .draw(&mut self.gpu, &self.scene, &self.camera, &self.light)?;
        self.panel.refresh(&self.compositor);
        self.last_report = report;
        self.dirty = false;
        Ok(report)
    }

    /// Size and RGBA8 bytes of the last rendered frame.
    pub fn frame_rgba(&self) -> Result<((u32, u32), Vec<u8>)> {
        let surface = self.gpu.surface()?;
        Ok((surface.size(), surface.to_image()?.into_raw()))
    }

    pub fn save_screenshot(&self) -> Result<PathBuf> {
        let path = self.settings.screenshot_path.clone();
        self.gpu.surface()?.save_png(&path)?;
        Ok(path)
    }

    pub fn frame_info(&self, fps: f32) -> FrameInfo {
        FrameInfo {
            fps,
            report: self.last_report,
            stats: self.compositor.stats(),
            render_size: self.camera.framebuffer_size(),
            max_samples: self.settings.max_samples,
        }
    }

    /// Apply the panel's edits and requests after the UI pass.
    pub fn apply_panel(&mut self) {
        if self.panel.apply(&mut self.compositor, &mut self.scene) {
            self.dirty = true;
        }
        if std::mem::take(&mut self.panel.frame_requested) {
            self.frame_scene();
        }
        if std::mem::take(&mut self.panel.screenshot_requested) {
            if let Err(err) = self.save_screenshot() {
                log::error!("Screenshot failed: {:#}", err);
            }
        }
    }

    pub fn shutdown(&mut self) {
        self.compositor.release(&mut self.gpu);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stao_renderer::{CompositorSettings, CompositorState};

    fn small_settings() -> ViewerSettings {
        ViewerSettings {
            compositor: CompositorSettings {
                repetition_level: 2,
                coarse_level: 1,
                kernel_size: 8,
                ..Default::default()
            },
            render_scale: 0.5,
            max_samples: 4,
            window_width: 48,
            window_height: 32,
            ..Default::default()
        }
    }

    #[test]
    fn test_demo_viewer_registers_every_object() {
        let viewer = Viewer::new(small_settings()).unwrap();
        assert_eq!(viewer.compositor.registration_count(), viewer.scene.len());
        assert_eq!(viewer.panel.objects.len(), viewer.scene.len());
        assert!(viewer.wants_redraw());
    }

    #[test]
    fn test_render_until_converged() {
        let mut viewer = Viewer::new(small_settings()).unwrap();
        let first = viewer.render().unwrap();
        assert!(first.cleared);
        assert_eq!(viewer.compositor.state(), CompositorState::Ready);

        let ((w, h), bytes) = viewer.frame_rgba().unwrap();
        assert_eq!((w, h), (24, 16));
        assert_eq!(bytes.len(), (w * h * 4) as usize);

        let mut frames = 1;
        while viewer.wants_redraw() && frames < 32 {
            viewer.render().unwrap();
            frames += 1;
        }
        assert!(!viewer.wants_redraw());
        assert!(viewer.frame_info(0.0).report.samples >= 4);
    }

    #[test]
    fn test_camera_change_requests_redraw() {
        let mut viewer = Viewer::new(small_settings()).unwrap();
        viewer.render().unwrap();
        viewer.camera.orbit(0.3, 0.0);
        viewer.camera_changed();
        assert!(viewer.wants_redraw());
        let report = viewer.render().unwrap();
        assert!(report.moved);
    }

    #[test]
    fn test_window_resize_changes_render_size() {
        let mut viewer = Viewer::new(small_settings()).unwrap();
        viewer.render().unwrap();
        viewer.set_window_size(64, 64);
        viewer.render().unwrap();
        let ((w, h), _) = viewer.frame_rgba().unwrap();
        assert_eq!((w, h), (32, 32));
        assert_eq!(viewer.compositor.framebuffer_size(), (32, 32));
    }

    #[test]
    fn test_screenshot_request() {
        let path = std::env::temp_dir().join("stao_viewer_screenshot_test.png");
        let mut viewer = Viewer::new(ViewerSettings {
            screenshot_path: path.clone(),
            ..small_settings()
        })
        .unwrap();
        viewer.render().unwrap();
        viewer.panel.screenshot_requested = true;
        viewer.apply_panel();
        assert!(!viewer.panel.screenshot_requested);
        assert!(path.is_file());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_obj_fails() {
        let result = Viewer::new(ViewerSettings {
            obj_path: Some(PathBuf::from("/nonexistent/mesh.obj")),
            ..small_settings()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_shutdown_releases_compositor() {
        let mut viewer = Viewer::new(small_settings()).unwrap();
        viewer.render().unwrap();
        viewer.shutdown();
        assert_eq!(viewer.compositor.state(), CompositorState::WindowUninitialized);
        assert!(viewer.compositor.stats().engine_releases > 0);
    }
}
