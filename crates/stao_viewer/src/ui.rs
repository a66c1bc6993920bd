//! Side panel with compositor statistics and controls.
//!
//! The panel edits a copy of the settings and per-object rows; `apply`
//! pushes the edits into the compositor and scene after the egui pass.

use stao_core::{GeometryKind, ObjectHandle, Scene};
use stao_renderer::{
    Compositor, CompositorSettings, CompositorStats, EngineParams, FrameReport, RegistrationId, ShadingModel,
};

/// One registered object as shown in the panel.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectRow {
    pub id: RegistrationId,
    pub handle: ObjectHandle,
    pub name: String,
    pub kind: GeometryKind,
    pub visible: bool,
    pub opacity_scale: f32,
    pub failed: bool,
}

/// Read-only numbers for the statistics section.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameInfo {
    pub fps: f32,
    pub report: FrameReport,
    pub stats: CompositorStats,
    pub render_size: (u32, u32),
    pub max_samples: u32,
}

pub struct PanelState {
    pub show: bool,
    pub settings: CompositorSettings,
    pub objects: Vec<ObjectRow>,
    pub screenshot_requested: bool,
    pub frame_requested: bool,
}

impl PanelState {
    pub fn new(compositor: &Compositor, scene: &Scene, registrations: &[(RegistrationId, ObjectHandle)]) -> Self {
        let objects = registrations
            .iter()
            .filter_map(|&(id, handle)| {
                let object = scene.get(handle)?;
                let engine = compositor.engine(id).ok()?;
                Some(ObjectRow {
                    id,
                    handle,
                    name: object.name.clone(),
                    kind: object.kind(),
                    visible: object.visible,
                    opacity_scale: engine.params().opacity_scale,
                    failed: false,
                })
            })
            .collect();
        Self {
            show: true,
            settings: compositor.settings().clone(),
            objects,
            screenshot_requested: false,
            frame_requested: false,
        }
    }

    /// Pick up engine failures reported by the last frame.
    pub fn refresh(&mut self, compositor: &Compositor) {
        for row in &mut self.objects {
            row.failed = compositor.is_failed(row.id).unwrap_or(false);
        }
    }

    /// Push panel edits into the compositor and scene. Returns true when
    /// anything changed. Rejected values are reset to the current ones.
    pub fn apply(&mut self, compositor: &mut Compositor, scene: &mut Scene) -> bool {
        let mut changed = false;

        if self.settings != *compositor.settings() {
            if let Err(err) = compositor.apply_settings(&self.settings) {
                log::warn!("Rejected settings change: {}", err);
            }
            self.settings = compositor.settings().clone();
            compositor.invalidate();
            changed = true;
        }

        for row in &mut self.objects {
            if let Some(object) = scene.get(row.handle) {
                if object.visible != row.visible {
                    scene.set_visible(row.handle, row.visible);
                    changed = true;
                }
            }

            let Ok(engine) = compositor.engine_mut(row.id) else {
                continue;
            };
            if engine.params().opacity_scale != row.opacity_scale {
                let params = EngineParams {
                    opacity_scale: row.opacity_scale,
                    ..engine.params().clone()
                };
                if let Err(err) = engine.set_params(params) {
                    log::warn!("Rejected opacity for {}: {}", row.name, err);
                    row.opacity_scale = engine.params().opacity_scale;
                }
                changed = true;
            }
        }
        changed
    }
}

pub fn draw_panel(ctx: &egui::Context, panel: &mut PanelState, info: &FrameInfo) {
    if !panel.show {
        return;
    }

    egui::SidePanel::left("compositor_panel")
        .default_width(300.0)
        .show(ctx, |ui| {
            ui.heading("STAO Viewer");
            ui.separator();

            ui.label(format!("FPS: {:.1}", info.fps));
            ui.label(format!(
                "Samples: {} / {}",
                info.report.samples, info.max_samples
            ));
            ui.separator();

            ui.collapsing("Statistics", |ui| {
                ui.label(format!("Render size: {}x{}", info.render_size.0, info.render_size.1));
                ui.label(format!("Repetitions this frame: {}", info.report.repetitions));
                ui.label(format!("Moving: {}", info.report.moved));
                ui.label(format!("Frames: {}", info.stats.frames));
                ui.label(format!("Ensemble clears: {}", info.stats.ensemble_clears));
                ui.label(format!("G-buffer creations: {}", info.stats.gbuffer_creations));
                ui.label(format!(
                    "Engines created / released: {} / {}",
                    info.stats.engine_creations, info.stats.engine_releases
                ));
                ui.label(format!("Engine failures: {}", info.stats.engine_failures));
            });

            ui.separator();

            ui.collapsing("Sampling", |ui| {
                let settings = &mut panel.settings;
                ui.add(egui::Slider::new(&mut settings.repetition_level, 1..=64).text("Repetitions"));
                ui.add(egui::Slider::new(&mut settings.coarse_level, 1..=16).text("Coarse repetitions"));
                ui.checkbox(&mut settings.lod, "Level-of-detail control");
                ui.checkbox(&mut settings.refinement, "Progressive refinement");
            });

            ui.collapsing("Occlusion", |ui| {
                let settings = &mut panel.settings;
                ui.add(
                    egui::Slider::new(&mut settings.kernel_radius, 0.01..=4.0)
                        .logarithmic(true)
                        .text("Kernel radius"),
                );
                ui.add(egui::Slider::new(&mut settings.kernel_size, 1..=128).text("Kernel size"));
                ui.add(egui::Slider::new(&mut settings.occlusion_bias, 0.0..=0.2).text("Bias"));
                ui.checkbox(&mut settings.draw_occlusion_factor, "Show occlusion factor");
            });

            ui.collapsing("Shading", |ui| {
                let settings = &mut panel.settings;
                egui::ComboBox::from_label("Model")
                    .selected_text(settings.shading_model.label())
                    .show_ui(ui, |ui| {
                        for model in ShadingModel::ALL {
                            ui.selectable_value(&mut settings.shading_model, model, model.label());
                        }
                    });
                ui.add(egui::Slider::new(&mut settings.shading.ka, 0.0..=1.0).text("Ambient"));
                ui.add(egui::Slider::new(&mut settings.shading.kd, 0.0..=1.0).text("Diffuse"));
                ui.add(egui::Slider::new(&mut settings.shading.ks, 0.0..=1.0).text("Specular"));
                ui.add(egui::Slider::new(&mut settings.shading.s, 1.0..=128.0).text("Shininess"));
                ui.checkbox(&mut settings.two_sided_lighting, "Two-sided lighting");

                let mut background = settings.background.truncate().to_array();
                ui.horizontal(|ui| {
                    ui.label("Background");
                    ui.color_edit_button_rgb(&mut background);
                });
                settings.background = stao_math::Vec3::from_array(background).extend(1.0);
            });

            ui.separator();

            ui.collapsing("Objects", |ui| {
                for row in &mut panel.objects {
                    ui.push_id(row.id, |ui| {
                        ui.horizontal(|ui| {
                            ui.checkbox(&mut row.visible, format!("{} ({})", row.name, row.kind));
                            if row.failed {
                                ui.colored_label(egui::Color32::RED, "failed");
                            }
                        });
                        ui.add(egui::Slider::new(&mut row.opacity_scale, 0.0..=2.0).text("Opacity"));
                    });
                }
            });

            ui.separator();

            ui.horizontal(|ui| {
                if ui.button("Frame scene").clicked() {
                    panel.frame_requested = true;
                }
                if ui.button("Screenshot").clicked() {
                    panel.screenshot_requested = true;
                }
            });

            ui.collapsing("Controls", |ui| {
                ui.label("Left Mouse: Tumble (orbit)");
                ui.label("Middle Mouse: Track (pan)");
                ui.label("Scroll Wheel: Dolly (zoom)");
                ui.label("W/A/S/D: Move forward/left/back/right");
                ui.label("Q/E: Move down/up");
                ui.label("F: Frame scene");
                ui.label("Tab: Toggle panel");
                ui.label("P: Screenshot");
            });
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use stao_core::{Geometry, PolygonMesh, RenderableObject};
    use stao_math::Vec3;
    use stao_renderer::create_engine;

    fn setup() -> (Compositor, Scene, Vec<(RegistrationId, ObjectHandle)>) {
        let mut scene = Scene::new("test");
        let mesh = PolygonMesh::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![0, 1, 2]);
        let handle = scene.insert(RenderableObject::new("triangle", Geometry::Polygon(mesh)));
        let mut compositor = Compositor::default();
        let id = compositor.register(handle, create_engine(GeometryKind::Polygon));
        (compositor, scene, vec![(id, handle)])
    }

    #[test]
    fn test_rows_mirror_registrations() {
        let (compositor, scene, registrations) = setup();
        let panel = PanelState::new(&compositor, &scene, &registrations);
        assert_eq!(panel.objects.len(), 1);
        let row = &panel.objects[0];
        assert_eq!(row.name, "triangle");
        assert_eq!(row.kind, GeometryKind::Polygon);
        assert!(row.visible);
        assert_eq!(row.opacity_scale, 1.0);
        assert_eq!(panel.settings, *compositor.settings());
    }

    #[test]
    fn test_unchanged_panel_applies_nothing() {
        let (mut compositor, mut scene, registrations) = setup();
        let mut panel = PanelState::new(&compositor, &scene, &registrations);
        assert!(!panel.apply(&mut compositor, &mut scene));
    }

    #[test]
    fn test_apply_settings_and_objects() {
        let (mut compositor, mut scene, registrations) = setup();
        let mut panel = PanelState::new(&compositor, &scene, &registrations);

        panel.settings.kernel_size = 8;
        panel.settings.shading_model = ShadingModel::Lambert;
        panel.objects[0].visible = false;
        panel.objects[0].opacity_scale = 0.5;
        assert!(panel.apply(&mut compositor, &mut scene));

        assert_eq!(compositor.settings().kernel_size, 8);
        assert_eq!(compositor.settings().shading_model, ShadingModel::Lambert);
        let (id, handle) = registrations[0];
        assert!(!scene.get(handle).unwrap().visible);
        assert_eq!(compositor.engine(id).unwrap().params().opacity_scale, 0.5);
    }

    #[test]
    fn test_rejected_values_reset() {
        let (mut compositor, mut scene, registrations) = setup();
        let mut panel = PanelState::new(&compositor, &scene, &registrations);

        panel.settings.kernel_radius = -1.0;
        panel.objects[0].opacity_scale = -2.0;
        panel.apply(&mut compositor, &mut scene);

        assert_eq!(panel.settings, *compositor.settings());
        assert_eq!(panel.settings.kernel_radius, CompositorSettings::default().kernel_radius);
        assert_eq!(panel.objects[0].opacity_scale, 1.0);
    }

    #[test]
    fn test_refresh_without_frames() {
        let (compositor, scene, registrations) = setup();
        let mut panel = PanelState::new(&compositor, &scene, &registrations);
        panel.refresh(&compositor);
        assert!(!panel.objects[0].failed);
    }
}
