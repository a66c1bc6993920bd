//! Viewer configuration, loaded from an optional JSON file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use stao_renderer::CompositorSettings;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerSettings {
    pub compositor: CompositorSettings,
    /// Fraction of the window resolution the compositor renders at.
    pub render_scale: f32,
    /// Stop redrawing a static view once the average holds this many samples.
    pub max_samples: u32,
    /// Directories searched for shader files before the embedded copies.
    pub shader_paths: Vec<PathBuf>,
    /// OBJ mesh shown instead of the demo scene.
    pub obj_path: Option<PathBuf>,
    pub screenshot_path: PathBuf,
    pub window_width: u32,
    pub window_height: u32,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            compositor: CompositorSettings::default(),
            render_scale: 0.5,
            max_samples: 256,
            shader_paths: vec![PathBuf::from("shaders")],
            obj_path: None,
            screenshot_path: PathBuf::from("stao_screenshot.png"),
            window_width: 1280,
            window_height: 720,
        }
    }
}

impl ViewerSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let settings: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))?;
        settings.validate()?;
        log::info!("Loaded viewer settings from {}", path.display());
        Ok(settings)
    }

    /// Settings from the first command-line argument, or the defaults.
    pub fn from_args<I: IntoIterator<Item = String>>(args: I) -> Result<Self> {
        match args.into_iter().nth(1) {
            Some(path) => Self::load(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.compositor.validate()?;
        if !(self.render_scale > 0.0 && self.render_scale <= 1.0) {
            anyhow::bail!("render_scale must be in (0, 1], got {}", self.render_scale);
        }
        if self.max_samples == 0 {
            anyhow::bail!("max_samples must be at least 1");
        }
        if self.window_width == 0 || self.window_height == 0 {
            anyhow::bail!("window size must be non-zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        assert!(ViewerSettings::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: ViewerSettings =
            serde_json::from_str(r#"{"render_scale": 0.25, "compositor": {"repetition_level": 8}}"#).unwrap();
        assert_eq!(settings.render_scale, 0.25);
        assert_eq!(settings.compositor.repetition_level, 8);
        assert_eq!(settings.compositor.coarse_level, CompositorSettings::default().coarse_level);
        assert_eq!(settings.max_samples, ViewerSettings::default().max_samples);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let settings = ViewerSettings {
            render_scale: 0.0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let mut settings = ViewerSettings::default();
        settings.compositor.kernel_size = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_from_args() {
        let settings = ViewerSettings::from_args(vec!["stao_viewer".to_string()]).unwrap();
        assert_eq!(settings, ViewerSettings::default());

        let path = std::env::temp_dir().join("stao_viewer_settings_test.json");
        std::fs::write(&path, r#"{"max_samples": 12, "obj_path": "bunny.obj"}"#).unwrap();
        let settings =
            ViewerSettings::from_args(vec!["stao_viewer".to_string(), path.display().to_string()]).unwrap();
        assert_eq!(settings.max_samples, 12);
        assert_eq!(settings.obj_path, Some(PathBuf::from("bunny.obj")));
        std::fs::remove_file(&path).ok();

        assert!(ViewerSettings::from_args(vec![
            "stao_viewer".to_string(),
            "/nonexistent/settings.json".to_string()
        ])
        .is_err());
    }
}
