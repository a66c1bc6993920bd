//! Lighting models and the typed uniform sets handed to each stage.

use serde::{Deserialize, Serialize};
use stao_math::{Interval, Mat3, Mat4, UVec2, Vec2, Vec3, Vec4};

/// Reflectance model used by the occlusion-combination pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShadingModel {
    /// Stored color, no lighting.
    Flat,
    Lambert,
    #[default]
    Phong,
    BlinnPhong,
}

impl ShadingModel {
    pub const ALL: [ShadingModel; 4] = [
        ShadingModel::Flat,
        ShadingModel::Lambert,
        ShadingModel::Phong,
        ShadingModel::BlinnPhong,
    ];

    /// Name used as a program define.
    pub fn define(self) -> &'static str {
        match self {
            ShadingModel::Flat => "FLAT",
            ShadingModel::Lambert => "LAMBERT",
            ShadingModel::Phong => "PHONG",
            ShadingModel::BlinnPhong => "BLINN_PHONG",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ShadingModel::Flat => "Flat",
            ShadingModel::Lambert => "Lambert",
            ShadingModel::Phong => "Phong",
            ShadingModel::BlinnPhong => "Blinn-Phong",
        }
    }
}

/// Ambient, diffuse and specular coefficients plus the specular exponent.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShadingParams {
    pub ka: f32,
    pub kd: f32,
    pub ks: f32,
    pub s: f32,
}

impl Default for ShadingParams {
    fn default() -> Self {
        Self {
            ka: 0.2,
            kd: 0.7,
            ks: 0.3,
            s: 30.0,
        }
    }
}

/// A point light expressed in view space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewLight {
    pub position: Vec3,
    pub color: Vec3,
}

/// Shade a view-space surface point.
pub fn shade(
    model: ShadingModel,
    params: &ShadingParams,
    two_sided: bool,
    color: Vec3,
    position: Vec3,
    normal: Vec3,
    light: &ViewLight,
) -> Vec3 {
    if model == ShadingModel::Flat {
        return color;
    }

    let view_dir = (-position).normalize_or_zero();
    let light_dir = (light.position - position).normalize_or_zero();
    let mut n = normal.normalize_or_zero();
    if two_sided && n.dot(view_dir) < 0.0 {
        n = -n;
    }

    let diffuse = n.dot(light_dir).max(0.0);
    let specular = match model {
        ShadingModel::Flat | ShadingModel::Lambert => 0.0,
        ShadingModel::Phong => {
            let reflected = 2.0 * n.dot(light_dir) * n - light_dir;
            reflected.dot(view_dir).max(0.0).powf(params.s)
        }
        ShadingModel::BlinnPhong => {
            let half = (light_dir + view_dir).normalize_or_zero();
            n.dot(half).max(0.0).powf(params.s)
        }
    };
    let specular = if diffuse > 0.0 { specular } else { 0.0 };

    color * (params.ka + params.kd * diffuse) * light.color + light.color * (params.ks * specular)
}

/// Per-frame uniforms of the geometry stage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeometryUniforms {
    pub model_view: Mat4,
    pub projection: Mat4,
    pub normal_matrix: Mat3,
    /// Random texture offset of the current draw.
    pub random_offset: [u32; 2],
    /// Exponent of the silhouette enhancement, 0 disables it.
    pub edge_factor: f32,
    pub value_range: Interval,
}

impl Default for GeometryUniforms {
    fn default() -> Self {
        Self {
            model_view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            normal_matrix: Mat3::IDENTITY,
            random_offset: [0, 0],
            edge_factor: 0.0,
            value_range: Interval::new(0.0, 1.0),
        }
    }
}

/// Uniforms of the occlusion-combination pass.
#[derive(Clone, Copy, Debug)]
pub struct OcclusionUniforms<'a> {
    pub sampling_points: &'a [Vec3],
    pub kernel_size: usize,
    pub noise: &'a [Vec3],
    pub noise_size: u32,
    /// Framebuffer size divided by the noise size.
    pub noise_scale: Vec2,
    pub radius: f32,
    pub bias: f32,
    pub projection: Mat4,
    pub light: ViewLight,
    pub shading: ShadingParams,
    pub background: Vec4,
    pub draw_occlusion_factor: bool,
    pub viewport: UVec2,
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Vec3 = Vec3::new(1.0, 0.0, 0.0);
    const EYE_LIGHT: ViewLight = ViewLight {
        position: Vec3::ZERO,
        color: Vec3::ONE,
    };

    fn facing_light(model: ShadingModel) -> Vec3 {
        shade(
            model,
            &ShadingParams::default(),
            false,
            RED,
            Vec3::new(0.0, 0.0, -5.0),
            Vec3::Z,
            &EYE_LIGHT,
        )
    }

    #[test]
    fn test_flat_returns_color() {
        assert_eq!(facing_light(ShadingModel::Flat), RED);
    }

    #[test]
    fn test_lambert_head_on() {
        let c = facing_light(ShadingModel::Lambert);
        let p = ShadingParams::default();
        assert!((c.x - (p.ka + p.kd)).abs() < 1e-5);
        assert_eq!(c.y, 0.0);
    }

    #[test]
    fn test_specular_models_add_highlight() {
        let p = ShadingParams::default();
        for model in [ShadingModel::Phong, ShadingModel::BlinnPhong] {
            let c = facing_light(model);
            // Light at the eye: full highlight on every channel
            assert!((c.y - p.ks).abs() < 1e-4);
            assert!((c.x - (p.ka + p.kd + p.ks)).abs() < 1e-4);
        }
    }

    #[test]
    fn test_two_sided_flips_back_faces() {
        let params = ShadingParams::default();
        let back = |two_sided| {
            shade(
                ShadingModel::Lambert,
                &params,
                two_sided,
                RED,
                Vec3::new(0.0, 0.0, -5.0),
                -Vec3::Z,
                &EYE_LIGHT,
            )
        };
        assert!((back(false).x - params.ka).abs() < 1e-5);
        assert!((back(true).x - (params.ka + params.kd)).abs() < 1e-5);
    }

    #[test]
    fn test_defines_unique() {
        let mut names: Vec<_> = ShadingModel::ALL.iter().map(|m| m.define()).collect();
        names.dedup();
        assert_eq!(names.len(), 4);
    }

    #[test]
    fn test_shading_model_serde() {
        let json = serde_json::to_string(&ShadingModel::BlinnPhong).unwrap();
        let back: ShadingModel = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ShadingModel::BlinnPhong);
    }
}
