//! Streamlines swept into tubes.
//!
//! Each polyline becomes a ring of `sides` vertices per line vertex. Ring
//! frames are propagated along the line by parallel transport so the tube
//! does not twist at inflection points.

use stao_core::{Geometry, GeometryKind, Light, LineSet, ObjectHandle, RenderableObject};
use stao_math::{Camera, Interval, Vec3};

use super::surface::SurfaceBuffers;
use super::{unsupported, EngineBase, EngineError, EngineResult, RenderContext, RendererEngine};

/// Triangulated tube surface, plus the line vertex each ring vertex came from.
#[derive(Clone, Debug, Default)]
pub struct TubeMesh {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub indices: Vec<u32>,
    pub source: Vec<u32>,
}

impl TubeMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Sweep every polyline of `lines` into a tube with `sides` segments.
///
/// Triangles wind counter-clockwise seen from outside the tube.
pub fn build_tube(lines: &LineSet, sides: u32) -> TubeMesh {
    let sides = sides.max(3);
    let mut tube = TubeMesh::default();

    for polyline in lines.polylines() {
        let points: Vec<Vec3> = polyline.iter().map(|&i| lines.positions[i as usize]).collect();
        let tangents = tangents(&points);
        if tangents.is_empty() {
            continue;
        }

        let first_ring = tube.positions.len() as u32;
        let mut normal = tangents[0].any_orthonormal_vector();
        for (k, (&vertex, &t)) in polyline.iter().zip(&tangents).enumerate() {
            if k > 0 {
                // Parallel transport: drop the component along the new tangent
                let transported = normal - t * t.dot(normal);
                normal = if transported.length_squared() > 1e-10 {
                    transported.normalize()
                } else {
                    t.any_orthonormal_vector()
                };
            }
            let binormal = t.cross(normal);
            let radius = lines.radius.get(vertex as usize);

            for j in 0..sides {
                let theta = std::f32::consts::TAU * j as f32 / sides as f32;
                let dir = normal * theta.cos() + binormal * theta.sin();
                tube.positions.push(points[k] + dir * radius);
                tube.normals.push(dir);
                tube.source.push(vertex);
            }
        }

        for k in 0..polyline.len() as u32 - 1 {
            let ring = first_ring + k * sides;
            let next = ring + sides;
            for j in 0..sides {
                let j1 = (j + 1) % sides;
                let (a, b, c, d) = (ring + j, ring + j1, next + j1, next + j);
                tube.indices.extend_from_slice(&[a, b, c, a, c, d]);
            }
        }
    }

    tube
}

/// Unit tangent per vertex: central differences inside, one-sided at the ends.
fn tangents(points: &[Vec3]) -> Vec<Vec3> {
    let n = points.len();
    if n < 2 {
        return Vec::new();
    }
    let mut last = Vec3::Z;
    (0..n)
        .map(|i| {
            let prev = points[i.saturating_sub(1)];
            let next = points[(i + 1).min(n - 1)];
            let t = (next - prev).normalize_or_zero();
            if t != Vec3::ZERO {
                last = t;
            }
            last
        })
        .collect()
}

/// Draws line sets as lit tubes.
///
/// When the lines carry scalar values the tube color comes from the
/// transfer function, otherwise from the line colors.
#[derive(Debug, Default)]
pub struct TubeEngine {
    base: EngineBase,
    tube: TubeMesh,
    surface: Option<SurfaceBuffers>,
    lines: Option<LineSet>,
    sides: u32,
    data_range: Option<Interval>,
}

impl TubeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tube(&self) -> &TubeMesh {
        &self.tube
    }

    fn build_surface(&mut self) {
        let Some(lines) = &self.lines else {
            return;
        };
        let sides = self.base.params().tube_sides;
        self.tube = build_tube(lines, sides);
        self.sides = sides;
        let colors = self.tube_colors();
        self.surface = Some(SurfaceBuffers::new(
            self.tube.positions.clone(),
            Some(self.tube.normals.clone()),
            colors,
            self.tube.indices.clone(),
            self.base.random_texture_size(),
        ));
    }

    fn tube_colors(&self) -> Vec<Vec3> {
        let Some(lines) = &self.lines else {
            return Vec::new();
        };
        let mapped = match (&lines.values, self.base.table(), self.data_range) {
            (Some(values), Some(table), Some(range)) => Some((values, table, range)),
            _ => None,
        };
        self.tube
            .source
            .iter()
            .map(|&v| match mapped {
                Some((values, table, range)) => {
                    let range = self.base.value_range(range);
                    table.sample(range.normalize(values[v as usize])).truncate()
                }
                None => lines.colors.get(v as usize),
            })
            .collect()
    }
}

impl RendererEngine for TubeEngine {
    fn name(&self) -> &'static str {
        "tube"
    }

    fn kind(&self) -> GeometryKind {
        GeometryKind::Line
    }

    fn base(&self) -> &EngineBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EngineBase {
        &mut self.base
    }

    fn create(
        &mut self,
        handle: ObjectHandle,
        object: &RenderableObject,
        camera: &Camera,
        _light: &Light,
    ) -> EngineResult<()> {
        self.release();
        let Geometry::Line(lines) = &object.geometry else {
            return Err(unsupported(self.name(), object));
        };
        lines.validate()?;
        self.base.params().validate()?;

        self.lines = Some(lines.clone());
        self.data_range = lines.value_range();
        self.base.attach(handle, camera);
        self.base.refresh_table();
        self.build_surface();
        log::debug!(
            "Tube engine attached to '{}' ({} rings of {} sides)",
            object.name,
            self.tube.vertex_count() / self.sides.max(1) as usize,
            self.sides
        );
        Ok(())
    }

    fn update(&mut self, _object: &RenderableObject, camera: &Camera, _light: &Light) -> EngineResult<()> {
        self.base.require_attached()?;
        self.base.refresh(camera);
        if self.sides != self.base.params().tube_sides {
            self.build_surface();
        } else {
            let size = self.base.random_texture_size();
            if let Some(surface) = &mut self.surface {
                surface.reindex(size);
            }
        }
        Ok(())
    }

    fn setup(&mut self, object: &RenderableObject, camera: &Camera, _light: &Light) -> EngineResult<()> {
        self.base.require_attached()?;
        if self.base.refresh_table() {
            let colors = self.tube_colors();
            if let Some(surface) = &mut self.surface {
                surface.colors = colors;
            }
        }
        let range = self.base.value_range(self.data_range.unwrap_or(Interval::EMPTY));
        self.base.compute_uniforms(object, camera, range);
        Ok(())
    }

    fn draw(&mut self, ctx: &mut RenderContext<'_>) -> EngineResult<()> {
        self.base.require_attached()?;
        self.base.next_offset(ctx.rng);
        let opacity = self.lines.as_ref().map_or(1.0, |l| l.opacity) * self.base.params().opacity_scale;
        let surface = self.surface.as_ref().ok_or(EngineError::NotAttached)?;
        let texture = self.base.random_texture()?;
        surface.draw(ctx.gpu, self.base.uniforms(), texture, opacity)?;
        Ok(())
    }

    fn release(&mut self) {
        if self.attached().is_some() {
            log::debug!("Tube engine released");
        }
        self.surface = None;
        self.lines = None;
        self.tube = TubeMesh::default();
        self.data_range = None;
        self.base.detach();
    }
}
