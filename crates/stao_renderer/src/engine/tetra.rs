//! Projected tetrahedra with pre-integrated transfer functions.
//!
//! Every cell contributes its four faces, wound outward, and only front
//! faces are rasterized. A fragment on the entry face intersects the view
//! ray with the cell planes to find where it leaves the cell, extrapolates
//! the scalar there from the cell gradient and reads color and extinction
//! for the (front, back) pair from the pre-integration table. The segment
//! opacity is `1 - exp(-tau * length)`.

use stao_core::{Geometry, GeometryKind, Light, ObjectHandle, RenderableObject, TetraMesh, TransferTable};
use stao_math::{lerp, Camera, Interval, Mat3, Vec3, Vec4};

use super::{unsupported, EngineBase, EngineError, EngineResult, RenderContext, RendererEngine};
use crate::gpu::{ClipVertex, CullMode, DrawState, FragmentOutput};
use crate::random::random_indices;

pub const PREINTEGRATION_SIZE: usize = 64;
const PREINTEGRATION_SAMPLES: usize = 16;

/// Average color and extinction of the transfer function between a front
/// and a back scalar value, both normalized to [0, 1].
#[derive(Clone, Debug, PartialEq)]
pub struct PreintegrationTable {
    size: usize,
    entries: Vec<Vec4>,
}

impl PreintegrationTable {
    pub fn build(table: &TransferTable, size: usize) -> Self {
        let size = size.max(2);
        let scale = 1.0 / (size - 1) as f32;
        let mut entries = Vec::with_capacity(size * size);
        for back in 0..size {
            for front in 0..size {
                let (sf, sb) = (front as f32 * scale, back as f32 * scale);
                let mut color = Vec3::ZERO;
                let mut tau = 0.0;
                for k in 0..PREINTEGRATION_SAMPLES {
                    let s = lerp(sf, sb, (k as f32 + 0.5) / PREINTEGRATION_SAMPLES as f32);
                    let e = table.sample(s);
                    color += e.truncate() * e.w;
                    tau += e.w;
                }
                let color = if tau > 1e-6 {
                    color / tau
                } else {
                    table.sample(0.5 * (sf + sb)).truncate()
                };
                entries.push(color.extend(tau / PREINTEGRATION_SAMPLES as f32));
            }
        }
        Self { size, entries }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Nearest entry for normalized front and back values.
    pub fn lookup(&self, front: f32, back: f32) -> Vec4 {
        let max = (self.size - 1) as f32;
        let f = (front.clamp(0.0, 1.0) * max).round() as usize;
        let b = (back.clamp(0.0, 1.0) * max).round() as usize;
        self.entries[b * self.size + f]
    }
}

/// Bounding planes and scalar gradient of one cell, in object space.
#[derive(Clone, Copy, Debug)]
struct CellData {
    /// Outward unit normal and offset: `dot(normal, p) = offset` on the face.
    planes: [(Vec3, f32); 4],
    gradient: Vec3,
    first_vertex: u32,
}

fn cell_faces(mesh: &TetraMesh, cell: [u32; 4]) -> ([[u32; 3]; 4], CellData) {
    let [a, b, c, d] = cell;
    let p = |i: u32| mesh.positions[i as usize];
    let candidates = [[a, b, c, d], [a, b, d, c], [a, c, d, b], [b, c, d, a]];

    let mut faces = [[0; 3]; 4];
    let mut planes = [(Vec3::ZERO, 0.0); 4];
    for (slot, [v0, mut v1, mut v2, opposite]) in candidates.into_iter().enumerate() {
        let n = (p(v1) - p(v0)).cross(p(v2) - p(v0));
        if n.dot(p(opposite) - p(v0)) > 0.0 {
            std::mem::swap(&mut v1, &mut v2);
        }
        let normal = (p(v1) - p(v0)).cross(p(v2) - p(v0)).normalize_or_zero();
        faces[slot] = [v0, v1, v2];
        planes[slot] = (normal, normal.dot(p(v0)));
    }

    let value = |i: u32| mesh.values[i as usize];
    let edges = Mat3::from_cols(p(b) - p(a), p(c) - p(a), p(d) - p(a)).transpose();
    let gradient = if edges.determinant().abs() > 1e-12 {
        edges.inverse() * Vec3::new(value(b) - value(a), value(c) - value(a), value(d) - value(a))
    } else {
        Vec3::ZERO
    };

    (
        faces,
        CellData {
            planes,
            gradient,
            first_vertex: a,
        },
    )
}

/// Distance along the unit direction `dir` from `p` to where the ray leaves the cell.
fn exit_distance(planes: &[(Vec3, f32); 4], p: Vec3, dir: Vec3) -> f32 {
    let mut exit = f32::INFINITY;
    for &(normal, offset) in planes {
        let denom = normal.dot(dir);
        if denom > 1e-8 {
            let t = (offset - normal.dot(p)) / denom;
            if t >= 0.0 {
                exit = exit.min(t);
            }
        }
    }
    if exit.is_finite() {
        exit
    } else {
        0.0
    }
}

/// Draws tetrahedral meshes.
#[derive(Debug, Default)]
pub struct TetrahedraEngine {
    base: EngineBase,
    positions: Vec<Vec3>,
    values: Vec<f32>,
    indices: Vec<u32>,
    cells: Vec<CellData>,
    random_index: Vec<[u16; 2]>,
    data_range: Option<Interval>,
    preintegration: Option<PreintegrationTable>,
}

impl TetrahedraEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn preintegration(&self) -> Option<&PreintegrationTable> {
        self.preintegration.as_ref()
    }

    fn rebuild_preintegration(&mut self) {
        if let Some(table) = self.base.table() {
            self.preintegration = Some(PreintegrationTable::build(table, PREINTEGRATION_SIZE));
            log::debug!("Rebuilt {0}x{0} pre-integration table", PREINTEGRATION_SIZE);
        }
    }
}

impl RendererEngine for TetrahedraEngine {
    fn name(&self) -> &'static str {
        "tetrahedra"
    }

    fn kind(&self) -> GeometryKind {
        GeometryKind::Tetrahedra
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
        let Geometry::Tetrahedra(mesh) = &object.geometry else {
            return Err(unsupported(self.name(), object));
        };
        mesh.validate()?;
        self.base.params().validate()?;

        let mut indices = Vec::with_capacity(mesh.cells.len() * 12);
        let mut cells = Vec::with_capacity(mesh.cells.len());
        for &cell in &mesh.cells {
            let (faces, data) = cell_faces(mesh, cell);
            indices.extend(faces.iter().flatten());
            cells.push(data);
        }

        self.positions = mesh.positions.clone();
        self.values = mesh.values.clone();
        self.indices = indices;
        self.cells = cells;
        self.random_index = random_indices(mesh.positions.len(), self.base.params().random_texture_size);
        self.data_range = Some(mesh.value_range());
        self.base.attach(handle, camera);
        self.base.refresh_table();
        self.rebuild_preintegration();
        log::debug!(
            "Tetrahedra engine attached to '{}' ({} cells)",
            object.name,
            self.cells.len()
        );
        Ok(())
    }

    fn update(&mut self, _object: &RenderableObject, camera: &Camera, _light: &Light) -> EngineResult<()> {
        self.base.require_attached()?;
        self.base.refresh(camera);
        self.random_index = random_indices(self.positions.len(), self.base.random_texture_size());
        Ok(())
    }

    fn setup(&mut self, object: &RenderableObject, camera: &Camera, _light: &Light) -> EngineResult<()> {
        self.base.require_attached()?;
        if self.base.refresh_table() || self.preintegration.is_none() {
            self.rebuild_preintegration();
        }
        let range = self.base.value_range(self.data_range.unwrap_or(Interval::EMPTY));
        self.base.compute_uniforms(object, camera, range);
        Ok(())
    }

    fn draw(&mut self, ctx: &mut RenderContext<'_>) -> EngineResult<()> {
        self.base.require_attached()?;
        let offset = self.base.next_offset(ctx.rng);
        let texture = self.base.random_texture()?;
        let preintegration = self.preintegration.as_ref().ok_or(EngineError::NotAttached)?;
        let uniforms = self.base.uniforms();

        let model_view = uniforms.model_view;
        let projection = uniforms.projection;
        let normal_matrix = uniforms.normal_matrix;
        let range = uniforms.value_range;
        let eye = model_view.inverse().transform_point3(Vec3::ZERO);

        let vertices: Vec<ClipVertex<Vec4>> = self
            .positions
            .iter()
            .zip(&self.values)
            .map(|(&p, &v)| ClipVertex::new(projection * model_view.transform_point3(p).extend(1.0), p.extend(v)))
            .collect();

        let cells = &self.cells;
        let random_index = &self.random_index;
        let state = DrawState::default().with_cull(CullMode::Back);
        ctx.gpu.draw_indexed(&state, &vertices, &self.indices, |fragment| {
            let cell = &cells[fragment.primitive_id as usize / 4];
            let p = fragment.varying.truncate();
            let front = fragment.varying.w;
            let dir = (p - eye).normalize_or_zero();

            let length = exit_distance(&cell.planes, p, dir);
            let back = front + cell.gradient.dot(dir * length);
            let entry = preintegration.lookup(range.normalize(front), range.normalize(back));
            let alpha = 1.0 - (-entry.w * length).exp();

            let index = random_index[cell.first_vertex as usize];
            if texture.lookup(index, (fragment.x, fragment.y), offset) >= alpha {
                return None;
            }

            let view = model_view.transform_point3(p);
            let gradient = normal_matrix * -cell.gradient;
            let normal = if gradient.length_squared() > 1e-12 {
                gradient.normalize().extend(1.0)
            } else {
                Vec4::ZERO
            };
            Some(FragmentOutput::new([
                entry.truncate().extend(1.0),
                view.extend(1.0),
                normal,
            ]))
        })?;
        Ok(())
    }

    fn release(&mut self) {
        if self.attached().is_some() {
            log::debug!("Tetrahedra engine released");
        }
        self.positions.clear();
        self.values.clear();
        self.indices.clear();
        self.cells.clear();
        self.random_index.clear();
        self.data_range = None;
        self.preintegration = None;
        self.base.detach();
    }
}

#[cfg(test)]
mod tests {
    use stao_core::{TransferFunction, UniformGrid};
    use stao_math::UVec3;

    use super::*;
    use crate::engine::test_support::*;
    use crate::engine::EngineParams;

    fn linear_mesh() -> TetraMesh {
        let grid = UniformGrid::from_fn(UVec3::splat(5), Vec3::splat(-1.0), Vec3::splat(0.5), |p| {
            p.x + 2.0 * p.y
        });
        TetraMesh::from_grid(&grid)
    }

    fn engine_with(tf: TransferFunction) -> TetrahedraEngine {
        let mut engine = TetrahedraEngine::new();
        engine
            .set_params(EngineParams {
                transfer_function: tf,
                ..Default::default()
            })
            .unwrap();
        engine
    }

    #[test]
    fn test_faces_wound_outward() {
        let mesh = linear_mesh();
        for &cell in &mesh.cells {
            let (faces, data) = cell_faces(&mesh, cell);
            let centroid = cell.iter().map(|&i| mesh.positions[i as usize]).sum::<Vec3>() / 4.0;
            for (face, (normal, offset)) in faces.iter().zip(data.planes) {
                let [a, b, c] = face.map(|i| mesh.positions[i as usize]);
                assert!((b - a).cross(c - a).dot(normal) > 0.0);
                // Centroid lies inside every plane
                assert!(normal.dot(centroid) < offset);
            }
        }
    }

    #[test]
    fn test_linear_field_gradient_exact() {
        let mesh = linear_mesh();
        for &cell in &mesh.cells {
            let (_, data) = cell_faces(&mesh, cell);
            assert!((data.gradient - Vec3::new(1.0, 2.0, 0.0)).length() < 1e-3);
        }
    }

    #[test]
    fn test_exit_distance_unit_cell() {
        let mesh = TetraMesh::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z],
            vec![0.0; 4],
            vec![[0, 1, 2, 3]],
        );
        let (_, data) = cell_faces(&mesh, [0, 1, 2, 3]);
        // Enter the z = 0 face at (0.1, 0.1) going up
        let t = exit_distance(&data.planes, Vec3::new(0.1, 0.1, 0.0), Vec3::Z);
        assert!((t - 0.8).abs() < 1e-5);
    }

    #[test]
    fn test_preintegration_constant_function() {
        let table = TransferFunction::constant(Vec3::new(0.5, 0.25, 1.0), 0.4).bake(32);
        let pre = PreintegrationTable::build(&table, 8);
        assert_eq!(pre.size(), 8);
        for &(f, b) in &[(0.0, 0.0), (0.0, 1.0), (0.7, 0.2)] {
            let e = pre.lookup(f, b);
            assert!((e - Vec4::new(0.5, 0.25, 1.0, 0.4)).length() < 1e-5);
        }
    }

    #[test]
    fn test_preintegration_averages_ramp() {
        let table = TransferFunction::rainbow().bake(256);
        let pre = PreintegrationTable::build(&table, PREINTEGRATION_SIZE);
        // Opacity ramps linearly 0 -> 1, so the full-range average is 1/2
        assert!((pre.lookup(0.0, 1.0).w - 0.5).abs() < 0.01);
        assert!((pre.lookup(1.0, 0.0).w - 0.5).abs() < 0.01);
        assert!(pre.lookup(0.0, 0.0).w < 0.02);
    }

    #[test]
    fn test_opaque_mesh_covers_box() {
        let object = RenderableObject::new("tets", Geometry::Tetrahedra(linear_mesh()));
        let mut engine = engine_with(TransferFunction::constant(Vec3::ONE, 1.0));
        let (gpu, target, covered) = draw_once(&mut engine, &object);
        assert_eq!(engine.cell_count(), 4 * 4 * 4 * 5);
        assert!(covered > 300, "covered {}", covered);

        for (x, y) in covered_pixels(&gpu, target) {
            let [_, position, normal] = texel(&gpu, target, x, y);
            // Inside the [-1, 1] box seen from z = 4
            assert!(position.z >= -5.0 - 1e-3 && position.z <= -3.0 + 1e-3);
            assert_eq!(normal.w, 1.0);
        }
    }

    #[test]
    fn test_transparent_mesh_draws_nothing() {
        let object = RenderableObject::new("tets", Geometry::Tetrahedra(linear_mesh()));
        let mut engine = engine_with(TransferFunction::constant(Vec3::ONE, 0.0));
        let (_, _, covered) = draw_once(&mut engine, &object);
        assert_eq!(covered, 0);
    }

    #[test]
    fn test_setup_rebuilds_table_after_param_change() {
        let object = RenderableObject::new("tets", Geometry::Tetrahedra(linear_mesh()));
        let (scene, handle) = handle_for(object);
        let object = scene.get(handle).unwrap();
        let mut engine = engine_with(TransferFunction::constant(Vec3::ONE, 1.0));
        engine.create(handle, object, &camera(), &light()).unwrap();
        let before = engine.preintegration().unwrap().clone();

        engine
            .set_params(EngineParams {
                transfer_function: TransferFunction::constant(Vec3::ONE, 0.5),
                ..Default::default()
            })
            .unwrap();
        engine.update(object, &camera(), &light()).unwrap();
        engine.setup(object, &camera(), &light()).unwrap();
        assert_ne!(engine.preintegration().unwrap(), &before);
        assert!((engine.preintegration().unwrap().lookup(0.5, 0.5).w - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_release_idempotent() {
        let object = RenderableObject::new("tets", Geometry::Tetrahedra(linear_mesh()));
        let mut engine = engine_with(TransferFunction::constant(Vec3::ONE, 1.0));
        draw_once(&mut engine, &object);
        engine.release();
        engine.release();
        assert!(engine.attached().is_none());
        assert_eq!(engine.cell_count(), 0);
        assert!(engine.preintegration().is_none());
    }
}
