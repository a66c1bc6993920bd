use serde::{Deserialize, Serialize};
use stao_math::{Aabb, Interval, Vec3};

use crate::error::{check_indices, check_len, check_range, CoreError, CoreResult};
use crate::mesh::VertexColors;

/// How the vertices of a line set are connected.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LineTopology {
    /// One polyline through every vertex in order.
    Strip,
    /// Independent segments given as vertex pairs.
    Segments(Vec<[u32; 2]>),
    /// Polylines given as inclusive `[first, last]` vertex ranges.
    Polylines(Vec<[u32; 2]>),
}

/// Tube radius: one value for the whole set or one per vertex.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LineRadius {
    Uniform(f32),
    PerVertex(Vec<f32>),
}

impl LineRadius {
    pub fn get(&self, i: usize) -> f32 {
        match self {
            LineRadius::Uniform(r) => *r,
            LineRadius::PerVertex(radii) => radii.get(i).copied().unwrap_or(0.0),
        }
    }

    pub fn max(&self) -> f32 {
        match self {
            LineRadius::Uniform(r) => *r,
            LineRadius::PerVertex(radii) => radii.iter().copied().fold(0.0, f32::max),
        }
    }
}

/// Lines or streamlines, drawn as tubes.
#[derive(Clone, Debug)]
pub struct LineSet {
    pub positions: Vec<Vec3>,
    pub topology: LineTopology,
    pub colors: VertexColors,
    pub radius: LineRadius,
    /// Scalar per vertex; when present, colors come from the transfer function.
    pub values: Option<Vec<f32>>,
    pub opacity: f32,
}

impl LineSet {
    pub fn new(positions: Vec<Vec3>, topology: LineTopology) -> Self {
        Self {
            positions,
            topology,
            colors: VertexColors::default(),
            radius: LineRadius::Uniform(0.05),
            values: None,
            opacity: 1.0,
        }
    }

    pub fn with_radius(mut self, radius: LineRadius) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_colors(mut self, colors: VertexColors) -> Self {
        self.colors = colors;
        self
    }

    pub fn with_values(mut self, values: Vec<f32>) -> Self {
        self.values = Some(values);
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    /// Vertex chains to be swept into tubes, each with at least two vertices.
    pub fn polylines(&self) -> Vec<Vec<u32>> {
        match &self.topology {
            LineTopology::Strip => {
                if self.positions.len() < 2 {
                    Vec::new()
                } else {
                    vec![(0..self.positions.len() as u32).collect()]
                }
            }
            LineTopology::Segments(pairs) => pairs.iter().map(|p| vec![p[0], p[1]]).collect(),
            LineTopology::Polylines(ranges) => ranges
                .iter()
                .filter(|r| r[1] > r[0])
                .map(|r| (r[0]..=r[1]).collect())
                .collect(),
        }
    }

    pub fn value_range(&self) -> Option<Interval> {
        self.values
            .as_ref()
            .map(|values| Interval::from_values(values.iter().copied()))
    }

    /// Bounds of the vertices padded by the largest radius.
    pub fn bounds(&self) -> Aabb {
        let Some(&first) = self.positions.first() else {
            return Aabb::empty();
        };
        let (min, max) = self
            .positions
            .iter()
            .fold((first, first), |(lo, hi), &p| (lo.min(p), hi.max(p)));
        let pad = Vec3::splat(self.radius.max());
        Aabb::from_points(min - pad, max + pad)
    }

    pub fn validate(&self) -> CoreResult<()> {
        let n = self.positions.len();
        if n == 0 {
            return Err(CoreError::Empty { what: "positions" });
        }
        match &self.topology {
            LineTopology::Strip => {}
            LineTopology::Segments(pairs) | LineTopology::Polylines(pairs) => {
                if pairs.is_empty() {
                    return Err(CoreError::Empty { what: "connections" });
                }
                check_indices("connection", pairs.iter().flatten(), n)?;
            }
        }
        if self.polylines().is_empty() {
            return Err(CoreError::Empty { what: "polylines" });
        }
        self.colors.validate(n)?;
        match &self.radius {
            LineRadius::Uniform(r) => check_range("radius", *r, f32::MIN_POSITIVE, f32::MAX)?,
            LineRadius::PerVertex(radii) => {
                check_len("radius", n, radii.len())?;
                for &r in radii {
                    check_range("radius", r, 0.0, f32::MAX)?;
                }
            }
        }
        if let Some(values) = &self.values {
            check_len("values", n, values.len())?;
        }
        check_range("opacity", self.opacity, 0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(n: usize) -> Vec<Vec3> {
        (0..n).map(|i| Vec3::new(i as f32, 0.0, 0.0)).collect()
    }

    #[test]
    fn test_strip_polylines() {
        let lines = LineSet::new(points(4), LineTopology::Strip);
        assert_eq!(lines.polylines(), vec![vec![0, 1, 2, 3]]);
    }

    #[test]
    fn test_polyline_ranges() {
        let lines = LineSet::new(points(6), LineTopology::Polylines(vec![[0, 2], [3, 5]]));
        assert_eq!(lines.polylines(), vec![vec![0, 1, 2], vec![3, 4, 5]]);
        assert!(lines.validate().is_ok());
    }

    #[test]
    fn test_segments_out_of_range() {
        let lines = LineSet::new(points(2), LineTopology::Segments(vec![[0, 2]]));
        assert!(matches!(
            lines.validate(),
            Err(CoreError::IndexOutOfRange { index: 2, .. })
        ));
    }

    #[test]
    fn test_values_length_checked() {
        let lines = LineSet::new(points(3), LineTopology::Strip).with_values(vec![0.0, 1.0]);
        assert!(matches!(
            lines.validate(),
            Err(CoreError::LengthMismatch { what: "values", .. })
        ));
    }

    #[test]
    fn test_bounds_padded_by_radius() {
        let lines = LineSet::new(points(3), LineTopology::Strip)
            .with_radius(LineRadius::PerVertex(vec![0.1, 0.5, 0.2]));
        let bounds = lines.bounds();
        assert!((bounds.max().x - 2.5).abs() < 1e-5);
        assert!((bounds.min().y + 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_zero_radius_rejected() {
        let lines = LineSet::new(points(3), LineTopology::Strip).with_radius(LineRadius::Uniform(0.0));
        assert!(lines.validate().is_err());
    }
}
