use serde::{Deserialize, Serialize};
use stao_math::Vec3;

/// A point light in world space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Light {
    pub position: Vec3,
    pub color: Vec3,
}

impl Light {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            color: Vec3::ONE,
        }
    }
}

impl Default for Light {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, 12.0))
    }
}
