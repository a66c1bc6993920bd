//! Sampling kernel for ambient occlusion.
//!
//! The kernel is a set of offsets inside a sphere of radius `r`, denser
//! near the center, plus a small table of rotation vectors in the xy-plane
//! that is tiled over the screen to decorrelate neighboring pixels.

use rand::Rng;
use stao_math::{lerp, Vec3};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
    #[error("Kernel size must be at least 1")]
    ZeroCount,

    #[error("Kernel radius must be positive and finite, got {0}")]
    InvalidRadius(f32),

    #[error("Noise table size must be at least 1")]
    ZeroNoiseSize,
}

pub type KernelResult<T> = Result<T, KernelError>;

/// Generate `count` sample offsets within a sphere of `radius`.
///
/// Sample `i` gets a direction drawn uniformly from the unit ball, a
/// magnitude `radius * u` and a scale of `lerp(0.1, 1.0, (i / count)^2)`,
/// so early samples cluster near the center.
pub fn generate_kernel<R: Rng>(radius: f32, count: u32, rng: &mut R) -> KernelResult<Vec<Vec3>> {
    if count == 0 {
        return Err(KernelError::ZeroCount);
    }
    if !radius.is_finite() || radius <= 0.0 {
        return Err(KernelError::InvalidRadius(radius));
    }

    let samples = (0..count)
        .map(|i| {
            let direction = random_in_unit_ball(rng).normalize_or_zero();
            let magnitude = radius * rng.gen::<f32>();
            let t = i as f32 / count as f32;
            direction * magnitude * lerp(0.1, 1.0, t * t)
        })
        .collect();
    Ok(samples)
}

/// Generate `size * size` rotation vectors `(2u - 1, 2u - 1, 0)`.
pub fn generate_noise<R: Rng>(size: u32, rng: &mut R) -> KernelResult<Vec<Vec3>> {
    if size == 0 {
        return Err(KernelError::ZeroNoiseSize);
    }
    let noise = (0..size * size)
        .map(|_| loop {
            let v = Vec3::new(
                2.0 * rng.gen::<f32>() - 1.0,
                2.0 * rng.gen::<f32>() - 1.0,
                0.0,
            );
            if v.length_squared() > 1e-6 {
                break v;
            }
        })
        .collect();
    Ok(noise)
}

fn random_in_unit_ball<R: Rng>(rng: &mut R) -> Vec3 {
    loop {
        let p = Vec3::new(
            2.0 * rng.gen::<f32>() - 1.0,
            2.0 * rng.gen::<f32>() - 1.0,
            2.0 * rng.gen::<f32>() - 1.0,
        );
        let len_sq = p.length_squared();
        if len_sq < 1.0 && len_sq > 1e-8 {
            return p;
        }
    }
}

/// Kernel offsets and the rotation-noise table, regenerated together.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplingKernel {
    radius: f32,
    samples: Vec<Vec3>,
    noise_size: u32,
    noise: Vec<Vec3>,
}

impl SamplingKernel {
    pub fn generate<R: Rng>(radius: f32, count: u32, noise_size: u32, rng: &mut R) -> KernelResult<Self> {
        let samples = generate_kernel(radius, count, rng)?;
        let noise = generate_noise(noise_size, rng)?;
        log::debug!(
            "Generated sampling kernel: {} samples, radius {}, {}x{} noise",
            count,
            radius,
            noise_size,
            noise_size
        );
        Ok(Self {
            radius,
            samples,
            noise_size,
            noise,
        })
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn samples(&self) -> &[Vec3] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn noise(&self) -> &[Vec3] {
        &self.noise
    }

    pub fn noise_size(&self) -> u32 {
        self.noise_size
    }
}
