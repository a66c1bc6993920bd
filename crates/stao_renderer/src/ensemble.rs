//! Ensemble averaging of stochastic samples.
//!
//! Each repetition renders one sample into the sample target. `add` folds
//! it into the accumulation image with weight `1/n`, so after `n` adds the
//! accumulation holds the arithmetic mean of the `n` samples:
//!
//! ```text
//! avg_n = avg_{n-1} + (s_n - avg_{n-1}) / n
//! ```

use stao_math::Vec4;

use crate::gpu::{
    BlendMode, DrawState, FragmentOutput, FramebufferId, GpuError, GpuResult, GraphicsContext,
    TextureFormat,
};

pub struct EnsembleBuffer {
    sample: Option<FramebufferId>,
    accumulation: Option<FramebufferId>,
    width: u32,
    height: u32,
    count: u32,
    previous: Option<FramebufferId>,
}

impl EnsembleBuffer {
    pub fn create(gpu: &mut GraphicsContext, width: u32, height: u32) -> GpuResult<Self> {
        let sample = gpu.create_framebuffer(width, height, &[TextureFormat::Rgba32F], true)?;
        let accumulation = match gpu.create_framebuffer(width, height, &[TextureFormat::Rgba32F], false) {
            Ok(id) => id,
            Err(e) => {
                gpu.release_framebuffer(sample)?;
                return Err(e);
            }
        };
        log::debug!("Created ensemble buffer {}x{}", width, height);
        Ok(Self {
            sample: Some(sample),
            accumulation: Some(accumulation),
            width,
            height,
            count: 0,
            previous: None,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of samples averaged since the last clear.
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn sample_target(&self) -> Option<FramebufferId> {
        self.sample
    }

    pub fn is_released(&self) -> bool {
        self.sample.is_none()
    }

    fn targets(&self) -> GpuResult<(FramebufferId, FramebufferId)> {
        match (self.sample, self.accumulation) {
            (Some(sample), Some(accumulation)) => Ok((sample, accumulation)),
            _ => Err(GpuError::Released("ensemble buffer")),
        }
    }

    /// Zero the running average and the sample count.
    pub fn clear(&mut self, gpu: &mut GraphicsContext) -> GpuResult<()> {
        let (_, accumulation) = self.targets()?;
        gpu.framebuffer_mut(accumulation)?.clear(Vec4::ZERO, 1.0);
        self.count = 0;
        Ok(())
    }

    /// Bind the sample target, remembering the current binding.
    pub fn bind(&mut self, gpu: &mut GraphicsContext) -> GpuResult<()> {
        let (sample, _) = self.targets()?;
        self.previous = Some(gpu.bind(sample)?);
        Ok(())
    }

    /// Restore the binding that was active at `bind`.
    pub fn unbind(&mut self, gpu: &mut GraphicsContext) -> GpuResult<()> {
        if let Some(previous) = self.previous.take() {
            gpu.bind(previous)?;
        }
        Ok(())
    }

    /// Blend the current sample into the running average.
    pub fn add(&mut self, gpu: &mut GraphicsContext) -> GpuResult<()> {
        let (sample, accumulation) = self.targets()?;
        self.count += 1;
        let weight = 1.0 / self.count as f32;

        let previous = gpu.bind(accumulation)?;
        let state = DrawState::fullscreen().with_blend(BlendMode::ConstantAlpha(weight));
        let result = gpu.draw_fullscreen(&state, &[sample], |fragment, inputs| {
            Some(FragmentOutput::color(inputs[0].read(0, fragment.x, fragment.y)))
        });
        gpu.bind(previous)?;
        result
    }

    /// Present the running average, and the sample depth, into the bound target.
    pub fn draw(&self, gpu: &mut GraphicsContext) -> GpuResult<()> {
        let (sample, accumulation) = self.targets()?;
        let state = DrawState::fullscreen().with_depth_write(true);
        gpu.draw_fullscreen(&state, &[accumulation, sample], |fragment, inputs| {
            let (x, y) = (fragment.x, fragment.y);
            Some(FragmentOutput::color(inputs[0].read(0, x, y)).with_depth(inputs[1].read_depth(x, y)))
        })
    }

    /// Free both targets. Safe to call more than once.
    pub fn release(&mut self, gpu: &mut GraphicsContext) {
        for id in [self.sample.take(), self.accumulation.take()].into_iter().flatten() {
            if let Err(e) = gpu.release_framebuffer(id) {
                log::warn!("Failed to release ensemble target: {}", e);
            }
        }
        self.previous = None;
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (GraphicsContext, EnsembleBuffer, FramebufferId) {
        let mut gpu = GraphicsContext::new(4, 4).unwrap();
        let ensemble = EnsembleBuffer::create(&mut gpu, 4, 4).unwrap();
        let present = gpu.create_framebuffer(4, 4, &[TextureFormat::Rgba32F], true).unwrap();
        (gpu, ensemble, present)
    }

    /// Render a constant-color sample the way the compositor does.
    fn add_sample(gpu: &mut GraphicsContext, ensemble: &mut EnsembleBuffer, color: Vec4) {
        ensemble.bind(gpu).unwrap();
        gpu.clear(color, 0.5).unwrap();
        ensemble.unbind(gpu).unwrap();
        ensemble.add(gpu).unwrap();
    }

    fn presented(gpu: &mut GraphicsContext, ensemble: &EnsembleBuffer, present: FramebufferId) -> Vec4 {
        let previous = gpu.bind(present).unwrap();
        ensemble.draw(gpu).unwrap();
        gpu.bind(previous).unwrap();
        gpu.framebuffer(present).unwrap().read(0, 1, 2)
    }

    #[test]
    fn test_average_of_constant_samples() {
        for k in [1_usize, 2, 5, 50] {
            let (mut gpu, mut ensemble, present) = setup();
            ensemble.clear(&mut gpu).unwrap();

            let samples: Vec<Vec4> = (0..k)
                .map(|i| Vec4::new(i as f32 / k as f32, 1.0 - i as f32 * 0.01, 0.5, 1.0))
                .collect();
            for &s in &samples {
                add_sample(&mut gpu, &mut ensemble, s);
            }

            let mean = samples.iter().copied().sum::<Vec4>() / k as f32;
            let got = presented(&mut gpu, &ensemble, present);
            assert_eq!(ensemble.count(), k as u32);
            assert!((got - mean).abs().max_element() < 1e-5, "k = {}: {} vs {}", k, got, mean);
        }
    }

    #[test]
    fn test_clear_restarts_average() {
        let (mut gpu, mut ensemble, present) = setup();
        ensemble.clear(&mut gpu).unwrap();
        add_sample(&mut gpu, &mut ensemble, Vec4::ONE);
        add_sample(&mut gpu, &mut ensemble, Vec4::ONE);

        ensemble.clear(&mut gpu).unwrap();
        assert_eq!(ensemble.count(), 0);
        add_sample(&mut gpu, &mut ensemble, Vec4::splat(0.25));
        assert_eq!(presented(&mut gpu, &ensemble, present), Vec4::splat(0.25));
    }

    #[test]
    fn test_draw_copies_sample_depth() {
        let (mut gpu, mut ensemble, present) = setup();
        ensemble.clear(&mut gpu).unwrap();
        add_sample(&mut gpu, &mut ensemble, Vec4::ONE);
        presented(&mut gpu, &ensemble, present);
        assert_eq!(gpu.framebuffer(present).unwrap().read_depth(3, 3), 0.5);
    }

    #[test]
    fn test_bind_unbind_restores() {
        let (mut gpu, mut ensemble, present) = setup();
        gpu.bind(present).unwrap();
        ensemble.bind(&mut gpu).unwrap();
        assert_eq!(gpu.bound(), ensemble.sample_target().unwrap());
        ensemble.unbind(&mut gpu).unwrap();
        assert_eq!(gpu.bound(), present);

        // add leaves the binding alone
        ensemble.add(&mut gpu).unwrap();
        assert_eq!(gpu.bound(), present);
    }

    #[test]
    fn test_release_idempotent() {
        let (mut gpu, mut ensemble, _) = setup();
        assert_eq!(gpu.framebuffer_count(), 4);
        ensemble.release(&mut gpu);
        ensemble.release(&mut gpu);
        assert!(ensemble.is_released());
        assert_eq!(gpu.framebuffer_count(), 2);
        assert!(matches!(ensemble.add(&mut gpu), Err(GpuError::Released(_))));
    }
}
