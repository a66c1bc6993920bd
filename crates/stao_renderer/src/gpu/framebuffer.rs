use std::path::Path;

use stao_math::Vec4;

use super::texture::{DepthTexture, Texture, TextureFormat};
use super::{GpuError, GpuResult};

/// Maximum number of color attachments a framebuffer can carry.
pub const MAX_COLOR_ATTACHMENTS: usize = 3;

/// A set of same-sized render targets: up to three color attachments and
/// an optional depth attachment.
#[derive(Clone, Debug)]
pub struct Framebuffer {
    width: u32,
    height: u32,
    colors: Vec<Texture>,
    depth: Option<DepthTexture>,
}

impl Framebuffer {
    pub fn new(width: u32, height: u32, formats: &[TextureFormat], depth: bool) -> GpuResult<Self> {
        if width == 0 || height == 0 {
            return Err(GpuError::ZeroSize);
        }
        if formats.len() > MAX_COLOR_ATTACHMENTS {
            return Err(GpuError::TooManyAttachments(formats.len()));
        }
        Ok(Self {
            width,
            height,
            colors: formats
                .iter()
                .map(|&format| Texture::new(width, height, format))
                .collect(),
            depth: depth.then(|| DepthTexture::new(width, height)),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn color_count(&self) -> usize {
        self.colors.len()
    }

    pub fn color(&self, index: usize) -> Option<&Texture> {
        self.colors.get(index)
    }

    pub fn color_mut(&mut self, index: usize) -> Option<&mut Texture> {
        self.colors.get_mut(index)
    }

    pub fn depth(&self) -> Option<&DepthTexture> {
        self.depth.as_ref()
    }

    pub fn depth_mut(&mut self) -> Option<&mut DepthTexture> {
        self.depth.as_mut()
    }

    /// Clear every color attachment to `color` and the depth attachment to `depth`.
    pub fn clear(&mut self, color: Vec4, depth: f32) {
        for texture in &mut self.colors {
            texture.fill(color);
        }
        if let Some(d) = &mut self.depth {
            d.fill(depth);
        }
    }

    /// Read a texel from a color attachment; zero when the attachment is missing.
    #[inline]
    pub fn read(&self, attachment: usize, x: u32, y: u32) -> Vec4 {
        self.colors
            .get(attachment)
            .map(|t| t.load(x, y))
            .unwrap_or(Vec4::ZERO)
    }

    #[inline]
    pub fn read_depth(&self, x: u32, y: u32) -> f32 {
        self.depth.as_ref().map(|d| d.load(x, y)).unwrap_or(1.0)
    }

    /// Split the framebuffer into independent per-row targets for parallel writes.
    pub fn rows_mut(&mut self) -> Vec<RowTarget<'_>> {
        let width = self.width as usize;
        let attachments = self.colors.len();
        let mut rows: Vec<RowTarget<'_>> = (0..self.height)
            .map(|y| RowTarget {
                y,
                colors: Vec::with_capacity(attachments),
                depth: None,
            })
            .collect();

        for texture in &mut self.colors {
            let format = texture.format();
            for (row, texels) in rows.iter_mut().zip(texture.texels_mut().chunks_mut(width)) {
                row.colors.push((format, texels));
            }
        }
        if let Some(depth) = &mut self.depth {
            for (row, values) in rows.iter_mut().zip(depth.values_mut().chunks_mut(width)) {
                row.depth = Some(values);
            }
        }
        rows
    }

    /// Attachment 0 as an 8-bit image.
    pub fn to_image(&self) -> GpuResult<image::RgbaImage> {
        self.colors
            .first()
            .map(Texture::to_rgba8)
            .ok_or(GpuError::MissingAttachment(0))
    }

    /// Write attachment 0 to a PNG file.
    pub fn save_png(&self, path: &Path) -> GpuResult<()> {
        self.to_image()?.save(path)?;
        log::info!("Saved {}x{} image to {}", self.width, self.height, path.display());
        Ok(())
    }
}

/// Mutable view of one framebuffer row across all attachments.
pub struct RowTarget<'a> {
    pub y: u32,
    colors: Vec<(TextureFormat, &'a mut [Vec4])>,
    depth: Option<&'a mut [f32]>,
}

impl RowTarget<'_> {
    pub fn width(&self) -> usize {
        self.colors
            .first()
            .map(|(_, texels)| texels.len())
            .or_else(|| self.depth.as_ref().map(|d| d.len()))
            .unwrap_or(0)
    }

    pub fn attachment_count(&self) -> usize {
        self.colors.len()
    }

    #[inline]
    pub fn read(&self, attachment: usize, x: usize) -> Vec4 {
        self.colors
            .get(attachment)
            .and_then(|(_, texels)| texels.get(x).copied())
            .unwrap_or(Vec4::ZERO)
    }

    #[inline]
    pub fn write(&mut self, attachment: usize, x: usize, value: Vec4) {
        if let Some((format, texels)) = self.colors.get_mut(attachment) {
            if let Some(texel) = texels.get_mut(x) {
                *texel = format.quantize(value);
            }
        }
    }

    #[inline]
    pub fn depth(&self, x: usize) -> Option<f32> {
        self.depth.as_ref().and_then(|d| d.get(x).copied())
    }

    #[inline]
    pub fn set_depth(&mut self, x: usize, value: f32) {
        if let Some(d) = self.depth.as_mut().and_then(|d| d.get_mut(x)) {
            *d = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates() {
        assert!(matches!(
            Framebuffer::new(0, 4, &[TextureFormat::Rgba8], false),
            Err(GpuError::ZeroSize)
        ));
        assert!(matches!(
            Framebuffer::new(4, 4, &[TextureFormat::Rgba8; 4], false),
            Err(GpuError::TooManyAttachments(4))
        ));
    }

    #[test]
    fn test_clear_all_attachments() {
        let mut fb = Framebuffer::new(
            4,
            2,
            &[TextureFormat::Rgba8, TextureFormat::Rgba32F],
            true,
        )
        .unwrap();
        fb.clear(Vec4::new(0.0, 0.0, 0.0, 1.0), 0.5);

        assert_eq!(fb.read(0, 3, 1), Vec4::new(0.0, 0.0, 0.0, 1.0));
        assert_eq!(fb.read(1, 0, 0), Vec4::new(0.0, 0.0, 0.0, 1.0));
        assert_eq!(fb.read_depth(2, 1), 0.5);
        // Missing attachment reads as zero
        assert_eq!(fb.read(2, 0, 0), Vec4::ZERO);
    }

    #[test]
    fn test_rows_mut_writes_land_in_place() {
        let mut fb = Framebuffer::new(3, 2, &[TextureFormat::Rgba32F], true).unwrap();
        {
            let mut rows = fb.rows_mut();
            assert_eq!(rows.len(), 2);
            assert_eq!(rows[1].width(), 3);
            rows[1].write(0, 2, Vec4::splat(7.0));
            rows[1].set_depth(2, 0.125);
        }
        assert_eq!(fb.read(0, 2, 1), Vec4::splat(7.0));
        assert_eq!(fb.read_depth(2, 1), 0.125);
        assert_eq!(fb.read(0, 2, 0), Vec4::ZERO);
    }

    #[test]
    fn test_row_write_quantizes() {
        let mut fb = Framebuffer::new(1, 1, &[TextureFormat::Rgba8], false).unwrap();
        {
            let mut rows = fb.rows_mut();
            rows[0].write(0, 0, Vec4::splat(2.0));
        }
        assert_eq!(fb.read(0, 0, 0), Vec4::ONE);
    }
}
