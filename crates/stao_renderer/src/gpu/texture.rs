use stao_math::Vec4;

/// Storage format of a color attachment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8 bits per channel, values quantized to [0, 1] on store.
    Rgba8,
    /// 32-bit float per channel.
    Rgba32F,
}

impl TextureFormat {
    /// Round a value the way a store into this format would.
    #[inline]
    pub fn quantize(self, value: Vec4) -> Vec4 {
        match self {
            TextureFormat::Rgba8 => {
                (value.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round() / 255.0
            }
            TextureFormat::Rgba32F => value,
        }
    }

    pub fn bytes_per_texel(self) -> usize {
        match self {
            TextureFormat::Rgba8 => 4,
            TextureFormat::Rgba32F => 16,
        }
    }
}

/// A 2D color image, row-major with the origin at the top-left.
#[derive(Clone, Debug)]
pub struct Texture {
    width: u32,
    height: u32,
    format: TextureFormat,
    texels: Vec<Vec4>,
}

impl Texture {
    pub fn new(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            width,
            height,
            format,
            texels: vec![Vec4::ZERO; (width * height) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    #[inline]
    pub fn load(&self, x: u32, y: u32) -> Vec4 {
        if x >= self.width || y >= self.height {
            return Vec4::ZERO;
        }
        self.texels[(y * self.width + x) as usize]
    }

    /// Load with clamp-to-edge addressing.
    #[inline]
    pub fn load_clamped(&self, x: i32, y: i32) -> Vec4 {
        let x = x.clamp(0, self.width as i32 - 1) as u32;
        let y = y.clamp(0, self.height as i32 - 1) as u32;
        self.load(x, y)
    }

    #[inline]
    pub fn store(&mut self, x: u32, y: u32, value: Vec4) {
        if x < self.width && y < self.height {
            self.texels[(y * self.width + x) as usize] = self.format.quantize(value);
        }
    }

    pub fn fill(&mut self, value: Vec4) {
        let value = self.format.quantize(value);
        self.texels.fill(value);
    }

    pub fn texels(&self) -> &[Vec4] {
        &self.texels
    }

    pub(crate) fn texels_mut(&mut self) -> &mut [Vec4] {
        &mut self.texels
    }

    /// Convert to an 8-bit RGBA image.
    pub fn to_rgba8(&self) -> image::RgbaImage {
        let mut img = image::RgbaImage::new(self.width, self.height);
        for (texel, pixel) in self.texels.iter().zip(img.pixels_mut()) {
            let c = (texel.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round();
            *pixel = image::Rgba([c.x as u8, c.y as u8, c.z as u8, c.w as u8]);
        }
        img
    }
}

/// A depth attachment, cleared to 1.0 (far plane).
#[derive(Clone, Debug)]
pub struct DepthTexture {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl DepthTexture {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            values: vec![1.0; (width * height) as usize],
        }
    }

    #[inline]
    pub fn load(&self, x: u32, y: u32) -> f32 {
        if x >= self.width || y >= self.height {
            return 1.0;
        }
        self.values[(y * self.width + x) as usize]
    }

    #[inline]
    pub fn store(&mut self, x: u32, y: u32, depth: f32) {
        if x < self.width && y < self.height {
            self.values[(y * self.width + x) as usize] = depth;
        }
    }

    pub fn fill(&mut self, depth: f32) {
        self.values.fill(depth);
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut [f32] {
        &mut self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgba8_quantizes_on_store() {
        let mut tex = Texture::new(2, 2, TextureFormat::Rgba8);
        tex.store(1, 0, Vec4::new(0.5, 1.5, -1.0, 0.2));

        let v = tex.load(1, 0);
        assert!((v.x - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(v.y, 1.0);
        assert_eq!(v.z, 0.0);
        assert!((v.w - 51.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_rgba32f_keeps_values() {
        let mut tex = Texture::new(2, 2, TextureFormat::Rgba32F);
        let value = Vec4::new(-3.25, 0.125, 7.0, 0.0);
        tex.store(0, 1, value);
        assert_eq!(tex.load(0, 1), value);
        // Out of range reads return zero
        assert_eq!(tex.load(5, 5), Vec4::ZERO);
    }

    #[test]
    fn test_load_clamped() {
        let mut tex = Texture::new(2, 1, TextureFormat::Rgba32F);
        tex.store(1, 0, Vec4::ONE);
        assert_eq!(tex.load_clamped(9, -4), Vec4::ONE);
        assert_eq!(tex.load_clamped(-1, 0), Vec4::ZERO);
    }

    #[test]
    fn test_depth_cleared_to_far() {
        let mut depth = DepthTexture::new(3, 3);
        assert_eq!(depth.load(1, 1), 1.0);
        depth.store(1, 1, 0.25);
        assert_eq!(depth.load(1, 1), 0.25);
        depth.fill(1.0);
        assert_eq!(depth.load(1, 1), 1.0);
    }

    #[test]
    fn test_to_rgba8() {
        let mut tex = Texture::new(1, 1, TextureFormat::Rgba32F);
        tex.store(0, 0, Vec4::new(1.0, 0.0, 0.5, 1.0));
        let img = tex.to_rgba8();
        assert_eq!(img.get_pixel(0, 0).0, [255, 0, 128, 255]);
    }
}
