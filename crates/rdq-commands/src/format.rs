//! Image and texel formats.

/// Pixel format family, bits 2..=4 of a [`TexFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ImageFormat {
    Rgba = 0,
    Yuv = 1,
    ColorIndex = 2,
    IntensityAlpha = 3,
    Intensity = 4,
}

impl ImageFormat {
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0 => Some(Self::Rgba),
            1 => Some(Self::Yuv),
            2 => Some(Self::ColorIndex),
            3 => Some(Self::IntensityAlpha),
            4 => Some(Self::Intensity),
            _ => None,
        }
    }
}

/// Bits per pixel, bits 0..=1 of a [`TexFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum PixelSize {
    Bpp4 = 0,
    Bpp8 = 1,
    Bpp16 = 2,
    Bpp32 = 3,
}

impl PixelSize {
    pub fn from_bits(bits: u32) -> Self {
        match bits & 0x3 {
            0 => Self::Bpp4,
            1 => Self::Bpp8,
            2 => Self::Bpp16,
            _ => Self::Bpp32,
        }
    }

    pub fn bits_per_pixel(self) -> u32 {
        4 << (self as u32)
    }

    /// Bytes covered by `pixels` pixels, rounded up.
    pub fn bytes_for(self, pixels: u32) -> u32 {
        (pixels * self.bits_per_pixel()).div_ceil(8)
    }
}

/// A texel or framebuffer format: family plus pixel size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TexFormat {
    pub format: ImageFormat,
    pub size: PixelSize,
}

impl TexFormat {
    pub const RGBA16: Self = Self::new(ImageFormat::Rgba, PixelSize::Bpp16);
    pub const RGBA32: Self = Self::new(ImageFormat::Rgba, PixelSize::Bpp32);
    pub const CI4: Self = Self::new(ImageFormat::ColorIndex, PixelSize::Bpp4);
    pub const CI8: Self = Self::new(ImageFormat::ColorIndex, PixelSize::Bpp8);
    pub const IA8: Self = Self::new(ImageFormat::IntensityAlpha, PixelSize::Bpp8);
    pub const IA16: Self = Self::new(ImageFormat::IntensityAlpha, PixelSize::Bpp16);
    pub const I4: Self = Self::new(ImageFormat::Intensity, PixelSize::Bpp4);
    pub const I8: Self = Self::new(ImageFormat::Intensity, PixelSize::Bpp8);

    pub const fn new(format: ImageFormat, size: PixelSize) -> Self {
        Self { format, size }
    }

    /// Packed 5-bit code: `format << 2 | size`.
    pub const fn bits(self) -> u32 {
        ((self.format as u32) << 2) | self.size as u32
    }

    pub fn from_bits(bits: u32) -> Option<Self> {
        Some(Self::new(
            ImageFormat::from_bits((bits >> 2) & 0x7)?,
            PixelSize::from_bits(bits),
        ))
    }

    /// Bytes in one row of `width` pixels.
    pub fn stride(self, width: u32) -> u32 {
        self.size.bytes_for(width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bits_roundtrip() {
        for fmt in [TexFormat::RGBA16, TexFormat::RGBA32, TexFormat::IA8, TexFormat::I4] {
            assert_eq!(TexFormat::from_bits(fmt.bits()), Some(fmt));
        }
        assert_eq!(TexFormat::from_bits(0x1F), None);
    }

    #[test]
    fn stride_rounds_up_nibbles() {
        assert_eq!(TexFormat::I4.stride(3), 2);
        assert_eq!(TexFormat::RGBA16.stride(16), 32);
        assert_eq!(TexFormat::RGBA32.stride(16), 64);
    }
}
