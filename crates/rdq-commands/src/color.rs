use crate::PixelSize;

/// An 8-bit-per-channel RGBA colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgba32(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Build from 5-bit channels and a 1-bit alpha, expanding to 8 bits.
    pub const fn rgba16(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self {
            r: expand5(r),
            g: expand5(g),
            b: expand5(b),
            a: if a & 1 != 0 { 0xFF } else { 0 },
        }
    }

    /// `r << 24 | g << 16 | b << 8 | a`.
    pub const fn to_packed32(self) -> u32 {
        ((self.r as u32) << 24) | ((self.g as u32) << 16) | ((self.b as u32) << 8) | self.a as u32
    }

    pub const fn from_packed32(c: u32) -> Self {
        Self::rgba32((c >> 24) as u8, (c >> 16) as u8, (c >> 8) as u8, c as u8)
    }

    /// RGBA 5551.
    pub const fn to_packed16(self) -> u16 {
        (((self.r >> 3) as u16) << 11)
            | (((self.g >> 3) as u16) << 6)
            | (((self.b >> 3) as u16) << 1)
            | (self.a >> 7) as u16
    }

    pub const fn from_packed16(c: u16) -> Self {
        Self::rgba16(
            ((c >> 11) & 0x1F) as u8,
            ((c >> 6) & 0x1F) as u8,
            ((c >> 1) & 0x1F) as u8,
            (c & 1) as u8,
        )
    }

    /// Fill-mode word for a colour image of `size`: 16-bit pixels repeat
    /// twice, 8-bit pixels (and below) repeat the red channel four times.
    pub fn fill_word(self, size: PixelSize) -> u32 {
        match size {
            PixelSize::Bpp32 => self.to_packed32(),
            PixelSize::Bpp16 => {
                let c = self.to_packed16() as u32;
                (c << 16) | c
            }
            PixelSize::Bpp8 | PixelSize::Bpp4 => self.r as u32 * 0x0101_0101,
        }
    }
}

const fn expand5(v: u8) -> u8 {
    let v = v & 0x1F;
    (v << 3) | (v >> 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed16_truncates_low_bits() {
        let c = Color::rgba32(0xFF, 0x80, 0x07, 0x80);
        assert_eq!(c.to_packed16(), (0x1F << 11) | (0x10 << 6) | 1);
    }

    #[test]
    fn packed16_survives_expansion() {
        for raw in [0x0000u16, 0xFFFF, 0x8001, 0x1234, 0xF83E] {
            assert_eq!(Color::from_packed16(raw).to_packed16(), raw);
        }
    }

    #[test]
    fn fill_word_per_depth() {
        let c = Color::rgba32(0xFF, 0, 0, 0xFF);
        assert_eq!(c.fill_word(PixelSize::Bpp32), 0xFF00_00FF);
        assert_eq!(c.fill_word(PixelSize::Bpp16), 0xF801_F801);
        assert_eq!(c.fill_word(PixelSize::Bpp8), 0xFFFF_FFFF);
    }

    #[test]
    fn packed32_order() {
        assert_eq!(Color::rgba32(1, 2, 3, 4).to_packed32(), 0x0102_0304);
    }
}
