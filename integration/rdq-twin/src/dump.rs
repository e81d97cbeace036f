//! Framebuffer export.

use std::path::Path;

use image::{Rgba, RgbaImage};
use rdq_commands::{Color, ImageFormat, PixelSize};
use rdq_hal::PhysicalMemory;

use crate::error::TwinError;
use crate::raster::Image;

/// Read `height` rows of a colour image into an RGBA buffer.
pub fn to_rgba<M: PhysicalMemory + ?Sized>(mem: &M, image: &Image, height: u32) -> Result<RgbaImage, TwinError> {
    let len = image.stride() * height;
    if !mem.contains(image.addr, len) {
        return Err(TwinError::OutOfBounds { addr: image.addr, len });
    }

    let mut out = RgbaImage::new(image.width, height);
    for (x, y, px) in out.enumerate_pixels_mut() {
        let row = image.addr + y * image.stride();
        let color = match image.format.size {
            PixelSize::Bpp32 => Color::from_packed32(mem.read_u32(row + x * 4)),
            PixelSize::Bpp16 => Color::from_packed16(mem.read_u16(row + x * 2)),
            PixelSize::Bpp8 => {
                let v = mem.read_u8(row + x);
                match image.format.format {
                    ImageFormat::IntensityAlpha => Color::rgba32((v >> 4) * 0x11, (v >> 4) * 0x11, (v >> 4) * 0x11, (v & 0xF) * 0x11),
                    _ => Color::rgba32(v, v, v, 0xFF),
                }
            }
            PixelSize::Bpp4 => return Err(TwinError::Unsupported("4bpp colour image")),
        };
        *px = Rgba([color.r, color.g, color.b, color.a]);
    }
    Ok(out)
}

/// Write a colour image to a PNG file.
pub fn save_png<M: PhysicalMemory + ?Sized>(mem: &M, image: &Image, height: u32, path: &Path) -> Result<(), TwinError> {
    let rgba = to_rgba(mem, image, height)?;
    rgba.save(path)?;
    log::info!("wrote {}x{} framebuffer to {}", image.width, height, path.display());
    Ok(())
}
