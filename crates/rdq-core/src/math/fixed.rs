//! Fixed-point conversion helpers for rasterizer command fields.
//!
//! - 10.2 unsigned for rectangle and scissor coordinates
//! - s10.5 for texture rectangle S/T
//! - s5.10 for texture rectangle per-pixel steps
//! - s11.2 (14-bit field) for triangle Y coordinates
//! - s15.16 for triangle edge X and slopes

use fixed::types::{I14F2, I16F16};

/// Convert a whole pixel coordinate to 10.2. Coordinates past the 1023
/// pixel limit saturate.
pub fn px_to_10_2(val: u16) -> u32 {
    u32::from(val.min(1023)) << 2
}

/// Convert f32 to unsigned 10.2. Range: 0.0 to 1023.75.
pub fn f32_to_10_2(val: f32) -> u32 {
    let clamped = val.clamp(0.0, 1023.75);
    (clamped * 4.0) as u32
}

/// Convert f32 to s10.5. Range: -1024.0 to +1023.97.
pub fn f32_to_s10_5(val: f32) -> u16 {
    let clamped = val.clamp(-1024.0, 1023.968_75);
    (clamped * 32.0) as i16 as u16
}

/// Convert f32 to s5.10. Range: -32.0 to +31.999.
pub fn f32_to_s5_10(val: f32) -> u16 {
    let clamped = val.clamp(-32.0, 31.999_023);
    (clamped * 1024.0) as i16 as u16
}

/// Convert f32 to the 14-bit s11.2 triangle Y field.
pub fn f32_to_s11_2(val: f32) -> u32 {
    let clamped = val.clamp(-2048.0, 2047.75);
    (I14F2::saturating_from_num(clamped).to_bits() as u16 as u32) & 0x3FFF
}

/// Convert f32 to s15.16.
pub fn f32_to_s15_16(val: f32) -> u32 {
    I16F16::saturating_from_num(val).to_bits() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_two_saturates() {
        assert_eq!(px_to_10_2(16), 64);
        assert_eq!(px_to_10_2(5000), 1023 * 4);
        assert_eq!(f32_to_10_2(2.25), 9);
        assert_eq!(f32_to_10_2(-1.0), 0);
    }

    #[test]
    fn texture_coordinate_formats() {
        assert_eq!(f32_to_s10_5(1.0), 32);
        assert_eq!(f32_to_s10_5(-1.0), 0xFFE0);
        assert_eq!(f32_to_s5_10(1.0), 1024);
        assert_eq!(f32_to_s5_10(0.25), 256);
    }

    #[test]
    fn triangle_formats() {
        assert_eq!(f32_to_s11_2(16.0), 64);
        assert_eq!(f32_to_s11_2(-0.25), 0x3FFF);
        assert_eq!(f32_to_s15_16(1.0), 0x0001_0000);
        assert_eq!(f32_to_s15_16(-0.5), 0xFFFF_8000);
    }
}
