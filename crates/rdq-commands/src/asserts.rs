//! Assertion codes raised by the queue engine.

/// A flipped texture rectangle was issued in copy mode.
pub const FLIP_COPY: u16 = 0xC001;

pub fn message(code: u16) -> &'static str {
    match code {
        FLIP_COPY => "TextureRectangleFlip cannot be used in copy mode",
        _ => "Unknown assert",
    }
}
