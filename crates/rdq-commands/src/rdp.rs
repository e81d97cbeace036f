//! Rasterizer overlay commands.
//!
//! The overlay owns four consecutive tags (`0xC..=0xF`), giving 64 command
//! ids. Ids below [`TRI_FILL`] and between `0x10` and `0x1F` are fixups: the
//! queue engine rewrites them into native commands using state it tracks.
//! Everything else is native and can be handed to the rasterizer verbatim.

pub const TAG: u8 = 0xC;

// Fixups.
pub const SET_LOOKUP_ADDRESS: u8 = 0x01;
pub const TEXTURE_RECTANGLE_EX: u8 = 0x02;
pub const TEXTURE_RECTANGLE_FLIP_EX: u8 = 0x03;
pub const SET_SCISSOR_EX: u8 = 0x04;
pub const SET_OTHER_MODES_EX: u8 = 0x05;
pub const MODIFY_OTHER_MODES: u8 = 0x06;
pub const SET_FILL_COLOR_32: u8 = 0x07;
pub const SET_COLOR_IMAGE_EX: u8 = 0x10;
pub const SET_TEXTURE_IMAGE_EX: u8 = 0x11;
pub const FILL_RECTANGLE_EX: u8 = 0x12;

// Triangles. Bit 0 adds z, bit 1 adds texture, bit 2 adds shade.
pub const TRI_FILL: u8 = 0x08;
pub const TRI_FILL_ZBUF: u8 = 0x09;
pub const TRI_TEX: u8 = 0x0A;
pub const TRI_TEX_ZBUF: u8 = 0x0B;
pub const TRI_SHADE: u8 = 0x0C;
pub const TRI_SHADE_ZBUF: u8 = 0x0D;
pub const TRI_SHADE_TEX: u8 = 0x0E;
pub const TRI_SHADE_TEX_ZBUF: u8 = 0x0F;

pub const TEXTURE_RECTANGLE: u8 = 0x24;
pub const TEXTURE_RECTANGLE_FLIP: u8 = 0x25;
pub const SYNC_LOAD: u8 = 0x26;
pub const SYNC_PIPE: u8 = 0x27;
pub const SYNC_TILE: u8 = 0x28;
pub const SYNC_FULL: u8 = 0x29;
pub const SET_SCISSOR: u8 = 0x2D;
pub const SET_PRIM_DEPTH: u8 = 0x2E;
pub const SET_OTHER_MODES: u8 = 0x2F;
pub const SET_TILE_SIZE: u8 = 0x32;
pub const LOAD_TILE: u8 = 0x34;
pub const SET_TILE: u8 = 0x35;
pub const FILL_RECTANGLE: u8 = 0x36;
pub const SET_FILL_COLOR: u8 = 0x37;
pub const SET_FOG_COLOR: u8 = 0x38;
pub const SET_BLEND_COLOR: u8 = 0x39;
pub const SET_PRIM_COLOR: u8 = 0x3A;
pub const SET_ENV_COLOR: u8 = 0x3B;
pub const SET_COMBINE_MODE: u8 = 0x3C;
pub const SET_TEXTURE_IMAGE: u8 = 0x3D;
pub const SET_Z_IMAGE: u8 = 0x3E;
pub const SET_COLOR_IMAGE: u8 = 0x3F;

/// Words of the edge coefficients every triangle starts with.
pub const TRI_EDGE_WORDS: usize = 8;
const TRI_SHADE_WORDS: usize = 16;
const TRI_TEX_WORDS: usize = 16;
const TRI_ZBUF_WORDS: usize = 4;

/// Size in words of the lookup address table kept by the queue engine.
pub const LOOKUP_SLOTS: usize = 16;

/// Returns true if the header byte belongs to this overlay.
pub const fn owns(header: u8) -> bool {
    header >> 6 == TAG >> 2
}

/// Overlay-relative command id of a header byte.
pub const fn id_of(header: u8) -> u8 {
    header & 0x3F
}

pub const fn is_triangle(id: u8) -> bool {
    id >= TRI_FILL && id <= TRI_SHADE_TEX_ZBUF
}

/// Returns true for commands the rasterizer executes directly.
pub fn is_native(id: u8) -> bool {
    is_triangle(id) || (id >= TEXTURE_RECTANGLE && command_words(id).is_some())
}

/// Returns true for commands only the queue engine understands.
pub fn is_fixup(id: u8) -> bool {
    !is_native(id) && command_words(id).is_some()
}

pub fn command_words(id: u8) -> Option<usize> {
    if is_triangle(id) {
        let mut words = TRI_EDGE_WORDS;
        if id & 0x4 != 0 {
            words += TRI_SHADE_WORDS;
        }
        if id & 0x2 != 0 {
            words += TRI_TEX_WORDS;
        }
        if id & 0x1 != 0 {
            words += TRI_ZBUF_WORDS;
        }
        return Some(words);
    }
    match id {
        SET_LOOKUP_ADDRESS | SET_SCISSOR_EX | SET_OTHER_MODES_EX | SET_FILL_COLOR_32 => Some(2),
        SET_COLOR_IMAGE_EX | SET_TEXTURE_IMAGE_EX | FILL_RECTANGLE_EX => Some(2),
        MODIFY_OTHER_MODES => Some(3),
        TEXTURE_RECTANGLE_EX | TEXTURE_RECTANGLE_FLIP_EX => Some(4),
        TEXTURE_RECTANGLE | TEXTURE_RECTANGLE_FLIP => Some(4),
        SYNC_LOAD | SYNC_PIPE | SYNC_TILE | SYNC_FULL => Some(2),
        SET_SCISSOR | SET_PRIM_DEPTH | SET_OTHER_MODES => Some(2),
        SET_TILE_SIZE | LOAD_TILE | SET_TILE | FILL_RECTANGLE => Some(2),
        SET_FILL_COLOR | SET_FOG_COLOR | SET_BLEND_COLOR | SET_PRIM_COLOR | SET_ENV_COLOR => Some(2),
        SET_COMBINE_MODE | SET_TEXTURE_IMAGE | SET_Z_IMAGE | SET_COLOR_IMAGE => Some(2),
        _ => None,
    }
}

/// Pack a 10.2 coordinate pair the way rectangle and scissor words carry it.
pub const fn xy(x: u32, y: u32) -> u32 {
    ((x & 0xFFF) << 12) | (y & 0xFFF)
}

/// Split a word packed by [`xy`].
pub const fn unpack_xy(word: u32) -> (u32, u32) {
    ((word >> 12) & 0xFFF, word & 0xFFF)
}

/// Lookup-relative address word: `slot << 28 | offset`.
pub const fn lookup_word(slot: u8, offset: u32) -> u32 {
    ((slot as u32) << 28) | (offset & crate::ARG0_MASK)
}

/// Image descriptor word shared by the colour, texture and z image commands.
pub const fn image_word0(format: crate::TexFormat, width: u32) -> u32 {
    (format.bits() << 19) | (width.wrapping_sub(1) & 0x3FF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triangle_sizes() {
        assert_eq!(command_words(TRI_FILL), Some(8));
        assert_eq!(command_words(TRI_FILL_ZBUF), Some(12));
        assert_eq!(command_words(TRI_TEX), Some(24));
        assert_eq!(command_words(TRI_SHADE), Some(24));
        assert_eq!(command_words(TRI_SHADE_TEX), Some(40));
    }

    #[test]
    fn fixups_are_not_native() {
        for id in [SET_SCISSOR_EX, SET_FILL_COLOR_32, SET_COLOR_IMAGE_EX, FILL_RECTANGLE_EX] {
            assert!(is_fixup(id), "0x{id:02X} should be a fixup");
            assert!(!is_native(id));
        }
        for id in [FILL_RECTANGLE, SET_SCISSOR, SYNC_PIPE, TRI_FILL] {
            assert!(is_native(id), "0x{id:02X} should be native");
        }
        assert!(!is_native(0x20));
        assert!(!is_fixup(0x20));
    }

    #[test]
    fn overlay_spans_four_tags() {
        assert!(owns(0xC0));
        assert!(owns(0xFF));
        assert!(!owns(0xBF));
        assert_eq!(id_of(0xE4), TEXTURE_RECTANGLE);
    }
}
