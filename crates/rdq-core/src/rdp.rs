//! Typed rasterizer commands.
//!
//! Every operation declares its auto-sync footprint, then goes through the
//! fixup dispatcher. Operations whose encoding depends on pipeline state the
//! producer cannot see (cycle mode, colour image depth, scissor) use an
//! interpreted command on the live queue. Inside a block, rectangles bake
//! the native command when the cycle mode was set earlier in the same
//! block, and fall back to the interpreted command otherwise. The fill
//! colour is always interpreted, so that the engine can convert it again
//! after every colour image change.

use glam::Vec2;
use rdq_commands::modes::{self, CycleMode};
use rdq_commands::resource::{self, PIPE, TMEM};
use rdq_commands::{rdp, Color, TexFormat};
use rdq_hal::Coprocessor;

use crate::autosync::SyncKind;
use crate::error::{QueueError, Result};
use crate::math::fixed::{self, px_to_10_2};
use crate::mem::Rdram;
use crate::queue::RdpQueue;

/// Half of the other-modes value patched by
/// [`RdpQueue::modify_other_modes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModesWord {
    High,
    Low,
}

const CYCLE_BITS_HIGH: u32 = (modes::SOM_CYCLE_MASK >> 32) as u32;

impl<C: Coprocessor<Rdram>> RdpQueue<C> {
    /// Cycle mode known to the block being recorded.
    fn baked_cycle(&mut self) -> Option<CycleMode> {
        self.builder_mut().and_then(|b| b.cycle)
    }

    // ------------------------------------------------------------------
    // Render modes
    // ------------------------------------------------------------------

    pub fn set_other_modes(&mut self, modes: u64) -> Result<()> {
        self.autosync_change(PIPE)?;
        let (arg0, word1) = modes::split(modes);
        // Always interpreted: the queue engine re-derives the scissor.
        self.write8(rdp::SET_OTHER_MODES_EX, arg0, word1)?;
        if let Some(b) = self.builder_mut() {
            b.cycle = Some(CycleMode::from_modes(modes));
        }
        Ok(())
    }

    /// `word = (word & and_mask) | or_value` on one half of the other modes.
    pub fn modify_other_modes(&mut self, word: ModesWord, and_mask: u32, or_value: u32) -> Result<()> {
        self.autosync_change(PIPE)?;
        let index = match word {
            ModesWord::High => 0,
            ModesWord::Low => 1,
        };
        self.write(rdp::MODIFY_OTHER_MODES, index, &[and_mask, or_value])?;

        if let (ModesWord::High, Some(b)) = (word, self.builder_mut()) {
            if and_mask & CYCLE_BITS_HIGH == 0 {
                b.cycle = Some(CycleMode::from_modes(u64::from(or_value) << 32));
            } else if (!and_mask | or_value) & CYCLE_BITS_HIGH != 0 {
                b.cycle = None;
            }
        }
        Ok(())
    }

    pub fn set_cycle_mode(&mut self, mode: CycleMode) -> Result<()> {
        let bits = (mode.to_modes() >> 32) as u32;
        self.modify_other_modes(ModesWord::High, !CYCLE_BITS_HIGH, bits)
    }

    /// Clip to `[x0, x1) x [y0, y1)` pixels.
    pub fn set_scissor(&mut self, x0: u16, y0: u16, x1: u16, y1: u16) -> Result<()> {
        // The right edge encoding depends on the cycle mode at execution
        // time, so this is interpreted even inside blocks.
        self.write8(
            rdp::SET_SCISSOR_EX,
            rdp::xy(px_to_10_2(x0), px_to_10_2(y0)),
            rdp::xy(px_to_10_2(x1), px_to_10_2(y1)),
        )
    }

    pub fn set_combine_mode(&mut self, combine: u64) -> Result<()> {
        self.autosync_change(PIPE)?;
        let (arg0, word1) = modes::split(combine);
        self.write8(rdp::SET_COMBINE_MODE, arg0, word1)
    }

    // ------------------------------------------------------------------
    // Colours
    // ------------------------------------------------------------------

    /// Fill colour, converted to the colour image depth in effect when the
    /// command executes. The queue engine keeps the colour and converts it
    /// again whenever the colour image changes.
    pub fn set_fill_color(&mut self, color: Color) -> Result<()> {
        self.autosync_change(PIPE)?;
        self.write8(rdp::SET_FILL_COLOR_32, 0, color.to_packed32())
    }

    /// Fill word written as is, for callers that already packed it. The
    /// next colour image change replaces it with the last colour given to
    /// [`RdpQueue::set_fill_color`].
    pub fn set_fill_color_raw(&mut self, word: u32) -> Result<()> {
        self.autosync_change(PIPE)?;
        self.write8(rdp::SET_FILL_COLOR, 0, word)
    }

    pub fn set_blend_color(&mut self, color: Color) -> Result<()> {
        self.autosync_change(PIPE)?;
        self.write8(rdp::SET_BLEND_COLOR, 0, color.to_packed32())
    }

    pub fn set_fog_color(&mut self, color: Color) -> Result<()> {
        self.autosync_change(PIPE)?;
        self.write8(rdp::SET_FOG_COLOR, 0, color.to_packed32())
    }

    pub fn set_env_color(&mut self, color: Color) -> Result<()> {
        self.autosync_change(PIPE)?;
        self.write8(rdp::SET_ENV_COLOR, 0, color.to_packed32())
    }

    /// The primitive colour is latched per primitive and needs no sync.
    pub fn set_prim_color(&mut self, color: Color) -> Result<()> {
        self.write8(rdp::SET_PRIM_COLOR, 0, color.to_packed32())
    }

    pub fn set_prim_depth(&mut self, z: u16, delta_z: i16) -> Result<()> {
        self.write8(rdp::SET_PRIM_DEPTH, 0, (u32::from(z) << 16) | u32::from(delta_z as u16))
    }

    // ------------------------------------------------------------------
    // Images
    // ------------------------------------------------------------------

    /// Render to `width x height` pixels at `addr`, rows `stride` bytes
    /// apart. Also resets the scissor to the whole image.
    pub fn set_color_image(&mut self, addr: u32, format: TexFormat, width: u16, height: u16, stride: u32) -> Result<()> {
        self.autosync_change(PIPE)?;
        let word0 = rdp::image_word0(format, row_pixels(format, stride));
        // Blocks route through lookup slot 0 so the queue engine sees the
        // depth change and re-converts the fill colour on every replay.
        self.fixup_write8(rdp::SET_COLOR_IMAGE, rdp::SET_COLOR_IMAGE_EX, word0, rdp::lookup_word(0, addr))?;
        self.set_scissor(0, 0, width, height)
    }

    /// Like [`RdpQueue::set_color_image`], with the address resolved when
    /// the command executes: lookup slot `slot` plus `offset`. Slot 0 is
    /// always 0, making `offset` absolute.
    pub fn set_color_image_lookup(
        &mut self,
        slot: u8,
        offset: u32,
        format: TexFormat,
        width: u16,
        height: u16,
        stride: u32,
    ) -> Result<()> {
        check_slot(slot, 0)?;
        self.autosync_change(PIPE)?;
        let word0 = rdp::image_word0(format, row_pixels(format, stride));
        self.write8(rdp::SET_COLOR_IMAGE_EX, word0, rdp::lookup_word(slot, offset))?;
        self.set_scissor(0, 0, width, height)
    }

    pub fn set_z_image(&mut self, addr: u32) -> Result<()> {
        self.autosync_change(PIPE)?;
        self.write8(rdp::SET_Z_IMAGE, 0, addr)
    }

    /// Source image for [`RdpQueue::load_tile`], `width` pixels per row.
    pub fn set_texture_image(&mut self, addr: u32, format: TexFormat, width: u16) -> Result<()> {
        self.write8(rdp::SET_TEXTURE_IMAGE, rdp::image_word0(format, width.into()), addr)
    }

    pub fn set_texture_image_lookup(&mut self, slot: u8, offset: u32, format: TexFormat, width: u16) -> Result<()> {
        check_slot(slot, 0)?;
        self.write8(
            rdp::SET_TEXTURE_IMAGE_EX,
            rdp::image_word0(format, width.into()),
            rdp::lookup_word(slot, offset),
        )
    }

    /// Point lookup slot `slot` (1..=15) at `addr`. Takes effect in queue
    /// order, so a block recorded with lookup images can be replayed
    /// against different buffers.
    pub fn set_lookup_address(&mut self, slot: u8, addr: u32) -> Result<()> {
        check_slot(slot, 1)?;
        self.write8(rdp::SET_LOOKUP_ADDRESS, u32::from(slot), addr)
    }

    // ------------------------------------------------------------------
    // Tiles and TMEM
    // ------------------------------------------------------------------

    /// Describe tile `tile`: texels of `format` at TMEM byte `tmem_addr`,
    /// rows `tmem_pitch` bytes apart.
    pub fn set_tile(&mut self, tile: u8, format: TexFormat, tmem_addr: u16, tmem_pitch: u16, palette: u8) -> Result<()> {
        self.autosync_change(resource::tile(tile))?;
        let word0 = (format.bits() << 19) | ((u32::from(tmem_pitch) / 8 & 0x1FF) << 9) | (u32::from(tmem_addr) / 8 & 0x1FF);
        let word1 = (u32::from(tile & 0x7) << 24) | (u32::from(palette & 0xF) << 20);
        self.write8(rdp::SET_TILE, word0, word1)
    }

    /// Texel bounds `[s0, s1) x [t0, t1)` of tile `tile`.
    pub fn set_tile_size(&mut self, tile: u8, s0: u16, t0: u16, s1: u16, t1: u16) -> Result<()> {
        self.autosync_change(resource::tile(tile))?;
        let (word0, word1) = tile_rect(tile, s0, t0, s1, t1);
        self.write8(rdp::SET_TILE_SIZE, word0, word1)
    }

    /// Copy texels `[s0, s1) x [t0, t1)` of the texture image into TMEM
    /// through tile `tile`.
    pub fn load_tile(&mut self, tile: u8, s0: u16, t0: u16, s1: u16, t1: u16) -> Result<()> {
        self.autosync_change(TMEM)?;
        let (word0, word1) = tile_rect(tile, s0, t0, s1, t1);
        self.write8(rdp::LOAD_TILE, word0, word1)?;
        self.autosync_use(resource::tile(tile));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Primitives
    // ------------------------------------------------------------------

    /// Draw `[x0, x1) x [y0, y1)` sampling tile `tile` from `(s, t)`,
    /// stepping `(dsdx, dtdy)` texels per pixel.
    #[allow(clippy::too_many_arguments)]
    pub fn texture_rectangle(
        &mut self,
        tile: u8,
        x0: f32,
        y0: f32,
        x1: f32,
        y1: f32,
        s: f32,
        t: f32,
        dsdx: f32,
        dtdy: f32,
    ) -> Result<()> {
        let rect = TexRect { tile, x0, y0, x1, y1, s, t, dsdx, dtdy };
        self.texture_rectangle_with(rdp::TEXTURE_RECTANGLE_EX, rdp::TEXTURE_RECTANGLE, rect)
    }

    /// Like [`RdpQueue::texture_rectangle`] with S and T swapped. Not
    /// available in copy mode.
    #[allow(clippy::too_many_arguments)]
    pub fn texture_rectangle_flip(
        &mut self,
        tile: u8,
        x0: f32,
        y0: f32,
        x1: f32,
        y1: f32,
        s: f32,
        t: f32,
        dsdx: f32,
        dtdy: f32,
    ) -> Result<()> {
        let rect = TexRect { tile, x0, y0, x1, y1, s, t, dsdx, dtdy };
        self.texture_rectangle_with(rdp::TEXTURE_RECTANGLE_FLIP_EX, rdp::TEXTURE_RECTANGLE_FLIP, rect)
    }

    fn texture_rectangle_with(&mut self, ex_id: u8, native_id: u8, r: TexRect) -> Result<()> {
        let mut xl = fixed::f32_to_10_2(r.x1);
        let mut dsdx = fixed::f32_to_s5_10(r.dsdx);
        let static_id = match self.baked_cycle() {
            Some(mode) => {
                if mode.inclusive_right_edge() {
                    xl = xl.saturating_sub(4);
                }
                if mode == CycleMode::Copy {
                    dsdx = (dsdx as i16).wrapping_mul(4) as u16;
                }
                native_id
            }
            None => ex_id,
        };

        let word0 = rdp::xy(xl, fixed::f32_to_10_2(r.y1));
        let word1 = (u32::from(r.tile & 0x7) << 24) | rdp::xy(fixed::f32_to_10_2(r.x0), fixed::f32_to_10_2(r.y0));
        let word2 = (u32::from(fixed::f32_to_s10_5(r.s)) << 16) | u32::from(fixed::f32_to_s10_5(r.t));
        let word3 = (u32::from(dsdx) << 16) | u32::from(fixed::f32_to_s5_10(r.dtdy));
        self.dispatch(ex_id, static_id, word0, &[word1, word2, word3])?;
        self.autosync_use(resource::tile(r.tile) | TMEM | PIPE);
        Ok(())
    }

    /// Fill `[x0, x1) x [y0, y1)` pixels with the fill colour (fill mode) or
    /// the flat pipeline colour (one/two cycle mode).
    pub fn fill_rectangle(&mut self, x0: u16, y0: u16, x1: u16, y1: u16) -> Result<()> {
        let mut xl = px_to_10_2(x1);
        let static_id = match self.baked_cycle() {
            Some(mode) => {
                if mode.inclusive_right_edge() {
                    xl = xl.saturating_sub(4);
                }
                rdp::FILL_RECTANGLE
            }
            None => rdp::FILL_RECTANGLE_EX,
        };
        self.dispatch(
            rdp::FILL_RECTANGLE_EX,
            static_id,
            rdp::xy(xl, px_to_10_2(y1)),
            &[rdp::xy(px_to_10_2(x0), px_to_10_2(y0))],
        )?;
        self.autosync_use(PIPE);
        Ok(())
    }

    /// Flat triangle. Vertex order does not matter.
    pub fn fill_triangle(&mut self, v0: Vec2, v1: Vec2, v2: Vec2) -> Result<()> {
        self.fill_triangle_raw(triangle_edges(v0, v1, v2))?;
        self.autosync_use(PIPE);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Syncs
    // ------------------------------------------------------------------

    pub fn sync_pipe(&mut self) -> Result<()> {
        self.emit_sync(SyncKind::Pipe)
    }

    pub fn sync_tile(&mut self) -> Result<()> {
        self.emit_sync(SyncKind::Tile)
    }

    pub fn sync_load(&mut self) -> Result<()> {
        self.emit_sync(SyncKind::Load)
    }

    pub fn sync_full(&mut self) -> Result<()> {
        self.emit_sync(SyncKind::Full)
    }
}

struct TexRect {
    tile: u8,
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
    s: f32,
    t: f32,
    dsdx: f32,
    dtdy: f32,
}

fn check_slot(slot: u8, first: u8) -> Result<()> {
    if slot < first || usize::from(slot) >= rdp::LOOKUP_SLOTS {
        return Err(QueueError::InvalidLookupSlot(slot));
    }
    Ok(())
}

fn row_pixels(format: TexFormat, stride: u32) -> u32 {
    stride * 8 / format.size.bits_per_pixel()
}

/// Tile rectangle words: exclusive API bounds become inclusive 10.2.
fn tile_rect(tile: u8, s0: u16, t0: u16, s1: u16, t1: u16) -> (u32, u32) {
    let word0 = rdp::xy(px_to_10_2(s0), px_to_10_2(t0));
    let word1 = (u32::from(tile & 0x7) << 24)
        | rdp::xy(px_to_10_2(s1.saturating_sub(1)), px_to_10_2(t1.saturating_sub(1)));
    (word0, word1)
}

/// Edge words of a flat triangle.
///
/// Vertices are sorted top to bottom. The major edge H runs top to bottom,
/// M top to middle, L middle to bottom. H and M are anchored at the top Y,
/// L at the middle Y. Bit 23 of word 0 is set when H is the right edge.
pub fn triangle_edges(v0: Vec2, v1: Vec2, v2: Vec2) -> [u32; 8] {
    let mut v = [v0, v1, v2];
    for p in &mut v {
        p.y = (p.y * 4.0).round() / 4.0;
    }
    v.sort_by(|a, b| a.y.total_cmp(&b.y));
    let [top, mid, bot] = v;

    let slope = |a: Vec2, b: Vec2| {
        let dy = b.y - a.y;
        if dy == 0.0 {
            0.0
        } else {
            (b.x - a.x) / dy
        }
    };
    let dxhdy = slope(top, bot);
    let dxmdy = slope(top, mid);
    let dxldy = slope(mid, bot);
    let right_major = top.x + dxhdy * (mid.y - top.y) > mid.x;

    [
        (u32::from(right_major) << 23) | fixed::f32_to_s11_2(bot.y),
        (fixed::f32_to_s11_2(mid.y) << 16) | fixed::f32_to_s11_2(top.y),
        fixed::f32_to_s15_16(mid.x),
        fixed::f32_to_s15_16(dxldy),
        fixed::f32_to_s15_16(top.x),
        fixed::f32_to_s15_16(dxhdy),
        fixed::f32_to_s15_16(top.x),
        fixed::f32_to_s15_16(dxmdy),
    ]
}
