//! Rasterizer model.
//!
//! Executes native command ranges straight from RDRAM, the way the
//! hardware fetches them after a hand-off. Pixel rules:
//! - Y ranges are always exclusive at the bottom.
//! - In fill and copy mode the right edge of rectangles and of the scissor
//!   is inclusive; in one/two cycle mode it is exclusive.
//! - Fill mode writes the fill word pattern; copy mode copies texels; one
//!   and two cycle mode write texels for texture rectangles and the flat
//!   colour (blend colour with blending enabled, primitive colour
//!   otherwise) for everything else.

use heapless::Deque;
use rdq_commands::modes::{self, CycleMode, SOM_BLENDING};
use rdq_commands::{asserts, header_of, rdp, Color, ImageFormat, PixelSize, TexFormat, ARG0_MASK, MAX_COMMAND_WORDS};
use rdq_hal::PhysicalMemory;

use crate::error::TwinError;

pub const TMEM_BYTES: usize = 4096;
const HISTORY_DEPTH: usize = 64;

/// An image bound to the colour, texture or z slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Image {
    pub addr: u32,
    pub format: TexFormat,
    /// Pixels per row.
    pub width: u32,
}

impl Image {
    fn decode(arg0: u32, addr: u32) -> Result<Self, TwinError> {
        let format = TexFormat::from_bits((arg0 >> 19) & 0x1F).ok_or(TwinError::Unsupported("image format"))?;
        Ok(Self {
            addr: addr & ARG0_MASK,
            format,
            width: (arg0 & 0x3FF) + 1,
        })
    }

    pub fn stride(&self) -> u32 {
        self.format.stride(self.width)
    }
}

/// One tile descriptor. Bounds are 10.2, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub format: TexFormat,
    /// TMEM byte address.
    pub tmem: u32,
    /// Bytes per TMEM row.
    pub line: u32,
    pub palette: u8,
    pub sl: u32,
    pub tl: u32,
    pub sh: u32,
    pub th: u32,
}

impl Default for Tile {
    fn default() -> Self {
        Self {
            format: TexFormat::RGBA16,
            tmem: 0,
            line: 0,
            palette: 0,
            sl: 0,
            tl: 0,
            sh: 0,
            th: 0,
        }
    }
}

/// Scissor rectangle as programmed, 10.2.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scissor {
    pub xh: u32,
    pub yh: u32,
    pub xl: u32,
    pub yl: u32,
}

/// A range handed to the rasterizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    pub start: u32,
    pub end: u32,
    pub commands: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RasterStats {
    pub submissions: u32,
    pub commands: u32,
    pub syncs: u32,
    pub pixels: u64,
}

/// A native command as executed, for tracing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub addr: u32,
    pub words: Vec<u32>,
}

impl TraceEntry {
    pub fn id(&self) -> u8 {
        rdp::id_of(header_of(self.words[0]))
    }
}

pub struct Rasterizer {
    other_modes: u64,
    combine: u64,
    fill_color: u32,
    blend_color: u32,
    prim_color: u32,
    env_color: u32,
    fog_color: u32,
    prim_depth: u32,
    scissor: Scissor,
    color_image: Option<Image>,
    texture_image: Option<Image>,
    z_image: Option<u32>,
    tiles: [Tile; 8],
    tmem: Vec<u8>,
    dp_start: u32,
    dp_end: u32,
    history: Deque<Submission, HISTORY_DEPTH>,
    stats: RasterStats,
    trace: Option<Vec<TraceEntry>>,
}

impl Default for Rasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Rasterizer {
    pub fn new() -> Self {
        Self {
            other_modes: 0,
            combine: 0,
            fill_color: 0,
            blend_color: 0,
            prim_color: 0,
            env_color: 0,
            fog_color: 0,
            prim_depth: 0,
            scissor: Scissor::default(),
            color_image: None,
            texture_image: None,
            z_image: None,
            tiles: [Tile::default(); 8],
            tmem: vec![0; TMEM_BYTES],
            dp_start: 0,
            dp_end: 0,
            history: Deque::new(),
            stats: RasterStats::default(),
            trace: None,
        }
    }

    /// Reset pipeline state, keeping tracing as configured.
    pub fn reset(&mut self) {
        let trace = self.trace.take().map(|mut t| {
            t.clear();
            t
        });
        *self = Self::new();
        self.trace = trace;
    }

    pub fn other_modes(&self) -> u64 {
        self.other_modes
    }

    pub fn cycle_mode(&self) -> CycleMode {
        CycleMode::from_modes(self.other_modes)
    }

    pub fn combine_mode(&self) -> u64 {
        self.combine
    }

    pub fn fill_color(&self) -> u32 {
        self.fill_color
    }

    pub fn blend_color(&self) -> u32 {
        self.blend_color
    }

    pub fn prim_color(&self) -> u32 {
        self.prim_color
    }

    pub fn env_color(&self) -> u32 {
        self.env_color
    }

    pub fn fog_color(&self) -> u32 {
        self.fog_color
    }

    pub fn prim_depth(&self) -> u32 {
        self.prim_depth
    }

    pub fn scissor(&self) -> Scissor {
        self.scissor
    }

    pub fn color_image(&self) -> Option<Image> {
        self.color_image
    }

    pub fn texture_image(&self) -> Option<Image> {
        self.texture_image
    }

    pub fn z_image(&self) -> Option<u32> {
        self.z_image
    }

    pub fn tile(&self, n: u8) -> Tile {
        self.tiles[usize::from(n & 0x7)]
    }

    pub fn tmem(&self) -> &[u8] {
        &self.tmem
    }

    /// Start and end of the last executed range.
    pub fn dp_range(&self) -> (u32, u32) {
        (self.dp_start, self.dp_end)
    }

    /// Recent submissions, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Submission> {
        self.history.iter()
    }

    pub fn stats(&self) -> RasterStats {
        self.stats
    }

    pub fn enable_trace(&mut self) {
        self.trace.get_or_insert_with(Vec::new);
    }

    /// Executed commands since tracing was enabled.
    pub fn trace(&self) -> &[TraceEntry] {
        self.trace.as_deref().unwrap_or(&[])
    }

    pub fn take_trace(&mut self) -> Vec<TraceEntry> {
        self.trace.as_mut().map(std::mem::take).unwrap_or_default()
    }

    /// Execute the native commands in `[start, end)`.
    pub fn execute<M: PhysicalMemory + ?Sized>(&mut self, mem: &mut M, start: u32, end: u32) -> Result<(), TwinError> {
        if start % 8 != 0 || end % 8 != 0 || end < start {
            return Err(TwinError::Misaligned { start, end });
        }
        if !mem.contains(start, end - start) {
            return Err(TwinError::OutOfBounds {
                addr: start,
                len: end - start,
            });
        }

        let mut pc = start;
        let mut commands = 0;
        let mut words = heapless::Vec::<u32, MAX_COMMAND_WORDS>::new();
        while pc < end {
            let header = header_of(mem.read_u32(pc));
            if !rdp::owns(header) || !rdp::is_native(rdp::id_of(header)) {
                return Err(TwinError::NotNative { header, at: pc });
            }
            let n = rdq_commands::command_words(header).ok_or(TwinError::UnknownCommand { header, at: pc })?;
            let available = ((end - pc) / 4) as usize;
            if n > available {
                return Err(TwinError::Truncated {
                    header,
                    needed: n,
                    available,
                });
            }
            words.clear();
            for i in 0..n as u32 {
                // n <= MAX_COMMAND_WORDS
                let _ = words.push(mem.read_u32(pc + i * 4));
            }
            if let Some(trace) = &mut self.trace {
                trace.push(TraceEntry {
                    addr: pc,
                    words: words.to_vec(),
                });
            }
            log::trace!("raster 0x{pc:06X}: {:08X?}", words.as_slice());
            self.command(mem, &words)?;
            pc += n as u32 * 4;
            commands += 1;
        }

        self.dp_start = start;
        self.dp_end = end;
        if self.history.is_full() {
            self.history.pop_front();
        }
        let _ = self.history.push_back(Submission { start, end, commands });
        self.stats.submissions += 1;
        self.stats.commands += commands;
        Ok(())
    }

    fn command<M: PhysicalMemory + ?Sized>(&mut self, mem: &mut M, words: &[u32]) -> Result<(), TwinError> {
        let id = rdp::id_of(header_of(words[0]));
        let arg0 = words[0] & ARG0_MASK;
        match id {
            rdp::SYNC_LOAD | rdp::SYNC_PIPE | rdp::SYNC_TILE | rdp::SYNC_FULL => self.stats.syncs += 1,
            rdp::SET_OTHER_MODES => self.other_modes = modes::join(arg0, words[1]),
            rdp::SET_COMBINE_MODE => self.combine = modes::join(arg0, words[1]),
            rdp::SET_SCISSOR => {
                let (xh, yh) = rdp::unpack_xy(arg0);
                let (xl, yl) = rdp::unpack_xy(words[1]);
                self.scissor = Scissor { xh, yh, xl, yl };
            }
            rdp::SET_PRIM_DEPTH => self.prim_depth = words[1],
            rdp::SET_FILL_COLOR => self.fill_color = words[1],
            rdp::SET_BLEND_COLOR => self.blend_color = words[1],
            rdp::SET_PRIM_COLOR => self.prim_color = words[1],
            rdp::SET_ENV_COLOR => self.env_color = words[1],
            rdp::SET_FOG_COLOR => self.fog_color = words[1],
            rdp::SET_COLOR_IMAGE => self.color_image = Some(Image::decode(arg0, words[1])?),
            rdp::SET_TEXTURE_IMAGE => self.texture_image = Some(Image::decode(arg0, words[1])?),
            rdp::SET_Z_IMAGE => self.z_image = Some(words[1] & ARG0_MASK),
            rdp::SET_TILE => {
                let n = ((words[1] >> 24) & 0x7) as usize;
                let tile = &mut self.tiles[n];
                tile.format = TexFormat::from_bits((arg0 >> 19) & 0x1F).ok_or(TwinError::Unsupported("tile format"))?;
                tile.line = ((arg0 >> 9) & 0x1FF) * 8;
                tile.tmem = (arg0 & 0x1FF) * 8;
                tile.palette = ((words[1] >> 20) & 0xF) as u8;
            }
            rdp::SET_TILE_SIZE => {
                self.set_tile_bounds(arg0, words[1]);
            }
            rdp::LOAD_TILE => {
                self.set_tile_bounds(arg0, words[1]);
                self.load_tile(mem, ((words[1] >> 24) & 0x7) as usize)?;
            }
            rdp::FILL_RECTANGLE => self.fill_rectangle(mem, arg0, words[1])?,
            rdp::TEXTURE_RECTANGLE => self.texture_rectangle(mem, words, false)?,
            rdp::TEXTURE_RECTANGLE_FLIP => self.texture_rectangle(mem, words, true)?,
            id if rdp::is_triangle(id) => self.triangle(mem, words)?,
            _ => return Err(TwinError::NotNative {
                header: header_of(words[0]),
                at: 0,
            }),
        }
        Ok(())
    }

    fn set_tile_bounds(&mut self, arg0: u32, word1: u32) {
        let tile = &mut self.tiles[((word1 >> 24) & 0x7) as usize];
        let (sl, tl) = rdp::unpack_xy(arg0);
        let (sh, th) = rdp::unpack_xy(word1 & ARG0_MASK);
        tile.sl = sl;
        tile.tl = tl;
        tile.sh = sh;
        tile.th = th;
    }

    fn load_tile<M: PhysicalMemory + ?Sized>(&mut self, mem: &M, n: usize) -> Result<(), TwinError> {
        let image = self.texture_image.ok_or(TwinError::MissingImage("load tile"))?;
        let tile = self.tiles[n];
        let size = image.format.size;
        let (s0, t0, s1, t1) = (tile.sl >> 2, tile.tl >> 2, tile.sh >> 2, tile.th >> 2);
        if s1 < s0 || t1 < t0 {
            return Ok(());
        }
        let len = size.bytes_for(s1 - s0 + 1);
        for t in t0..=t1 {
            let src = image.addr + t * image.stride() + size.bytes_for(s0);
            let dst = tile.tmem + (t - t0) * tile.line;
            if !mem.contains(src, len) {
                return Err(TwinError::OutOfBounds { addr: src, len });
            }
            if (dst + len) as usize > TMEM_BYTES {
                return Err(TwinError::TmemOverflow { addr: dst, len });
            }
            for i in 0..len {
                self.tmem[(dst + i) as usize] = mem.read_u8(src + i);
            }
        }
        Ok(())
    }

    fn fill_rectangle<M: PhysicalMemory + ?Sized>(&mut self, mem: &mut M, arg0: u32, word1: u32) -> Result<(), TwinError> {
        let image = self.color_image.ok_or(TwinError::MissingImage("fill rectangle"))?;
        let cycle = self.cycle_mode();
        let (xl, yl) = rdp::unpack_xy(arg0);
        let (xh, yh) = rdp::unpack_xy(word1);
        let inclusive = cycle.inclusive_right_edge();

        let (x_start, x_end) = span(xh, xl, inclusive);
        for y in yh.div_ceil(4)..yl.div_ceil(4) {
            for x in x_start..x_end {
                if !self.in_scissor(x, y, inclusive) {
                    continue;
                }
                match cycle {
                    CycleMode::Fill => self.write_fill(mem, &image, x, y)?,
                    CycleMode::Copy => {
                        log::warn!("fill rectangle in copy mode ignored");
                        return Ok(());
                    }
                    CycleMode::One | CycleMode::Two => {
                        let color = self.flat_color();
                        self.write_color(mem, &image, x, y, color)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn texture_rectangle<M: PhysicalMemory + ?Sized>(&mut self, mem: &mut M, words: &[u32], flip: bool) -> Result<(), TwinError> {
        let image = self.color_image.ok_or(TwinError::MissingImage("texture rectangle"))?;
        let cycle = self.cycle_mode();
        match cycle {
            CycleMode::Copy if flip => {
                return Err(TwinError::Assert {
                    code: asserts::FLIP_COPY,
                    message: asserts::message(asserts::FLIP_COPY),
                });
            }
            CycleMode::Fill => {
                log::warn!("texture rectangle in fill mode ignored");
                return Ok(());
            }
            _ => {}
        }

        let (xl, yl) = rdp::unpack_xy(words[0] & ARG0_MASK);
        let tile = self.tiles[((words[1] >> 24) & 0x7) as usize];
        let (xh, yh) = rdp::unpack_xy(words[1] & ARG0_MASK);
        let s0 = f32::from((words[2] >> 16) as i16) / 32.0;
        let t0 = f32::from(words[2] as i16) / 32.0;
        let mut dsdx = f32::from((words[3] >> 16) as i16) / 1024.0;
        let dtdy = f32::from(words[3] as i16) / 1024.0;
        if cycle == CycleMode::Copy {
            // Copy mode steps four texels per clock.
            dsdx /= 4.0;
        }

        let inclusive = cycle.inclusive_right_edge();
        let (x_start, x_end) = span(xh, xl, inclusive);
        for y in yh.div_ceil(4)..yl.div_ceil(4) {
            for x in x_start..x_end {
                if !self.in_scissor(x, y, inclusive) {
                    continue;
                }
                let dx = (x * 4) as f32 / 4.0 - xh as f32 / 4.0;
                let dy = (y * 4) as f32 / 4.0 - yh as f32 / 4.0;
                let (s, t) = if flip {
                    (s0 + dy * dsdx, t0 + dx * dtdy)
                } else {
                    (s0 + dx * dsdx, t0 + dy * dtdy)
                };
                let color = self.sample(&tile, s, t)?;
                self.write_color(mem, &image, x, y, color)?;
            }
        }
        Ok(())
    }

    fn triangle<M: PhysicalMemory + ?Sized>(&mut self, mem: &mut M, words: &[u32]) -> Result<(), TwinError> {
        let image = self.color_image.ok_or(TwinError::MissingImage("triangle"))?;
        let cycle = self.cycle_mode();
        if cycle == CycleMode::Copy {
            log::warn!("triangle in copy mode ignored");
            return Ok(());
        }

        let right_major = words[0] & (1 << 23) != 0;
        let yl = s11_2(words[0]);
        let ym = s11_2(words[1] >> 16);
        let yh = s11_2(words[1]);
        let (xl, dxldy) = (s15_16(words[2]), s15_16(words[3]));
        let (xh, dxhdy) = (s15_16(words[4]), s15_16(words[5]));
        let (xm, dxmdy) = (s15_16(words[6]), s15_16(words[7]));

        let inclusive = cycle.inclusive_right_edge();
        let first_row = yh.floor().max(0.0) as u32;
        let last_row = yl.ceil().max(0.0) as u32;
        for y in first_row..last_row {
            let sy = y as f32 + 0.5;
            if sy < yh || sy >= yl {
                continue;
            }
            let major = xh + dxhdy * (sy - yh);
            let minor = if sy < ym {
                xm + dxmdy * (sy - yh)
            } else {
                xl + dxldy * (sy - ym)
            };
            let (left, right) = if right_major { (minor, major) } else { (major, minor) };
            let x_start = (left - 0.5).ceil().max(0.0) as u32;
            let x_end = (right - 0.5).ceil().max(0.0) as u32;
            for x in x_start..x_end {
                if !self.in_scissor(x, y, inclusive) {
                    continue;
                }
                if cycle == CycleMode::Fill {
                    self.write_fill(mem, &image, x, y)?;
                } else {
                    let color = self.flat_color();
                    self.write_color(mem, &image, x, y, color)?;
                }
            }
        }
        Ok(())
    }

    fn flat_color(&self) -> Color {
        if self.other_modes & SOM_BLENDING != 0 {
            Color::from_packed32(self.blend_color)
        } else {
            Color::from_packed32(self.prim_color)
        }
    }

    fn in_scissor(&self, x: u32, y: u32, inclusive_right: bool) -> bool {
        let (x4, y4) = (x * 4, y * 4);
        let s = &self.scissor;
        let right = if inclusive_right { x4 <= s.xl } else { x4 < s.xl };
        x4 >= s.xh && y4 >= s.yh && y4 < s.yl && right
    }

    fn sample(&self, tile: &Tile, s: f32, t: f32) -> Result<Color, TwinError> {
        let ss = (s.floor() as i64 - i64::from(tile.sl >> 2)).max(0) as u32;
        let tt = (t.floor() as i64 - i64::from(tile.tl >> 2)).max(0) as u32;
        let row = tile.tmem + tt * tile.line;
        let size = tile.format.size;
        let bytes = size.bytes_for(1).max(1);
        let addr = row + (ss * size.bits_per_pixel()) / 8;
        if (addr + bytes) as usize > TMEM_BYTES {
            return Err(TwinError::TmemOverflow { addr, len: bytes });
        }
        let at = addr as usize;
        let color = match size {
            PixelSize::Bpp32 => Color::from_packed32(u32::from_be_bytes([
                self.tmem[at],
                self.tmem[at + 1],
                self.tmem[at + 2],
                self.tmem[at + 3],
            ])),
            PixelSize::Bpp16 => {
                let raw = u16::from_be_bytes([self.tmem[at], self.tmem[at + 1]]);
                match tile.format.format {
                    ImageFormat::IntensityAlpha => {
                        let i = (raw >> 8) as u8;
                        Color::rgba32(i, i, i, raw as u8)
                    }
                    _ => Color::from_packed16(raw),
                }
            }
            PixelSize::Bpp8 => {
                let raw = self.tmem[at];
                match tile.format.format {
                    ImageFormat::IntensityAlpha => {
                        let i = (raw >> 4) * 0x11;
                        Color::rgba32(i, i, i, (raw & 0xF) * 0x11)
                    }
                    _ => Color::rgba32(raw, raw, raw, raw),
                }
            }
            PixelSize::Bpp4 => {
                let byte = self.tmem[at];
                let nibble = if ss % 2 == 0 { byte >> 4 } else { byte & 0xF };
                let i = nibble * 0x11;
                Color::rgba32(i, i, i, i)
            }
        };
        Ok(color)
    }

    fn pixel_addr<M: PhysicalMemory + ?Sized>(mem: &M, image: &Image, x: u32, y: u32) -> Result<u32, TwinError> {
        let size = image.format.size;
        if size == PixelSize::Bpp4 {
            return Err(TwinError::Unsupported("4bpp colour image"));
        }
        let bytes = size.bytes_for(1);
        let addr = image.addr + y * image.stride() + x * bytes;
        if !mem.contains(addr, bytes) {
            return Err(TwinError::OutOfBounds { addr, len: bytes });
        }
        Ok(addr)
    }

    fn write_fill<M: PhysicalMemory + ?Sized>(&mut self, mem: &mut M, image: &Image, x: u32, y: u32) -> Result<(), TwinError> {
        let addr = Self::pixel_addr(mem, image, x, y)?;
        let fill = self.fill_color;
        match image.format.size {
            PixelSize::Bpp32 => mem.write_u32(addr, fill),
            PixelSize::Bpp16 => mem.write_u16(addr, if x % 2 == 0 { (fill >> 16) as u16 } else { fill as u16 }),
            _ => mem.write_u8(addr, (fill >> (24 - 8 * (x % 4))) as u8),
        }
        self.stats.pixels += 1;
        Ok(())
    }

    fn write_color<M: PhysicalMemory + ?Sized>(&mut self, mem: &mut M, image: &Image, x: u32, y: u32, color: Color) -> Result<(), TwinError> {
        let addr = Self::pixel_addr(mem, image, x, y)?;
        match image.format.size {
            PixelSize::Bpp32 => mem.write_u32(addr, color.to_packed32()),
            PixelSize::Bpp16 => mem.write_u16(addr, color.to_packed16()),
            _ => mem.write_u8(addr, color.r),
        }
        self.stats.pixels += 1;
        Ok(())
    }
}

/// Pixel columns covered by a rectangle from `xh` to `xl` (10.2).
fn span(xh: u32, xl: u32, inclusive: bool) -> (u32, u32) {
    let start = xh.div_ceil(4);
    let end = if inclusive { xl / 4 + 1 } else { xl.div_ceil(4) };
    (start, end.max(start))
}

fn s11_2(field: u32) -> f32 {
    let v = (((field & 0x3FFF) << 18) as i32) >> 18;
    v as f32 / 4.0
}

fn s15_16(word: u32) -> f32 {
    word as i32 as f32 / 65536.0
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Flat memory for rasterizer tests.
    struct Ram(Vec<u8>);

    impl PhysicalMemory for Ram {
        fn size(&self) -> u32 {
            self.0.len() as u32
        }
        fn read_u8(&self, addr: u32) -> u8 {
            self.0[addr as usize]
        }
        fn write_u8(&mut self, addr: u32, value: u8) {
            self.0[addr as usize] = value;
        }
    }

    fn header(id: u8) -> u32 {
        u32::from(rdq_commands::header(rdp::TAG, id)) << 24
    }

    /// Write commands at 0x100 and execute them.
    fn run(raster: &mut Rasterizer, ram: &mut Ram, cmds: &[&[u32]]) -> Result<(), TwinError> {
        let mut addr = 0x100;
        for cmd in cmds {
            for &w in *cmd {
                ram.write_u32(addr, w);
                addr += 4;
            }
        }
        raster.execute(ram, 0x100, addr)
    }

    const FB: u32 = 0x1000;

    fn fb_setup(size_fmt: TexFormat, width: u32) -> [u32; 2] {
        [header(rdp::SET_COLOR_IMAGE) | rdp::image_word0(size_fmt, width), FB]
    }

    #[test]
    fn fill_mode_scissor_right_edge_is_inclusive() {
        let mut ram = Ram(vec![0; 0x2000]);
        let mut raster = Rasterizer::new();
        let modes = modes::split(modes::SOM_CYCLE_FILL);
        let result = run(
            &mut raster,
            &mut ram,
            &[
                &fb_setup(TexFormat::RGBA16, 8),
                &[header(rdp::SET_OTHER_MODES) | modes.0, modes.1],
                // x in [0, 4) as the queue engine encodes it for fill mode.
                &[header(rdp::SET_SCISSOR) | rdp::xy(0, 0), rdp::xy(4 * 4 - 1, 4)],
                &[header(rdp::SET_FILL_COLOR), 0xFFFF_FFFF],
                &[header(rdp::FILL_RECTANGLE) | rdp::xy(7 * 4, 4), rdp::xy(0, 0)],
            ],
        );
        assert!(result.is_ok(), "execute failed: {result:?}");
        for x in 0..8u32 {
            let px = ram.read_u16(FB + x * 2);
            let expected = if x < 4 { 0xFFFF } else { 0 };
            assert_eq!(px, expected, "pixel {x}: expected 0x{expected:04X}, got 0x{px:04X}");
        }
    }

    #[test]
    fn fill_pattern_alternates_halves() {
        let mut ram = Ram(vec![0; 0x2000]);
        let mut raster = Rasterizer::new();
        let modes = modes::split(modes::SOM_CYCLE_FILL);
        run(
            &mut raster,
            &mut ram,
            &[
                &fb_setup(TexFormat::RGBA16, 4),
                &[header(rdp::SET_OTHER_MODES) | modes.0, modes.1],
                &[header(rdp::SET_SCISSOR), rdp::xy(4 * 4, 4)],
                &[header(rdp::SET_FILL_COLOR), 0x1111_2222],
                &[header(rdp::FILL_RECTANGLE) | rdp::xy(3 * 4, 4), 0],
            ],
        )
        .unwrap();
        let row: Vec<u16> = (0..4).map(|x| ram.read_u16(FB + x * 2)).collect();
        assert_eq!(row, vec![0x1111, 0x2222, 0x1111, 0x2222]);
    }

    #[test]
    fn one_cycle_uses_blend_color_when_blending() {
        let mut ram = Ram(vec![0; 0x2000]);
        let mut raster = Rasterizer::new();
        let modes = modes::split(modes::SOM_CYCLE_1 | SOM_BLENDING);
        run(
            &mut raster,
            &mut ram,
            &[
                &fb_setup(TexFormat::RGBA32, 2),
                &[header(rdp::SET_OTHER_MODES) | modes.0, modes.1],
                &[header(rdp::SET_SCISSOR), rdp::xy(2 * 4, 4)],
                &[header(rdp::SET_PRIM_COLOR), 0x0102_0304],
                &[header(rdp::SET_BLEND_COLOR), 0xA0B0_C0D0],
                &[header(rdp::FILL_RECTANGLE) | rdp::xy(2 * 4, 4), 0],
            ],
        )
        .unwrap();
        assert_eq!(ram.read_u32(FB), 0xA0B0_C0D0);
        assert_eq!(ram.read_u32(FB + 4), 0xA0B0_C0D0);
    }

    #[test]
    fn flip_in_copy_mode_asserts() {
        let mut ram = Ram(vec![0; 0x2000]);
        let mut raster = Rasterizer::new();
        let modes = modes::split(modes::SOM_CYCLE_COPY);
        let err = run(
            &mut raster,
            &mut ram,
            &[
                &fb_setup(TexFormat::RGBA16, 8),
                &[header(rdp::SET_OTHER_MODES) | modes.0, modes.1],
                &[header(rdp::TEXTURE_RECTANGLE_FLIP) | rdp::xy(16, 16), 0, 0, 0x1000_0400],
            ],
        )
        .unwrap_err();
        assert!(matches!(err, TwinError::Assert { code: 0xC001, .. }), "got {err:?}");
    }

    #[test]
    fn rejects_fixups() {
        let mut ram = Ram(vec![0; 0x2000]);
        let mut raster = Rasterizer::new();
        let err = run(&mut raster, &mut ram, &[&[header(rdp::SET_SCISSOR_EX), 0]]).unwrap_err();
        assert!(matches!(err, TwinError::NotNative { at: 0x100, .. }));
    }

    #[test]
    fn rejects_misaligned_range() {
        let mut ram = Ram(vec![0; 0x2000]);
        let mut raster = Rasterizer::new();
        assert!(matches!(
            raster.execute(&mut ram, 0x104, 0x10C),
            Err(TwinError::Misaligned { .. })
        ));
    }

    #[test]
    fn history_is_bounded() {
        let mut ram = Ram(vec![0; 0x2000]);
        let mut raster = Rasterizer::new();
        ram.write_u32(0x100, header(rdp::SYNC_PIPE));
        for _ in 0..(HISTORY_DEPTH + 5) {
            raster.execute(&mut ram, 0x100, 0x108).unwrap();
        }
        assert_eq!(raster.history().count(), HISTORY_DEPTH);
        assert_eq!(raster.stats().submissions as usize, HISTORY_DEPTH + 5);
        assert_eq!(raster.dp_range(), (0x100, 0x108));
    }

    #[test]
    fn signed_fields() {
        assert_eq!(s11_2(0x3FFF), -0.25);
        assert_eq!(s11_2(64), 16.0);
        assert_eq!(s15_16(0xFFFF_8000), -0.5);
    }
}
