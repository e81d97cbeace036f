//! Queue engine model.
//!
//! Interprets the queue stream the producer kicks: native rasterizer
//! commands are copied into the staging buffers and handed off in
//! contiguous ranges, fixups are rewritten into native commands using the
//! engine's mirror of rasterizer state, and block streams are followed
//! through `CALL`, `JUMP` and `RETURN`.

use rdq_commands::modes::{self, CycleMode};
use rdq_commands::{asserts, header, header_of, queue, rdp, Color, PixelSize, ARG0_MASK, MAX_COMMAND_WORDS};
use rdq_hal::{Coprocessor, PhysicalMemory, StagingBuffer};

use crate::error::TwinError;
use crate::raster::Rasterizer;

/// Deepest chain of nested block calls the engine follows.
pub const MAX_CALL_DEPTH: usize = 8;

type Words = heapless::Vec<u32, MAX_COMMAND_WORDS>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TwinStats {
    pub kicks: u32,
    pub commands: u32,
    pub fixups: u32,
    pub handoffs: u32,
    pub calls: u32,
    pub staged_words: u32,
}

enum Flow {
    Next,
    Jump(u32),
    Return,
}

/// Inline coprocessor: every kick runs to completion before returning.
pub struct Twin {
    raster: Rasterizer,
    staging: Option<[StagingBuffer; 2]>,
    current: usize,
    cursor: u32,
    /// Staged range not yet handed to the rasterizer.
    open: Option<(u32, u32)>,
    lookup: [u32; rdp::LOOKUP_SLOTS],
    other_modes: u64,
    color_size: Option<PixelSize>,
    /// Scissor as last requested, 10.2, exclusive right edge.
    scissor: Option<(u32, u32)>,
    /// Last RGBA32 fill colour, converted again on every colour image change.
    fill_color: Option<u32>,
    stats: TwinStats,
}

impl Default for Twin {
    fn default() -> Self {
        Self::new()
    }
}

impl Twin {
    pub fn new() -> Self {
        Self {
            raster: Rasterizer::new(),
            staging: None,
            current: 0,
            cursor: 0,
            open: None,
            lookup: [0; rdp::LOOKUP_SLOTS],
            other_modes: 0,
            color_size: None,
            scissor: None,
            fill_color: None,
            stats: TwinStats::default(),
        }
    }

    /// Record every command the rasterizer executes.
    pub fn with_trace(mut self) -> Self {
        self.raster.enable_trace();
        self
    }

    pub fn raster(&self) -> &Rasterizer {
        &self.raster
    }

    pub fn raster_mut(&mut self) -> &mut Rasterizer {
        &mut self.raster
    }

    pub fn stats(&self) -> TwinStats {
        self.stats
    }

    pub fn lookup(&self, slot: usize) -> u32 {
        self.lookup[slot % rdp::LOOKUP_SLOTS]
    }

    /// Run one command. `at` locates it for errors: a stream address, or
    /// the word index inside a kick.
    fn execute<M: PhysicalMemory + ?Sized>(&mut self, mem: &mut M, cmd: &[u32], at: u32, depth: usize) -> Result<Flow, TwinError> {
        self.stats.commands += 1;
        let hdr = header_of(cmd[0]);
        let arg0 = cmd[0] & ARG0_MASK;

        if rdp::owns(hdr) {
            let id = rdp::id_of(hdr);
            if rdp::is_native(id) {
                self.stage(mem, cmd)?;
            } else {
                self.stats.fixups += 1;
                self.fixup(mem, id, cmd, at)?;
            }
            return Ok(Flow::Next);
        }

        match hdr & 0x0F {
            queue::NOOP => {}
            queue::HANDOFF => {
                self.submit_open(mem)?;
                self.stats.handoffs += 1;
                self.raster.execute(mem, cmd[1] & ARG0_MASK, arg0)?;
                self.resync();
            }
            queue::CALL => {
                self.stats.calls += 1;
                self.run_stream(mem, arg0, depth + 1)?;
            }
            queue::JUMP => return Ok(Flow::Jump(arg0)),
            queue::RETURN => return Ok(Flow::Return),
            queue::WAIT_IDLE => self.submit_open(mem)?,
            _ => return Err(TwinError::UnknownCommand { header: hdr, at }),
        }
        Ok(Flow::Next)
    }

    fn run_stream<M: PhysicalMemory + ?Sized>(&mut self, mem: &mut M, start: u32, depth: usize) -> Result<(), TwinError> {
        if depth > MAX_CALL_DEPTH {
            return Err(TwinError::CallDepth(MAX_CALL_DEPTH));
        }
        let mut pc = start;
        let mut words = Words::new();
        loop {
            if !mem.contains(pc, 4) {
                return Err(TwinError::OutOfBounds { addr: pc, len: 4 });
            }
            let hdr = header_of(mem.read_u32(pc));
            let n = rdq_commands::command_words(hdr).ok_or(TwinError::UnknownCommand { header: hdr, at: pc })?;
            let len = n as u32 * 4;
            if !mem.contains(pc, len) {
                return Err(TwinError::OutOfBounds { addr: pc, len });
            }
            words.clear();
            for i in 0..n as u32 {
                let _ = words.push(mem.read_u32(pc + i * 4));
            }
            match self.execute(mem, &words, pc, depth)? {
                Flow::Next => pc += len,
                Flow::Jump(target) => pc = target,
                Flow::Return => return Ok(()),
            }
        }
    }

    /// Copy a native command into the active staging buffer, extending the
    /// open range when it is contiguous.
    fn stage<M: PhysicalMemory + ?Sized>(&mut self, mem: &mut M, cmd: &[u32]) -> Result<(), TwinError> {
        let staging = self.staging.ok_or(TwinError::NotReset)?;
        let bytes = cmd.len() as u32 * 4;
        if self.cursor + bytes > staging[self.current].end() {
            self.submit_open(mem)?;
            self.current ^= 1;
            self.cursor = staging[self.current].base;
            log::trace!("staging switched to buffer {}", self.current);
        }

        for (i, &w) in cmd.iter().enumerate() {
            mem.write_u32(self.cursor + i as u32 * 4, w);
        }
        self.observe(cmd);

        match self.open {
            Some((start, end)) if end == self.cursor => self.open = Some((start, end + bytes)),
            _ => {
                self.submit_open(mem)?;
                self.open = Some((self.cursor, self.cursor + bytes));
            }
        }
        self.cursor += bytes;
        self.stats.staged_words += cmd.len() as u32;

        if rdp::id_of(header_of(cmd[0])) == rdp::SET_COLOR_IMAGE {
            self.emit_fill_color(mem)?;
        }
        Ok(())
    }

    fn stage_native<M: PhysicalMemory + ?Sized>(&mut self, mem: &mut M, id: u8, arg0: u32, rest: &[u32]) -> Result<(), TwinError> {
        let mut words = Words::new();
        let _ = words.push((u32::from(header(rdp::TAG, id)) << 24) | (arg0 & ARG0_MASK));
        let _ = words.extend_from_slice(rest);
        self.stage(mem, &words)
    }

    fn submit_open<M: PhysicalMemory + ?Sized>(&mut self, mem: &mut M) -> Result<(), TwinError> {
        if let Some((start, end)) = self.open.take() {
            self.raster.execute(mem, start, end)?;
        }
        Ok(())
    }

    /// Track state carried by natives on the dynamic path.
    fn observe(&mut self, cmd: &[u32]) {
        let arg0 = cmd[0] & ARG0_MASK;
        match rdp::id_of(header_of(cmd[0])) {
            rdp::SET_OTHER_MODES => self.other_modes = modes::join(arg0, cmd[1]),
            rdp::SET_COLOR_IMAGE => self.color_size = Some(PixelSize::from_bits(arg0 >> 19)),
            _ => {}
        }
    }

    /// After a hand-off the rasterizer holds the authoritative state.
    fn resync(&mut self) {
        self.other_modes = self.raster.other_modes();
        self.color_size = self.raster.color_image().map(|image| image.format.size);
    }

    fn cycle(&self) -> CycleMode {
        CycleMode::from_modes(self.other_modes)
    }

    fn fixup<M: PhysicalMemory + ?Sized>(&mut self, mem: &mut M, id: u8, cmd: &[u32], at: u32) -> Result<(), TwinError> {
        let arg0 = cmd[0] & ARG0_MASK;
        match id {
            rdp::SET_LOOKUP_ADDRESS => {
                let slot = (arg0 as usize) % rdp::LOOKUP_SLOTS;
                if slot != 0 {
                    self.lookup[slot] = cmd[1];
                }
            }
            rdp::SET_COLOR_IMAGE_EX | rdp::SET_TEXTURE_IMAGE_EX => {
                let slot = (cmd[1] >> 28) as usize;
                let addr = self.lookup[slot].wrapping_add(cmd[1] & ARG0_MASK);
                let native = if id == rdp::SET_COLOR_IMAGE_EX {
                    rdp::SET_COLOR_IMAGE
                } else {
                    rdp::SET_TEXTURE_IMAGE
                };
                self.stage_native(mem, native, arg0, &[addr])?;
            }
            rdp::SET_SCISSOR_EX => {
                self.scissor = Some((arg0, cmd[1]));
                self.emit_scissor(mem)?;
            }
            rdp::SET_OTHER_MODES_EX => {
                let (a, w) = modes::split(modes::join(arg0, cmd[1]));
                self.stage_native(mem, rdp::SET_OTHER_MODES, a, &[w])?;
                self.emit_scissor(mem)?;
            }
            rdp::MODIFY_OTHER_MODES => {
                let (mut hi, mut lo) = ((self.other_modes >> 32) as u32, self.other_modes as u32);
                if arg0 & 1 == 0 {
                    hi = (hi & cmd[1]) | cmd[2];
                } else {
                    lo = (lo & cmd[1]) | cmd[2];
                }
                self.stage_native(mem, rdp::SET_OTHER_MODES, hi & ARG0_MASK, &[lo])?;
                self.emit_scissor(mem)?;
            }
            rdp::SET_FILL_COLOR_32 => {
                self.fill_color = Some(cmd[1]);
                self.emit_fill_color(mem)?;
            }
            rdp::FILL_RECTANGLE_EX => {
                let (mut xl, yl) = rdp::unpack_xy(arg0);
                if self.cycle().inclusive_right_edge() {
                    xl = xl.saturating_sub(4);
                }
                self.stage_native(mem, rdp::FILL_RECTANGLE, rdp::xy(xl, yl), &[cmd[1]])?;
            }
            rdp::TEXTURE_RECTANGLE_EX | rdp::TEXTURE_RECTANGLE_FLIP_EX => {
                let flip = id == rdp::TEXTURE_RECTANGLE_FLIP_EX;
                let cycle = self.cycle();
                if flip && cycle == CycleMode::Copy {
                    let code = asserts::FLIP_COPY;
                    let message = asserts::message(code);
                    log::error!("assertion 0x{code:04X}: {message}");
                    return Err(TwinError::Assert { code, message });
                }
                let (mut xl, yl) = rdp::unpack_xy(arg0);
                let mut slopes = cmd[3];
                if cycle.inclusive_right_edge() {
                    xl = xl.saturating_sub(4);
                }
                if cycle == CycleMode::Copy {
                    let dsdx = ((slopes >> 16) as i16).wrapping_mul(4);
                    slopes = (u32::from(dsdx as u16) << 16) | (slopes & 0xFFFF);
                }
                let native = if flip {
                    rdp::TEXTURE_RECTANGLE_FLIP
                } else {
                    rdp::TEXTURE_RECTANGLE
                };
                self.stage_native(mem, native, rdp::xy(xl, yl), &[cmd[1], cmd[2], slopes])?;
            }
            _ => {
                return Err(TwinError::UnknownCommand {
                    header: header_of(cmd[0]),
                    at,
                })
            }
        }
        Ok(())
    }

    /// Stage the remembered fill colour converted for the current colour
    /// image depth.
    fn emit_fill_color<M: PhysicalMemory + ?Sized>(&mut self, mem: &mut M) -> Result<(), TwinError> {
        let Some(rgba) = self.fill_color else {
            return Ok(());
        };
        let size = self.color_size.unwrap_or_else(|| {
            log::warn!("fill colour set without a colour image, assuming 32bpp");
            PixelSize::Bpp32
        });
        let word = Color::from_packed32(rgba).fill_word(size);
        self.stage_native(mem, rdp::SET_FILL_COLOR, 0, &[word])
    }

    fn emit_scissor<M: PhysicalMemory + ?Sized>(&mut self, mem: &mut M) -> Result<(), TwinError> {
        let Some((top_left, bottom_right)) = self.scissor else {
            return Ok(());
        };
        let (mut xl, yl) = rdp::unpack_xy(bottom_right);
        if self.cycle().inclusive_right_edge() {
            xl = xl.saturating_sub(1);
        }
        self.stage_native(mem, rdp::SET_SCISSOR, top_left, &[rdp::xy(xl, yl)])
    }
}

impl<M: PhysicalMemory + ?Sized> Coprocessor<M> for Twin {
    type Error = TwinError;

    fn reset(&mut self, _mem: &mut M, staging: [StagingBuffer; 2]) -> Result<(), TwinError> {
        self.raster.reset();
        self.staging = Some(staging);
        self.current = 0;
        self.cursor = staging[0].base;
        self.open = None;
        self.lookup = [0; rdp::LOOKUP_SLOTS];
        self.other_modes = 0;
        self.color_size = None;
        self.scissor = None;
        self.fill_color = None;
        self.stats = TwinStats::default();
        log::debug!(
            "twin reset, staging at 0x{:06X} and 0x{:06X}",
            staging[0].base,
            staging[1].base
        );
        Ok(())
    }

    fn kick(&mut self, mem: &mut M, words: &[u32]) -> Result<(), TwinError> {
        if self.staging.is_none() {
            return Err(TwinError::NotReset);
        }
        self.stats.kicks += 1;
        let mut i = 0;
        while i < words.len() {
            let hdr = header_of(words[i]);
            let n = rdq_commands::command_words(hdr).ok_or(TwinError::UnknownCommand { header: hdr, at: i as u32 })?;
            if i + n > words.len() {
                return Err(TwinError::Truncated {
                    header: hdr,
                    needed: n,
                    available: words.len() - i,
                });
            }
            match self.execute(mem, &words[i..i + n], i as u32, 0)? {
                Flow::Next => {}
                Flow::Jump(_) => return Err(TwinError::StrayControl("JUMP")),
                Flow::Return => return Err(TwinError::StrayControl("RETURN")),
            }
            i += n;
        }
        self.submit_open(mem)
    }

    fn wait_idle(&mut self, mem: &mut M) -> Result<(), TwinError> {
        self.submit_open(mem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdq_commands::TexFormat;

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

    const STAGING: [StagingBuffer; 2] = [
        StagingBuffer { base: 0x100, words: 8 },
        StagingBuffer { base: 0x200, words: 8 },
    ];

    fn cmd(id: u8, arg0: u32) -> u32 {
        (u32::from(header(rdp::TAG, id)) << 24) | arg0
    }

    fn make_twin() -> (Twin, Ram) {
        let mut ram = Ram(vec![0; 0x4000]);
        let mut twin = Twin::new().with_trace();
        twin.reset(&mut ram, STAGING).unwrap();
        (twin, ram)
    }

    #[test]
    fn contiguous_natives_share_one_submission() {
        let (mut twin, mut ram) = make_twin();
        let words = [cmd(rdp::SYNC_PIPE, 0), 0, cmd(rdp::SET_PRIM_COLOR, 0), 0x1234_5678];
        twin.kick(&mut ram, &words).unwrap();
        let history: Vec<_> = twin.raster().history().copied().collect();
        assert_eq!(history.len(), 1);
        assert_eq!((history[0].start, history[0].end), (0x100, 0x110));
        assert_eq!(twin.raster().prim_color(), 0x1234_5678);
    }

    #[test]
    fn staging_switches_buffers_when_full() {
        let (mut twin, mut ram) = make_twin();
        // Five two-word commands overflow an eight-word buffer.
        let words: Vec<u32> = (0..5).flat_map(|_| [cmd(rdp::SYNC_PIPE, 0), 0]).collect();
        twin.kick(&mut ram, &words).unwrap();
        let ranges: Vec<_> = twin.raster().history().map(|s| (s.start, s.end)).collect();
        assert_eq!(ranges, vec![(0x100, 0x120), (0x200, 0x208)]);
        assert_eq!(twin.raster().stats().syncs, 5);
    }

    #[test]
    fn stray_return_is_rejected() {
        let (mut twin, mut ram) = make_twin();
        let ret = u32::from(queue::RETURN) << 24;
        assert!(matches!(twin.kick(&mut ram, &[ret]), Err(TwinError::StrayControl("RETURN"))));
    }

    #[test]
    fn truncated_kick_is_rejected() {
        let (mut twin, mut ram) = make_twin();
        let err = twin.kick(&mut ram, &[cmd(rdp::SET_PRIM_COLOR, 0)]).unwrap_err();
        assert!(matches!(err, TwinError::Truncated { needed: 2, available: 1, .. }), "got {err:?}");
    }

    #[test]
    fn kick_before_reset_fails() {
        let mut ram = Ram(vec![0; 0x100]);
        let mut twin = Twin::new();
        assert!(matches!(twin.kick(&mut ram, &[0]), Err(TwinError::NotReset)));
    }

    #[test]
    fn lookup_slot_zero_stays_zero() {
        let (mut twin, mut ram) = make_twin();
        let words = [cmd(rdp::SET_LOOKUP_ADDRESS, 0), 0x8000, cmd(rdp::SET_LOOKUP_ADDRESS, 3), 0x9000];
        twin.kick(&mut ram, &words).unwrap();
        assert_eq!(twin.lookup(0), 0);
        assert_eq!(twin.lookup(3), 0x9000);
    }

    #[test]
    fn scissor_follows_cycle_mode() {
        let (mut twin, mut ram) = make_twin();
        let fill = modes::split(modes::SOM_CYCLE_FILL);
        let words = [
            cmd(rdp::SET_SCISSOR_EX, 0),
            rdp::xy(64, 32),
            cmd(rdp::SET_OTHER_MODES_EX, fill.0),
            fill.1,
        ];
        twin.kick(&mut ram, &words).unwrap();
        let scissor = twin.raster().scissor();
        assert_eq!((scissor.xl, scissor.yl), (63, 32), "scissor {scissor:?}");
    }

    #[test]
    fn modify_other_modes_patches_high_word() {
        let (mut twin, mut ram) = make_twin();
        let copy = modes::split(modes::SOM_CYCLE_COPY);
        let words = [cmd(rdp::MODIFY_OTHER_MODES, 0), !(0x3 << 20), copy.0];
        twin.kick(&mut ram, &words).unwrap();
        assert_eq!(twin.raster().cycle_mode(), CycleMode::Copy);
    }

    #[test]
    fn fill_color_is_converted_again_on_color_image_change() {
        let (mut twin, mut ram) = make_twin();
        let words = [
            cmd(rdp::SET_COLOR_IMAGE, rdp::image_word0(TexFormat::RGBA32, 8)),
            0x1000,
            cmd(rdp::SET_FILL_COLOR_32, 0),
            0xAABB_CCDD,
        ];
        twin.kick(&mut ram, &words).unwrap();
        assert_eq!(twin.raster().fill_color(), 0xAABB_CCDD);

        let words = [cmd(rdp::SET_COLOR_IMAGE, rdp::image_word0(TexFormat::RGBA16, 8)), 0x1000];
        twin.kick(&mut ram, &words).unwrap();
        assert_eq!(twin.raster().fill_color(), 0xADF3_ADF3);
    }

    #[test]
    fn raw_fill_word_is_kept_without_a_fill_color() {
        let (mut twin, mut ram) = make_twin();
        let words = [
            cmd(rdp::SET_FILL_COLOR, 0),
            0x1234_5678,
            cmd(rdp::SET_COLOR_IMAGE, rdp::image_word0(TexFormat::RGBA16, 8)),
            0x1000,
        ];
        twin.kick(&mut ram, &words).unwrap();
        assert_eq!(twin.raster().fill_color(), 0x1234_5678);
    }

    #[test]
    fn unknown_command_reports_its_location() {
        let (mut twin, mut ram) = make_twin();
        let err = twin.kick(&mut ram, &[0, 0, 0x1000_0000]).unwrap_err();
        assert!(matches!(err, TwinError::UnknownCommand { header: 0x10, at: 2 }), "got {err:?}");

        ram.write_u32(0x1000, 0);
        ram.write_u32(0x1004, 0x1000_0000);
        let err = twin.kick(&mut ram, &[(u32::from(queue::CALL) << 24) | 0x1000]).unwrap_err();
        assert!(matches!(err, TwinError::UnknownCommand { header: 0x10, at: 0x1004 }), "got {err:?}");
    }

    #[test]
    fn call_depth_is_limited() {
        let (mut twin, mut ram) = make_twin();
        // A stream that calls itself.
        ram.write_u32(0x1000, (u32::from(queue::CALL) << 24) | 0x1000);
        let err = twin.kick(&mut ram, &[(u32::from(queue::CALL) << 24) | 0x1000]).unwrap_err();
        assert!(matches!(err, TwinError::CallDepth(MAX_CALL_DEPTH)));
    }

    #[test]
    fn flip_fixup_asserts_in_copy_mode() {
        let (mut twin, mut ram) = make_twin();
        let copy = modes::split(modes::SOM_CYCLE_COPY);
        let words = [
            cmd(rdp::SET_OTHER_MODES_EX, copy.0),
            copy.1,
            cmd(rdp::TEXTURE_RECTANGLE_FLIP_EX, rdp::xy(16, 16)),
            0,
            0,
            0x0400_0400,
        ];
        let err = twin.kick(&mut ram, &words).unwrap_err();
        assert!(matches!(err, TwinError::Assert { code: asserts::FLIP_COPY, .. }));
    }
}
