//! Demo scenes rendered through the command queue and the twin.
//!
//! Each scene is drawn either straight into the live queue or recorded once
//! into a block and replayed, so the two paths can be compared pixel for
//! pixel.

use anyhow::Context;
use clap::ValueEnum;
use glam::Vec2;
use image::RgbaImage;
use rdq_commands::modes::CycleMode;
use rdq_commands::{Color, TexFormat};
use rdq_core::hal::PhysicalMemory;
use rdq_core::{BlockStats, QueueConfig, QueueStats, RdpQueue};
use rdq_twin::{Image, RasterStats, Twin, TwinStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scene {
    /// 4x4 grid of scissored fill rectangles
    Tiles,
    /// Fan of flat-shaded triangles
    Triangles,
    /// Checkerboard texture copied across the screen
    Texture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Depth {
    Rgba16,
    Rgba32,
}

impl Depth {
    pub fn format(self) -> TexFormat {
        match self {
            Depth::Rgba16 => TexFormat::RGBA16,
            Depth::Rgba32 => TexFormat::RGBA32,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub scene: Scene,
    pub width: u16,
    pub height: u16,
    pub depth: Depth,
    /// Record the scene into a block and replay it instead of drawing live.
    pub block: bool,
    pub replays: u32,
    pub config: QueueConfig,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            scene: Scene::Tiles,
            width: 320,
            height: 240,
            depth: Depth::Rgba16,
            block: false,
            replays: 1,
            config: QueueConfig::default(),
        }
    }
}

/// A finished render and the counters collected along the way.
pub struct RenderOutput {
    pub image: RgbaImage,
    pub queue: QueueStats,
    pub twin: TwinStats,
    pub raster: RasterStats,
    pub block: Option<BlockStats>,
    /// Stream and rasterizer chunks of the recorded block.
    pub block_chunks: Option<(usize, usize)>,
}

const TEXTURE_SIZE: u16 = 8;

struct Frame {
    width: u16,
    height: u16,
    /// Texture uploaded for the texture scene.
    texture: u32,
}

/// Render `opts.scene` and read the framebuffer back.
pub fn render(opts: &RenderOptions) -> anyhow::Result<RenderOutput> {
    anyhow::ensure!(opts.width > 0 && opts.height > 0, "empty framebuffer {}x{}", opts.width, opts.height);
    anyhow::ensure!(opts.width <= 1024, "width {} exceeds 1024 pixels", opts.width);

    let mut queue = RdpQueue::new(Twin::new(), opts.config.clone()).context("failed to create queue")?;
    let format = opts.depth.format();
    let stride = format.stride(opts.width.into());
    let fb_bytes = stride * u32::from(opts.height);
    let fb = queue.memory_mut().alloc(fb_bytes, 64)?;
    queue.memory_mut().fill(fb, fb_bytes, 0);
    let texture = upload_checkerboard(&mut queue)?;
    let frame = Frame {
        width: opts.width,
        height: opts.height,
        texture,
    };

    queue.set_color_image(fb, format, opts.width, opts.height, stride)?;

    let mut block_stats = None;
    let mut block_chunks = None;
    if opts.block {
        queue.begin_block()?;
        draw(&mut queue, opts.scene, &frame)?;
        let block = queue.end_block()?;
        block_stats = Some(block.stats());
        block_chunks = Some((block.stream_chunks().len(), block.rdp_chunks().len()));
        for _ in 0..opts.replays {
            queue.run_block(&block)?;
        }
        queue.wait()?;
        queue.free_block(block)?;
    } else {
        for _ in 0..opts.replays {
            draw(&mut queue, opts.scene, &frame)?;
        }
        queue.wait()?;
    }

    let image = Image {
        addr: fb,
        format,
        width: opts.width.into(),
    };
    let rgba = rdq_twin::dump::to_rgba(queue.memory(), &image, opts.height.into())?;
    let twin = queue.coprocessor().stats();
    let raster = queue.coprocessor().raster().stats();
    log::info!(
        "{:?}: {} kicks, {} rasterizer submissions, {} pixels",
        opts.scene,
        queue.stats().kicks,
        raster.submissions,
        raster.pixels
    );

    Ok(RenderOutput {
        image: rgba,
        queue: queue.stats(),
        twin,
        raster,
        block: block_stats,
        block_chunks,
    })
}

fn draw(queue: &mut RdpQueue<Twin>, scene: Scene, frame: &Frame) -> rdq_core::Result<()> {
    match scene {
        Scene::Tiles => draw_tiles(queue, frame),
        Scene::Triangles => draw_triangles(queue, frame),
        Scene::Texture => draw_texture(queue, frame),
    }
}

fn palette(i: u32) -> Color {
    let r = (i * 53) as u8;
    let g = (i * 97 + 40) as u8;
    let b = (i * 31 + 128) as u8;
    Color::rgba32(r, g, b, 0xFF)
}

fn draw_tiles(queue: &mut RdpQueue<Twin>, frame: &Frame) -> rdq_core::Result<()> {
    let (cw, ch) = (frame.width.div_ceil(4), frame.height.div_ceil(4));
    queue.set_cycle_mode(CycleMode::Fill)?;
    for j in 0..4u16 {
        for i in 0..4u16 {
            let (x0, y0) = (i * cw, j * ch);
            queue.set_scissor(x0, y0, (x0 + cw).min(frame.width), (y0 + ch).min(frame.height))?;
            queue.set_fill_color(palette(u32::from(j * 4 + i)))?;
            queue.fill_rectangle(0, 0, frame.width, frame.height)?;
        }
    }
    queue.set_scissor(0, 0, frame.width, frame.height)
}

fn draw_triangles(queue: &mut RdpQueue<Twin>, frame: &Frame) -> rdq_core::Result<()> {
    const SEGMENTS: u32 = 12;
    let center = Vec2::new(f32::from(frame.width), f32::from(frame.height)) / 2.0;
    let radius = center.x.min(center.y) * 0.9;

    queue.set_cycle_mode(CycleMode::One)?;
    for i in 0..SEGMENTS {
        let a0 = i as f32 / SEGMENTS as f32 * std::f32::consts::TAU;
        let a1 = (i + 1) as f32 / SEGMENTS as f32 * std::f32::consts::TAU;
        let p0 = center + Vec2::from_angle(a0) * radius;
        let p1 = center + Vec2::from_angle(a1) * radius;
        queue.set_prim_color(palette(i))?;
        queue.fill_triangle(center, p0, p1)?;
    }
    Ok(())
}

fn draw_texture(queue: &mut RdpQueue<Twin>, frame: &Frame) -> rdq_core::Result<()> {
    let size = f32::from(TEXTURE_SIZE);
    queue.set_cycle_mode(CycleMode::Copy)?;
    queue.set_texture_image(frame.texture, TexFormat::RGBA16, TEXTURE_SIZE)?;
    queue.set_tile(0, TexFormat::RGBA16, 0, TEXTURE_SIZE * 2, 0)?;
    queue.load_tile(0, 0, 0, TEXTURE_SIZE, TEXTURE_SIZE)?;
    for y in (0..frame.height).step_by(TEXTURE_SIZE.into()) {
        for x in (0..frame.width).step_by(TEXTURE_SIZE.into()) {
            let (x0, y0) = (f32::from(x), f32::from(y));
            queue.texture_rectangle(0, x0, y0, x0 + size, y0 + size, 0.0, 0.0, 1.0, 1.0)?;
        }
    }
    Ok(())
}

fn upload_checkerboard(queue: &mut RdpQueue<Twin>) -> rdq_core::Result<u32> {
    let n = u32::from(TEXTURE_SIZE);
    let addr = queue.memory_mut().alloc(n * n * 2, 8)?;
    let light = Color::rgba32(0xF8, 0xF8, 0xF8, 0xFF).to_packed16();
    let dark = Color::rgba32(0x20, 0x40, 0x80, 0xFF).to_packed16();
    for y in 0..n {
        for x in 0..n {
            let texel = if (x / 2 + y / 2) % 2 == 0 { light } else { dark };
            queue.memory_mut().write_u16(addr + (y * n + x) * 2, texel);
        }
    }
    Ok(addr)
}
