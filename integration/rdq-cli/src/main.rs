use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use rdq_cli::{Depth, RenderOptions, RenderOutput, Scene};
use rdq_core::QueueConfig;

#[derive(Parser)]
#[command(name = "rdq")]
#[command(about = "Render demo scenes through the rdq command queue and its digital twin", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Suppress progress output (only show errors)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a scene to a PNG file
    Render {
        #[command(flatten)]
        scene: SceneArgs,

        /// Output PNG path
        #[arg(short, long, default_value = "rdq.png")]
        out: PathBuf,
    },
    /// Render a scene and print queue, block and rasterizer counters
    Stats {
        #[command(flatten)]
        scene: SceneArgs,
    },
}

#[derive(Args)]
struct SceneArgs {
    /// Scene to draw
    #[arg(value_enum, default_value = "tiles")]
    scene: Scene,

    /// Record the scene into a block and replay it
    #[arg(long)]
    block: bool,

    /// Times the scene is drawn (or the block replayed)
    #[arg(long, default_value = "1")]
    replays: u32,

    /// Colour image format
    #[arg(long, value_enum, default_value = "rgba16")]
    depth: Depth,

    #[arg(long, default_value = "320")]
    width: u16,

    #[arg(long, default_value = "240")]
    height: u16,

    /// Words in the first chunk of each block
    #[arg(long, default_value = "64")]
    block_min_words: u32,
}

impl SceneArgs {
    fn options(&self) -> RenderOptions {
        RenderOptions {
            scene: self.scene,
            width: self.width,
            height: self.height,
            depth: self.depth,
            block: self.block,
            replays: self.replays,
            config: QueueConfig {
                block_min_words: self.block_min_words,
                ..QueueConfig::default()
            },
        }
    }
}

fn print_stats(out: &RenderOutput) {
    let q = &out.queue;
    println!("queue:   {} kicks, {} words, {} dynamic, {} static commands", q.kicks, q.words_kicked, q.dynamic_commands, q.static_commands);
    println!("blocks:  {} recorded, {} runs", q.blocks_recorded, q.block_runs);
    if let (Some(b), Some((stream, rdp))) = (&out.block, out.block_chunks) {
        println!(
            "block:   {} native, {} interpreted, {} hand-offs ({} coalesced), {stream}+{rdp} chunks",
            b.rdp_commands, b.stream_commands, b.handoffs, b.coalesced
        );
    }
    let t = &out.twin;
    println!("engine:  {} commands, {} fixups, {} hand-offs, {} calls", t.commands, t.fixups, t.handoffs, t.calls);
    let r = &out.raster;
    println!("raster:  {} submissions, {} commands, {} syncs, {} pixels", r.submissions, r.commands, r.syncs, r.pixels);
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging (suppressed if --quiet)
    if !cli.quiet {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();
    }

    let result = match cli.command {
        Commands::Render { scene, out } => rdq_cli::render(&scene.options()).and_then(|r| {
            r.image.save(&out)?;
            if !cli.quiet {
                eprintln!("Success: wrote {}x{} image to {}", r.image.width(), r.image.height(), out.display());
            }
            Ok(())
        }),
        Commands::Stats { scene } => rdq_cli::render(&scene.options()).map(|r| print_stats(&r)),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
