use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};

use framecache::{
    AudioBlockRenderer, AudioRenderingParams, Block, BlockList, CacheIdentity, CachePaths,
    CacheScheduler, ChannelLayout, CpuTextureBackend, ExrImageIo, FrameCacheConfig,
    FrameCacheResult, NodeDependency, NodeGraph, NodeId, NodeValue, NodeValueTable, PixelFormat,
    Rational, RenderContext, RenderParams, SAMPLES_KEY, SampleFormat, SchedulerOpts, TEXTURE_KEY,
    TimeRange, WorkerRole,
};

#[derive(Parser, Debug)]
#[command(name = "framecache", version)]
struct Cli {
    /// Log scheduler activity at debug level.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the cache identity of a render configuration.
    Identity(TargetArgs),
    /// Print the cache file path of a timestamp.
    Path(PathArgs),
    /// Render a range with a procedural gradient graph into the cache.
    Warm(WarmArgs),
    /// Mix a range of a synthetic audio track into a raw sample file.
    Mix(MixArgs),
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// JSON settings file; replaces the flags below.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "sequence")]
    name: String,

    /// Cache name generation time, in milliseconds since the epoch.
    #[arg(long, default_value_t = 0)]
    generation_time: i64,

    #[arg(long, default_value_t = 1920)]
    width: u32,

    #[arg(long, default_value_t = 1080)]
    height: u32,

    /// rgba8, rgba16 or rgba32f.
    #[arg(long, default_value = "rgba32f", value_parser = parse_format)]
    format: PixelFormat,

    #[arg(long, default_value_t = 1)]
    divider: u32,

    #[arg(long, default_value = "1/24")]
    timebase: Rational,

    /// Cache root directory.
    #[arg(long)]
    root: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct PathArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Timestamp as `num/den` seconds.
    #[arg(long)]
    time: Rational,
}

#[derive(Args, Debug)]
struct WarmArgs {
    #[command(flatten)]
    target: TargetArgs,

    #[arg(long, default_value = "0")]
    start: Rational,

    #[arg(long, default_value = "1")]
    end: Rational,

    /// Render worker threads; hardware concurrency when unset.
    #[arg(long)]
    threads: Option<usize>,

    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,
}

#[derive(Args, Debug)]
struct MixArgs {
    #[arg(long, default_value = "0")]
    start: Rational,

    #[arg(long, default_value = "4")]
    end: Rational,

    #[arg(long, default_value_t = 48_000)]
    sample_rate: u32,

    /// Output file of interleaved stereo f32 samples.
    #[arg(long)]
    out: PathBuf,
}

fn parse_format(s: &str) -> Result<PixelFormat, String> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| format!("unknown pixel format '{s}'"))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    match cli.cmd {
        Command::Identity(args) => cmd_identity(args),
        Command::Path(args) => cmd_path(args),
        Command::Warm(args) => cmd_warm(args),
        Command::Mix(args) => cmd_mix(args),
    }
}

struct Target {
    cfg: FrameCacheConfig,
    generation_time: i64,
}

impl Target {
    fn identity(&self) -> anyhow::Result<CacheIdentity> {
        CacheIdentity::for_params(&self.cfg.cache_name, self.generation_time, &self.cfg.render)
            .context("caching is disabled for an empty name or zero-sized frames")
    }
}

fn load_target(args: TargetArgs) -> anyhow::Result<Target> {
    let mut cfg = match &args.config {
        Some(path) => FrameCacheConfig::from_json_path(path)?,
        None => {
            let cfg = FrameCacheConfig {
                cache_name: args.name,
                timebase: args.timebase,
                render: RenderParams {
                    width: args.width,
                    height: args.height,
                    format: args.format,
                    divider: args.divider,
                    ..RenderParams::default()
                },
                scheduler: SchedulerOpts::default(),
            };
            cfg.validate()?;
            cfg
        }
    };
    if let Some(root) = args.root {
        cfg.scheduler.cache_root = root;
    }
    Ok(Target {
        cfg,
        generation_time: args.generation_time,
    })
}

fn cmd_identity(args: TargetArgs) -> anyhow::Result<()> {
    let target = load_target(args)?;
    println!("{}", target.identity()?);
    Ok(())
}

fn cmd_path(args: PathArgs) -> anyhow::Result<()> {
    let target = load_target(args.target)?;
    let paths = CachePaths::new(target.cfg.scheduler.cache_root.clone());
    let path = paths.frame_path(&target.identity()?, args.time)?;
    println!("{}", path.display());
    Ok(())
}

fn cmd_warm(args: WarmArgs) -> anyhow::Result<()> {
    let mut target = load_target(args.target)?;
    if args.threads.is_some() {
        target.cfg.scheduler.render_threads = args.threads;
    }
    let cfg = target.cfg;

    let input = NodeId(1);
    let mut scheduler = CacheScheduler::new(
        cfg.scheduler.clone(),
        Arc::new(GradientGraph {
            timebase: cfg.timebase,
        }),
        Arc::new(CpuTextureBackend),
        Arc::new(ExrImageIo),
    );
    scheduler.set_parameters(cfg.render);
    scheduler.set_cache_name_at(&cfg.cache_name, target.generation_time);
    scheduler.set_timebase(cfg.timebase)?;
    scheduler.set_input(Some(input));
    scheduler.invalidate_cache(args.start, args.end)?;

    if !scheduler.run_until_idle(Duration::from_secs(args.timeout_secs)) {
        anyhow::bail!("cache warm-up timed out after {}s", args.timeout_secs);
    }

    let stats = scheduler.stats();
    let id = target_identity(&scheduler)?;
    eprintln!(
        "rendered {} frames, wrote {}, removed {} into {}",
        stats.frames_rendered,
        stats.frames_written,
        stats.frames_removed,
        scheduler.paths().identity_dir(&id).display()
    );
    if stats.write_failures > 0 {
        anyhow::bail!("{} frames failed to write", stats.write_failures);
    }
    Ok(())
}

fn target_identity(scheduler: &CacheScheduler) -> anyhow::Result<CacheIdentity> {
    scheduler
        .cache_identity()
        .cloned()
        .context("scheduler has no cache identity")
}

fn cmd_mix(args: MixArgs) -> anyhow::Result<()> {
    let params =
        AudioRenderingParams::new(args.sample_rate, ChannelLayout::Stereo, SampleFormat::F32)?;
    let range = TimeRange::new(args.start, args.end)?;

    let second = |s: i64| Rational::from_int(s);
    let track = BlockList::new(vec![
        Block::new(NodeId(220), TimeRange::new(second(0), second(2))?),
        Block::new(NodeId(330), TimeRange::new(second(2), second(3))?)
            .with_media(TimeRange::new(second(0), second(2))?),
        Block::new(NodeId(440), TimeRange::new(second(3), second(4))?).reversed(true),
    ]);

    let renderer = AudioBlockRenderer::new(params, Arc::new(ToneGraph { params }));
    let samples = renderer.render(&track, range)?;

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(&args.out, &samples)
        .with_context(|| format!("write samples '{}'", args.out.display()))?;

    eprintln!("wrote {} bytes to {}", samples.len(), args.out.display());
    Ok(())
}

/// Horizontal/vertical gradient whose blue channel follows the frame index.
struct GradientGraph {
    timebase: Rational,
}

impl NodeGraph for GradientGraph {
    fn evaluate(
        &self,
        ctx: &RenderContext,
        dep: &NodeDependency,
    ) -> FrameCacheResult<NodeValueTable> {
        ctx.check_cancelled()?;
        let tex = ctx.create_texture()?;
        let (w, h) = (tex.width(), tex.height());
        let frame = dep.time().floor_div(self.timebase)?;
        let blue = (frame.rem_euclid(24) as f32) / 23.0;

        let mut pixels = Vec::with_capacity(tex.byte_len());
        for y in 0..h {
            for x in 0..w {
                let rgba = [x as f32 / w as f32, y as f32 / h as f32, blue, 1.0];
                push_pixel(&mut pixels, tex.format(), rgba);
            }
        }
        tex.upload(&pixels)?;

        if let Some(next) = self.prefetch_after(ctx, dep) {
            ctx.request_sibling(next);
        }

        let mut table = NodeValueTable::new();
        table.insert(TEXTURE_KEY, NodeValue::Texture(tex));
        Ok(table)
    }
}

impl GradientGraph {
    /// Only the master worker's renders warm the next frame; prefetches never chain.
    fn prefetch_after(&self, ctx: &RenderContext, dep: &NodeDependency) -> Option<NodeDependency> {
        matches!(ctx.role(), WorkerRole::Render { index: 0 })
            .then(|| NodeDependency::at(dep.node, dep.time() + self.timebase))
    }
}

fn push_pixel(out: &mut Vec<u8>, format: PixelFormat, rgba: [f32; 4]) {
    for c in rgba {
        let c = c.clamp(0.0, 1.0);
        match format {
            PixelFormat::Rgba8 => out.push((c * 255.0).round() as u8),
            PixelFormat::Rgba16 => {
                out.extend_from_slice(&((c * 65535.0).round() as u16).to_ne_bytes())
            }
            PixelFormat::Rgba32F => out.extend_from_slice(&c.to_ne_bytes()),
        }
    }
}

/// Stereo sine tone whose frequency in Hz is the node id.
struct ToneGraph {
    params: AudioRenderingParams,
}

impl NodeGraph for ToneGraph {
    fn evaluate(
        &self,
        _ctx: &RenderContext,
        dep: &NodeDependency,
    ) -> FrameCacheResult<NodeValueTable> {
        let first = self.params.time_to_samples(dep.range.start);
        let count = self.params.time_to_samples(dep.range.end).saturating_sub(first);
        let rate = f64::from(self.params.sample_rate);
        let freq = dep.node.0 as f64;

        let mut samples = Vec::with_capacity(self.params.samples_to_bytes(count));
        for n in first..first + count {
            let v = (std::f64::consts::TAU * freq * n as f64 / rate).sin() as f32 * 0.25;
            samples.extend_from_slice(&v.to_ne_bytes());
            samples.extend_from_slice(&v.to_ne_bytes());
        }

        let mut table = NodeValueTable::new();
        table.insert(SAMPLES_KEY, NodeValue::Samples(samples));
        Ok(table)
    }
}
