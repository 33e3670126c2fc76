use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use sortlast::{
    BroadcastOpts, Communicator as _, CompositeContext, Compositor, Destination, Image, LocalGroup,
    broadcast_value, scene::Scene,
};

#[derive(Parser, Debug)]
#[command(name = "sortlast", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rasterize a box scene on in-process ranks, composite it, and write a PNG.
    Composite(CompositeArgs),
}

#[derive(Parser, Debug)]
struct CompositeArgs {
    /// Input scene JSON.
    #[arg(long)]
    scene: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Number of ranks to run.
    #[arg(long, default_value_t = 4)]
    ranks: usize,

    /// Override the scene's chunk size (pixels per merge chunk).
    #[arg(long)]
    chunk_pixels: Option<usize>,

    /// Destination rank, or `all`. Defaults to the scene's setting, else rank 0.
    #[arg(long, value_parser = parse_destination)]
    destination: Option<Destination>,

    /// Deliver the composited image to every rank.
    #[arg(long)]
    all_reduce: bool,

    /// Keep the composited depth buffer (logged as a depth range; PNG holds color only).
    #[arg(long)]
    keep_depth: bool,

    /// Seconds a waiting rank spins before it starts sleeping between polls.
    #[arg(long, default_value_t = 5.0)]
    spin_secs: f64,

    /// Sleep between polls in nanoseconds (`0` uses a plain blocking broadcast).
    #[arg(long, default_value_t = 50_000_000)]
    sleep_nanos: u64,
}

fn parse_destination(s: &str) -> Result<Destination, String> {
    if s.eq_ignore_ascii_case("all") {
        return Ok(Destination::All);
    }
    s.parse::<usize>()
        .map(Destination::Rank)
        .map_err(|_| format!("expected a rank number or `all`, got '{s}'"))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Composite(args) => cmd_composite(args),
    }
}

fn read_scene(path: &Path) -> anyhow::Result<Scene> {
    let f = File::open(path).with_context(|| format!("open scene '{}'", path.display()))?;
    let scene: Scene =
        serde_json::from_reader(BufReader::new(f)).with_context(|| "parse scene JSON")?;
    Ok(scene)
}

fn prepare_scene(args: &CompositeArgs) -> anyhow::Result<Scene> {
    let mut scene = read_scene(&args.scene)?;
    if let Some(n) = args.chunk_pixels {
        scene.compositor.chunk_pixels = n;
    }
    if let Some(d) = args.destination {
        scene.compositor.destination = Some(d);
    }
    scene.compositor.destination.get_or_insert(Destination::Rank(0));
    scene.compositor.use_all_reduce |= args.all_reduce;
    scene.compositor.retain_depth |= args.keep_depth;
    scene.validate()?;
    scene.check_ranks(args.ranks)?;
    Ok(scene)
}

fn cmd_composite(args: CompositeArgs) -> anyhow::Result<()> {
    let bcast = BroadcastOpts {
        spin_before_sleep_secs: args.spin_secs,
        sleep_nanos: args.sleep_nanos,
    };

    let outputs = LocalGroup::run(args.ranks, |comm| -> anyhow::Result<Option<Image>> {
        // Rank 0 owns the input and distributes it; everyone else learns the scene from it.
        // A failed load is still broadcast, as `None`, so no rank waits on a scene that never
        // comes.
        let (prepared, shared) = if comm.rank() == 0 {
            let prepared = prepare_scene(&args);
            let shared = prepared.as_ref().ok().cloned();
            (Some(prepared), Some(shared))
        } else {
            (None, None)
        };
        let received: Option<Scene> = broadcast_value(&comm, shared.as_ref(), 0, &bcast)?;
        if let Some(Err(err)) = prepared {
            return Err(err);
        }
        let scene = received.context("rank 0 could not load the scene")?;

        let ctx = CompositeContext::new(&comm);
        let compositor = Compositor::new(&ctx, scene.compositor.clone())?;
        let partials = scene.rasterize(comm.rank());
        Ok(compositor.composite(&partials)?)
    })?;

    let mut composited = None;
    for (rank, out) in outputs.into_iter().enumerate() {
        let out = out.with_context(|| format!("rank {rank} failed"))?;
        if composited.is_none() {
            composited = out;
        }
    }
    let composited = composited.context("no rank produced a composited image")?;
    if let Some(depth) = &composited.depth {
        let (near, far) = depth
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &d| (lo.min(d), hi.max(d)));
        tracing::info!(near, far, "composited depth range");
    }

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    composited
        .to_rgb_image()?
        .save_with_format(&args.out, image::ImageFormat::Png)
        .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}
