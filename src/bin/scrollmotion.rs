use std::{
    io::{BufWriter, Write as _},
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "scrollmotion", version)]
struct Cli {
    /// Log debug events to stderr.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse and validate a scene.
    Validate(ValidateArgs),
    /// Drive a scene through a linear scroll and print every flushed update as JSON lines.
    Simulate(SimulateArgs),
}

#[derive(Parser, Debug)]
struct ValidateArgs {
    /// Input scene JSON.
    #[arg(long = "in")]
    in_path: PathBuf,
}

#[derive(Parser, Debug)]
struct SimulateArgs {
    /// Input scene JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Number of frames to simulate.
    #[arg(long, default_value_t = 120)]
    frames: u64,

    /// Fixed tick rate.
    #[arg(long, default_value_t = 60.0)]
    fps: f64,

    /// Scroll offset at the first frame.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    from: f64,

    /// Scroll offset at the last frame.
    #[arg(long, allow_negative_numbers = true)]
    to: f64,

    /// Keep ticking after the scroll ends until every spring has settled.
    #[arg(long)]
    settle: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .init();

    match cli.cmd {
        Command::Validate(args) => cmd_validate(args),
        Command::Simulate(args) => cmd_simulate(args),
    }
}

fn read_scene_json(path: &Path) -> anyhow::Result<scrollmotion::SceneConfig> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("open scene '{}'", path.display()))?;
    let scene = scrollmotion::SceneConfig::from_json_str(&s)
        .with_context(|| format!("load scene '{}'", path.display()))?;
    Ok(scene)
}

fn cmd_validate(args: ValidateArgs) -> anyhow::Result<()> {
    let scene = read_scene_json(&args.in_path)?;
    let tracks: usize = scene.regions.iter().map(|r| r.animation.tracks.len()).sum();
    eprintln!(
        "ok: {} regions, {} tracks, viewport {}",
        scene.regions.len(),
        tracks,
        scene.viewport
    );
    Ok(())
}

struct JsonLines<W: std::io::Write> {
    out: W,
}

impl<W: std::io::Write> scrollmotion::RenderBinding for JsonLines<W> {
    fn apply(
        &mut self,
        update: &scrollmotion::PropertyUpdate<'_>,
    ) -> scrollmotion::MotionResult<()> {
        serde_json::to_writer(&mut self.out, update)?;
        self.out
            .write_all(b"\n")
            .map_err(|e| scrollmotion::MotionError::binding(e.to_string()))
    }

    fn end_frame(&mut self, _frame: scrollmotion::FrameId) -> scrollmotion::MotionResult<()> {
        self.out
            .flush()
            .map_err(|e| scrollmotion::MotionError::binding(e.to_string()))
    }
}

fn cmd_simulate(args: SimulateArgs) -> anyhow::Result<()> {
    if !(args.fps.is_finite() && args.fps > 0.0) {
        anyhow::bail!("--fps must be finite and > 0");
    }
    if args.frames == 0 {
        anyhow::bail!("--frames must be > 0");
    }
    let scene = read_scene_json(&args.in_path)?;

    let mut sched = scrollmotion::FrameScheduler::default();
    scene
        .mount_all(&mut sched)
        .with_context(|| "mount scene regions")?;

    let dt = 1.0 / args.fps;
    let mut sink = JsonLines {
        out: BufWriter::new(std::io::stdout().lock()),
    };
    let last = (args.frames - 1).max(1) as f64;
    let mut flushed = 0usize;
    for i in 0..args.frames {
        let scroll = args.from + (args.to - args.from) * (i as f64 / last);
        sched.queue_scroll(scroll);
        let stats = sched
            .tick(dt, &mut sink)
            .with_context(|| format!("tick {i}"))?;
        flushed += stats.updates_flushed;
    }

    if args.settle {
        // At most one minute of simulated time.
        let limit = (args.fps * 60.0) as u64;
        let mut extra = 0;
        while !sched.is_idle() && extra < limit {
            flushed += sched.tick(dt, &mut sink)?.updates_flushed;
            extra += 1;
        }
    }

    eprintln!("simulated {} frames, {flushed} updates", sched.frame().0);
    Ok(())
}
