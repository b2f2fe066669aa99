use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{info, warn};

use placefield::{
    Error,
    coordinator::{CoordinatorConfig, RenderParameters},
    exec::{Batch, Executor, ExecutorConfig},
    expr::{DEFAULT_EXPRESSION, Expression},
    playback::DEFAULT_PLACE,
    render::{GridRequest, GridSize, MAX_GRID_AXIS, Sampler},
    session::{Session, SessionConfig},
};

/// Prints the decimal digits of f(x, y) as text
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    cmd: Command,

    /// Expression over `x` and `y`
    #[clap(short, long, default_value = DEFAULT_EXPRESSION)]
    expr: String,

    #[clap(flatten)]
    grid: GridSettings,
}

#[derive(Subcommand)]
enum Command {
    /// Render every place once and print them in order
    Render,

    /// Drive an interactive session, printing each frame as playback steps
    Play {
        /// Place to start from
        #[clap(short, long, default_value_t = DEFAULT_PLACE)]
        place: u32,

        /// Number of frames to print
        #[clap(short = 'N', long, default_value_t = 9)]
        frames: usize,

        /// Time between playback steps, in milliseconds
        #[clap(short, long, default_value_t = 250)]
        interval_ms: u64,
    },
}

#[derive(Parser)]
struct GridSettings {
    /// Grid width in characters
    #[clap(long, default_value_t = 64)]
    width: usize,

    /// Grid height in characters
    #[clap(long, default_value_t = 24)]
    height: usize,

    /// Number of places to render
    #[clap(short, long, default_value_t = 9)]
    max_place: u32,

    /// Horizontal pan offset
    #[clap(short, long, default_value_t = 0, allow_hyphen_values = true)]
    x_offset: i64,

    /// Vertical pan offset
    #[clap(short, long, default_value_t = 0, allow_hyphen_values = true)]
    y_offset: i64,

    /// Per-batch deadline, in milliseconds
    #[clap(short, long, default_value_t = 2000)]
    deadline_ms: u64,

    /// Number of threads used to render places within a batch
    #[clap(short, long)]
    threads: Option<NonZeroUsize>,
}

////////////////////////////////////////////////////////////////////////////////

/// Glyphs for digits 0 through 9
const RAMP: &[u8; 10] = b" .:-=+*#%@";

/// Stand-in for the real digit renderer
///
/// Each cell shows the digit of `|f(col + x_offset, row + y_offset)|` at the
/// requested place (1 is the ones digit), drawn from a ten-step ramp.  The
/// real renderer is an external component; this one exists so the demo has
/// something to print.
fn ramp_renderer(s: &Sampler, r: &GridRequest) -> Result<String, Error> {
    let scale = 10f64.powi(r.place.saturating_sub(1).min(308) as i32);
    let cap = r.width.saturating_add(1).saturating_mul(r.height);
    let mut out = String::with_capacity(cap);
    for row in 0..r.height {
        if row > 0 {
            out.push('\n');
        }
        for col in 0..r.width {
            let x = col as f64 + r.x_offset as f64;
            let y = row as f64 + r.y_offset as f64;
            let v = s.sample(x, y)?;
            let c = if v.is_finite() {
                let digit = ((v.abs() / scale).floor() % 10.0) as usize;
                RAMP[digit.min(9)]
            } else {
                b'?'
            };
            out.push(c as char);
        }
    }
    Ok(out)
}

fn print_frame(place: u32, frame: &str) {
    println!("--- place {place} ---");
    println!("{frame}");
}

fn run_render(args: &Args) -> Result<()> {
    let g = &args.grid;
    let config = ExecutorConfig {
        deadline: Duration::from_millis(g.deadline_ms),
        threads: g.threads,
    };
    let exec = Executor::new(config, ramp_renderer);
    let f = Expression::new(&args.expr).compile()?;
    let batch = Batch::new(
        g.max_place,
        GridSize::new(g.width, g.height),
        g.x_offset,
        g.y_offset,
    );

    let start = Instant::now();
    let out = exec.run_batch(f, batch)?;
    info!("Rendered {} place(s) in {:?}", out.len(), start.elapsed());
    for (place, frame) in out.iter() {
        print_frame(place, frame);
    }
    Ok(())
}

fn run_play(
    args: &Args,
    place: u32,
    frames: usize,
    interval_ms: u64,
) -> Result<()> {
    let g = &args.grid;
    let config = SessionConfig {
        coordinator: CoordinatorConfig {
            deadline: Duration::from_millis(g.deadline_ms),
            threads: g.threads,
            ..Default::default()
        },
        params: RenderParameters {
            expression: Expression::new(&args.expr),
            grid: GridSize::new(g.width, g.height),
            max_place: g.max_place,
            x_offset: g.x_offset,
            y_offset: g.y_offset,
            interval: Duration::from_millis(interval_ms),
        },
        place,
        ..Default::default()
    };
    let mut session = Session::new(config, ramp_renderer);

    // Wait for the first frame before starting playback
    while session.frame().is_none() {
        session.poll(Instant::now());
        if let Some(e) = session.error() {
            bail!("{e}");
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    session.play(Instant::now());

    let mut printed = 0;
    let mut last = None;
    while printed < frames {
        session.poll(Instant::now());
        if session.timed_out() {
            warn!("latest batch timed out; showing the previous frames");
        }
        if last != Some(session.place()) {
            if let Some(frame) = session.frame() {
                print_frame(session.place(), frame);
                printed += 1;
            }
            last = Some(session.place());
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    session.pause();
    info!(
        "Printed {printed} frame(s) from {} job(s)",
        session.coordinator().jobs_dispatched()
    );
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .init();

    let args = Args::parse();
    if args.grid.max_place == 0 {
        bail!("max place must be at least 1");
    }
    if args.grid.width > MAX_GRID_AXIS || args.grid.height > MAX_GRID_AXIS {
        bail!("grid dimensions must be at most {MAX_GRID_AXIS}");
    }
    match &args.cmd {
        Command::Render => run_render(&args),
        Command::Play {
            place,
            frames,
            interval_ms,
        } => run_play(&args, *place, *frames, *interval_ms),
    }
}
