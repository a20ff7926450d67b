//! glitchbox - terminal bytebeat editor
//!
//! Run with: cargo run --features glitch

mod app;
mod midi;
mod ui;

use std::{
    fs::{self, File},
    io::stdout,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result as EyreResult, WrapErr};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
};
use tracing_subscriber::EnvFilter;

use app::App;
use glitchbox::{
    audio::AudioDevice,
    config::Config,
    render::{self, RenderRequest},
    session::{
        persist::{FileSlot, MemorySlot, ShareLink},
        Persistence, Session,
    },
};

#[cfg(feature = "glitch")]
type LinkedEngine = glitchbox::evaluator::glitch::GlitchEngine;
#[cfg(not(feature = "glitch"))]
type LinkedEngine = glitchbox::evaluator::Unlinked;

#[cfg(feature = "glitch")]
fn linked_engine(sample_rate: u32) -> LinkedEngine {
    let seed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    LinkedEngine::new(sample_rate, seed)
}

#[cfg(not(feature = "glitch"))]
fn linked_engine(_sample_rate: u32) -> LinkedEngine {
    LinkedEngine::default()
}

fn main() -> EyreResult<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)
            .wrap_err_with(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load(),
    };

    match cli.command.unwrap_or_default() {
        Commands::Play { link, autoplay } => run_live(&config, link.as_deref(), autoplay),
        Commands::Render {
            expr,
            output,
            duration,
            sample_rate,
        } => run_render(&config, expr, output, duration, sample_rate),
    }
}

fn run_live(config: &Config, link: Option<&str>, autoplay: bool) -> EyreResult<()> {
    let device = AudioDevice::open_default().wrap_err("audio output unavailable")?;
    let sample_rate = device.sample_rate();
    let engine = Arc::new(linked_engine(sample_rate));

    let link = match link {
        Some(link) => ShareLink::parse(link),
        None => ShareLink::new(config.share.base_url.clone()),
    };
    let persistence = match FileSlot::default_path() {
        Some(path) => Persistence::new(FileSlot::open(path), link),
        None => Persistence::new(MemorySlot::default(), link),
    };

    let (mut session, mut playback) = Session::new(engine, persistence, config.render.settings())
        .wrap_err("failed to create live evaluator")?;
    let tap = playback.tap(config.visualizer.tap_capacity);
    let stream = device.start(playback)?;

    session.restore();
    if autoplay {
        session.play();
    }

    let mut terminal = ratatui::init();
    let mouse = execute!(stdout(), EnableMouseCapture);
    let result = App::new(session, tap, config, stream.sample_rate()).run(&mut terminal);
    if mouse.is_ok() {
        let _ = execute!(stdout(), DisableMouseCapture);
    }
    ratatui::restore();

    drop(stream);
    let link = result?;
    println!("{link}");
    Ok(())
}

fn run_render(
    config: &Config,
    expr: String,
    output: Option<PathBuf>,
    duration: Option<f64>,
    sample_rate: Option<u32>,
) -> EyreResult<()> {
    let mut settings = config.render.settings();
    if let Some(secs) = duration {
        settings.duration =
            Duration::try_from_secs_f64(secs).map_err(|err| eyre!("invalid duration: {err}"))?;
    }
    if let Some(rate) = sample_rate {
        settings.sample_rate = rate;
    }
    let output = output.unwrap_or_else(|| config.render.output_path());

    let engine = linked_engine(settings.sample_rate);
    let request = RenderRequest::new(expr, settings.duration, settings.sample_rate);
    let container = render::render(&engine, &request).wrap_err("render failed")?;
    container
        .write_to(&output)
        .wrap_err_with(|| format!("failed to write {}", output.display()))?;

    println!(
        "Rendered {} samples at {} Hz to {}",
        container.sample_count(),
        container.sample_rate(),
        output.display()
    );
    Ok(())
}

/// Logs go to `<data dir>/glitchbox/glitchbox.log`; the terminal belongs to the UI.
fn init_tracing() {
    let Some(dir) = dirs::data_dir().map(|p| p.join("glitchbox")) else {
        return;
    };
    if fs::create_dir_all(&dir).is_err() {
        return;
    }
    let Ok(file) = File::create(dir.join("glitchbox.log")) else {
        return;
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Realtime bytebeat editor and renderer", long_about = None)]
struct Cli {
    /// Config file to use instead of the user config directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Open the live editor (default).
    Play {
        /// Share link to restore the expression from, e.g. "#t*(t>>8)"
        #[arg(short, long)]
        link: Option<String>,
        /// Start playing immediately.
        #[arg(long)]
        autoplay: bool,
    },
    /// Render an expression to a WAV file without opening audio.
    Render {
        /// Expression to render.
        expr: String,
        /// Output path (defaults to the configured save location).
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Length in seconds.
        #[arg(short, long)]
        duration: Option<f64>,
        /// Sample rate in Hz.
        #[arg(short, long)]
        sample_rate: Option<u32>,
    },
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Play {
            link: None,
            autoplay: false,
        }
    }
}
