use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use keywrite::backends::{open_keyboard, resolve_backend, Backend};
use keywrite::keysym::{LogicalKey, NamedKey};
use keywrite::model::Script;
use keywrite::session::{Keyboard, SessionOptions, X11Session};
use keywrite::sim::SimDisplay;
use keywrite::typing::{play_script, press_chord, type_text_until, Pacing, TypingReport};
use keywrite::util::sleep_interruptible;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendArg {
    Auto,
    X11,
    Windows,
    Sim,
}

impl BackendArg {
    fn to_library(self) -> Backend {
        match self {
            BackendArg::Auto => Backend::Auto,
            BackendArg::X11 => Backend::X11,
            BackendArg::Windows => Backend::Windows,
            BackendArg::Sim => Backend::Sim,
        }
    }
}

#[derive(Debug, Args, Clone)]
struct SessionArgs {
    /// Keyboard backend.
    ///
    /// - auto: choose a backend based on the runtime environment
    /// - x11: X11 (XTEST, or focus-window events without it)
    /// - windows: SendInput
    /// - sim: in-memory display; prints what would have been typed
    #[arg(long, value_enum, default_value_t = BackendArg::Auto)]
    backend: BackendArg,

    /// Countdown seconds before typing starts
    #[arg(long, default_value_t = 3)]
    countdown: u64,

    /// X11: send events to the focus window even when XTEST is available
    #[arg(long)]
    focus_events: bool,

    /// X11: route every key through keycode allocation instead of the fixed US table
    #[arg(long)]
    no_static_table: bool,
}

impl SessionArgs {
    fn options(&self) -> SessionOptions {
        SessionOptions {
            force_focus_events: self.focus_events,
            static_table: !self.no_static_table,
        }
    }
}

#[derive(Debug, Args, Clone)]
struct PacingArgs {
    /// Pause after each character, in milliseconds
    #[arg(long, default_value_t = 30)]
    delay_ms: u64,

    /// Standard deviation of random jitter added to the pause
    #[arg(long, default_value_t = 0)]
    jitter_ms: u64,

    /// RNG seed for reproducible jitter
    #[arg(long)]
    seed: Option<u64>,

    /// Skip non-ASCII characters instead of registering temporary keycodes
    #[arg(long)]
    ascii_only: bool,
}

impl PacingArgs {
    fn to_library(&self) -> Pacing {
        Pacing {
            delay_ms: self.delay_ms,
            jitter_ms: self.jitter_ms,
            seed: self.seed,
            ascii_only: self.ascii_only,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "keywrite")]
#[command(about = "Type text and key chords into the focused window", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Type text into the focused window
    Type {
        /// Text to type
        #[arg(long, conflicts_with = "input", required_unless_present = "input")]
        text: Option<String>,

        /// Input text file, or '-' for stdin
        #[arg(long, value_name = "PATH")]
        input: Option<PathBuf>,

        #[command(flatten)]
        pacing: PacingArgs,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Press a key combination, e.g. `chord ctrl shift t`
    Chord {
        /// Keys in press order; the last one is tapped while the others are held
        #[arg(required = true, value_name = "KEY")]
        keys: Vec<String>,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Play a JSON typing script
    Script {
        /// Script file (JSON)
        #[arg(long, value_name = "PATH")]
        path: PathBuf,

        #[command(flatten)]
        pacing: PacingArgs,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// List key names accepted by `chord` and scripts
    Keys,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == std::ffi::OsStr::new("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }

    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn install_stop_flag() -> Result<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::SeqCst);
        })
        .context("failed to install Ctrl+C handler")?;
    }
    Ok(stop)
}

fn countdown(stop: &AtomicBool, secs: u64) -> Result<()> {
    if secs == 0 {
        return Ok(());
    }
    eprintln!("Focus the target window. Starting in {secs}s...");
    for remaining in (1..=secs).rev() {
        if stop.load(Ordering::SeqCst) {
            return Err(anyhow!("aborted"));
        }
        eprintln!("{remaining}...");
        if !sleep_interruptible(stop, 1000) {
            return Err(anyhow!("aborted"));
        }
    }
    Ok(())
}

/// Open a session per `args`, run `op`, and close the session whatever `op` returned.
fn with_keyboard<T>(
    args: &SessionArgs,
    stop: &AtomicBool,
    op: impl FnOnce(&mut dyn Keyboard) -> Result<T>,
) -> Result<T> {
    let backend = resolve_backend(args.backend.to_library())?;

    if backend == Backend::Sim {
        let display = SimDisplay::us_qwerty();
        let mut kb = X11Session::open(display.clone(), args.options())?;
        let result = op(&mut kb);
        let closed = kb.close();

        eprintln!("Simulated {} key events:", display.events().len());
        eprintln!("  {}", display.labels().join(" "));
        println!("{}", display.typed_text());

        let value = result?;
        closed?;
        return Ok(value);
    }

    countdown(stop, args.countdown)?;
    let mut kb = open_keyboard(backend, args.options())?;
    let result = op(kb.as_mut());
    let closed = kb.close().context("failed to close keyboard session");
    let value = result?;
    closed?;
    Ok(value)
}

fn print_report(report: &TypingReport) {
    if report.skipped.is_empty() {
        info!(typed = report.typed, "done");
    } else {
        let skipped: String = report.skipped.iter().flat_map(|c| c.escape_debug()).collect();
        info!(typed = report.typed, skipped = %skipped, "done with skipped characters");
    }
}

fn list_keys() {
    for key in NamedKey::all() {
        let aliases = key.aliases();
        let canonical = key.canonical_name();
        let others: Vec<&str> = aliases
            .iter()
            .copied()
            .filter(|alias| *alias != canonical)
            .collect();
        if others.is_empty() {
            println!("{canonical}");
        } else {
            println!("{canonical:<14} {}", others.join(", "));
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Type {
            text,
            input,
            pacing,
            session,
        } => {
            let text = match (text, input) {
                (Some(text), _) => text,
                (None, Some(path)) => read_input(&path)?,
                (None, None) => return Err(anyhow!("either --text or --input is required")),
            };
            let pacing = pacing.to_library();
            pacing.validate()?;

            let stop = install_stop_flag()?;
            let report = with_keyboard(&session, &stop, |kb| {
                type_text_until(kb, &text, &pacing, &stop)
            })?;
            print_report(&report);
            if stop.load(Ordering::SeqCst) {
                return Err(anyhow!("aborted"));
            }
        }
        Command::Chord { keys, session } => {
            let keys = LogicalKey::parse_all(keys.as_slice())?;
            let stop = install_stop_flag()?;
            with_keyboard(&session, &stop, |kb| press_chord(kb, &keys))?;
        }
        Command::Script {
            path,
            pacing,
            session,
        } => {
            let script = Script::load(&path)?;
            let pacing = pacing.to_library();
            pacing.validate()?;

            let stop = install_stop_flag()?;
            let report = with_keyboard(&session, &stop, |kb| {
                play_script(kb, &script, &pacing, &stop)
            })?;
            print_report(&report);
            if stop.load(Ordering::SeqCst) {
                return Err(anyhow!("aborted"));
            }
        }
        Command::Keys => list_keys(),
    }

    Ok(())
}
