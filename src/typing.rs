//! Typing on top of a [`Keyboard`] session: text, chords and scripts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{ensure, Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use tracing::{debug, info, warn};

use crate::backends::{open_keyboard, Backend};
use crate::keysym::LogicalKey;
use crate::model::{Script, Step, SCRIPT_VERSION};
use crate::session::{Keyboard, SessionOptions};
use crate::util::sleep_interruptible;

/// Timing and filtering for typed text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pacing {
    /// Pause after each character.
    pub delay_ms: u64,
    /// Standard deviation of a normal jitter added to `delay_ms`.
    pub jitter_ms: u64,
    /// Seed for reproducible jitter.
    pub seed: Option<u64>,
    /// Skip anything outside ASCII instead of registering it.
    pub ascii_only: bool,
}

const MAX_DELAY_MS: u64 = 60_000;

impl Pacing {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.delay_ms <= MAX_DELAY_MS,
            "delay_ms must be <= {MAX_DELAY_MS}"
        );
        ensure!(
            self.jitter_ms <= self.delay_ms,
            "jitter_ms must be <= delay_ms"
        );
        Ok(())
    }
}

/// Per-character pause generator.
struct Delays {
    base_ms: u64,
    jitter: Option<Normal<f64>>,
    rng: StdRng,
}

impl Delays {
    fn new(pacing: &Pacing) -> Result<Self> {
        pacing.validate()?;
        let jitter = if pacing.jitter_ms > 0 {
            let normal = Normal::new(0.0, pacing.jitter_ms as f64)
                .context("invalid jitter distribution")?;
            Some(normal)
        } else {
            None
        };
        let rng = match pacing.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            base_ms: pacing.delay_ms,
            jitter,
            rng,
        })
    }

    fn next_ms(&mut self) -> u64 {
        let Some(normal) = &self.jitter else {
            return self.base_ms;
        };
        let offset = normal.sample(&mut self.rng);
        let limit = (self.base_ms * 2) as f64;
        (self.base_ms as f64 + offset).clamp(0.0, limit).round() as u64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypingReport {
    pub typed: usize,
    /// Characters left out: control characters with no key, or non-ASCII
    /// under `ascii_only`.
    pub skipped: Vec<char>,
}

impl TypingReport {
    fn merge(&mut self, other: TypingReport) {
        self.typed += other.typed;
        self.skipped.extend(other.skipped);
    }
}

/// Type `text` one character at a time.
pub fn type_text(kb: &mut dyn Keyboard, text: &str, pacing: &Pacing) -> Result<TypingReport> {
    type_text_until(kb, text, pacing, &AtomicBool::new(false))
}

/// [`type_text`], checking `stop` between characters.
pub fn type_text_until(
    kb: &mut dyn Keyboard,
    text: &str,
    pacing: &Pacing,
    stop: &AtomicBool,
) -> Result<TypingReport> {
    let mut delays = Delays::new(pacing)?;
    let mut report = TypingReport::default();

    for c in text.chars() {
        if stop.load(Ordering::SeqCst) {
            info!(typed = report.typed, "typing interrupted");
            break;
        }

        if pacing.ascii_only && !c.is_ascii() {
            warn!(character = %c.escape_debug(), "skipping non-ASCII character");
            report.skipped.push(c);
            continue;
        }

        let key = LogicalKey::Char(c);
        match kb.press_with(&key, true) {
            Ok(()) => {}
            Err(err) if err.is_resolution_error() => {
                warn!(character = %c.escape_debug(), error = %err, "skipping character");
                report.skipped.push(c);
                continue;
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to type {:?}", c));
            }
        }
        kb.release(&key)
            .with_context(|| format!("failed to release {:?}", c))?;
        report.typed += 1;

        let pause = delays.next_ms();
        if pause > 0 {
            sleep_interruptible(stop, pause);
        }
    }

    debug!(typed = report.typed, skipped = report.skipped.len(), "text typed");
    Ok(report)
}

/// Hold every key but the last, tap the last, then release the held keys in
/// reverse order.
pub fn press_chord(kb: &mut dyn Keyboard, keys: &[LogicalKey]) -> Result<()> {
    let Some((last, held)) = keys.split_last() else {
        return Ok(());
    };

    for key in held {
        kb.press(key).with_context(|| format!("failed to press {key}"))?;
    }
    kb.press(last).with_context(|| format!("failed to press {last}"))?;
    kb.release(last)
        .with_context(|| format!("failed to release {last}"))?;
    for key in held.iter().rev() {
        kb.release(key)
            .with_context(|| format!("failed to release {key}"))?;
    }

    debug!(keys = keys.len(), "chord pressed");
    Ok(())
}

/// Play a script's steps in order.
pub fn play_script(
    kb: &mut dyn Keyboard,
    script: &Script,
    pacing: &Pacing,
    stop: &AtomicBool,
) -> Result<TypingReport> {
    ensure!(
        script.version == SCRIPT_VERSION,
        "unsupported script version {} (expected {SCRIPT_VERSION})",
        script.version
    );

    let mut report = TypingReport::default();
    for (index, step) in script.steps.iter().enumerate() {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        match step {
            Step::Text { text } => {
                let typed = type_text_until(kb, text, pacing, stop)
                    .with_context(|| format!("script step {index}"))?;
                report.merge(typed);
            }
            Step::Chord { keys } => {
                let keys = LogicalKey::parse_all(keys.as_slice())
                    .with_context(|| format!("script step {index}: invalid chord"))?;
                press_chord(kb, &keys).with_context(|| format!("script step {index}"))?;
            }
            Step::Wait { ms } => {
                sleep_interruptible(stop, *ms);
            }
        }
    }
    Ok(report)
}

fn close_keyboard(kb: &mut dyn Keyboard) -> Result<()> {
    kb.close().context("failed to close keyboard session")
}

/// Open a session on `backend`, type `text`, close.
pub fn write_on(
    backend: Backend,
    options: SessionOptions,
    text: &str,
    pacing: &Pacing,
    stop: &AtomicBool,
) -> Result<TypingReport> {
    let mut kb = open_keyboard(backend, options)?;
    let typed = type_text_until(kb.as_mut(), text, pacing, stop);
    let closed = close_keyboard(kb.as_mut());
    let report = typed?;
    closed?;
    Ok(report)
}

/// Type `text` through the platform keyboard.
pub fn keyboard_write(text: &str, pacing: &Pacing) -> Result<TypingReport> {
    write_on(
        Backend::Auto,
        SessionOptions::default(),
        text,
        pacing,
        &AtomicBool::new(false),
    )
}

/// Press a key combination such as `["ctrl", "c"]` through the platform keyboard.
pub fn keyboard_group<S: AsRef<str>>(keys: &[S]) -> Result<()> {
    chord_on(Backend::Auto, SessionOptions::default(), keys)
}

pub fn chord_on<S: AsRef<str>>(backend: Backend, options: SessionOptions, keys: &[S]) -> Result<()> {
    if keys.is_empty() {
        return Ok(());
    }
    let keys = LogicalKey::parse_all(keys)?;
    let mut kb = open_keyboard(backend, options)?;
    let pressed = press_chord(kb.as_mut(), &keys);
    let closed = close_keyboard(kb.as_mut());
    pressed?;
    closed
}

/// Type `text` on a background thread. Setting `stop` ends it after the
/// current character.
pub fn spawn_typing(
    backend: Backend,
    options: SessionOptions,
    text: String,
    pacing: Pacing,
    stop: Arc<AtomicBool>,
) -> Result<JoinHandle<Result<TypingReport>>> {
    pacing.validate()?;
    std::thread::Builder::new()
        .name("keywrite-typing".to_string())
        .spawn(move || write_on(backend, options, &text, &pacing, &stop))
        .context("failed to spawn typing thread")
}
