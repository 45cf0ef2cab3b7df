use std::ffi::OsString;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, OnceLock};

use keywrite::backends::{open_keyboard, resolve_backend, Backend};
use keywrite::session::SessionOptions;
use keywrite::typing::{chord_on, spawn_typing, write_on, Pacing};

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

struct EnvRestore {
    wayland_display: Option<OsString>,
    display: Option<OsString>,
}

impl EnvRestore {
    fn snapshot() -> Self {
        Self {
            wayland_display: std::env::var_os("WAYLAND_DISPLAY"),
            display: std::env::var_os("DISPLAY"),
        }
    }
}

impl Drop for EnvRestore {
    fn drop(&mut self) {
        // SAFETY: every env mutation in this file happens under `env_lock()`.
        match &self.wayland_display {
            Some(v) => unsafe { std::env::set_var("WAYLAND_DISPLAY", v) },
            None => unsafe { std::env::remove_var("WAYLAND_DISPLAY") },
        }
        match &self.display {
            Some(v) => unsafe { std::env::set_var("DISPLAY", v) },
            None => unsafe { std::env::remove_var("DISPLAY") },
        }
    }
}

fn unset(name: &str) {
    // SAFETY: callers hold the global test mutex from `env_lock()`.
    unsafe { std::env::remove_var(name) };
}

fn set(name: &str, value: &str) {
    // SAFETY: callers hold the global test mutex from `env_lock()`.
    unsafe { std::env::set_var(name, value) };
}

#[cfg(not(windows))]
#[test]
fn auto_picks_x11_when_display_is_set() {
    let _guard = env_lock().lock().unwrap();
    let _restore = EnvRestore::snapshot();

    set("DISPLAY", ":0");
    set("WAYLAND_DISPLAY", "wayland-1");

    #[cfg(feature = "x11")]
    {
        let resolved = resolve_backend(Backend::Auto).expect("should resolve");
        assert_eq!(resolved, Backend::X11);
    }

    #[cfg(not(feature = "x11"))]
    {
        let err = resolve_backend(Backend::Auto).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("disabled"), "got: {msg}");
        assert!(msg.contains("DISPLAY is set"), "got: {msg}");
    }
}

#[cfg(not(windows))]
#[test]
fn auto_without_any_display_explains_itself() {
    let _guard = env_lock().lock().unwrap();
    let _restore = EnvRestore::snapshot();

    unset("DISPLAY");
    unset("WAYLAND_DISPLAY");

    let err = resolve_backend(Backend::Auto).unwrap_err();
    let msg = format!("{err:#}");
    assert!(
        msg.contains("No supported keyboard backend detected"),
        "expected missing-backend wording, got: {msg}"
    );
    assert!(msg.contains("--backend sim"), "got: {msg}");
}

#[cfg(not(windows))]
#[test]
fn wayland_without_xwayland_is_rejected() {
    let _guard = env_lock().lock().unwrap();
    let _restore = EnvRestore::snapshot();

    unset("DISPLAY");
    set("WAYLAND_DISPLAY", "wayland-1");

    let err = resolve_backend(Backend::Auto).unwrap_err();
    let msg = format!("{err:#}");
    assert!(msg.contains("WAYLAND_DISPLAY is set"), "got: {msg}");
    assert!(msg.contains("Xwayland"), "got: {msg}");
}

#[test]
fn explicit_x11_is_rejected_or_accepted() {
    let _guard = env_lock().lock().unwrap();
    let _restore = EnvRestore::snapshot();

    unset("DISPLAY");

    #[cfg(feature = "x11")]
    {
        let resolved = resolve_backend(Backend::X11).expect("should resolve");
        assert_eq!(resolved, Backend::X11);
    }

    #[cfg(not(feature = "x11"))]
    {
        let err = resolve_backend(Backend::X11).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("X11"));
        assert!(msg.contains("disabled"));
    }
}

#[test]
fn sim_backend_types_without_a_display() {
    let _guard = env_lock().lock().unwrap();
    let _restore = EnvRestore::snapshot();

    unset("DISPLAY");
    unset("WAYLAND_DISPLAY");

    let kb = open_keyboard(Backend::Sim, SessionOptions::default()).expect("sim always opens");
    assert!(!kb.is_closed());
    drop(kb);

    let report = write_on(
        Backend::Sim,
        SessionOptions::default(),
        "hi 中",
        &Pacing::default(),
        &AtomicBool::new(false),
    )
    .unwrap();
    assert_eq!(report.typed, 4);
    assert!(report.skipped.is_empty());

    chord_on(Backend::Sim, SessionOptions::default(), &["ctrl", "alt", "t"]).unwrap();
    chord_on::<&str>(Backend::Sim, SessionOptions::default(), &[]).unwrap();
}

#[test]
fn bad_chord_names_fail_before_opening_a_session() {
    let err = chord_on(Backend::Sim, SessionOptions::default(), &["ctrl", "nosuchkey"]).unwrap_err();
    assert!(format!("{err:#}").contains("nosuchkey"));
}

#[test]
fn spawned_typing_reports_from_the_worker() {
    let handle = spawn_typing(
        Backend::Sim,
        SessionOptions::default(),
        "héllo\u{7}".to_string(),
        Pacing::default(),
        Arc::new(AtomicBool::new(false)),
    )
    .unwrap();

    let report = handle.join().expect("typing thread panicked").unwrap();
    assert_eq!(report.typed, 5);
    assert_eq!(report.skipped, vec!['\u{7}']);
}

#[test]
fn spawned_typing_with_stop_already_set_types_nothing() {
    let handle = spawn_typing(
        Backend::Sim,
        SessionOptions::default(),
        "never typed".to_string(),
        Pacing::default(),
        Arc::new(AtomicBool::new(true)),
    )
    .unwrap();

    let report = handle.join().expect("typing thread panicked").unwrap();
    assert_eq!(report.typed, 0);
    assert!(report.skipped.is_empty());
}

#[test]
fn spawn_typing_rejects_bad_pacing_up_front() {
    let pacing = Pacing {
        delay_ms: 5,
        jitter_ms: 10,
        ..Pacing::default()
    };
    let err = spawn_typing(
        Backend::Sim,
        SessionOptions::default(),
        "x".to_string(),
        pacing,
        Arc::new(AtomicBool::new(false)),
    )
    .unwrap_err();
    assert!(format!("{err:#}").contains("jitter_ms"));
}
