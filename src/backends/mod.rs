#[cfg(windows)]
pub mod windows;

#[cfg(feature = "x11")]
pub mod x11;

use anyhow::{anyhow, Result};
use tracing::debug;

use crate::session::{Keyboard, SessionOptions, X11Session};
use crate::sim::SimDisplay;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Auto,
    X11,
    Windows,
    /// In-memory display; nothing reaches a real server.
    Sim,
}

fn env_is_set(name: &str) -> bool {
    std::env::var_os(name)
        .map(|v| !v.is_empty())
        .unwrap_or(false)
}

fn auto_backend() -> Backend {
    if cfg!(windows) {
        return Backend::Windows;
    }

    // Wayland sessions usually run Xwayland, which takes XTEST input for X clients.
    if env_is_set("DISPLAY") {
        return Backend::X11;
    }

    Backend::Auto
}

fn backend_unavailable_message() -> String {
    let xdg_session_type = std::env::var("XDG_SESSION_TYPE").unwrap_or_else(|_| "".to_string());

    let mut parts = Vec::new();

    if env_is_set("WAYLAND_DISPLAY") {
        parts.push("WAYLAND_DISPLAY is set".to_string());
    }
    if env_is_set("DISPLAY") {
        parts.push("DISPLAY is set".to_string());
    }
    if !xdg_session_type.is_empty() {
        parts.push(format!("XDG_SESSION_TYPE={xdg_session_type}"));
    }

    if parts.is_empty() {
        "No display session detected (expected DISPLAY for X11).".to_string()
    } else {
        format!("Detected environment: {}", parts.join(", "))
    }
}

fn require_supported_backend(selected: Backend, resolved: Backend) -> Result<()> {
    let how = match selected {
        Backend::Auto => "detected",
        _ => "requested",
    };

    match resolved {
        Backend::X11 => {
            if cfg!(feature = "x11") {
                Ok(())
            } else {
                Err(anyhow!(
                    "X11 backend {how} but is disabled in this build. (Rebuild with `--features x11`.) {details}",
                    details = backend_unavailable_message()
                ))
            }
        }
        Backend::Windows => {
            if cfg!(windows) {
                Ok(())
            } else {
                Err(anyhow!("Windows backend {how} but this is not a Windows build"))
            }
        }
        Backend::Sim => Ok(()),
        Backend::Auto => {
            let hint = if env_is_set("WAYLAND_DISPLAY") {
                "Wayland without Xwayland is not supported; start Xwayland or pass --backend sim."
            } else {
                "Try `--backend x11` with DISPLAY set, or `--backend sim` for a dry run."
            };
            Err(anyhow!(
                "No supported keyboard backend detected. {details}\n{hint}",
                details = backend_unavailable_message(),
            ))
        }
    }
}

pub fn resolve_backend(requested: Backend) -> Result<Backend> {
    let resolved = match requested {
        Backend::Auto => auto_backend(),
        other => other,
    };

    require_supported_backend(requested, resolved)?;
    Ok(resolved)
}

/// Open a keyboard session on the requested backend.
pub fn open_keyboard(requested: Backend, options: SessionOptions) -> Result<Box<dyn Keyboard + Send>> {
    let backend = resolve_backend(requested)?;
    debug!(?backend, "opening keyboard");

    match backend {
        Backend::X11 => {
            #[cfg(feature = "x11")]
            {
                let display = x11::XConnection::connect(None)?;
                Ok(Box::new(X11Session::open(display, options)?))
            }

            #[cfg(not(feature = "x11"))]
            {
                let _ = options;
                Err(anyhow!(
                    "X11 backend is disabled in this build (rebuild with `--features x11`)."
                ))
            }
        }
        Backend::Windows => {
            #[cfg(windows)]
            {
                Ok(Box::new(crate::session::direct::DirectSession::new(
                    windows::SendInputInjector,
                )))
            }

            #[cfg(not(windows))]
            {
                Err(anyhow!("Windows backend is only available on Windows"))
            }
        }
        Backend::Sim => Ok(Box::new(X11Session::open(SimDisplay::us_qwerty(), options)?)),
        Backend::Auto => Err(anyhow!("no backend resolved")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_backend_always_resolves() {
        assert_eq!(resolve_backend(Backend::Sim).unwrap(), Backend::Sim);
        let kb = open_keyboard(Backend::Sim, SessionOptions::default()).unwrap();
        assert!(!kb.is_closed());
    }

    #[cfg(not(windows))]
    #[test]
    fn windows_backend_is_rejected_elsewhere() {
        let err = resolve_backend(Backend::Windows).unwrap_err();
        assert!(format!("{err:#}").contains("not a Windows build"));
    }
}
