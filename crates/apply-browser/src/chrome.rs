//! Chrome binary discovery.
//!
//! `CHROME_PATH` wins; otherwise known install locations are checked in
//! order.

use std::path::{Path, PathBuf};

/// Known Chrome/Chromium binary locations, in search priority order.
const KNOWN_PATHS: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

/// Find a Chrome or Chromium binary.
///
/// Search order: the `CHROME_PATH` environment variable, then known system
/// paths. Returns `None` if nothing executable is found.
#[must_use]
pub fn find_chrome() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("CHROME_PATH") {
        let path = PathBuf::from(&env_path);
        if is_executable(&path) {
            return Some(path);
        }
        tracing::debug!(path = %env_path, "CHROME_PATH set but not executable, falling through");
    }

    for candidate in KNOWN_PATHS {
        let path = PathBuf::from(candidate);
        if is_executable(&path) {
            tracing::debug!(path = %candidate, "found Chrome binary");
            return Some(path);
        }
    }

    None
}

/// The ordered list of candidate paths (excluding the env var).
#[must_use]
pub fn search_paths() -> Vec<PathBuf> {
    KNOWN_PATHS.iter().map(PathBuf::from).collect()
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt as _;
    path.is_file()
        && path
            .metadata()
            .map(|m| m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
