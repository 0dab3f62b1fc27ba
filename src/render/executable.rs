//! Engine executable discovery and launch flags per deployment profile.

use std::path::{Path, PathBuf};

use crate::config::{DeploymentProfile, RenderConfig};
use crate::render::engine::{LaunchOptions, RenderError};

/// Binary names looked up on `PATH` after the known locations.
const PATH_CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
    "headless-shell",
];

/// Install locations probed, in order, for a profile.
pub fn known_locations(profile: DeploymentProfile) -> &'static [&'static str] {
    match profile {
        DeploymentProfile::Local => &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ],
        DeploymentProfile::Container => &[
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/headless-shell/headless-shell",
        ],
        DeploymentProfile::Serverless => &[
            "/opt/chromium",
            "/opt/chrome/chrome",
            "/opt/headless-chromium",
            "/tmp/chromium",
        ],
    }
}

/// Resolve the executable: explicit override, then known locations, then `PATH`.
pub fn find_executable(config: &RenderConfig) -> Result<PathBuf, RenderError> {
    resolve_with(
        config.executable.as_deref(),
        config.profile,
        |path| path.is_file(),
        |name| which::which(name).ok(),
    )
}

fn resolve_with(
    explicit: Option<&Path>,
    profile: DeploymentProfile,
    exists: impl Fn(&Path) -> bool,
    lookup: impl Fn(&str) -> Option<PathBuf>,
) -> Result<PathBuf, RenderError> {
    if let Some(path) = explicit {
        // An override is never second-guessed by the search.
        return if exists(path) {
            Ok(path.to_path_buf())
        } else {
            Err(RenderError::ExecutableNotFound(path.display().to_string()))
        };
    }

    let locations = known_locations(profile);
    if let Some(found) = locations.iter().map(Path::new).find(|p| exists(p)) {
        return Ok(found.to_path_buf());
    }

    if let Some(found) = PATH_CANDIDATES.iter().find_map(|name| lookup(name)) {
        return Ok(found);
    }

    let mut searched: Vec<&str> = locations.to_vec();
    searched.extend_from_slice(PATH_CANDIDATES);
    Err(RenderError::ExecutableNotFound(searched.join(", ")))
}

/// Flags for a profile, followed by `extra`.
///
/// Same-origin isolation is always disabled: rewritten pages load everything
/// from the proxy origin and the engine must not block that.
pub fn launch_args(profile: DeploymentProfile, extra: &[String]) -> Vec<String> {
    let mut args: Vec<String> = [
        "--disable-web-security",
        "--disable-features=IsolateOrigins,site-per-process",
        "--disable-site-isolation-trials",
        "--no-first-run",
        "--no-default-browser-check",
        "--hide-scrollbars",
        "--mute-audio",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    if matches!(profile, DeploymentProfile::Container | DeploymentProfile::Serverless) {
        args.extend(
            ["--no-sandbox", "--disable-dev-shm-usage", "--disable-gpu"]
                .iter()
                .map(|s| s.to_string()),
        );
    }
    if profile == DeploymentProfile::Serverless {
        args.extend(["--single-process", "--no-zygote"].iter().map(|s| s.to_string()));
    }

    args.extend(extra.iter().cloned());
    args
}

/// Full launch options for the configured profile.
pub fn launch_options(config: &RenderConfig, user_agent: &str) -> Result<LaunchOptions, RenderError> {
    Ok(LaunchOptions {
        executable: find_executable(config)?,
        args: launch_args(config.profile, &config.extra_args),
        headless: config.headless,
        viewport_width: config.viewport_width,
        viewport_height: config.viewport_height,
        user_agent: user_agent.to_string(),
    })
}
