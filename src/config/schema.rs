//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for the rendering proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, public origin).
    pub listener: ListenerConfig,

    /// Timeout configuration for inbound requests.
    pub timeouts: TimeoutConfig,

    /// Direct (non-rendering) fetch settings.
    pub fetcher: FetcherConfig,

    /// Rendering engine launch settings.
    pub render: RenderConfig,

    /// Page load strategy chain and settling.
    pub navigation: NavigationConfig,

    /// URL classification data.
    pub classifier: ClassifierConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Origin the proxy is publicly reachable at (e.g., "https://proxy.example").
    /// When unset, it is derived from the inbound `Host` header.
    pub public_origin: Option<String>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            public_origin: None,
        }
    }
}

/// Timeout configuration for inbound requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    /// Must cover a cold launch, the whole navigation chain and settling.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 240 }
    }
}

/// Direct fetcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Upstream request timeout in seconds.
    pub timeout_secs: u64,

    /// Freshness window handed to clients for proxied sub-resources.
    pub cache_max_age_secs: u64,

    /// User agent presented to upstream servers.
    pub user_agent: String,

    /// Accept-Language presented to upstream servers.
    pub accept_language: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            cache_max_age_secs: 3600,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
        }
    }
}

/// Browser-like user agent shared by the fetcher and rendered pages.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Execution environment the rendering engine is launched in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentProfile {
    /// Developer machine with a desktop browser install.
    #[default]
    Local,
    /// Container image with a distro browser package and a small /dev/shm.
    Container,
    /// Single-process serverless sandbox.
    Serverless,
}

impl std::str::FromStr for DeploymentProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "container" | "docker" => Ok(Self::Container),
            "serverless" | "lambda" => Ok(Self::Serverless),
            other => Err(format!("unknown deployment profile '{}'", other)),
        }
    }
}

/// Rendering engine launch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Deployment profile selecting the install search order and flag set.
    pub profile: DeploymentProfile,

    /// Explicit executable path; skips the search when set.
    pub executable: Option<PathBuf>,

    /// Run without a visible window.
    pub headless: bool,

    /// Extra command line flags appended after the built-in set.
    pub extra_args: Vec<String>,

    /// Viewport width in CSS pixels.
    pub viewport_width: u32,

    /// Viewport height in CSS pixels.
    pub viewport_height: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            profile: DeploymentProfile::Local,
            executable: None,
            headless: true,
            extra_args: Vec::new(),
            viewport_width: 1366,
            viewport_height: 768,
        }
    }
}

/// Named page load completion condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitConditionKind {
    /// No more than 0 requests in flight for the idle window.
    NetworkIdle0,
    /// No more than 2 requests in flight for the idle window.
    NetworkIdle2,
    /// The `load` lifecycle event fired.
    Load,
    /// Initial DOM construction finished.
    DomContentLoaded,
}

/// One step of the navigation fallback chain.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyConfig {
    pub condition: WaitConditionKind,
    pub timeout_secs: u64,
}

/// Navigation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Ordered fallback chain, strictest first.
    pub strategies: Vec<StrategyConfig>,

    /// How long in-flight activity must stay under the threshold for the
    /// network-idle conditions, in milliseconds.
    pub idle_window_ms: u64,

    /// Delay after commit letting deferred content run, in milliseconds.
    pub settle_ms: u64,

    /// Scroll to the bottom and back to trigger lazy loading.
    pub scroll: bool,

    /// Delay after the scroll pass, in milliseconds.
    pub post_scroll_settle_ms: u64,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            strategies: vec![
                StrategyConfig { condition: WaitConditionKind::NetworkIdle0, timeout_secs: 45 },
                StrategyConfig { condition: WaitConditionKind::NetworkIdle2, timeout_secs: 45 },
                StrategyConfig { condition: WaitConditionKind::Load, timeout_secs: 30 },
                StrategyConfig { condition: WaitConditionKind::DomContentLoaded, timeout_secs: 20 },
            ],
            idle_window_ms: 500,
            settle_ms: 2500,
            scroll: true,
            post_scroll_settle_ms: 1000,
        }
    }
}

/// URL classification data.
///
/// The lists were tuned against real sites and are expected to drift;
/// they are data, not logic.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// File extensions (without dot) always treated as sub-resources.
    pub static_extensions: Vec<String>,

    /// Regexes over the path for extension-less sub-resources
    /// (dynamic script endpoints, bundler chunks).
    pub resource_path_patterns: Vec<String>,

    /// Ad/analytics hosts. Matches the host itself and its subdomains.
    pub tracking_hosts: Vec<String>,

    /// Regexes over the full URL identifying tracking pixels and beacons.
    pub tracking_path_patterns: Vec<String>,

    /// Regexes over the path of extension-less URLs that look like API calls.
    pub api_path_patterns: Vec<String>,

    /// Hosts whose requests are aborted while a page is being rendered.
    pub navigation_denylist: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        fn owned(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }

        Self {
            static_extensions: owned(&[
                // scripts and styles
                "js", "mjs", "cjs", "css", "map", "wasm",
                // images
                "png", "jpg", "jpeg", "gif", "webp", "avif", "svg", "ico", "bmp",
                // fonts
                "woff", "woff2", "ttf", "otf", "eot",
                // media
                "mp4", "webm", "mp3", "wav", "ogg", "m4a", "m3u8",
                // data
                "json", "xml", "txt", "csv", "pdf",
            ]),
            resource_path_patterns: owned(&[
                r"/_next/static/",
                r"/_nuxt/",
                r"/static/chunks/",
                r"/chunks?/",
                r"/gtag/js$",
                r"/gtm$",
                r"/recaptcha/api2?/",
                r"/cdn-cgi/",
                r"/webpack",
            ]),
            tracking_hosts: owned(&[
                "google-analytics.com",
                "googletagmanager.com",
                "doubleclick.net",
                "googlesyndication.com",
                "googleadservices.com",
                "adservice.google.com",
                "connect.facebook.net",
                "analytics.tiktok.com",
                "bat.bing.com",
                "scorecardresearch.com",
                "hotjar.com",
                "segment.io",
            ]),
            tracking_path_patterns: owned(&[
                r"facebook\.com/tr",
                r"/pixel(\.gif|\.png)?([/?]|$)",
                r"/collect\?",
                r"/beacon([/?.]|$)",
                r"/__utm\.gif",
                r"/1x1\.(gif|png)",
                r"/impression([/?]|$)",
            ]),
            api_path_patterns: owned(&[
                r"(^|/)api(/|$)",
                r"/graphql$",
                r"/_next/data/",
                r"/wp-json/",
                r"/ajax/",
                r"/rest/",
            ]),
            navigation_denylist: owned(&[
                "doubleclick.net",
                "googlesyndication.com",
                "googleadservices.com",
                "adservice.google.com",
                "google-analytics.com",
                "scorecardresearch.com",
            ]),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum inbound body size in bytes (forwarded API bodies).
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}
