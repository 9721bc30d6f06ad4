// src/config.rs
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PROXY_URL: &str = "http://localhost:9296";
const DEFAULT_PROXY_PASSWORD: &str = "glace";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_GENERATOR_DIR: &str = "/app/generator";
const DEFAULT_CONTAINER_IMAGE: &str = "iv-org/youtube-trusted-session-generator";

/// Process-wide settings, read once at startup.
///
/// Resolved from environment variables:
/// - `LAVALINK_URL`: proxy base URL, `http://` is prepended when no scheme is given
/// - `LAVALINK_PASSWORD`: shared secret sent as the `Authorization` header
/// - `USE_DOCKER`: `true` enables the container fallback (default: true)
/// - `PORT`: HTTP listening port (default: 8000)
/// - `GENERATOR_DIR`, `GENERATOR_INTERPRETER`, `GENERATOR_TIMEOUT_SECS`: local generator
/// - `DISPLAY_SERVER_BIN`, `DISPLAY_NUMBER`, `DISPLAY_SETTLE_MS`: headless display
/// - `CONTAINER_RUNTIME`, `CONTAINER_IMAGE`, `CONTAINER_TIMEOUT_SECS`: container generator
/// - `PROXY_TIMEOUT_SECS`: timeout of the push to the proxy (default: 10)
/// - `REFRESH_COALESCE`: let concurrent refreshes share one generation (default: true)
#[derive(Debug, Clone)]
pub struct Config {
    pub proxy_url: String,
    pub proxy_password: String,
    pub use_docker: bool,
    pub port: u16,
    pub proxy_timeout: Duration,
    pub coalesce: bool,
    pub local: LocalConfig,
    pub container: ContainerConfig,
}

#[derive(Debug, Clone)]
pub struct LocalConfig {
    pub generator_dir: PathBuf,
    pub interpreter: String,
    pub timeout: Duration,
    pub display_server: String,
    pub display: String,
    pub display_settle: Duration,
}

#[derive(Debug, Clone)]
pub struct ContainerConfig {
    pub runtime: String,
    pub image: String,
    pub timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());
        let number = |key: &str, default: u64| {
            var(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
        };
        let flag = |key: &str, default: bool| {
            var(key).map(|v| v.to_lowercase() == "true").unwrap_or(default)
        };

        Self {
            proxy_url: normalize_url(&string("LAVALINK_URL", DEFAULT_PROXY_URL)),
            proxy_password: string("LAVALINK_PASSWORD", DEFAULT_PROXY_PASSWORD),
            use_docker: flag("USE_DOCKER", true),
            port: var("PORT")
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(DEFAULT_PORT),
            proxy_timeout: Duration::from_secs(number("PROXY_TIMEOUT_SECS", 10)),
            coalesce: flag("REFRESH_COALESCE", true),
            local: LocalConfig {
                generator_dir: PathBuf::from(string("GENERATOR_DIR", DEFAULT_GENERATOR_DIR)),
                interpreter: string("GENERATOR_INTERPRETER", "python3"),
                timeout: Duration::from_secs(number("GENERATOR_TIMEOUT_SECS", 120)),
                display_server: string("DISPLAY_SERVER_BIN", "Xvfb"),
                display: string("DISPLAY_NUMBER", ":99"),
                display_settle: Duration::from_millis(number("DISPLAY_SETTLE_MS", 1000)),
            },
            container: ContainerConfig {
                runtime: string("CONTAINER_RUNTIME", "docker"),
                image: string("CONTAINER_IMAGE", DEFAULT_CONTAINER_IMAGE),
                timeout: Duration::from_secs(number("CONTAINER_TIMEOUT_SECS", 60)),
            },
        }
    }
}

/// Adds `http://` when the URL has no scheme and drops trailing slashes,
/// so `{url}/youtube` never doubles up.
pub fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();
    let url = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };
    url.trim_end_matches('/').to_string()
}
