// src/generator.rs
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::{Config, ContainerConfig, LocalConfig};
use crate::parser;
use crate::types::{GenerationError, GenerationOutcome};

const SCRIPT_CANDIDATES: [&str; 2] = ["main.py", "generate.py"];
const OUTPUT_PREVIEW_CHARS: usize = 500;

/// A way of obtaining a fresh credential pair.
///
/// Implementations never panic on process errors; every failure is reported
/// through the returned outcome.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    fn name(&self) -> &'static str;
    async fn attempt(&self) -> GenerationOutcome;
}

/// Runs the generator script under a headless display.
pub struct LocalScriptSource {
    config: LocalConfig,
}

impl LocalScriptSource {
    pub fn new(config: LocalConfig) -> Self {
        Self { config }
    }

    async fn start_display(&self) {
        let spawned = Command::new(&self.config.display_server)
            .args([self.config.display.as_str(), "-screen", "0", "1024x768x24"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match spawned {
            Ok(_) => debug!(display = %self.config.display, "display server launched"),
            Err(e) => debug!(error = %e, "display server not started, continuing"),
        }
        tokio::time::sleep(self.config.display_settle).await;
    }
}

#[async_trait]
impl CredentialSource for LocalScriptSource {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn attempt(&self) -> GenerationOutcome {
        let script = find_generator(&self.config.generator_dir)?;
        self.start_display().await;

        info!(script = %script.display(), "running generator script");
        let child = Command::new(&self.config.interpreter)
            // The script runs from inside the generator dir, so pass its bare name.
            .arg(script.file_name().unwrap_or(script.as_os_str()))
            .current_dir(&self.config.generator_dir)
            .env("DISPLAY", &self.config.display)
            .env("HEADLESS", "true")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                GenerationError::ProcessFailure(format!(
                    "failed to launch {}: {e}",
                    self.config.interpreter
                ))
            })?;
        let output = wait_bounded(child, self.config.timeout).await?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        parse_output(&text)
    }
}

/// Runs the generator image through a container runtime.
pub struct ContainerSource {
    config: ContainerConfig,
}

impl ContainerSource {
    pub fn new(config: ContainerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl CredentialSource for ContainerSource {
    fn name(&self) -> &'static str {
        "container"
    }

    async fn attempt(&self) -> GenerationOutcome {
        let runtime = &self.config.runtime;
        info!(runtime = %runtime, image = %self.config.image, "running generator container");
        let child = Command::new(runtime)
            .args(["run", "--rm", self.config.image.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    GenerationError::RuntimeUnavailable(format!("{runtime}: {e}"))
                }
                _ => GenerationError::ProcessFailure(format!("failed to launch {runtime}: {e}")),
            })?;
        let output = wait_bounded(child, self.config.timeout).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GenerationError::ProcessFailure(format!(
                "{runtime} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        parse_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Looks for `main.py`, then `generate.py`, then any `*.py` in `dir`.
pub fn find_generator(dir: &Path) -> Result<PathBuf, GenerationError> {
    for name in SCRIPT_CANDIDATES {
        let path = dir.join(name);
        if path.exists() {
            return Ok(path);
        }
    }
    let pattern = dir.join("*.py");
    glob::glob(&pattern.to_string_lossy())
        .ok()
        .and_then(|mut paths| paths.find_map(Result::ok))
        .ok_or_else(|| GenerationError::GeneratorNotFound {
            dir: dir.display().to_string(),
        })
}

async fn wait_bounded(child: Child, timeout: Duration) -> Result<Output, GenerationError> {
    // Dropping the child on timeout kills it (kill_on_drop).
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(GenerationError::ProcessFailure(e.to_string())),
        Err(_) => Err(GenerationError::Timeout { after: timeout }),
    }
}

fn parse_output(text: &str) -> GenerationOutcome {
    parser::parse(text).ok_or_else(|| {
        let preview: String = text.chars().take(OUTPUT_PREVIEW_CHARS).collect();
        error!(output = %preview, "failed to parse token from generator output");
        GenerationError::ParseFailure
    })
}

#[derive(Default)]
struct SingleFlight {
    completed: AtomicU64,
    last: Mutex<Option<GenerationOutcome>>,
}

/// Tries credential sources in order and returns the first success.
///
/// A source reporting `RuntimeUnavailable` triggers one more attempt of the
/// primary source instead of counting as a failure of its own. With
/// coalescing on, callers that queued behind a running generation get its
/// outcome instead of starting another one.
pub struct TokenGenerator {
    sources: Vec<Arc<dyn CredentialSource>>,
    flight: Option<SingleFlight>,
}

impl TokenGenerator {
    pub fn from_config(config: &Config) -> Self {
        Self::with_sources(
            Arc::new(LocalScriptSource::new(config.local.clone())),
            Arc::new(ContainerSource::new(config.container.clone())),
            config.use_docker,
            config.coalesce,
        )
    }

    pub fn with_sources(
        primary: Arc<dyn CredentialSource>,
        container: Arc<dyn CredentialSource>,
        allow_container: bool,
        coalesce: bool,
    ) -> Self {
        let mut sources = vec![primary];
        if allow_container {
            sources.push(container);
        }
        Self {
            sources,
            flight: coalesce.then(SingleFlight::default),
        }
    }

    pub async fn generate(&self) -> GenerationOutcome {
        let Some(flight) = &self.flight else {
            return self.run_sources().await;
        };

        let seen = flight.completed.load(Ordering::Acquire);
        let mut last = flight.last.lock().await;
        if flight.completed.load(Ordering::Acquire) != seen {
            if let Some(outcome) = last.as_ref() {
                debug!("joined a generation that finished while waiting");
                return outcome.clone();
            }
        }

        let outcome = self.run_sources().await;
        *last = Some(outcome.clone());
        flight.completed.fetch_add(1, Ordering::Release);
        outcome
    }

    async fn run_sources(&self) -> GenerationOutcome {
        let Some(primary) = self.sources.first() else {
            return Err(GenerationError::Exhausted);
        };

        let mut last_err = GenerationError::Exhausted;
        for (i, source) in self.sources.iter().enumerate() {
            info!(source = source.name(), "generating credentials");
            let outcome = match source.attempt().await {
                Err(GenerationError::RuntimeUnavailable(reason)) if i > 0 => {
                    info!(source = source.name(), %reason, "source unavailable, retrying {}", primary.name());
                    primary.attempt().await
                }
                outcome => outcome,
            };
            match outcome {
                Ok(pair) => {
                    info!(source = source.name(), "generated new credentials");
                    return Ok(pair);
                }
                Err(e) => {
                    warn!(source = source.name(), error = %e, "credential source failed");
                    last_err = e;
                }
            }
        }

        error!(error = %last_err, "all credential sources failed");
        Err(last_err)
    }
}
