//! Engine configuration and the file loaders for it.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use miette::{Result, miette};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Timing policies of a document session.
///
/// Every window may be set to zero, which makes the corresponding step fire on
/// the next turn of the session loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingPolicy {
    /// Delay after emitting a change before the sender applies the normalized
    /// text to its own view.
    #[serde(rename = "echo_suppression_ms", with = "duration_ms")]
    pub echo_suppression_window: Duration,
    /// Coalescing window for text mutations before remote cursors are remapped.
    #[serde(rename = "mutation_coalesce_ms", with = "duration_ms")]
    pub mutation_coalesce_window: Duration,
    /// Input inactivity before a pending change is saved.
    #[serde(rename = "save_debounce_ms", with = "duration_ms")]
    pub save_debounce_window: Duration,
    /// Input inactivity before a pending change is broadcast to the room.
    #[serde(rename = "emit_debounce_ms", with = "duration_ms")]
    pub emit_debounce_window: Duration,
    /// Delay before a failed offline reconciliation is attempted again.
    #[serde(rename = "reconcile_retry_ms", with = "duration_ms")]
    pub reconcile_retry_window: Duration,
}

impl Default for TimingPolicy {
    fn default() -> Self {
        Self {
            echo_suppression_window: Duration::from_millis(100),
            mutation_coalesce_window: Duration::from_millis(50),
            save_debounce_window: Duration::from_secs(2),
            emit_debounce_window: Duration::from_millis(300),
            reconcile_retry_window: Duration::from_secs(5),
        }
    }
}

impl TimingPolicy {
    /// All windows set to zero. Intended for tests driving a session by hand.
    pub fn immediate() -> Self {
        Self {
            echo_suppression_window: Duration::ZERO,
            mutation_coalesce_window: Duration::ZERO,
            save_debounce_window: Duration::ZERO,
            emit_debounce_window: Duration::ZERO,
            reconcile_retry_window: Duration::ZERO,
        }
    }
}

/// Configuration of the synchronization engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub timing: TimingPolicy,
    /// Remote cursors not refreshed within this window are dropped.
    #[serde(rename = "stale_cursor_after_ms", with = "duration_ms")]
    pub stale_cursor_after: Duration,
    /// Appended to the title of a document forked on reconnect conflict.
    pub fork_title_suffix: SmolStr,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            timing: TimingPolicy::default(),
            stale_cursor_after: Duration::from_secs(30),
            fork_title_suffix: SmolStr::new_static(" (offline copy)"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Name shown next to this client's cursor on other screens.
    pub username: SmolStr,
    /// Engine settings.
    #[serde(default)]
    pub sync: SyncConfig,
}

impl Config {
    /// Read the configuration through `loader`.
    pub async fn load(loader: &impl Loader) -> Result<Self> {
        loader
            .load()
            .await
            .map_err(|e| miette!("could not load quire configuration: {e}"))
    }

    /// Write the configuration through `saver`.
    pub async fn save(&self, saver: &impl Saver) -> Result<()> {
        saver
            .save(self)
            .await
            .map_err(|e| miette!("could not save quire configuration: {e}"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            username: SmolStr::new_static("anonymous"),
            sync: SyncConfig::default(),
        }
    }
}

/// Error type of [`Loader`] and [`Saver`] implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Source of a [`Config`].
pub trait Loader {
    fn load(&self) -> impl Future<Output = std::result::Result<Config, BoxError>> + Send;
}

/// Destination of a [`Config`].
pub trait Saver {
    fn save(&self, config: &Config) -> impl Future<Output = std::result::Result<(), BoxError>> + Send;
}

/// On-disk formats understood by [`FileStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    /// Pick the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }
}

/// Config file on disk, `.json` or `.toml`.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn format(&self) -> std::result::Result<ConfigFormat, BoxError> {
        ConfigFormat::from_path(&self.path).ok_or_else(|| {
            miette!(
                "{} is neither a .json nor a .toml file",
                self.path.display()
            )
            .into()
        })
    }
}

impl Loader for FileStore {
    async fn load(&self) -> std::result::Result<Config, BoxError> {
        let format = self.format()?;
        let raw = std::fs::read_to_string(&self.path)?;
        let config = match format {
            ConfigFormat::Json => serde_json::from_str(&raw)?,
            ConfigFormat::Toml => toml::from_str(&raw)?,
        };
        tracing::debug!(path = %self.path.display(), "loaded configuration");
        Ok(config)
    }
}

impl Saver for FileStore {
    async fn save(&self, config: &Config) -> std::result::Result<(), BoxError> {
        let raw = match self.format()? {
            ConfigFormat::Json => serde_json::to_string_pretty(config)?,
            ConfigFormat::Toml => toml::to_string_pretty(config)?,
        };
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

/// Serialize a [`Duration`] as whole milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
