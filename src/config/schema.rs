//! Configuration schema for mapmerge
//!
//! Configuration is stored at `~/.config/mapmerge/config.toml`

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// HTTP server settings
    pub server: ServerConfig,

    /// Where uploads and derived artifacts live
    pub storage: StorageConfig,

    /// Derived artifact lifetime
    pub artifacts: ArtifactConfig,

    /// Merge engine settings
    pub merge: MergeConfig,

    /// Render engine settings
    pub render: RenderConfig,
}

impl Config {
    /// Check rules serde cannot express
    pub fn validate(&self) -> Result<(), String> {
        if !matches!(self.general.log_format.as_str(), "text" | "json") {
            return Err(format!(
                "general.log_format must be \"text\" or \"json\", got \"{}\"",
                self.general.log_format
            ));
        }
        if self.server.max_upload_mb == 0 {
            return Err("server.max_upload_mb must be greater than 0".to_string());
        }
        if self.artifacts.lifetime_secs == 0 {
            return Err("artifacts.lifetime_secs must be greater than 0".to_string());
        }
        if !MergeConfig::is_valid_table(&self.merge.table) {
            return Err(format!(
                "merge.table '{}' may only contain letters, digits and '_'",
                self.merge.table
            ));
        }
        if self.render.program.trim().is_empty() {
            return Err("render.program must not be empty".to_string());
        }
        if self.render.world_file.is_empty() || self.render.world_file.contains(['/', '\\']) {
            return Err(format!(
                "render.world_file '{}' must be a plain file name",
                self.render.world_file
            ));
        }
        Ok(())
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on
    pub bind: SocketAddr,

    /// Maximum accepted upload size in MiB
    pub max_upload_mb: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            max_upload_mb: 50,
        }
    }
}

impl ServerConfig {
    /// Upload limit in bytes
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb as usize * 1024 * 1024
    }
}

/// Storage layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the hash-addressed upload store
    pub uploads_dir: PathBuf,

    /// Directory for merged stores and rendered images
    pub artifacts_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_dir: PathBuf::from("map_uploads"),
            artifacts_dir: PathBuf::from("tmp"),
        }
    }
}

/// Derived artifact settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Seconds a merged store or render stays on disk after creation
    pub lifetime_secs: u64,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self { lifetime_secs: 600 }
    }
}

impl ArtifactConfig {
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.lifetime_secs)
    }
}

/// Merge engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Table whose rows are upserted from later inputs
    pub table: String,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            table: "blocks".to_string(),
        }
    }
}

impl MergeConfig {
    /// Table names are interpolated into SQL; only `[A-Za-z0-9_]+` passes
    pub fn is_valid_table(name: &str) -> bool {
        !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
}

/// Render engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Renderer executable
    pub program: String,

    /// Value passed to `--backend`
    pub backend: String,

    /// File name the renderer expects inside the world directory
    pub world_file: String,

    /// Kill the renderer after this many seconds (0 = no deadline)
    pub timeout_secs: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            program: "minetestmapper".to_string(),
            backend: "sqlite3".to_string(),
            world_file: "map.sqlite".to_string(),
            timeout_secs: 120,
        }
    }
}

impl RenderConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}
