//! Render engine: map store to PNG via an external renderer
//!
//! The renderer is spawned with a discrete argument vector, never through
//! a shell, so option values cannot inject commands.

use crate::config::schema::RenderConfig;
use crate::engine::error_tail;
use crate::error::{MapmergeError, MapmergeResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Options passed through to the renderer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderOptions {
    /// Background color, `#rgb` or `#rrggbb`
    pub bg_color: String,
    pub draw_alpha: bool,
    pub draw_origin: bool,
    pub draw_scale: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            bg_color: "#ffffff".to_string(),
            draw_alpha: true,
            draw_origin: false,
            draw_scale: false,
        }
    }
}

impl RenderOptions {
    /// Validate a background color
    pub fn parse_color(value: &str) -> MapmergeResult<String> {
        let digits = value.strip_prefix('#').unwrap_or("");
        let valid = value.starts_with('#')
            && matches!(digits.len(), 3 | 6)
            && digits.chars().all(|c| c.is_ascii_hexdigit());

        if valid {
            Ok(value.to_string())
        } else {
            Err(MapmergeError::InvalidOption {
                name: "bgColor".to_string(),
                reason: format!("'{}' is not a #rgb or #rrggbb color", value),
            })
        }
    }

    /// Coerce a loosely typed flag value
    pub fn parse_flag(name: &str, value: &str) -> MapmergeResult<bool> {
        match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" | "" => Ok(false),
            _ => Err(MapmergeError::InvalidOption {
                name: name.to_string(),
                reason: format!("'{}' is not a boolean", value),
            }),
        }
    }
}

/// Render options as they arrive from a query string
///
/// Every field is optional text; [`RawRenderOptions::into_options`] applies
/// defaults and validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRenderOptions {
    pub bg_color: Option<String>,
    pub draw_alpha: Option<String>,
    pub draw_origin: Option<String>,
    pub draw_scale: Option<String>,
}

impl RawRenderOptions {
    pub fn into_options(self) -> MapmergeResult<RenderOptions> {
        let defaults = RenderOptions::default();
        let flag = |name: &str, value: Option<String>, default: bool| match value {
            Some(v) => RenderOptions::parse_flag(name, &v),
            None => Ok(default),
        };

        Ok(RenderOptions {
            bg_color: match self.bg_color {
                Some(color) => RenderOptions::parse_color(&color)?,
                None => defaults.bg_color,
            },
            draw_alpha: flag("drawAlpha", self.draw_alpha, defaults.draw_alpha)?,
            draw_origin: flag("drawOrigin", self.draw_origin, defaults.draw_origin)?,
            draw_scale: flag("drawScale", self.draw_scale, defaults.draw_scale)?,
        })
    }
}

/// Renders a world directory to an image
///
/// `world_dir` contains the map store under the name the renderer expects.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    async fn render(
        &self,
        world_dir: &Path,
        output: &Path,
        options: &RenderOptions,
    ) -> MapmergeResult<()>;

    /// File name of the map store inside the world directory
    fn world_file(&self) -> &str;
}

/// `minetestmapper` subprocess renderer
pub struct MinetestMapper {
    program: String,
    backend: String,
    world_file: String,
    timeout: Option<Duration>,
}

impl MinetestMapper {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            program: config.program.clone(),
            backend: config.backend.clone(),
            world_file: config.world_file.clone(),
            timeout: config.timeout(),
        }
    }

    /// Argument vector for one invocation
    pub fn args(&self, world_dir: &Path, output: &Path, options: &RenderOptions) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--backend".into(),
            self.backend.clone().into(),
            "-i".into(),
            world_dir.into(),
            "-o".into(),
            output.into(),
            "--bgcolor".into(),
            options.bg_color.clone().into(),
        ];

        if options.draw_alpha {
            args.push("--drawalpha".into());
        }
        if options.draw_origin {
            args.push("--draworigin".into());
        }
        if options.draw_scale {
            args.push("--drawscale".into());
        }

        args
    }
}

#[async_trait]
impl RenderEngine for MinetestMapper {
    async fn render(
        &self,
        world_dir: &Path,
        output: &Path,
        options: &RenderOptions,
    ) -> MapmergeResult<()> {
        let args = self.args(world_dir, output, options);
        debug!("Executing: {} {:?}", self.program, args);

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MapmergeError::command_failed(self.program.clone(), e))?;

        // Dropping the wait future drops the child, which kills it
        let output_result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| MapmergeError::RenderTimeout {
                    secs: limit.as_secs(),
                })?,
            None => child.wait_with_output().await,
        };
        let out = output_result.map_err(|e| MapmergeError::command_failed(self.program.clone(), e))?;

        if out.status.success() {
            info!("Rendered '{}'", output.display());
            Ok(())
        } else {
            let stdout = String::from_utf8_lossy(&out.stdout);
            let stderr = String::from_utf8_lossy(&out.stderr);
            Err(MapmergeError::Render {
                code: out.status.code().unwrap_or(-1),
                output: error_tail(&stdout, &stderr),
            })
        }
    }

    fn world_file(&self) -> &str {
        &self.world_file
    }
}
