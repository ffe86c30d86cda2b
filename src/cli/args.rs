//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Mapmerge - merge and render uploaded map databases
///
/// Serves uploads, merged map stores and rendered images, producing each
/// derived artifact on demand and expiring it after a fixed lifetime.
#[derive(Parser, Debug)]
#[command(name = "mapmerge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "MAPMERGE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server
    ///
    /// Upload hashes are the first 16 bytes of SHA-256, not MD5, so an
    /// upload directory written by an MD5-keyed deployment is not reused.
    Serve(ServeArgs),

    /// Merge uploaded maps, later ones taking precedence
    Merge(MergeArgs),

    /// Render one uploaded map or the merge of several
    Render(RenderArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Port to listen on (overrides server.bind)
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,
}

/// Arguments for the merge command
#[derive(Parser, Debug)]
pub struct MergeArgs {
    /// Map hashes, lowest precedence first
    #[arg(required = true, num_args = 2..)]
    pub hashes: Vec<String>,
}

/// Arguments for the render command
#[derive(Parser, Debug)]
pub struct RenderArgs {
    /// Map hashes; two or more are merged first
    #[arg(required = true)]
    pub hashes: Vec<String>,

    /// Background color (#rgb or #rrggbb)
    #[arg(long, default_value = "#ffffff")]
    pub bg_color: String,

    /// Do not blend transparent nodes
    #[arg(long)]
    pub no_draw_alpha: bool,

    /// Mark the world origin
    #[arg(long)]
    pub draw_origin: bool,

    /// Draw coordinate scales
    #[arg(long)]
    pub draw_scale: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}
