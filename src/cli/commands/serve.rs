//! Serve command - run the HTTP server

use crate::cli::args::ServeArgs;
use crate::config::Config;
use crate::error::MapmergeResult;
use crate::server::MapServer;

/// Execute the serve command
pub async fn execute(args: ServeArgs, config: &Config) -> MapmergeResult<()> {
    let mut config = config.clone();
    if let Some(port) = args.port {
        config.server.bind.set_port(port);
    }

    MapServer::new(config)?.serve().await
}
