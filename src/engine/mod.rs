//! External engines behind the cache
//!
//! - Merge: SQLite attach + transactional upsert
//! - Render: `minetestmapper` subprocess

pub mod merge;
pub mod render;

pub use merge::{MergeEngine, SqliteMergeEngine};
pub use render::{MinetestMapper, RawRenderOptions, RenderEngine, RenderOptions};

/// Max number of output lines kept in a render error.
const ERROR_TAIL_LINES: usize = 50;

/// Extract the useful tail of engine output for error diagnostics.
///
/// Combines stdout and stderr, then returns the last `ERROR_TAIL_LINES`
/// lines.
pub(crate) fn error_tail(stdout: &str, stderr: &str) -> String {
    let lines: Vec<&str> = stdout.lines().chain(stderr.lines()).collect();
    let total = lines.len();
    let tail: Vec<&str> = if total > ERROR_TAIL_LINES {
        lines[total - ERROR_TAIL_LINES..].to_vec()
    } else {
        lines
    };
    tail.join("\n")
}
