//! CLI command implementations

pub mod config;
pub mod merge;
pub mod render;
pub mod serve;

pub use config::execute as config;
pub use merge::execute as merge;
pub use render::execute as render;
pub use serve::execute as serve;

use crate::error::MapmergeResult;
use crate::store::{CompositeKey, ContentKey};

/// Parse positional hashes, preserving order
pub(crate) fn parse_keys(hashes: &[String]) -> MapmergeResult<Vec<ContentKey>> {
    hashes.iter().map(|h| ContentKey::parse(h)).collect()
}

pub(crate) fn parse_composite(hashes: &[String]) -> MapmergeResult<CompositeKey> {
    CompositeKey::new(parse_keys(hashes)?)
}
