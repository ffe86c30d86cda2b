//! Input and artifact storage
//!
//! Uploaded maps are immutable and addressed by content hash. Derived
//! artifacts live in a separate directory and are named after the keys
//! they were derived from.

pub mod content;
pub mod keys;
pub mod layout;

pub use content::ContentStore;
pub use keys::{CompositeKey, ContentKey, KEY_LEN};
pub use layout::ArtifactLayout;
