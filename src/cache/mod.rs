//! On-demand derived artifact cache
//!
//! Artifacts are files derived from immutable uploads. Whether an
//! artifact is cached is decided by file existence alone; there is no
//! separate metadata record.
//!
//! # Lifecycle
//!
//! | State | On disk | Description |
//! |-------|---------|-------------|
//! | Miss | no | First request starts the producer |
//! | In flight | staging only | Later requests join the running producer |
//! | Cached | yes | Served as-is until the lifetime elapses |
//! | Expired | no | Deleted by the reaper; next request starts over |

pub mod executor;
pub mod gate;
pub mod reaper;

pub use executor::KeyedExecutor;
pub use gate::{artifact_exists, ArtifactCache};
pub use reaper::{remaining_lifetime, Reaper, SweepReport};
