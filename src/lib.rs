//! folio: sorts document files into user-defined category folders.
//!
//! Classification is layered: a per-user content-hash cache, a budgeted
//! remote classifier, filename keywords, and local embedding similarity.

pub mod account;
pub mod cache;
pub mod categories;
pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod mover;
pub mod orchestrator;
pub mod progress;
pub mod remote;

pub use categories::{
    CategorySet, Classification, ClassificationMethod, ClassificationRecord, FALLBACK_CATEGORY,
    UNPROCESSABLE_CATEGORY,
};
pub use config::Settings;
pub use error::{FolioError, Result};
pub use orchestrator::{OrganizePlan, Orchestrator, OrchestratorOptions, RunRequest};

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// Default: warn for dependencies, info for folio (run summaries visible).
/// Use RUST_LOG=folio=debug for per-file decisions.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,folio=info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
