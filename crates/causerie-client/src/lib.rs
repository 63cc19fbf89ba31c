//! # causerie-client
//!
//! Runs conversation timelines: one single-writer tokio task per open
//! conversation, fed by a [`DescriptorSource`] and driven through a
//! [`ConversationHandle`].

pub mod controller;
pub mod replay;
pub mod source;

use tracing_subscriber::{fmt, EnvFilter};

pub use controller::{spawn_conversation, spawn_with_diagnostics, ConversationHandle, TimelineSnapshot};
pub use source::{DescriptorFilter, DescriptorSource, MemorySource};

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the default
/// filter. Logs go to stderr so stdout stays machine-readable.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("causerie_client=debug,causerie_timeline=info,warn"));

    let installed = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();

    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
