//! hoc command line front end.
//!
//! The front end has no source parser: it works on body images, files
//! holding one bincode-encoded `hoc_ir::EncodedBody` each. Symbols are
//! stored by name and resolved against a fresh interpreter when an image is
//! loaded (see [`image::load`]).
//!
//! # Debugging
//!
//! - `RUST_LOG=hoc_vm=debug`: object lifetimes, templates, recovery sweeps
//! - `RUST_LOG=hoc_vm=trace`: every frame push and pop
//! - `HOC_LOG_TREE=1`: indent events by span instead of the flat format

pub mod commands;
pub mod image;

pub use image::CliError;

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Install the tracing subscriber. Only does anything when `RUST_LOG` is
/// set; later calls are no-ops.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_err() {
            return;
        }
        let filter = EnvFilter::from_default_env();
        if std::env::var_os("HOC_LOG_TREE").is_some() {
            tracing_subscriber::registry()
                .with(
                    tracing_tree::HierarchicalLayer::new(2)
                        .with_targets(true)
                        .with_writer(std::io::stderr),
                )
                .with(filter)
                .init();
        } else {
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_level(true)
                        .with_writer(std::io::stderr),
                )
                .with(filter)
                .init();
        }
    });
}
