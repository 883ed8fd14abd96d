//! Command implementations for the `hoc` binary.

mod demo;
mod inspect;
mod run;

pub use demo::{run_demo, DemoOptions};
pub use inspect::{check_image, list_opcodes, print_digests};
pub use run::{run_image, RunOptions};
