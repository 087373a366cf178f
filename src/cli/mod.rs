//! # Command-Line Interface
//!
//! User-facing commands and the shared output sink.
//!
//! | Command | Purpose |
//! |---------|---------|
//! | `build <name>` | Run the named build configuration |
//! | `run <name>` | Build if needed, then execute the target binary |
//! | `new <name>` | Write a template build configuration |
//! | `list` | Show available build configurations |
//! | `init`, `update`, `repair` | Placeholders, report not-implemented |
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod output;

pub use app::{run, Cli, Commands};
pub use output::Output;
