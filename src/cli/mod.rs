//! CLI module for Codex process spawning and stream parsing.

mod args;
mod events;
mod process;
mod schema;
mod stream;

pub use args::*;
pub use events::*;
pub use process::*;
pub use schema::*;
pub use stream::*;
