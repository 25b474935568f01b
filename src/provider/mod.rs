//! Language-model provider backed by the Codex CLI.
//!
//! Each request spawns one `codex exec` process, translates its JSON event
//! stream into [`StreamPart`]s and maps failures onto [`ProviderError`].

mod abort;
mod error;
mod generate;
mod model;
mod prompt;
mod runner;
mod stream;
mod tools;
mod types;

pub use abort::*;
pub use error::*;
pub use model::{CodexLanguageModel, CodexProvider, LanguageModel, PROVIDER_ID};
pub use prompt::*;
pub use stream::{StreamResponse, DEFAULT_CHANNEL_BUFFER};
pub use tools::*;
pub use types::*;
