//! Codex CLI Provider - drive `codex exec` as a language model.

pub mod cli;
pub mod config;
pub mod display;
pub mod provider;
