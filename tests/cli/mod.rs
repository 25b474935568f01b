//! CLI layer tests.

mod args_test;
mod events_test;
