//! Handoff storage backends.

pub mod json;

pub use json::{JsonStore, BATCHES_FILE, HOSTS_FILE, TARGETS_FILE};
