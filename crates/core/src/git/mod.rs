//! Git access for bibsync.

pub mod client;

pub use client::{GitClient, VcsBackend};
