//! Source polling

pub mod watcher;
