//! Shared controller utilities

pub mod backoff;
pub mod queue;

pub use backoff::Backoff;
pub use queue::EventQueue;
