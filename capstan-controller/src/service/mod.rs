//! Service Module
//!
//! Business logic layer for the controller. Services orchestrate between
//! the record repositories and the reconciliation engine and hold the
//! domain rules the API surface relies on.

pub mod application;
pub mod status;

// Re-export for convenience
pub use application as application_service;
pub use status as status_service;
