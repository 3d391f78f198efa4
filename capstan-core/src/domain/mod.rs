//! Core domain types
//!
//! This module contains the core domain structures used across Capstan
//! services. These types represent the fundamental business entities and are
//! shared between the controller (for persistence and reconciliation) and
//! the client/CLI (for display).

pub mod application;
pub mod object;
pub mod run;
pub mod snapshot;
pub mod sync;
