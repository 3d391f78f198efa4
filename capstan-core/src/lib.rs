//! Capstan Core
//!
//! Core types and abstractions for the Capstan delivery controller.
//!
//! This crate contains:
//! - Domain types: Core business entities (Application, DesiredStateSnapshot,
//!   SyncStatus, PipelineRun, the object model)
//! - DTOs: Data transfer objects for inter-service communication
//! - The shared error taxonomy for object store access

pub mod domain;
pub mod dto;
pub mod error;
