//! Data Transfer Objects for inter-service communication
//!
//! This module contains DTOs used for communication between Capstan services
//! (controller, CLI). DTOs are lightweight representations of domain
//! entities optimized for network transfer.

pub mod application;
pub mod run;
pub mod status;
pub mod sync;
