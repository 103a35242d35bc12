//! Core types, config, errors, and capability model for Wayfarer.

pub mod capability;
pub mod config;
pub mod error;
pub mod types;
