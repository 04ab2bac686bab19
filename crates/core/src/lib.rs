//! Core types and utilities for the rate ticker
//!
//! This crate provides shared types used across all components:
//! - Series, ratio and schedule definitions
//! - Source and extractor configuration
//! - Round outcome types
//! - Error types

pub mod types;
pub mod outcome;
pub mod config;
pub mod errors;

pub use self::types::*;
pub use self::outcome::*;
pub use self::config::*;
pub use self::errors::*;
