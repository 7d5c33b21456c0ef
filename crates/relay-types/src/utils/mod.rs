//! Utility functions for common type conversions and transformations.
//!
//! This module provides helper functions for hex string handling, shape
//! predicates and timestamps used throughout the relay.

pub mod formatting;
pub mod helpers;

pub use formatting::without_0x_prefix;
pub use helpers::{current_timestamp_millis, is_address, is_hex_bytes, is_hex_quantity};
