//! Core types for Velours.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod item;

pub use id::*;
pub use item::{CartLineItem, ItemKey, NewLineItem};
