//! # trunkplayer-ng Common Library
//!
//! Shared code for the trunkplayer-ng services including:
//! - Database schema initialization and row models
//! - Live event types (rooms and events pushed to listeners)
//! - Configuration loading and root folder resolution
//! - Utility functions (time, UUID parsing)

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
