//! Floodgate - Client-Side Request Throttling
//!
//! This crate attaches a window-based admission scheduler to any HTTP client
//! that can be modeled as a dispatch capability. Outgoing requests beyond the
//! configured per-window capacity wait in a FIFO queue and are released as
//! window capacity frees up. Multiple windows are enforced conjunctively,
//! queued requests can be cancelled without consuming capacity, and limits
//! can be reconfigured live without losing queued work.

pub mod client;
pub mod config;
pub mod duration;
pub mod error;
pub mod throttle;
