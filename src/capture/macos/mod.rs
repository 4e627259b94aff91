//! macOS capture helpers
//!
//! Screen recording permission checks via CoreGraphics.

pub mod permissions;

pub use permissions::*;
