//! Command handlers
//!
//! This module contains the handlers the host UI calls into. They are thin
//! wrappers over [`crate::session::SessionHandle`].

pub mod session;
