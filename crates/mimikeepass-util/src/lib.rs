//! Shared utilities for mimikeepass
//!
//! Currently just socket path resolution, shared by the daemon and every
//! client-side entry point.

mod paths;

pub use paths::*;
