//! Protocol types for the mimikeepass daemon
//!
//! This crate defines the stable wire surface between the daemon and its
//! clients:
//! - the request envelope (`method` + `parameters` + optional `oneway`)
//! - entry lookup queries (all filter fields optional, absent fields are
//!   omitted from the JSON entirely)
//! - responses (an entry map, `null` for no match, or a structured error)
//!
//! Frames are UTF-8 JSON; JSON never contains a literal NUL byte, which is
//! what lets the transport use `\0` as the frame separator.

mod protocol;

pub use protocol::*;
