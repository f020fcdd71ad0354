//! Wire protocol for the lobby-and-match server
//!
//! This module provides:
//! - Newline-delimited JSON framing
//! - Inbound/outbound message unions and snapshot types

pub mod codec;
pub mod messages;

// Re-export commonly used types
pub use codec::{decode, encode, LineCodec, MAX_LINE_BYTES};
pub use messages::*;
