//! dnsrelay - a UDP DNS relay with a local record table.
//!
//! Names found in the local table are answered directly (or refused with
//! NXDOMAIN when mapped to `0.0.0.0`); everything else is relayed to a
//! single upstream resolver.

pub mod dns;
pub mod error;
pub mod forward;
pub mod proxy;
pub mod records;
pub mod resolver;
pub mod stats;
pub mod transport;

pub use error::{Error, Result};
