// SPDX-License-Identifier: MIT

use netlink_packet_utils::DecodeError;
use thiserror::Error;

/// Crate-level error type.
///
/// Parse failures never reach callers of the engine: malformed datagrams
/// are dropped (and logged) at the datagram boundary. An identifier
/// collision is not an error either, it triggers identifier renewal
/// internally.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid record: {0}")]
    InvalidRecord(#[from] DecodeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("no such interface: {0}")]
    NoSuchInterface(String),

    /// Multicast join failed; retryable, and typically coincides with
    /// duplicate address detection on the interface.
    #[error("multicast join failed on {0}")]
    JoinFailed(String),

    #[error("not found")]
    NotFound,
}
