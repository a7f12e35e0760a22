//! # Protocol Errors
//!
//! Faults raised by the credential exchange protocol. Every variant is a local
//! protocol violation or an infrastructure failure; none are retried
//! automatically. The caller (typically the transport layer) decides whether a
//! fault warrants a problem report to the counterparty.

use thiserror::Error;

/// Errors raised by protocol operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The operation was attempted from a state it is not legal in. The record
    /// is left unchanged.
    #[error("invalid state: expected {expected}, found {actual}")]
    InvalidState {
        /// The state the operation requires.
        expected: String,
        /// The state the record is actually in.
        actual: String,
    },

    /// The record was created by a different protocol version.
    #[error("invalid protocol version: expected {expected}, found {actual}")]
    InvalidVersion {
        /// The version this engine implements.
        expected: String,
        /// The version stamped on the record.
        actual: String,
    },

    /// No format service matched the caller's input or the message's formats
    /// entries.
    #[error("no supported formats: {0}")]
    NoSupportedFormats(String),

    /// A formats entry has no paired attachment, or a service has no formats
    /// entry. A broken pairing indicates a malformed or tampered message.
    #[error("missing attachment: {0}")]
    MissingAttachment(String),

    /// An attachment's payload could not be decoded.
    #[error("invalid attachment: {0}")]
    InvalidAttachment(String),

    /// The operation requires a connection but the record has none.
    #[error("no connection: {0}")]
    NoConnection(String),

    /// A record or stored message the operation requires does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An inbound message arrived for a step the exchange has not reached.
    #[error("unexpected message: {0}")]
    UnexpectedMessage(String),

    /// A provider callback (storage, transport, serialization) failed.
    #[error("server error: {0}")]
    ServerError(String),
}
