//! # DIDComm Issue Credential Types
//!
//! Types and traits shared by the credence crates: the wire messages of the
//! issue-credential protocol family, the exchange record and its state
//! machine, the provider traits implemented by the host application, and the
//! format-service trait implemented by credential-format plugins.
//!
//! The crate is for internal use within the Credence project and is not
//! intended to be used directly by end users. Public types are re-exported
//! through the `credence-exchange` crate.

mod error;
pub mod format;
pub mod gen;
pub mod message;
pub mod provider;
pub mod record;

pub use self::error::Error;

/// Result type for protocol operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The version tag stamped on every exchange record created by this protocol
/// implementation. Transitions assert the record carries the same tag before
/// any side effect.
pub const PROTOCOL_VERSION: &str = "v2";
