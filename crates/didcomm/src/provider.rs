//! # Provider
//!
//! Traits implemented by the host application to supply storage, transport,
//! and eventing to the exchange engine. The engine treats all of these as
//! external collaborators: storage must provide at least per-record
//! serialization (two messages for the same thread must not race through
//! resolve-mutate-persist), transport failures are not retried, and events
//! are fire-and-forget.

use std::fmt::{self, Display};
use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::{ExchangeRecord, ExchangeState, Role};

/// Result type for provider callbacks.
pub type Result<T, E = anyhow::Error> = std::result::Result<T, E>;

/// Functionality the host must supply to run the exchange engine.
pub trait Provider: ExchangeStore + MessageStore + Transport + EventEmitter + Clone {}

/// Kinds of wire messages retained in the message store.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// A propose-credential message.
    Proposal,

    /// An offer-credential message.
    Offer,

    /// A request-credential message.
    Request,

    /// An issue-credential message.
    Credential,
}

impl Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proposal => write!(f, "proposal"),
            Self::Offer => write!(f, "offer"),
            Self::Request => write!(f, "request"),
            Self::Credential => write!(f, "credential"),
        }
    }
}

/// Whether the local party sent or received a stored message.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// The local party sent the message.
    Sender,

    /// The local party received the message.
    Receiver,
}

/// Storage for exchange records.
pub trait ExchangeStore: Send + Sync {
    /// Persist a newly created record.
    fn save(&self, record: &ExchangeRecord) -> impl Future<Output = Result<()>> + Send;

    /// Persist changes to an existing record.
    fn update(&self, record: &ExchangeRecord) -> impl Future<Output = Result<()>> + Send;

    /// Retrieve a record by its id.
    fn find_by_id(
        &self, record_id: &str,
    ) -> impl Future<Output = Result<Option<ExchangeRecord>>> + Send;

    /// Resolve a record by thread id, optionally narrowed by role and
    /// connection. A record with no connection id matches any connection
    /// (connection-less exchanges relax the connection key).
    fn find_by_thread(
        &self, thread_id: &str, role: Option<Role>, connection_id: Option<&str>,
    ) -> impl Future<Output = Result<Option<ExchangeRecord>>> + Send;

    /// Resolve a record by one of its format bindings.
    fn find_by_binding(
        &self, kind: &str, record_id: &str,
    ) -> impl Future<Output = Result<Option<ExchangeRecord>>> + Send;
}

/// Storage for raw wire messages, keyed by associated record, message kind,
/// and sender/receiver role. Saving a message for a (record, kind) pair that
/// already holds one replaces it: renegotiation supersedes the earlier
/// message.
pub trait MessageStore: Send + Sync {
    /// Save or replace the stored message of the given kind for a record.
    fn save_message(
        &self, record_id: &str, kind: MessageKind, role: MessageRole, message: &Value,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Retrieve the stored message of the given kind for a record, optionally
    /// narrowed to the role the local party played.
    fn find_message(
        &self, record_id: &str, kind: MessageKind, role: Option<MessageRole>,
    ) -> impl Future<Output = Result<Option<Value>>> + Send;
}

/// Outbound message delivery. The engine commits state before calling
/// `send`, so a failed send leaves the record correctly advanced and the
/// message retryable.
pub trait Transport: Send + Sync {
    /// Deliver a message, addressed by connection when one exists. For
    /// connection-less exchanges the destination is resolved from the
    /// message's own routing context.
    fn send(
        &self, message: Value, connection_id: Option<&str>,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Events published by the engine as an exchange progresses.
#[derive(Clone, Debug)]
pub enum ExchangeEvent {
    /// An exchange record changed state. A `None` previous state signals
    /// creation.
    StateChanged {
        /// Snapshot of the record after the change.
        record: ExchangeRecord,

        /// The state before the change.
        previous_state: Option<ExchangeState>,
    },

    /// A revocation notification was correlated to an exchange.
    RevocationReceived {
        /// Snapshot of the record carrying the notification.
        record: ExchangeRecord,
    },
}

/// Fire-and-forget event publication. The engine expects no acknowledgement
/// and does not fail an operation over an event.
pub trait EventEmitter: Send + Sync {
    /// Publish an event.
    fn emit(&self, event: ExchangeEvent) -> impl Future<Output = ()> + Send;
}
