//! # Generate
//!
//! Identifier generation for exchange records, messages, and threads.

use uuid::Uuid;

/// Generates an identifier for an exchange record.
#[must_use]
pub fn record_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generates an identifier for a protocol message.
#[must_use]
pub fn message_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generates a thread identifier for a new exchange.
#[must_use]
pub fn thread_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generates an identifier for an attachment.
#[must_use]
pub fn attachment_id() -> String {
    Uuid::new_v4().to_string()
}
