//! # Exchange Record
//!
//! The persistent entity representing one credential exchange: its
//! correlation keys, role, position in the state machine, and the
//! negotiation data accumulated along the way.
//!
//! Every state transition is guarded: the operation asserts the record's
//! protocol version and current persisted state before any side effect. A
//! mismatch is a protocol fault, never a silent no-op.

use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::gen;
use crate::message::PreviewAttribute;
use crate::{Result, PROTOCOL_VERSION};

/// The local party's role in an exchange. Fixed at creation.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The party receiving the credential.
    Holder,

    /// The party issuing the credential.
    Issuer,
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Holder => write!(f, "holder"),
            Self::Issuer => write!(f, "issuer"),
        }
    }
}

/// Position of an exchange in the protocol state machine.
///
/// `Done` is the success terminal; `Declined` and `Abandoned` are failure
/// terminals.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ExchangeState {
    /// Holder has sent a proposal.
    ProposalSent,

    /// Issuer has received a proposal.
    ProposalReceived,

    /// Issuer has sent an offer.
    OfferSent,

    /// Holder has received an offer.
    OfferReceived,

    /// Holder has sent a request.
    RequestSent,

    /// Issuer has received a request.
    RequestReceived,

    /// Issuer has issued the credential.
    CredentialIssued,

    /// Holder has received the credential.
    CredentialReceived,

    /// The exchange completed successfully.
    Done,

    /// The holder declined the offer.
    Declined,

    /// Either party abandoned the exchange.
    Abandoned,
}

impl ExchangeState {
    /// Whether the exchange can progress no further.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Declined | Self::Abandoned)
    }
}

impl Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ProposalSent => "proposal-sent",
            Self::ProposalReceived => "proposal-received",
            Self::OfferSent => "offer-sent",
            Self::OfferReceived => "offer-received",
            Self::RequestSent => "request-sent",
            Self::RequestReceived => "request-received",
            Self::CredentialIssued => "credential-issued",
            Self::CredentialReceived => "credential-received",
            Self::Done => "done",
            Self::Declined => "declined",
            Self::Abandoned => "abandoned",
        };
        write!(f, "{s}")
    }
}

/// Whether the engine progresses an exchange without application
/// intervention after an inbound message.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AutoAcceptPolicy {
    /// Never respond automatically.
    #[default]
    Never,

    /// Always respond automatically.
    Always,

    /// Respond automatically when the inbound content matches what was
    /// previously negotiated.
    ContentApproved,
}

/// Pointer to format-service-owned storage, e.g. the concrete issued
/// credential. Appended at the issue step.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct FormatBinding {
    /// The format kind owning the external record.
    pub kind: String,

    /// Identifier of the external record.
    pub record_id: String,
}

/// Revocation details received out-of-band of the main state machine.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct RevocationNotification {
    /// Free-text note from the issuer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// When the notification arrived.
    pub received_at: DateTime<Utc>,
}

/// The persistent state of one credential exchange.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ExchangeRecord {
    /// Record identifier, stable for the record's lifetime.
    pub id: String,

    /// Correlates all messages of the exchange. Set once at creation.
    pub thread_id: String,

    /// Links to an originating parent exchange.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_thread_id: Option<String>,

    /// Absent for connection-less (out-of-band) exchanges.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,

    /// The local party's role.
    pub role: Role,

    /// Current position in the state machine.
    pub state: ExchangeState,

    /// Version tag of the protocol that created the record.
    pub protocol_version: String,

    /// Overrides the engine-wide auto-accept default for this exchange.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_accept: Option<AutoAcceptPolicy>,

    /// The claims under negotiation, as last previewed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_attributes: Option<Vec<PreviewAttribute>>,

    /// Pointers to format-service-owned storage.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub format_bindings: Vec<FormatBinding>,

    /// Set on transition into `Abandoned`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Set when a revocation notification arrives for an issued credential.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revocation_notification: Option<RevocationNotification>,

    /// When the record was created.
    pub created_at: DateTime<Utc>,

    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
}

impl ExchangeRecord {
    /// Create a record for a new exchange in its initial state.
    #[must_use]
    pub fn new(role: Role, state: ExchangeState, thread_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: gen::record_id(),
            thread_id: thread_id.into(),
            parent_thread_id: None,
            connection_id: None,
            role,
            state,
            protocol_version: PROTOCOL_VERSION.into(),
            auto_accept: None,
            preview_attributes: None,
            format_bindings: Vec::new(),
            error_message: None,
            revocation_notification: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Assert the record is in the given state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] naming the expected and actual states
    /// when they differ.
    pub fn assert_state(&self, expected: ExchangeState) -> Result<()> {
        if self.state != expected {
            return Err(Error::InvalidState {
                expected: expected.to_string(),
                actual: self.state.to_string(),
            });
        }
        Ok(())
    }

    /// Assert the record was created by the given protocol version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidVersion`] when the versions differ.
    pub fn assert_version(&self, expected: &str) -> Result<()> {
        if self.protocol_version != expected {
            return Err(Error::InvalidVersion {
                expected: expected.into(),
                actual: self.protocol_version.clone(),
            });
        }
        Ok(())
    }

    /// The auto-accept policy in effect for this record: the record-level
    /// override if present, else the supplied engine-wide default.
    #[must_use]
    pub fn effective_auto_accept(&self, default: AutoAcceptPolicy) -> AutoAcceptPolicy {
        self.auto_accept.unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_guard_names_states() {
        let record = ExchangeRecord::new(Role::Holder, ExchangeState::Declined, "t-1");

        let err = record.assert_state(ExchangeState::OfferReceived).expect_err("should fault");
        let message = err.to_string();
        assert!(message.contains("offer-received"));
        assert!(message.contains("declined"));
    }

    #[test]
    fn version_guard() {
        let mut record = ExchangeRecord::new(Role::Issuer, ExchangeState::ProposalReceived, "t-1");
        assert!(record.assert_version(PROTOCOL_VERSION).is_ok());

        record.protocol_version = "v1".into();
        assert!(record.assert_version(PROTOCOL_VERSION).is_err());
    }

    #[test]
    fn auto_accept_override_wins() {
        let mut record = ExchangeRecord::new(Role::Holder, ExchangeState::OfferReceived, "t-1");
        assert_eq!(
            record.effective_auto_accept(AutoAcceptPolicy::ContentApproved),
            AutoAcceptPolicy::ContentApproved
        );

        record.auto_accept = Some(AutoAcceptPolicy::Always);
        assert_eq!(
            record.effective_auto_accept(AutoAcceptPolicy::Never),
            AutoAcceptPolicy::Always
        );
    }

    #[test]
    fn terminal_states() {
        assert!(ExchangeState::Done.is_terminal());
        assert!(ExchangeState::Declined.is_terminal());
        assert!(ExchangeState::Abandoned.is_terminal());
        assert!(!ExchangeState::OfferSent.is_terminal());
    }
}
