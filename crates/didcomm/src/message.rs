//! # Protocol Messages
//!
//! Wire types for the issue-credential message family. Every data-carrying
//! message pairs a `formats` array with an attachment array: each formats
//! entry names a credential encoding and the attachment that carries its
//! payload. The engine never interprets attachment content; format services
//! do.

use base64ct::{Base64, Encoding};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::Result;

/// Message type URI for a credential proposal.
pub const PROPOSE_CREDENTIAL: &str = "https://didcomm.org/issue-credential/2.0/propose-credential";

/// Message type URI for a credential offer.
pub const OFFER_CREDENTIAL: &str = "https://didcomm.org/issue-credential/2.0/offer-credential";

/// Message type URI for a credential request.
pub const REQUEST_CREDENTIAL: &str = "https://didcomm.org/issue-credential/2.0/request-credential";

/// Message type URI for an issued credential.
pub const ISSUE_CREDENTIAL: &str = "https://didcomm.org/issue-credential/2.0/issue-credential";

/// Message type URI for a credential acknowledgement.
pub const ACK: &str = "https://didcomm.org/issue-credential/2.0/ack";

/// Message type URI for a problem report.
pub const PROBLEM_REPORT: &str = "https://didcomm.org/issue-credential/2.0/problem-report";

/// Message type URI for a revocation notification.
pub const REVOKE: &str = "https://didcomm.org/revocation_notification/2.0/revoke";

/// Type URI carried inside a credential preview.
pub const CREDENTIAL_PREVIEW: &str =
    "https://didcomm.org/issue-credential/2.0/credential-preview";

/// Problem report code used when a party abandons the exchange.
pub const ISSUANCE_ABANDONED: &str = "issuance-abandoned";

/// Thread decorator correlating all messages of one exchange.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Thread {
    /// The thread identifier shared by every message of the exchange.
    #[serde(rename = "thid")]
    pub thread_id: String,

    /// Links to an originating parent exchange (e.g. out-of-band).
    #[serde(rename = "pthid", skip_serializing_if = "Option::is_none")]
    pub parent_thread_id: Option<String>,
}

/// A formats entry declaring which encoding is present in a message and which
/// attachment carries it.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct FormatSpec {
    /// Identifier of the attachment holding this format's payload.
    #[serde(rename = "attach_id")]
    pub attachment_id: String,

    /// Format identifier, e.g. `anoncreds/credential-offer@v1.0`.
    pub format: String,
}

/// An opaque payload blob, content-addressed by its id.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Attachment {
    /// Identifier referenced from the formats array.
    #[serde(rename = "@id")]
    pub id: String,

    /// Media type of the payload.
    #[serde(rename = "mime-type", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    /// The payload itself.
    pub data: AttachmentData,
}

/// Payload of an attachment, either inline JSON or base64-encoded bytes.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct AttachmentData {
    /// Base64-encoded payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base64: Option<String>,

    /// Inline JSON payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
}

impl Attachment {
    /// Create an attachment with an inline JSON payload.
    #[must_use]
    pub fn json(id: impl Into<String>, json: Value) -> Self {
        Self {
            id: id.into(),
            media_type: Some("application/json".into()),
            data: AttachmentData {
                base64: None,
                json: Some(json),
            },
        }
    }

    /// Create an attachment with a base64-encoded payload.
    #[must_use]
    pub fn base64(id: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            id: id.into(),
            media_type: None,
            data: AttachmentData {
                base64: Some(Base64::encode_string(bytes)),
                json: None,
            },
        }
    }

    /// The payload as JSON, decoding a base64 payload if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the attachment carries no payload or the payload
    /// cannot be decoded as JSON.
    pub fn data_as_json(&self) -> Result<Value> {
        if let Some(json) = &self.data.json {
            return Ok(json.clone());
        }
        if let Some(base64) = &self.data.base64 {
            let bytes = Base64::decode_vec(base64).map_err(|e| {
                Error::InvalidAttachment(format!("attachment {} is not valid base64: {e}", self.id))
            })?;
            return serde_json::from_slice(&bytes).map_err(|e| {
                Error::InvalidAttachment(format!("attachment {} is not valid JSON: {e}", self.id))
            });
        }
        Err(Error::InvalidAttachment(format!("attachment {} has no data", self.id)))
    }
}

/// A single human-meaningful claim under negotiation.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PreviewAttribute {
    /// Claim name.
    pub name: String,

    /// Media type of the claim value.
    #[serde(rename = "mime-type", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    /// Claim value.
    pub value: String,
}

/// Human-readable preview of the claims being negotiated, carried by
/// proposals and offers.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct CredentialPreview {
    /// Preview type URI.
    #[serde(rename = "@type")]
    pub preview_type: String,

    /// The previewed claims.
    pub attributes: Vec<PreviewAttribute>,
}

impl CredentialPreview {
    /// Create a preview for the given attributes.
    #[must_use]
    pub fn new(attributes: Vec<PreviewAttribute>) -> Self {
        Self {
            preview_type: CREDENTIAL_PREVIEW.into(),
            attributes,
        }
    }
}

/// Proposal for a credential, sent by the holder.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ProposeCredential {
    /// Message identifier.
    #[serde(rename = "@id")]
    pub id: String,

    /// Message type URI.
    #[serde(rename = "@type")]
    pub type_uri: String,

    /// Thread decorator.
    #[serde(rename = "~thread", skip_serializing_if = "Option::is_none")]
    pub thread: Option<Thread>,

    /// Declares which encodings are present and their attachments.
    #[serde(default)]
    pub formats: Vec<FormatSpec>,

    /// Per-format proposal payloads.
    #[serde(rename = "filters~attach", default)]
    pub proposal_attachments: Vec<Attachment>,

    /// Preview of the proposed claims.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_preview: Option<CredentialPreview>,

    /// Free-text note to the counterparty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// Machine-readable goal code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_code: Option<String>,

    /// Human-readable goal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
}

/// Offer of a credential, sent by the issuer.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct OfferCredential {
    /// Message identifier.
    #[serde(rename = "@id")]
    pub id: String,

    /// Message type URI.
    #[serde(rename = "@type")]
    pub type_uri: String,

    /// Thread decorator.
    #[serde(rename = "~thread", skip_serializing_if = "Option::is_none")]
    pub thread: Option<Thread>,

    /// Declares which encodings are present and their attachments.
    #[serde(default)]
    pub formats: Vec<FormatSpec>,

    /// Per-format offer payloads.
    #[serde(rename = "offers~attach", default)]
    pub offer_attachments: Vec<Attachment>,

    /// Preview of the offered claims.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_preview: Option<CredentialPreview>,

    /// Free-text note to the counterparty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// Machine-readable goal code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_code: Option<String>,

    /// Human-readable goal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
}

/// Request for a credential, sent by the holder.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct RequestCredential {
    /// Message identifier.
    #[serde(rename = "@id")]
    pub id: String,

    /// Message type URI.
    #[serde(rename = "@type")]
    pub type_uri: String,

    /// Thread decorator.
    #[serde(rename = "~thread", skip_serializing_if = "Option::is_none")]
    pub thread: Option<Thread>,

    /// Declares which encodings are present and their attachments.
    #[serde(default)]
    pub formats: Vec<FormatSpec>,

    /// Per-format request payloads.
    #[serde(rename = "requests~attach", default)]
    pub request_attachments: Vec<Attachment>,

    /// Free-text note to the counterparty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// Machine-readable goal code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_code: Option<String>,

    /// Human-readable goal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
}

/// An issued credential, sent by the issuer.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct IssueCredential {
    /// Message identifier.
    #[serde(rename = "@id")]
    pub id: String,

    /// Message type URI.
    #[serde(rename = "@type")]
    pub type_uri: String,

    /// Thread decorator.
    #[serde(rename = "~thread", skip_serializing_if = "Option::is_none")]
    pub thread: Option<Thread>,

    /// Declares which encodings are present and their attachments.
    #[serde(default)]
    pub formats: Vec<FormatSpec>,

    /// Per-format credential payloads.
    #[serde(rename = "credentials~attach", default)]
    pub credential_attachments: Vec<Attachment>,

    /// Requests an acknowledgement from the holder.
    #[serde(rename = "~please_ack", skip_serializing_if = "Option::is_none")]
    pub please_ack: Option<PleaseAck>,

    /// Free-text note to the counterparty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// Machine-readable goal code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_code: Option<String>,

    /// Human-readable goal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
}

/// Decorator asking the recipient to acknowledge the message.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PleaseAck {
    /// The events to acknowledge on.
    #[serde(default)]
    pub on: Vec<String>,
}

impl PleaseAck {
    /// Ask for an acknowledgement on receipt.
    #[must_use]
    pub fn on_receipt() -> Self {
        Self {
            on: vec!["RECEIPT".into()],
        }
    }
}

/// Acknowledgement of a received credential, sent by the holder.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Ack {
    /// Message identifier.
    #[serde(rename = "@id")]
    pub id: String,

    /// Message type URI.
    #[serde(rename = "@type")]
    pub type_uri: String,

    /// Thread decorator.
    #[serde(rename = "~thread", skip_serializing_if = "Option::is_none")]
    pub thread: Option<Thread>,

    /// Acknowledgement status.
    pub status: AckStatus,
}

/// Acknowledgement status values.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum AckStatus {
    /// The message was received and processed.
    #[default]
    #[serde(rename = "OK")]
    Ok,

    /// Processing failed.
    #[serde(rename = "FAIL")]
    Fail,

    /// Processing is pending.
    #[serde(rename = "PENDING")]
    Pending,
}

/// Signals the sender's abandonment of the exchange.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ProblemReport {
    /// Message identifier.
    #[serde(rename = "@id")]
    pub id: String,

    /// Message type URI.
    #[serde(rename = "@type")]
    pub type_uri: String,

    /// Thread decorator.
    #[serde(rename = "~thread", skip_serializing_if = "Option::is_none")]
    pub thread: Option<Thread>,

    /// What went wrong.
    pub description: ProblemDescription,
}

/// Machine- and human-readable description of a problem.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ProblemDescription {
    /// Machine-readable problem code.
    pub code: String,

    /// Human-readable description, in English.
    pub en: String,
}

/// Notifies the holder that an issued credential has been revoked. Correlated
/// by a derived credential identifier rather than the exchange thread.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Revoke {
    /// Message identifier.
    #[serde(rename = "@id")]
    pub id: String,

    /// Message type URI.
    #[serde(rename = "@type")]
    pub type_uri: String,

    /// Thread decorator.
    #[serde(rename = "~thread", skip_serializing_if = "Option::is_none")]
    pub thread: Option<Thread>,

    /// Derived identifier of the revoked credential, in the form
    /// `<format-kind>::<credential-id>`.
    pub credential_id: String,

    /// Free-text note to the holder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

// The first message of an exchange may omit the thread decorator, in which
// case its own id is the thread id.
macro_rules! threaded {
    ($($message:ty),*) => {
        $(impl $message {
            /// Thread id correlating the exchange this message belongs to.
            #[must_use]
            pub fn thread_id(&self) -> &str {
                self.thread.as_ref().map_or(self.id.as_str(), |t| t.thread_id.as_str())
            }

            /// Parent thread id, if the exchange was spawned from another.
            #[must_use]
            pub fn parent_thread_id(&self) -> Option<&str> {
                self.thread.as_ref().and_then(|t| t.parent_thread_id.as_deref())
            }
        })*
    };
}

threaded!(ProposeCredential, OfferCredential, RequestCredential, IssueCredential, Ack, ProblemReport);
