//! # Format Services
//!
//! The plugin boundary between the exchange engine and concrete credential
//! encodings. A format service owns everything encoding-specific: producing
//! and consuming the opaque attachment for each protocol step, and judging
//! whether an inbound payload matches what was previously negotiated.
//!
//! Services are registered once at engine construction and are stateless
//! across exchanges; per-exchange state lives in the exchange record and in
//! service-owned external storage referenced through format bindings.

use async_trait::async_trait;
use serde_json::Value;

use crate::message::{Attachment, FormatSpec, PreviewAttribute};
use crate::provider::Result;
use crate::record::{ExchangeRecord, FormatBinding};

/// Output of a message-producing format hook: the formats entry, the paired
/// attachment, and optionally a preview of the claims the payload encodes.
#[derive(Clone, Debug)]
pub struct FormatOutput {
    /// The formats entry to place in the wire message.
    pub format: FormatSpec,

    /// The attachment the formats entry points at.
    pub attachment: Attachment,

    /// Preview of the claims, when the encoding carries one.
    pub preview: Option<Vec<PreviewAttribute>>,
}

/// One concrete credential encoding.
///
/// The `input` passed to producing hooks is the caller-supplied payload for
/// this service, selected by [`format_key`](Self::format_key) from the
/// operation's per-format inputs; `None` means the service should derive the
/// payload from the exchange so far.
#[async_trait]
pub trait FormatService: Send + Sync {
    /// Key under which callers address this service in per-format inputs.
    fn format_key(&self) -> &str;

    /// Whether this service recognises a format identifier found in an
    /// inbound message's formats array.
    fn supports_format(&self, format: &str) -> bool;

    /// Produce the proposal payload.
    async fn create_proposal(
        &self, record: &ExchangeRecord, input: Option<&Value>,
    ) -> Result<FormatOutput>;

    /// Consume an inbound proposal payload.
    async fn process_proposal(&self, record: &ExchangeRecord, attachment: &Attachment)
        -> Result<()>;

    /// Produce the offer payload answering a proposal.
    async fn accept_proposal(
        &self, record: &ExchangeRecord, proposal: &Attachment, input: Option<&Value>,
    ) -> Result<FormatOutput>;

    /// Produce an offer payload not bound to a proposal.
    async fn create_offer(
        &self, record: &ExchangeRecord, input: Option<&Value>,
    ) -> Result<FormatOutput>;

    /// Consume an inbound offer payload.
    async fn process_offer(&self, record: &ExchangeRecord, attachment: &Attachment) -> Result<()>;

    /// Produce the request payload answering an offer.
    async fn accept_offer(
        &self, record: &ExchangeRecord, offer: &Attachment, input: Option<&Value>,
    ) -> Result<FormatOutput>;

    /// Consume an inbound request payload.
    async fn process_request(&self, record: &ExchangeRecord, attachment: &Attachment)
        -> Result<()>;

    /// Produce the credential payload answering a request. The offer is
    /// absent when the exchange started with an unsolicited request.
    async fn accept_request(
        &self, record: &ExchangeRecord, request: &Attachment, offer: Option<&Attachment>,
        input: Option<&Value>,
    ) -> Result<FormatOutput>;

    /// Consume an issued credential, returning a binding to the external
    /// record the service stored it in, if any.
    async fn process_credential(
        &self, record: &ExchangeRecord, credential: &Attachment, request: &Attachment,
    ) -> Result<Option<FormatBinding>>;

    /// Whether an inbound proposal matches the offer previously sent closely
    /// enough to answer it automatically.
    async fn should_auto_respond_to_proposal(
        &self, record: &ExchangeRecord, proposal: &Attachment, offer: &Attachment,
    ) -> bool;

    /// Whether an inbound offer matches the proposal previously sent closely
    /// enough to answer it automatically.
    async fn should_auto_respond_to_offer(
        &self, record: &ExchangeRecord, proposal: &Attachment, offer: &Attachment,
    ) -> bool;

    /// Whether an inbound request matches the offer previously sent closely
    /// enough to answer it automatically.
    async fn should_auto_respond_to_request(
        &self, record: &ExchangeRecord, offer: &Attachment, request: &Attachment,
        proposal: Option<&Attachment>,
    ) -> bool;

    /// Whether an issued credential matches the request previously sent
    /// closely enough to acknowledge it automatically.
    async fn should_auto_respond_to_credential(
        &self, record: &ExchangeRecord, credential: &Attachment, request: &Attachment,
        offer: Option<&Attachment>, proposal: Option<&Attachment>,
    ) -> bool;
}
