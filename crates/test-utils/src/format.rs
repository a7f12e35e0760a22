//! # Test Format Service
//!
//! A stub credential encoding. Attachments carry a JSON payload recording
//! the protocol step and whatever input the caller supplied, so tests can
//! assert on what reached each side. Previews are taken from an
//! `attributes` array in the input, and propagated from the proposal when an
//! offer is built without explicit input.

use async_trait::async_trait;
use credence_didcomm::format::{FormatOutput, FormatService};
use credence_didcomm::gen;
use credence_didcomm::message::{Attachment, FormatSpec, PreviewAttribute};
use credence_didcomm::provider::Result;
use credence_didcomm::record::{ExchangeRecord, FormatBinding};
use serde_json::{json, Value};

/// A format service for tests. Each instance answers to one format key and
/// one format identifier derived from it.
#[derive(Clone, Debug)]
pub struct TestFormatService {
    key: String,
    format: String,
    auto_respond: bool,
}

impl Default for TestFormatService {
    fn default() -> Self {
        Self::new()
    }
}

impl TestFormatService {
    /// A service with the default `test` format key.
    #[must_use]
    pub fn new() -> Self {
        Self::with_key("test")
    }

    /// A service answering to the given format key.
    #[must_use]
    pub fn with_key(key: &str) -> Self {
        Self {
            key: key.to_owned(),
            format: format!("{key}/credential@v1.0"),
            auto_respond: true,
        }
    }

    /// Set the answer the service gives to auto-respond queries.
    #[must_use]
    pub fn auto_respond(mut self, approve: bool) -> Self {
        self.auto_respond = approve;
        self
    }

    fn output(&self, step: &str, input: Option<&Value>) -> FormatOutput {
        let attachment_id = gen::attachment_id();
        let preview = attributes_of(input);

        FormatOutput {
            format: FormatSpec {
                attachment_id: attachment_id.clone(),
                format: self.format.clone(),
            },
            attachment: Attachment::json(
                attachment_id,
                json!({ "step": step, "data": input.cloned() }),
            ),
            preview,
        }
    }
}

// Extract preview attributes from a caller input.
fn attributes_of(input: Option<&Value>) -> Option<Vec<PreviewAttribute>> {
    let attributes = input?.get("attributes")?;
    serde_json::from_value(attributes.clone()).ok()
}

// Extract the caller input embedded in a previously built attachment.
fn data_of(attachment: &Attachment) -> Option<Value> {
    let payload = attachment.data_as_json().ok()?;
    match payload.get("data") {
        Some(Value::Null) | None => None,
        Some(data) => Some(data.clone()),
    }
}

#[async_trait]
impl FormatService for TestFormatService {
    fn format_key(&self) -> &str {
        &self.key
    }

    fn supports_format(&self, format: &str) -> bool {
        format == self.format
    }

    async fn create_proposal(
        &self, _record: &ExchangeRecord, input: Option<&Value>,
    ) -> Result<FormatOutput> {
        Ok(self.output("proposal", input))
    }

    async fn process_proposal(
        &self, _record: &ExchangeRecord, attachment: &Attachment,
    ) -> Result<()> {
        attachment.data_as_json()?;
        Ok(())
    }

    async fn accept_proposal(
        &self, _record: &ExchangeRecord, proposal: &Attachment, input: Option<&Value>,
    ) -> Result<FormatOutput> {
        // no explicit input means offering what was proposed
        let carried = data_of(proposal);
        let input = input.cloned().or(carried);
        Ok(self.output("offer", input.as_ref()))
    }

    async fn create_offer(
        &self, _record: &ExchangeRecord, input: Option<&Value>,
    ) -> Result<FormatOutput> {
        Ok(self.output("offer", input))
    }

    async fn process_offer(&self, _record: &ExchangeRecord, attachment: &Attachment) -> Result<()> {
        attachment.data_as_json()?;
        Ok(())
    }

    async fn accept_offer(
        &self, _record: &ExchangeRecord, _offer: &Attachment, input: Option<&Value>,
    ) -> Result<FormatOutput> {
        Ok(self.output("request", input))
    }

    async fn process_request(
        &self, _record: &ExchangeRecord, attachment: &Attachment,
    ) -> Result<()> {
        attachment.data_as_json()?;
        Ok(())
    }

    async fn accept_request(
        &self, _record: &ExchangeRecord, _request: &Attachment, _offer: Option<&Attachment>,
        input: Option<&Value>,
    ) -> Result<FormatOutput> {
        Ok(self.output("credential", input))
    }

    async fn process_credential(
        &self, _record: &ExchangeRecord, credential: &Attachment, _request: &Attachment,
    ) -> Result<Option<FormatBinding>> {
        // bind to the credential id the issuer supplied, or make one up
        let credential_id = data_of(credential)
            .and_then(|data| data.get("credential_id").and_then(Value::as_str).map(String::from))
            .unwrap_or_else(gen::record_id);

        Ok(Some(FormatBinding {
            kind: self.key.clone(),
            record_id: credential_id,
        }))
    }

    async fn should_auto_respond_to_proposal(
        &self, _record: &ExchangeRecord, _proposal: &Attachment, _offer: &Attachment,
    ) -> bool {
        self.auto_respond
    }

    async fn should_auto_respond_to_offer(
        &self, _record: &ExchangeRecord, _proposal: &Attachment, _offer: &Attachment,
    ) -> bool {
        self.auto_respond
    }

    async fn should_auto_respond_to_request(
        &self, _record: &ExchangeRecord, _offer: &Attachment, _request: &Attachment,
        _proposal: Option<&Attachment>,
    ) -> bool {
        self.auto_respond
    }

    async fn should_auto_respond_to_credential(
        &self, _record: &ExchangeRecord, _credential: &Attachment, _request: &Attachment,
        _offer: Option<&Attachment>, _proposal: Option<&Attachment>,
    ) -> bool {
        self.auto_respond
    }
}
