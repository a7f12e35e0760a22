//! # Format Data
//!
//! Read-side access to the messages stored for an exchange: the raw
//! per-format payloads of each message, keyed by format key, plus the claim
//! previews of the proposal and offer. Lets applications inspect what was
//! negotiated without knowing the wire layout.

use std::collections::HashMap;

use credence_didcomm::message::{
    Attachment, FormatSpec, IssueCredential, OfferCredential, PreviewAttribute,
    ProposeCredential, RequestCredential,
};
use credence_didcomm::provider::{MessageKind, Provider};
use credence_didcomm::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use crate::coordinator;
use crate::Protocol;

/// Decoded per-format payloads of the messages stored for one exchange.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct FormatData {
    /// Claims previewed by the proposal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal_attributes: Option<Vec<PreviewAttribute>>,

    /// Claims previewed by the offer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offer_attributes: Option<Vec<PreviewAttribute>>,

    /// Proposal payloads by format key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal: Option<HashMap<String, Value>>,

    /// Offer payloads by format key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offer: Option<HashMap<String, Value>>,

    /// Request payloads by format key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<HashMap<String, Value>>,

    /// Credential payloads by format key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<HashMap<String, Value>>,
}

impl<P> Protocol<P>
where
    P: Provider,
{
    /// The stored proposal for an exchange, if any.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    pub async fn find_proposal_message(
        &self, record_id: &str,
    ) -> Result<Option<ProposeCredential>> {
        coordinator::find_message(&self.provider, record_id, MessageKind::Proposal, None).await
    }

    /// The stored offer for an exchange, if any.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    pub async fn find_offer_message(&self, record_id: &str) -> Result<Option<OfferCredential>> {
        coordinator::find_message(&self.provider, record_id, MessageKind::Offer, None).await
    }

    /// The stored request for an exchange, if any.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    pub async fn find_request_message(
        &self, record_id: &str,
    ) -> Result<Option<RequestCredential>> {
        coordinator::find_message(&self.provider, record_id, MessageKind::Request, None).await
    }

    /// The stored credential message for an exchange, if any.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    pub async fn find_credential_message(
        &self, record_id: &str,
    ) -> Result<Option<IssueCredential>> {
        coordinator::find_message(&self.provider, record_id, MessageKind::Credential, None).await
    }

    /// Extract the decoded per-format payloads of every message stored for
    /// an exchange.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure or when a stored message's
    /// format/attachment pairing is broken.
    #[instrument(level = "debug", skip(self))]
    pub async fn format_data(&self, record_id: &str) -> Result<FormatData> {
        let proposal = self.find_proposal_message(record_id).await?;
        let offer = self.find_offer_message(record_id).await?;
        let request = self.find_request_message(record_id).await?;
        let credential = self.find_credential_message(record_id).await?;

        let mut data = FormatData {
            proposal_attributes: proposal
                .as_ref()
                .and_then(|p| p.credential_preview.clone())
                .map(|p| p.attributes),
            offer_attributes: offer
                .as_ref()
                .and_then(|o| o.credential_preview.clone())
                .map(|p| p.attributes),
            ..FormatData::default()
        };

        if let Some(message) = &proposal {
            data.proposal =
                Some(self.payloads_by_key(&message.formats, &message.proposal_attachments)?);
        }
        if let Some(message) = &offer {
            data.offer = Some(self.payloads_by_key(&message.formats, &message.offer_attachments)?);
        }
        if let Some(message) = &request {
            data.request =
                Some(self.payloads_by_key(&message.formats, &message.request_attachments)?);
        }
        if let Some(message) = &credential {
            data.credential =
                Some(self.payloads_by_key(&message.formats, &message.credential_attachments)?);
        }

        Ok(data)
    }

    fn payloads_by_key(
        &self, formats: &[FormatSpec], attachments: &[Attachment],
    ) -> Result<HashMap<String, Value>> {
        let mut payloads = HashMap::new();

        for service in &self.services_for_message(formats) {
            let attachment =
                coordinator::attachment_for_service(service.as_ref(), formats, attachments)?;
            payloads.insert(service.format_key().to_owned(), attachment.data_as_json()?);
        }

        Ok(payloads)
    }
}
